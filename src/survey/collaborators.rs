//! External collaborator contracts consumed by the sequencer.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{ProfileError, SyncError};

use super::routing::Destination;
use super::stage::SurveyStageId;

/// Remote store that receives per-step answers and the final profile.
#[async_trait]
pub trait RemoteProfileStore: Send + Sync {
    async fn save_step(
        &self,
        stage: SurveyStageId,
        stage_number: u32,
        payload: &serde_json::Value,
    ) -> Result<(), SyncError>;

    async fn save_final_profile(&self, record: &serde_json::Value) -> Result<(), ProfileError>;
}

/// Role of the signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular learner account; the only role whose answers are synced.
    Standard,
    Admin,
    Other(String),
}

impl std::str::FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "standard" | "user" | "standard_user" => Self::Standard,
            "admin" => Self::Admin,
            other => Self::Other(other.to_string()),
        })
    }
}

/// Snapshot of who is taking the survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub is_authenticated: bool,
    pub is_online: bool,
    pub role: Role,
}

impl SessionSnapshot {
    pub fn standard_online() -> Self {
        Self {
            is_authenticated: true,
            is_online: true,
            role: Role::Standard,
        }
    }
}

/// Identity / connectivity provider.
pub trait SessionProvider: Send + Sync {
    fn snapshot(&self) -> SessionSnapshot;
}

/// Fixed snapshot, used by the server binary and tests.
#[derive(Debug)]
pub struct StaticSession {
    snapshot: Mutex<SessionSnapshot>,
}

impl StaticSession {
    pub fn new(snapshot: SessionSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    pub fn set_online(&self, online: bool) {
        if let Ok(mut s) = self.snapshot.lock() {
            s.is_online = online;
        }
    }
}

impl SessionProvider for StaticSession {
    fn snapshot(&self) -> SessionSnapshot {
        self.snapshot
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

/// What a stage renderer is told about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageView {
    pub stage: SurveyStageId,
    pub is_open: bool,
    pub stage_number: u32,
    pub total_stages: u32,
}

impl StageView {
    pub fn new(stage: SurveyStageId, is_open: bool) -> Self {
        Self {
            stage,
            is_open,
            stage_number: stage.number(),
            total_stages: SurveyStageId::total(),
        }
    }
}

/// Renders stages. `open` resolves once the stage has acknowledged that it
/// is mounted and interactive.
#[async_trait]
pub trait StagePresenter: Send + Sync {
    async fn open(&self, view: StageView);
    async fn close(&self, view: StageView);
}

/// Performs the post-onboarding navigation.
pub trait Navigator: Send + Sync {
    fn go_to(&self, destination: Destination);
}

/// Presenter that tracks which stages are mounted. Acknowledges immediately.
#[derive(Debug, Default)]
pub struct TrackingPresenter {
    open: Mutex<BTreeSet<SurveyStageId>>,
    max_open: Mutex<usize>,
}

impl TrackingPresenter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open_stages(&self) -> Vec<SurveyStageId> {
        self.open
            .lock()
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Largest number of simultaneously mounted stages seen so far.
    pub fn max_simultaneously_open(&self) -> usize {
        self.max_open.lock().map(|m| *m).unwrap_or_default()
    }
}

#[async_trait]
impl StagePresenter for TrackingPresenter {
    async fn open(&self, view: StageView) {
        if let Ok(mut open) = self.open.lock() {
            open.insert(view.stage);
            if let Ok(mut max) = self.max_open.lock() {
                *max = (*max).max(open.len());
            }
        }
    }

    async fn close(&self, view: StageView) {
        if let Ok(mut open) = self.open.lock() {
            open.remove(&view.stage);
        }
    }
}

/// Navigator that records the destination and publishes it on a watch
/// channel.
#[derive(Debug)]
pub struct RecordingNavigator {
    tx: watch::Sender<Option<Destination>>,
    calls: Mutex<Vec<Destination>>,
}

impl RecordingNavigator {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = watch::channel(None);
        Arc::new(Self {
            tx,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Destination>> {
        self.tx.subscribe()
    }

    pub fn last(&self) -> Option<Destination> {
        *self.tx.borrow()
    }

    /// Every navigation performed, in order.
    pub fn calls(&self) -> Vec<Destination> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Navigator for RecordingNavigator {
    fn go_to(&self, destination: Destination) {
        tracing::info!(%destination, path = destination.path(), "Navigating after onboarding");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(destination);
        }
        self.tx.send_replace(Some(destination));
    }
}

/// Remote store used when no profile endpoint is configured: every call
/// fails, which the sequencer tolerates.
#[derive(Debug, Default)]
pub struct DisabledProfileStore;

#[async_trait]
impl RemoteProfileStore for DisabledProfileStore {
    async fn save_step(
        &self,
        _stage: SurveyStageId,
        _stage_number: u32,
        _payload: &serde_json::Value,
    ) -> Result<(), SyncError> {
        Err(SyncError::Transport("remote profile store is not configured".into()))
    }

    async fn save_final_profile(&self, _record: &serde_json::Value) -> Result<(), ProfileError> {
        Err(ProfileError::NotConfigured)
    }
}

/// Upper bound on how long the sequencer waits for a presenter's open
/// acknowledgment before closing the previous stage anyway.
pub const DEFAULT_HANDOFF_TIMEOUT: Duration = Duration::from_millis(150);
