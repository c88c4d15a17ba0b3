//! Sync adapter: fire-and-forget per-step submission to the remote store.
//!
//! Each submission runs on its own task. The outcome is logged and
//! broadcast as a [`SyncEvent`]; it never feeds back into the sequencer.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SyncError;

use super::collaborators::{RemoteProfileStore, Role, SessionProvider};
use super::stage::SurveyStageId;

/// Why a step was not submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotAuthenticated,
    Offline,
    PrivilegedRole,
    StageNotSynced,
}

/// Result of one per-step submission.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Saved,
    Skipped(SkipReason),
    Failed(SyncError),
}

impl SyncOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved)
    }
}

/// Broadcast once per completed stage.
#[derive(Debug, Clone)]
pub struct SyncEvent {
    pub session_id: Uuid,
    pub stage: SurveyStageId,
    pub stage_number: u32,
    pub outcome: SyncOutcome,
}

pub struct SyncAdapter {
    remote: Arc<dyn RemoteProfileStore>,
    session: Arc<dyn SessionProvider>,
    tx: broadcast::Sender<SyncEvent>,
}

impl SyncAdapter {
    pub fn new(
        remote: Arc<dyn RemoteProfileStore>,
        session: Arc<dyn SessionProvider>,
        capacity: usize,
    ) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            remote,
            session,
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Gate: authenticated, online, standard role, and a stage that syncs.
    pub fn check(&self, stage: SurveyStageId) -> Result<(), SkipReason> {
        if !stage.edges().syncs {
            return Err(SkipReason::StageNotSynced);
        }
        let snapshot = self.session.snapshot();
        if !snapshot.is_authenticated {
            return Err(SkipReason::NotAuthenticated);
        }
        if !snapshot.is_online {
            return Err(SkipReason::Offline);
        }
        if snapshot.role != Role::Standard {
            return Err(SkipReason::PrivilegedRole);
        }
        Ok(())
    }

    /// Submit a completed stage in the background.
    ///
    /// Returns immediately. The handle is only useful to tests; callers in
    /// the flow drop it.
    pub fn submit(
        &self,
        session_id: Uuid,
        stage: SurveyStageId,
        payload: serde_json::Value,
    ) -> JoinHandle<SyncOutcome> {
        let stage_number = stage.number();
        let gate = self.check(stage);
        let remote = Arc::clone(&self.remote);
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let outcome = match gate {
                Err(reason) => {
                    debug!(%session_id, %stage, ?reason, "Skipping step sync");
                    SyncOutcome::Skipped(reason)
                }
                Ok(()) => match remote.save_step(stage, stage_number, &payload).await {
                    Ok(()) => {
                        debug!(%session_id, %stage, stage_number, "Step synced");
                        SyncOutcome::Saved
                    }
                    Err(e) => {
                        warn!(%session_id, %stage, stage_number, "Step sync failed: {}", e);
                        SyncOutcome::Failed(e)
                    }
                },
            };

            // Ok if nobody is listening.
            let _ = tx.send(SyncEvent {
                session_id,
                stage,
                stage_number,
                outcome: outcome.clone(),
            });
            outcome
        })
    }
}
