//! The survey sequencer. Owns the in-flight session and arbitrates every stage
//! transition: open, advance, retreat, skip, resume, and completion.
//!
//! Interactivity is decided by the session's single `active_stage` slot,
//! which is swapped before any presenter call. Presenter mounting can
//! briefly overlap during a handoff, but only one stage ever accepts input.
//!
//! Transitions are serialized by `transition_gate`. A second request while
//! one is in flight (a double click) is rejected instead of queued.
//! `skip_all` is the exception: it replaces the session at once, and every
//! transition re-checks the session id after each await so an abandoned
//! survey never writes state or opens a stage again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, RwLock, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SurveyConfig;
use crate::error::SurveyError;
use crate::store::StateStore;

use super::answers::Answers;
use super::classify::{ClassificationResult, VocabularyTally, classify};
use super::collaborators::{
    Navigator, RemoteProfileStore, SessionProvider, StagePresenter, StageView,
};
use super::persistence::PersistenceAdapter;
use super::routing::{Destination, RoutingContext, route};
use super::session::{PersistedResumeRecord, SessionPhase, SurveySession};
use super::stage::{Handoff, SurveyStageId};
use super::sync::{SyncAdapter, SyncEvent};

/// Collaborators injected into the sequencer.
#[derive(Clone)]
pub struct SurveyDeps {
    pub store: Arc<dyn StateStore>,
    pub remote: Arc<dyn RemoteProfileStore>,
    pub session: Arc<dyn SessionProvider>,
    pub presenter: Arc<dyn StagePresenter>,
    pub navigator: Arc<dyn Navigator>,
}

/// What a forward step produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepOutcome {
    Moved {
        from: SurveyStageId,
        to: SurveyStageId,
    },
    Finished(FinalizationReport),
}

/// Result of the finalization pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct FinalizationReport {
    pub session_id: Uuid,
    pub destination: Destination,
    pub path: &'static str,
    pub classification: ClassificationResult,
    pub tally: VocabularyTally,
    pub context: RoutingContext,
    /// Whether the remote store accepted the consolidated profile.
    pub profile_saved: bool,
    pub completed_at: DateTime<Utc>,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, Serialize)]
pub struct SurveyStatus {
    pub session_id: Uuid,
    pub phase: SessionPhase,
    pub in_progress: bool,
    pub active_stage: Option<SurveyStageId>,
    pub stage_number: Option<u32>,
    pub total_stages: u32,
    pub answers: Answers,
}

pub struct SurveySequencer {
    config: SurveyConfig,
    session: RwLock<SurveySession>,
    transition_gate: Mutex<()>,
    persistence: PersistenceAdapter,
    sync: SyncAdapter,
    remote: Arc<dyn RemoteProfileStore>,
    presenter: Arc<dyn StagePresenter>,
    navigator: Arc<dyn Navigator>,
}

impl SurveySequencer {
    pub fn new(config: SurveyConfig, deps: SurveyDeps) -> Arc<Self> {
        let persistence = PersistenceAdapter::new(deps.store, config.scope.clone());
        let sync = SyncAdapter::new(
            Arc::clone(&deps.remote),
            deps.session,
            config.sync_event_capacity,
        );
        Arc::new(Self {
            config,
            session: RwLock::new(SurveySession::default()),
            transition_gate: Mutex::new(()),
            persistence,
            sync,
            remote: deps.remote,
            presenter: deps.presenter,
            navigator: deps.navigator,
        })
    }

    /// Subscribe to per-step sync outcomes.
    pub fn subscribe_sync(&self) -> broadcast::Receiver<SyncEvent> {
        self.sync.subscribe()
    }

    pub async fn status(&self) -> SurveyStatus {
        let session = self.session.read().await;
        SurveyStatus {
            session_id: session.id,
            phase: session.phase,
            in_progress: session.in_progress,
            active_stage: session.active_stage,
            stage_number: session.active_stage.map(|s| s.number()),
            total_stages: SurveyStageId::total(),
            answers: session.answers.clone(),
        }
    }

    pub async fn active_stage(&self) -> Option<SurveyStageId> {
        self.session.read().await.active_stage
    }

    /// Whether `session_id` is still the live session (not skipped).
    async fn is_current(&self, session_id: Uuid) -> bool {
        self.session.read().await.id == session_id
    }

    fn begin_transition(&self) -> Result<MutexGuard<'_, ()>, SurveyError> {
        self.transition_gate
            .try_lock()
            .map_err(|_| SurveyError::TransitionInFlight)
    }

    /// External "show survey now" trigger: opens the first stage.
    pub async fn show_survey(&self) -> Result<SurveyStageId, SurveyError> {
        self.open(SurveyStageId::FIRST).await?;
        Ok(SurveyStageId::FIRST)
    }

    /// Open `stage`. Legal only when no stage is open. A finished session is
    /// superseded by a fresh one.
    pub async fn open(&self, stage: SurveyStageId) -> Result<(), SurveyError> {
        let _guard = self.begin_transition()?;
        let session_id = {
            let mut session = self.session.write().await;
            if let Some(active) = session.active_stage {
                return Err(SurveyError::AlreadyOpen(active));
            }
            if session.is_terminal() {
                *session = SurveySession::default();
            }
            session.activate(stage);
            info!(session_id = %session.id, %stage, "Survey stage opened");
            session.id
        };
        self.persistence.save(&PersistedResumeRecord::at(stage)).await;
        if self.is_current(session_id).await {
            self.presenter.open(StageView::new(stage, true)).await;
        }
        Ok(())
    }

    /// Startup resume. Reopens the persisted stage (or the first stage if
    /// the record is unreadable) after the settle delay. Returns the stage
    /// that was opened, if any.
    pub async fn resume(&self) -> Option<SurveyStageId> {
        let stage = match self.persistence.load().await {
            Some(record) if record.in_progress => record.current_stage,
            Some(_) => return None,
            None if self.persistence.load_in_progress_flag().await => {
                warn!(
                    scope = self.persistence.scope(),
                    "Resume record names an unknown stage, restarting survey"
                );
                SurveyStageId::FIRST
            }
            None => return None,
        };

        tokio::time::sleep(self.config.resume_settle_delay).await;

        let Ok(_guard) = self.begin_transition() else {
            debug!("Transition in flight, skipping resume");
            return None;
        };
        let answers = self.persistence.load_answers().await;
        let (session_id, replaced) = {
            let mut session = self.session.write().await;
            if session.active_stage == Some(stage) {
                return Some(stage);
            }
            let replaced = session.active_stage;
            *session = SurveySession {
                answers,
                ..SurveySession::default()
            };
            session.activate(stage);
            info!(
                session_id = %session.id,
                %stage,
                restored_answers = session.answers.len(),
                "Survey resumed"
            );
            (session.id, replaced)
        };

        self.persistence.save(&PersistedResumeRecord::at(stage)).await;
        if let Some(old) = replaced {
            self.presenter.close(StageView::new(old, false)).await;
        }
        if !self.is_current(session_id).await {
            return None;
        }
        self.presenter.open(StageView::new(stage, true)).await;
        Some(stage)
    }

    /// Record `payload` for `stage` and move forward. On the last stage this
    /// runs the finalization pipeline.
    pub async fn advance(
        &self,
        stage: SurveyStageId,
        payload: serde_json::Value,
    ) -> Result<StepOutcome, SurveyError> {
        if stage.is_terminal() {
            return self.complete(payload).await.map(StepOutcome::Finished);
        }

        let _guard = self.begin_transition()?;
        let edges = stage.edges();
        let Some(next) = edges.forward else {
            return Err(SurveyError::Finished);
        };

        let (session_id, answers) = {
            let mut session = self.session.write().await;
            ensure_active(&session, stage)?;
            session.answers.record(stage, payload.clone());
            session.activate(next);
            (session.id, session.answers.clone())
        };
        info!(%session_id, from = %stage, to = %next, "Survey advanced");

        // Fire and forget; the outcome is broadcast and logged.
        let _ = self.sync.submit(session_id, stage, payload);

        if self.is_current(session_id).await {
            self.persistence.save(&PersistedResumeRecord::at(next)).await;
            self.persistence.save_answers(&answers).await;
        }
        self.handoff(session_id, stage, next, edges.handoff).await;

        Ok(StepOutcome::Moved {
            from: stage,
            to: next,
        })
    }

    /// Go back to `stage`'s designated predecessor. Never submits anything
    /// and never removes captured answers.
    pub async fn retreat(&self, stage: SurveyStageId) -> Result<SurveyStageId, SurveyError> {
        let _guard = self.begin_transition()?;
        let previous = stage.previous().ok_or(SurveyError::NoPredecessor(stage))?;
        let session_id = {
            let mut session = self.session.write().await;
            ensure_active(&session, stage)?;
            session.activate(previous);
            info!(session_id = %session.id, from = %stage, to = %previous, "Survey went back");
            session.id
        };

        if self.is_current(session_id).await {
            self.persistence
                .save(&PersistedResumeRecord::at(previous))
                .await;
        }
        self.handoff(session_id, stage, previous, Handoff::Acknowledged)
            .await;
        Ok(previous)
    }

    /// Abandon the survey. The session is replaced by a fresh idle one right
    /// away, so no stage of the abandoned attempt can open again. Persisted
    /// state is cleared once any in-flight transition has finished its
    /// writes. In-flight step syncs are left to finish on their own.
    pub async fn skip_all(&self) -> Result<Option<SurveyStageId>, SurveyError> {
        let closed = {
            let mut session = self.session.write().await;
            if session.is_terminal() {
                return Err(SurveyError::Finished);
            }
            let closed = session.active_stage;
            info!(session_id = %session.id, stage = ?closed, "Survey skipped");
            *session = SurveySession::default();
            closed
        };

        // A transition in flight bails out at its next session check; wait
        // for it so its last write cannot land after the clear.
        let _guard = self.transition_gate.lock().await;
        self.persistence.clear().await;
        if let Some(stage) = closed {
            self.presenter.close(StageView::new(stage, false)).await;
        }
        Ok(closed)
    }

    /// Run the finalization pipeline from the last stage.
    ///
    /// A failed profile save never prevents routing: classification,
    /// routing, clearing, and navigation always run.
    pub async fn complete(
        &self,
        final_payload: serde_json::Value,
    ) -> Result<FinalizationReport, SurveyError> {
        let _guard = self.begin_transition()?;
        let (session_id, answers) = {
            let mut session = self.session.write().await;
            if session.is_terminal() {
                return Err(SurveyError::Finished);
            }
            if session.active_stage != Some(SurveyStageId::LAST) {
                return Err(SurveyError::NotTerminalStage(session.active_stage));
            }
            session.answers.record(SurveyStageId::LAST, final_payload);
            // Finalization is committed from here on; skip is rejected.
            session.phase = SessionPhase::Terminal;
            session.deactivate();
            (session.id, session.answers.clone())
        };

        let completed_at = Utc::now();
        let record = consolidated_record(session_id, &answers, completed_at);
        let profile_saved = match self.remote.save_final_profile(&record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%session_id, "Final profile save failed, routing anyway: {}", e);
                false
            }
        };

        let tally = VocabularyTally::from_answers(&answers);
        let classification = classify(&tally, answers.english_level());
        let context = RoutingContext::from_answers(&answers, classification);
        let destination = route(&context);

        self.persistence.clear().await;
        self.presenter
            .close(StageView::new(SurveyStageId::LAST, false))
            .await;

        info!(
            %session_id,
            %destination,
            classification = ?classification,
            profile_saved,
            "Survey complete"
        );
        self.navigator.go_to(destination);

        Ok(FinalizationReport {
            session_id,
            destination,
            path: destination.path(),
            classification,
            tally,
            context,
            profile_saved,
            completed_at,
        })
    }

    /// Hand presentation from `from` to `to`. `to` is already the active
    /// stage in the session. If the survey is skipped meanwhile, `to` is
    /// never left open.
    async fn handoff(
        &self,
        session_id: Uuid,
        from: SurveyStageId,
        to: SurveyStageId,
        policy: Handoff,
    ) {
        let opened = StageView::new(to, true);
        let closed = StageView::new(from, false);
        if !self.is_current(session_id).await {
            self.presenter.close(closed).await;
            return;
        }
        match policy {
            Handoff::Immediate => {
                tokio::join!(self.presenter.open(opened), self.presenter.close(closed));
            }
            Handoff::Acknowledged => {
                if tokio::time::timeout(self.config.handoff_timeout, self.presenter.open(opened))
                    .await
                    .is_err()
                {
                    debug!(stage = %to, "No open acknowledgment before handoff timeout");
                }
                self.presenter.close(closed).await;
            }
        }
        if !self.is_current(session_id).await {
            debug!(stage = %to, "Survey skipped during handoff, closing stage");
            self.presenter.close(StageView::new(to, false)).await;
        }
    }
}

fn ensure_active(session: &SurveySession, stage: SurveyStageId) -> Result<(), SurveyError> {
    if session.is_terminal() {
        return Err(SurveyError::Finished);
    }
    if session.active_stage != Some(stage) {
        return Err(SurveyError::StageNotActive {
            requested: stage,
            active: session.active_stage,
        });
    }
    Ok(())
}

/// Every answer in one record, stamped with the completion time.
fn consolidated_record(
    session_id: Uuid,
    answers: &Answers,
    completed_at: DateTime<Utc>,
) -> serde_json::Value {
    serde_json::json!({
        "session_id": session_id,
        "answers": answers.to_json(),
        "onboarding_completed": true,
        "completed_at": completed_at,
    })
}
