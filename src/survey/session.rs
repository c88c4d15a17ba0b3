//! In-flight survey session and its durable projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::answers::Answers;
use super::stage::SurveyStageId;

/// Where the sequencer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No stage open.
    Idle,
    /// Exactly one stage is open.
    Active,
    /// Finalization ran; the session is done.
    Terminal,
}

/// The single mutable piece of state shared by the sequencer's operations.
#[derive(Debug, Clone, Serialize)]
pub struct SurveySession {
    pub id: Uuid,
    /// The only interactive stage, if any.
    pub active_stage: Option<SurveyStageId>,
    pub answers: Answers,
    pub in_progress: bool,
    pub phase: SessionPhase,
    pub started_at: DateTime<Utc>,
}

impl Default for SurveySession {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            active_stage: None,
            answers: Answers::new(),
            in_progress: false,
            phase: SessionPhase::Idle,
            started_at: Utc::now(),
        }
    }
}

impl SurveySession {
    /// Mark `stage` as the one interactive stage.
    pub fn activate(&mut self, stage: SurveyStageId) {
        self.active_stage = Some(stage);
        self.in_progress = true;
        self.phase = SessionPhase::Active;
    }

    /// Close whatever is open and leave the session idle.
    pub fn deactivate(&mut self) -> Option<SurveyStageId> {
        self.in_progress = false;
        if self.phase != SessionPhase::Terminal {
            self.phase = SessionPhase::Idle;
        }
        self.active_stage.take()
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == SessionPhase::Terminal
    }

    /// The record that lets a reload reopen the current stage.
    pub fn resume_record(&self) -> Option<PersistedResumeRecord> {
        self.active_stage
            .filter(|_| self.in_progress)
            .map(PersistedResumeRecord::at)
    }
}

/// Minimal durable state needed to reopen the right stage after a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedResumeRecord {
    pub in_progress: bool,
    pub current_stage: SurveyStageId,
}

impl PersistedResumeRecord {
    pub fn at(stage: SurveyStageId) -> Self {
        Self {
            in_progress: true,
            current_stage: stage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_session_is_idle() {
        let session = SurveySession::default();
        assert_eq!(session.phase, SessionPhase::Idle);
        assert!(session.active_stage.is_none());
        assert!(!session.in_progress);
        assert!(session.answers.is_empty());
        assert!(session.resume_record().is_none());
    }

    #[test]
    fn activate_then_deactivate() {
        let mut session = SurveySession::default();
        session.activate(SurveyStageId::Motivation);
        assert_eq!(
            session.resume_record(),
            Some(PersistedResumeRecord::at(SurveyStageId::Motivation))
        );

        assert_eq!(session.deactivate(), Some(SurveyStageId::Motivation));
        assert_eq!(session.phase, SessionPhase::Idle);
        assert!(session.resume_record().is_none());
    }

    #[test]
    fn deactivate_keeps_terminal_phase() {
        let mut session = SurveySession::default();
        session.activate(SurveyStageId::Personalization);
        session.phase = SessionPhase::Terminal;
        session.deactivate();
        assert!(session.is_terminal());
    }

    #[test]
    fn record_serde_uses_stage_ids() {
        let record = PersistedResumeRecord::at(SurveyStageId::SpeakOut);
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"in_progress": true, "current_stage": "speak_out"})
        );
    }
}
