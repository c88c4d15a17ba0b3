//! Error types for the survey flow.

use crate::survey::stage::SurveyStageId;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Resume-record storage errors.
///
/// Never surfaced past the sequencer: every storage failure degrades to
/// "no resume record".
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupted record under key {key}: {reason}")]
    Corrupted { key: String, reason: String },
}

/// Per-step synchronization errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error("Remote store rejected step {stage}: {reason}")]
    Rejected { stage: SurveyStageId, reason: String },

    #[error("Remote store unreachable: {0}")]
    Transport(String),
}

/// Errors from the remote profile store's final save.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProfileError {
    #[error("Remote profile store is not configured")]
    NotConfigured,

    #[error("Profile request failed: {0}")]
    RequestFailed(String),

    #[error("Profile store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Illegal sequencer transitions.
///
/// These reject a caller's request without mutating the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurveyError {
    #[error("Unknown survey stage: {0}")]
    UnknownStage(String),

    #[error("A survey stage is already open ({0})")]
    AlreadyOpen(SurveyStageId),

    #[error("Stage {requested} is not the active stage (active: {active:?})")]
    StageNotActive {
        requested: SurveyStageId,
        active: Option<SurveyStageId>,
    },

    #[error("Stage {0} has no predecessor")]
    NoPredecessor(SurveyStageId),

    #[error("Survey can only be completed from the final stage, not {0:?}")]
    NotTerminalStage(Option<SurveyStageId>),

    #[error("A stage transition is already in flight")]
    TransitionInFlight,

    #[error("Survey has already finished")]
    Finished,
}
