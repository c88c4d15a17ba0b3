//! Onboarding survey: a fixed sequence of stages driven one at a time.
//!
//! The sequencer owns the single in-flight session. Each completed stage is
//! synced to the remote profile store in the background, the current stage
//! is persisted so a reload resumes where the user left off, and the final
//! stage classifies the vocabulary answers and routes the user to a
//! learning destination.

pub mod answers;
pub mod classify;
pub mod collaborators;
pub mod persistence;
pub mod routes;
pub mod routing;
pub mod sequencer;
pub mod session;
pub mod stage;
pub mod sync;

pub use answers::{Answers, EnglishLevel, LevelBucket};
pub use classify::{ClassificationResult, Tier, VocabularyTally, classify};
pub use collaborators::{
    DisabledProfileStore, Navigator, RecordingNavigator, RemoteProfileStore, Role,
    SessionProvider, SessionSnapshot, StagePresenter, StageView, StaticSession,
    TrackingPresenter,
};
pub use persistence::PersistenceAdapter;
pub use routes::{SurveyRouteState, survey_routes};
pub use routing::{Destination, RoutingContext, route};
pub use sequencer::{FinalizationReport, StepOutcome, SurveyDeps, SurveySequencer, SurveyStatus};
pub use session::{PersistedResumeRecord, SessionPhase, SurveySession};
pub use stage::{Handoff, StageEdges, SurveyStageId};
pub use sync::{SkipReason, SyncAdapter, SyncEvent, SyncOutcome};
