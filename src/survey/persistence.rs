//! Persistence adapter: the sequencer's single handle on durable state.
//!
//! All operations are best-effort: failures are logged and swallowed.
//! Losing the resume record degrades to "start from stage 1".

use std::sync::Arc;

use tracing::{debug, warn};

use crate::store::StateStore;

use super::answers::Answers;
use super::session::PersistedResumeRecord;

/// Keys under which survey state is stored within a scope.
pub mod state_keys {
    /// `PersistedResumeRecord` JSON.
    pub const RESUME: &str = "survey_resume";
    /// Accumulated `Answers` JSON.
    pub const ANSWERS: &str = "survey_answers";
}

#[derive(Clone)]
pub struct PersistenceAdapter {
    store: Arc<dyn StateStore>,
    scope: String,
}

impl PersistenceAdapter {
    pub fn new(store: Arc<dyn StateStore>, scope: impl Into<String>) -> Self {
        Self {
            store,
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub async fn save(&self, record: &PersistedResumeRecord) {
        let value = match serde_json::to_value(record) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to serialize resume record: {}", e);
                return;
            }
        };
        if let Err(e) = self
            .store
            .set_value(&self.scope, state_keys::RESUME, &value)
            .await
        {
            warn!(scope = %self.scope, "Failed to persist resume record: {}", e);
        }
    }

    /// Load the resume record. Unreadable or unknown-stage records are
    /// treated as absent.
    pub async fn load(&self) -> Option<PersistedResumeRecord> {
        let value = match self.store.get_value(&self.scope, state_keys::RESUME).await {
            Ok(Some(v)) => v,
            Ok(None) => return None,
            Err(e) => {
                warn!(scope = %self.scope, "Failed to read resume record: {}", e);
                return None;
            }
        };
        match serde_json::from_value::<PersistedResumeRecord>(value) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(scope = %self.scope, "Ignoring unreadable resume record: {}", e);
                None
            }
        }
    }

    /// Load the raw `in_progress` flag even when the stage id is unreadable,
    /// so a corrupted record can still fall back to the first stage.
    pub async fn load_in_progress_flag(&self) -> bool {
        match self.store.get_value(&self.scope, state_keys::RESUME).await {
            Ok(Some(v)) => v
                .get("in_progress")
                .and_then(|f| f.as_bool())
                .unwrap_or(false),
            _ => false,
        }
    }

    pub async fn save_answers(&self, answers: &Answers) {
        let value = match serde_json::to_value(answers) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to serialize survey answers: {}", e);
                return;
            }
        };
        if let Err(e) = self
            .store
            .set_value(&self.scope, state_keys::ANSWERS, &value)
            .await
        {
            warn!(scope = %self.scope, "Failed to persist survey answers: {}", e);
        }
    }

    /// Load previously saved answers; a missing or corrupted blob is empty.
    pub async fn load_answers(&self) -> Answers {
        match self.store.get_value(&self.scope, state_keys::ANSWERS).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                debug!(scope = %self.scope, "Ignoring unreadable survey answers: {}", e);
                Answers::new()
            }),
            Ok(None) => Answers::new(),
            Err(e) => {
                warn!(scope = %self.scope, "Failed to read survey answers: {}", e);
                Answers::new()
            }
        }
    }

    /// Remove the resume record and saved answers.
    pub async fn clear(&self) {
        for key in [state_keys::RESUME, state_keys::ANSWERS] {
            if let Err(e) = self.store.delete_value(&self.scope, key).await {
                warn!(scope = %self.scope, key, "Failed to clear survey state: {}", e);
            }
        }
    }
}
