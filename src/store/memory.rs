//! In-process state store. Lives exactly as long as the process, which
//! matches the "survives a reload, not a restart" lifetime of the resume
//! record.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::store::traits::StateStore;

#[derive(Default)]
pub struct MemoryStateStore {
    values: RwLock<HashMap<(String, String), serde_json::Value>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_value(
        &self,
        scope: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        let values = self.values.read().await;
        Ok(values.get(&(scope.to_string(), key.to_string())).cloned())
    }

    async fn set_value(
        &self,
        scope: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), StorageError> {
        let mut values = self.values.write().await;
        values.insert((scope.to_string(), key.to_string()), value.clone());
        Ok(())
    }

    async fn delete_value(&self, scope: &str, key: &str) -> Result<bool, StorageError> {
        let mut values = self.values.write().await;
        Ok(values
            .remove(&(scope.to_string(), key.to_string()))
            .is_some())
    }
}
