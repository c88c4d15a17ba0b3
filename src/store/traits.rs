//! `StateStore` trait: scoped key/value persistence for survey state.

use async_trait::async_trait;

use crate::error::StorageError;

/// Backend-agnostic store for small JSON blobs keyed by `(scope, key)`.
///
/// A scope is one browser tab / client session. Implementations must make
/// writes idempotent: the last writer wins.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch a value. `Ok(None)` if the key was never written or was cleared.
    async fn get_value(
        &self,
        scope: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StorageError>;

    /// Insert or replace a value.
    async fn set_value(
        &self,
        scope: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), StorageError>;

    /// Remove a value. Returns whether anything was removed.
    async fn delete_value(&self, scope: &str, key: &str) -> Result<bool, StorageError>;
}
