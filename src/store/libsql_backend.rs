//! libSQL backend: async `StateStore` implementation.
//!
//! Supports a local file (state outlives the process) and an in-memory
//! database (state lives as long as the server, i.e. session-scoped).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::error::StorageError;
use crate::store::migrations;
use crate::store::traits::StateStore;

/// libSQL state store.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlStateStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStateStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Unavailable(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StorageError::Unavailable(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "State store opened");
        Ok(store)
    }

    /// Create an in-memory database.
    pub async fn new_memory() -> Result<Self, StorageError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StorageError::Unavailable(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, StorageError> {
        let conn = db
            .connect()
            .map_err(|e| StorageError::Unavailable(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[async_trait]
impl StateStore for LibSqlStateStore {
    async fn get_value(
        &self,
        scope: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT value FROM survey_state WHERE scope = ?1 AND key = ?2",
                params![scope, key],
            )
            .await
            .map_err(|e| StorageError::Query(format!("get_value: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value_str: String = row
                    .get(0)
                    .map_err(|e| StorageError::Query(format!("get_value: {e}")))?;
                serde_json::from_str(&value_str)
                    .map(Some)
                    .map_err(|e| StorageError::Corrupted {
                        key: key.to_string(),
                        reason: e.to_string(),
                    })
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("get_value: {e}"))),
        }
    }

    async fn set_value(
        &self,
        scope: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), StorageError> {
        let now = Utc::now().to_rfc3339();
        let value_str =
            serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO survey_state (scope, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (scope, key) DO UPDATE SET value = ?3, updated_at = ?4",
                params![scope, key, value_str, now],
            )
            .await
            .map_err(|e| StorageError::Query(format!("set_value: {e}")))?;

        Ok(())
    }

    async fn delete_value(&self, scope: &str, key: &str) -> Result<bool, StorageError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM survey_state WHERE scope = ?1 AND key = ?2",
                params![scope, key],
            )
            .await
            .map_err(|e| StorageError::Query(format!("delete_value: {e}")))?;
        Ok(count > 0)
    }
}
