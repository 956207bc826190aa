//! Registry of live connections, keyed by opaque id.
//!
//! The registry owns every open handle. Callers hold ids, never handles;
//! each entry's handle sits behind its own async mutex so concurrent
//! operations against the same connection serialize while operations on
//! distinct connections proceed independently.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engines::{self, EngineHandle};
use crate::error::GatewayError;
use crate::profile::{ConnectionInfo, ConnectionProfile, EngineKind};

/// One registered connection: display metadata plus the guarded handle.
pub(crate) struct RegisteredConnection {
    pub id: String,
    pub info: ConnectionInfo,
    pub engine: EngineKind,
    /// `None` once the entry has been closed out from under an in-flight
    /// operation that still holds the `Arc`.
    pub handle: Mutex<Option<Box<dyn EngineHandle>>>,
    pub created_at: DateTime<Utc>,
    last_used_at: StdMutex<DateTime<Utc>>,
}

impl std::fmt::Debug for RegisteredConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredConnection")
            .field("id", &self.id)
            .field("engine", &self.engine)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl RegisteredConnection {
    /// Stamp last use; called at dispatch time for every operation that
    /// resolves this entry.
    pub fn touch(&self) {
        if let Ok(mut at) = self.last_used_at.lock() {
            *at = Utc::now();
        }
    }

    pub fn last_used_at(&self) -> DateTime<Utc> {
        self.last_used_at
            .lock()
            .map(|at| *at)
            .unwrap_or(self.created_at)
    }
}

/// Thread-safe map of connection id to live entry.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<RegisteredConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Open a connection for the profile and register it under a fresh id.
    /// Nothing is registered when the connect attempt fails.
    pub(crate) async fn register(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<(String, ConnectionInfo), GatewayError> {
        let (handle, info) = engines::connect(profile).await?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let entry = Arc::new(RegisteredConnection {
            id: id.clone(),
            info: info.clone(),
            engine: profile.engine,
            handle: Mutex::new(Some(handle)),
            created_at: now,
            last_used_at: StdMutex::new(now),
        });

        let mut connections = self.connections.write().await;
        connections.insert(id.clone(), entry);
        info!(connection_id = %id, engine = %profile.engine, "connection registered");
        Ok((id, info))
    }

    /// Look an entry up by id.
    pub(crate) async fn entry(&self, id: &str) -> Result<Arc<RegisteredConnection>, GatewayError> {
        let connections = self.connections.read().await;
        connections
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::connection_not_found(id))
    }

    /// Remove an entry and shut its handle down. A second close of the
    /// same id fails with `NotFound`.
    pub async fn close(&self, id: &str) -> Result<(), GatewayError> {
        let entry = {
            let mut connections = self.connections.write().await;
            connections
                .remove(id)
                .ok_or_else(|| GatewayError::connection_not_found(id))?
        };

        // Any in-flight operation finishes before the handle is taken.
        let handle = entry.handle.lock().await.take();
        if let Some(handle) = handle {
            handle.close().await?;
        }
        info!(connection_id = %id, "connection closed");
        Ok(())
    }

    /// Number of live connections.
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Display metadata for every live connection, in no particular order.
    pub async fn list(&self) -> Vec<(String, ConnectionInfo)> {
        self.connections
            .read()
            .await
            .values()
            .map(|entry| (entry.id.clone(), entry.info.clone()))
            .collect()
    }

    /// Close every live connection, logging rather than failing on
    /// individual shutdown errors.
    pub async fn close_all(&self) {
        let entries: Vec<Arc<RegisteredConnection>> = {
            let mut connections = self.connections.write().await;
            connections.drain().map(|(_, entry)| entry).collect()
        };

        for entry in entries {
            debug!(connection_id = %entry.id, "closing connection");
            let handle = entry.handle.lock().await.take();
            if let Some(handle) = handle {
                if let Err(err) = handle.close().await {
                    warn!(connection_id = %entry.id, error = %err, "close failed");
                }
            }
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn sqlite_profile(path: &Path) -> ConnectionProfile {
        ConnectionProfile {
            name: "test".to_string(),
            engine: EngineKind::Sqlite,
            color: None,
            path: Some(path.to_path_buf()),
            host: None,
            port: None,
            username: None,
            password: None,
            database: None,
        }
    }

    #[tokio::test]
    async fn test_register_and_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        std::fs::File::create(&path).unwrap();

        let registry = ConnectionRegistry::new();
        let (id, info) = registry.register(&sqlite_profile(&path)).await.unwrap();
        assert_eq!(info.database, "test.db");
        assert_eq!(registry.count().await, 1);

        registry.close(&id).await.unwrap();
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_second_close_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        std::fs::File::create(&path).unwrap();

        let registry = ConnectionRegistry::new();
        let (id, _) = registry.register(&sqlite_profile(&path)).await.unwrap();

        registry.close(&id).await.unwrap();
        let err = registry.close(&id).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert_eq!(err.to_string(), format!("Connection not found: {id}"));
    }

    #[tokio::test]
    async fn test_failed_register_leaves_registry_unchanged() {
        let registry = ConnectionRegistry::new();
        let err = registry
            .register(&sqlite_profile(Path::new("/nowhere/missing.db")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert!(err.to_string().starts_with("Database file not found: "));
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_touch_moves_last_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        std::fs::File::create(&path).unwrap();

        let registry = ConnectionRegistry::new();
        let (id, _) = registry.register(&sqlite_profile(&path)).await.unwrap();
        let entry = registry.entry(&id).await.unwrap();

        let before = entry.last_used_at();
        assert_eq!(before, entry.created_at);
        entry.touch();
        assert!(entry.last_used_at() >= before);
    }

    #[tokio::test]
    async fn test_unknown_id_lookup() {
        let registry = ConnectionRegistry::new();
        let err = registry.entry("no-such-id").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
