//! Persistence port: an abstract store for durable service state.
//!
//! Treated as an opaque backend in this design — no concrete database
//! integration ships here (see SPEC_FULL §10, Out of scope). The in-memory
//! implementation is what the orchestrator uses by default and in tests;
//! production deployments plug in their own [`PersistencePort`].

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A service's durable state, keyed by service name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedServiceState {
    pub service: String,
    pub document: serde_json::Value,
    pub updated_at_millis: u64,
}

/// Narrow error type for persistence operations. Converted into
/// [`crate::error::SupervisionError::Persistence`] at the orchestrator
/// boundary, where it is logged and swallowed rather than propagated.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("key `{0}` not found")]
    NotFound(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Abstract durable-state store. Keys are service names; values are whole
/// documents, replaced on each `upsert` rather than merged.
#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn upsert(&self, state: PersistedServiceState) -> Result<(), PersistenceError>;
    async fn get(&self, service: &str) -> Result<Option<PersistedServiceState>, PersistenceError>;
    async fn delete(&self, service: &str) -> Result<(), PersistenceError>;
    async fn scan(&self) -> Result<Vec<PersistedServiceState>, PersistenceError>;
}

/// Default in-process implementation, backed by a `parking_lot::RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryPersistencePort {
    store: RwLock<HashMap<String, PersistedServiceState>>,
}

impl InMemoryPersistencePort {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistencePort for InMemoryPersistencePort {
    async fn upsert(&self, state: PersistedServiceState) -> Result<(), PersistenceError> {
        self.store.write().insert(state.service.clone(), state);
        Ok(())
    }

    async fn get(&self, service: &str) -> Result<Option<PersistedServiceState>, PersistenceError> {
        Ok(self.store.read().get(service).cloned())
    }

    async fn delete(&self, service: &str) -> Result<(), PersistenceError> {
        self.store.write().remove(service);
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<PersistedServiceState>, PersistenceError> {
        Ok(self.store.read().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let store = InMemoryPersistencePort::new();
        store
            .upsert(PersistedServiceState {
                service: "wallet-sync".into(),
                document: serde_json::json!({"balance": 10}),
                updated_at_millis: 1,
            })
            .await
            .unwrap();
        let fetched = store.get("wallet-sync").await.unwrap().unwrap();
        assert_eq!(fetched.document["balance"], 10);
    }

    #[tokio::test]
    async fn missing_key_returns_none_not_error() {
        let store = InMemoryPersistencePort::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_the_entry() {
        let store = InMemoryPersistencePort::new();
        store
            .upsert(PersistedServiceState { service: "x".into(), document: serde_json::json!({}), updated_at_millis: 0 })
            .await
            .unwrap();
        store.delete("x").await.unwrap();
        assert!(store.get("x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scan_returns_every_entry() {
        let store = InMemoryPersistencePort::new();
        for name in ["a", "b", "c"] {
            store
                .upsert(PersistedServiceState { service: name.into(), document: serde_json::json!({}), updated_at_millis: 0 })
                .await
                .unwrap();
        }
        assert_eq!(store.scan().await.unwrap().len(), 3);
    }
}
