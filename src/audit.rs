//! Audit port: a durable log of admin actions taken through the control
//! surface (start/stop/restart, config updates, breaker resets).

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One admin action, as it would be replayed to reconstruct "who did what".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditAction {
    ServiceStart { service: String },
    ServiceStop { service: String },
    ServiceRestart { service: String },
    CircuitBreakerReset { service: String },
    ConfigUpdate { service: String, patch: serde_json::Value },
}

/// A recorded audit entry: the action, who performed it, and when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: AuditAction,
    pub principal: String,
    pub ts_millis: u64,
    pub outcome: AuditOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Succeeded,
    Failed,
}

#[async_trait]
pub trait AuditPort: Send + Sync {
    async fn record(&self, record: AuditRecord);
    async fn recent(&self, limit: usize) -> Vec<AuditRecord>;
}

/// Bounded in-memory audit log, the default wiring for a single-process
/// deployment. Oldest entries are dropped once `capacity` is exceeded.
pub struct InMemoryAuditLog {
    capacity: usize,
    entries: Mutex<std::collections::VecDeque<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: Mutex::new(std::collections::VecDeque::new()) }
    }
}

#[async_trait]
impl AuditPort for InMemoryAuditLog {
    async fn record(&self, record: AuditRecord) {
        let mut entries = self.entries.lock();
        entries.push_back(record);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    async fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        let entries = self.entries.lock();
        entries.iter().rev().take(limit).cloned().collect()
    }
}
