//! A connected control-surface client and the table of all such sessions.

use super::types::OutboundMessage;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Heartbeat eviction timeout: a session that hasn't sent a heartbeat in
/// this long is considered dead (§4.8).
pub const HEARTBEAT_TIMEOUT_MS: u64 = 60_000;
/// How often the eviction sweep runs.
pub const HEARTBEAT_SWEEP_INTERVAL_MS: u64 = 30_000;
/// How often the full-state snapshot is pushed to every session.
pub const STATE_PUSH_INTERVAL_MS: u64 = 3_000;
/// How often the global heartbeat frame is pushed to every session.
pub const GLOBAL_HEARTBEAT_INTERVAL_MS: u64 = 5_000;

/// One connected client. Outbound frames are queued on `outbound`; the
/// transport layer (`transport_channel.rs`) drains it onto the real socket.
pub struct ClientSession {
    pub id: Uuid,
    pub principal: String,
    last_heartbeat_millis: AtomicU64,
    outbound: mpsc::Sender<OutboundMessage>,
    /// Service names this session currently wants state pushes and event
    /// forwarding for (§4.8). Empty until the client sends `service:subscribe`.
    subscriptions: parking_lot::RwLock<HashSet<String>>,
}

impl ClientSession {
    pub fn new(principal: impl Into<String>, now_millis: u64, outbound: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal: principal.into(),
            last_heartbeat_millis: AtomicU64::new(now_millis),
            outbound,
            subscriptions: parking_lot::RwLock::new(HashSet::new()),
        }
    }

    pub fn touch(&self, now_millis: u64) {
        self.last_heartbeat_millis.store(now_millis, Ordering::SeqCst);
    }

    pub fn is_stale(&self, now_millis: u64) -> bool {
        now_millis.saturating_sub(self.last_heartbeat_millis.load(Ordering::SeqCst)) > HEARTBEAT_TIMEOUT_MS
    }

    pub async fn send(&self, message: OutboundMessage) {
        let _ = self.outbound.send(message).await;
    }

    pub fn subscribe(&self, service: impl Into<String>) {
        self.subscriptions.write().insert(service.into());
    }

    pub fn unsubscribe(&self, service: &str) {
        self.subscriptions.write().remove(service);
    }

    pub fn is_subscribed(&self, service: &str) -> bool {
        self.subscriptions.read().contains(service)
    }

    pub fn subscribed_services(&self) -> Vec<String> {
        self.subscriptions.read().iter().cloned().collect()
    }
}

/// Table of all currently connected sessions.
#[derive(Default)]
pub struct SessionTable {
    sessions: parking_lot::RwLock<HashMap<Uuid, Arc<ClientSession>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<ClientSession>) {
        self.sessions.write().insert(session.id, session);
    }

    pub fn remove(&self, id: Uuid) {
        self.sessions.write().remove(&id);
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<ClientSession>> {
        self.sessions.read().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<Arc<ClientSession>> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict and return every session that hasn't sent a heartbeat recently.
    pub fn evict_stale(&self, now_millis: u64) -> Vec<Arc<ClientSession>> {
        let mut sessions = self.sessions.write();
        let stale_ids: Vec<Uuid> = sessions.iter().filter(|(_, s)| s.is_stale(now_millis)).map(|(id, _)| *id).collect();
        stale_ids.iter().filter_map(|id| sessions.remove(id)).collect()
    }
}
