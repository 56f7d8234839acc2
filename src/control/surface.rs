//! The supervisory control surface: dispatches inbound wire messages to the
//! [`ServiceRegistry`] and drives the periodic state/heartbeat broadcasters.

use super::auth::{AuthError, Authenticator};
use super::session::{
    ClientSession, SessionTable, GLOBAL_HEARTBEAT_INTERVAL_MS, HEARTBEAT_SWEEP_INTERVAL_MS, STATE_PUSH_INTERVAL_MS,
};
use super::types::{InboundMessage, OutboundMessage};
use crate::clock::Clock;
use crate::dispatcher::Event;
use crate::error::ErrorCode;
use crate::registry::ServiceRegistry;
use crate::serializer::safe_serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Lifecycle and breaker event kinds forwarded to subscribed sessions as
/// `service:update` frames (§4.8).
const FORWARDED_EVENT_KINDS: [&str; 8] = [
    "service:initialized",
    "service:started",
    "service:stopped",
    "service:error",
    "service:heartbeat",
    "circuit-breaker:opened",
    "circuit-breaker:closed",
    "circuit-breaker:half-open",
];

/// Owns the session table and the registry it fronts. Cloneable handle;
/// the periodic broadcaster tasks and each session's receive loop all hold
/// one of these.
#[derive(Clone)]
pub struct ControlSurface {
    sessions: Arc<SessionTable>,
    registry: Arc<ServiceRegistry>,
    clock: Arc<dyn Clock>,
    authenticator: Arc<dyn Authenticator>,
}

impl ControlSurface {
    pub fn new(registry: Arc<ServiceRegistry>, clock: Arc<dyn Clock>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self { sessions: Arc::new(SessionTable::new()), registry, clock, authenticator }
    }

    pub fn sessions(&self) -> Arc<SessionTable> {
        self.sessions.clone()
    }

    pub fn register_session(&self, session: Arc<ClientSession>) {
        self.sessions.insert(session);
    }

    /// Authenticate an inbound connection, register its session, and send
    /// the connect-time handshake: a `welcome` frame followed by the current
    /// dependency graph (§4.8).
    pub async fn connect(
        &self,
        token: &str,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> Result<Arc<ClientSession>, AuthError> {
        let principal = self.authenticator.authenticate(token)?;
        let now = self.clock.now_millis();
        let session = Arc::new(ClientSession::new(principal, now, outbound));
        self.sessions.insert(session.clone());
        session.send(OutboundMessage::Welcome { session_id: session.id, principal: session.principal.clone() }).await;
        session.send(OutboundMessage::DependencyGraph { graph: self.registry.dependency_graph() }).await;
        Ok(session)
    }

    /// Handle one inbound frame from a session, returning the reply to send
    /// directly back to that session (periodic broadcasts are separate).
    pub async fn handle_inbound(&self, session: &ClientSession, message: InboundMessage) -> OutboundMessage {
        match message {
            InboundMessage::Heartbeat => {
                session.touch(self.clock.now_millis());
                OutboundMessage::Ack { request: "heartbeat".to_string() }
            }
            InboundMessage::RequestSnapshot => self.snapshot_message(),
            InboundMessage::ServiceStart { service } => {
                let result = self.registry.start_service(&service, &session.principal).await;
                Self::admin_reply(&service, result, ErrorCode::ServiceStartError)
            }
            InboundMessage::ServiceStop { service } => {
                let result = self.registry.stop_service(&service, &session.principal).await;
                Self::admin_reply(&service, result, ErrorCode::ServiceStopError)
            }
            InboundMessage::ServiceRestart { service } => {
                let result = self.registry.restart_service(&service, &session.principal).await;
                Self::admin_reply(&service, result, ErrorCode::ServiceRestartError)
            }
            InboundMessage::CircuitBreakerReset { service } => {
                let result = self.registry.reset_circuit_breaker(&service, &session.principal).await;
                Self::admin_reply(&service, result, ErrorCode::CircuitBreakerResetError)
            }
            InboundMessage::ConfigUpdate { service, patch } => {
                let result = self.registry.update_config(&service, patch, &session.principal).await;
                Self::admin_reply(&service, result, ErrorCode::ConfigUpdateError)
            }
            InboundMessage::ServiceSubscribe { service } => {
                session.subscribe(service.clone());
                OutboundMessage::Ack { request: format!("subscribe:{service}") }
            }
            InboundMessage::ServiceUnsubscribe { service } => {
                session.unsubscribe(&service);
                OutboundMessage::Ack { request: format!("unsubscribe:{service}") }
            }
            InboundMessage::GetServiceCatalog => OutboundMessage::ServiceCatalog { services: self.registry.catalog() },
            InboundMessage::GetServiceState { service } => self.service_state_message(&service),
            InboundMessage::GetAllStates => self.snapshot_message(),
            InboundMessage::GetDependencyGraph => {
                OutboundMessage::DependencyGraph { graph: self.registry.dependency_graph() }
            }
        }
    }

    /// Translate an admin action's result into the corresponding outbound
    /// frame. A "service not found" failure always wins out over the more
    /// specific per-action error code, since the caller asked about a
    /// service the registry has never heard of.
    fn admin_reply(
        service: &str,
        result: Result<(), crate::error::SupervisionError>,
        action_error: ErrorCode,
    ) -> OutboundMessage {
        match result {
            Ok(()) => OutboundMessage::Ack { request: service.to_string() },
            Err(err) => {
                let code = if err.to_string().contains("service not found") {
                    ErrorCode::ServiceNotFound
                } else {
                    action_error
                };
                OutboundMessage::error(code, err.to_string())
            }
        }
    }

    fn snapshot_message(&self) -> OutboundMessage {
        let mut services = serde_json::Map::new();
        for name in self.registry.names() {
            if let Some(runtime) = self.registry.get(&name) {
                let stats = runtime.stats_snapshot();
                services.insert(name, serde_json::to_value(&stats).unwrap_or(serde_json::Value::Null));
            }
        }
        OutboundMessage::StateSnapshot { services: safe_serialize(&serde_json::Value::Object(services)) }
    }

    fn service_state(&self, service: &str) -> Option<serde_json::Value> {
        self.registry.get(service).map(|runtime| {
            safe_serialize(&serde_json::json!({
                "lifecycle": runtime.state(),
                "stats": runtime.stats_snapshot(),
            }))
        })
    }

    /// Answers `get:service-state`.
    fn service_state_message(&self, service: &str) -> OutboundMessage {
        match self.service_state(service) {
            Some(state) => OutboundMessage::ServiceState { service: service.to_string(), state },
            None => OutboundMessage::error(ErrorCode::ServiceNotFound, format!("no such service `{service}`")),
        }
    }

    /// A push to a subscriber: either the periodic state push or a reaction
    /// to a dispatcher event for `service`.
    fn service_update_message(&self, service: &str) -> Option<OutboundMessage> {
        self.service_state(service).map(|state| OutboundMessage::ServiceUpdate { service: service.to_string(), state })
    }

    /// Subscribe to the registry's dispatcher so every subscribed session
    /// sees a `service:update` frame as soon as the event fires, not just on
    /// the next periodic state push (§4.5, §4.8).
    fn wire_event_forwarding(self: &Arc<Self>) {
        for kind in FORWARDED_EVENT_KINDS {
            let surface = self.clone();
            self.registry.dispatcher().on(kind, move |event: &Event| {
                let surface = surface.clone();
                let service = event.name.clone();
                tokio::spawn(async move {
                    let Some(message) = surface.service_update_message(&service) else { return };
                    for session in surface.sessions.all() {
                        if session.is_subscribed(&service) {
                            session.send(message.clone()).await;
                        }
                    }
                });
            });
        }
    }

    /// Spawn the three periodic background loops: state push, global
    /// heartbeat, and stale-session eviction. Returns their join handles so
    /// a caller can abort them on shutdown.
    pub fn spawn_broadcasters(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        self.wire_event_forwarding();

        let state_push = {
            let surface = self.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_millis(STATE_PUSH_INTERVAL_MS));
                loop {
                    ticker.tick().await;
                    for session in surface.sessions.all() {
                        for service in session.subscribed_services() {
                            if let Some(message) = surface.service_update_message(&service) {
                                session.send(message).await;
                            }
                        }
                    }
                }
            })
        };

        let heartbeat = {
            let surface = self.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_millis(GLOBAL_HEARTBEAT_INTERVAL_MS));
                loop {
                    ticker.tick().await;
                    let frame = OutboundMessage::GlobalHeartbeat { ts_millis: surface.clock.now_millis() };
                    for session in surface.sessions.all() {
                        session.send(frame.clone()).await;
                    }
                }
            })
        };

        let eviction = {
            let surface = self.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_millis(HEARTBEAT_SWEEP_INTERVAL_MS));
                loop {
                    ticker.tick().await;
                    let now = surface.clock.now_millis();
                    let evicted = surface.sessions.evict_stale(now);
                    for session in &evicted {
                        info!(session = %session.id, principal = %session.principal, "session evicted: heartbeat timeout");
                    }
                }
            })
        };

        vec![state_push, heartbeat, eviction]
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn evict(&self, id: Uuid) {
        self.sessions.remove(id);
    }

    pub fn warn_unknown(&self, session_id: Uuid) {
        warn!(session = %session_id, "received frame from an unregistered session");
    }
}
