//! Fixed wire-protocol message types for the supervisory control surface.
//!
//! Deliberately a closed, tagged enum rather than an extensible `Command`
//! trait registry: the protocol has a small, known set of operations, and a
//! fixed enum lets `serde` reject anything else at the deserialization
//! boundary instead of needing a runtime command lookup (design §9, resolved
//! open question).

use crate::error::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A frame sent from a connected client (dashboard, CLI) to the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Heartbeat,
    ServiceStart { service: String },
    ServiceStop { service: String },
    ServiceRestart { service: String },
    CircuitBreakerReset { service: String },
    ConfigUpdate { service: String, patch: Value },
    /// Ask for an immediate state snapshot rather than waiting for the next
    /// periodic push.
    RequestSnapshot,
    /// Subscribe to a single service's state pushes and event forwarding.
    ServiceSubscribe { service: String },
    ServiceUnsubscribe { service: String },
    GetServiceCatalog,
    GetServiceState { service: String },
    GetAllStates,
    GetDependencyGraph,
}

/// A frame sent from the supervisor to a connected client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Sent once, immediately after a successful connect-time authentication.
    Welcome { session_id: Uuid, principal: String },
    Ack { request: String },
    Error { code: ErrorCode, message: String },
    StateSnapshot { services: Value },
    GlobalHeartbeat { ts_millis: u64 },
    ServiceCatalog { services: Value },
    ServiceState { service: String, state: Value },
    DependencyGraph { graph: Value },
    /// Pushed to every session subscribed to `service`, both on the periodic
    /// state push and reactively when the dispatcher sees a lifecycle or
    /// breaker event for it.
    ServiceUpdate { service: String, state: Value },
}

impl OutboundMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error { code, message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_messages_round_trip_through_json() {
        let msg = InboundMessage::ServiceStart { service: "wallet-sync".into() };
        let json = serde_json::to_string(&msg).unwrap();
        let back: InboundMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, InboundMessage::ServiceStart { service } if service == "wallet-sync"));
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let json = r#"{"type": "delete_everything"}"#;
        let result: Result<InboundMessage, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn outbound_error_carries_a_typed_code() {
        let msg = OutboundMessage::error(ErrorCode::ServiceNotFound, "no such service");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["code"], "SERVICE_NOT_FOUND");
    }

    #[test]
    fn subscribe_message_round_trips_through_json() {
        let msg = InboundMessage::ServiceSubscribe { service: "wallet-sync".into() };
        let json = serde_json::to_string(&msg).unwrap();
        let back: InboundMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, InboundMessage::ServiceSubscribe { service } if service == "wallet-sync"));
    }

    #[test]
    fn welcome_message_carries_session_id_and_principal() {
        let msg = OutboundMessage::Welcome { session_id: Uuid::new_v4(), principal: "operator".into() };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "welcome");
        assert_eq!(json["principal"], "operator");
    }
}
