//! Realtime bus: republishes orchestrator events onto the broker's
//! well-known topics for connected dashboards and other out-of-process
//! consumers (design §4.7). Sits on top of [`crate::broker::BrokerPort`] and
//! [`crate::dispatcher::EventDispatcher`] without merging the two: the
//! dispatcher decides *whether* something happened worth telling the world
//! about; this module decides *which topic* it goes out on.

use crate::broker::{channels, BrokerPort};
use crate::dispatcher::Event;
use crate::serializer::safe_serialize;
use std::sync::Arc;
use tracing::debug;

/// Maps an in-process [`Event`] kind to the broker topic it should be
/// republished on. Unrecognized kinds are not forwarded.
fn topic_for(kind: &str) -> Option<&'static str> {
    match kind {
        "service:started" | "service:stopped" | "service:restarted" => Some(channels::SERVICE_EVENTS),
        "circuit-breaker:opened" | "circuit-breaker:closed" | "circuit-breaker:half-open" => {
            Some(channels::CIRCUIT_BREAKER_EVENTS)
        }
        "service:config-updated" => Some(channels::CONFIG_EVENTS),
        _ => None,
    }
}

/// Bridges in-process events onto the broker for realtime consumers.
pub struct RealtimeBus {
    broker: Arc<dyn BrokerPort>,
}

impl RealtimeBus {
    pub fn new(broker: Arc<dyn BrokerPort>) -> Self {
        Self { broker }
    }

    /// React to a data change: an event worth telling connected clients
    /// about. Silently drops events with no mapped topic rather than
    /// erroring, since not every in-process event is meant to cross the
    /// process boundary.
    pub async fn on_data_change(&self, event: &Event) {
        let Some(topic) = topic_for(&event.kind) else {
            debug!(kind = %event.kind, "event has no realtime topic; not forwarded");
            return;
        };
        let body = safe_serialize(&serde_json::json!({
            "kind": event.kind,
            "name": event.name,
            "payload": event.payload,
            "ts_millis": event.ts_millis,
        }));
        if let Err(err) = self.broker.publish(topic, body).await {
            debug!(topic, error = %err, "realtime publish failed");
        }
    }

    /// Fan out a batch of events in order, skipping ones with no topic.
    pub async fn on_data_changes(&self, events: &[Event]) {
        for event in events {
            self.on_data_change(event).await;
        }
    }
}
