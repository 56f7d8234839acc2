//! Pub/Sub broker adapter: cross-process, async fan-out over named topics.
//!
//! Architecturally distinct from [`crate::dispatcher::EventDispatcher`]
//! (in-process, synchronous, single-threaded) — this port models a
//! publish/subscribe channel that could, in a real deployment, be backed by
//! an external broker. The in-process implementation here uses
//! `tokio::sync::broadcast`, the same primitive the teacher's
//! `StreamingSink` uses for fan-out (design §4.6).

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::SupervisionError;

/// Fixed channel-name constants so publishers and subscribers can't drift
/// apart through typos (mirrors the control surface's fixed message set).
pub mod channels {
    pub const SERVICE_EVENTS: &str = "service-events";
    pub const CIRCUIT_BREAKER_EVENTS: &str = "circuit-breaker-events";
    pub const CONFIG_EVENTS: &str = "config-events";
}

/// A message published on the broker: topic plus an arbitrary JSON body.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub topic: String,
    pub body: Value,
}

/// Abstract publish/subscribe port. A production deployment might back this
/// with NATS or Kafka; it is treated as an opaque backend here (SPEC_FULL
/// §10, Out of scope).
#[async_trait]
pub trait BrokerPort: Send + Sync {
    async fn publish(&self, topic: &str, body: Value) -> Result<(), SupervisionError>;
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BrokerMessage>;
}

/// In-process broker backed by one `broadcast` channel per topic, lazily
/// created on first publish or subscribe. Connect-style failures (modeled
/// here as a publish with no live receivers needing a retry) are retried
/// with a bounded backoff: `min(n * 50ms, 2000ms)`, up to 3 attempts.
pub struct InProcessBroker {
    capacity: usize,
    channels: parking_lot::Mutex<std::collections::HashMap<String, broadcast::Sender<BrokerMessage>>>,
    dropped: Arc<AtomicU64>,
}

impl InProcessBroker {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, channels: parking_lot::Mutex::new(std::collections::HashMap::new()), dropped: Arc::new(AtomicU64::new(0)) }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<BrokerMessage> {
        let mut channels = self.channels.lock();
        channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn retry_delay(attempt: u32) -> Duration {
        Duration::from_millis((attempt as u64 * 50).min(2_000))
    }
}

#[async_trait]
impl BrokerPort for InProcessBroker {
    async fn publish(&self, topic: &str, body: Value) -> Result<(), SupervisionError> {
        const MAX_ATTEMPTS: u32 = 3;
        let message = BrokerMessage { topic: topic.to_string(), body };
        let mut last_err: Option<String> = None;
        for attempt in 1..=MAX_ATTEMPTS {
            let sender = self.sender_for(topic);
            match sender.send(message.clone()) {
                Ok(_) => return Ok(()),
                Err(broadcast::error::SendError(_)) => {
                    // No live receivers yet; this is the adapter's stand-in
                    // for a transient connect failure, so it is retried.
                    last_err = Some("no active subscribers".to_string());
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(Self::retry_delay(attempt)).await;
                    }
                }
            }
        }
        self.dropped.fetch_add(1, Ordering::Relaxed);
        warn!(topic, "broker publish dropped after retries exhausted");
        Err(SupervisionError::Broker { channel: topic.to_string(), reason: last_err.unwrap_or_default() })
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BrokerMessage> {
        self.sender_for(topic).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_an_existing_subscriber() {
        let broker = InProcessBroker::new(16);
        let mut rx = broker.subscribe(channels::SERVICE_EVENTS);
        broker.publish(channels::SERVICE_EVENTS, serde_json::json!({"x": 1})).await.unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.topic, channels::SERVICE_EVENTS);
        assert_eq!(msg.body["x"], 1);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_retries_then_errors() {
        let broker = InProcessBroker::new(4);
        let err = broker.publish("unsubscribed-topic", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, SupervisionError::Broker { .. }));
        assert_eq!(broker.dropped_count(), 1);
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive_the_message() {
        let broker = InProcessBroker::new(16);
        let mut rx1 = broker.subscribe(channels::CONFIG_EVENTS);
        let mut rx2 = broker.subscribe(channels::CONFIG_EVENTS);
        broker.publish(channels::CONFIG_EVENTS, serde_json::json!({"k": "v"})).await.unwrap();
        assert_eq!(rx1.recv().await.unwrap().body["k"], "v");
        assert_eq!(rx2.recv().await.unwrap().body["k"], "v");
    }

    #[test]
    fn retry_delay_is_capped_at_two_seconds() {
        assert_eq!(InProcessBroker::retry_delay(1), Duration::from_millis(50));
        assert_eq!(InProcessBroker::retry_delay(10), Duration::from_millis(500));
        assert_eq!(InProcessBroker::retry_delay(1000), Duration::from_millis(2_000));
    }
}
