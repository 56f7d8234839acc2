#![forbid(unsafe_code)]

//! # sentrymesh
//!
//! A service supervision and circuit-breaker orchestration plane with a
//! realtime event bus.
//!
//! Concrete services implement [`service::ServiceContract`] and are
//! registered with a [`registry::ServiceRegistry`], which initializes them
//! in dependency order, ticks each one on its own schedule, and tracks a
//! pure-function circuit breaker ([`breaker`]) per service. In-process
//! reactions go through the synchronous [`dispatcher::EventDispatcher`];
//! cross-process fan-out goes through the async [`broker`] and
//! [`realtime`] bus — the two are deliberately kept separate (see
//! `dispatcher`'s module docs). An optional JSON-frame [`control`] surface
//! exposes admin actions and a live state feed to connected dashboards.
//!
//! ## Quick start
//!
//! ```rust
//! use async_trait::async_trait;
//! use sentrymesh::clock::MonotonicClock;
//! use sentrymesh::config::{ServiceConfig, ServiceLayer, ServiceMetadata};
//! use sentrymesh::error::SupervisionError;
//! use sentrymesh::registry::ServiceRegistry;
//! use sentrymesh::service::{ServiceContract, ServiceRuntime};
//! use sentrymesh::alerting::NullAlerting;
//! use sentrymesh::audit::InMemoryAuditLog;
//! use sentrymesh::config::ActiveProfile;
//! use sentrymesh::dispatcher::EventDispatcher;
//! use sentrymesh::persistence::InMemoryPersistencePort;
//! use std::sync::Arc;
//!
//! struct HealthCheck;
//!
//! #[async_trait]
//! impl ServiceContract for HealthCheck {
//!     async fn on_perform_operation(&self) -> Result<serde_json::Value, SupervisionError> {
//!         Ok(serde_json::json!({"ok": true}))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SupervisionError> {
//!     let mut registry = ServiceRegistry::new(
//!         Arc::new(EventDispatcher::new()),
//!         Arc::new(InMemoryPersistencePort::new()),
//!         Arc::new(InMemoryAuditLog::new(1_000)),
//!         Arc::new(NullAlerting),
//!         ActiveProfile::new("default"),
//!     );
//!     let clock = Arc::new(MonotonicClock::default());
//!     let metadata = ServiceMetadata::new("health-check", ServiceLayer::Infrastructure);
//!     let config = ServiceConfig::new("health-check", ServiceLayer::Infrastructure, 5_000);
//!     let runtime = Arc::new(ServiceRuntime::new("health-check", Arc::new(HealthCheck), config, clock));
//!     registry.register(metadata, runtime)?;
//!     registry.initialize_all().await?;
//!     registry.tick_all().await;
//!     Ok(())
//! }
//! ```

pub mod adaptive;
pub mod alerting;
pub mod audit;
pub mod breaker;
pub mod broker;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod persistence;
pub mod realtime;
pub mod registry;
pub mod serializer;
pub mod sleeper;
pub mod service;
pub mod stats;

#[cfg(feature = "control")]
pub mod control;

pub mod prelude;
