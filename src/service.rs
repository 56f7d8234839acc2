//! Service contract, lifecycle state machine, and the per-service tick loop.

use crate::adaptive::Adaptive;
use crate::alerting::{Alert, AlertSeverity, AlertingPort, NullAlerting};
use crate::breaker::{self, CircuitBreakerStats, CircuitStatus};
use crate::clock::Clock;
use crate::config::ServiceConfig;
use crate::error::SupervisionError;
use crate::persistence::PersistencePort;
use crate::stats::{HistoryEntry, ServiceStats};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU8, AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle states a service passes through under supervision (§3, §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninstalled,
    Initialized,
    Started,
    /// Running, but its circuit breaker is open: the tick loop still runs,
    /// but skips calling into `on_perform_operation`.
    BreakerOpen,
    Stopped,
}

impl LifecycleState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Uninstalled => 0,
            Self::Initialized => 1,
            Self::Started => 2,
            Self::BreakerOpen => 3,
            Self::Stopped => 4,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Uninstalled,
            1 => Self::Initialized,
            2 => Self::Started,
            3 => Self::BreakerOpen,
            _ => Self::Stopped,
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Uninstalled, Initialized)
                | (Initialized, Started)
                | (Started, BreakerOpen)
                | (BreakerOpen, Started)
                | (Started, Stopped)
                | (BreakerOpen, Stopped)
                | (Initialized, Stopped)
                | (Stopped, Initialized)
        )
    }
}

/// The operation a concrete service performs each tick. Implementations are
/// independent types composed into a [`ServiceRuntime`] rather than
/// subclasses of a shared base (design §9, resolved open question).
#[async_trait]
pub trait ServiceContract: Send + Sync {
    /// Run once. Returns an arbitrary JSON result on success (subject to
    /// `serializer::safe_serialize` before it leaves the process), or an
    /// error describing the failure.
    async fn on_perform_operation(&self) -> Result<Value, SupervisionError>;

    /// Optional setup hook run once during `Initialized -> Started`.
    async fn on_initialize(&self) -> Result<(), SupervisionError> {
        Ok(())
    }

    /// Optional teardown hook run once during `Started|BreakerOpen -> Stopped`.
    async fn on_cleanup(&self) -> Result<(), SupervisionError> {
        Ok(())
    }
}

/// Wraps a concrete [`ServiceContract`] with its configuration, stats, and
/// lifecycle state, and drives its periodic tick.
pub struct ServiceRuntime {
    pub name: String,
    contract: Arc<dyn ServiceContract>,
    config: Adaptive<ServiceConfig>,
    stats: Mutex<ServiceStats>,
    state: AtomicU8,
    /// Prevents a slow operation from overlapping with the next scheduled
    /// tick for the same service (design §5: per-service non-overlap).
    ticking: AtomicBool,
    clock: Arc<dyn Clock>,
    /// Operator notification channel for circuit breaker edges (§4.4). Logs
    /// by default; a real deployment wires the same port the registry holds.
    alerting: Arc<dyn AlertingPort>,
    /// Durable state consulted during `initialize` to decide whether a
    /// fresh start should come up closed or probing (§4.4). `None` until
    /// [`Self::with_persistence`] wires one in.
    persistence: Option<Arc<dyn PersistencePort>>,
}

impl std::fmt::Debug for ServiceRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRuntime")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl ServiceRuntime {
    pub fn new(
        name: impl Into<String>,
        contract: Arc<dyn ServiceContract>,
        config: ServiceConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            contract,
            config: Adaptive::new(config),
            stats: Mutex::new(ServiceStats::default()),
            state: AtomicU8::new(LifecycleState::Uninstalled.as_u8()),
            ticking: AtomicBool::new(false),
            clock,
            alerting: Arc::new(NullAlerting),
            persistence: None,
        }
    }

    /// Wire an alerting port so breaker-open/recovered edges reach an
    /// operator channel instead of being dropped. Defaults to [`NullAlerting`].
    pub fn with_alerting(mut self, alerting: Arc<dyn AlertingPort>) -> Self {
        self.alerting = alerting;
        self
    }

    /// Wire a persistence port so `initialize` can restore the prior breaker
    /// state. Without one, every fresh init behaves as if nothing had ever
    /// been persisted (breaker starts closed).
    pub fn with_persistence(mut self, persistence: Arc<dyn PersistencePort>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, next: LifecycleState) {
        self.state.store(next.as_u8(), Ordering::SeqCst);
    }

    /// Attempt a lifecycle transition, returning an error if illegal.
    fn transition(&self, next: LifecycleState) -> Result<(), SupervisionError> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(SupervisionError::lifecycle(
                self.name.as_str(),
                format!("cannot transition from {current:?} to {next:?}"),
            ));
        }
        self.set_state(next);
        Ok(())
    }

    pub fn config(&self) -> Arc<ServiceConfig> {
        self.config.get()
    }

    pub fn update_config(&self, patch: &Value) -> Result<(), SupervisionError> {
        let current = self.config.get();
        let merged = current
            .merge_patch(patch)
            .map_err(|e| SupervisionError::Validation(format!("invalid config patch for `{}`: {e}", self.name)))?;
        self.config.set(merged);
        Ok(())
    }

    pub fn stats_snapshot(&self) -> ServiceStats {
        self.stats.lock().clone()
    }

    pub async fn initialize(&self) -> Result<(), SupervisionError> {
        self.contract.on_initialize().await?;
        self.restore_persisted_breaker_state().await;
        self.transition(LifecycleState::Initialized)
    }

    /// §4.4 initialization contract: a fresh init always clears the breaker
    /// (closed, zero consecutive failures, no open marker) rather than
    /// trusting in-memory defaults alone — then, only if the last persisted
    /// record for this service shows the breaker as having been open, comes
    /// back up in `HalfOpen` so the first tick is a cautious probe instead of
    /// resuming full traffic against a dependency that may still be down.
    async fn restore_persisted_breaker_state(&self) {
        let Some(persistence) = &self.persistence else { return };
        let prior_open = match persistence.get(&self.name).await {
            Ok(Some(record)) => Self::document_recorded_open_breaker(&record.document),
            Ok(None) => false,
            Err(err) => {
                warn!(service = %self.name, error = %err, "failed to load persisted state during init");
                false
            }
        };
        let mut stats = self.stats.lock();
        stats.circuit_breaker = CircuitBreakerStats::default();
        if prior_open {
            stats.circuit_breaker.status = CircuitStatus::HalfOpen;
        }
    }

    fn document_recorded_open_breaker(document: &Value) -> bool {
        document
            .pointer("/stats/circuit_breaker/status")
            .and_then(Value::as_str)
            .map(|s| s == "open")
            .unwrap_or(false)
    }

    pub fn start(&self) -> Result<(), SupervisionError> {
        self.transition(LifecycleState::Started)
    }

    pub async fn stop(&self) -> Result<(), SupervisionError> {
        let current = self.state();
        if current == LifecycleState::Started || current == LifecycleState::BreakerOpen {
            self.contract.on_cleanup().await?;
        }
        self.transition(LifecycleState::Stopped)
    }

    /// Run one tick: skip if already ticking (prevents overlap), skip the
    /// underlying operation if the breaker is open and not yet eligible for
    /// a probe, otherwise call `on_perform_operation` and fold the result
    /// into stats and breaker state.
    pub async fn tick(&self) {
        if self.ticking.swap(true, Ordering::SeqCst) {
            debug!(service = %self.name, "tick skipped: previous tick still running");
            return;
        }
        let result = self.tick_inner().await;
        self.ticking.store(false, Ordering::SeqCst);
        if let Err(err) = result {
            warn!(service = %self.name, error = %err, "tick failed");
        }
    }

    async fn tick_inner(&self) -> Result<(), SupervisionError> {
        let cfg = self.config.get();
        let breaker_cfg = cfg.circuit_breaker;

        let current_status = {
            let stats = self.stats.lock();
            breaker::status(&stats.circuit_breaker, &breaker_cfg, self.clock.as_ref())
        };

        if current_status == CircuitStatus::Open {
            self.set_state(LifecycleState::BreakerOpen);
            return Ok(());
        }

        if current_status == CircuitStatus::HalfOpen {
            let mut stats = self.stats.lock();
            stats.circuit_breaker = breaker::attempt_recovery(&stats.circuit_breaker, &breaker_cfg, self.clock.as_ref());
        } else if self.state() == LifecycleState::BreakerOpen {
            self.set_state(LifecycleState::Started);
        }

        let started_at = self.clock.now_millis();
        let outcome = self.contract.on_perform_operation().await;
        let duration_ms = self.clock.now_millis().saturating_sub(started_at);

        let previous_status = self.stats.lock().circuit_breaker.status;
        {
            let mut stats = self.stats.lock();
            match &outcome {
                Ok(_) => {
                    stats.operations.record_success();
                    stats.performance.record(duration_ms);
                    stats.circuit_breaker = breaker::record_success(&stats.circuit_breaker);
                    stats.push_history(HistoryEntry { ts_millis: started_at, succeeded: true, duration_ms, detail: None });
                    info!(service = %self.name, duration_ms, "operation succeeded");
                }
                Err(err) => {
                    stats.operations.record_failure();
                    stats.performance.record(duration_ms);
                    stats.circuit_breaker =
                        breaker::record_failure(&stats.circuit_breaker, &breaker_cfg, self.clock.as_ref());
                    stats.push_history(HistoryEntry {
                        ts_millis: started_at,
                        succeeded: false,
                        duration_ms,
                        detail: Some(err.to_string()),
                    });
                    warn!(service = %self.name, error = %err, "operation failed");
                }
            }
        }
        let new_status = self.stats.lock().circuit_breaker.status;

        if new_status == CircuitStatus::Open {
            self.set_state(LifecycleState::BreakerOpen);
        }

        if previous_status != CircuitStatus::Open && new_status == CircuitStatus::Open {
            self.send_breaker_alert(true).await;
        } else if previous_status == CircuitStatus::Open && new_status == CircuitStatus::Closed {
            self.send_breaker_alert(false).await;
        }

        Ok(())
    }

    /// Best-effort operator notification on a breaker state edge (§4.4): one
    /// alert when it opens, one when it fully recovers. Never fires on every
    /// tick spent sitting open or half-open — only on the transition.
    async fn send_breaker_alert(&self, down: bool) {
        let (severity, message) = if down {
            (AlertSeverity::Critical, format!("circuit breaker opened for `{}`", self.name))
        } else {
            (AlertSeverity::Warning, format!("circuit breaker recovered for `{}`", self.name))
        };
        self.alerting.notify(Alert { service: self.name.clone(), severity, message }).await;
    }

    /// Manually reset the circuit breaker (admin action, §6).
    pub fn reset_circuit_breaker(&self) {
        let mut stats = self.stats.lock();
        stats.circuit_breaker = CircuitBreakerStats::default();
        drop(stats);
        if self.state() == LifecycleState::BreakerOpen {
            self.set_state(LifecycleState::Started);
        }
    }
}
