//! Circuit breaker policy as pure functions over a stats document.
//!
//! Unlike the teacher's `execute()`-wrapping `CircuitBreakerPolicy`, this
//! breaker is not a `Future`-wrapping state machine: it is a plain data
//! record (`CircuitBreakerStats`) plus free functions that compute health,
//! reset eligibility, and backoff delay from it. The tick loop in
//! `service.rs` owns the mutation; this module only answers questions about
//! a given snapshot (design §4.1).

use crate::clock::Clock;
use crate::config::BreakerConfig;
use serde::{Deserialize, Serialize};

/// Three-state lifecycle, named to match the control-surface wire spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

/// Mutable breaker state for one service. Plain data; all transitions are
/// computed by the functions below and applied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub status: CircuitStatus,
    pub consecutive_failures: u32,
    pub opened_at_millis: Option<u64>,
    pub recovery_attempts: u32,
    pub last_failure_at_millis: Option<u64>,
}

impl Default for CircuitBreakerStats {
    fn default() -> Self {
        Self {
            status: CircuitStatus::Closed,
            consecutive_failures: 0,
            opened_at_millis: None,
            recovery_attempts: 0,
            last_failure_at_millis: None,
        }
    }
}

/// `isHealthy`: true while the breaker is closed, or half-open and still
/// allowed to take a probe. A disabled breaker is always considered healthy.
pub fn is_healthy(stats: &CircuitBreakerStats, cfg: &BreakerConfig) -> bool {
    if !cfg.enabled {
        return true;
    }
    !matches!(stats.status, CircuitStatus::Open)
}

/// `calculateBackoffDelay`: exponential backoff over `recoveryAttempts`,
/// capped by the monitoring window and floored at one second so a
/// misconfigured zero reset timeout never produces a tight retry loop.
///
/// `delay = min(resetTimeoutMs * backoffMultiplier^recoveryAttempts, monitoringWindowMs)`
pub fn calculate_backoff_delay(recovery_attempts: u32, cfg: &BreakerConfig) -> u64 {
    let multiplier = cfg.backoff_multiplier.max(1.0).powi(recovery_attempts as i32);
    let raw = (cfg.reset_timeout_ms as f64) * multiplier;
    let capped = raw.min(cfg.monitoring_window_ms as f64);
    (capped.round() as u64).max(1_000)
}

/// `shouldReset`: true once enough time has passed since the breaker opened.
/// Past `maxRecoveryAttempts`, the effective timeout keeps escalating via
/// [`calculate_backoff_delay`] rather than settling at a fixed ceiling, so a
/// persistently unhealthy dependency is probed less and less often.
pub fn should_reset(stats: &CircuitBreakerStats, cfg: &BreakerConfig, clock: &dyn Clock) -> bool {
    if stats.status != CircuitStatus::Open {
        return false;
    }
    let Some(opened_at) = stats.opened_at_millis else {
        return false;
    };
    let effective_attempts = if stats.recovery_attempts > cfg.max_recovery_attempts {
        stats.recovery_attempts
    } else {
        0
    };
    let timeout = if effective_attempts > 0 {
        calculate_backoff_delay(effective_attempts, cfg)
    } else {
        cfg.reset_timeout_ms.max(1_000)
    };
    clock.now_millis().saturating_sub(opened_at) >= timeout
}

/// `status`: current status, recomputing the Open → HalfOpen edge against
/// the clock without mutating `stats` (the tick loop applies the transition).
pub fn status(stats: &CircuitBreakerStats, cfg: &BreakerConfig, clock: &dyn Clock) -> CircuitStatus {
    if stats.status == CircuitStatus::Open && should_reset(stats, cfg, clock) {
        CircuitStatus::HalfOpen
    } else {
        stats.status
    }
}

/// Records a successful operation. In `HalfOpen`, a single success closes the
/// breaker and resets the failure/recovery counters; in `Closed`, it simply
/// resets the consecutive-failure counter.
pub fn record_success(stats: &CircuitBreakerStats) -> CircuitBreakerStats {
    CircuitBreakerStats {
        status: CircuitStatus::Closed,
        consecutive_failures: 0,
        opened_at_millis: None,
        recovery_attempts: 0,
        last_failure_at_millis: stats.last_failure_at_millis,
    }
}

/// Records a failed operation, opening the breaker once `failure_threshold`
/// consecutive failures have been observed. A failure while `HalfOpen`
/// reopens the breaker and counts as one more recovery attempt.
pub fn record_failure(stats: &CircuitBreakerStats, cfg: &BreakerConfig, clock: &dyn Clock) -> CircuitBreakerStats {
    let now = clock.now_millis();
    if !cfg.enabled {
        return CircuitBreakerStats { last_failure_at_millis: Some(now), ..stats.clone() };
    }
    match stats.status {
        CircuitStatus::HalfOpen => CircuitBreakerStats {
            status: CircuitStatus::Open,
            consecutive_failures: stats.consecutive_failures + 1,
            opened_at_millis: Some(now),
            recovery_attempts: stats.recovery_attempts + 1,
            last_failure_at_millis: Some(now),
        },
        CircuitStatus::Closed | CircuitStatus::Open => {
            let consecutive_failures = stats.consecutive_failures + 1;
            if stats.status == CircuitStatus::Closed && consecutive_failures >= cfg.failure_threshold {
                CircuitBreakerStats {
                    status: CircuitStatus::Open,
                    consecutive_failures,
                    opened_at_millis: Some(now),
                    recovery_attempts: 0,
                    last_failure_at_millis: Some(now),
                }
            } else {
                CircuitBreakerStats { consecutive_failures, last_failure_at_millis: Some(now), ..stats.clone() }
            }
        }
    }
}

/// Transition an `Open` breaker that has become eligible for a probe into
/// `HalfOpen`. No-op if `should_reset` is false.
pub fn attempt_recovery(stats: &CircuitBreakerStats, cfg: &BreakerConfig, clock: &dyn Clock) -> CircuitBreakerStats {
    if stats.status == CircuitStatus::Open && should_reset(stats, cfg, clock) {
        CircuitBreakerStats { status: CircuitStatus::HalfOpen, ..stats.clone() }
    } else {
        stats.clone()
    }
}
