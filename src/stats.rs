//! Per-service runtime statistics (§3 `ServiceStats`).

use crate::breaker::CircuitBreakerStats;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum number of history entries retained per service before the oldest
/// are dropped; keeps a long-running process from growing this unbounded
/// (the "noisy services" fast path in `serializer.rs` exists precisely
/// because operation counts can otherwise run into the millions).
const MAX_HISTORY: usize = 200;

/// Counters for total/ succeeded/ failed operations.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OperationCounts {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl OperationCounts {
    pub fn record_success(&mut self) {
        self.total += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self) {
        self.total += 1;
        self.failed += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }
}

/// Rolling performance numbers. `average_duration_ms` is an exponential
/// moving average rather than a true mean, so it stays O(1) to update.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub average_duration_ms: f64,
    pub last_duration_ms: u64,
    pub max_duration_ms: u64,
}

impl PerformanceStats {
    const EMA_ALPHA: f64 = 0.2;

    pub fn record(&mut self, duration_ms: u64) {
        self.last_duration_ms = duration_ms;
        self.max_duration_ms = self.max_duration_ms.max(duration_ms);
        if self.average_duration_ms == 0.0 {
            self.average_duration_ms = duration_ms as f64;
        } else {
            self.average_duration_ms =
                Self::EMA_ALPHA * duration_ms as f64 + (1.0 - Self::EMA_ALPHA) * self.average_duration_ms;
        }
    }
}

/// One entry in a service's bounded operation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts_millis: u64,
    pub succeeded: bool,
    pub duration_ms: u64,
    pub detail: Option<String>,
}

/// Full stats document for a single service, as exposed over the control
/// surface and realtime bus (subject to `serializer::safe_serialize`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub operations: OperationCounts,
    pub performance: PerformanceStats,
    pub circuit_breaker: CircuitBreakerStats,
    #[serde(with = "history_as_vec")]
    pub history: VecDeque<HistoryEntry>,
}

impl Default for ServiceStats {
    fn default() -> Self {
        Self {
            operations: OperationCounts::default(),
            performance: PerformanceStats::default(),
            circuit_breaker: CircuitBreakerStats::default(),
            history: VecDeque::new(),
        }
    }
}

impl ServiceStats {
    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.history.push_back(entry);
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
    }
}

mod history_as_vec {
    use super::HistoryEntry;
    use serde::{Deserializer, Serializer};
    use std::collections::VecDeque;

    pub fn serialize<S>(history: &VecDeque<HistoryEntry>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde::Serialize::serialize(&Vec::from_iter(history.iter().cloned()), serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<VecDeque<HistoryEntry>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v: Vec<HistoryEntry> = serde::Deserialize::deserialize(deserializer)?;
        Ok(VecDeque::from(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_counts_track_success_rate() {
        let mut counts = OperationCounts::default();
        counts.record_success();
        counts.record_success();
        counts.record_failure();
        assert_eq!(counts.total, 3);
        assert!((counts.success_rate() - (2.0 / 3.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_operation_counts_report_full_success_rate() {
        assert_eq!(OperationCounts::default().success_rate(), 1.0);
    }

    #[test]
    fn performance_stats_track_max_and_last() {
        let mut perf = PerformanceStats::default();
        perf.record(10);
        perf.record(50);
        perf.record(20);
        assert_eq!(perf.last_duration_ms, 20);
        assert_eq!(perf.max_duration_ms, 50);
    }

    #[test]
    fn history_is_bounded() {
        let mut stats = ServiceStats::default();
        for i in 0..(MAX_HISTORY + 25) {
            stats.push_history(HistoryEntry { ts_millis: i as u64, succeeded: true, duration_ms: 1, detail: None });
        }
        assert_eq!(stats.history.len(), MAX_HISTORY);
        assert_eq!(stats.history.front().unwrap().ts_millis, 25);
    }
}
