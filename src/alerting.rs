//! Alerting port: an abstract sink for operator-facing notifications
//! (circuit breaker opens, services that never recover, dependency failures
//! at boot). Out of scope to ship a concrete pager/Slack integration here
//! (SPEC_FULL §10, Out of scope); the default implementations just log.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub service: String,
    pub severity: AlertSeverity,
    pub message: String,
}

#[async_trait]
pub trait AlertingPort: Send + Sync {
    async fn notify(&self, alert: Alert);
}

/// Drops every alert. Useful for tests that don't care about side channels.
#[derive(Debug, Default)]
pub struct NullAlerting;

#[async_trait]
impl AlertingPort for NullAlerting {
    async fn notify(&self, _alert: Alert) {}
}

/// Logs alerts via `tracing` at a level derived from severity. The default
/// wiring for a single-process deployment with no external alerting system.
#[derive(Debug, Default)]
pub struct LoggingAlerting;

#[async_trait]
impl AlertingPort for LoggingAlerting {
    async fn notify(&self, alert: Alert) {
        match alert.severity {
            AlertSeverity::Critical => {
                tracing::error!(service = %alert.service, "{}", alert.message)
            }
            AlertSeverity::Warning => warn!(service = %alert.service, "{}", alert.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_alerting_accepts_any_alert_without_panicking() {
        let sink = NullAlerting;
        sink.notify(Alert { service: "x".into(), severity: AlertSeverity::Critical, message: "down".into() }).await;
    }

    #[tokio::test]
    async fn logging_alerting_does_not_panic_on_either_severity() {
        let sink = LoggingAlerting;
        sink.notify(Alert { service: "x".into(), severity: AlertSeverity::Warning, message: "degraded".into() }).await;
        sink.notify(Alert { service: "x".into(), severity: AlertSeverity::Critical, message: "down".into() }).await;
    }
}
