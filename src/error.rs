//! Error types for the supervision plane.

use std::fmt;

/// Error codes surfaced on the supervisory control surface wire protocol.
///
/// These mirror the `error.code` values a connected dashboard is expected to
/// switch on; never renumber or rename a variant once it ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    UnknownCommand,
    MissingService,
    MissingConfig,
    ServiceNotFound,
    SessionError,
    ServiceStartError,
    ServiceStopError,
    ServiceRestartError,
    CircuitBreakerResetError,
    ConfigUpdateError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self).ok().and_then(|v| v.as_str().map(str::to_owned));
        write!(f, "{}", s.unwrap_or_else(|| "UNKNOWN".to_string()))
    }
}

/// Unified error taxonomy for the supervision plane (see design §7).
///
/// Each variant corresponds to one of the nine distinct error kinds the
/// specification calls out. Variants carry enough context to be logged via
/// `tracing` and, where relevant, rendered as a control-surface error frame.
#[derive(Debug, thiserror::Error)]
pub enum SupervisionError {
    /// A precondition was violated at boot: missing dependency metadata,
    /// a cyclic dependency graph, or invalid configuration.
    #[error("initialization failed for `{service}`: {reason}")]
    Initialization { service: String, reason: String },

    /// `onPerformOperation` failed for a running service. Feeds the circuit
    /// breaker; never unwinds the supervisor.
    #[error("operation failed for `{service}`: {source}")]
    Operation { service: String, source: Box<dyn std::error::Error + Send + Sync> },

    /// A bad inbound control-surface frame. The session is preserved.
    #[error("invalid control frame: {0}")]
    Validation(String),

    /// The pub/sub broker rejected a publish/subscribe call.
    #[error("broker error on channel `{channel}`: {reason}")]
    Broker { channel: String, reason: String },

    /// The persistence port failed. Logged and swallowed at the Orchestrator
    /// boundary; in-memory state remains authoritative.
    #[error("persistence error for key `{key}`: {reason}")]
    Persistence { key: String, reason: String },

    /// The operation was skipped because the breaker is open.
    #[error("circuit breaker open for `{service}`")]
    CircuitOpen { service: String },

    /// A dependency could not be initialized and is not `disabled_by_config`.
    #[error("dependency `{dependency}` of `{service}` failed to initialize")]
    Dependency { service: String, dependency: String },

    /// The service (or a dependency) is intentionally disabled by the active
    /// profile. Non-fatal; recorded as `disabled_by_config`.
    #[error("service `{0}` disabled by active profile")]
    DisabledByProfile(String),

    /// An admin API was called with an invalid state transition (already
    /// running, already stopped, etc).
    #[error("invalid lifecycle transition for `{service}`: {reason}")]
    Lifecycle { service: String, reason: String },
}

impl SupervisionError {
    pub fn initialization(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Initialization { service: service.into(), reason: reason.into() }
    }

    pub fn dependency(service: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::Dependency { service: service.into(), dependency: dependency.into() }
    }

    pub fn lifecycle(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Lifecycle { service: service.into(), reason: reason.into() }
    }

    /// The control-surface error code a given variant maps to. Every variant
    /// has a code: the wire protocol always needs something to switch on,
    /// even for kinds the orchestrator mostly logs and swallows internally.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Initialization { .. } => ErrorCode::ServiceStartError,
            Self::Operation { .. } => ErrorCode::ServiceStartError,
            Self::Validation(_) => ErrorCode::MissingConfig,
            Self::Broker { .. } => ErrorCode::SessionError,
            Self::Persistence { .. } => ErrorCode::SessionError,
            Self::CircuitOpen { .. } => ErrorCode::CircuitBreakerResetError,
            Self::Dependency { .. } => ErrorCode::MissingService,
            Self::DisabledByProfile(_) => ErrorCode::MissingService,
            Self::Lifecycle { .. } => ErrorCode::ServiceStartError,
        }
    }

    /// True if this kind is expected to be swallowed at the Orchestrator
    /// boundary rather than propagated (see the propagation policy in §7).
    pub fn is_swallowed_by_orchestrator(&self) -> bool {
        matches!(self, Self::Persistence { .. } | Self::DisabledByProfile(_))
    }
}
