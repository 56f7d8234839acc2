//! Convenience re-exports of the crate's public surface.

pub use crate::adaptive::Adaptive;
pub use crate::alerting::{Alert, AlertSeverity, AlertingPort, LoggingAlerting, NullAlerting};
pub use crate::audit::{AuditAction, AuditOutcome, AuditPort, AuditRecord, InMemoryAuditLog};
pub use crate::breaker::{
    attempt_recovery, calculate_backoff_delay, is_healthy, record_failure, record_success, should_reset, status,
    CircuitBreakerStats, CircuitStatus,
};
pub use crate::broker::{channels, BrokerMessage, BrokerPort, InProcessBroker};
pub use crate::clock::{Clock, ManualClock, MonotonicClock};
pub use crate::config::{
    ActiveProfile, BackoffSettings, BreakerConfig, OrchestratorSettings, ServiceConfig, ServiceIdentity,
    ServiceLayer, ServiceMetadata,
};
pub use crate::dispatcher::{DispatcherGroup, Event, EventDispatcher, SubscriptionId};
pub use crate::error::{ErrorCode, SupervisionError};
pub use crate::persistence::{InMemoryPersistencePort, PersistedServiceState, PersistenceError, PersistencePort};
pub use crate::realtime::RealtimeBus;
pub use crate::registry::ServiceRegistry;
pub use crate::serializer::{exceeds_budget, noisy_service_digest, safe_serialize};
pub use crate::service::{LifecycleState, ServiceContract, ServiceRuntime};
pub use crate::sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use crate::stats::{HistoryEntry, OperationCounts, PerformanceStats, ServiceStats};

#[cfg(feature = "control")]
pub use crate::control::{
    AllowAllAuthenticator, AuthError, Authenticator, ClientSession, ControlSurface, InboundMessage, OriginAllowList,
    OutboundMessage, SessionChannel, SessionTable, StaticTokenAuthenticator, TransportError,
};
