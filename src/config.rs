//! Service identity, configuration records, and environment-driven settings.
//!
//! Concrete service implementations are expressed as independent types that
//! compose [`crate::service::ServiceContract`] rather than extending a base
//! class; this module holds the fixed configuration records those types and
//! the [`crate::registry::ServiceRegistry`] read from (design §9, "dynamic
//! per-object maps used as configs").

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Stable textual identity for a service. Interned as a plain `String` rather
/// than an index since the registry is small (tens of services, not millions).
pub type ServiceIdentity = String;

/// Deployment layer. Initialization and cleanup both respect this fixed
/// ordering: infrastructure services come up first and tear down last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceLayer {
    Infrastructure,
    Data,
    Contest,
    Wallet,
}

impl ServiceLayer {
    /// Fixed traversal order used by [`crate::registry::ServiceRegistry`].
    pub const ORDER: [ServiceLayer; 4] =
        [ServiceLayer::Infrastructure, ServiceLayer::Data, ServiceLayer::Contest, ServiceLayer::Wallet];
}

/// Immutable-at-runtime metadata describing a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceMetadata {
    pub name: ServiceIdentity,
    pub display_name: String,
    pub layer: ServiceLayer,
    /// Operator-facing severity; optional in the original source, so this
    /// defaults to 0 rather than being wrapped in `Option` (see SPEC_FULL §9).
    #[serde(default)]
    pub critical_level: u32,
    pub description: String,
    pub dependencies: BTreeSet<ServiceIdentity>,
}

impl ServiceMetadata {
    pub fn new(name: impl Into<String>, layer: ServiceLayer) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            layer,
            critical_level: 0,
            description: String::new(),
            dependencies: BTreeSet::new(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_critical_level(mut self, level: u32) -> Self {
        self.critical_level = level;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Linear backoff-curve parameters shared by retry scheduling in the base
/// service contract (distinct from the circuit breaker's own backoff, §4.1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackoffSettings {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self { initial_delay_ms: 500, max_delay_ms: 30_000, factor: 2.0 }
    }
}

/// Circuit breaker configuration, `BreakerConfig` in the data model (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub health_check_interval_ms: u64,
    pub monitoring_window_ms: u64,
    pub max_recovery_attempts: u32,
    pub backoff_multiplier: f64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            health_check_interval_ms: 30_000,
            monitoring_window_ms: 300_000,
            max_recovery_attempts: 5,
            backoff_multiplier: 2.0,
        }
    }
}

/// Full per-service configuration record, `Service Configuration` in §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: ServiceIdentity,
    pub check_interval_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub backoff: BackoffSettings,
    pub circuit_breaker: BreakerConfig,
    pub layer: ServiceLayer,
    pub critical_level: u32,
    pub dependencies: BTreeSet<ServiceIdentity>,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>, layer: ServiceLayer, check_interval_ms: u64) -> Self {
        Self {
            name: name.into(),
            check_interval_ms,
            max_retries: 3,
            retry_delay_ms: 1_000,
            backoff: BackoffSettings::default(),
            circuit_breaker: BreakerConfig::default(),
            layer,
            critical_level: 0,
            dependencies: BTreeSet::new(),
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Merge a partial JSON patch into this config without discarding
    /// unrelated fields (see §8 boundary behavior for `service:config-update`).
    pub fn merge_patch(&self, patch: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut current = serde_json::to_value(self)?;
        merge_json(&mut current, patch);
        serde_json::from_value(current)
    }
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(patch_map)) => {
            for (k, v) in patch_map {
                merge_json(base_map.entry(k.clone()).or_insert(serde_json::Value::Null), v);
            }
        }
        (base_slot, patch_val) => {
            *base_slot = patch_val.clone();
        }
    }
}

/// Named runtime profile selecting which services are enabled. Disabled
/// services are non-fatal for their dependents (glossary: Active Profile).
#[derive(Debug, Clone, Default)]
pub struct ActiveProfile {
    name: String,
    disabled: BTreeSet<ServiceIdentity>,
}

impl ActiveProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), disabled: BTreeSet::new() }
    }

    pub fn disable(mut self, service: impl Into<String>) -> Self {
        self.disabled.insert(service.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_disabled(&self, service: &str) -> bool {
        self.disabled.contains(service)
    }
}

/// Environment-driven configuration inputs (§6). Unknown keys are ignored:
/// `config`/`dotenvy` deserialize only the recognized fields below.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default = "default_broker_url")]
    pub broker_url: String,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_profile")]
    pub active_profile: String,
    #[serde(default)]
    pub debug_flags: Vec<String>,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_broker_url() -> String {
    "memory://local".to_string()
}

fn default_profile() -> String {
    "default".to_string()
}

fn default_shutdown_timeout_ms() -> u64 {
    10_000
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            broker_url: default_broker_url(),
            allowed_origins: Vec::new(),
            active_profile: default_profile(),
            debug_flags: Vec::new(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl OrchestratorSettings {
    /// Load settings from `.env` (via `dotenvy`) and the process environment
    /// (via the `config` crate), falling back to defaults for anything unset.
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();
        let cfg = config::Config::builder()
            .set_default("broker_url", default_broker_url())?
            .set_default("active_profile", default_profile())?
            .set_default("shutdown_timeout_ms", default_shutdown_timeout_ms() as i64)?
            .add_source(
                config::Environment::default()
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("allowed_origins")
                    .with_list_parse_key("debug_flags"),
            )
            .build()?;
        cfg.try_deserialize()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn has_debug_flag(&self, flag: &str) -> bool {
        self.debug_flags.iter().any(|f| f == flag)
    }
}
