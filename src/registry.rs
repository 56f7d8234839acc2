//! Service registry and orchestrator: dependency-ordered initialization,
//! parallel tick scheduling, admin actions, and event-driven reactions.

use crate::alerting::AlertingPort;
use crate::audit::{AuditAction, AuditOutcome, AuditPort, AuditRecord};
use crate::config::{ActiveProfile, ServiceLayer, ServiceMetadata};
use crate::dispatcher::{Event, EventDispatcher};
use crate::error::SupervisionError;
use crate::persistence::{PersistedServiceState, PersistencePort};
use crate::serializer::safe_serialize;
use crate::service::{LifecycleState, ServiceRuntime};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{info, instrument, warn};

struct Registration {
    metadata: ServiceMetadata,
    runtime: Arc<ServiceRuntime>,
}

/// Owns every registered service, its dependency graph, and the ambient
/// ports (persistence/audit/alerting). The single place that knows the
/// global initialization order (design §2, §5).
pub struct ServiceRegistry {
    services: HashMap<String, Registration>,
    dispatcher: Arc<EventDispatcher>,
    persistence: Arc<dyn PersistencePort>,
    audit: Arc<dyn AuditPort>,
    alerting: Arc<dyn AlertingPort>,
    profile: ActiveProfile,
}

/// Event kinds that mutate a service's durable state or are worth forwarding
/// to a connected control surface (§4.5).
const REACTIVE_EVENT_KINDS: [&str; 8] = [
    "service:initialized",
    "service:started",
    "service:stopped",
    "service:error",
    "service:heartbeat",
    "circuit-breaker:opened",
    "circuit-breaker:closed",
    "circuit-breaker:half-open",
];

impl ServiceRegistry {
    pub fn new(
        dispatcher: Arc<EventDispatcher>,
        persistence: Arc<dyn PersistencePort>,
        audit: Arc<dyn AuditPort>,
        alerting: Arc<dyn AlertingPort>,
        profile: ActiveProfile,
    ) -> Self {
        Self::wire_persistence_reactions(&dispatcher, persistence.clone());
        Self { services: HashMap::new(), dispatcher, persistence, audit, alerting, profile }
    }

    /// Subscribes the durable store to every lifecycle/breaker event so a
    /// service's persisted record stays current without every call site
    /// remembering to persist by hand (§4.5, "event reaction").
    fn wire_persistence_reactions(dispatcher: &EventDispatcher, persistence: Arc<dyn PersistencePort>) {
        for kind in REACTIVE_EVENT_KINDS {
            let persistence = persistence.clone();
            dispatcher.on(kind, move |event: &Event| {
                let persistence = persistence.clone();
                let state = PersistedServiceState {
                    service: event.name.clone(),
                    document: safe_serialize(&event.payload),
                    updated_at_millis: event.ts_millis,
                };
                tokio::spawn(async move {
                    if let Err(err) = persistence.upsert(state).await {
                        warn!(error = %err, "failed to persist service state from event reaction");
                    }
                });
            });
        }
    }

    /// Registers a service. Rejects (and leaves the registry unchanged) a
    /// service with no name or one whose dependencies would introduce a
    /// cycle in the resulting graph (§4.5).
    pub fn register(
        &mut self,
        metadata: ServiceMetadata,
        runtime: Arc<ServiceRuntime>,
    ) -> Result<(), SupervisionError> {
        if metadata.name.is_empty() {
            return Err(SupervisionError::initialization("<unnamed>", "service name must not be empty"));
        }
        let name = metadata.name.clone();
        let previous = self.services.insert(name.clone(), Registration { metadata, runtime });
        if self.has_cycle() {
            match previous {
                Some(prev) => {
                    self.services.insert(name.clone(), prev);
                }
                None => {
                    self.services.remove(&name);
                }
            }
            return Err(SupervisionError::initialization(
                name,
                "registering this service would introduce a dependency cycle",
            ));
        }
        Ok(())
    }

    /// Incremental cycle check run on every `register` call, so a cyclic
    /// graph is rejected at the point it's introduced rather than discovered
    /// later at `initialize_all` time.
    fn has_cycle(&self) -> bool {
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(name: &str, services: &HashMap<String, Registration>, marks: &mut HashMap<String, Mark>) -> bool {
            match marks.get(name) {
                Some(Mark::Done) => return false,
                Some(Mark::Visiting) => return true,
                None => {}
            }
            marks.insert(name.to_string(), Mark::Visiting);
            if let Some(reg) = services.get(name) {
                for dep in &reg.metadata.dependencies {
                    if services.contains_key(dep.as_str()) && visit(dep, services, marks) {
                        return true;
                    }
                }
            }
            marks.insert(name.to_string(), Mark::Done);
            false
        }

        let mut marks = HashMap::new();
        self.services.keys().any(|name| visit(name, &self.services, &mut marks))
    }

    pub fn get(&self, name: &str) -> Option<Arc<ServiceRuntime>> {
        self.services.get(name).map(|r| r.runtime.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    /// Bounded-size catalog of every registered service's metadata, for the
    /// control surface's `get:service-catalog` (§4.8).
    pub fn catalog(&self) -> Value {
        let entries: Vec<Value> = self
            .services
            .values()
            .map(|reg| {
                serde_json::json!({
                    "name": reg.metadata.name,
                    "display_name": reg.metadata.display_name,
                    "layer": reg.metadata.layer,
                    "critical_level": reg.metadata.critical_level,
                    "description": reg.metadata.description,
                    "dependencies": reg.metadata.dependencies,
                })
            })
            .collect();
        safe_serialize(&Value::Array(entries))
    }

    /// The full dependency graph, name to declared dependency names, for the
    /// control surface's `get:dependency-graph` and connect-time push (§4.8).
    pub fn dependency_graph(&self) -> Value {
        let mut graph = serde_json::Map::new();
        for (name, reg) in &self.services {
            graph.insert(name.clone(), serde_json::json!(reg.metadata.dependencies));
        }
        safe_serialize(&Value::Object(graph))
    }

    /// Writes a service's current lifecycle state, stats, and config to the
    /// persistence port through a sanitized, bounded document (§4.5).
    async fn persist(&self, name: &str) {
        let Some(reg) = self.services.get(name) else { return };
        let document = safe_serialize(&serde_json::json!({
            "state": reg.runtime.state(),
            "stats": reg.runtime.stats_snapshot(),
            "config": reg.runtime.config().as_ref(),
        }));
        let state = PersistedServiceState { service: name.to_string(), document, updated_at_millis: 0 };
        if let Err(err) = self.persistence.upsert(state).await {
            warn!(service = name, error = %err, "failed to persist service state");
        }
    }

    /// Topologically sort registered services: primary key is declared
    /// dependency order, secondary key is [`ServiceLayer::ORDER`] so that,
    /// among services with no ordering constraint between them,
    /// infrastructure comes up before data, contest, and wallet.
    fn initialization_order(&self) -> Result<Vec<String>, SupervisionError> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for (name, reg) in &self.services {
            let name = name.as_str();
            in_degree.entry(name).or_insert(0);
            for dep in &reg.metadata.dependencies {
                let dep = dep.as_str();
                if !self.services.contains_key(dep) {
                    return Err(SupervisionError::initialization(
                        name,
                        format!("unknown dependency `{dep}`"),
                    ));
                }
                *in_degree.entry(name).or_insert(0) += 1;
                dependents.entry(dep).or_default().push(name);
            }
        }

        let mut ready: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&name, _)| name)
            .collect();
        // Stable, deterministic ordering among equally-ready nodes: layer
        // order first, then name.
        let sort_ready = |ready: &mut VecDeque<&str>| {
            let mut v: Vec<&str> = ready.drain(..).collect();
            v.sort_by_key(|n| (self.services.get(*n).unwrap().metadata.layer, n.to_string()));
            *ready = v.into();
        };
        sort_ready(&mut ready);

        let mut order = Vec::with_capacity(self.services.len());
        let mut remaining_degree = in_degree.clone();
        while let Some(name) = ready.pop_front() {
            order.push(name.to_string());
            if let Some(deps) = dependents.get(name) {
                for &dependent in deps {
                    let deg = remaining_degree.get_mut(dependent).unwrap();
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
            sort_ready(&mut ready);
        }

        if order.len() != self.services.len() {
            let stuck: Vec<&str> =
                remaining_degree.iter().filter(|(_, &d)| d > 0).map(|(&n, _)| n).collect();
            return Err(SupervisionError::initialization(
                stuck.join(","),
                "dependency cycle detected",
            ));
        }
        Ok(order)
    }

    /// Initialize every service in dependency order. A service disabled by
    /// the active profile is skipped (non-fatal, recorded as
    /// `DisabledByProfile`); a dependency failure that is not itself a
    /// profile-disable is fatal for the dependent.
    #[instrument(skip(self))]
    pub async fn initialize_all(&self) -> Result<(), SupervisionError> {
        let order = self.initialization_order()?;
        let mut failed: HashSet<String> = HashSet::new();
        let mut disabled: HashSet<String> = HashSet::new();

        for name in order {
            if self.profile.is_disabled(&name) {
                disabled.insert(name.clone());
                info!(service = %name, "skipped: disabled by active profile");
                continue;
            }
            let reg = self.services.get(name.as_str()).expect("name came from initialization_order");
            let blocked_dep = reg.metadata.dependencies.iter().find(|d| failed.contains(*d));
            if let Some(dep) = blocked_dep {
                if disabled.contains(dep.as_str()) {
                    // A disabled dependency is tolerated; proceed.
                } else {
                    failed.insert(name.clone());
                    warn!(service = %name, dependency = %dep, "skipped: dependency failed to initialize");
                    continue;
                }
            }
            match reg.runtime.initialize().await {
                Ok(()) => {
                    reg.runtime.start()?;
                    self.persist(&name).await;
                    self.dispatcher.emit(&Event::new(
                        "service:started",
                        name.clone(),
                        serde_json::json!({"service": name.clone()}),
                        0,
                    ));
                }
                Err(err) => {
                    failed.insert(name.clone());
                    warn!(service = %name, error = %err, "initialization failed");
                }
            }
        }
        Ok(())
    }

    /// Run one tick of every started service, in parallel, without waiting
    /// for a slow service to block the others (design §5), then persist each
    /// service's resulting state.
    pub async fn tick_all(&self) {
        let runtimes: Vec<(String, Arc<ServiceRuntime>)> = self
            .services
            .iter()
            .filter(|(_, r)| matches!(r.runtime.state(), LifecycleState::Started | LifecycleState::BreakerOpen))
            .map(|(name, r)| (name.clone(), r.runtime.clone()))
            .collect();
        let handles: Vec<_> = runtimes
            .iter()
            .map(|(_, rt)| {
                let rt = rt.clone();
                tokio::spawn(async move { rt.tick().await })
            })
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
        for (name, _) in &runtimes {
            self.persist(name).await;
        }
    }

    /// Stop every running service in reverse initialization order.
    pub async fn cleanup_all(&self) -> Result<(), SupervisionError> {
        let mut order = self.initialization_order()?;
        order.reverse();
        for name in order {
            if let Some(reg) = self.services.get(&name) {
                if matches!(reg.runtime.state(), LifecycleState::Started | LifecycleState::BreakerOpen) {
                    reg.runtime.stop().await?;
                }
            }
        }
        Ok(())
    }

    async fn audit(&self, action: AuditAction, principal: &str, outcome: AuditOutcome) {
        self.audit
            .record(AuditRecord { action, principal: principal.to_string(), ts_millis: 0, outcome })
            .await;
    }

    pub async fn start_service(&self, name: &str, principal: &str) -> Result<(), SupervisionError> {
        let runtime = self.get(name).ok_or_else(|| SupervisionError::lifecycle(name, "service not found"))?;
        let result = runtime.start();
        let outcome = if result.is_ok() { AuditOutcome::Succeeded } else { AuditOutcome::Failed };
        self.audit(AuditAction::ServiceStart { service: name.to_string() }, principal, outcome).await;
        if result.is_ok() {
            self.persist(name).await;
        }
        result
    }

    pub async fn stop_service(&self, name: &str, principal: &str) -> Result<(), SupervisionError> {
        let runtime = self.get(name).ok_or_else(|| SupervisionError::lifecycle(name, "service not found"))?;
        let result = runtime.stop().await;
        let outcome = if result.is_ok() { AuditOutcome::Succeeded } else { AuditOutcome::Failed };
        self.audit(AuditAction::ServiceStop { service: name.to_string() }, principal, outcome).await;
        if result.is_ok() {
            self.persist(name).await;
        }
        result
    }

    pub async fn restart_service(&self, name: &str, principal: &str) -> Result<(), SupervisionError> {
        let runtime = self.get(name).ok_or_else(|| SupervisionError::lifecycle(name, "service not found"))?;
        let stop_result = runtime.stop().await;
        if let Err(err) = stop_result {
            self.audit(AuditAction::ServiceRestart { service: name.to_string() }, principal, AuditOutcome::Failed)
                .await;
            return Err(err);
        }
        runtime.start()?;
        self.audit(AuditAction::ServiceRestart { service: name.to_string() }, principal, AuditOutcome::Succeeded)
            .await;
        self.persist(name).await;
        Ok(())
    }

    pub async fn reset_circuit_breaker(&self, name: &str, principal: &str) -> Result<(), SupervisionError> {
        let runtime = self.get(name).ok_or_else(|| SupervisionError::lifecycle(name, "service not found"))?;
        runtime.reset_circuit_breaker();
        self.audit(AuditAction::CircuitBreakerReset { service: name.to_string() }, principal, AuditOutcome::Succeeded)
            .await;
        self.persist(name).await;
        Ok(())
    }

    pub async fn update_config(&self, name: &str, patch: Value, principal: &str) -> Result<(), SupervisionError> {
        let runtime = self.get(name).ok_or_else(|| SupervisionError::lifecycle(name, "service not found"))?;
        let result = runtime.update_config(&patch);
        let outcome = if result.is_ok() { AuditOutcome::Succeeded } else { AuditOutcome::Failed };
        self.audit(AuditAction::ConfigUpdate { service: name.to_string(), patch }, principal, outcome).await;
        if result.is_ok() {
            self.persist(name).await;
        }
        result
    }

    pub fn dispatcher(&self) -> Arc<EventDispatcher> {
        self.dispatcher.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::NullAlerting;
    use crate::audit::InMemoryAuditLog;
    use crate::clock::ManualClock;
    use crate::config::ServiceConfig;
    use crate::persistence::InMemoryPersistencePort;
    use crate::service::ServiceContract;
    use async_trait::async_trait;

    struct NoOpService;

    #[async_trait]
    impl ServiceContract for NoOpService {
        async fn on_perform_operation(&self) -> Result<Value, SupervisionError> {
            Ok(Value::Null)
        }
    }

    fn registry() -> ServiceRegistry {
        ServiceRegistry::new(
            Arc::new(EventDispatcher::new()),
            Arc::new(InMemoryPersistencePort::new()),
            Arc::new(InMemoryAuditLog::new(100)),
            Arc::new(NullAlerting),
            ActiveProfile::new("default"),
        )
    }

    fn runtime_for(name: &str, layer: ServiceLayer) -> Arc<ServiceRuntime> {
        let clock = Arc::new(ManualClock::new());
        Arc::new(ServiceRuntime::new(name, Arc::new(NoOpService), ServiceConfig::new(name, layer, 1_000), clock))
    }

    #[tokio::test]
    async fn initialization_respects_dependency_order() {
        let mut reg = registry();
        let infra = ServiceMetadata::new("infra", ServiceLayer::Infrastructure);
        let data = ServiceMetadata::new("data", ServiceLayer::Data).with_dependencies(["infra"]);
        reg.register(infra, runtime_for("infra", ServiceLayer::Infrastructure)).unwrap();
        reg.register(data, runtime_for("data", ServiceLayer::Data)).unwrap();
        reg.initialize_all().await.unwrap();
        assert_eq!(reg.get("infra").unwrap().state(), LifecycleState::Started);
        assert_eq!(reg.get("data").unwrap().state(), LifecycleState::Started);
    }

    #[tokio::test]
    async fn dependency_cycle_is_rejected_at_registration() {
        let mut reg = registry();
        let a = ServiceMetadata::new("a", ServiceLayer::Data).with_dependencies(["b"]);
        let b = ServiceMetadata::new("b", ServiceLayer::Data).with_dependencies(["a"]);
        reg.register(a, runtime_for("a", ServiceLayer::Data)).unwrap();
        let err = reg.register(b, runtime_for("b", ServiceLayer::Data)).unwrap_err();
        assert!(matches!(err, SupervisionError::Initialization { .. }));
        assert_eq!(reg.names(), vec!["a".to_string()], "the cyclic registration must leave the registry unchanged");
    }

    #[tokio::test]
    async fn disabled_service_is_skipped_without_failing_dependents() {
        let mut reg = ServiceRegistry::new(
            Arc::new(EventDispatcher::new()),
            Arc::new(InMemoryPersistencePort::new()),
            Arc::new(InMemoryAuditLog::new(100)),
            Arc::new(NullAlerting),
            ActiveProfile::new("minimal").disable("optional"),
        );
        let optional = ServiceMetadata::new("optional", ServiceLayer::Data);
        let dependent = ServiceMetadata::new("dependent", ServiceLayer::Data).with_dependencies(["optional"]);
        reg.register(optional, runtime_for("optional", ServiceLayer::Data)).unwrap();
        reg.register(dependent, runtime_for("dependent", ServiceLayer::Data)).unwrap();
        reg.initialize_all().await.unwrap();
        assert_eq!(reg.get("optional").unwrap().state(), LifecycleState::Uninstalled);
        assert_eq!(reg.get("dependent").unwrap().state(), LifecycleState::Started);
    }

    #[tokio::test]
    async fn admin_restart_stops_then_starts() {
        let mut reg = registry();
        let meta = ServiceMetadata::new("svc", ServiceLayer::Data);
        reg.register(meta, runtime_for("svc", ServiceLayer::Data)).unwrap();
        reg.initialize_all().await.unwrap();
        reg.restart_service("svc", "operator").await.unwrap();
        assert_eq!(reg.get("svc").unwrap().state(), LifecycleState::Started);
    }

    #[tokio::test]
    async fn unknown_service_admin_action_errors() {
        let reg = registry();
        let err = reg.start_service("nope", "operator").await.unwrap_err();
        assert!(matches!(err, SupervisionError::Lifecycle { .. }));
    }

    #[tokio::test]
    async fn catalog_and_dependency_graph_reflect_registered_services() {
        let mut reg = registry();
        let infra = ServiceMetadata::new("infra", ServiceLayer::Infrastructure);
        let data = ServiceMetadata::new("data", ServiceLayer::Data).with_dependencies(["infra"]);
        reg.register(infra, runtime_for("infra", ServiceLayer::Infrastructure)).unwrap();
        reg.register(data, runtime_for("data", ServiceLayer::Data)).unwrap();

        let catalog = reg.catalog();
        assert_eq!(catalog.as_array().unwrap().len(), 2);

        let graph = reg.dependency_graph();
        assert_eq!(graph["data"].as_array().unwrap().len(), 1);
        assert_eq!(graph["data"][0], "infra");
        assert!(graph["infra"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn initializing_a_service_persists_its_state() {
        let persistence = Arc::new(InMemoryPersistencePort::new());
        let mut reg = ServiceRegistry::new(
            Arc::new(EventDispatcher::new()),
            persistence.clone(),
            Arc::new(InMemoryAuditLog::new(100)),
            Arc::new(NullAlerting),
            ActiveProfile::new("default"),
        );
        let meta = ServiceMetadata::new("svc", ServiceLayer::Data);
        reg.register(meta, runtime_for("svc", ServiceLayer::Data)).unwrap();
        reg.initialize_all().await.unwrap();

        let stored = persistence.get("svc").await.unwrap();
        assert!(stored.is_some(), "start_service should leave a persisted record behind");
    }
}
