//! Service Manager: registration, dependency-ordered lifecycle, and health
//! supervision for a set of services.
//!
//! Ties [`ServiceRegistry`] (the catalog) to [`HealthMonitor`] (the
//! supervisor). Start/stop ordering is resolved once per call from the
//! registry's current dependency graph via a depth-first topological sort
//! with three-color cycle detection, the same shape the teacher's
//! `retry.rs` backoff schedule builds iteratively rather than recursively —
//! here recursion is bounded by service count, which is expected to stay
//! small, so the straightforward recursive DFS is kept.

use crate::config::ServiceManagerConfig;
use crate::error::CoreError;
use crate::event::{EventBus, PublishOptions};
use crate::health::{HealthEvent, HealthMonitor};
use crate::metrics::{MetricsSink, NullMetrics};
use crate::registry::{ServiceConfig, ServiceRegistry, ServiceSnapshot, ServiceState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

pub struct ServiceManager {
    registry: Arc<ServiceRegistry>,
    health: Arc<HealthMonitor>,
    health_task: std::sync::Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    health_bridge_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ServiceManager {
    pub fn new(config: ServiceManagerConfig) -> Self {
        Self::with_metrics(config, Arc::new(NullMetrics))
    }

    pub fn with_metrics(config: ServiceManagerConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        let registry = Arc::new(ServiceRegistry::new());
        let health = Arc::new(HealthMonitor::new(registry.clone(), config, metrics));
        Self { registry, health, health_task: std::sync::Mutex::new(None), health_bridge_task: std::sync::Mutex::new(None) }
    }

    /// Routes health transitions onto `tx` instead of dropping them. Prefer
    /// [`Self::with_event_bus`], which wires this straight to
    /// `service.health.<id>` publishes; this lower-level constructor is for
    /// embedders that want the raw [`HealthEvent`] stream instead.
    pub fn with_health_events(config: ServiceManagerConfig, metrics: Arc<dyn MetricsSink>, tx: UnboundedSender<HealthEvent>) -> Self {
        let registry = Arc::new(ServiceRegistry::new());
        let health = Arc::new(HealthMonitor::new(registry.clone(), config, metrics).with_event_sink(tx));
        Self { registry, health, health_task: std::sync::Mutex::new(None), health_bridge_task: std::sync::Mutex::new(None) }
    }

    /// Bridges every health transition onto `events` as a
    /// `service.health.<id>` publish, per §4.1/§6. Spawns a forwarding task
    /// that lives until [`Self::shutdown`] is called.
    pub fn with_event_bus(config: ServiceManagerConfig, metrics: Arc<dyn MetricsSink>, events: Arc<EventBus>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<HealthEvent>();
        let registry = Arc::new(ServiceRegistry::new());
        let health = Arc::new(HealthMonitor::new(registry.clone(), config, metrics).with_event_sink(tx));

        let bridge = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let topic = format!("service.health.{}", event.service);
                let payload = serde_json::json!({
                    "service": event.service,
                    "healthy": event.healthy,
                    "circuitState": circuit_state_label(event.circuit_state),
                });
                if let Err(e) = events.publish(topic, payload, PublishOptions::default()).await {
                    tracing::warn!(service = %event.service, error = %e, "failed to publish health transition");
                }
            }
        });

        Self {
            registry,
            health,
            health_task: std::sync::Mutex::new(None),
            health_bridge_task: std::sync::Mutex::new(Some(bridge)),
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn register(&self, config: ServiceConfig) -> Result<Uuid, CoreError> {
        self.registry.register(config)
    }

    pub fn status(&self, id: Uuid) -> Option<ServiceSnapshot> {
        self.registry.get(id)
    }

    pub fn list(&self) -> Vec<ServiceSnapshot> {
        self.registry.list()
    }

    pub fn circuit_state(&self, id: Uuid) -> Option<crate::circuit_breaker::CircuitState> {
        self.health.circuit_state(id)
    }

    /// Starts `id` directly. Callers wanting automatic dependency-ordered
    /// startup should use [`Self::start_all`]; this still enforces the §3
    /// invariant that a service may only enter `running` once all of its
    /// declared dependencies are already `running` — it just doesn't start
    /// them for you.
    pub async fn start(&self, id: Uuid) -> Result<(), CoreError> {
        let snapshot = self
            .registry
            .get(id)
            .ok_or_else(|| CoreError::InvalidConfig(format!("no such service {id}")))?;
        if !snapshot.state.can_start() {
            return Err(CoreError::InvalidConfig(format!(
                "service {} cannot start from state {}",
                snapshot.name,
                snapshot.state.as_str()
            )));
        }

        let dependencies = self.registry.resolve_dependencies(id)?;
        if let Some(dep) = dependencies.iter().find(|d| d.state != ServiceState::Running) {
            return Err(CoreError::InvalidConfig(format!(
                "service {} cannot start: dependency {} is {} (must be running)",
                snapshot.name,
                dep.name,
                dep.state.as_str()
            )));
        }

        self.registry.set_state(id, ServiceState::Starting)?;
        let handler = self.registry.get_handler(id).expect("handler present for registered service");
        match handler.start().await {
            Ok(()) => {
                self.registry.set_state(id, ServiceState::Running)?;
                if let Err(e) = self.health.check_one(id).await {
                    tracing::warn!(service = %id, name = %snapshot.name, error = %e, "post-start health probe failed");
                }
                tracing::info!(service = %id, name = %snapshot.name, "service started");
                Ok(())
            }
            Err(e) => {
                self.registry.set_state(id, ServiceState::Failed)?;
                tracing::error!(service = %id, name = %snapshot.name, error = %e, "service failed to start");
                Err(e)
            }
        }
    }

    /// Invokes the service's `stop` callback. A callback error is logged but
    /// still lands the service in `stopped` (so dependents are free to stop
    /// too) unless the callback explicitly rejects with
    /// [`CoreError::FatalStop`], which instead marks the service `failed`
    /// and is propagated to the caller.
    pub async fn stop(&self, id: Uuid) -> Result<(), CoreError> {
        let snapshot = self
            .registry
            .get(id)
            .ok_or_else(|| CoreError::InvalidConfig(format!("no such service {id}")))?;

        self.registry.set_state(id, ServiceState::Stopping)?;
        let handler = self.registry.get_handler(id).expect("handler present for registered service");
        match handler.stop().await {
            Ok(()) => {
                self.registry.set_state(id, ServiceState::Stopped)?;
                tracing::info!(service = %id, name = %snapshot.name, "service stopped");
                Ok(())
            }
            Err(e @ CoreError::FatalStop { .. }) => {
                self.registry.set_state(id, ServiceState::Failed)?;
                tracing::error!(service = %id, name = %snapshot.name, error = %e, "service rejected shutdown fatally");
                Err(e)
            }
            Err(e) => {
                self.registry.set_state(id, ServiceState::Stopped)?;
                tracing::warn!(service = %id, name = %snapshot.name, error = %e, "service stop callback failed, marking stopped anyway");
                Ok(())
            }
        }
    }

    /// Starts every registered service, dependencies first. Fails fast with
    /// `CircularDependency` if the dependency graph has a cycle; otherwise
    /// stops at the first service whose `start` fails and returns that
    /// error, leaving already-started services running.
    pub async fn start_all(&self) -> Result<(), CoreError> {
        let order = self.topological_order()?;
        for id in order {
            self.start(id).await?;
        }
        Ok(())
    }

    /// Stops every registered service in reverse dependency order (the
    /// services nothing else depends on are stopped first).
    pub async fn stop_all(&self) -> Result<(), CoreError> {
        let mut order = self.topological_order()?;
        order.reverse();
        for id in order {
            self.stop(id).await?;
        }
        Ok(())
    }

    /// Depth-first topological sort over the registry's current dependency
    /// graph, by name (dependencies are declared by name, resolved to ids
    /// here). Three-color marking: unvisited → `Visiting` → `Done`;
    /// encountering a `Visiting` node again means a cycle.
    fn topological_order(&self) -> Result<Vec<Uuid>, CoreError> {
        let services = self.registry.list();
        let name_to_id: HashMap<&str, Uuid> = services.iter().map(|s| (s.name.as_str(), s.id)).collect();

        let mut marks: HashMap<Uuid, Mark> = HashMap::new();
        let mut order = Vec::with_capacity(services.len());

        for service in &services {
            self.visit(service.id, &services, &name_to_id, &mut marks, &mut order, &mut Vec::new())?;
        }

        Ok(order)
    }

    fn visit(
        &self,
        id: Uuid,
        services: &[ServiceSnapshot],
        name_to_id: &HashMap<&str, Uuid>,
        marks: &mut HashMap<Uuid, Mark>,
        order: &mut Vec<Uuid>,
        path: &mut Vec<String>,
    ) -> Result<(), CoreError> {
        match marks.get(&id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let name = services.iter().find(|s| s.id == id).map(|s| s.name.clone()).unwrap_or_default();
                let mut cycle = path.clone();
                cycle.push(name);
                return Err(CoreError::CircularDependency { cycle });
            }
            None => {}
        }

        let snapshot = services.iter().find(|s| s.id == id).expect("id came from this service list");
        marks.insert(id, Mark::Visiting);
        path.push(snapshot.name.clone());

        for dep_name in &snapshot.dependencies {
            let dep_id = *name_to_id.get(dep_name.as_str()).ok_or_else(|| CoreError::DependencyUnresolved {
                service: snapshot.name.clone(),
                dependency: dep_name.clone(),
            })?;
            self.visit(dep_id, services, name_to_id, marks, order, path)?;
        }

        path.pop();
        marks.insert(id, Mark::Done);
        order.push(id);
        Ok(())
    }

    /// Spawns the periodic health sweep. A second call is a no-op until the
    /// first is shut down via [`Self::shutdown`].
    pub fn spawn_health_monitor(self: &Arc<Self>) {
        let mut guard = self.health_task.lock().expect("ServiceManager.health_task: lock poisoned");
        if guard.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let health = self.health.clone();
        let child = token.clone();
        let handle = tokio::spawn(async move { health.run(child).await });
        *guard = Some((token, handle));
    }

    /// Cancels the health monitor task (if running) and stops every
    /// service in dependency order.
    pub async fn shutdown(&self) -> Result<(), CoreError> {
        if let Some((token, handle)) = self.health_task.lock().expect("ServiceManager.health_task: lock poisoned").take() {
            token.cancel();
            let _ = handle.await;
        }
        if let Some(bridge) = self.health_bridge_task.lock().expect("ServiceManager.health_bridge_task: lock poisoned").take() {
            bridge.abort();
        }
        self.stop_all().await
    }
}

fn circuit_state_label(state: crate::circuit_breaker::CircuitState) -> &'static str {
    use crate::circuit_breaker::CircuitState;
    match state {
        CircuitState::Closed => "closed",
        CircuitState::Open => "open",
        CircuitState::HalfOpen => "half_open",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventBusConfig;
    use crate::event::SubscribeOptions;
    use crate::registry::ClosureService;

    fn healthy_service() -> Arc<ClosureService> {
        Arc::new(ClosureService::new(|| async { Ok(true) }))
    }

    #[tokio::test]
    async fn start_all_respects_dependency_order() {
        let manager = ServiceManager::new(ServiceManagerConfig::default());
        let log = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));

        let log_b = log.clone();
        manager
            .register(
                ServiceConfig::new(
                    "b",
                    Arc::new(
                        ClosureService::new(|| async { Ok(true) })
                            .with_start(move || {
                                let log_b = log_b.clone();
                                async move {
                                    log_b.lock().unwrap().push("b".to_string());
                                    Ok(())
                                }
                            }),
                    ),
                )
                .with_dependencies(vec!["a".to_string()]),
            )
            .unwrap();

        let log_a = log.clone();
        manager
            .register(ServiceConfig::new(
                "a",
                Arc::new(ClosureService::new(|| async { Ok(true) }).with_start(move || {
                    let log_a = log_a.clone();
                    async move {
                        log_a.lock().unwrap().push("a".to_string());
                        Ok(())
                    }
                })),
            ))
            .unwrap();

        manager.start_all().await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn circular_dependency_is_detected() {
        let manager = ServiceManager::new(ServiceManagerConfig::default());
        manager
            .register(ServiceConfig::new("a", healthy_service()).with_dependencies(vec!["b".to_string()]))
            .unwrap();
        manager
            .register(ServiceConfig::new("b", healthy_service()).with_dependencies(vec!["a".to_string()]))
            .unwrap();

        let err = manager.start_all().await.unwrap_err();
        assert!(matches!(err, CoreError::CircularDependency { .. }));
    }

    #[tokio::test]
    async fn missing_dependency_is_reported() {
        let manager = ServiceManager::new(ServiceManagerConfig::default());
        manager
            .register(ServiceConfig::new("a", healthy_service()).with_dependencies(vec!["ghost".to_string()]))
            .unwrap();

        let err = manager.start_all().await.unwrap_err();
        assert!(matches!(err, CoreError::DependencyUnresolved { .. }));
    }

    #[tokio::test]
    async fn start_failure_marks_service_failed() {
        let manager = ServiceManager::new(ServiceManagerConfig::default());
        let id = manager
            .register(ServiceConfig::new(
                "a",
                Arc::new(ClosureService::new(|| async { Ok(true) }).with_start(|| async {
                    Err(CoreError::InvalidConfig("boom".to_string()))
                })),
            ))
            .unwrap();

        let err = manager.start(id).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
        assert_eq!(manager.status(id).unwrap().state, ServiceState::Failed);
    }

    #[tokio::test]
    async fn direct_start_rejects_when_dependency_is_not_running() {
        let manager = ServiceManager::new(ServiceManagerConfig::default());
        manager.register(ServiceConfig::new("a", healthy_service())).unwrap();
        let b = manager
            .register(ServiceConfig::new("b", healthy_service()).with_dependencies(vec!["a".to_string()]))
            .unwrap();

        let err = manager.start(b).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
        assert_eq!(manager.status(b).unwrap().state, ServiceState::Registered, "b must not transition without its dependency running");
    }

    #[tokio::test]
    async fn stop_all_runs_in_reverse_order() {
        let manager = ServiceManager::new(ServiceManagerConfig::default());
        let log = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));

        let log_a = log.clone();
        manager
            .register(ServiceConfig::new(
                "a",
                Arc::new(ClosureService::new(|| async { Ok(true) }).with_stop(move || {
                    let log_a = log_a.clone();
                    async move {
                        log_a.lock().unwrap().push("a".to_string());
                        Ok(())
                    }
                })),
            ))
            .unwrap();

        let log_b = log.clone();
        manager
            .register(
                ServiceConfig::new(
                    "b",
                    Arc::new(ClosureService::new(|| async { Ok(true) }).with_stop(move || {
                        let log_b = log_b.clone();
                        async move {
                            log_b.lock().unwrap().push("b".to_string());
                            Ok(())
                        }
                    })),
                )
                .with_dependencies(vec!["a".to_string()]),
            )
            .unwrap();

        manager.start_all().await.unwrap();
        manager.stop_all().await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["b".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn non_fatal_stop_error_still_lands_on_stopped_and_does_not_block_dependents() {
        let manager = ServiceManager::new(ServiceManagerConfig::default());
        let log = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));

        manager
            .register(ServiceConfig::new(
                "a",
                Arc::new(ClosureService::new(|| async { Ok(true) }).with_stop(|| async {
                    Err(CoreError::InvalidConfig("cleanup failed".to_string()))
                })),
            ))
            .unwrap();

        let log_b = log.clone();
        manager
            .register(
                ServiceConfig::new(
                    "b",
                    Arc::new(ClosureService::new(|| async { Ok(true) }).with_stop(move || {
                        let log_b = log_b.clone();
                        async move {
                            log_b.lock().unwrap().push("b".to_string());
                            Ok(())
                        }
                    })),
                )
                .with_dependencies(vec!["a".to_string()]),
            )
            .unwrap();

        manager.start_all().await.unwrap();
        manager.stop_all().await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["b".to_string()], "b still stops despite a's non-fatal stop error");
        let a = manager.list().into_iter().find(|s| s.name == "a").unwrap();
        assert_eq!(a.state, ServiceState::Stopped);
    }

    #[tokio::test]
    async fn fatal_stop_error_marks_service_failed_and_propagates() {
        let manager = ServiceManager::new(ServiceManagerConfig::default());
        let id = manager
            .register(ServiceConfig::new(
                "a",
                Arc::new(ClosureService::new(|| async { Ok(true) }).with_stop(|| async {
                    Err(CoreError::FatalStop { name: "a".to_string(), message: "refusing to stop".to_string() })
                })),
            ))
            .unwrap();

        manager.start(id).await.unwrap();
        let err = manager.stop(id).await.unwrap_err();
        assert!(matches!(err, CoreError::FatalStop { .. }));
        assert_eq!(manager.status(id).unwrap().state, ServiceState::Failed);
    }

    #[tokio::test]
    async fn health_transitions_are_published_on_the_event_bus() {
        use crate::metrics::NullMetrics;

        let events = Arc::new(EventBus::new(EventBusConfig::default(), Arc::new(NullMetrics)));
        let manager = Arc::new(ServiceManager::with_event_bus(
            ServiceManagerConfig::default(),
            Arc::new(NullMetrics),
            events.clone(),
        ));
        let id = manager.register(ServiceConfig::new("a", healthy_service())).unwrap();
        manager.start(id).await.unwrap();

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        events
            .subscribe(
                format!("service.health.{id}"),
                Arc::new(move |event: crate::event::Event| {
                    let seen_clone = seen_clone.clone();
                    Box::pin(async move { seen_clone.lock().unwrap().push(event.data) })
                }),
                SubscribeOptions::default(),
            )
            .await
            .unwrap();

        manager.health.check_one(id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["healthy"], serde_json::json!(true));
    }
}
