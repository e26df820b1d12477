//! Service Registry: in-memory catalog of services keyed by id and by name.
//!
//! Grounded on the bounded HashMap+lock+snapshot shape the teacher's
//! (non-surviving) `circuit_breaker_registry.rs` used, generalized to an
//! `RwLock` per the shared-resource policy: reads (`get`/`list`/`find_*`)
//! take a shared lock, mutations (`register`/`transition`/`remove`) take an
//! exclusive one. Both maps (by-id, by-name) live behind the same lock so a
//! register/remove can never observe one map without the other.

use crate::error::CoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use uuid::Uuid;

/// The behavior a registered service exposes to the Service Manager.
/// `start`/`stop` are optional (default no-ops); `health_check` is required.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    async fn start(&self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, CoreError>;
}

/// A `ServiceHandler` built from plain async closures, for embedders that
/// don't want to define a dedicated type per service.
pub struct ClosureService {
    start: Option<Arc<dyn Fn() -> BoxFuture<Result<(), CoreError>> + Send + Sync>>,
    stop: Option<Arc<dyn Fn() -> BoxFuture<Result<(), CoreError>> + Send + Sync>>,
    health_check: Arc<dyn Fn() -> BoxFuture<Result<bool, CoreError>> + Send + Sync>,
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

impl ClosureService {
    pub fn new<H, HFut>(health_check: H) -> Self
    where
        H: Fn() -> HFut + Send + Sync + 'static,
        HFut: Future<Output = Result<bool, CoreError>> + Send + 'static,
    {
        Self {
            start: None,
            stop: None,
            health_check: Arc::new(move || Box::pin(health_check())),
        }
    }

    pub fn with_start<S, SFut>(mut self, start: S) -> Self
    where
        S: Fn() -> SFut + Send + Sync + 'static,
        SFut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        self.start = Some(Arc::new(move || Box::pin(start())));
        self
    }

    pub fn with_stop<S, SFut>(mut self, stop: S) -> Self
    where
        S: Fn() -> SFut + Send + Sync + 'static,
        SFut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        self.stop = Some(Arc::new(move || Box::pin(stop())));
        self
    }
}

#[async_trait]
impl ServiceHandler for ClosureService {
    async fn start(&self) -> Result<(), CoreError> {
        match &self.start {
            Some(f) => f().await,
            None => Ok(()),
        }
    }

    async fn stop(&self) -> Result<(), CoreError> {
        match &self.stop {
            Some(f) => f().await,
            None => Ok(()),
        }
    }

    async fn health_check(&self) -> Result<bool, CoreError> {
        (self.health_check)().await
    }
}

/// Registration input for [`ServiceRegistry::register`].
pub struct ServiceConfig {
    pub name: String,
    pub version: String,
    pub endpoints: Vec<String>,
    pub dependencies: Vec<String>,
    pub handler: Arc<dyn ServiceHandler>,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>, handler: Arc<dyn ServiceHandler>) -> Self {
        Self {
            name: name.into(),
            version: "0.0.0".to_string(),
            endpoints: Vec::new(),
            dependencies: Vec::new(),
            handler,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Registered,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Registered => "registered",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
            ServiceState::Failed => "failed",
        }
    }

    /// Only `registered|stopped|failed` services may transition to `starting`.
    pub fn can_start(&self) -> bool {
        matches!(self, ServiceState::Registered | ServiceState::Stopped | ServiceState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

/// A service's durable record, owned exclusively by the registry.
pub struct ServiceRecord {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub endpoints: Vec<String>,
    pub dependencies: Vec<String>,
    pub state: ServiceState,
    pub health: HealthStatus,
    pub uptime_since: Option<SystemTime>,
    pub last_health_check: Option<SystemTime>,
    pub handler: Arc<dyn ServiceHandler>,
}

/// A point-in-time, cloneable view of a [`ServiceRecord`] (everything except
/// the handler, which stays behind the registry's lock).
#[derive(Clone)]
pub struct ServiceSnapshot {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub endpoints: Vec<String>,
    pub dependencies: Vec<String>,
    pub state: ServiceState,
    pub health: HealthStatus,
    pub uptime_since: Option<SystemTime>,
    pub last_health_check: Option<SystemTime>,
}

impl From<&ServiceRecord> for ServiceSnapshot {
    fn from(r: &ServiceRecord) -> Self {
        Self {
            id: r.id,
            name: r.name.clone(),
            version: r.version.clone(),
            endpoints: r.endpoints.clone(),
            dependencies: r.dependencies.clone(),
            state: r.state,
            health: r.health,
            uptime_since: r.uptime_since,
            last_health_check: r.last_health_check,
        }
    }
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<Uuid, ServiceRecord>,
    by_name: HashMap<String, Uuid>,
}

/// In-memory catalog of services keyed by id and by unique name.
#[derive(Default)]
pub struct ServiceRegistry {
    inner: RwLock<Inner>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `name` is non-empty and unique, then stores the service in
    /// `registered` state.
    pub fn register(&self, config: ServiceConfig) -> Result<Uuid, CoreError> {
        if config.name.trim().is_empty() {
            return Err(CoreError::InvalidConfig("service name must not be empty".to_string()));
        }

        let mut guard = self.inner.write().expect("ServiceRegistry: lock poisoned");
        if guard.by_name.contains_key(&config.name) {
            return Err(CoreError::DuplicateName { name: config.name });
        }

        let id = Uuid::new_v4();
        guard.by_name.insert(config.name.clone(), id);
        guard.by_id.insert(
            id,
            ServiceRecord {
                id,
                name: config.name,
                version: config.version,
                endpoints: config.endpoints,
                dependencies: config.dependencies,
                state: ServiceState::Registered,
                health: HealthStatus::Unknown,
                uptime_since: None,
                last_health_check: None,
                handler: config.handler,
            },
        );
        tracing::info!(service = %id, "service registered");
        Ok(id)
    }

    pub fn get(&self, id: Uuid) -> Option<ServiceSnapshot> {
        let guard = self.inner.read().expect("ServiceRegistry: lock poisoned");
        guard.by_id.get(&id).map(ServiceSnapshot::from)
    }

    pub fn get_handler(&self, id: Uuid) -> Option<Arc<dyn ServiceHandler>> {
        let guard = self.inner.read().expect("ServiceRegistry: lock poisoned");
        guard.by_id.get(&id).map(|r| r.handler.clone())
    }

    pub fn find_by_name(&self, name: &str) -> Option<ServiceSnapshot> {
        let guard = self.inner.read().expect("ServiceRegistry: lock poisoned");
        let id = guard.by_name.get(name)?;
        guard.by_id.get(id).map(ServiceSnapshot::from)
    }

    pub fn id_by_name(&self, name: &str) -> Option<Uuid> {
        let guard = self.inner.read().expect("ServiceRegistry: lock poisoned");
        guard.by_name.get(name).copied()
    }

    pub fn list(&self) -> Vec<ServiceSnapshot> {
        let guard = self.inner.read().expect("ServiceRegistry: lock poisoned");
        let mut out: Vec<_> = guard.by_id.values().map(ServiceSnapshot::from).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn find_by_status(&self, state: ServiceState) -> Vec<ServiceSnapshot> {
        let guard = self.inner.read().expect("ServiceRegistry: lock poisoned");
        let mut out: Vec<_> = guard
            .by_id
            .values()
            .filter(|r| r.state == state)
            .map(ServiceSnapshot::from)
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Dependency names of `id`, resolved to their current snapshots. Fails
    /// with `DependencyUnresolved` if a named dependency isn't registered.
    pub fn resolve_dependencies(&self, id: Uuid) -> Result<Vec<ServiceSnapshot>, CoreError> {
        let guard = self.inner.read().expect("ServiceRegistry: lock poisoned");
        let record = guard.by_id.get(&id).ok_or_else(|| CoreError::InvalidConfig(
            format!("no such service {id}"),
        ))?;
        record
            .dependencies
            .iter()
            .map(|dep_name| {
                let dep_id = guard.by_name.get(dep_name).ok_or_else(|| {
                    CoreError::DependencyUnresolved {
                        service: record.name.clone(),
                        dependency: dep_name.clone(),
                    }
                })?;
                Ok(guard.by_id.get(dep_id).map(ServiceSnapshot::from).expect("by_name/by_id consistent"))
            })
            .collect()
    }

    pub fn set_state(&self, id: Uuid, state: ServiceState) -> Result<(), CoreError> {
        let mut guard = self.inner.write().expect("ServiceRegistry: lock poisoned");
        let record = guard
            .by_id
            .get_mut(&id)
            .ok_or_else(|| CoreError::InvalidConfig(format!("no such service {id}")))?;
        record.state = state;
        if state == ServiceState::Running && record.uptime_since.is_none() {
            record.uptime_since = Some(SystemTime::now());
        }
        if state != ServiceState::Running {
            record.uptime_since = None;
        }
        Ok(())
    }

    pub fn set_health(&self, id: Uuid, health: HealthStatus) -> Result<(), CoreError> {
        let mut guard = self.inner.write().expect("ServiceRegistry: lock poisoned");
        let record = guard
            .by_id
            .get_mut(&id)
            .ok_or_else(|| CoreError::InvalidConfig(format!("no such service {id}")))?;
        record.health = health;
        record.last_health_check = Some(SystemTime::now());
        Ok(())
    }

    pub fn remove(&self, id: Uuid) {
        let mut guard = self.inner.write().expect("ServiceRegistry: lock poisoned");
        if let Some(record) = guard.by_id.remove(&id) {
            guard.by_name.remove(&record.name);
        }
    }
}
