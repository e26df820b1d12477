//! Health Monitor: periodic liveness sweep over `running` services.
//!
//! Each tick probes every service the [`crate::registry::ServiceRegistry`]
//! reports as `running`, through a per-service [`CircuitBreakerPolicy`] so a
//! run of consecutive failures opens that service's circuit independently of
//! the others. Probes run concurrently and are each bounded by a
//! [`TimeoutPolicy`]; a probe that doesn't return in time counts as a
//! failure, same as one that returns `Ok(false)` or errors.
//!
//! Grounded on the teacher's `circuit_breaker.rs` execute-and-record loop,
//! driven by a `tokio::time::interval` sweep in the shape of
//! `telemetry/sinks.rs`'s background flush task.

use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerPolicy, CircuitState};
use crate::config::ServiceManagerConfig;
use crate::error::CoreError;
use crate::metrics::MetricsSink;
use crate::registry::{HealthStatus, ServiceRegistry, ServiceState};
use crate::timeout::TimeoutPolicy;
use crate::ResilienceError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A health transition the monitor observed, for embedders that want to
/// relay it onto an event bus or log stream. Not constrained to any wire
/// format here.
#[derive(Debug, Clone)]
pub struct HealthEvent {
    pub service: Uuid,
    pub healthy: bool,
    pub circuit_state: CircuitState,
}

pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    config: ServiceManagerConfig,
    metrics: Arc<dyn MetricsSink>,
    breakers: RwLock<HashMap<Uuid, CircuitBreakerPolicy>>,
    events: Option<UnboundedSender<HealthEvent>>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<ServiceRegistry>, config: ServiceManagerConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            registry,
            config,
            metrics,
            breakers: RwLock::new(HashMap::new()),
            events: None,
        }
    }

    pub fn with_event_sink(mut self, tx: UnboundedSender<HealthEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Allocates (if absent) and returns the per-service circuit breaker,
    /// configured from `self.config`.
    fn breaker_for(&self, id: Uuid) -> CircuitBreakerPolicy {
        if let Some(existing) = self.breakers.read().expect("HealthMonitor.breakers: lock poisoned").get(&id) {
            return existing.clone();
        }
        let mut guard = self.breakers.write().expect("HealthMonitor.breakers: lock poisoned");
        guard
            .entry(id)
            .or_insert_with(|| {
                CircuitBreakerPolicy::with_config(CircuitBreakerConfig {
                    failure_threshold: self.config.circuit_breaker_threshold,
                    recovery_timeout: self.config.circuit_breaker_reset_timeout,
                    half_open_max_calls: 1,
                })
            })
            .clone()
    }

    pub fn circuit_state(&self, id: Uuid) -> Option<CircuitState> {
        self.breakers.read().expect("HealthMonitor.breakers: lock poisoned").get(&id).map(|b| b.state())
    }

    pub fn forget(&self, id: Uuid) {
        self.breakers.write().expect("HealthMonitor.breakers: lock poisoned").remove(&id);
    }

    /// Runs one timeout-bounded probe of `id`, records the outcome against
    /// its circuit breaker, and updates the registry's health field.
    pub async fn check_one(&self, id: Uuid) -> Result<bool, CoreError> {
        let handler = self
            .registry
            .get_handler(id)
            .ok_or_else(|| CoreError::InvalidConfig(format!("no such service {id}")))?;
        let timeout = TimeoutPolicy::new(self.config.health_check_timeout)
            .unwrap_or_else(|_| TimeoutPolicy::new(Duration::from_secs(5)).expect("5s is a valid timeout"));
        let breaker = self.breaker_for(id);

        let outcome = breaker
            .execute(|| {
                let handler = handler.clone();
                let timeout = timeout.clone();
                async move {
                    timeout
                        .execute(|| {
                            let handler = handler.clone();
                            async move {
                                match handler.health_check().await {
                                    Ok(true) => Ok(()),
                                    Ok(false) => Err(ResilienceError::Inner(HealthProbeFailed)),
                                    Err(e) => {
                                        tracing::warn!(service = %id, error = %e, "health check errored");
                                        Err(ResilienceError::Inner(HealthProbeFailed))
                                    }
                                }
                            }
                        })
                        .await
                }
            })
            .await;

        let healthy = outcome.is_ok();
        let state = breaker.state();

        self.registry.set_health(
            id,
            if healthy { HealthStatus::Healthy } else { HealthStatus::Unhealthy },
        )?;
        self.metrics.circuit_state_changed(id, circuit_state_name(state));
        if let Some(tx) = &self.events {
            let _ = tx.send(HealthEvent { service: id, healthy, circuit_state: state });
        }
        tracing::debug!(service = %id, healthy, circuit_state = circuit_state_name(state), "health check completed");

        Ok(healthy)
    }

    async fn sweep(&self) {
        let running = self.registry.find_by_status(ServiceState::Running);
        let checks = running.into_iter().map(|snapshot| async move {
            if let Err(e) = self.check_one(snapshot.id).await {
                tracing::warn!(service = %snapshot.id, error = %e, "health sweep failed for service");
            }
        });
        futures::future::join_all(checks).await;
    }

    /// Runs the periodic sweep loop until `cancellation` fires. Intended to
    /// be driven from a `tokio::spawn`ed task owned by the Service Manager.
    pub async fn run(self: Arc<Self>, cancellation: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.health_check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    tracing::info!("health monitor shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
    }
}

fn circuit_state_name(state: CircuitState) -> &'static str {
    match state {
        CircuitState::Closed => "closed",
        CircuitState::Open => "open",
        CircuitState::HalfOpen => "half_open",
    }
}

#[derive(Debug, Clone, Copy)]
struct HealthProbeFailed;

impl std::fmt::Display for HealthProbeFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "health probe reported unhealthy")
    }
}

impl std::error::Error for HealthProbeFailed {}
