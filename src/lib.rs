#![forbid(unsafe_code)]

//! # Coordination Core
//!
//! A backend coordination layer for long-running Rust services: a **Service
//! Manager** that starts/stops dependency-ordered services and watches their
//! health, an **Event Bus** for in-process and cross-node pub/sub, and a
//! **Pipeline Engine** that moves data from source adapters through
//! filter/process/transform stages to destination adapters on a schedule or
//! in response to events.
//!
//! The three subsystems share one resilience substrate (retry, circuit
//! breaker, bulkhead, timeout) and one error type, [`CoreError`].
//!
//! ## Quick Start
//!
//! ```rust
//! use coordination_core::{ClosureService, ServiceConfig, ServiceManager, ServiceManagerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = ServiceManager::new(ServiceManagerConfig::default());
//!
//!     let handler = Arc::new(ClosureService::new(|| async { Ok(true) }));
//!     manager
//!         .register(ServiceConfig::new("database", handler))
//!         .expect("database registers");
//!
//!     manager.start_all().await.expect("services start");
//!     manager.stop_all().await.expect("services stop");
//! }
//! ```

mod backoff;
mod bulkhead;
mod circuit_breaker;
mod clock;
mod error;
mod jitter;
mod retry;
mod sleeper;
mod stack;
mod timeout;

pub mod adaptive;
pub mod config;
pub mod event;
pub mod health;
pub mod metrics;
pub mod pipeline;
pub mod prelude;
pub mod rate_limit;
pub mod registry;
pub mod service_manager;
pub mod telemetry;

// Re-exports: resilience substrate (kept from the teacher crate).
pub use backoff::{
    Backoff, BackoffError, BackoffStrategy, ConstantBackoff, ExponentialBackoff, LinearBackoff,
    MAX_BACKOFF,
};
pub use bulkhead::{BulkheadError, BulkheadPolicy};
pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerPolicy, CircuitState,
};
pub use clock::{Clock, MonotonicClock};
pub use error::{CoreError, ResilienceError};
pub use jitter::Jitter;
pub use retry::{BuildError, RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use stack::{ResilienceStack, ResilienceStackBuilder, StackError};
pub use timeout::{TimeoutError, TimeoutPolicy, MAX_TIMEOUT};

// Re-exports: the three coordination subsystems.
pub use config::{EventBusConfig, PipelineConfig as PipelineEngineConfig, ServiceManagerConfig};
pub use event::{Event, EventBus, PublishOptions, SubscribeOptions};
pub use health::{HealthEvent, HealthMonitor};
pub use pipeline::{ExecuteOptions, ExecutionResult, PipelineEngine};
pub use registry::{
    ClosureService, HealthStatus, ServiceConfig, ServiceHandler, ServiceRecord, ServiceRegistry,
    ServiceSnapshot, ServiceState,
};
pub use service_manager::ServiceManager;
