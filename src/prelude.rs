//! Convenient re-exports for the common API surface.
pub use crate::{
    config::{EventBusConfig, ServiceManagerConfig},
    error::CoreError,
    event::{Event, EventBus, PublishOptions, SubscribeOptions},
    health::HealthMonitor,
    metrics::{MemoryMetrics, MetricsSink, NullMetrics},
    pipeline::{PipelineEngine, StorageAdapter},
    registry::{ClosureService, HealthStatus, ServiceConfig, ServiceHandler, ServiceState},
    service_manager::ServiceManager,
    Backoff, BulkheadPolicy, CircuitBreakerPolicy, Jitter, ResilienceError, ResilienceStack,
    ResilienceStackBuilder, RetryPolicy, TimeoutPolicy,
};
