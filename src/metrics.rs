//! Metrics export seam for the Service Manager, Event Bus, and Pipeline Engine.
//!
//! The core keeps counters and gauges but does not own any process-wide
//! registry or export format (no Prometheus text format, no OTLP wire
//! encoding) — that belongs to an embedder-supplied [`MetricsSink`]
//! implementation, injected per-engine rather than reached for through a
//! global singleton. HTTP and websocket counters are the embedder's own
//! concern and have no methods here.
//!
//! Mirrors the shape of [`crate::telemetry::TelemetrySink`]'s
//! `NullSink`/`MemorySink` pair, applied to a counters-and-gauges surface
//! instead of a `PolicyEvent` stream.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// One method per counter/gauge family named in the external interfaces
/// table. Implementations must be cheap to call on the hot path; they are
/// invoked inline, not queued.
pub trait MetricsSink: Send + Sync {
    fn service_registered(&self, _service: Uuid, _name: &str) {}
    fn service_state_changed(&self, _service: Uuid, _state: &str) {}
    fn circuit_state_changed(&self, _service: Uuid, _state: &str) {}
    fn event_published(&self, _namespace: &str, _topic: &str) {}
    fn event_dispatch_duration(&self, _namespace: &str, _topic: &str, _nanos: u64) {}
    fn pipeline_execution_started(&self, _pipeline: Uuid) {}
    fn pipeline_execution_completed(&self, _pipeline: Uuid, _duration_nanos: u64) {}
    fn pipeline_execution_failed(&self, _pipeline: Uuid) {}
    fn pipeline_items_processed(&self, _pipeline: Uuid, _count: u64) {}
    fn dlq_size_changed(&self, _pipeline: Uuid, _size: usize) {}
}

/// A no-op sink that discards all measurements. The default for embedders
/// that don't need metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetrics;

impl MetricsSink for NullMetrics {}

/// An in-memory sink for tests and local inspection. Not intended for
/// production export; see the `coordination-core-prometheus` adapter crate
/// for that.
#[derive(Debug, Default)]
pub struct MemoryMetrics {
    services_registered: AtomicU64,
    events_published: AtomicU64,
    pipeline_executions_started: AtomicU64,
    pipeline_executions_completed: AtomicU64,
    pipeline_executions_failed: AtomicU64,
    pipeline_items_processed: AtomicU64,
    last_dlq_size: AtomicI64,
    state_changes: Mutex<Vec<(Uuid, String)>>,
}

impl MemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn services_registered(&self) -> u64 {
        self.services_registered.load(Ordering::Relaxed)
    }

    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    pub fn pipeline_executions_started(&self) -> u64 {
        self.pipeline_executions_started.load(Ordering::Relaxed)
    }

    pub fn pipeline_executions_completed(&self) -> u64 {
        self.pipeline_executions_completed.load(Ordering::Relaxed)
    }

    pub fn pipeline_executions_failed(&self) -> u64 {
        self.pipeline_executions_failed.load(Ordering::Relaxed)
    }

    pub fn pipeline_items_processed(&self) -> u64 {
        self.pipeline_items_processed.load(Ordering::Relaxed)
    }

    pub fn last_dlq_size(&self) -> i64 {
        self.last_dlq_size.load(Ordering::Relaxed)
    }

    pub fn state_changes(&self) -> Vec<(Uuid, String)> {
        self.state_changes.lock().expect("MemoryMetrics.state_changes: mutex poisoned").clone()
    }
}

impl MetricsSink for MemoryMetrics {
    fn service_registered(&self, _service: Uuid, _name: &str) {
        self.services_registered.fetch_add(1, Ordering::Relaxed);
    }

    fn service_state_changed(&self, service: Uuid, state: &str) {
        self.state_changes
            .lock()
            .expect("MemoryMetrics.state_changes: mutex poisoned")
            .push((service, state.to_string()));
    }

    fn event_published(&self, _namespace: &str, _topic: &str) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    fn pipeline_execution_started(&self, _pipeline: Uuid) {
        self.pipeline_executions_started.fetch_add(1, Ordering::Relaxed);
    }

    fn pipeline_execution_completed(&self, _pipeline: Uuid, _duration_nanos: u64) {
        self.pipeline_executions_completed.fetch_add(1, Ordering::Relaxed);
    }

    fn pipeline_execution_failed(&self, _pipeline: Uuid) {
        self.pipeline_executions_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn pipeline_items_processed(&self, _pipeline: Uuid, count: u64) {
        self.pipeline_items_processed.fetch_add(count, Ordering::Relaxed);
    }

    fn dlq_size_changed(&self, _pipeline: Uuid, size: usize) {
        self.last_dlq_size.store(size as i64, Ordering::Relaxed);
    }
}
