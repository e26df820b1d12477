//! Prometheus metrics sink for `coordination-core`.
//! Bring your own `prometheus::Registry`; one metric family per
//! [`coordination_core::metrics::MetricsSink`] method.

use coordination_core::metrics::MetricsSink;
use prometheus::{HistogramVec, IntCounterVec, IntGaugeVec, Registry};
use uuid::Uuid;

#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: std::sync::Arc<Registry>,
    services_registered: IntCounterVec,
    service_state_changes: IntCounterVec,
    circuit_state_changes: IntCounterVec,
    events_published: IntCounterVec,
    event_dispatch_duration: HistogramVec,
    pipeline_executions: IntCounterVec,
    pipeline_duration: HistogramVec,
    pipeline_items_processed: IntCounterVec,
    dlq_size: IntGaugeVec,
}

impl PrometheusMetrics {
    /// Creates the sink and registers all its counters/gauges/histograms
    /// into `registry`.
    ///
    /// # Errors
    /// Returns an error if a metric name collides with one already
    /// registered.
    pub fn new<R: Into<std::sync::Arc<Registry>>>(registry: R) -> Result<Self, prometheus::Error> {
        let registry = registry.into();

        let services_registered = IntCounterVec::new(
            prometheus::Opts::new("coordination_core_services_registered_total", "Services registered"),
            &["name"],
        )?;
        let service_state_changes = IntCounterVec::new(
            prometheus::Opts::new("coordination_core_service_state_changes_total", "Service state transitions"),
            &["state"],
        )?;
        let circuit_state_changes = IntCounterVec::new(
            prometheus::Opts::new("coordination_core_circuit_state_changes_total", "Circuit breaker state transitions"),
            &["state"],
        )?;
        let events_published = IntCounterVec::new(
            prometheus::Opts::new("coordination_core_events_published_total", "Events published"),
            &["namespace", "topic"],
        )?;
        let event_dispatch_duration = HistogramVec::new(
            prometheus::HistogramOpts::new("coordination_core_event_dispatch_duration_seconds", "Event dispatch latency"),
            &["namespace", "topic"],
        )?;
        let pipeline_executions = IntCounterVec::new(
            prometheus::Opts::new("coordination_core_pipeline_executions_total", "Pipeline executions"),
            &["outcome"],
        )?;
        let pipeline_duration = HistogramVec::new(
            prometheus::HistogramOpts::new("coordination_core_pipeline_execution_duration_seconds", "Pipeline execution duration"),
            &["pipeline"],
        )?;
        let pipeline_items_processed = IntCounterVec::new(
            prometheus::Opts::new("coordination_core_pipeline_items_processed_total", "Pipeline items processed"),
            &["pipeline"],
        )?;
        let dlq_size = IntGaugeVec::new(
            prometheus::Opts::new("coordination_core_dlq_size", "Dead-letter queue size"),
            &["pipeline"],
        )?;

        registry.register(Box::new(services_registered.clone()))?;
        registry.register(Box::new(service_state_changes.clone()))?;
        registry.register(Box::new(circuit_state_changes.clone()))?;
        registry.register(Box::new(events_published.clone()))?;
        registry.register(Box::new(event_dispatch_duration.clone()))?;
        registry.register(Box::new(pipeline_executions.clone()))?;
        registry.register(Box::new(pipeline_duration.clone()))?;
        registry.register(Box::new(pipeline_items_processed.clone()))?;
        registry.register(Box::new(dlq_size.clone()))?;

        Ok(Self {
            registry,
            services_registered,
            service_state_changes,
            circuit_state_changes,
            events_published,
            event_dispatch_duration,
            pipeline_executions,
            pipeline_duration,
            pipeline_items_processed,
            dlq_size,
        })
    }

    /// Expose the registry for HTTP scraping.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn pipeline_label(id: Uuid) -> String {
    id.to_string()
}

impl MetricsSink for PrometheusMetrics {
    fn service_registered(&self, _service: Uuid, name: &str) {
        self.services_registered.with_label_values(&[name]).inc();
    }

    fn service_state_changed(&self, _service: Uuid, state: &str) {
        self.service_state_changes.with_label_values(&[state]).inc();
    }

    fn circuit_state_changed(&self, _service: Uuid, state: &str) {
        self.circuit_state_changes.with_label_values(&[state]).inc();
    }

    fn event_published(&self, namespace: &str, topic: &str) {
        self.events_published.with_label_values(&[namespace, topic]).inc();
    }

    fn event_dispatch_duration(&self, namespace: &str, topic: &str, nanos: u64) {
        self.event_dispatch_duration.with_label_values(&[namespace, topic]).observe(nanos as f64 / 1e9);
    }

    fn pipeline_execution_started(&self, _pipeline: Uuid) {
        self.pipeline_executions.with_label_values(&["started"]).inc();
    }

    fn pipeline_execution_completed(&self, pipeline: Uuid, duration_nanos: u64) {
        self.pipeline_executions.with_label_values(&["completed"]).inc();
        self.pipeline_duration.with_label_values(&[&pipeline_label(pipeline)]).observe(duration_nanos as f64 / 1e9);
    }

    fn pipeline_execution_failed(&self, _pipeline: Uuid) {
        self.pipeline_executions.with_label_values(&["failed"]).inc();
    }

    fn pipeline_items_processed(&self, pipeline: Uuid, count: u64) {
        self.pipeline_items_processed.with_label_values(&[&pipeline_label(pipeline)]).inc_by(count);
    }

    fn dlq_size_changed(&self, pipeline: Uuid, size: usize) {
        self.dlq_size.with_label_values(&[&pipeline_label(pipeline)]).set(size as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_value(registry: &Registry, family: &str, label_name: &str, label_value: &str) -> Option<f64> {
        registry.gather().iter().find(|mf| mf.get_name() == family).and_then(|mf| {
            mf.get_metric()
                .iter()
                .find(|m| m.get_label().iter().any(|l| l.get_name() == label_name && l.get_value() == label_value))
                .map(|m| m.get_counter().value())
        })
    }

    #[test]
    fn service_registered_increments_by_name() {
        let registry = Registry::new();
        let sink = PrometheusMetrics::new(registry.clone()).unwrap();

        sink.service_registered(Uuid::nil(), "database");
        sink.service_registered(Uuid::nil(), "database");

        let value = counter_value(&registry, "coordination_core_services_registered_total", "name", "database");
        assert_eq!(value, Some(2.0));
    }

    #[test]
    fn dlq_size_changed_sets_a_gauge() {
        let registry = Registry::new();
        let sink = PrometheusMetrics::new(registry.clone()).unwrap();
        let pipeline = Uuid::new_v4();

        sink.dlq_size_changed(pipeline, 7);

        let families = registry.gather();
        let gauge = families.iter().find(|mf| mf.get_name() == "coordination_core_dlq_size").unwrap();
        assert_eq!(gauge.get_metric()[0].get_gauge().value(), 7.0);
    }
}
