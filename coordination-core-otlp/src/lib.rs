//! `tracing`-to-OTLP log bridge: forwards every `tracing` event emitted by
//! the Service Manager, Event Bus, and Pipeline Engine (and the embedder's
//! own spans) to an OpenTelemetry `LoggerProvider`. This is ambient
//! observability, not a coordination feature — there is no trait in the
//! core crate for it, just a `tracing_subscriber::Layer`.
//!
//! Bring your own `opentelemetry_sdk::logs::SdkLoggerProvider`:
//!
//! ```ignore
//! use coordination_core_otlp::OtlpLayer;
//! use tracing_subscriber::layer::SubscriberExt;
//!
//! let provider = opentelemetry_sdk::logs::SdkLoggerProvider::builder().build();
//! let subscriber = tracing_subscriber::registry().with(OtlpLayer::new(provider));
//! tracing::subscriber::set_global_default(subscriber).unwrap();
//! ```

use opentelemetry::logs::{AnyValue, LogRecord, Logger, LoggerProvider, Severity};
use std::fmt;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

pub struct OtlpLayer<P> {
    provider: P,
}

impl<P> OtlpLayer<P>
where
    P: LoggerProvider + Clone + Send + Sync + 'static,
{
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

fn severity_for(level: &Level) -> Severity {
    match *level {
        Level::TRACE => Severity::Trace,
        Level::DEBUG => Severity::Debug,
        Level::INFO => Severity::Info,
        Level::WARN => Severity::Warn,
        Level::ERROR => Severity::Error,
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    attributes: Vec<(String, AnyValue)>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.attributes.push((field.name().to_string(), AnyValue::from(value.to_string())));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.attributes.push((field.name().to_string(), AnyValue::from(value)));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.attributes.push((field.name().to_string(), AnyValue::from(value as i64)));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.attributes.push((field.name().to_string(), AnyValue::from(value)));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(rendered);
        } else {
            self.attributes.push((field.name().to_string(), AnyValue::from(rendered)));
        }
    }
}

impl<S, P> Layer<S> for OtlpLayer<P>
where
    S: Subscriber,
    P: LoggerProvider + Clone + Send + Sync + 'static,
    P::Logger: Send,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let logger = self.provider.logger("coordination-core");
        let mut record = logger.create_log_record();
        record.set_severity_number(severity_for(metadata.level()));
        record.set_body(AnyValue::from(collector.message.unwrap_or_else(|| metadata.name().to_string())));
        record.add_attribute("target", metadata.target().to_string());
        for (key, value) in collector.attributes {
            record.add_attribute(key, value);
        }
        logger.emit(record);
    }
}
