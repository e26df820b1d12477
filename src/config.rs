//! Configuration shapes for the Service Manager, Event Bus, and Pipeline Engine.
//!
//! These structs describe the recognized options and their effects; this crate
//! does not read files or environment variables itself — loading configuration
//! from a file, env, or a remote source is the embedder's job. Each struct
//! implements [`serde::Deserialize`] with `#[serde(default)]` fields so an
//! embedder's config loader can deserialize a partial document and fall back
//! to these defaults for anything unspecified.

use std::time::Duration;

fn duration_millis(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Configuration for the [`crate::service_manager::ServiceManager`].
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ServiceManagerConfig {
    /// Per-probe timeout.
    #[serde(with = "duration_millis_serde")]
    pub health_check_timeout: Duration,
    /// Interval between health-check sweeps of all `running` services.
    #[serde(with = "duration_millis_serde")]
    pub health_check_interval: Duration,
    /// Consecutive health failures before a service's circuit opens.
    pub circuit_breaker_threshold: usize,
    /// Open → half-open delay.
    #[serde(with = "duration_millis_serde")]
    pub circuit_breaker_reset_timeout: Duration,
}

impl Default for ServiceManagerConfig {
    fn default() -> Self {
        Self {
            health_check_timeout: duration_millis(5_000),
            health_check_interval: duration_millis(15_000),
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_timeout: duration_millis(30_000),
        }
    }
}

/// Configuration for the [`crate::event::bus::EventBus`].
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Per-topic history ring capacity.
    pub max_history_size: usize,
    /// History entry lifetime.
    #[serde(with = "duration_millis_serde")]
    pub default_ttl: Duration,
    /// Whether to connect the channel broker for remote fan-out.
    pub enable_persistence: bool,
    /// Bytes above which remote payloads are compressed before relay.
    pub compression_threshold: usize,
    /// Bound on the per-subscription delivery channel.
    pub subscriber_channel_capacity: usize,
    /// Deadline `close()` waits for pending deliveries to flush.
    #[serde(with = "duration_millis_serde")]
    pub shutdown_deadline: Duration,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            max_history_size: 100,
            default_ttl: Duration::from_secs(60 * 60),
            enable_persistence: false,
            compression_threshold: 1024,
            subscriber_channel_capacity: 256,
            shutdown_deadline: duration_millis(5_000),
        }
    }
}

/// Configuration for the [`crate::pipeline::engine::PipelineEngine`].
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Default in-flight item concurrency for a pipeline's work queue.
    pub concurrency: usize,
    /// Rate-limit window.
    #[serde(with = "duration_millis_serde")]
    pub interval: Duration,
    /// Max items admitted to the queue per `interval`.
    pub interval_cap: u32,
    /// Dead-letter queue capacity.
    pub max_dlq_size: usize,
    /// Whether the dead-letter queue is enabled at all.
    pub dead_letter_queue: bool,
    /// Default batch size pulled from a source cursor per iteration.
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            interval: Duration::from_secs(1),
            interval_cap: 100,
            max_dlq_size: 1_000,
            dead_letter_queue: true,
            batch_size: 100,
        }
    }
}

mod duration_millis_serde {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
