//! Event Bus: topic-based publish/subscribe with wildcard matching,
//! namespaced isolation, bounded per-topic history, optional remote
//! fan-out, and request/response over pub/sub.

mod broker;
mod bus;
mod compression;
mod history;
mod pattern;
mod wire;

pub use broker::{BrokerError, BrokerHandler, ChannelBroker, NullBroker};
pub use bus::{BusMetrics, EventBus, Handler, Subscription, SubscriptionHandle};
pub use compression::maybe_compress;
pub use history::HistoryEntry;
pub use pattern::Pattern;
pub use wire::{WireEnvelope, WireError};

use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// An immutable published event. Once constructed it is never mutated;
/// delivery fans out clones.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub topic: String,
    pub namespace: String,
    pub data: serde_json::Value,
    pub source: String,
    /// Milliseconds since the bus's monotonic clock was created.
    pub monotonic_millis: u64,
    pub wall_clock: SystemTime,
}

impl Event {
    pub fn age(&self) -> Duration {
        self.wall_clock.elapsed().unwrap_or_default()
    }
}

/// Options accepted by [`EventBus::publish`].
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub namespace: Option<String>,
    pub source: Option<String>,
    pub ttl: Option<Duration>,
}

/// Options accepted by [`EventBus::subscribe`].
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    pub namespace: Option<String>,
    /// Present for API-completeness with the spec's delivery options;
    /// every subscription is already per-subscription FIFO regardless of
    /// this flag (there is no lower-ordering mode to opt out into).
    pub ordered: bool,
}
