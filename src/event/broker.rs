//! Channel Broker contract: the optional external pub/sub fabric the Event
//! Bus relays to for cross-process fan-out. Grounded on the teacher's
//! `TelemetrySink` trait shape — a single async sink trait with a no-op
//! default implementation an embedder can swap in when no broker is
//! configured.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;

/// What the Event Bus needs from an external broker. Implementations live
/// in adapter crates (NATS, Kafka, ...); `channel` is always
/// `<namespace>:<topic>`.
#[async_trait]
pub trait ChannelBroker: Send + Sync {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Registers `handler` to be invoked for every message delivered on a
    /// channel matching `pattern`. `pattern` follows the same channel
    /// naming as `publish` (`<namespace>:<topic>`, broker-side glob rules
    /// apply to the `topic` portion).
    async fn subscribe(&self, pattern: &str, handler: BrokerHandler) -> Result<(), BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

pub type BrokerHandler = Box<dyn Fn(&str, &[u8]) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerError(pub String);

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "broker error: {}", self.0)
    }
}

impl std::error::Error for BrokerError {}

/// No-op broker for when `eventBus.enablePersistence` is `false`: publishes
/// and subscriptions are accepted and discarded, so the bus never needs a
/// branch for "no broker configured".
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBroker;

#[async_trait]
impl ChannelBroker for NullBroker {
    async fn publish(&self, _channel: &str, _payload: &[u8]) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn subscribe(&self, _pattern: &str, _handler: BrokerHandler) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_broker_accepts_everything() {
        let broker = NullBroker;
        broker.publish("ns:topic", b"payload").await.unwrap();
        broker.subscribe("ns:*", Box::new(|_, _| Box::pin(async {}))).await.unwrap();
        broker.close().await.unwrap();
    }
}
