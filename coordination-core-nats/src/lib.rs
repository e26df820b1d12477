//! NATS channel broker for `coordination-core`'s event bus.
//!
//! Bring your own connected `nats::Connection`; events are published as raw
//! bytes to `<namespace>:<topic>` subjects with `:` mapped to `.` so NATS
//! wildcard subscriptions (`ns.>`) work the same way the bus's own pattern
//! matching does.
//!
//! ```rust,no_run
//! use coordination_core_nats::NatsBroker;
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let conn = nats::connect("nats://127.0.0.1:4222")?;
//! let broker = NatsBroker::new(conn);
//! broker.publish("orders:created", b"payload").await.ok();
//! # Ok(()) }
//! ```
#![cfg(feature = "client")]

use async_trait::async_trait;
use coordination_core::event::{BrokerError, BrokerHandler, ChannelBroker};

#[derive(Clone)]
pub struct NatsBroker {
    conn: nats::Connection,
}

impl NatsBroker {
    pub fn new(conn: nats::Connection) -> Self {
        Self { conn }
    }

    fn subject(channel: &str) -> String {
        channel.replace(':', ".")
    }
}

#[async_trait]
impl ChannelBroker for NatsBroker {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let subject = Self::subject(channel);
        let conn = self.conn.clone();
        let payload = payload.to_vec();
        tokio::task::spawn_blocking(move || conn.publish(&subject, payload))
            .await
            .map_err(|e| BrokerError(format!("nats publish task panicked: {e}")))?
            .map_err(|e| BrokerError(format!("nats publish failed: {e}")))
    }

    async fn subscribe(&self, pattern: &str, handler: BrokerHandler) -> Result<(), BrokerError> {
        let subject = Self::subject(pattern);
        let conn = self.conn.clone();
        let sub = std::sync::Arc::new(
            tokio::task::spawn_blocking(move || conn.subscribe(&subject))
                .await
                .map_err(|e| BrokerError(format!("nats subscribe task panicked: {e}")))?
                .map_err(|e| BrokerError(format!("nats subscribe failed: {e}")))?,
        );

        tokio::spawn(async move {
            loop {
                let sub = sub.clone();
                let next = tokio::task::spawn_blocking(move || sub.next()).await;
                match next {
                    Ok(Some(msg)) => handler(&msg.subject.replace('.', ":"), &msg.data).await,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("nats subscription task panicked: {e}");
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || conn.close())
            .await
            .map_err(|e| BrokerError(format!("nats close task panicked: {e}")))?;
        Ok(())
    }
}
