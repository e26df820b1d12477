#![cfg(feature = "client")]
//! Kafka channel broker for `coordination-core`'s event bus.
//!
//! `channel` (`<namespace>:<topic>`) maps directly to a Kafka topic name with
//! `:` replaced by `.`. `subscribe` spawns a dedicated consumer group per
//! call; Kafka has no server-side wildcard routing, so `pattern` must name
//! one concrete topic, not a glob.

use async_trait::async_trait;
use coordination_core::event::{BrokerError, BrokerHandler, ChannelBroker};
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;

#[derive(Clone)]
pub struct KafkaBroker {
    producer: FutureProducer,
    brokers: String,
}

impl KafkaBroker {
    pub fn new(producer: FutureProducer, brokers: impl Into<String>) -> Self {
        Self { producer, brokers: brokers.into() }
    }

    fn topic(channel: &str) -> String {
        channel.replace(':', ".")
    }
}

#[async_trait]
impl ChannelBroker for KafkaBroker {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let topic = Self::topic(channel);
        let record = FutureRecord::<(), _>::to(&topic).payload(payload);
        self.producer
            .send(record, std::time::Duration::from_secs(5))
            .await
            .map_err(|(e, _)| BrokerError(format!("kafka send failed: {e}")))?;
        Ok(())
    }

    async fn subscribe(&self, pattern: &str, handler: BrokerHandler) -> Result<(), BrokerError> {
        let topic = Self::topic(pattern);
        let group_id = format!("coordination-core-{}", uuid::Uuid::new_v4());
        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", &group_id)
            .set("bootstrap.servers", &self.brokers)
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| BrokerError(format!("kafka consumer creation failed: {e}")))?;
        consumer
            .subscribe(&[&topic])
            .map_err(|e| BrokerError(format!("kafka subscribe failed: {e}")))?;

        let channel = pattern.to_string();
        tokio::spawn(async move {
            loop {
                match consumer.recv().await {
                    Ok(msg) => {
                        if let Some(payload) = msg.payload() {
                            handler(&channel, payload).await;
                        }
                    }
                    Err(e) => {
                        tracing::error!("kafka consumer error on {channel}: {e}");
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_translates_colon_to_dot() {
        assert_eq!(KafkaBroker::topic("orders:created"), "orders.created");
    }
}
