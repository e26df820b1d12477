#![cfg(feature = "etcd-client")]

//! etcd key/value storage adapter for `coordination-core`'s pipeline engine.
//! Registers under the `"etcd"` type name. Keys are written as
//! `<prefix>/<nanos>-<uuid>`; reading a source fetches the whole prefix
//! once and paginates through it in memory, since etcd's range API has no
//! cursor concept of its own.

use async_trait::async_trait;
use coordination_core::error::CoreError;
use coordination_core::pipeline::{Cursor, StorageAdapter};
use etcd_client::{Client, GetOptions};
use serde_json::Value;

#[derive(Clone)]
pub struct EtcdAdapter {
    client: Client,
}

impl EtcdAdapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn config_prefix(config: &Value) -> Result<String, CoreError> {
    config
        .get("prefix")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CoreError::InvalidConfig("etcd adapter config requires a \"prefix\" string".to_string()))
}

struct EtcdCursor {
    remaining: std::vec::IntoIter<Value>,
}

#[async_trait]
impl Cursor for EtcdCursor {
    async fn next(&mut self, batch_size: usize) -> Result<Vec<Value>, CoreError> {
        Ok((&mut self.remaining).take(batch_size).collect())
    }
}

#[async_trait]
impl StorageAdapter for EtcdAdapter {
    async fn create_cursor(&self, source_config: Value) -> Result<Box<dyn Cursor>, CoreError> {
        let prefix = config_prefix(&source_config)?;
        let mut client = self.client.clone();
        let resp = client
            .get(prefix.as_str(), Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| CoreError::AdapterError { type_name: "etcd".to_string(), message: e.to_string() })?;

        let values = resp
            .kvs()
            .iter()
            .filter_map(|kv| std::str::from_utf8(kv.value()).ok())
            .filter_map(|s| serde_json::from_str::<Value>(s).ok())
            .collect::<Vec<_>>();

        Ok(Box::new(EtcdCursor { remaining: values.into_iter() }))
    }

    async fn write_batch(&self, items: Vec<Value>, destination_config: Value) -> Result<(), CoreError> {
        let prefix = config_prefix(&destination_config)?;
        let mut client = self.client.clone();
        for item in items {
            let ts = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
            let key = format!("{}/{}-{}", prefix, ts, uuid::Uuid::new_v4());
            client
                .put(key.clone(), item.to_string(), None)
                .await
                .map_err(|e| CoreError::AdapterError { type_name: "etcd".to_string(), message: e.to_string() })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_prefix_requires_prefix_field() {
        let err = config_prefix(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }
}
