//! Elasticsearch storage adapter for `coordination-core`'s pipeline engine.
//! Registers under the `"elasticsearch"` type name. Primarily
//! destination-oriented: [`ElasticAdapter::write_batch`] bulk-indexes items;
//! [`ElasticAdapter::create_cursor`] does a plain `match_all` scroll for the
//! less common case of using an index as a pipeline source.
//!
//! Bring your own connected `elasticsearch::Elasticsearch` client.

use async_trait::async_trait;
use coordination_core::error::CoreError;
use coordination_core::pipeline::{Cursor, StorageAdapter};
use elasticsearch::{http::transport::Transport, BulkParts, Elasticsearch, SearchParts};
use serde_json::Value;

#[derive(Clone)]
pub struct ElasticAdapter {
    client: Elasticsearch,
}

impl ElasticAdapter {
    pub fn new(client: Elasticsearch) -> Self {
        Self { client }
    }

    pub fn connect(url: &str) -> Result<Self, CoreError> {
        let transport = Transport::single_node(url).map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        Ok(Self { client: Elasticsearch::new(transport) })
    }
}

fn config_index(config: &Value) -> Result<String, CoreError> {
    config
        .get("index")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CoreError::InvalidConfig("elasticsearch adapter config requires an \"index\" string".to_string()))
}

struct ElasticCursor {
    client: Elasticsearch,
    index: String,
    offset: usize,
}

#[async_trait]
impl Cursor for ElasticCursor {
    async fn next(&mut self, batch_size: usize) -> Result<Vec<Value>, CoreError> {
        let response = self
            .client
            .search(SearchParts::Index(&[&self.index]))
            .from(self.offset as i64)
            .size(batch_size as i64)
            .body(serde_json::json!({ "query": { "match_all": {} } }))
            .send()
            .await
            .map_err(|e| CoreError::AdapterError { type_name: "elasticsearch".to_string(), message: e.to_string() })?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| CoreError::AdapterError { type_name: "elasticsearch".to_string(), message: e.to_string() })?;

        let hits = body["hits"]["hits"].as_array().cloned().unwrap_or_default();
        self.offset += hits.len();
        Ok(hits.into_iter().map(|h| h["_source"].clone()).collect())
    }
}

#[async_trait]
impl StorageAdapter for ElasticAdapter {
    async fn create_cursor(&self, source_config: Value) -> Result<Box<dyn Cursor>, CoreError> {
        let index = config_index(&source_config)?;
        Ok(Box::new(ElasticCursor { client: self.client.clone(), index, offset: 0 }))
    }

    async fn write_batch(&self, items: Vec<Value>, destination_config: Value) -> Result<(), CoreError> {
        if items.is_empty() {
            return Ok(());
        }
        let index = config_index(&destination_config)?;

        let mut body: Vec<elasticsearch::BulkOperation<Value>> = Vec::with_capacity(items.len());
        for item in items {
            body.push(elasticsearch::BulkOperation::index(item).into());
        }

        let response = self
            .client
            .bulk(BulkParts::Index(&index))
            .body(body)
            .send()
            .await
            .map_err(|e| CoreError::AdapterError { type_name: "elasticsearch".to_string(), message: e.to_string() })?;

        if !response.status_code().is_success() {
            return Err(CoreError::AdapterError {
                type_name: "elasticsearch".to_string(),
                message: format!("bulk index returned {}", response.status_code()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_index_requires_index_field() {
        let err = config_index(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }
}
