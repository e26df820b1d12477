//! Line-delimited JSON file storage adapter for `coordination-core`'s
//! pipeline engine. Registers under the `"jsonl"` type name.
//!
//! Source config: `{ "path": "<file>" }`, read from the start on
//! [`JsonlAdapter::create_cursor`] and advanced batch by batch. Destination
//! config: `{ "path": "<file>" }`, appended to (created if missing) on
//! every [`JsonlAdapter::write_batch`].

use async_trait::async_trait;
use coordination_core::error::CoreError;
use coordination_core::pipeline::{Cursor, StorageAdapter};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonlAdapter;

fn config_path(config: &Value) -> Result<String, CoreError> {
    config
        .get("path")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CoreError::InvalidConfig("jsonl adapter config requires a \"path\" string".to_string()))
}

struct JsonlCursor {
    lines: tokio::io::Lines<BufReader<tokio::fs::File>>,
}

#[async_trait]
impl Cursor for JsonlCursor {
    async fn next(&mut self, batch_size: usize) -> Result<Vec<Value>, CoreError> {
        let mut batch = Vec::with_capacity(batch_size);
        while batch.len() < batch_size {
            match self
                .lines
                .next_line()
                .await
                .map_err(|e| CoreError::AdapterError { type_name: "jsonl".to_string(), message: e.to_string() })?
            {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    let value: Value = serde_json::from_str(&line).map_err(|e| CoreError::AdapterError {
                        type_name: "jsonl".to_string(),
                        message: format!("malformed json line: {e}"),
                    })?;
                    batch.push(value);
                }
                None => break,
            }
        }
        Ok(batch)
    }
}

#[async_trait]
impl StorageAdapter for JsonlAdapter {
    async fn create_cursor(&self, source_config: Value) -> Result<Box<dyn Cursor>, CoreError> {
        let path = config_path(&source_config)?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| CoreError::AdapterError { type_name: "jsonl".to_string(), message: e.to_string() })?;
        Ok(Box::new(JsonlCursor { lines: BufReader::new(file).lines() }))
    }

    async fn write_batch(&self, items: Vec<Value>, destination_config: Value) -> Result<(), CoreError> {
        let path = config_path(&destination_config)?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| CoreError::AdapterError { type_name: "jsonl".to_string(), message: e.to_string() })?;
        for item in items {
            let mut line = item.to_string();
            line.push('\n');
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| CoreError::AdapterError { type_name: "jsonl".to_string(), message: e.to_string() })?;
        }
        file.flush().await.map_err(|e| CoreError::AdapterError { type_name: "jsonl".to_string(), message: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn write_then_read_round_trips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let config = json!({ "path": path.to_string_lossy() });

        let adapter = JsonlAdapter;
        adapter.write_batch(vec![json!({"id": 1}), json!({"id": 2})], config.clone()).await.unwrap();

        let mut cursor = adapter.create_cursor(config).await.unwrap();
        let batch = cursor.next(10).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0]["id"], 1);
    }

    #[tokio::test]
    async fn create_cursor_fails_without_a_path() {
        let adapter = JsonlAdapter;
        let err = adapter.create_cursor(json!({})).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }
}
