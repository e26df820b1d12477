//! Storage Adapter contract: what the Pipeline Engine consumes from a
//! source/destination binding, looked up by a `type` string in a map the
//! embedder populates (adapter crates register themselves here; the core
//! never constructs one itself).

use crate::error::CoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Pulls batches from a source. A batch shorter than the requested size
/// (including empty) signals the cursor is exhausted — see the open
/// question on cursor termination in the top-level design notes.
#[async_trait]
pub trait Cursor: Send {
    async fn next(&mut self, batch_size: usize) -> Result<Vec<Value>, CoreError>;
}

/// External I/O binding keyed by a `type` string.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn create_cursor(&self, source_config: Value) -> Result<Box<dyn Cursor>, CoreError>;

    async fn write_batch(&self, items: Vec<Value>, destination_config: Value) -> Result<(), CoreError>;

    async fn close(&self) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Embedder-populated map of adapter `type` name to implementation.
#[derive(Default)]
pub struct AdapterRegistry {
    entries: RwLock<HashMap<String, Arc<dyn StorageAdapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, type_name: impl Into<String>, adapter: Arc<dyn StorageAdapter>) {
        self.entries.write().expect("AdapterRegistry: lock poisoned").insert(type_name.into(), adapter);
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<dyn StorageAdapter>> {
        self.entries.read().expect("AdapterRegistry: lock poisoned").get(type_name).cloned()
    }

    pub fn require(&self, type_name: &str) -> Result<Arc<dyn StorageAdapter>, CoreError> {
        self.get(type_name).ok_or_else(|| CoreError::UnknownAdapter { type_name: type_name.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullCursor;

    #[async_trait]
    impl Cursor for NullCursor {
        async fn next(&mut self, _batch_size: usize) -> Result<Vec<Value>, CoreError> {
            Ok(Vec::new())
        }
    }

    struct NullAdapter;

    #[async_trait]
    impl StorageAdapter for NullAdapter {
        async fn create_cursor(&self, _source_config: Value) -> Result<Box<dyn Cursor>, CoreError> {
            Ok(Box::new(NullCursor))
        }

        async fn write_batch(&self, _items: Vec<Value>, _destination_config: Value) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[test]
    fn require_fails_with_unknown_adapter() {
        let registry = AdapterRegistry::new();
        let err = registry.require("jsonl").unwrap_err();
        assert!(matches!(err, CoreError::UnknownAdapter { .. }));
    }

    #[tokio::test]
    async fn registered_adapter_is_retrievable() {
        let registry = AdapterRegistry::new();
        registry.register("jsonl", Arc::new(NullAdapter));
        let adapter = registry.require("jsonl").unwrap();
        let mut cursor = adapter.create_cursor(Value::Null).await.unwrap();
        assert_eq!(cursor.next(10).await.unwrap().len(), 0);
    }
}
