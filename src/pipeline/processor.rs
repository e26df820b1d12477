//! Processor/Transformer stages and their name registries.
//!
//! Grounded on the teacher's (dropped) `control/command.rs` `Command`
//! trait idiom — a label plus a boxed, cloneable implementation looked up
//! by name — generalized here to an async trait, since pipeline stages are
//! I/O-bound (processors) or at least may suspend (transformers).
//!
//! Processors are retried per item (`pipeline/engine.rs` wraps each
//! `Processor::apply` call in the configured `RetryPolicy`); transformers
//! are not, since they're expected to be pure. Filters are plain
//! predicates attached directly to a pipeline's configuration rather than
//! registered by name — unlike processors/transformers, the spec never
//! names a `registerFilter` operation.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageError(pub String);

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StageError {}

/// A stateful or side-effecting stage, applied per item under retry.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn apply(&self, item: Value) -> Result<Value, StageError>;
}

/// A pure, non-retried stage.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn apply(&self, item: Value) -> Value;
}

/// A predicate stage; `false` drops the item silently.
pub type Filter = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Name → implementation registry for processors. Registration is
/// idempotent in the sense the spec requires: overwriting a name with the
/// same behavior is observably a no-op, and a different implementation
/// simply replaces the previous one.
#[derive(Default)]
pub struct ProcessorRegistry {
    entries: RwLock<HashMap<String, Arc<dyn Processor>>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, processor: Arc<dyn Processor>) {
        self.entries.write().expect("ProcessorRegistry: lock poisoned").insert(name.into(), processor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Processor>> {
        self.entries.read().expect("ProcessorRegistry: lock poisoned").get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().expect("ProcessorRegistry: lock poisoned").contains_key(name)
    }
}

#[derive(Default)]
pub struct TransformerRegistry {
    entries: RwLock<HashMap<String, Arc<dyn Transformer>>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, transformer: Arc<dyn Transformer>) {
        self.entries.write().expect("TransformerRegistry: lock poisoned").insert(name.into(), transformer);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Transformer>> {
        self.entries.read().expect("TransformerRegistry: lock poisoned").get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().expect("TransformerRegistry: lock poisoned").contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Uppercase;

    #[async_trait]
    impl Processor for Uppercase {
        async fn apply(&self, item: Value) -> Result<Value, StageError> {
            match item.as_str() {
                Some(s) => Ok(Value::String(s.to_uppercase())),
                None => Err(StageError("expected string".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn register_overwrites_by_name() {
        let registry = ProcessorRegistry::new();
        registry.register("up", Arc::new(Uppercase));
        assert!(registry.contains("up"));

        let result = registry.get("up").unwrap().apply(Value::String("hi".to_string())).await.unwrap();
        assert_eq!(result, Value::String("HI".to_string()));

        registry.register("up", Arc::new(Uppercase));
        assert!(registry.contains("up"));
    }

    #[test]
    fn unknown_name_returns_none() {
        let registry = ProcessorRegistry::new();
        assert!(registry.get("missing").is_none());
    }
}
