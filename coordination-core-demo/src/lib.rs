//! Shared scaffolding for the runnable examples in this crate: a small
//! in-memory storage adapter and a helper that wires up a
//! [`ServiceManager`], [`EventBus`], and [`PipelineEngine`] sharing one
//! [`MemoryMetrics`] sink, the way an embedder typically bootstraps all
//! three subsystems together.

use async_trait::async_trait;
use coordination_core::config::{EventBusConfig, PipelineConfig as PipelineDefaults, ServiceManagerConfig};
use coordination_core::error::CoreError;
use coordination_core::event::EventBus;
use coordination_core::metrics::MemoryMetrics;
use coordination_core::pipeline::{Cursor, PipelineEngine, StorageAdapter};
use coordination_core::service_manager::ServiceManager;
use serde_json::Value;
use std::sync::{Arc, Mutex};

pub struct Coordinator {
    pub services: ServiceManager,
    pub events: Arc<EventBus>,
    pub pipelines: Arc<PipelineEngine>,
    pub metrics: Arc<MemoryMetrics>,
}

pub fn bootstrap() -> Coordinator {
    let metrics = Arc::new(MemoryMetrics::new());
    let services = ServiceManager::with_metrics(ServiceManagerConfig::default(), metrics.clone());
    let events = Arc::new(EventBus::new(EventBusConfig::default(), metrics.clone()));
    let pipelines = Arc::new(PipelineEngine::with_metrics(PipelineDefaults::default(), events.clone(), metrics.clone()));
    Coordinator { services, events, pipelines, metrics }
}

/// An in-process, `Mutex<Vec<Value>>`-backed adapter for demos that don't
/// want to stand up a real external system. Registers under whatever type
/// name the example chooses.
#[derive(Default)]
pub struct MemoryAdapter {
    items: Mutex<Vec<Value>>,
}

struct MemoryCursor {
    remaining: std::vec::IntoIter<Value>,
}

#[async_trait]
impl Cursor for MemoryCursor {
    async fn next(&mut self, batch_size: usize) -> Result<Vec<Value>, CoreError> {
        Ok((&mut self.remaining).take(batch_size).collect())
    }
}

impl MemoryAdapter {
    pub fn seed(items: Vec<Value>) -> Arc<Self> {
        Arc::new(Self { items: Mutex::new(items) })
    }

    pub fn written(&self) -> Vec<Value> {
        self.items.lock().expect("MemoryAdapter: mutex poisoned").clone()
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn create_cursor(&self, _source_config: Value) -> Result<Box<dyn Cursor>, CoreError> {
        let items = self.items.lock().expect("MemoryAdapter: mutex poisoned").clone();
        Ok(Box::new(MemoryCursor { remaining: items.into_iter() }))
    }

    async fn write_batch(&self, items: Vec<Value>, _destination_config: Value) -> Result<(), CoreError> {
        self.items.lock().expect("MemoryAdapter: mutex poisoned").extend(items);
        Ok(())
    }
}
