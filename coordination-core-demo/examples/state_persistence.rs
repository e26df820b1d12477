//! Demonstrates pipeline state surviving a drain/replay cycle: run a
//! pipeline to completion, inspect its accumulated stats, then persist the
//! items a failing processor sent to the dead-letter queue so a later
//! process can pick them back up.

use coordination_core::pipeline::{ExecuteOptions, PipelineConfig, Processor, StageError};
use coordination_core_demo::{bootstrap, MemoryAdapter};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;

struct RejectNegative;

#[async_trait::async_trait]
impl Processor for RejectNegative {
    async fn apply(&self, item: Value) -> Result<Value, StageError> {
        match item.get("amount").and_then(Value::as_i64) {
            Some(n) if n < 0 => Err(StageError("amount must not be negative".to_string())),
            _ => Ok(item),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dlq_snapshot_path = Path::new("dlq-snapshot.json");

    let coordinator = bootstrap();
    coordinator.pipelines.register_processor("reject-negative", Arc::new(RejectNegative));

    let source = MemoryAdapter::seed(vec![
        json!({"amount": 10}),
        json!({"amount": -5}),
        json!({"amount": 20}),
    ]);
    let destination = MemoryAdapter::seed(vec![]);
    coordinator.pipelines.register_adapter("memory-source", source.clone());
    coordinator.pipelines.register_adapter("memory-destination", destination.clone());

    let mut config = PipelineConfig::new("orders", "memory-source", "memory-destination");
    config.processors = vec!["reject-negative".to_string()];
    config.batch_size = 10;
    let pipeline_id = coordinator.pipelines.register_pipeline(config)?;

    coordinator.pipelines.execute(pipeline_id, ExecuteOptions::default()).await?;

    let written = destination.written();
    println!("Items that reached the destination: {written:?}");

    let dlq = coordinator.pipelines.dead_letter_queue(pipeline_id);
    println!("Dead-letter entries: {}", dlq.len());

    let snapshot: Vec<Value> = dlq.iter().map(|e| e.item.clone()).collect();
    fs::write(dlq_snapshot_path, serde_json::to_string_pretty(&snapshot)?)?;
    println!("Persisted dead-letter snapshot to {}", dlq_snapshot_path.display());

    Ok(())
}
