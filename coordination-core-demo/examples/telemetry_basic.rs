//! Basic telemetry example: publish a few events and run a pipeline against
//! the shared [`MemoryMetrics`](coordination_core::metrics::MemoryMetrics)
//! sink every subsystem in a [`Coordinator`](coordination_core_demo::Coordinator)
//! reports through, then print what it observed.

use coordination_core::event::PublishOptions;
use coordination_core::pipeline::{ExecuteOptions, PipelineConfig};
use coordination_core_demo::{bootstrap, MemoryAdapter};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Telemetry: Event Bus ===\n");
    let coordinator = bootstrap();

    coordinator.events.publish("orders.created", json!({"id": 1}), PublishOptions::default()).await?;
    coordinator.events.publish("orders.created", json!({"id": 2}), PublishOptions::default()).await?;
    coordinator.events.publish("orders.shipped", json!({"id": 1}), PublishOptions::default()).await?;

    println!("Events published so far: {}", coordinator.metrics.events_published());

    println!("\n=== Telemetry: Pipeline Engine ===\n");
    let source = MemoryAdapter::seed(vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]);
    let destination = MemoryAdapter::seed(vec![]);
    coordinator.pipelines.register_adapter("memory-source", source);
    coordinator.pipelines.register_adapter("memory-destination", destination);

    let config = PipelineConfig::new("mirror", "memory-source", "memory-destination");
    let pipeline_id = coordinator.pipelines.register_pipeline(config)?;
    coordinator.pipelines.execute(pipeline_id, ExecuteOptions::default()).await?;

    println!("Pipeline executions started:   {}", coordinator.metrics.pipeline_executions_started());
    println!("Pipeline executions completed: {}", coordinator.metrics.pipeline_executions_completed());
    println!("Items processed:               {}", coordinator.metrics.pipeline_items_processed());

    Ok(())
}
