//! Demonstrates composing the three subsystems' telemetry: a service's
//! health transitions are relayed onto the Event Bus, where two independent
//! subscribers observe them — one logs, the other counts per-service
//! unhealthy transitions in memory. Shows health monitoring, pub/sub
//! fan-out, and the shared metrics sink working together.

use coordination_core::event::{PublishOptions, SubscribeOptions};
use coordination_core::metrics::MemoryMetrics;
use coordination_core::{ClosureService, EventBus, EventBusConfig, ServiceConfig, ServiceManager, ServiceManagerConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Telemetry Composition: Health -> Event Bus -> Subscribers ===\n");

    let metrics = Arc::new(MemoryMetrics::new());
    let events = Arc::new(EventBus::new(EventBusConfig::default(), metrics.clone()));

    let (health_tx, mut health_rx) = mpsc::unbounded_channel();
    let config = ServiceManagerConfig { health_check_interval: Duration::from_millis(20), ..ServiceManagerConfig::default() };
    let manager = Arc::new(ServiceManager::with_health_events(config, metrics.clone(), health_tx));

    let is_up = Arc::new(AtomicBool::new(true));
    let is_up_clone = is_up.clone();
    let handler = Arc::new(ClosureService::new(move || {
        let is_up = is_up_clone.clone();
        async move { Ok(is_up.load(Ordering::SeqCst)) }
    }));
    let service_id = manager.register(ServiceConfig::new("flaky-dependency", handler))?;
    manager.start(service_id).await?;

    // Relay health transitions from the channel onto the event bus.
    let relay_events = events.clone();
    let relay = tokio::spawn(async move {
        while let Some(event) = health_rx.recv().await {
            let payload = serde_json::json!({
                "service": event.service.to_string(),
                "healthy": event.healthy,
            });
            let _ = relay_events.publish("service.health", payload, PublishOptions::default()).await;
        }
    });

    // Subscriber 1: logs every transition.
    events
        .subscribe(
            "service.*",
            Arc::new(|event| Box::pin(async move { tracing::info!(topic = %event.topic, "health transition observed") })),
            SubscribeOptions::default(),
        )
        .await?;

    // Subscriber 2: counts unhealthy transitions per service.
    let unhealthy_counts: Arc<Mutex<HashMap<String, u64>>> = Arc::new(Mutex::new(HashMap::new()));
    let counts = unhealthy_counts.clone();
    events
        .subscribe(
            "service.health",
            Arc::new(move |event| {
                let counts = counts.clone();
                Box::pin(async move {
                    if event.data.get("healthy").and_then(serde_json::Value::as_bool) == Some(false) {
                        if let Some(service) = event.data.get("service").and_then(serde_json::Value::as_str) {
                            *counts.lock().expect("unhealthy_counts: mutex poisoned").entry(service.to_string()).or_insert(0) += 1;
                        }
                    }
                })
            }),
            SubscribeOptions::default(),
        )
        .await?;

    println!("Service is healthy; the monitor sweep should produce no unhealthy transitions yet.");

    println!("\nFlipping the dependency unhealthy...");
    is_up.store(false, Ordering::SeqCst);
    manager.spawn_health_monitor();
    tokio::time::sleep(Duration::from_millis(100)).await;

    manager.shutdown().await?;
    events.close().await;
    relay.abort();

    println!("\nUnhealthy transitions observed per service:");
    for (service, count) in unhealthy_counts.lock().expect("unhealthy_counts: mutex poisoned").iter() {
        println!("  - {service}: {count}");
    }

    Ok(())
}
