//! Minimal service-manager example: a service whose `start` fails twice
//! before succeeding, driven through the crate's resilience primitives
//! directly rather than through the manager (which does not retry `start`
//! on its own).

use coordination_core::{Backoff, ClosureService, CoreError, RetryPolicy, ServiceConfig, ServiceManager, ServiceManagerConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Retry-Driven Service Start ===\n");

    let retry_policy = RetryPolicy::<CoreError>::builder()
        .max_attempts(4)?
        .backoff(Backoff::exponential(Duration::from_millis(50)))
        .should_retry(|err: &CoreError| matches!(err, CoreError::InvalidConfig(_)))
        .build();

    let attempt = Arc::new(AtomicUsize::new(0));
    let attempt_clone = attempt.clone();
    let handler = Arc::new(ClosureService::new(|| async { Ok(true) }).with_start(move || {
        let attempt = attempt_clone.clone();
        async move {
            let n = attempt.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(CoreError::InvalidConfig("upstream not ready yet".to_string()))
            } else {
                Ok(())
            }
        }
    }));

    let manager = ServiceManager::new(ServiceManagerConfig::default());
    let id = manager.register(ServiceConfig::new("upstream-client", handler))?;

    println!("Starting service through a retry policy (expect two failures then success)...");
    retry_policy
        .execute(|| {
            let manager = &manager;
            async move { manager.start(id).await }
        })
        .await
        .map_err(|err| format!("service never started: {err}"))?;

    let status = manager.status(id).expect("service registered");
    println!("✓ Service is now {}", status.state.as_str());

    manager.stop_all().await?;
    Ok(())
}
