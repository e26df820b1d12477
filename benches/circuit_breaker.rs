use criterion::{black_box, criterion_group, criterion_main, Criterion};
use coordination_core::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerPolicy};
use coordination_core::ResilienceError;

use std::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
struct BenchError;

impl std::fmt::Display for BenchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bench error")
    }
}

impl std::error::Error for BenchError {}

fn circuit_breaker_throughput_success(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let config = CircuitBreakerConfig {
        failure_threshold: 10,
        recovery_timeout: Duration::from_secs(30),
        half_open_max_calls: 1,
    };
    let breaker = CircuitBreakerPolicy::with_config(config);

    c.bench_function("circuit_breaker_success_100k_rps", |b| {
        b.to_async(&rt).iter(|| async {
            let breaker = breaker.clone();
            let _ = black_box(
                breaker
                    .execute(|| async { Ok::<_, ResilienceError<BenchError>>("request") })
                    .await,
            );
        });
    });
}

fn circuit_breaker_throughput_failure(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let config = CircuitBreakerConfig {
        failure_threshold: 1,
        recovery_timeout: Duration::from_secs(30),
        half_open_max_calls: 1,
    };
    let breaker = CircuitBreakerPolicy::with_config(config);
    let calls = Arc::new(AtomicUsize::new(0));

    c.bench_function("circuit_breaker_failure_100k_rps", |b| {
        b.to_async(&rt).iter(|| async {
            let breaker = breaker.clone();
            let calls = calls.clone();
            let _ = black_box(
                breaker
                    .execute(|| {
                        let calls = calls.clone();
                        async move {
                            calls.fetch_add(1, Ordering::Relaxed);
                            Err::<&'static str, _>(ResilienceError::Inner(BenchError))
                        }
                    })
                    .await,
            );
        });
    });
}

criterion_group!(benches, circuit_breaker_throughput_success, circuit_breaker_throughput_failure);
criterion_main!(benches);
