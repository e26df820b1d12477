//! Interval-only pipeline scheduling with skip-if-running overlap policy.
//!
//! `schedule.cron` is accepted on `Pipeline` records for forward
//! compatibility with configuration that sets it, but only
//! `schedule.interval` is ever armed here — see the open-question
//! resolution on cron in the design ledger. Grounded on the teacher's
//! `tokio::time::interval` test convention (pause/advance rather than real
//! sleeps).

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Default)]
pub struct Scheduler {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a periodic timer that invokes `task` every `interval`. If a
    /// previous tick's `task` hasn't finished when the next tick fires,
    /// that tick is skipped rather than queued or run concurrently.
    /// Disarms any previously armed timer first.
    pub fn arm<F, Fut>(&self, interval: Duration, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.disarm();
        let running = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
                    tracing::debug!("scheduler tick skipped, previous run still in flight");
                    continue;
                }
                task().await;
                running.store(false, Ordering::SeqCst);
            }
        });
        *self.handle.lock().expect("Scheduler: lock poisoned") = Some(handle);
    }

    pub fn disarm(&self) {
        if let Some(handle) = self.handle.lock().expect("Scheduler: lock poisoned").take() {
            handle.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.lock().expect("Scheduler: lock poisoned").is_some()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn fires_on_each_interval() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        scheduler.arm(Duration::from_millis(100), move || {
            let count_clone = count_clone.clone();
            async move {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::advance(Duration::from_millis(350)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn skips_tick_when_previous_run_still_in_flight() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        scheduler.arm(Duration::from_millis(100), move || {
            let count_clone = count_clone.clone();
            async move {
                count_clone.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        });

        tokio::time::advance(Duration::from_millis(350)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1, "second tick at 200ms must be skipped while first run is still sleeping");
    }

    #[tokio::test]
    async fn disarm_stops_future_ticks() {
        let scheduler = Scheduler::new();
        assert!(!scheduler.is_armed());

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        scheduler.arm(Duration::from_millis(5), move || {
            let count_clone = count_clone.clone();
            async move {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert!(scheduler.is_armed());

        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.disarm();
        assert!(!scheduler.is_armed());
        let seen = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }
}
