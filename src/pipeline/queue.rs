//! Bounded Work Queue: the cooperative worker pool a pipeline submits
//! items to.
//!
//! Enforces two independent limits: a `concurrency` in-flight cap via a
//! `tokio::sync::Semaphore` acquired with `acquire_owned().await` (block
//! on full rather than `bulkhead.rs`'s reject-on-full `try_acquire`), and
//! a `(interval, intervalCap)` rate limit via
//! [`crate::rate_limit::strategies::TokenBucket`] mapped onto a
//! tokens-per-second refill rate. Pausing blocks new submissions at the
//! next await point without affecting work already admitted.

use crate::rate_limit::store::InMemoryTokenStore;
use crate::rate_limit::strategies::TokenBucket;
use crate::rate_limit::{Decision, RateLimiter};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

pub struct WorkQueue {
    semaphore: Arc<Semaphore>,
    limiter: Arc<dyn RateLimiter>,
    paused: AtomicBool,
    resume_notify: Notify,
    in_flight: AtomicUsize,
    idle_notify: Notify,
}

impl WorkQueue {
    pub fn new(concurrency: usize, interval: Duration, interval_cap: u32) -> Self {
        let interval_secs = interval.as_secs_f64().max(0.001);
        let rate = interval_cap as f64 / interval_secs;
        let limiter = TokenBucket::new(InMemoryTokenStore::new(), "pipeline-queue", rate, interval_cap as f64);
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            limiter: Arc::new(limiter),
            paused: AtomicBool::new(false),
            resume_notify: Notify::new(),
            in_flight: AtomicUsize::new(0),
            idle_notify: Notify::new(),
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.resume_notify.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    async fn wait_if_paused(&self) {
        while self.paused.load(Ordering::SeqCst) {
            self.resume_notify.notified().await;
        }
    }

    async fn wait_for_rate_limit(&self) {
        loop {
            match self.limiter.acquire(1).await {
                Ok(Decision::Allowed { .. }) => return,
                Ok(Decision::Denied { wait, .. }) => tokio::time::sleep(wait).await,
                Err(_) => return,
            }
        }
    }

    /// Admits one unit of work: waits out a pause, waits out the rate
    /// limit, then blocks until a concurrency slot is free, runs `task`,
    /// and releases the slot. Concurrency permits are tracked for
    /// [`Self::flush`] to observe when the queue goes idle.
    pub async fn submit<F>(&self, task: F) -> F::Output
    where
        F: Future + Send,
    {
        self.wait_if_paused().await;
        self.wait_for_rate_limit().await;

        let permit = self.semaphore.clone().acquire_owned().await.expect("queue semaphore is never closed");
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = task.await;
        drop(permit);
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle_notify.notify_waiters();
        }
        result
    }

    /// Waits until in-flight work reaches zero, or `deadline` elapses if
    /// given.
    pub async fn flush(&self, deadline: Option<Duration>) {
        if self.in_flight.load(Ordering::SeqCst) == 0 {
            return;
        }
        let wait = self.idle_notify.notified();
        match deadline {
            Some(d) => {
                let _ = tokio::time::timeout(d, wait).await;
            }
            None => wait.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    #[tokio::test]
    async fn respects_concurrency_cap() {
        let queue = Arc::new(WorkQueue::new(2, Duration::from_millis(1), 1000));
        let peak = Arc::new(StdAtomicUsize::new(0));
        let current = Arc::new(StdAtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let queue = queue.clone();
            let peak = peak.clone();
            let current = current.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .submit(async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn pause_blocks_new_submissions() {
        let queue = Arc::new(WorkQueue::new(4, Duration::from_millis(1), 1000));
        queue.pause();

        let queue_clone = queue.clone();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        let handle = tokio::spawn(async move {
            queue_clone.submit(async move { ran_clone.store(true, Ordering::SeqCst) }).await;
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!ran.load(Ordering::SeqCst));

        queue.resume();
        handle.await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn flush_waits_for_in_flight_to_drain() {
        let queue = Arc::new(WorkQueue::new(4, Duration::from_millis(1), 1000));
        let queue_clone = queue.clone();
        let handle = tokio::spawn(async move {
            queue_clone.submit(async { tokio::time::sleep(Duration::from_millis(30)).await }).await;
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(queue.in_flight(), 1);
        queue.flush(Some(Duration::from_secs(1))).await;
        assert_eq!(queue.in_flight(), 0);
        handle.await.unwrap();
    }
}
