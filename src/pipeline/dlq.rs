//! Dead-Letter Queue: bounded FIFO of failed items, drop-oldest on
//! overflow.
//!
//! Grounded on `telemetry/sinks.rs::MemorySink`'s bounded-ring shape,
//! specialized to DLQ entries; eviction here is purely capacity-driven
//! (no TTL, unlike `event/history.rs`).

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::SystemTime;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DlqEntry {
    pub item: Value,
    pub pipeline_id: Uuid,
    pub execution_id: Uuid,
    pub error: String,
    pub attempt_count: u32,
    pub timestamp: SystemTime,
}

pub struct DeadLetterQueue {
    capacity: usize,
    entries: Mutex<VecDeque<DlqEntry>>,
}

impl DeadLetterQueue {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: Mutex::new(VecDeque::new()) }
    }

    /// Pushes `entry`, dropping the oldest entry if at capacity. Returns
    /// `true` if an eviction occurred (the caller surfaces this as a
    /// `DLQOverflow` signal).
    pub fn push(&self, entry: DlqEntry) -> bool {
        if self.capacity == 0 {
            return true;
        }
        let mut guard = self.entries.lock().expect("DeadLetterQueue: lock poisoned");
        let overflowed = guard.len() >= self.capacity;
        if overflowed {
            guard.pop_front();
        }
        guard.push_back(entry);
        overflowed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("DeadLetterQueue: lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Oldest-first snapshot of current entries.
    pub fn snapshot(&self) -> Vec<DlqEntry> {
        self.entries.lock().expect("DeadLetterQueue: lock poisoned").iter().cloned().collect()
    }

    /// Drains every entry (oldest first), leaving the queue empty. Entries
    /// a handler rejects are the caller's responsibility to re-enqueue via
    /// [`Self::push`].
    pub fn drain(&self) -> Vec<DlqEntry> {
        self.entries.lock().expect("DeadLetterQueue: lock poisoned").drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64) -> DlqEntry {
        DlqEntry {
            item: serde_json::json!({ "id": id }),
            pipeline_id: Uuid::nil(),
            execution_id: Uuid::nil(),
            error: "boom".to_string(),
            attempt_count: 3,
            timestamp: SystemTime::now(),
        }
    }

    #[test]
    fn drops_oldest_on_overflow() {
        let dlq = DeadLetterQueue::new(2);
        assert!(!dlq.push(entry(1)));
        assert!(!dlq.push(entry(2)));
        assert!(dlq.push(entry(3)));

        let snapshot = dlq.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].item["id"], 2);
        assert_eq!(snapshot[1].item["id"], 3);
    }

    #[test]
    fn drain_empties_the_queue() {
        let dlq = DeadLetterQueue::new(10);
        dlq.push(entry(1));
        dlq.push(entry(2));

        let drained = dlq.drain();
        assert_eq!(drained.len(), 2);
        assert!(dlq.is_empty());
    }
}
