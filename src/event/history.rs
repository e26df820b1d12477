//! Bounded, per-`(namespace, topic)` event history with TTL eviction.
//!
//! Grounded on `telemetry/sinks.rs::MemorySink`'s bounded-`Vec`-with-
//! eviction-counter shape, generalized with a lazy TTL sweep: expired
//! entries are pruned on publish and on read rather than by a background
//! timer, since history is best-effort and read infrequently relative to
//! publish volume.

use super::Event;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::Duration;

/// A stored event plus its configured lifetime.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub event: Event,
    pub ttl: Duration,
}

impl HistoryEntry {
    fn is_expired(&self) -> bool {
        self.event.age() > self.ttl
    }
}

#[derive(Default)]
struct Topic {
    entries: VecDeque<HistoryEntry>,
}

/// Bounded ring buffer keyed by `(namespace, topic)`.
pub struct HistoryStore {
    max_size: usize,
    default_ttl: Duration,
    topics: RwLock<HashMap<(String, String), Topic>>,
}

impl HistoryStore {
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self { max_size, default_ttl, topics: RwLock::new(HashMap::new()) }
    }

    pub fn record(&self, event: Event, ttl: Option<Duration>) {
        if self.max_size == 0 {
            return;
        }
        let key = (event.namespace.clone(), event.topic.clone());
        let entry = HistoryEntry { event, ttl: ttl.unwrap_or(self.default_ttl) };

        let mut guard = self.topics.write().expect("HistoryStore: lock poisoned");
        let topic = guard.entry(key).or_default();
        prune_expired(&mut topic.entries);
        topic.entries.push_back(entry);
        while topic.entries.len() > self.max_size {
            topic.entries.pop_front();
        }
    }

    /// Oldest-first snapshot of live (non-expired) entries for
    /// `(namespace, topic)`, capped at `limit` most recent if given.
    pub fn get(&self, namespace: &str, topic: &str, limit: Option<usize>) -> Vec<Event> {
        let mut guard = self.topics.write().expect("HistoryStore: lock poisoned");
        let key = (namespace.to_string(), topic.to_string());
        let Some(stored) = guard.get_mut(&key) else { return Vec::new() };
        prune_expired(&mut stored.entries);

        let events: Vec<Event> = stored.entries.iter().map(|e| e.event.clone()).collect();
        match limit {
            Some(n) if n < events.len() => events[events.len() - n..].to_vec(),
            _ => events,
        }
    }

    pub fn len(&self, namespace: &str, topic: &str) -> usize {
        let mut guard = self.topics.write().expect("HistoryStore: lock poisoned");
        let key = (namespace.to_string(), topic.to_string());
        match guard.get_mut(&key) {
            Some(stored) => {
                prune_expired(&mut stored.entries);
                stored.entries.len()
            }
            None => 0,
        }
    }
}

fn prune_expired(entries: &mut VecDeque<HistoryEntry>) {
    while matches!(entries.front(), Some(e) if e.is_expired()) {
        entries.pop_front();
    }
}
