//! Pipeline Registry: in-memory catalog of pipeline definitions, the same
//! id+name-indexed shape as [`crate::registry::ServiceRegistry`].

use super::processor::Filter;
use crate::error::CoreError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub retries: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self { retries: 2, min_backoff: Duration::from_millis(100), max_backoff: Duration::from_secs(10) }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleConfig {
    pub interval: Option<Duration>,
    /// Accepted and stored, never evaluated — see the design ledger's
    /// open-question resolution on cron scheduling.
    pub cron: Option<String>,
}

/// Registration input for [`PipelineRegistry::register`].
pub struct PipelineConfig {
    pub name: String,
    pub source_type: String,
    pub source_config: serde_json::Value,
    pub destination_type: String,
    pub destination_config: serde_json::Value,
    pub processors: Vec<String>,
    pub transformers: Vec<String>,
    pub filters: Vec<Filter>,
    pub batch_size: usize,
    pub concurrency: usize,
    pub retry: RetryOptions,
    pub enabled: bool,
    pub schedule: Option<ScheduleConfig>,
    pub triggers: Vec<String>,
    pub metadata: serde_json::Value,
}

impl PipelineConfig {
    pub fn new(name: impl Into<String>, source_type: impl Into<String>, destination_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_type: source_type.into(),
            source_config: serde_json::Value::Null,
            destination_type: destination_type.into(),
            destination_config: serde_json::Value::Null,
            processors: Vec::new(),
            transformers: Vec::new(),
            filters: Vec::new(),
            batch_size: 100,
            concurrency: 10,
            retry: RetryOptions::default(),
            enabled: true,
            schedule: None,
            triggers: Vec::new(),
            metadata: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub last_run: Option<SystemTime>,
    pub runs: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_processed: u64,
    pub avg_duration: Duration,
}

impl PipelineStats {
    fn record(&mut self, succeeded: bool, processed: u64, duration: Duration) {
        self.last_run = Some(SystemTime::now());
        self.runs += 1;
        self.total_processed += processed;
        if succeeded {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        let prior_weight = (self.runs - 1) as u32;
        self.avg_duration = (self.avg_duration * prior_weight + duration) / self.runs as u32;
    }
}

pub struct PipelineRecord {
    pub id: Uuid,
    pub config: PipelineConfig,
    pub stats: PipelineStats,
}

/// Cloneable view of a pipeline's configuration and stats, without the
/// non-cloneable filter closures.
#[derive(Clone)]
pub struct PipelineSnapshot {
    pub id: Uuid,
    pub name: String,
    pub source_type: String,
    pub destination_type: String,
    pub processors: Vec<String>,
    pub transformers: Vec<String>,
    pub triggers: Vec<String>,
    pub batch_size: usize,
    pub concurrency: usize,
    pub enabled: bool,
    pub schedule: Option<ScheduleConfig>,
    pub stats: PipelineStats,
}

impl From<&PipelineRecord> for PipelineSnapshot {
    fn from(r: &PipelineRecord) -> Self {
        Self {
            id: r.id,
            name: r.config.name.clone(),
            source_type: r.config.source_type.clone(),
            destination_type: r.config.destination_type.clone(),
            processors: r.config.processors.clone(),
            transformers: r.config.transformers.clone(),
            triggers: r.config.triggers.clone(),
            batch_size: r.config.batch_size,
            concurrency: r.config.concurrency,
            enabled: r.config.enabled,
            schedule: r.config.schedule.clone(),
            stats: r.stats.clone(),
        }
    }
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<Uuid, PipelineRecord>,
    by_name: HashMap<String, Uuid>,
}

#[derive(Default)]
pub struct PipelineRegistry {
    inner: RwLock<Inner>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, config: PipelineConfig) -> Result<Uuid, CoreError> {
        if config.name.trim().is_empty() {
            return Err(CoreError::InvalidConfig("pipeline name must not be empty".to_string()));
        }

        let mut guard = self.inner.write().expect("PipelineRegistry: lock poisoned");
        if guard.by_name.contains_key(&config.name) {
            return Err(CoreError::DuplicateName { name: config.name });
        }

        let id = Uuid::new_v4();
        guard.by_name.insert(config.name.clone(), id);
        guard.by_id.insert(id, PipelineRecord { id, config, stats: PipelineStats::default() });
        Ok(id)
    }

    pub fn get_snapshot(&self, id: Uuid) -> Option<PipelineSnapshot> {
        self.inner.read().expect("PipelineRegistry: lock poisoned").by_id.get(&id).map(PipelineSnapshot::from)
    }

    pub fn id_by_name(&self, name: &str) -> Option<Uuid> {
        self.inner.read().expect("PipelineRegistry: lock poisoned").by_name.get(name).copied()
    }

    pub fn list(&self) -> Vec<PipelineSnapshot> {
        let guard = self.inner.read().expect("PipelineRegistry: lock poisoned");
        let mut out: Vec<_> = guard.by_id.values().map(PipelineSnapshot::from).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Pipelines whose `triggers` contain a pattern matching `topic`.
    pub fn find_triggered_by(&self, topic: &str) -> Vec<Uuid> {
        let guard = self.inner.read().expect("PipelineRegistry: lock poisoned");
        guard
            .by_id
            .values()
            .filter(|r| r.config.triggers.iter().any(|t| crate::event::Pattern::new(t.clone()).matches(topic)))
            .map(|r| r.id)
            .collect()
    }

    pub fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<(), CoreError> {
        let mut guard = self.inner.write().expect("PipelineRegistry: lock poisoned");
        let record = guard.by_id.get_mut(&id).ok_or_else(|| CoreError::InvalidConfig(format!("no such pipeline {id}")))?;
        record.config.enabled = enabled;
        Ok(())
    }

    pub fn record_execution(&self, id: Uuid, succeeded: bool, processed: u64, duration: Duration) {
        let mut guard = self.inner.write().expect("PipelineRegistry: lock poisoned");
        if let Some(record) = guard.by_id.get_mut(&id) {
            record.stats.record(succeeded, processed, duration);
        }
    }

    /// Runs `f` with direct access to the stored record (for the engine,
    /// which needs the filter closures and adapter configs a snapshot
    /// deliberately omits).
    pub fn with_record<R>(&self, id: Uuid, f: impl FnOnce(&PipelineRecord) -> R) -> Option<R> {
        let guard = self.inner.read().expect("PipelineRegistry: lock poisoned");
        guard.by_id.get(&id).map(f)
    }

    pub fn remove(&self, id: Uuid) {
        let mut guard = self.inner.write().expect("PipelineRegistry: lock poisoned");
        if let Some(record) = guard.by_id.remove(&id) {
            guard.by_name.remove(&record.config.name);
        }
    }
}
