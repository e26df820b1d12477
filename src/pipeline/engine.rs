//! Pipeline Engine: the scheduler that drives registered pipelines through
//! source cursor → filters → processors → transformers → destination
//! writer, with bounded concurrency, per-item retry, a dead-letter queue,
//! and triggered execution via the Event Bus.
//!
//! Grounded on the teacher's composition convention of building a single
//! policy-wrapped operation and calling it from a driving loop (see
//! `stack.rs`); here the "stack" is queue → retry → adapter/processor
//! rather than timeout → circuit breaker → retry.

use super::adapter::AdapterRegistry;
use super::dlq::{DeadLetterQueue, DlqEntry};
use super::processor::{ProcessorRegistry, StageError, Transformer, TransformerRegistry};
use super::queue::WorkQueue;
use super::registry::{PipelineConfig, PipelineRegistry, PipelineSnapshot};
use super::schedule::Scheduler;
use crate::config::PipelineConfig as PipelineDefaults;
use crate::error::{CoreError, ResilienceError};
use crate::event::{Event, EventBus, PublishOptions, SubscribeOptions};
use crate::metrics::{MetricsSink, NullMetrics};
use crate::retry::RetryPolicy;
use crate::Backoff;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use uuid::Uuid;

struct PipelineRuntime {
    queue: WorkQueue,
    dlq: DeadLetterQueue,
    scheduler: Scheduler,
}

/// Arguments to [`PipelineEngine::execute`] beyond the pipeline id.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Run even if the pipeline is disabled.
    pub force: bool,
    /// The Event Bus event that triggered this execution, if any.
    pub trigger_event: Option<Event>,
    /// Extra context data to carry alongside the trigger event.
    pub data: Option<Value>,
}

/// The outcome of a successful [`PipelineEngine::execute`] call.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub processed: u64,
    pub duration: Duration,
}

/// Drives registered pipelines: fetches batches from a source adapter,
/// runs them through filters/processors/transformers, and writes surviving
/// items to a destination adapter.
pub struct PipelineEngine {
    registry: Arc<PipelineRegistry>,
    processors: Arc<ProcessorRegistry>,
    transformers: Arc<TransformerRegistry>,
    adapters: Arc<AdapterRegistry>,
    runtimes: RwLock<HashMap<Uuid, Arc<PipelineRuntime>>>,
    events: Arc<EventBus>,
    metrics: Arc<dyn MetricsSink>,
    defaults: PipelineDefaults,
}

impl PipelineEngine {
    pub fn new(defaults: PipelineDefaults, events: Arc<EventBus>) -> Self {
        Self::with_metrics(defaults, events, Arc::new(NullMetrics))
    }

    pub fn with_metrics(defaults: PipelineDefaults, events: Arc<EventBus>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            registry: Arc::new(PipelineRegistry::new()),
            processors: Arc::new(ProcessorRegistry::new()),
            transformers: Arc::new(TransformerRegistry::new()),
            adapters: Arc::new(AdapterRegistry::new()),
            runtimes: RwLock::new(HashMap::new()),
            events,
            metrics,
            defaults,
        }
    }

    pub fn registry(&self) -> &Arc<PipelineRegistry> {
        &self.registry
    }

    pub fn register_processor(&self, name: impl Into<String>, processor: Arc<dyn super::processor::Processor>) {
        self.processors.register(name, processor);
    }

    pub fn register_transformer(&self, name: impl Into<String>, transformer: Arc<dyn Transformer>) {
        self.transformers.register(name, transformer);
    }

    pub fn register_adapter(&self, type_name: impl Into<String>, adapter: Arc<dyn super::adapter::StorageAdapter>) {
        self.adapters.register(type_name, adapter);
    }

    /// Fires `topic` onto the Event Bus without blocking the caller. Used
    /// from sync methods (`pause`, `resume`, `delete`, ...) that have no
    /// natural await point of their own.
    fn emit_fire_and_forget(&self, topic: &'static str, data: Value) {
        let events = self.events.clone();
        tokio::spawn(async move {
            let _ = events.publish(topic, data, PublishOptions::default()).await;
        });
    }

    /// Registers a pipeline definition, validating that its source and
    /// destination adapter types are known, and provisions its dedicated
    /// work queue, dead-letter queue, and scheduler.
    pub fn register_pipeline(self: &Arc<Self>, config: PipelineConfig) -> Result<Uuid, CoreError> {
        self.adapters.require(&config.source_type)?;
        self.adapters.require(&config.destination_type)?;

        let concurrency = config.concurrency;
        let schedule = config.schedule.clone();
        let id = self.registry.register(config)?;

        let runtime = Arc::new(PipelineRuntime {
            queue: WorkQueue::new(concurrency.max(1), self.defaults.interval, self.defaults.interval_cap),
            dlq: DeadLetterQueue::new(if self.defaults.dead_letter_queue { self.defaults.max_dlq_size } else { 0 }),
            scheduler: Scheduler::new(),
        });
        self.runtimes.write().expect("PipelineEngine: lock poisoned").insert(id, runtime);

        if let Some(interval) = schedule.and_then(|s| s.interval) {
            self.arm_schedule(id, interval);
        }

        tracing::info!(pipeline = %id, "pipeline registered");
        self.emit_fire_and_forget("pipeline.registered", json!({ "pipeline": id }));
        Ok(id)
    }

    fn arm_schedule(self: &Arc<Self>, id: Uuid, interval: Duration) {
        let engine = self.clone();
        let runtime = self.runtimes.read().expect("PipelineEngine: lock poisoned").get(&id).cloned();
        let Some(runtime) = runtime else { return };
        runtime.scheduler.arm(interval, move || {
            let engine = engine.clone();
            async move {
                if let Err(err) = engine.execute(id, ExecuteOptions::default()).await {
                    tracing::warn!(pipeline = %id, error = %err, "scheduled pipeline execution failed");
                }
            }
        });
    }

    /// Subscribes this engine to `data.*` on the Event Bus so pipelines
    /// whose `triggers` match an incoming event topic fire automatically,
    /// and to `pipeline.control.*` so `pause`/`resume`/`flush` can be
    /// driven remotely. Each registered pipeline is also armed if it
    /// carries a schedule.
    pub async fn start(self: &Arc<Self>) -> Result<(), CoreError> {
        for snapshot in self.registry.list() {
            if let Some(schedule) = &snapshot.schedule {
                if let Some(interval) = schedule.interval {
                    self.arm_schedule(snapshot.id, interval);
                }
            }
        }

        let engine = self.clone();
        let handler: crate::event::Handler = Arc::new(move |event: Event| {
            let engine = engine.clone();
            Box::pin(async move {
                let ids = engine.registry.find_triggered_by(&event.topic);
                for id in ids {
                    let engine = engine.clone();
                    let event = event.clone();
                    tokio::spawn(async move {
                        let options = ExecuteOptions {
                            force: false,
                            data: Some(event.data.clone()),
                            trigger_event: Some(event),
                        };
                        if let Err(err) = engine.execute(id, options).await {
                            tracing::warn!(pipeline = %id, error = %err, "triggered pipeline execution failed");
                        }
                    });
                }
            })
        });
        self.events.subscribe("data.*", handler, SubscribeOptions::default()).await?;

        let engine = self.clone();
        let control_handler: crate::event::Handler = Arc::new(move |event: Event| {
            let engine = engine.clone();
            Box::pin(async move {
                let Some(pipeline_id) =
                    event.data.get("pipelineId").and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok())
                else {
                    tracing::warn!(topic = %event.topic, "pipeline control event missing a valid pipelineId");
                    return;
                };
                match event.topic.rsplit('.').next() {
                    Some("pause") => engine.pause(pipeline_id),
                    Some("resume") => engine.resume(pipeline_id),
                    Some("flush") => engine.flush(pipeline_id, None).await,
                    other => tracing::warn!(topic = %event.topic, action = ?other, "unrecognized pipeline control event"),
                }
            })
        });
        self.events.subscribe("pipeline.control.*", control_handler, SubscribeOptions::default()).await?;
        Ok(())
    }

    /// Runs one full execution of a pipeline: pulls batches from its
    /// source cursor until a short batch signals exhaustion, processes and
    /// writes each one, and records stats. Returns once the source is
    /// drained, or `Err` the moment the source or destination fails.
    pub async fn execute(&self, id: Uuid, options: ExecuteOptions) -> Result<ExecutionResult, CoreError> {
        let snapshot =
            self.registry.get_snapshot(id).ok_or_else(|| CoreError::InvalidConfig(format!("no such pipeline {id}")))?;
        if !snapshot.enabled && !options.force {
            return Ok(ExecutionResult { execution_id: Uuid::new_v4(), processed: 0, duration: Duration::ZERO });
        }

        let runtime = self
            .runtimes
            .read()
            .expect("PipelineEngine: lock poisoned")
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::InvalidConfig(format!("no runtime for pipeline {id}")))?;

        let (source_type, destination_type, source_config, destination_config, filters, retry, batch_size) = self
            .registry
            .with_record(id, |r| {
                (
                    r.config.source_type.clone(),
                    r.config.destination_type.clone(),
                    r.config.source_config.clone(),
                    r.config.destination_config.clone(),
                    r.config.filters.clone(),
                    r.config.retry.clone(),
                    r.config.batch_size,
                )
            })
            .ok_or_else(|| CoreError::InvalidConfig(format!("no such pipeline {id}")))?;

        let source = self.adapters.require(&source_type)?;
        let destination = self.adapters.require(&destination_type)?;
        let mut cursor = source.create_cursor(source_config).await?;

        let execution_id = Uuid::new_v4();
        self.metrics.pipeline_execution_started(id);
        self.emit_fire_and_forget(
            "pipeline.started",
            json!({
                "pipeline": id,
                "executionId": execution_id,
                "triggerEvent": options.trigger_event,
                "data": options.data,
            }),
        );
        let started = Instant::now();
        let mut total_processed: u64 = 0;
        let mut failure: Option<CoreError> = None;

        loop {
            let batch = match cursor.next(batch_size).await {
                Ok(batch) => batch,
                Err(err) => {
                    tracing::warn!(pipeline = %id, error = %err, "source cursor failed");
                    failure = Some(CoreError::PipelineFailed { pipeline: id, execution_id, message: err.to_string() });
                    break;
                }
            };
            if batch.is_empty() {
                break;
            }
            let exhausted = batch.len() < batch_size;

            let processed = self
                .process_batch(id, execution_id, &runtime, &filters, &retry, batch)
                .await;
            total_processed += processed.len() as u64;
            self.metrics.pipeline_items_processed(id, processed.len() as u64);

            if !processed.is_empty() {
                if let Err(err) = self.write_batch(&runtime, destination.clone(), destination_config.clone(), processed, &retry).await {
                    tracing::warn!(pipeline = %id, error = %err, "destination write failed");
                    failure = Some(err);
                    break;
                }
                let _ = self.events.publish("pipeline.data.written", json!({ "pipeline": id }), PublishOptions::default()).await;
            }

            self.emit_fire_and_forget(
                "pipeline.progress",
                json!({ "pipeline": id, "executionId": execution_id, "processed": total_processed }),
            );

            if exhausted {
                break;
            }
        }

        let _ = destination.close().await;
        let duration = started.elapsed();
        self.registry.record_execution(id, failure.is_none(), total_processed, duration);

        if let Some(err) = failure {
            self.metrics.pipeline_execution_failed(id);
            self.emit_fire_and_forget(
                "pipeline.failed",
                json!({ "pipeline": id, "executionId": execution_id, "message": err.to_string() }),
            );
            return Err(err);
        }

        self.metrics.pipeline_execution_completed(id, duration.as_nanos() as u64);
        self.emit_fire_and_forget(
            "pipeline.completed",
            json!({ "pipeline": id, "executionId": execution_id, "processed": total_processed }),
        );
        Ok(ExecutionResult { execution_id, processed: total_processed, duration })
    }

    /// Runs `batch` through filters, then processors (under retry), then
    /// transformers, admitting each item through the pipeline's work
    /// queue. Items that exhaust retry go to the dead-letter queue instead
    /// of the output batch.
    async fn process_batch(
        &self,
        pipeline_id: Uuid,
        execution_id: Uuid,
        runtime: &Arc<PipelineRuntime>,
        filters: &[super::processor::Filter],
        retry: &super::registry::RetryOptions,
        batch: Vec<Value>,
    ) -> Vec<Value> {
        let surviving: Vec<Value> = batch.into_iter().filter(|item| filters.iter().all(|f| f(item))).collect();

        let processor_names =
            self.registry.with_record(pipeline_id, |r| r.config.processors.clone()).unwrap_or_default();
        let transformer_names =
            self.registry.with_record(pipeline_id, |r| r.config.transformers.clone()).unwrap_or_default();
        let retry_policy = build_retry_policy(retry);

        let mut handles = Vec::with_capacity(surviving.len());
        for item in surviving {
            let processors = self.processors.clone();
            let transformers = self.transformers.clone();
            let task_runtime = runtime.clone();
            let retry_policy = retry_policy.clone();
            let processor_names = processor_names.clone();
            let transformer_names = transformer_names.clone();
            let metrics = self.metrics.clone();
            let events = self.events.clone();

            let fut = runtime.queue.submit(async move {
                run_item(
                    item,
                    pipeline_id,
                    execution_id,
                    &processors,
                    &processor_names,
                    &transformers,
                    &transformer_names,
                    &retry_policy,
                    &task_runtime.dlq,
                    &metrics,
                    &events,
                )
                .await
            });
            handles.push(fut);
        }

        futures::future::join_all(handles).await.into_iter().flatten().collect()
    }

    async fn write_batch(
        &self,
        runtime: &Arc<PipelineRuntime>,
        destination: Arc<dyn super::adapter::StorageAdapter>,
        destination_config: Value,
        items: Vec<Value>,
        retry: &super::registry::RetryOptions,
    ) -> Result<(), CoreError> {
        let retry_policy = build_retry_policy(retry);
        let result = runtime
            .queue
            .submit(async move {
                retry_policy
                    .execute(|| {
                        let destination = destination.clone();
                        let destination_config = destination_config.clone();
                        let items = items.clone();
                        async move {
                            destination.write_batch(items, destination_config).await.map_err(|err| {
                                ResilienceError::Inner(StageError(err.to_string()))
                            })
                        }
                    })
                    .await
            })
            .await;

        result.map_err(|err| CoreError::AdapterError { type_name: "destination".to_string(), message: err.to_string() })
    }

    /// Pauses work admission and disarms the schedule (§4.3: "cancels
    /// scheduler on pause").
    pub fn pause(self: &Arc<Self>, id: Uuid) {
        if let Some(runtime) = self.runtimes.read().expect("PipelineEngine: lock poisoned").get(&id) {
            runtime.queue.pause();
            runtime.scheduler.disarm();
        }
        let _ = self.registry.set_enabled(id, false);
        self.emit_fire_and_forget("pipeline.paused", json!({ "pipeline": id }));
    }

    /// Resumes work admission and, if the pipeline carries an interval
    /// schedule, re-arms it.
    pub fn resume(self: &Arc<Self>, id: Uuid) {
        if let Some(runtime) = self.runtimes.read().expect("PipelineEngine: lock poisoned").get(&id) {
            runtime.queue.resume();
        }
        let _ = self.registry.set_enabled(id, true);

        if let Some(interval) = self.registry.get_snapshot(id).and_then(|s| s.schedule).and_then(|s| s.interval) {
            self.arm_schedule(id, interval);
        }
        self.emit_fire_and_forget("pipeline.resumed", json!({ "pipeline": id }));
    }

    pub async fn flush(&self, id: Uuid, deadline: Option<Duration>) {
        let runtime = self.runtimes.read().expect("PipelineEngine: lock poisoned").get(&id).cloned();
        if let Some(runtime) = runtime {
            runtime.queue.flush(deadline).await;
        }
        let _ = self.events.publish("pipeline.flushed", json!({ "pipeline": id }), PublishOptions::default()).await;
    }

    pub fn delete(&self, id: Uuid) {
        if let Some(runtime) = self.runtimes.write().expect("PipelineEngine: lock poisoned").remove(&id) {
            runtime.scheduler.disarm();
        }
        self.registry.remove(id);
        self.emit_fire_and_forget("pipeline.deleted", json!({ "pipeline": id }));
    }

    pub fn dead_letter_queue(&self, id: Uuid) -> Vec<DlqEntry> {
        self.runtimes
            .read()
            .expect("PipelineEngine: lock poisoned")
            .get(&id)
            .map(|r| r.dlq.snapshot())
            .unwrap_or_default()
    }

    /// Drains the dead-letter queue for `id` and re-submits each entry's
    /// item through [`Self::process_batch`]/[`Self::write_batch`] as a
    /// fresh batch, leaving any item that fails again on the (now empty)
    /// queue.
    pub async fn process_dead_letter_queue(&self, id: Uuid) -> Result<(), CoreError> {
        let runtime = self
            .runtimes
            .read()
            .expect("PipelineEngine: lock poisoned")
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::InvalidConfig(format!("no runtime for pipeline {id}")))?;
        let entries = runtime.dlq.drain();
        if entries.is_empty() {
            return Ok(());
        }

        let (destination_type, destination_config, filters, retry) = self
            .registry
            .with_record(id, |r| {
                (r.config.destination_type.clone(), r.config.destination_config.clone(), r.config.filters.clone(), r.config.retry.clone())
            })
            .ok_or_else(|| CoreError::InvalidConfig(format!("no such pipeline {id}")))?;
        let destination = self.adapters.require(&destination_type)?;

        let items: Vec<Value> = entries.into_iter().map(|e| e.item).collect();
        let execution_id = Uuid::new_v4();
        let processed = self.process_batch(id, execution_id, &runtime, &filters, &retry, items).await;
        if !processed.is_empty() {
            self.write_batch(&runtime, destination, destination_config, processed, &retry).await?;
        }
        Ok(())
    }

    pub fn list_pipelines(&self) -> Vec<PipelineSnapshot> {
        self.registry.list()
    }
}

fn build_retry_policy(retry: &super::registry::RetryOptions) -> RetryPolicy<StageError> {
    RetryPolicy::builder()
        .max_attempts((retry.retries + 1) as usize)
        .expect("retries + 1 is never zero")
        .backoff(Backoff::exponential(retry.min_backoff).with_max(retry.max_backoff))
        .build()
}

#[allow(clippy::too_many_arguments)]
async fn run_item(
    item: Value,
    pipeline_id: Uuid,
    execution_id: Uuid,
    processors: &ProcessorRegistry,
    processor_names: &[String],
    transformers: &TransformerRegistry,
    transformer_names: &[String],
    retry_policy: &RetryPolicy<StageError>,
    dlq: &DeadLetterQueue,
    metrics: &Arc<dyn MetricsSink>,
    events: &Arc<EventBus>,
) -> Option<Value> {
    let mut current = item;
    let mut attempts_seen = 1;

    for name in processor_names {
        let Some(processor) = processors.get(name) else { continue };
        let item_for_attempt = current.clone();
        let result = retry_policy
            .execute(|| {
                let processor = processor.clone();
                let item = item_for_attempt.clone();
                async move { processor.apply(item).await.map_err(ResilienceError::Inner) }
            })
            .await;

        match result {
            Ok(value) => current = value,
            Err(err) => {
                attempts_seen = match &err {
                    ResilienceError::RetryExhausted { attempts, .. } => *attempts,
                    _ => attempts_seen,
                };
                let entry = DlqEntry {
                    item: item_for_attempt,
                    pipeline_id,
                    execution_id,
                    error: err.to_string(),
                    attempt_count: attempts_seen as u32,
                    timestamp: std::time::SystemTime::now(),
                };
                let overflowed = dlq.push(entry.clone());
                if overflowed {
                    metrics.dlq_size_changed(pipeline_id, dlq.len());
                }
                let events = events.clone();
                tokio::spawn(async move {
                    let _ = events
                        .publish(
                            "dlq.added",
                            json!({
                                "pipeline": pipeline_id,
                                "executionId": execution_id,
                                "error": entry.error,
                                "attemptCount": entry.attempt_count,
                            }),
                            PublishOptions::default(),
                        )
                        .await;
                });
                return None;
            }
        }
    }

    for name in transformer_names {
        if let Some(transformer) = transformers.get(name) {
            current = transformer.apply(current).await;
        }
    }

    Some(current)
}
