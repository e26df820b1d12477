//! Pipeline Engine: schedules registered data flows from a source adapter
//! through filters/processors/transformers to a destination adapter, with
//! bounded concurrency, retries, a dead-letter queue, triggered execution,
//! and pause/resume/flush control.

mod adapter;
mod dlq;
mod engine;
mod processor;
mod queue;
mod registry;
mod schedule;

pub use adapter::{AdapterRegistry, Cursor, StorageAdapter};
pub use dlq::{DeadLetterQueue, DlqEntry};
pub use engine::{ExecuteOptions, ExecutionResult, PipelineEngine};
pub use processor::{Filter, Processor, StageError, Transformer};
pub use queue::WorkQueue;
pub use registry::{
    PipelineConfig, PipelineRegistry, PipelineSnapshot, PipelineStats, RetryOptions, ScheduleConfig,
};
pub use schedule::Scheduler;
