//! Error types for resilience policies

use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Cap the number of stored failures inside RetryExhausted to avoid unbounded growth.
pub const MAX_RETRY_FAILURES: usize = 10;

/// Unified error type for all resilience policies
#[derive(Debug)]
pub enum ResilienceError<E> {
    /// The operation exceeded the timeout duration
    Timeout { elapsed: Duration, timeout: Duration },
    /// The bulkhead rejected the operation due to capacity
    Bulkhead { in_flight: usize, max: usize },
    /// The circuit breaker is open
    CircuitOpen { failure_count: usize, open_duration: Duration },
    /// All retry attempts were exhausted
    RetryExhausted { attempts: usize, failures: Vec<E> },
    /// The underlying operation failed
    Inner(E),
}

impl<E: Clone> Clone for ResilienceError<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Timeout { elapsed, timeout } => {
                Self::Timeout { elapsed: *elapsed, timeout: *timeout }
            }
            Self::Bulkhead { in_flight, max } => {
                Self::Bulkhead { in_flight: *in_flight, max: *max }
            }
            Self::CircuitOpen { failure_count, open_duration } => {
                Self::CircuitOpen { failure_count: *failure_count, open_duration: *open_duration }
            }
            Self::RetryExhausted { attempts, failures } => {
                Self::RetryExhausted { attempts: *attempts, failures: failures.clone() }
            }
            Self::Inner(e) => Self::Inner(e.clone()),
        }
    }
}

impl<E: PartialEq> PartialEq for ResilienceError<E> {
    fn eq(&self, other: &Self) -> bool {
        use ResilienceError::*;
        match (self, other) {
            (Timeout { elapsed: a1, timeout: b1 }, Timeout { elapsed: a2, timeout: b2 }) => {
                a1 == a2 && b1 == b2
            }
            (Bulkhead { in_flight: a1, max: b1 }, Bulkhead { in_flight: a2, max: b2 }) => {
                a1 == a2 && b1 == b2
            }
            (
                CircuitOpen { failure_count: f1, open_duration: d1 },
                CircuitOpen { failure_count: f2, open_duration: d2 },
            ) => f1 == f2 && d1 == d2,
            (
                RetryExhausted { attempts: a1, failures: f1 },
                RetryExhausted { attempts: a2, failures: f2 },
            ) => a1 == a2 && f1 == f2,
            (Inner(e1), Inner(e2)) => e1 == e2,
            _ => false,
        }
    }
}

impl<E: Eq> Eq for ResilienceError<E> {}

impl<E: fmt::Display> fmt::Display for ResilienceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { elapsed, timeout } => {
                write!(f, "operation timed out after {:?} (limit: {:?})", elapsed, timeout)
            }
            Self::Bulkhead { in_flight, max } => {
                write!(f, "bulkhead rejected request ({} in-flight, max {})", in_flight, max)
            }
            Self::CircuitOpen { failure_count, open_duration } => {
                write!(
                    f,
                    "circuit breaker open ({} failures, open for {:?})",
                    failure_count, open_duration
                )
            }
            Self::RetryExhausted { attempts, failures } => {
                let last = failures.last().map(|e| e.to_string()).unwrap_or_default();
                write!(
                    f,
                    "retry exhausted after {} attempts ({} failures), last error: {}",
                    attempts,
                    failures.len(),
                    last
                )
            }
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ResilienceError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::RetryExhausted { failures, .. } => {
                failures.last().map(|e| e as &dyn std::error::Error)
            }
            _ => None,
        }
    }
}

impl<E> ResilienceError<E> {
    /// Check if this error is due to timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this error is due to circuit breaker
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Check if this error is due to bulkhead rejection
    pub fn is_bulkhead(&self) -> bool {
        matches!(self, Self::Bulkhead { .. })
    }

    /// Check if this error is due to retry exhaustion
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Access all recorded failures for RetryExhausted, if present.
    pub fn failures(&self) -> Option<&[E]> {
        match self {
            Self::RetryExhausted { failures, .. } => Some(failures.as_slice()),
            _ => None,
        }
    }

    /// Check if this error wraps an inner error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Mutably borrow the inner error if present.
    pub fn as_inner_mut(&mut self) -> Option<&mut E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Unified error type returned by the Service Manager, Event Bus, and Pipeline
/// Engine public APIs. Distinct from [`ResilienceError`], which stays the error
/// type for individual retry/circuit-breaker/timeout/bulkhead executions —
/// this enum is what those get folded into at the domain-level API boundary.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("a service or pipeline named {name:?} is already registered")]
    DuplicateName { name: String },

    #[error("no channel broker adapter is registered for type {type_name:?}")]
    UnknownAdapter { type_name: String },

    #[error("no processor or transformer named {name:?} is registered")]
    UnknownProcessor { name: String },

    #[error("dependency {dependency:?} of service {service:?} is not registered")]
    DependencyUnresolved { service: String, dependency: String },

    #[error("circular dependency detected among services: {cycle:?}")]
    CircularDependency { cycle: Vec<String> },

    #[error("operation timed out after {elapsed:?} (limit {limit:?})")]
    Timeout { elapsed: Duration, limit: Duration },

    #[error("circuit breaker for {id} is open ({failure_count} failures)")]
    CircuitOpen { id: Uuid, failure_count: usize },

    #[error("{resource} {id} is closed")]
    Closed { resource: &'static str, id: Uuid },

    #[error("handler for {topic:?} returned an error: {message}")]
    HandlerError { topic: String, message: String },

    #[error("storage adapter {type_name:?} failed: {message}")]
    AdapterError { type_name: String, message: String },

    #[error("dead-letter queue for pipeline {pipeline} overflowed (capacity {capacity})")]
    DLQOverflow { pipeline: Uuid, capacity: usize },

    #[error("service {name:?} rejected shutdown fatally: {message}")]
    FatalStop { name: String, message: String },

    #[error("pipeline {pipeline} execution {execution_id} failed: {message}")]
    PipelineFailed { pipeline: Uuid, execution_id: Uuid, message: String },
}

impl<E> From<ResilienceError<E>> for CoreError
where
    E: fmt::Display,
{
    fn from(err: ResilienceError<E>) -> Self {
        match err {
            ResilienceError::Timeout { elapsed, timeout } => {
                CoreError::Timeout { elapsed, limit: timeout }
            }
            ResilienceError::Bulkhead { in_flight, max } => CoreError::AdapterError {
                type_name: "bulkhead".to_string(),
                message: format!("rejected ({in_flight} in-flight, max {max})"),
            },
            ResilienceError::CircuitOpen { failure_count, .. } => {
                CoreError::CircuitOpen { id: Uuid::nil(), failure_count }
            }
            ResilienceError::RetryExhausted { attempts, failures } => CoreError::HandlerError {
                topic: String::new(),
                message: format!(
                    "retry exhausted after {attempts} attempts, last error: {}",
                    failures.last().map(|e| e.to_string()).unwrap_or_default()
                ),
            },
            ResilienceError::Inner(e) => {
                CoreError::HandlerError { topic: String::new(), message: e.to_string() }
            }
        }
    }
}
