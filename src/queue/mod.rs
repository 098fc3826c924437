//! Order job queue
//!
//! Priority scheduling with a concurrency ceiling, two-phase exponential
//! backoff retries and a consecutive-failure circuit breaker, plus the
//! processor that drives it.

mod job_queue;
mod processor;
mod types;

pub use job_queue::{backoff_ms, JobQueue};
pub use processor::{JobProcessor, ProcessorHandle};
pub use types::{
    CircuitBreakerState, CircuitStatus, JobId, JobPriority, JobState, OrderJob,
    ProcessingResult, QueueError, QueueEvent, QueueEventType, QueueState, QueueStats, RetryInfo,
};
