//! Job queue types

use crate::execution::{ExecutionContext, ExecutionId};
use crate::order::Order;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Job identifier
pub type JobId = Uuid;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Waiting for a free slot
    Pending,
    Processing,
    /// Terminal
    Success,
    /// Terminal
    Failed,
    /// Waiting out a backoff before becoming pending again
    RetryPending,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failed)
    }
}

/// Scheduling priority; higher variants are dequeued first
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
}

impl FromStr for JobPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(JobPriority::Low),
            "normal" => Ok(JobPriority::Normal),
            "high" => Ok(JobPriority::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Whole-job retry bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryInfo {
    /// Retry number, 0 after the first failure and bumped on each later one
    pub attempt: u32,
    /// Retries allowed before the job fails for good
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Backoff applied before the scheduled retry
    pub backoff_ms: u64,
}

impl RetryInfo {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            last_error: None,
            next_retry_at: None,
            backoff_ms: 0,
        }
    }

    /// Failures recorded so far
    pub fn failures(&self) -> u32 {
        if self.last_error.is_some() {
            self.attempt + 1
        } else {
            0
        }
    }

    /// Whether a retry scheduled for `next_retry_at` may run at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at.map_or(true, |at| at <= now)
    }
}

/// Outcome recorded on a finished job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub execution_id: Option<ExecutionId>,
    pub tx_hash: Option<String>,
    pub source: Option<String>,
    pub amount_out: Option<Decimal>,
    pub error: Option<String>,
    /// Time spent in PROCESSING for the final attempt
    pub duration_ms: u64,
}

impl ProcessingResult {
    /// Successful result built from a confirmed execution
    pub fn from_execution(ctx: &ExecutionContext) -> Self {
        Self {
            success: true,
            execution_id: Some(ctx.execution_id),
            tx_hash: ctx.tx_hash.clone(),
            source: ctx.selected_quote.as_ref().map(|q| q.source.clone()),
            amount_out: ctx.selected_quote.as_ref().map(|q| q.amount_out),
            error: None,
            duration_ms: 0,
        }
    }

    pub(crate) fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            execution_id: None,
            tx_hash: None,
            source: None,
            amount_out: None,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// A queued order and its scheduling state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderJob {
    pub id: JobId,
    pub order: Order,
    pub state: JobState,
    pub priority: JobPriority,
    pub created_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry: RetryInfo,
    pub result: Option<ProcessingResult>,
}

impl OrderJob {
    pub(crate) fn new(order: Order, priority: JobPriority, max_attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            order,
            state: JobState::Pending,
            priority,
            created_at: Utc::now(),
            processing_started_at: None,
            completed_at: None,
            retry: RetryInfo::new(max_attempts),
            result: None,
        }
    }

    /// Milliseconds between the last processing start and completion
    pub fn processing_ms(&self) -> Option<u64> {
        let start = self.processing_started_at?;
        let end = self.completed_at?;
        Some((end - start).num_milliseconds().max(0) as u64)
    }
}

/// Consecutive-outcome circuit breaker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub is_open: bool,
    /// Consecutive terminal failures
    pub failure_count: u32,
    /// Consecutive successes
    pub success_count: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

impl CircuitBreakerState {
    /// Failure share of the current streak, in percent
    pub fn failure_rate(&self) -> f64 {
        let total = self.failure_count + self.success_count;
        if total == 0 {
            return 0.0;
        }
        self.failure_count as f64 / total as f64 * 100.0
    }

    pub fn status(&self) -> CircuitStatus {
        if self.is_open {
            CircuitStatus::Open
        } else if self.failure_count > 0 {
            CircuitStatus::HalfOpen
        } else {
            CircuitStatus::Closed
        }
    }
}

/// Externally reported breaker status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitStatus {
    Closed,
    Open,
    /// Closed but with failures in the current streak
    HalfOpen,
}

/// Point-in-time job counts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueState {
    pub pending: usize,
    pub processing: usize,
    pub retry_pending: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
    pub max_concurrent: usize,
    pub circuit_breaker: CircuitStatus,
}

/// Aggregate queue statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStats {
    pub total_jobs: usize,
    pub completed: usize,
    pub failed: usize,
    /// Percent of finished jobs that succeeded
    pub success_rate: f64,
    pub average_processing_ms: f64,
    /// Mean failed attempts per job
    pub average_retries: f64,
    pub circuit_breaker: CircuitBreakerState,
    pub circuit_status: CircuitStatus,
}

/// Kind of queue lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueEventType {
    OrderAdded,
    JobStarted,
    JobCompleted,
    JobRetryScheduled,
    JobRequeued,
    JobFailed,
    JobRemoved,
    JobCancelled,
    CircuitBreakerOpened,
}

/// Event emitted on every job transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    #[serde(rename = "type")]
    pub event_type: QueueEventType,
    pub job_id: JobId,
    pub order_id: String,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Errors returned by queue operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Queue closed: circuit breaker is open")]
    QueueClosed,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {job_id} cannot be cancelled in state {state:?}")]
    NotCancellable { job_id: JobId, state: JobState },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_priority_ordering() {
        assert!(JobPriority::High > JobPriority::Normal);
        assert!(JobPriority::Normal > JobPriority::Low);
        assert_eq!(JobPriority::default(), JobPriority::Normal);
        assert_eq!("HIGH".parse::<JobPriority>().unwrap(), JobPriority::High);
        assert!("urgent".parse::<JobPriority>().is_err());
    }

    #[test]
    fn test_breaker_status() {
        let mut breaker = CircuitBreakerState::default();
        assert_eq!(breaker.status(), CircuitStatus::Closed);
        assert_eq!(breaker.failure_rate(), 0.0);

        breaker.failure_count = 1;
        assert_eq!(breaker.status(), CircuitStatus::HalfOpen);
        assert_eq!(breaker.failure_rate(), 100.0);

        breaker.is_open = true;
        assert_eq!(breaker.status(), CircuitStatus::Open);
    }

    #[test]
    fn test_retry_due() {
        let mut info = RetryInfo::new(3);
        let now = Utc::now();
        assert!(info.is_due(now));
        info.next_retry_at = Some(now + chrono::Duration::seconds(5));
        assert!(!info.is_due(now));
        assert!(info.is_due(now + chrono::Duration::seconds(5)));
    }

    #[test]
    fn test_retry_failures_count() {
        let mut info = RetryInfo::new(2);
        assert_eq!(info.failures(), 0);
        info.last_error = Some("first".into());
        assert_eq!(info.failures(), 1);
        info.attempt = 2;
        assert_eq!(info.failures(), 3);
    }

    #[test]
    fn test_job_processing_ms() {
        let mut job = OrderJob::new(
            Order::new("o", "USDC", "SOL", dec!(1), 50),
            JobPriority::Normal,
            3,
        );
        assert_eq!(job.state, JobState::Pending);
        assert!(job.processing_ms().is_none());

        let start = Utc::now();
        job.processing_started_at = Some(start);
        job.completed_at = Some(start + chrono::Duration::milliseconds(250));
        assert_eq!(job.processing_ms(), Some(250));
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&JobState::RetryPending).unwrap();
        assert_eq!(json, "\"RETRY_PENDING\"");
        let json = serde_json::to_string(&CircuitStatus::HalfOpen).unwrap();
        assert_eq!(json, "\"HALF_OPEN\"");
    }
}
