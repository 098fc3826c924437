//! In-memory job queue
//!
//! Jobs live in one arena keyed by id. Waiting jobs are additionally indexed
//! by `(priority desc, created_at, sequence)` so the next eligible job is the
//! first PENDING entry of the index. Retry-pending jobs keep their index slot
//! and are skipped until the retry sweep flips them back to PENDING.
//!
//! All maps and breaker counters sit behind a single mutex, so every public
//! operation is atomic with respect to the others.

use super::types::{
    CircuitBreakerState, CircuitStatus, JobId, JobPriority, JobState, OrderJob,
    ProcessingResult, QueueError, QueueEvent, QueueEventType, QueueState, QueueStats, RetryInfo,
};
use crate::config::QueueConfig;
use crate::events::EventBus;
use crate::order::Order;
use crate::telemetry::{self, CounterMetric, GaugeMetric, LatencyMetric};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;

type PendingKey = (Reverse<JobPriority>, DateTime<Utc>, u64);

/// Backoff for the retry scheduled at retry number `attempt`
///
/// `base_ms * multiplier^(attempt - 1)`. The first failure is attempt 0, so
/// its retry waits `base_ms / multiplier`.
pub fn backoff_ms(base_ms: u64, multiplier: f64, attempt: u32) -> u64 {
    let exp = i32::try_from(attempt).unwrap_or(i32::MAX) - 1;
    let delay = base_ms as f64 * multiplier.powi(exp);
    if delay.is_finite() {
        delay.round().min(u64::MAX as f64) as u64
    } else {
        u64::MAX
    }
}

struct JobStore {
    jobs: HashMap<JobId, OrderJob>,
    waiting: BTreeMap<PendingKey, JobId>,
    waiting_keys: HashMap<JobId, PendingKey>,
    processing: HashSet<JobId>,
    counts: HashMap<JobState, usize>,
    /// Terminal jobs, oldest first
    finished: VecDeque<JobId>,
    breaker: CircuitBreakerState,
    sequence: u64,
}

impl JobStore {
    fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            waiting: BTreeMap::new(),
            waiting_keys: HashMap::new(),
            processing: HashSet::new(),
            counts: HashMap::new(),
            finished: VecDeque::new(),
            breaker: CircuitBreakerState::default(),
            sequence: 0,
        }
    }

    fn insert(&mut self, job: OrderJob) {
        self.enqueue(&job);
        *self.counts.entry(job.state).or_default() += 1;
        self.jobs.insert(job.id, job);
    }

    fn enqueue(&mut self, job: &OrderJob) {
        let key = (Reverse(job.priority), job.created_at, self.sequence);
        self.sequence += 1;
        self.waiting.insert(key, job.id);
        self.waiting_keys.insert(job.id, key);
    }

    fn unindex(&mut self, id: &JobId) {
        if let Some(key) = self.waiting_keys.remove(id) {
            self.waiting.remove(&key);
        }
    }

    /// Move a job to `state`, keeping the per-state counts in step
    fn transition(&mut self, id: &JobId, state: JobState) -> Option<&mut OrderJob> {
        let job = self.jobs.get_mut(id)?;
        let from = std::mem::replace(&mut job.state, state);
        if let Some(n) = self.counts.get_mut(&from) {
            *n = n.saturating_sub(1);
        }
        *self.counts.entry(state).or_default() += 1;
        if state.is_terminal() && !from.is_terminal() {
            self.finished.push_back(*id);
        }
        Some(job)
    }

    fn remove(&mut self, id: &JobId) -> Option<OrderJob> {
        self.unindex(id);
        self.processing.remove(id);
        let job = self.jobs.remove(id)?;
        if let Some(n) = self.counts.get_mut(&job.state) {
            *n = n.saturating_sub(1);
        }
        Some(job)
    }

    /// Evict the oldest terminal jobs beyond `retain`
    fn prune(&mut self, retain: usize) -> usize {
        let mut evicted = 0;
        while self.finished.len() > retain {
            let Some(id) = self.finished.pop_front() else {
                break;
            };
            if self.remove(&id).is_some() {
                evicted += 1;
            }
        }
        evicted
    }

    fn next_pending(&self) -> Option<JobId> {
        self.waiting
            .values()
            .find(|id| {
                self.jobs
                    .get(*id)
                    .is_some_and(|job| job.state == JobState::Pending)
            })
            .copied()
    }

    fn count(&self, state: JobState) -> usize {
        self.counts.get(&state).copied().unwrap_or(0)
    }
}

/// Priority job queue with bounded concurrency, retry and circuit breaking
pub struct JobQueue {
    config: QueueConfig,
    events: EventBus,
    store: Mutex<JobStore>,
}

impl JobQueue {
    pub fn new(config: QueueConfig, events: EventBus) -> Self {
        Self {
            config,
            events,
            store: Mutex::new(JobStore::new()),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Accept an order as a new PENDING job
    pub async fn add_order(
        &self,
        order: Order,
        priority: JobPriority,
    ) -> Result<OrderJob, QueueError> {
        let mut store = self.store.lock().await;

        if store.breaker.is_open {
            telemetry::increment(CounterMetric::OrdersRejected);
            tracing::warn!(order_id = %order.id, "Rejecting order: circuit breaker open");
            return Err(QueueError::QueueClosed);
        }
        if order.id.trim().is_empty() {
            telemetry::increment(CounterMetric::OrdersRejected);
            return Err(QueueError::Validation("order id is required".into()));
        }

        let job = OrderJob::new(order, priority, self.config.max_retries);
        store.insert(job.clone());

        telemetry::increment(CounterMetric::OrdersAdded);
        tracing::info!(
            job_id = %job.id,
            order_id = %job.order.id,
            priority = ?priority,
            "Order queued"
        );
        self.emit(
            &job,
            QueueEventType::OrderAdded,
            Some(json!({ "priority": priority })),
            None,
        );
        self.refresh_gauges(&store);
        Ok(job)
    }

    /// Next job that would be started, without starting it
    ///
    /// None when every slot is taken or nothing is PENDING.
    pub async fn get_next_job(&self) -> Option<OrderJob> {
        let store = self.store.lock().await;
        if store.processing.len() >= self.config.max_concurrent_jobs {
            return None;
        }
        let id = store.next_pending()?;
        store.jobs.get(&id).cloned()
    }

    /// Move a PENDING job to PROCESSING
    ///
    /// Returns false when the job is not PENDING or no slot is free.
    pub async fn start_processing(&self, job_id: JobId) -> bool {
        let mut store = self.store.lock().await;
        self.start_locked(&mut store, job_id).is_some()
    }

    /// Select and start the next job in one step
    pub async fn dequeue(&self) -> Option<OrderJob> {
        let mut store = self.store.lock().await;
        if store.processing.len() >= self.config.max_concurrent_jobs {
            return None;
        }
        let id = store.next_pending()?;
        self.start_locked(&mut store, id)
    }

    fn start_locked(&self, store: &mut JobStore, job_id: JobId) -> Option<OrderJob> {
        if store.processing.len() >= self.config.max_concurrent_jobs {
            return None;
        }
        if store.jobs.get(&job_id)?.state != JobState::Pending {
            return None;
        }

        let job = store.transition(&job_id, JobState::Processing)?;
        job.processing_started_at = Some(Utc::now());
        job.completed_at = None;
        let job = job.clone();

        store.unindex(&job_id);
        store.processing.insert(job_id);

        tracing::debug!(
            job_id = %job_id,
            order_id = %job.order.id,
            run = job.retry.failures() + 1,
            "Job started"
        );
        self.emit(&job, QueueEventType::JobStarted, None, None);
        self.refresh_gauges(store);
        Some(job)
    }

    /// Mark a PROCESSING job as succeeded
    pub async fn complete_job(&self, job_id: JobId, mut result: ProcessingResult) -> bool {
        let mut store = self.store.lock().await;
        if !store.processing.remove(&job_id) {
            return false;
        }
        let Some(job) = store.transition(&job_id, JobState::Success) else {
            return false;
        };

        job.completed_at = Some(Utc::now());
        let duration_ms = job.processing_ms().unwrap_or(0);
        result.success = true;
        result.duration_ms = duration_ms;
        job.result = Some(result);
        let job = job.clone();

        store.breaker.success_count += 1;
        store.breaker.failure_count = 0;

        telemetry::increment(CounterMetric::JobsCompleted);
        telemetry::record_latency(
            LatencyMetric::JobProcessing,
            Duration::from_millis(duration_ms),
        );
        tracing::info!(
            job_id = %job_id,
            order_id = %job.order.id,
            duration_ms,
            "Job completed"
        );
        self.emit(
            &job,
            QueueEventType::JobCompleted,
            Some(json!({
                "duration_ms": duration_ms,
                "tx_hash": job.result.as_ref().and_then(|r| r.tx_hash.clone()),
            })),
            None,
        );
        self.finish(&mut store);
        true
    }

    /// Record a failed attempt on a PROCESSING job
    ///
    /// The first failure is retry attempt 0 and each later one bumps it.
    /// While `attempt < max_retries` a retry is scheduled with exponential
    /// backoff, otherwise the job fails for good and feeds the circuit
    /// breaker. A job with `max_retries = n` therefore runs at most `n + 1`
    /// times.
    pub async fn fail_job(&self, job_id: JobId, error: &str) -> bool {
        let mut store = self.store.lock().await;
        if !store.processing.remove(&job_id) {
            return false;
        }
        let Some(job) = store.jobs.get_mut(&job_id) else {
            return false;
        };

        let now = Utc::now();
        record_failure(&mut job.retry, error);
        let attempt = job.retry.attempt;

        if attempt < job.retry.max_attempts {
            let backoff = backoff_ms(
                self.config.retry_backoff_ms,
                self.config.retry_backoff_multiplier,
                attempt,
            );
            let next_retry_at = now
                + chrono::Duration::milliseconds(backoff.min(i64::MAX as u64) as i64);
            job.retry.backoff_ms = backoff;
            job.retry.next_retry_at = Some(next_retry_at);
            let Some(job) = store.transition(&job_id, JobState::RetryPending) else {
                return false;
            };
            let job = job.clone();
            store.enqueue(&job);

            telemetry::increment(CounterMetric::JobsRetried);
            tracing::warn!(
                job_id = %job_id,
                order_id = %job.order.id,
                attempt,
                backoff_ms = backoff,
                error,
                "Job failed, retry scheduled"
            );
            self.emit(
                &job,
                QueueEventType::JobRetryScheduled,
                Some(json!({
                    "attempt": attempt,
                    "backoff_ms": backoff,
                    "next_retry_at": next_retry_at,
                })),
                Some(error.to_string()),
            );
            self.refresh_gauges(&store);
        } else {
            let Some(job) = store.transition(&job_id, JobState::Failed) else {
                return false;
            };
            job.completed_at = Some(now);
            job.result = Some(ProcessingResult::failure(
                error,
                job.processing_ms().unwrap_or(0),
            ));
            let job = job.clone();

            telemetry::increment(CounterMetric::JobsFailed);
            tracing::error!(
                job_id = %job_id,
                order_id = %job.order.id,
                failures = job.retry.failures(),
                error,
                "Job failed permanently"
            );
            self.emit(
                &job,
                QueueEventType::JobFailed,
                Some(json!({ "failures": job.retry.failures() })),
                Some(error.to_string()),
            );
            self.record_breaker_failure(&mut store, &job);
            self.finish(&mut store);
        }
        true
    }

    /// Fail a PROCESSING job immediately for an error in the order itself
    ///
    /// No retry is scheduled and the circuit breaker is left alone.
    pub async fn reject_job(&self, job_id: JobId, error: &str) -> bool {
        self.terminate(job_id, error, false).await
    }

    /// Fail a PROCESSING job immediately for an error no retry can fix
    ///
    /// Unlike [`JobQueue::reject_job`] the failure counts toward the circuit
    /// breaker.
    pub async fn abort_job(&self, job_id: JobId, error: &str) -> bool {
        self.terminate(job_id, error, true).await
    }

    async fn terminate(&self, job_id: JobId, error: &str, feed_breaker: bool) -> bool {
        let mut store = self.store.lock().await;
        if !store.processing.remove(&job_id) {
            return false;
        }
        let Some(job) = store.transition(&job_id, JobState::Failed) else {
            return false;
        };

        record_failure(&mut job.retry, error);
        job.completed_at = Some(Utc::now());
        job.result = Some(ProcessingResult::failure(
            error,
            job.processing_ms().unwrap_or(0),
        ));
        let job = job.clone();

        telemetry::increment(CounterMetric::JobsFailed);
        tracing::warn!(
            job_id = %job_id,
            order_id = %job.order.id,
            feed_breaker,
            error,
            "Job failed without retry"
        );
        self.emit(
            &job,
            QueueEventType::JobFailed,
            Some(json!({ "retryable": false })),
            Some(error.to_string()),
        );
        if feed_breaker {
            self.record_breaker_failure(&mut store, &job);
        }
        self.finish(&mut store);
        true
    }

    fn record_breaker_failure(&self, store: &mut JobStore, job: &OrderJob) {
        let breaker = &mut store.breaker;
        breaker.failure_count += 1;
        breaker.success_count = 0;

        if breaker.is_open || breaker.failure_count < self.config.circuit_breaker_min_failures {
            return;
        }
        let rate = breaker.failure_rate();
        if rate >= self.config.circuit_breaker_threshold {
            breaker.is_open = true;
            breaker.opened_at = Some(Utc::now());

            telemetry::increment(CounterMetric::CircuitBreakerTrips);
            tracing::error!(
                failures = breaker.failure_count,
                failure_rate = rate,
                threshold = self.config.circuit_breaker_threshold,
                "Circuit breaker opened"
            );
            self.emit(
                job,
                QueueEventType::CircuitBreakerOpened,
                Some(json!({
                    "failure_count": breaker.failure_count,
                    "failure_rate": rate,
                })),
                None,
            );
        }
    }

    /// Drop a pending, retry-pending or processing job from the queue
    pub async fn remove_job(&self, job_id: JobId) -> bool {
        let mut store = self.store.lock().await;
        let removable = store
            .jobs
            .get(&job_id)
            .is_some_and(|job| !job.state.is_terminal());
        if !removable {
            return false;
        }
        let Some(job) = store.remove(&job_id) else {
            return false;
        };

        tracing::info!(job_id = %job_id, order_id = %job.order.id, "Job removed");
        self.emit(&job, QueueEventType::JobRemoved, None, None);
        self.refresh_gauges(&store);
        true
    }

    /// Cancel a job that has not started its current attempt
    ///
    /// The job ends FAILED and stays queryable. Running jobs cannot be
    /// cancelled.
    pub async fn cancel_order(&self, job_id: JobId) -> Result<OrderJob, QueueError> {
        let mut store = self.store.lock().await;
        let state = store
            .jobs
            .get(&job_id)
            .map(|job| job.state)
            .ok_or(QueueError::JobNotFound(job_id))?;

        if !matches!(state, JobState::Pending | JobState::RetryPending) {
            return Err(QueueError::NotCancellable { job_id, state });
        }

        let job = store
            .transition(&job_id, JobState::Failed)
            .ok_or(QueueError::JobNotFound(job_id))?;
        job.completed_at = Some(Utc::now());
        job.retry.last_error = Some("cancelled".to_string());
        job.result = Some(ProcessingResult::failure("cancelled", 0));
        let job = job.clone();
        store.unindex(&job_id);

        tracing::info!(job_id = %job_id, order_id = %job.order.id, "Job cancelled");
        self.emit(&job, QueueEventType::JobCancelled, None, None);
        self.finish(&mut store);
        Ok(job)
    }

    /// Return RETRY_PENDING jobs whose backoff elapsed by `now` to PENDING
    pub async fn readmit_due_retries(&self, now: DateTime<Utc>) -> usize {
        let mut store = self.store.lock().await;
        let due: Vec<JobId> = store
            .waiting
            .values()
            .filter(|id| {
                store
                    .jobs
                    .get(*id)
                    .is_some_and(|j| j.state == JobState::RetryPending && j.retry.is_due(now))
            })
            .copied()
            .collect();

        for id in &due {
            if let Some(job) = store.transition(id, JobState::Pending) {
                let job = job.clone();
                tracing::debug!(
                    job_id = %job.id,
                    attempt = job.retry.attempt,
                    "Retry re-admitted"
                );
                self.emit(&job, QueueEventType::JobRequeued, None, None);
            }
        }

        if !due.is_empty() {
            self.refresh_gauges(&store);
        }
        due.len()
    }

    /// Close the breaker and clear its counters
    pub async fn reset_circuit_breaker(&self) {
        let mut store = self.store.lock().await;
        let was_open = store.breaker.is_open;
        store.breaker = CircuitBreakerState::default();
        tracing::info!(was_open, "Circuit breaker reset");
    }

    pub async fn circuit_status(&self) -> CircuitStatus {
        self.store.lock().await.breaker.status()
    }

    /// Whether new orders are currently accepted
    pub async fn is_accepting(&self) -> bool {
        !self.store.lock().await.breaker.is_open
    }

    /// Job by id; finished jobs stay available until evicted by retention
    pub async fn get_job(&self, job_id: JobId) -> Option<OrderJob> {
        self.store.lock().await.jobs.get(&job_id).cloned()
    }

    /// Jobs currently in `state`, oldest first
    pub async fn jobs_by_state(&self, state: JobState) -> Vec<OrderJob> {
        let store = self.store.lock().await;
        let mut jobs: Vec<OrderJob> = store
            .jobs
            .values()
            .filter(|j| j.state == state)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// True when nothing is waiting, retrying or running
    pub async fn is_idle(&self) -> bool {
        let store = self.store.lock().await;
        store.processing.is_empty()
            && store.count(JobState::Pending) == 0
            && store.count(JobState::RetryPending) == 0
    }

    pub async fn get_queue_state(&self) -> QueueState {
        let store = self.store.lock().await;
        QueueState {
            pending: store.count(JobState::Pending),
            processing: store.processing.len(),
            retry_pending: store.count(JobState::RetryPending),
            completed: store.count(JobState::Success),
            failed: store.count(JobState::Failed),
            total: store.jobs.len(),
            max_concurrent: self.config.max_concurrent_jobs,
            circuit_breaker: store.breaker.status(),
        }
    }

    /// Aggregates over the jobs currently retained
    pub async fn get_stats(&self) -> QueueStats {
        let store = self.store.lock().await;
        let completed = store.count(JobState::Success);
        let failed = store.count(JobState::Failed);
        let finished = completed + failed;

        let durations: Vec<u64> = store
            .finished
            .iter()
            .filter_map(|id| store.jobs.get(id))
            .filter_map(|j| j.processing_ms())
            .collect();
        let average_processing_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<u64>() as f64 / durations.len() as f64
        };

        let average_retries = if store.jobs.is_empty() {
            0.0
        } else {
            store
                .jobs
                .values()
                .map(|j| j.retry.attempt as f64)
                .sum::<f64>()
                / store.jobs.len() as f64
        };

        QueueStats {
            total_jobs: store.jobs.len(),
            completed,
            failed,
            success_rate: if finished == 0 {
                0.0
            } else {
                completed as f64 / finished as f64 * 100.0
            },
            average_processing_ms,
            average_retries,
            circuit_breaker: store.breaker.clone(),
            circuit_status: store.breaker.status(),
        }
    }

    /// Apply retention after a job reached a terminal state
    fn finish(&self, store: &mut JobStore) {
        let evicted = store.prune(self.config.max_retained_jobs);
        if evicted > 0 {
            tracing::debug!(evicted, retained = store.finished.len(), "Evicted finished jobs");
        }
        self.refresh_gauges(store);
    }

    fn emit(
        &self,
        job: &OrderJob,
        event_type: QueueEventType,
        data: Option<serde_json::Value>,
        error: Option<String>,
    ) {
        self.events.publish(QueueEvent {
            event_type,
            job_id: job.id,
            order_id: job.order.id.clone(),
            state: job.state,
            data,
            error,
            timestamp: Utc::now(),
        });
    }

    fn refresh_gauges(&self, store: &JobStore) {
        telemetry::set_gauge(
            GaugeMetric::PendingJobs,
            store.count(JobState::Pending) as f64,
        );
        telemetry::set_gauge(GaugeMetric::ProcessingJobs, store.processing.len() as f64);
        telemetry::set_gauge(
            GaugeMetric::RetryPendingJobs,
            store.count(JobState::RetryPending) as f64,
        );
    }
}

/// Count one more failure: the first leaves `attempt` at 0, later ones bump it
fn record_failure(retry: &mut RetryInfo, error: &str) {
    if retry.last_error.is_some() {
        retry.attempt = (retry.attempt + 1).min(retry.max_attempts);
    }
    retry.last_error = Some(error.to_string());
}
