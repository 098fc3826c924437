//! Job processor
//!
//! Drives the queue: every poll tick it fills free slots with eligible jobs
//! and runs each one on its own task; a slower sweep returns due retries to
//! the pending pool.

use super::job_queue::JobQueue;
use super::types::{OrderJob, ProcessingResult};
use crate::config::QueueConfig;
use crate::execution::OrderExecutor;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

/// Pulls jobs from a [`JobQueue`] and executes them
pub struct JobProcessor {
    queue: Arc<JobQueue>,
    executor: Arc<dyn OrderExecutor>,
    config: QueueConfig,
}

/// Handle to a running processor
pub struct ProcessorHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ProcessorHandle {
    /// Stop polling and wait for in-flight executions to finish
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.task.await?;
        Ok(())
    }
}

impl JobProcessor {
    pub fn new(queue: Arc<JobQueue>, executor: Arc<dyn OrderExecutor>, config: QueueConfig) -> Self {
        Self {
            queue,
            executor,
            config,
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Start as many eligible jobs as there are free slots
    ///
    /// Stops early while the circuit breaker is open. Returns the number of
    /// jobs started.
    pub async fn tick(self: &Arc<Self>, in_flight: &mut JoinSet<()>) -> usize {
        let mut started = 0;
        while self.queue.is_accepting().await {
            let Some(job) = self.queue.dequeue().await else {
                break;
            };
            in_flight.spawn(Arc::clone(self).process(job));
            started += 1;
        }
        started
    }

    /// Re-admit retry-pending jobs whose backoff has elapsed
    pub async fn sweep_retries(&self) -> usize {
        let readmitted = self.queue.readmit_due_retries(Utc::now()).await;
        if readmitted > 0 {
            tracing::debug!(readmitted, "Retry sweep");
        }
        readmitted
    }

    /// Execute one started job and report the outcome to the queue
    ///
    /// The execution runs on its own task so a panic is reported as a job
    /// failure. Hitting the job timeout aborts that task before the failure
    /// is reported, so a timed-out attempt can never confirm later.
    pub async fn process(self: Arc<Self>, job: OrderJob) {
        let started = Instant::now();
        let job_id = job.id;
        let mut order = job.order.clone();
        order.attempts = job.retry.failures() + 1;

        let executor = Arc::clone(&self.executor);
        let mut execution = tokio::spawn(async move { executor.execute(&order).await });
        let timeout = self.config.job_timeout();

        match tokio::time::timeout(timeout, &mut execution).await {
            Ok(Ok(Ok(ctx))) => {
                self.queue
                    .complete_job(job_id, ProcessingResult::from_execution(&ctx))
                    .await;
            }
            Ok(Ok(Err(e))) if e.is_queue_retryable() => {
                self.queue.fail_job(job_id, &e.to_string()).await;
            }
            Ok(Ok(Err(e))) if e.is_validation() => {
                tracing::info!(job_id = %job_id, kind = e.kind(), error = %e, "Order rejected");
                self.queue.reject_job(job_id, &e.to_string()).await;
            }
            Ok(Ok(Err(e))) => {
                self.queue.abort_job(job_id, &e.to_string()).await;
            }
            Ok(Err(join_err)) => {
                tracing::error!(job_id = %job_id, error = %join_err, "Execution task panicked");
                self.queue
                    .fail_job(job_id, &format!("execution panicked: {join_err}"))
                    .await;
            }
            Err(_) => {
                execution.abort();
                tracing::warn!(
                    job_id = %job_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Job timed out, execution aborted"
                );
                self.queue
                    .fail_job(
                        job_id,
                        &format!("job timed out after {}ms", timeout.as_millis()),
                    )
                    .await;
            }
        }

        tracing::debug!(
            job_id = %job_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Job processed"
        );
    }

    /// Spawn the poll and sweep loops
    pub fn start(self: Arc<Self>) -> ProcessorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut poll = tokio::time::interval(self.config.poll_interval());
            poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut sweep = tokio::time::interval(self.config.retry_sweep_interval());
            sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut in_flight = JoinSet::new();

            tracing::info!(
                max_concurrent = self.config.max_concurrent_jobs,
                poll_ms = self.config.poll_interval_ms,
                "Job processor started"
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = poll.tick() => {
                        self.tick(&mut in_flight).await;
                    }
                    _ = sweep.tick() => {
                        self.sweep_retries().await;
                    }
                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Err(e) = joined {
                            tracing::error!(error = %e, "Job task aborted");
                        }
                    }
                }
            }

            let remaining = in_flight.len();
            if remaining > 0 {
                tracing::info!(remaining, "Waiting for in-flight jobs");
            }
            while in_flight.join_next().await.is_some() {}
            tracing::info!("Job processor stopped");
        });

        ProcessorHandle { shutdown_tx, task }
    }
}
