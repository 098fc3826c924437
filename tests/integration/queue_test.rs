//! Job queue integration tests

use crate::common::{fast_queue, order};
use dex_exec::events::EventBus;
use dex_exec::queue::{
    backoff_ms, CircuitStatus, JobPriority, JobQueue, JobState, ProcessingResult, QueueError,
};
use std::sync::Arc;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_high_priority_jumps_normal_backlog() {
    let queue = JobQueue::new(fast_queue(1, 3), EventBus::default());
    for i in 0..3 {
        assert_ok!(queue.add_order(order(&format!("n{i}")), JobPriority::Normal).await);
    }
    let high = queue.add_order(order("h"), JobPriority::High).await.unwrap();

    assert_eq!(queue.get_next_job().await.unwrap().id, high.id);
    assert_eq!(queue.dequeue().await.unwrap().id, high.id);
}

#[tokio::test]
async fn test_concurrent_burst_never_exceeds_ceiling() {
    let queue = Arc::new(JobQueue::new(fast_queue(4, 3), EventBus::default()));
    let mut adders = Vec::new();
    for i in 0..50 {
        let q = Arc::clone(&queue);
        adders.push(tokio::spawn(async move {
            q.add_order(order(&format!("o{i}")), JobPriority::Normal).await
        }));
    }
    for adder in adders {
        assert_ok!(adder.await.unwrap());
    }

    let mut workers = Vec::new();
    for _ in 0..8 {
        let q = Arc::clone(&queue);
        workers.push(tokio::spawn(async move {
            let mut done = 0;
            while let Some(job) = q.dequeue().await {
                let processing = q.get_queue_state().await.processing;
                assert!(processing <= 4, "processing {processing} above ceiling");
                tokio::task::yield_now().await;
                q.complete_job(job.id, ProcessingResult::from_execution(
                    &dex_exec::execution::ExecutionContext::new(job.order.clone()),
                ))
                .await;
                done += 1;
            }
            done
        }));
    }

    let mut total = 0;
    for worker in workers {
        total += worker.await.unwrap();
    }
    // workers stop when the queue momentarily looks full, so finish the rest here
    while let Some(job) = queue.dequeue().await {
        queue
            .complete_job(job.id, ProcessingResult::from_execution(
                &dex_exec::execution::ExecutionContext::new(job.order.clone()),
            ))
            .await;
        total += 1;
    }

    assert_eq!(total, 50);
    let state = queue.get_queue_state().await;
    assert_eq!(state.completed, 50);
    assert_eq!(state.processing, 0);
}

#[tokio::test]
async fn test_breaker_blocks_until_reset() {
    let mut config = fast_queue(5, 0);
    config.circuit_breaker_threshold = 50.0;
    let queue = JobQueue::new(config, EventBus::default());

    for i in 0..3 {
        let job = queue
            .add_order(order(&format!("f{i}")), JobPriority::Normal)
            .await
            .unwrap();
        queue.dequeue().await.unwrap();
        assert!(queue.fail_job(job.id, "rpc unavailable").await);
    }

    let stats = queue.get_stats().await;
    assert_eq!(stats.circuit_status, CircuitStatus::Open);
    assert!(stats.circuit_breaker.opened_at.is_some());
    assert_eq!(stats.failed, 3);
    assert_eq!(
        queue.add_order(order("blocked"), JobPriority::High).await,
        Err(QueueError::QueueClosed)
    );

    queue.reset_circuit_breaker().await;
    assert_ok!(queue.add_order(order("after-reset"), JobPriority::High).await);
}

#[tokio::test]
async fn test_failed_jobs_keep_last_error() {
    let queue = JobQueue::new(fast_queue(2, 2), EventBus::default());
    let job = queue.add_order(order("a"), JobPriority::Low).await.unwrap();

    queue.dequeue().await.unwrap();
    queue.fail_job(job.id, "first").await;
    queue
        .readmit_due_retries(chrono::Utc::now() + chrono::Duration::seconds(1))
        .await;
    queue.dequeue().await.unwrap();
    queue.fail_job(job.id, "second").await;
    assert!(queue.jobs_by_state(JobState::Failed).await.is_empty());
    queue
        .readmit_due_retries(chrono::Utc::now() + chrono::Duration::seconds(1))
        .await;
    queue.dequeue().await.unwrap();
    queue.fail_job(job.id, "third").await;

    let failed = queue.jobs_by_state(JobState::Failed).await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].retry.last_error.as_deref(), Some("third"));
    assert_eq!(failed[0].retry.attempt, failed[0].retry.max_attempts);
}

#[tokio::test]
async fn test_single_failure_trips_breaker_without_streak_guard() {
    let mut config = fast_queue(5, 0);
    config.circuit_breaker_threshold = 50.0;
    config.circuit_breaker_min_failures = 1;
    let queue = JobQueue::new(config, EventBus::default());

    let job = queue.add_order(order("f0"), JobPriority::Normal).await.unwrap();
    queue.dequeue().await.unwrap();
    assert!(queue.fail_job(job.id, "rpc unavailable").await);

    let stats = queue.get_stats().await;
    assert_eq!(stats.circuit_breaker.failure_rate(), 100.0);
    assert_eq!(stats.circuit_status, CircuitStatus::Open);
    assert_eq!(
        queue.add_order(order("blocked"), JobPriority::High).await,
        Err(QueueError::QueueClosed)
    );
}

#[test]
fn test_backoff_formula() {
    assert_eq!(backoff_ms(1000, 2.0, 0), 500);
    for k in 1..6 {
        assert_eq!(backoff_ms(1000, 2.0, k), 1000 * 2u64.pow(k - 1));
    }
    assert!(backoff_ms(1000, 3.0, 1) > backoff_ms(1000, 3.0, 0));
}
