//! Queue, processor and engine wired together

use crate::common::{engine, fast_execution, fast_queue, order, StubSource};
use dex_exec::config::ExecutionConfig;
use dex_exec::events::{EventBus, LifecycleEvent};
use dex_exec::execution::{ExecutionEngine, ExecutionState};
use dex_exec::quote::QuoteRouter;
use dex_exec::queue::{
    CircuitStatus, JobPriority, JobProcessor, JobQueue, JobState, QueueEventType,
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

async fn wait_idle(queue: &JobQueue) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !queue.is_idle().await {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("queue did not drain");
}

#[tokio::test]
async fn test_orders_flow_to_success() {
    let bus = EventBus::default();
    let mut rx = bus.subscribe();
    let engine = engine(vec![StubSource::quoting("alpha", dec!(150))], bus.clone());
    let queue = Arc::new(JobQueue::new(fast_queue(3, 3), bus.clone()));
    let processor = Arc::new(JobProcessor::new(
        Arc::clone(&queue),
        engine.clone(),
        fast_queue(3, 3),
    ));

    let mut ids = Vec::new();
    for i in 0..8 {
        let job = queue
            .add_order(order(&format!("ord-{i}")), JobPriority::Normal)
            .await
            .unwrap();
        ids.push(job.id);
    }

    let handle = Arc::clone(&processor).start();
    wait_idle(&queue).await;
    handle.shutdown().await.unwrap();

    for id in ids {
        let job = queue.get_job(id).await.unwrap();
        assert_eq!(job.state, JobState::Success);
        let result = job.result.unwrap();
        assert!(result.success);
        assert!(result.tx_hash.is_some());
        assert_eq!(result.amount_out, Some(dec!(150)));
    }

    let stats = queue.get_stats().await;
    assert_eq!(stats.completed, 8);
    assert_eq!(stats.success_rate, 100.0);
    assert_eq!(engine.get_stats().await.total_successful, 8);

    let mut added = 0;
    let mut completed = 0;
    let mut confirmed = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            LifecycleEvent::Queue(e) if e.event_type == QueueEventType::OrderAdded => added += 1,
            LifecycleEvent::Queue(e) if e.event_type == QueueEventType::JobCompleted => {
                completed += 1
            }
            LifecycleEvent::Execution(e) if e.state == ExecutionState::Confirmed => {
                confirmed += 1
            }
            _ => {}
        }
    }
    assert_eq!((added, completed, confirmed), (8, 8, 8));
}

#[tokio::test]
async fn test_unroutable_orders_exhaust_retries_and_trip_breaker() {
    let silent = StubSource::silent("silent");
    let engine = engine(vec![silent.clone()], EventBus::default());
    let config = fast_queue(2, 2);
    let queue = Arc::new(JobQueue::new(config.clone(), EventBus::default()));
    let processor = Arc::new(JobProcessor::new(Arc::clone(&queue), engine.clone(), config));

    let mut ids = Vec::new();
    for i in 0..3 {
        ids.push(
            queue
                .add_order(order(&format!("ord-{i}")), JobPriority::Normal)
                .await
                .unwrap()
                .id,
        );
    }

    let handle = Arc::clone(&processor).start();
    wait_idle(&queue).await;
    handle.shutdown().await.unwrap();

    for id in ids {
        let job = queue.get_job(id).await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.retry.attempt, 2);
        assert_eq!(job.retry.failures(), 3);
        assert!(job.retry.last_error.unwrap().contains("no quotes available"));
    }

    // first run plus two retries per job, two in-step routing attempts each
    assert_eq!(silent.calls(), 18);
    assert_eq!(queue.circuit_status().await, CircuitStatus::Open);
    assert!(!queue.is_accepting().await);
}

#[tokio::test]
async fn test_invalid_order_is_not_retried() {
    let source = StubSource::quoting("alpha", dec!(150));
    let engine = engine(vec![source.clone()], EventBus::default());
    let config = fast_queue(2, 3);
    let queue = Arc::new(JobQueue::new(config.clone(), EventBus::default()));
    let processor = Arc::new(JobProcessor::new(Arc::clone(&queue), engine.clone(), config));

    let mut bad = order("ord-zero");
    bad.amount = dec!(0);
    let job = queue.add_order(bad, JobPriority::High).await.unwrap();

    let handle = Arc::clone(&processor).start();
    wait_idle(&queue).await;
    handle.shutdown().await.unwrap();

    let job = queue.get_job(job.id).await.unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.retry.attempt, 0);
    assert_eq!(job.retry.failures(), 1);
    assert!(job.retry.last_error.unwrap().contains("Invalid amount"));
    assert_eq!(source.calls(), 0);
    assert_eq!(queue.circuit_status().await, CircuitStatus::Closed);
}

#[tokio::test]
async fn test_timed_out_attempts_never_confirm() {
    let source = StubSource::quoting("alpha", dec!(150));
    let router = Arc::new(QuoteRouter::with_sources(vec![source.clone()]));
    let exec = ExecutionConfig {
        confirm_delay_ms: 80,
        ..fast_execution()
    };
    let engine = Arc::new(ExecutionEngine::new(router, exec, EventBus::default()));

    let mut config = fast_queue(1, 1);
    config.job_timeout_ms = 20;
    let queue = Arc::new(JobQueue::new(config.clone(), EventBus::default()));
    let processor = Arc::new(JobProcessor::new(Arc::clone(&queue), engine.clone(), config));
    let job = queue.add_order(order("ord-slow"), JobPriority::Normal).await.unwrap();

    let handle = Arc::clone(&processor).start();
    wait_idle(&queue).await;
    handle.shutdown().await.unwrap();

    let job = queue.get_job(job.id).await.unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.retry.failures(), 2);
    assert!(job.retry.last_error.unwrap().contains("timed out"));

    // outlive the confirm delay of both aborted runs
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(engine
        .get_executions_by_state(ExecutionState::Confirmed)
        .await
        .is_empty());
    assert_eq!(engine.get_stats().await.total_successful, 0);
    assert_eq!(source.calls(), 2);
}
