//! Execution engine integration tests

use crate::common::{engine, order, StubSource};
use dex_exec::error::ExecutionError;
use dex_exec::events::{EventBus, LifecycleEvent};
use dex_exec::execution::{ExecutionEventType, ExecutionState};
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_order_confirms_through_every_state() {
    let source = StubSource::quoting("alpha", dec!(150));
    let engine = engine(vec![source.clone()], EventBus::default());

    let ctx = engine.execute_order(&order("ord-ok")).await.unwrap();
    assert_eq!(ctx.state, ExecutionState::Confirmed);
    assert_eq!(ctx.selected_quote.as_ref().unwrap().amount_out, dec!(150));
    assert_eq!(ctx.minimum_output, Some(dec!(149.25)));
    assert!(ctx.tx_hash.is_some());
    assert_eq!(source.calls(), 1);

    let archived = engine.get_execution(ctx.execution_id).await.unwrap();
    assert_eq!(archived, ctx);
    assert_eq!(
        engine.get_executions_by_state(ExecutionState::Confirmed).await.len(),
        1
    );
}

#[tokio::test]
async fn test_zero_amount_fails_without_routing() {
    let source = StubSource::quoting("alpha", dec!(150));
    let engine = engine(vec![source.clone()], EventBus::default());

    let mut bad = order("ord-zero");
    bad.amount = dec!(0);
    let err = engine.execute_order(&bad).await.unwrap_err();

    assert!(matches!(err, ExecutionError::InvalidAmount(_)));
    assert!(err.to_string().contains("Invalid amount"));
    assert_eq!(source.calls(), 0);

    let ctx = engine.get_execution_by_order("ord-zero").await.unwrap();
    assert_eq!(ctx.state, ExecutionState::Failed);
    assert!(ctx.error.unwrap().contains("Invalid amount"));
    assert!(ctx.selected_quote.is_none());
}

#[tokio::test]
async fn test_no_quotes_fails_execution() {
    let a = StubSource::silent("a");
    let b = StubSource::silent("b");
    let bus = EventBus::default();
    let mut rx = bus.subscribe();
    let engine = engine(vec![a.clone(), b.clone()], bus);

    let err = engine.execute_order(&order("ord-none")).await.unwrap_err();
    assert!(err.is_queue_retryable());
    // one routing call per source per in-step attempt
    assert_eq!(a.calls(), 2);
    assert_eq!(b.calls(), 2);

    let stats = engine.get_stats().await;
    assert_eq!(stats.total_failed, 1);
    assert_eq!(stats.count(ExecutionState::Failed), 1);

    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        if let LifecycleEvent::Execution(e) = event {
            last = Some(e);
        }
    }
    let last = last.unwrap();
    assert_eq!(last.event_type, ExecutionEventType::Failed);
    assert_eq!(last.state, ExecutionState::Failed);
    assert!(last.error.unwrap().contains("no quotes available"));
}

#[tokio::test]
async fn test_stats_track_mixed_outcomes() {
    let engine = engine(vec![StubSource::quoting("alpha", dec!(150))], EventBus::default());

    engine.execute_order(&order("ok-1")).await.unwrap();
    engine.execute_order(&order("ok-2")).await.unwrap();
    let mut bad = order("bad");
    bad.token_out = "SOL".into();
    engine.execute_order(&bad).await.unwrap_err();

    let stats = engine.get_stats().await;
    assert_eq!(stats.total_executed, 3);
    assert_eq!(stats.total_successful, 2);
    assert_eq!(stats.total_failed, 1);
    assert_eq!(stats.count(ExecutionState::Confirmed), 2);
    assert_eq!(stats.count(ExecutionState::Failed), 1);
    assert_eq!(stats.count(ExecutionState::Pending), 0);
    assert!(stats.average_execution_ms >= 0.0);
}
