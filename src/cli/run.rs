//! Run command implementation

use super::router_from_config;
use crate::config::Config;
use crate::events::{EventBus, LifecycleEvent};
use crate::execution::{ExecutionEngine, ExecutionState};
use crate::order::Order;
use crate::queue::{JobPriority, JobProcessor, JobQueue, QueueError};
use clap::Args;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Number of orders to submit
    #[arg(short = 'n', long, default_value_t = 10)]
    pub orders: usize,

    /// Token to sell
    #[arg(long, default_value = "SOL")]
    pub token_in: String,

    /// Token to buy
    #[arg(long, default_value = "USDC")]
    pub token_out: String,

    /// Amount per order
    #[arg(short, long, default_value = "1")]
    pub amount: Decimal,

    /// Slippage tolerance in basis points (defaults to the configured value)
    #[arg(long)]
    pub slippage_bps: Option<u32>,

    /// Priority for submitted orders
    #[arg(long, default_value = "normal")]
    pub priority: JobPriority,

    /// Give up waiting for the queue to drain after this many seconds
    #[arg(long, default_value_t = 120)]
    pub drain_timeout_secs: u64,

    /// Print every lifecycle event as JSON
    #[arg(short, long)]
    pub verbose: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let events = EventBus::new(config.events.capacity);
        let router = Arc::new(router_from_config(config));
        let engine = Arc::new(ExecutionEngine::new(
            Arc::clone(&router),
            config.execution.clone(),
            events.clone(),
        ));
        let queue = Arc::new(JobQueue::new(config.queue.clone(), events.clone()));
        let processor = Arc::new(JobProcessor::new(
            Arc::clone(&queue),
            engine.clone(),
            config.queue.clone(),
        ));

        let printer = self.verbose.then(|| spawn_event_printer(&events));
        let handle = Arc::clone(&processor).start();

        let slippage_bps = self
            .slippage_bps
            .unwrap_or(config.execution.slippage_tolerance_bps);
        tracing::info!(
            orders = self.orders,
            pair = %format!("{}/{}", self.token_in, self.token_out),
            sources = ?router.source_names(),
            "Submitting orders"
        );

        for _ in 0..self.orders {
            let order = Order::market(&self.token_in, &self.token_out, self.amount, slippage_bps);
            match queue.add_order(order, self.priority).await {
                Ok(_) => {}
                Err(QueueError::QueueClosed) => {
                    tracing::warn!("Queue closed, no further orders submitted");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let drained = tokio::time::timeout(Duration::from_secs(self.drain_timeout_secs), async {
            while !queue.is_idle().await {
                tokio::time::sleep(config.queue.poll_interval()).await;
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                timeout_secs = self.drain_timeout_secs,
                "Queue did not drain in time"
            );
        }

        handle.shutdown().await?;
        if let Some(printer) = printer {
            printer.abort();
        }

        let queue_stats = queue.get_stats().await;
        let state = queue.get_queue_state().await;
        let exec_stats = engine.get_stats().await;

        println!("Queue");
        println!(
            "  Jobs: {} total, {} completed, {} failed, {} still queued",
            queue_stats.total_jobs,
            queue_stats.completed,
            queue_stats.failed,
            state.pending + state.retry_pending + state.processing
        );
        println!("  Success rate: {:.1}%", queue_stats.success_rate);
        println!(
            "  Avg processing: {:.0}ms, avg retries: {:.2}",
            queue_stats.average_processing_ms, queue_stats.average_retries
        );
        println!("  Circuit breaker: {:?}", queue_stats.circuit_status);
        println!("Executions");
        println!(
            "  Attempts: {} ({} confirmed, {} failed, {:.1}% success)",
            exec_stats.total_executed,
            exec_stats.total_successful,
            exec_stats.total_failed,
            exec_stats.success_rate()
        );
        println!(
            "  Avg execution: {:.0}ms",
            exec_stats.average_execution_ms
        );

        for ctx in engine
            .get_executions_by_state(ExecutionState::Failed)
            .await
            .iter()
            .take(5)
        {
            println!(
                "  failed {} (attempt {}): {}",
                ctx.order.id,
                ctx.order.attempts,
                ctx.error.as_deref().unwrap_or("unknown")
            );
        }

        Ok(())
    }
}

fn spawn_event_printer(events: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event printer lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(event: &LifecycleEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
    }
}
