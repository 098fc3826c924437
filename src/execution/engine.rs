//! Order execution state machine
//!
//! Drives one order through validate → route → build → submit → confirm.
//! Every step can short-circuit to FAILED; nothing leaves the process before
//! CONFIRMED, so a failure needs no rollback.

use super::retry::retry_with_backoff;
use super::types::{
    ExecutionContext, ExecutionEvent, ExecutionEventType, ExecutionId, ExecutionState,
    ExecutionStats, SimulatedTransaction,
};
use super::OrderExecutor;
use crate::config::ExecutionConfig;
use crate::error::ExecutionError;
use crate::events::EventBus;
use crate::order::{Order, MAX_SLIPPAGE_BPS};
use crate::quote::scoring::{self, classify_impact};
use crate::quote::{DexQuote, QuoteRouter};
use crate::telemetry::{self, CounterMetric, LatencyMetric};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Check an order before any work is done on it
pub fn validate_order(order: &Order) -> Result<(), ExecutionError> {
    if order.id.trim().is_empty() {
        return Err(ExecutionError::Validation("order id is required".into()));
    }
    if order.token_in.trim().is_empty() {
        return Err(ExecutionError::InvalidToken("token_in is required".into()));
    }
    if order.token_out.trim().is_empty() {
        return Err(ExecutionError::InvalidToken("token_out is required".into()));
    }
    if order.token_in == order.token_out {
        return Err(ExecutionError::InvalidToken(format!(
            "token_in and token_out are both {}",
            order.token_in
        )));
    }
    if order.amount <= Decimal::ZERO {
        return Err(ExecutionError::InvalidAmount(format!(
            "amount must be greater than zero, got {}",
            order.amount
        )));
    }
    if order.slippage_bps > MAX_SLIPPAGE_BPS {
        return Err(ExecutionError::InvalidSlippage(format!(
            "{} bps is outside 0-{}",
            order.slippage_bps, MAX_SLIPPAGE_BPS
        )));
    }
    Ok(())
}

/// Archived execution contexts, evicted oldest first
#[derive(Default)]
struct Archive {
    contexts: HashMap<ExecutionId, ExecutionContext>,
    order: VecDeque<ExecutionId>,
}

impl Archive {
    fn save(&mut self, ctx: &ExecutionContext, retain: usize) -> usize {
        if self
            .contexts
            .insert(ctx.execution_id, ctx.clone())
            .is_none()
        {
            self.order.push_back(ctx.execution_id);
        }

        let mut evicted = 0;
        while self.contexts.len() > retain {
            let Some(id) = self.order.pop_front() else {
                break;
            };
            if self.contexts.remove(&id).is_some() {
                evicted += 1;
            }
        }
        evicted
    }
}

/// Executes orders against the quote router, one context per attempt
pub struct ExecutionEngine {
    router: Arc<QuoteRouter>,
    config: ExecutionConfig,
    events: EventBus,
    executions: RwLock<Archive>,
    stats: RwLock<ExecutionStats>,
}

impl ExecutionEngine {
    /// Create an engine routing through `router`
    pub fn new(router: Arc<QuoteRouter>, config: ExecutionConfig, events: EventBus) -> Self {
        Self {
            router,
            config,
            events,
            executions: RwLock::new(Archive::default()),
            stats: RwLock::new(ExecutionStats::default()),
        }
    }

    /// Run one execution attempt for `order`
    ///
    /// On failure the context is still archived with state FAILED and the
    /// error message, and the error is returned to the caller.
    pub async fn execute_order(&self, order: &Order) -> Result<ExecutionContext, ExecutionError> {
        let started = Instant::now();
        let mut ctx = ExecutionContext::new(order.clone());

        self.stats.write().await.enter(ExecutionState::Pending);
        self.save(&ctx).await;
        self.emit(&ctx, ExecutionEventType::Started, None, None);

        tracing::info!(
            execution_id = %ctx.execution_id,
            order_id = %order.id,
            pair = %order.pair(),
            amount = %order.amount,
            attempt = order.attempts,
            "Executing order"
        );

        let outcome = self.run_pipeline(&mut ctx).await;
        if let Err(e) = &outcome {
            self.fail(&mut ctx, e).await;
        }

        let elapsed_ms = ctx
            .elapsed_ms
            .unwrap_or(started.elapsed().as_millis() as u64);
        self.stats
            .write()
            .await
            .record_finished(outcome.is_ok(), elapsed_ms);
        telemetry::record_latency(LatencyMetric::Execution, started.elapsed());
        self.save(&ctx).await;

        match outcome {
            Ok(()) => {
                telemetry::increment(CounterMetric::ExecutionsConfirmed);
                Ok(ctx)
            }
            Err(e) => {
                telemetry::increment(CounterMetric::ExecutionsFailed);
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        validate_order(&ctx.order)?;
        self.emit(ctx, ExecutionEventType::Validated, None, None);

        let quote = self.route(ctx).await?;
        self.build(ctx, &quote).await?;
        self.submit(ctx).await?;
        self.confirm(ctx).await
    }

    async fn route(&self, ctx: &mut ExecutionContext) -> Result<DexQuote, ExecutionError> {
        self.transition(ctx, ExecutionState::Routing).await;

        let router = &self.router;
        let token_in = ctx.order.token_in.clone();
        let token_out = ctx.order.token_out.clone();
        let amount = ctx.order.amount;
        let slippage = ctx.order.slippage_percent();
        let priority = self.config.routing_priority;
        let timeout = self.config.routing_timeout();

        let route = retry_with_backoff(&self.config.routing_retry, "routing", |attempt| {
            let token_in = token_in.clone();
            let token_out = token_out.clone();
            async move {
                if attempt > 1 {
                    tracing::debug!(attempt, pair = %format!("{token_in}/{token_out}"), "Re-routing");
                }
                let routed = tokio::time::timeout(
                    timeout,
                    router.route_order(&token_in, &token_out, amount, slippage, priority),
                )
                .await
                .map_err(|_| {
                    ExecutionError::Network(format!(
                        "routing timed out after {}ms",
                        timeout.as_millis()
                    ))
                })?;

                if routed.best_quote.is_none() {
                    return Err(ExecutionError::DexApi(format!(
                        "no quotes available for {token_in}/{token_out}"
                    )));
                }
                Ok(routed)
            }
        })
        .await?;

        let now = Utc::now();
        let quote = match route.best_quote.filter(|q| q.is_fresh_at(now)) {
            Some(q) => q,
            None => scoring::select_best_at(&route.all_quotes, &self.config.scoring_weights, now)
                .ok_or_else(|| {
                    ExecutionError::DexApi("all quotes expired before selection".into())
                })?,
        };

        let impact = classify_impact(quote.price_impact, self.router.thresholds());
        if !impact.is_valid && self.config.reject_critical_impact {
            return Err(ExecutionError::InsufficientLiquidity(format!(
                "price impact {}% on {} is critical",
                quote.price_impact, quote.source
            )));
        }

        let minimum_output = scoring::minimum_output(quote.amount_out, slippage);
        let quality = scoring::quality_assessment(&quote);

        ctx.selected_quote = Some(quote.clone());
        ctx.minimum_output = Some(minimum_output);
        self.save(ctx).await;

        tracing::info!(
            order_id = %ctx.order.id,
            source = %quote.source,
            amount_out = %quote.amount_out,
            price_impact = %quote.price_impact,
            "Order routed"
        );
        self.emit(
            ctx,
            ExecutionEventType::Routed,
            Some(json!({
                "source": quote.source,
                "amount_out": quote.amount_out,
                "price_impact": quote.price_impact,
                "impact_level": impact.level,
                "minimum_output": minimum_output,
                "quality": quality.quality,
                "quotes_considered": route.all_quotes.len(),
            })),
            None,
        );

        Ok(quote)
    }

    async fn build(&self, ctx: &mut ExecutionContext, quote: &DexQuote) -> Result<(), ExecutionError> {
        self.transition(ctx, ExecutionState::Building).await;

        let minimum_amount_out = ctx.minimum_output.unwrap_or(quote.amount_out);
        let build = async {
            self.simulate_delay(self.config.build_delay_ms).await;
            SimulatedTransaction {
                from: self.config.wallet_address.clone(),
                program: format!("{}-router", quote.source),
                token_in: quote.token_in.clone(),
                token_out: quote.token_out.clone(),
                amount_in: quote.amount_in,
                minimum_amount_out,
                gas_limit: scale_gas(self.config.base_gas_limit, self.config.gas_multiplier),
                priority_fee: scale_gas(self.config.base_priority_fee, self.config.gas_multiplier),
                recent_blockhash: random_hash(),
                built_at: Utc::now(),
            }
        };

        let timeout = self.config.building_timeout();
        let tx = tokio::time::timeout(timeout, build).await.map_err(|_| {
            ExecutionError::Network(format!("building timed out after {}ms", timeout.as_millis()))
        })?;

        tracing::debug!(
            order_id = %ctx.order.id,
            gas_limit = tx.gas_limit,
            priority_fee = tx.priority_fee,
            "Transaction built"
        );
        let data = json!({
            "program": tx.program,
            "gas_limit": tx.gas_limit,
            "priority_fee": tx.priority_fee,
            "minimum_amount_out": tx.minimum_amount_out,
        });
        ctx.transaction = Some(tx);
        self.save(ctx).await;
        self.emit(ctx, ExecutionEventType::Built, Some(data), None);
        Ok(())
    }

    async fn submit(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        self.transition(ctx, ExecutionState::Submitted).await;
        self.simulate_delay(self.config.submit_delay_ms).await;

        if self.config.submit_failure_rate > 0.0
            && rand::random::<f64>() < self.config.submit_failure_rate
        {
            return Err(ExecutionError::Rpc(
                "simulated node rejected the transaction".into(),
            ));
        }

        let tx_hash = format!("0x{}", random_hash());
        tracing::info!(order_id = %ctx.order.id, %tx_hash, "Transaction submitted");
        ctx.tx_hash = Some(tx_hash.clone());
        self.save(ctx).await;
        self.emit(
            ctx,
            ExecutionEventType::Submitted,
            Some(json!({ "tx_hash": tx_hash })),
            None,
        );
        Ok(())
    }

    async fn confirm(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        self.simulate_delay(self.config.confirm_delay_ms).await;
        self.transition(ctx, ExecutionState::Confirmed).await;

        tracing::info!(
            order_id = %ctx.order.id,
            execution_id = %ctx.execution_id,
            elapsed_ms = ctx.elapsed_ms.unwrap_or(0),
            "Order confirmed"
        );
        self.emit(
            ctx,
            ExecutionEventType::Confirmed,
            Some(json!({
                "tx_hash": ctx.tx_hash,
                "amount_out": ctx.selected_quote.as_ref().map(|q| q.amount_out),
                "elapsed_ms": ctx.elapsed_ms,
            })),
            None,
        );
        Ok(())
    }

    async fn fail(&self, ctx: &mut ExecutionContext, error: &ExecutionError) {
        ctx.error = Some(error.to_string());
        self.transition(ctx, ExecutionState::Failed).await;

        tracing::warn!(
            order_id = %ctx.order.id,
            execution_id = %ctx.execution_id,
            kind = error.kind(),
            error = %error,
            "Execution failed"
        );
        self.emit(
            ctx,
            ExecutionEventType::Failed,
            Some(json!({ "kind": error.kind() })),
            Some(error.to_string()),
        );
    }

    async fn transition(&self, ctx: &mut ExecutionContext, to: ExecutionState) {
        let from = ctx.transition(to);
        self.stats.write().await.move_state(from, to);
        self.save(ctx).await;
        tracing::debug!(order_id = %ctx.order.id, ?from, ?to, "Execution state change");
    }

    async fn save(&self, ctx: &ExecutionContext) {
        let evicted = self
            .executions
            .write()
            .await
            .save(ctx, self.config.max_retained_executions);
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted archived executions");
        }
    }

    fn emit(
        &self,
        ctx: &ExecutionContext,
        event_type: ExecutionEventType,
        data: Option<serde_json::Value>,
        error: Option<String>,
    ) {
        self.events.publish(ExecutionEvent {
            event_type,
            execution_id: ctx.execution_id,
            order_id: ctx.order.id.clone(),
            state: ctx.state,
            data,
            error,
            timestamp: Utc::now(),
        });
    }

    async fn simulate_delay(&self, ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Look up an execution attempt
    pub async fn get_execution(&self, id: ExecutionId) -> Option<ExecutionContext> {
        self.executions.read().await.contexts.get(&id).cloned()
    }

    /// Most recent execution attempt for an order
    pub async fn get_execution_by_order(&self, order_id: &str) -> Option<ExecutionContext> {
        self.executions
            .read()
            .await
            .contexts
            .values()
            .filter(|c| c.order.id == order_id)
            .max_by_key(|c| c.started_at)
            .cloned()
    }

    /// All executions currently in `state`
    pub async fn get_executions_by_state(&self, state: ExecutionState) -> Vec<ExecutionContext> {
        let mut found: Vec<ExecutionContext> = self
            .executions
            .read()
            .await
            .contexts
            .values()
            .filter(|c| c.state == state)
            .cloned()
            .collect();
        found.sort_by_key(|c| c.started_at);
        found
    }

    /// Snapshot of aggregate statistics
    pub async fn get_stats(&self) -> ExecutionStats {
        self.stats.read().await.clone()
    }

    /// Router used for quotes
    pub fn router(&self) -> &Arc<QuoteRouter> {
        &self.router
    }
}

#[async_trait]
impl OrderExecutor for ExecutionEngine {
    async fn execute(&self, order: &Order) -> Result<ExecutionContext, ExecutionError> {
        self.execute_order(order).await
    }
}

fn scale_gas(base: u64, multiplier: f64) -> u64 {
    (base as f64 * multiplier).ceil() as u64
}

fn random_hash() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}
