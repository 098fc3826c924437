//! Shared fixtures

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dex_exec::config::{ExecutionConfig, QueueConfig};
use dex_exec::events::EventBus;
use dex_exec::execution::{ExecutionEngine, RetryPolicy};
use dex_exec::order::Order;
use dex_exec::quote::{DexQuote, QuoteRouter, QuoteSource};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Source returning a fixed quote, or nothing when `amount_out` is None
pub struct StubSource {
    pub name: String,
    pub amount_out: Option<Decimal>,
    pub price_impact: Decimal,
    pub liquidity: Decimal,
    pub calls: AtomicU32,
}

impl StubSource {
    pub fn quoting(name: &str, amount_out: Decimal) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            amount_out: Some(amount_out),
            price_impact: dec!(0.3),
            liquidity: dec!(1000000),
            calls: AtomicU32::new(0),
        })
    }

    pub fn silent(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            amount_out: None,
            price_impact: Decimal::ZERO,
            liquidity: Decimal::ZERO,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for StubSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: Decimal,
        _slippage_percent: Decimal,
    ) -> anyhow::Result<Option<DexQuote>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(amount_out) = self.amount_out else {
            return Ok(None);
        };
        let now = Utc::now();
        Ok(Some(DexQuote {
            source: self.name.clone(),
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            amount_in,
            amount_out,
            price: amount_out / amount_in,
            price_impact: self.price_impact,
            fee_bps: 25,
            fee_amount: amount_in * dec!(0.0025),
            liquidity: self.liquidity,
            quoted_at: now,
            expires_at: now + Duration::seconds(30),
        }))
    }

    fn supports_pair(&self, _token_in: &str, _token_out: &str) -> bool {
        self.amount_out.is_some()
    }

    async fn get_liquidity(&self, _token_in: &str, _token_out: &str) -> anyhow::Result<Decimal> {
        Ok(self.liquidity)
    }
}

/// Source that always errors
pub struct BrokenSource;

#[async_trait]
impl QuoteSource for BrokenSource {
    fn name(&self) -> &str {
        "broken"
    }

    async fn get_quote(
        &self,
        _: &str,
        _: &str,
        _: Decimal,
        _: Decimal,
    ) -> anyhow::Result<Option<DexQuote>> {
        anyhow::bail!("upstream 503")
    }

    fn supports_pair(&self, _: &str, _: &str) -> bool {
        true
    }

    async fn get_liquidity(&self, _: &str, _: &str) -> anyhow::Result<Decimal> {
        anyhow::bail!("upstream 503")
    }
}

/// Execution config without simulated delays and with a tight retry policy
pub fn fast_execution() -> ExecutionConfig {
    ExecutionConfig {
        build_delay_ms: 0,
        submit_delay_ms: 0,
        confirm_delay_ms: 1,
        routing_retry: RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter: 0.0,
        },
        ..ExecutionConfig::default()
    }
}

/// Queue config with millisecond-scale backoff and polling
pub fn fast_queue(max_concurrent_jobs: usize, max_retries: u32) -> QueueConfig {
    QueueConfig {
        max_concurrent_jobs,
        max_retries,
        retry_backoff_ms: 5,
        retry_backoff_multiplier: 2.0,
        job_timeout_ms: 5_000,
        poll_interval_ms: 2,
        retry_sweep_interval_ms: 2,
        ..QueueConfig::default()
    }
}

pub fn engine(sources: Vec<Arc<dyn QuoteSource>>, events: EventBus) -> Arc<ExecutionEngine> {
    let router = Arc::new(QuoteRouter::with_sources(sources));
    Arc::new(ExecutionEngine::new(router, fast_execution(), events))
}

pub fn order(id: &str) -> Order {
    Order::new(id, "SOL", "USDC", dec!(1), 50)
}
