//! Simulated quote source
//!
//! Prices swaps from a static rate table with a constant-product style impact
//! model, optional random price variance, artificial latency and random
//! outages. Stands in for a real DEX aggregator API.

use super::{DexQuote, QuoteSource};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Exchange rate for one direction of a pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRate {
    pub token_in: String,
    pub token_out: String,
    /// Units of `token_out` per unit of `token_in`
    pub rate: Decimal,
}

/// Configuration for a simulated source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedSourceConfig {
    /// Source name
    pub name: String,
    /// Pool fee in basis points
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u32,
    /// Pool depth, in input token units
    #[serde(default = "default_liquidity")]
    pub liquidity: Decimal,
    /// Artificial response latency
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
    /// Max relative price noise, e.g. 0.02 for +/-2%
    #[serde(default)]
    pub price_variance: f64,
    /// Probability that a quote request errors out
    #[serde(default)]
    pub failure_rate: f64,
    /// How long a quote stays usable
    #[serde(default = "default_quote_ttl_secs")]
    pub quote_ttl_secs: u64,
    /// Supported pairs; the reverse direction uses the inverse rate
    #[serde(default)]
    pub pairs: Vec<PairRate>,
}

fn default_fee_bps() -> u32 {
    25
}
fn default_liquidity() -> Decimal {
    dec!(1000000)
}
fn default_latency_ms() -> u64 {
    200
}
fn default_quote_ttl_secs() -> u64 {
    30
}

impl SimulatedSourceConfig {
    /// Config with defaults and no pairs
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fee_bps: default_fee_bps(),
            liquidity: default_liquidity(),
            latency_ms: default_latency_ms(),
            price_variance: 0.0,
            failure_rate: 0.0,
            quote_ttl_secs: default_quote_ttl_secs(),
            pairs: vec![],
        }
    }

    /// Add a supported pair
    pub fn with_pair(
        mut self,
        token_in: impl Into<String>,
        token_out: impl Into<String>,
        rate: Decimal,
    ) -> Self {
        self.pairs.push(PairRate {
            token_in: token_in.into(),
            token_out: token_out.into(),
            rate,
        });
        self
    }
}

/// In-process quote source driven by [`SimulatedSourceConfig`]
pub struct SimulatedSource {
    config: SimulatedSourceConfig,
}

impl SimulatedSource {
    /// Create a source from its config
    pub fn new(config: SimulatedSourceConfig) -> Self {
        Self { config }
    }

    /// Rate for the pair, inverting a configured reverse entry if needed
    fn rate_for(&self, token_in: &str, token_out: &str) -> Option<Decimal> {
        self.config.pairs.iter().find_map(|p| {
            if p.token_in == token_in && p.token_out == token_out {
                Some(p.rate)
            } else if p.token_in == token_out && p.token_out == token_in && !p.rate.is_zero() {
                Some(Decimal::ONE / p.rate)
            } else {
                None
            }
        })
    }

    fn price_noise(&self) -> Decimal {
        let variance = self.config.price_variance.abs();
        if variance == 0.0 {
            return Decimal::ZERO;
        }
        let noise = rand::thread_rng().gen_range(-variance..=variance);
        Decimal::from_f64(noise).unwrap_or(Decimal::ZERO)
    }
}

#[async_trait]
impl QuoteSource for SimulatedSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn get_quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: Decimal,
        slippage_percent: Decimal,
    ) -> anyhow::Result<Option<DexQuote>> {
        if amount_in <= Decimal::ZERO {
            return Ok(None);
        }
        if slippage_percent < Decimal::ZERO || slippage_percent > dec!(100) {
            return Ok(None);
        }
        let Some(rate) = self.rate_for(token_in, token_out) else {
            return Ok(None);
        };

        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }

        if self.config.failure_rate > 0.0 && rand::random::<f64>() < self.config.failure_rate {
            anyhow::bail!("{} quote API unavailable", self.config.name);
        }

        let fee_amount = amount_in * Decimal::from(self.config.fee_bps) / dec!(10000);
        let net_in = amount_in - fee_amount;
        let price_impact = if self.config.liquidity > Decimal::ZERO {
            (net_in / self.config.liquidity * dec!(100)).min(dec!(100))
        } else {
            dec!(100)
        };

        let amount_out = (net_in
            * rate
            * (Decimal::ONE + self.price_noise())
            * (Decimal::ONE - price_impact / dec!(100)))
        .round_dp(9);

        let now = Utc::now();
        let quote = DexQuote {
            source: self.config.name.clone(),
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            amount_in,
            amount_out,
            price: amount_out / amount_in,
            price_impact: price_impact.round_dp(6),
            fee_bps: self.config.fee_bps,
            fee_amount,
            liquidity: self.config.liquidity,
            quoted_at: now,
            expires_at: now + Duration::seconds(self.config.quote_ttl_secs as i64),
        };

        tracing::debug!(
            source = %quote.source,
            pair = %format!("{}/{}", token_in, token_out),
            amount_in = %amount_in,
            amount_out = %quote.amount_out,
            "Simulated quote"
        );

        Ok(Some(quote))
    }

    fn supports_pair(&self, token_in: &str, token_out: &str) -> bool {
        self.rate_for(token_in, token_out).is_some()
    }

    async fn get_liquidity(&self, token_in: &str, token_out: &str) -> anyhow::Result<Decimal> {
        if self.supports_pair(token_in, token_out) {
            Ok(self.config.liquidity)
        } else {
            Ok(Decimal::ZERO)
        }
    }
}
