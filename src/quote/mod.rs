//! Quote module
//!
//! Multi-source quote routing and scoring:
//! - `QuoteSource`: pluggable liquidity source capability
//! - `QuoteRouter`: concurrent fan-out and priority-based selection
//! - `scoring`: pure pricing, impact and quality functions
//! - `SimulatedSource`: configurable in-process source

mod router;
pub mod scoring;
mod simulated;
mod types;

pub use router::QuoteRouter;
pub use scoring::{ImpactThresholds, ScoreWeights, ScoredQuote};
pub use simulated::{PairRate, SimulatedSource, SimulatedSourceConfig};
pub use types::{
    DexQuote, ImpactLevel, PriceImpactAssessment, QualityAssessment, QuoteOrigin, QuoteQuality,
    RouteResult, RoutingPriority,
};

use async_trait::async_trait;
use rust_decimal::Decimal;

/// Trait for liquidity sources that can price a swap
///
/// Implementations return `Ok(None)` rather than an error for inputs they
/// cannot price: unsupported pairs, non-positive amounts, or slippage outside
/// 0-100 percent.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Source name, unique within a router
    fn name(&self) -> &str;

    /// Quote a single swap
    async fn get_quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: Decimal,
        slippage_percent: Decimal,
    ) -> anyhow::Result<Option<DexQuote>>;

    /// Quote the same pair at several sizes, skipping sizes that cannot be priced
    async fn get_quote_range(
        &self,
        token_in: &str,
        token_out: &str,
        amounts: &[Decimal],
        slippage_percent: Decimal,
    ) -> anyhow::Result<Vec<DexQuote>> {
        let mut quotes = Vec::with_capacity(amounts.len());
        for amount in amounts {
            if let Some(q) = self
                .get_quote(token_in, token_out, *amount, slippage_percent)
                .await?
            {
                quotes.push(q);
            }
        }
        Ok(quotes)
    }

    /// Whether this source can price the pair
    fn supports_pair(&self, token_in: &str, token_out: &str) -> bool;

    /// Liquidity available for the pair (zero when unsupported)
    async fn get_liquidity(&self, token_in: &str, token_out: &str) -> anyhow::Result<Decimal>;
}
