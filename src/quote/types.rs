//! Quote types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A priced, time-bound offer from one liquidity source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DexQuote {
    /// Name of the source that produced the quote
    pub source: String,
    /// Token being sold
    pub token_in: String,
    /// Token being bought
    pub token_out: String,
    /// Input amount
    pub amount_in: Decimal,
    /// Expected output amount after fees and impact
    pub amount_out: Decimal,
    /// Effective price (out per in)
    pub price: Decimal,
    /// Price impact in percent
    pub price_impact: Decimal,
    /// Pool fee in basis points
    pub fee_bps: u32,
    /// Fee charged, in `token_in` units
    pub fee_amount: Decimal,
    /// Pool liquidity backing the quote
    pub liquidity: Decimal,
    /// When the quote was produced
    pub quoted_at: DateTime<Utc>,
    /// When the quote stops being usable
    pub expires_at: DateTime<Utc>,
}

impl DexQuote {
    /// Whether the quote is still usable at `now`
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Policy used to pick one quote among several
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPriority {
    /// Maximize output amount
    #[default]
    BestPrice,
    /// Minimize price impact
    LowestImpact,
    /// Prefer the deepest pool
    MostLiquid,
    /// Same selection as `BestPrice`
    Fastest,
}

impl std::str::FromStr for RoutingPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "best_price" => Ok(RoutingPriority::BestPrice),
            "lowest_impact" => Ok(RoutingPriority::LowestImpact),
            "most_liquid" => Ok(RoutingPriority::MostLiquid),
            "fastest" => Ok(RoutingPriority::Fastest),
            other => Err(format!("unknown routing priority: {other}")),
        }
    }
}

/// Where a routing result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuoteOrigin {
    /// At least one source answered
    Live,
    /// No source produced a usable quote
    Fallback,
}

/// Price impact severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Classified price impact of a quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceImpactAssessment {
    /// Raw impact in percent
    pub impact: Decimal,
    /// Severity tier
    pub level: ImpactLevel,
    /// False once impact reaches the critical tier
    pub is_valid: bool,
}

/// Overall quote quality grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteQuality {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

/// Point-based quality assessment of a quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// Sum of impact, liquidity and fee tier points (0-100)
    pub points: u32,
    /// Grade derived from `points`
    pub quality: QuoteQuality,
}

/// Outcome of fanning a request out to every source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    /// Quote chosen by the routing priority
    pub best_quote: Option<DexQuote>,
    /// Every usable quote that came back
    pub all_quotes: Vec<DexQuote>,
    /// Live or fallback
    pub source: QuoteOrigin,
    /// Impact assessment of `best_quote`
    pub impact: Option<PriceImpactAssessment>,
}

impl RouteResult {
    /// Empty result used when no source answered
    pub fn fallback() -> Self {
        Self {
            best_quote: None,
            all_quotes: vec![],
            source: QuoteOrigin::Fallback,
            impact: None,
        }
    }
}
