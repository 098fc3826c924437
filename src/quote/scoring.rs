//! Quote scoring
//!
//! Pure functions over [`DexQuote`] values: pricing, slippage floors, impact
//! classification, weighted ranking and quality grading.

use super::types::{
    DexQuote, ImpactLevel, PriceImpactAssessment, QualityAssessment, QuoteQuality,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Liquidity at which the liquidity component of the score saturates
const LIQUIDITY_SATURATION: Decimal = dec!(1000000);

/// Price impact tier boundaries, in percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactThresholds {
    /// Below this the impact is low
    #[serde(default = "default_low")]
    pub low: Decimal,
    /// Below this the impact is medium
    #[serde(default = "default_medium")]
    pub medium: Decimal,
    /// At or above this the impact is critical and the quote invalid
    #[serde(default = "default_critical")]
    pub critical: Decimal,
}

fn default_low() -> Decimal {
    dec!(2)
}
fn default_medium() -> Decimal {
    dec!(5)
}
fn default_critical() -> Decimal {
    dec!(10)
}

impl Default for ImpactThresholds {
    fn default() -> Self {
        Self {
            low: default_low(),
            medium: default_medium(),
            critical: default_critical(),
        }
    }
}

/// Weights applied to each component of [`score`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(default = "default_price_weight")]
    pub price: Decimal,
    #[serde(default = "default_impact_weight")]
    pub impact: Decimal,
    #[serde(default = "default_liquidity_weight")]
    pub liquidity: Decimal,
}

fn default_price_weight() -> Decimal {
    dec!(0.5)
}
fn default_impact_weight() -> Decimal {
    dec!(0.3)
}
fn default_liquidity_weight() -> Decimal {
    dec!(0.2)
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            price: default_price_weight(),
            impact: default_impact_weight(),
            liquidity: default_liquidity_weight(),
        }
    }
}

/// A quote paired with its weighted score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredQuote {
    pub quote: DexQuote,
    pub score: Decimal,
}

/// Output per unit of input; zero when nothing goes in
pub fn execution_price(quote: &DexQuote) -> Decimal {
    if quote.amount_in.is_zero() {
        return Decimal::ZERO;
    }
    quote.amount_out / quote.amount_in
}

/// Smallest acceptable output given a slippage tolerance in percent
pub fn minimum_output(expected: Decimal, slippage_percent: Decimal) -> Decimal {
    expected * (Decimal::ONE - slippage_percent / dec!(100))
}

/// Classify impact against the default tiers
pub fn price_impact_level(impact: Decimal) -> PriceImpactAssessment {
    classify_impact(impact, &ImpactThresholds::default())
}

/// Classify impact against custom tiers
pub fn classify_impact(impact: Decimal, thresholds: &ImpactThresholds) -> PriceImpactAssessment {
    let level = if impact < thresholds.low {
        ImpactLevel::Low
    } else if impact < thresholds.medium {
        ImpactLevel::Medium
    } else if impact < thresholds.critical {
        ImpactLevel::High
    } else {
        ImpactLevel::Critical
    };

    PriceImpactAssessment {
        impact,
        level,
        is_valid: level != ImpactLevel::Critical,
    }
}

/// Fee expressed as a percentage of the trade
pub fn fee_impact_percent(fee_bps: u32) -> Decimal {
    Decimal::from(fee_bps) / dec!(100)
}

/// Weighted quality score; higher is better
pub fn score(quote: &DexQuote, weights: &ScoreWeights) -> Decimal {
    let liquidity_ratio = (quote.liquidity / LIQUIDITY_SATURATION).min(Decimal::ONE);

    quote.amount_out * weights.price
        + (dec!(100) - quote.price_impact) * weights.impact
        + liquidity_ratio * dec!(100) * weights.liquidity
}

/// Score every quote and sort descending
///
/// Ties keep their input order.
pub fn rank_quotes(quotes: &[DexQuote], weights: &ScoreWeights) -> Vec<ScoredQuote> {
    let mut scored: Vec<ScoredQuote> = quotes
        .iter()
        .map(|q| ScoredQuote {
            score: score(q, weights),
            quote: q.clone(),
        })
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored
}

/// Highest-scoring quote that is still fresh at `now`
pub fn select_best_at(
    quotes: &[DexQuote],
    weights: &ScoreWeights,
    now: DateTime<Utc>,
) -> Option<DexQuote> {
    let fresh: Vec<DexQuote> = quotes
        .iter()
        .filter(|q| q.is_fresh_at(now))
        .cloned()
        .collect();

    rank_quotes(&fresh, weights)
        .into_iter()
        .next()
        .map(|s| s.quote)
}

/// Highest-scoring quote that is still fresh
pub fn select_best(quotes: &[DexQuote], weights: &ScoreWeights) -> Option<DexQuote> {
    select_best_at(quotes, weights, Utc::now())
}

/// Grade a quote by impact, liquidity and fee tiers
pub fn quality_assessment(quote: &DexQuote) -> QualityAssessment {
    let impact_points = if quote.price_impact < dec!(0.5) {
        40
    } else if quote.price_impact < dec!(1) {
        35
    } else if quote.price_impact < dec!(2) {
        25
    } else if quote.price_impact < dec!(5) {
        10
    } else {
        0
    };

    let liquidity_points = if quote.liquidity >= dec!(1000000) {
        30
    } else if quote.liquidity >= dec!(500000) {
        20
    } else if quote.liquidity >= dec!(100000) {
        10
    } else {
        0
    };

    let fee_points = match quote.fee_bps {
        0..=10 => 30,
        11..=25 => 25,
        26..=50 => 15,
        _ => 5,
    };

    let points = impact_points + liquidity_points + fee_points;
    let quality = match points {
        90.. => QuoteQuality::Excellent,
        70..=89 => QuoteQuality::Good,
        50..=69 => QuoteQuality::Acceptable,
        _ => QuoteQuality::Poor,
    };

    QualityAssessment { points, quality }
}

/// Whether the quote has not yet expired
pub fn is_fresh(quote: &DexQuote) -> bool {
    quote.is_fresh_at(Utc::now())
}
