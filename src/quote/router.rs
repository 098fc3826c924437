//! Quote router
//!
//! Fans a quote request out to every registered source at once, drops the
//! sources that fail or decline, and picks one quote per routing priority.

use super::scoring::{classify_impact, ImpactThresholds};
use super::{DexQuote, QuoteOrigin, QuoteSource, RouteResult, RoutingPriority};
use crate::telemetry::{self, CounterMetric, LatencyMetric};
use chrono::Utc;
use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;

/// Routes orders across interchangeable quote sources
pub struct QuoteRouter {
    sources: Vec<Arc<dyn QuoteSource>>,
    thresholds: ImpactThresholds,
}

impl QuoteRouter {
    /// Create a router with no sources and default impact thresholds
    pub fn new() -> Self {
        Self {
            sources: vec![],
            thresholds: ImpactThresholds::default(),
        }
    }

    /// Create a router over the given sources
    pub fn with_sources(sources: Vec<Arc<dyn QuoteSource>>) -> Self {
        Self {
            sources,
            thresholds: ImpactThresholds::default(),
        }
    }

    /// Override the impact thresholds
    pub fn with_thresholds(mut self, thresholds: ImpactThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Register another source
    pub fn register(&mut self, source: Arc<dyn QuoteSource>) {
        tracing::info!(source = source.name(), "Registered quote source");
        self.sources.push(source);
    }

    /// Names of all registered sources, in registration order
    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Impact thresholds in use
    pub fn thresholds(&self) -> &ImpactThresholds {
        &self.thresholds
    }

    /// Query every source and select one quote
    ///
    /// Each source runs on its own task, so a source that panics or errors
    /// only removes its own quote. Expired quotes are discarded before
    /// selection. A critical price impact is flagged on the result, not
    /// rejected here.
    pub async fn route_order(
        &self,
        token_in: &str,
        token_out: &str,
        amount: Decimal,
        slippage_percent: Decimal,
        priority: RoutingPriority,
    ) -> RouteResult {
        let started = Instant::now();

        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                let token_in = token_in.to_string();
                let token_out = token_out.to_string();
                tokio::spawn(async move {
                    let name = source.name().to_string();
                    let result = source
                        .get_quote(&token_in, &token_out, amount, slippage_percent)
                        .await;
                    (name, result)
                })
            })
            .collect();

        let now = Utc::now();
        let mut quotes = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            match joined {
                Ok((_, Ok(Some(quote)))) if quote.is_fresh_at(now) => quotes.push(quote),
                Ok((name, Ok(Some(_)))) => {
                    tracing::debug!(source = %name, "Discarding expired quote");
                }
                Ok((name, Ok(None))) => {
                    tracing::debug!(source = %name, "Source declined to quote");
                }
                Ok((name, Err(e))) => {
                    telemetry::increment(CounterMetric::QuoteSourceFailures);
                    tracing::warn!(source = %name, error = %e, "Quote source failed");
                }
                Err(e) => {
                    telemetry::increment(CounterMetric::QuoteSourceFailures);
                    tracing::warn!(error = %e, "Quote source task aborted");
                }
            }
        }

        telemetry::record_latency(LatencyMetric::Routing, started.elapsed());

        if quotes.is_empty() {
            tracing::warn!(
                pair = %format!("{}/{}", token_in, token_out),
                amount = %amount,
                sources = self.sources.len(),
                "No quotes available, returning fallback"
            );
            return RouteResult::fallback();
        }

        let best = select_by_priority(&quotes, priority).cloned();
        let impact = best
            .as_ref()
            .map(|q| classify_impact(q.price_impact, &self.thresholds));

        if let (Some(q), Some(assessment)) = (&best, &impact) {
            if !assessment.is_valid {
                tracing::warn!(
                    source = %q.source,
                    price_impact = %q.price_impact,
                    "Selected quote has critical price impact"
                );
            } else if q.price_impact >= self.thresholds.low {
                tracing::info!(
                    source = %q.source,
                    price_impact = %q.price_impact,
                    level = ?assessment.level,
                    "Selected quote has elevated price impact"
                );
            }
            tracing::debug!(
                source = %q.source,
                amount_out = %q.amount_out,
                quotes = quotes.len(),
                ?priority,
                "Routed order"
            );
        }

        RouteResult {
            best_quote: best,
            all_quotes: quotes,
            source: QuoteOrigin::Live,
            impact,
        }
    }

    /// Quote from one named source, for diagnostics
    ///
    /// Unknown sources and source errors both yield `None`.
    pub async fn get_quote_from_dex(
        &self,
        source_name: &str,
        token_in: &str,
        token_out: &str,
        amount: Decimal,
        slippage_percent: Decimal,
    ) -> Option<DexQuote> {
        let source = self.sources.iter().find(|s| s.name() == source_name)?;
        match source
            .get_quote(token_in, token_out, amount, slippage_percent)
            .await
        {
            Ok(quote) => quote,
            Err(e) => {
                tracing::warn!(source = source_name, error = %e, "Quote source failed");
                None
            }
        }
    }
}

impl Default for QuoteRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick one quote according to the routing priority
///
/// Ties keep the earliest quote.
fn select_by_priority(quotes: &[DexQuote], priority: RoutingPriority) -> Option<&DexQuote> {
    match priority {
        RoutingPriority::BestPrice | RoutingPriority::Fastest => {
            pick_by(quotes, |q, best| q.amount_out > best.amount_out)
        }
        RoutingPriority::LowestImpact => {
            pick_by(quotes, |q, best| q.price_impact < best.price_impact)
        }
        RoutingPriority::MostLiquid => pick_by(quotes, |q, best| q.liquidity > best.liquidity),
    }
}

fn pick_by<'a>(
    quotes: &'a [DexQuote],
    better: impl Fn(&DexQuote, &DexQuote) -> bool,
) -> Option<&'a DexQuote> {
    let mut best: Option<&DexQuote> = None;
    for q in quotes {
        match best {
            Some(b) if !better(q, b) => {}
            _ => best = Some(q),
        }
    }
    best
}
