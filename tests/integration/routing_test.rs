//! Quote router integration tests

use crate::common::{BrokenSource, StubSource};
use dex_exec::quote::scoring::{minimum_output, rank_quotes};
use dex_exec::quote::{ImpactLevel, QuoteOrigin, QuoteRouter, QuoteSource, RoutingPriority, ScoreWeights};
use rust_decimal_macros::dec;
use std::sync::Arc;

#[tokio::test]
async fn test_best_price_picks_highest_output() {
    let router = QuoteRouter::with_sources(vec![
        StubSource::quoting("alpha", dec!(1010)),
        StubSource::quoting("beta", dec!(1050)),
    ]);

    let route = router
        .route_order("SOL", "USDC", dec!(7), dec!(0.5), RoutingPriority::BestPrice)
        .await;

    assert_eq!(route.source, QuoteOrigin::Live);
    assert_eq!(route.all_quotes.len(), 2);
    let best = route.best_quote.unwrap();
    assert_eq!(best.amount_out, dec!(1050));
    assert_eq!(best.source, "beta");
    assert_eq!(route.impact.unwrap().level, ImpactLevel::Low);
}

#[tokio::test]
async fn test_fastest_matches_best_price() {
    let router = QuoteRouter::with_sources(vec![
        StubSource::quoting("alpha", dec!(1010)),
        StubSource::quoting("beta", dec!(1050)),
    ]);

    let route = router
        .route_order("SOL", "USDC", dec!(7), dec!(0.5), RoutingPriority::Fastest)
        .await;
    assert_eq!(route.best_quote.unwrap().source, "beta");
}

#[tokio::test]
async fn test_all_silent_sources_fall_back() {
    let a = StubSource::silent("a");
    let b = StubSource::silent("b");
    let router = QuoteRouter::with_sources(vec![a.clone(), b.clone()]);

    let route = router
        .route_order("SOL", "USDC", dec!(1), dec!(0.5), RoutingPriority::BestPrice)
        .await;

    assert_eq!(route.source, QuoteOrigin::Fallback);
    assert!(route.best_quote.is_none());
    assert!(route.all_quotes.is_empty());
    assert_eq!(a.calls() + b.calls(), 2);
}

#[tokio::test]
async fn test_broken_source_does_not_fail_routing() {
    let sources: Vec<Arc<dyn QuoteSource>> = vec![
        Arc::new(BrokenSource),
        StubSource::quoting("alpha", dec!(990)),
    ];
    let router = QuoteRouter::with_sources(sources);

    let route = router
        .route_order("SOL", "USDC", dec!(7), dec!(0.5), RoutingPriority::BestPrice)
        .await;
    assert_eq!(route.all_quotes.len(), 1);
    assert_eq!(route.best_quote.unwrap().source, "alpha");
}

#[tokio::test]
async fn test_ranking_matches_router_pick_for_equal_depth() {
    let router = QuoteRouter::with_sources(vec![
        StubSource::quoting("alpha", dec!(1010)),
        StubSource::quoting("beta", dec!(1050)),
        StubSource::quoting("gamma", dec!(1030)),
    ]);
    let route = router
        .route_order("SOL", "USDC", dec!(7), dec!(0.5), RoutingPriority::BestPrice)
        .await;

    let ranked = rank_quotes(&route.all_quotes, &ScoreWeights::default());
    let order: Vec<&str> = ranked.iter().map(|s| s.quote.source.as_str()).collect();
    assert_eq!(order, vec!["beta", "gamma", "alpha"]);
    assert_eq!(ranked[0].quote, route.best_quote.unwrap());
}

#[test]
fn test_minimum_output_bounds() {
    assert_eq!(minimum_output(dec!(500), dec!(0)), dec!(500));
    assert_eq!(minimum_output(dec!(500), dec!(50)), dec!(250));
}
