//! Quote command implementation

use super::router_from_config;
use crate::config::Config;
use crate::order::BPS_DENOMINATOR;
use crate::quote::scoring::{self, classify_impact};
use crate::quote::RoutingPriority;
use clap::Args;
use rust_decimal::Decimal;

#[derive(Args, Debug)]
pub struct QuoteArgs {
    /// Token to sell
    #[arg(long, default_value = "SOL")]
    pub token_in: String,

    /// Token to buy
    #[arg(long, default_value = "USDC")]
    pub token_out: String,

    /// Amount of `token_in` to sell
    #[arg(short, long, default_value = "1")]
    pub amount: Decimal,

    /// Slippage tolerance in basis points (defaults to the configured value)
    #[arg(long)]
    pub slippage_bps: Option<u32>,

    /// Selection policy used for the router's pick
    #[arg(long, default_value = "best_price")]
    pub priority: RoutingPriority,
}

impl QuoteArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let router = router_from_config(config);
        let bps = self
            .slippage_bps
            .unwrap_or(config.execution.slippage_tolerance_bps);
        let slippage = Decimal::from(bps) * Decimal::from(100) / Decimal::from(BPS_DENOMINATOR);

        let route = router
            .route_order(
                &self.token_in,
                &self.token_out,
                self.amount,
                slippage,
                self.priority,
            )
            .await;

        if route.all_quotes.is_empty() {
            println!(
                "No quotes for {} {} -> {} from {:?}",
                self.amount,
                self.token_in,
                self.token_out,
                router.source_names()
            );
            return Ok(());
        }

        println!(
            "Quotes for {} {} -> {} (slippage {}%)",
            self.amount, self.token_in, self.token_out, slippage
        );
        println!(
            "{:<4} {:<12} {:>16} {:>16} {:>10} {:>9} {:>10} {:<10}",
            "#", "source", "amount_out", "min_out", "impact%", "level", "score", "quality"
        );

        let ranked = scoring::rank_quotes(&route.all_quotes, &config.execution.scoring_weights);
        for (i, scored) in ranked.iter().enumerate() {
            let q = &scored.quote;
            let impact = classify_impact(q.price_impact, router.thresholds());
            let quality = scoring::quality_assessment(q);
            println!(
                "{:<4} {:<12} {:>16} {:>16} {:>10} {:>9} {:>10} {:<10}",
                i + 1,
                q.source,
                q.amount_out.round_dp(6),
                scoring::minimum_output(q.amount_out, slippage).round_dp(6),
                q.price_impact.round_dp(4),
                format!("{:?}", impact.level),
                scored.score.round_dp(2),
                format!("{:?}", quality.quality),
            );
        }

        if let Some(best) = &route.best_quote {
            println!("Router pick ({:?}): {}", self.priority, best.source);
        }
        Ok(())
    }
}
