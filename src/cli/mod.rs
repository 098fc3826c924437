//! CLI interface for dex-exec
//!
//! Provides subcommands for:
//! - `run`: Submit simulated orders and drive them through the queue
//! - `quote`: Compare quotes from every configured source
//! - `config`: Show the effective configuration

mod quote;
mod run;

pub use quote::QuoteArgs;
pub use run::RunArgs;

use crate::config::Config;
use crate::quote::{QuoteRouter, QuoteSource, SimulatedSource};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "dex-exec")]
#[command(about = "Asynchronous order execution with multi-source DEX quote routing")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit simulated orders and process them
    Run(RunArgs),
    /// Query every source for a pair and rank the quotes
    Quote(QuoteArgs),
    /// Show the effective configuration
    Config,
}

/// Build a router over the configured simulated sources
pub fn router_from_config(config: &Config) -> QuoteRouter {
    let sources: Vec<Arc<dyn QuoteSource>> = config
        .sources
        .iter()
        .cloned()
        .map(|source| Arc::new(SimulatedSource::new(source)) as Arc<dyn QuoteSource>)
        .collect();
    QuoteRouter::with_sources(sources).with_thresholds(config.router.impact_thresholds.clone())
}
