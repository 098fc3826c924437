//! Configuration types for dex-exec

use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::execution::RetryPolicy;
use crate::order::MAX_SLIPPAGE_BPS;
use crate::quote::{ImpactThresholds, RoutingPriority, ScoreWeights, SimulatedSourceConfig};
use crate::telemetry::LogFormat;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default = "default_sources")]
    pub sources: Vec<SimulatedSourceConfig>,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Job queue and processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Ceiling on simultaneously processing jobs
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Whole-job retries after the first failure before a job is failed for good
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before the first retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Growth factor applied to the backoff on each further retry
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: f64,

    /// Upper bound on one execution attempt
    #[serde(default = "default_job_timeout_ms")]
    pub job_timeout_ms: u64,

    /// Failure percentage at which the circuit breaker opens (0-100)
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: f64,

    /// Consecutive terminal failures required before the threshold is checked
    #[serde(default = "default_circuit_breaker_min_failures")]
    pub circuit_breaker_min_failures: u32,

    /// How often the processor looks for free slots
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How often retry-pending jobs are checked for re-admission
    #[serde(default = "default_retry_sweep_interval_ms")]
    pub retry_sweep_interval_ms: u64,

    /// Finished jobs kept queryable; the oldest are evicted beyond this
    #[serde(default = "default_max_retained_jobs")]
    pub max_retained_jobs: usize,
}

fn default_max_concurrent_jobs() -> usize {
    5
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_retry_backoff_multiplier() -> f64 {
    2.0
}
fn default_job_timeout_ms() -> u64 {
    30_000
}
fn default_circuit_breaker_threshold() -> f64 {
    50.0
}
fn default_circuit_breaker_min_failures() -> u32 {
    3
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_retry_sweep_interval_ms() -> u64 {
    1000
}
fn default_max_retained_jobs() -> usize {
    10_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            retry_backoff_multiplier: default_retry_backoff_multiplier(),
            job_timeout_ms: default_job_timeout_ms(),
            circuit_breaker_threshold: default_circuit_breaker_threshold(),
            circuit_breaker_min_failures: default_circuit_breaker_min_failures(),
            poll_interval_ms: default_poll_interval_ms(),
            retry_sweep_interval_ms: default_retry_sweep_interval_ms(),
            max_retained_jobs: default_max_retained_jobs(),
        }
    }
}

impl QueueConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn retry_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.retry_sweep_interval_ms.max(1))
    }
}

/// Execution engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Deadline for one routing call
    #[serde(default = "default_routing_timeout_ms")]
    pub routing_timeout_ms: u64,

    /// Deadline for building the transaction
    #[serde(default = "default_building_timeout_ms")]
    pub building_timeout_ms: u64,

    /// Scale applied to gas limit and priority fee
    #[serde(default = "default_gas_multiplier")]
    pub gas_multiplier: f64,

    /// Slippage applied to orders that do not specify one
    #[serde(default = "default_slippage_tolerance_bps")]
    pub slippage_tolerance_bps: u32,

    /// Quote selection policy
    #[serde(default)]
    pub routing_priority: RoutingPriority,

    /// Fail routing when the chosen quote has critical price impact
    #[serde(default = "default_true")]
    pub reject_critical_impact: bool,

    /// Gas limit before scaling
    #[serde(default = "default_base_gas_limit")]
    pub base_gas_limit: u64,

    /// Priority fee before scaling
    #[serde(default = "default_base_priority_fee")]
    pub base_priority_fee: u64,

    /// Simulated signer address
    #[serde(default = "default_wallet_address")]
    pub wallet_address: String,

    /// Simulated build latency
    #[serde(default = "default_build_delay_ms")]
    pub build_delay_ms: u64,

    /// Simulated submission latency
    #[serde(default = "default_submit_delay_ms")]
    pub submit_delay_ms: u64,

    /// Simulated confirmation latency
    #[serde(default = "default_confirm_delay_ms")]
    pub confirm_delay_ms: u64,

    /// Probability that simulated submission fails with an RPC error
    #[serde(default)]
    pub submit_failure_rate: f64,

    /// In-step retry policy for routing
    #[serde(default)]
    pub routing_retry: RetryPolicy,

    /// Weights used when scoring re-selects among quotes
    #[serde(default)]
    pub scoring_weights: ScoreWeights,

    /// Finished executions kept queryable; the oldest are evicted beyond this
    #[serde(default = "default_max_retained_executions")]
    pub max_retained_executions: usize,
}

fn default_routing_timeout_ms() -> u64 {
    5000
}
fn default_building_timeout_ms() -> u64 {
    3000
}
fn default_gas_multiplier() -> f64 {
    1.2
}
fn default_slippage_tolerance_bps() -> u32 {
    50
}
fn default_true() -> bool {
    true
}
fn default_base_gas_limit() -> u64 {
    200_000
}
fn default_base_priority_fee() -> u64 {
    5000
}
fn default_wallet_address() -> String {
    "SimWa11et1111111111111111111111111111111111".to_string()
}
fn default_build_delay_ms() -> u64 {
    50
}
fn default_submit_delay_ms() -> u64 {
    100
}
fn default_confirm_delay_ms() -> u64 {
    200
}
fn default_max_retained_executions() -> usize {
    10_000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            routing_timeout_ms: default_routing_timeout_ms(),
            building_timeout_ms: default_building_timeout_ms(),
            gas_multiplier: default_gas_multiplier(),
            slippage_tolerance_bps: default_slippage_tolerance_bps(),
            routing_priority: RoutingPriority::default(),
            reject_critical_impact: true,
            base_gas_limit: default_base_gas_limit(),
            base_priority_fee: default_base_priority_fee(),
            wallet_address: default_wallet_address(),
            build_delay_ms: default_build_delay_ms(),
            submit_delay_ms: default_submit_delay_ms(),
            confirm_delay_ms: default_confirm_delay_ms(),
            submit_failure_rate: 0.0,
            routing_retry: RetryPolicy::default(),
            scoring_weights: ScoreWeights::default(),
            max_retained_executions: default_max_retained_executions(),
        }
    }
}

impl ExecutionConfig {
    pub fn routing_timeout(&self) -> Duration {
        Duration::from_millis(self.routing_timeout_ms)
    }

    pub fn building_timeout(&self) -> Duration {
        Duration::from_millis(self.building_timeout_ms)
    }
}

/// Quote router configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub impact_thresholds: ImpactThresholds,
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Events buffered per subscriber
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Port for the Prometheus exporter; disabled when absent
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

fn default_sources() -> Vec<SimulatedSourceConfig> {
    let mut raydium = SimulatedSourceConfig::new("raydium")
        .with_pair("SOL", "USDC", dec!(150))
        .with_pair("SOL", "USDT", dec!(149.9));
    raydium.fee_bps = 25;
    raydium.liquidity = dec!(1500000);
    raydium.latency_ms = 150;
    raydium.price_variance = 0.01;

    let mut meteora = SimulatedSourceConfig::new("meteora")
        .with_pair("SOL", "USDC", dec!(150.2))
        .with_pair("SOL", "USDT", dec!(150));
    meteora.fee_bps = 20;
    meteora.liquidity = dec!(800000);
    meteora.latency_ms = 200;
    meteora.price_variance = 0.015;

    vec![raydium, meteora]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            execution: ExecutionConfig::default(),
            router: RouterConfig::default(),
            sources: default_sources(),
            events: EventsConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_concurrent_jobs must be greater than zero")]
    ZeroConcurrency,
    #[error("retry_backoff_ms must be greater than zero")]
    ZeroBackoff,
    #[error("retry_backoff_multiplier must be at least 1.0, got {0}")]
    BackoffMultiplier(f64),
    #[error("circuit_breaker_threshold must be within 0-100, got {0}")]
    BreakerThreshold(f64),
    #[error("gas_multiplier must be positive, got {0}")]
    GasMultiplier(f64),
    #[error("slippage_tolerance_bps must not exceed 10000, got {0}")]
    SlippageTolerance(u32),
    #[error("at least one quote source must be configured")]
    NoSources,
    #[error("{0} must be greater than zero")]
    ZeroRetention(&'static str),
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let q = &self.queue;
        if q.max_concurrent_jobs == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if q.retry_backoff_ms == 0 {
            return Err(ConfigError::ZeroBackoff);
        }
        if q.retry_backoff_multiplier.is_nan() || q.retry_backoff_multiplier < 1.0 {
            return Err(ConfigError::BackoffMultiplier(q.retry_backoff_multiplier));
        }
        if !(0.0..=100.0).contains(&q.circuit_breaker_threshold) {
            return Err(ConfigError::BreakerThreshold(q.circuit_breaker_threshold));
        }
        if q.max_retained_jobs == 0 {
            return Err(ConfigError::ZeroRetention("max_retained_jobs"));
        }

        let e = &self.execution;
        if e.gas_multiplier.is_nan() || e.gas_multiplier <= 0.0 {
            return Err(ConfigError::GasMultiplier(e.gas_multiplier));
        }
        if e.slippage_tolerance_bps > MAX_SLIPPAGE_BPS {
            return Err(ConfigError::SlippageTolerance(e.slippage_tolerance_bps));
        }
        if e.max_retained_executions == 0 {
            return Err(ConfigError::ZeroRetention("max_retained_executions"));
        }

        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_deserialize() {
        let toml = r#"
            [queue]
            max_concurrent_jobs = 10
            max_retries = 5
            retry_backoff_ms = 500
            retry_backoff_multiplier = 1.5
            circuit_breaker_threshold = 75.0

            [execution]
            routing_timeout_ms = 2000
            gas_multiplier = 1.5
            routing_priority = "lowest_impact"

            [execution.routing_retry]
            max_attempts = 4

            [router.impact_thresholds]
            low = 1.0

            [[sources]]
            name = "orca"
            fee_bps = 30
            [[sources.pairs]]
            token_in = "SOL"
            token_out = "USDC"
            rate = 151.0

            [telemetry]
            log_level = "debug"
            log_format = "json"
            metrics_port = 9100
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.queue.max_concurrent_jobs, 10);
        assert_eq!(config.queue.max_retries, 5);
        assert_eq!(config.queue.job_timeout_ms, 30_000);
        assert_eq!(
            config.execution.routing_priority,
            RoutingPriority::LowestImpact
        );
        assert_eq!(config.execution.routing_retry.max_attempts, 4);
        assert_eq!(config.router.impact_thresholds.low, dec!(1));
        assert_eq!(config.router.impact_thresholds.critical, dec!(10));
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].name, "orca");
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
        assert_eq!(config.telemetry.metrics_port, Some(9100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.queue.max_concurrent_jobs, 5);
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.execution.slippage_tolerance_bps, 50);
        assert_eq!(config.sources.len(), 2);
        assert!(config.telemetry.metrics_port.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(include_str!("../config.toml.example")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[1].failure_rate, 0.05);
        assert_eq!(config.execution.scoring_weights, ScoreWeights::default());
        assert_eq!(config.queue.max_retained_jobs, 10_000);
        assert_eq!(config.execution.max_retained_executions, 10_000);
    }

    #[test]
    fn test_effective_config_renders_as_toml() {
        let rendered = toml::to_string_pretty(&Config::default()).unwrap();
        let reparsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(reparsed.queue.max_retries, 3);
        assert_eq!(reparsed.sources[0].name, "raydium");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.queue.max_concurrent_jobs = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroConcurrency));

        let mut config = Config::default();
        config.queue.retry_backoff_multiplier = 0.5;
        assert_eq!(config.validate(), Err(ConfigError::BackoffMultiplier(0.5)));

        let mut config = Config::default();
        config.queue.circuit_breaker_threshold = 101.0;
        assert_eq!(config.validate(), Err(ConfigError::BreakerThreshold(101.0)));

        let mut config = Config::default();
        config.execution.gas_multiplier = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::GasMultiplier(0.0)));

        let mut config = Config::default();
        config.execution.slippage_tolerance_bps = 10_001;
        assert_eq!(config.validate(), Err(ConfigError::SlippageTolerance(10_001)));

        let mut config = Config::default();
        config.sources.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoSources));

        let mut config = Config::default();
        config.queue.max_retained_jobs = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroRetention("max_retained_jobs"))
        );
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[queue]\nmax_concurrent_jobs = 2").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.queue.max_concurrent_jobs, 2);
    }

    #[test]
    fn test_config_load_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[queue]\nmax_concurrent_jobs = 0").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_duration_helpers() {
        let config = QueueConfig::default();
        assert_eq!(config.job_timeout(), Duration::from_secs(30));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));

        let exec = ExecutionConfig::default();
        assert_eq!(exec.routing_timeout(), Duration::from_secs(5));
        assert_eq!(exec.building_timeout(), Duration::from_secs(3));
    }
}
