//! dex-exec: asynchronous order execution across multiple liquidity sources
//!
//! This library provides the core components for:
//! - Priority job queue with bounded concurrency, retries and a circuit breaker
//! - Job processor driving queued orders through execution
//! - Per-order execution state machine (route, build, submit, confirm)
//! - Concurrent multi-source quote routing and quote scoring
//! - Lifecycle event bus
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod execution;
pub mod order;
pub mod queue;
pub mod quote;
pub mod telemetry;
