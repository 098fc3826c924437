//! Execution engine module
//!
//! Runs a single order through routing, transaction build, submission and
//! confirmation, retrying transient step failures in place.

mod engine;
mod retry;
mod types;

pub use engine::{validate_order, ExecutionEngine};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use types::{
    ExecutionContext, ExecutionEvent, ExecutionEventType, ExecutionId, ExecutionState,
    ExecutionStats, SimulatedTransaction, StateTransition,
};

use crate::error::ExecutionError;
use crate::order::Order;
use async_trait::async_trait;

/// Anything that can carry out one execution attempt for an order
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// Execute `order`, returning the terminal context on success
    async fn execute(&self, order: &Order) -> Result<ExecutionContext, ExecutionError>;
}
