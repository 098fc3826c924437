//! Execution error taxonomy
//!
//! Every failure an order can hit while it moves through the pipeline maps to
//! one [`ExecutionError`] variant. The variant decides whether the failure is
//! retried inside a step, retried by the job queue, or terminal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating, routing, building or submitting an order
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ExecutionError {
    /// Order failed structural validation
    #[error("Validation failed: {0}")]
    Validation(String),
    /// Token identifier missing or unusable
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    /// Amount is zero, negative or otherwise unusable
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    /// Slippage tolerance out of range
    #[error("Invalid slippage: {0}")]
    InvalidSlippage(String),
    /// Quote source returned nothing usable
    #[error("DEX API error: {0}")]
    DexApi(String),
    /// Transport failure or timeout
    #[error("Network error: {0}")]
    Network(String),
    /// Simulated RPC node failure
    #[error("RPC error: {0}")]
    Rpc(String),
    /// Not enough depth to fill at an acceptable impact
    #[error("Insufficient liquidity: {0}")]
    InsufficientLiquidity(String),
    /// Expected output fell below the slippage floor
    #[error("Slippage exceeded: {0}")]
    Slippage(String),
    /// Transaction was rejected on submission
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
    /// Wallet cannot cover the trade
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    /// In-step retry helper gave up
    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
    /// Anything not classified above
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ExecutionError {
    /// Stable machine-readable code for this error
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::Validation(_) => "VALIDATION_ERROR",
            ExecutionError::InvalidToken(_) => "INVALID_TOKEN",
            ExecutionError::InvalidAmount(_) => "INVALID_AMOUNT",
            ExecutionError::InvalidSlippage(_) => "INVALID_SLIPPAGE",
            ExecutionError::DexApi(_) => "DEX_API_ERROR",
            ExecutionError::Network(_) => "NETWORK_ERROR",
            ExecutionError::Rpc(_) => "RPC_ERROR",
            ExecutionError::InsufficientLiquidity(_) => "INSUFFICIENT_LIQUIDITY",
            ExecutionError::Slippage(_) => "SLIPPAGE_EXCEEDED",
            ExecutionError::TransactionFailed(_) => "TRANSACTION_FAILED",
            ExecutionError::InsufficientFunds(_) => "INSUFFICIENT_FUNDS",
            ExecutionError::MaxRetriesExceeded { .. } => "MAX_RETRIES_EXCEEDED",
            ExecutionError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Whether the in-step retry helper should try again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExecutionError::DexApi(_)
                | ExecutionError::Network(_)
                | ExecutionError::Rpc(_)
                | ExecutionError::InsufficientLiquidity(_)
                | ExecutionError::Slippage(_)
        )
    }

    /// Whether the job queue should schedule another whole-job attempt
    ///
    /// Exhausted routing retries get a second chance at the queue level; the
    /// in-step helper never sees them again.
    pub fn is_queue_retryable(&self) -> bool {
        self.is_retryable() || matches!(self, ExecutionError::MaxRetriesExceeded { .. })
    }

    /// True for errors caused by the order itself rather than the environment
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ExecutionError::Validation(_)
                | ExecutionError::InvalidToken(_)
                | ExecutionError::InvalidAmount(_)
                | ExecutionError::InvalidSlippage(_)
        )
    }
}
