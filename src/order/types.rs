//! Order types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Basis points in one whole (100%)
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Largest slippage tolerance an order may carry
pub const MAX_SLIPPAGE_BPS: u32 = BPS_DENOMINATOR;

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Swap immediately at the best available quote
    #[default]
    Market,
    /// Swap only at or better than a target price
    Limit,
    /// Swap as soon as a newly listed pair becomes routable
    Sniper,
}

/// A swap order submitted for execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Caller-assigned order identifier
    pub id: String,
    /// Token being sold
    pub token_in: String,
    /// Token being bought
    pub token_out: String,
    /// Amount of `token_in` to sell
    pub amount: Decimal,
    /// Slippage tolerance in basis points
    pub slippage_bps: u32,
    /// Order type
    pub order_type: OrderType,
    /// Number of execution attempts so far
    pub attempts: u32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a market order with an explicit id
    pub fn new(
        id: impl Into<String>,
        token_in: impl Into<String>,
        token_out: impl Into<String>,
        amount: Decimal,
        slippage_bps: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            token_in: token_in.into(),
            token_out: token_out.into(),
            amount,
            slippage_bps,
            order_type: OrderType::Market,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a market order with a generated id
    pub fn market(
        token_in: impl Into<String>,
        token_out: impl Into<String>,
        amount: Decimal,
        slippage_bps: u32,
    ) -> Self {
        Self::new(
            Uuid::new_v4().to_string(),
            token_in,
            token_out,
            amount,
            slippage_bps,
        )
    }

    /// Set the order type
    pub fn with_type(mut self, order_type: OrderType) -> Self {
        self.order_type = order_type;
        self
    }

    /// Slippage tolerance as a percentage (50 bps = 0.5)
    pub fn slippage_percent(&self) -> Decimal {
        Decimal::from(self.slippage_bps) / Decimal::from(100)
    }

    /// Pair label, e.g. `USDC/SOL`
    pub fn pair(&self) -> String {
        format!("{}/{}", self.token_in, self.token_out)
    }
}
