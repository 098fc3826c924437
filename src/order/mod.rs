//! Order module
//!
//! The immutable trade intent submitted by callers

mod types;

pub use types::{Order, OrderType, BPS_DENOMINATOR, MAX_SLIPPAGE_BPS};
