//! Execution types

use crate::order::Order;
use crate::quote::DexQuote;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Execution identifier, one per attempt
pub type ExecutionId = Uuid;

/// State of one execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionState {
    Pending,
    Routing,
    Building,
    Submitted,
    /// Terminal success
    Confirmed,
    /// Terminal failure
    Failed,
}

impl ExecutionState {
    /// Whether no further transitions can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Confirmed | ExecutionState::Failed)
    }
}

/// Simulated swap transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedTransaction {
    /// Signer address
    pub from: String,
    /// Program the swap is routed through
    pub program: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
    /// Slippage floor enforced on-chain
    pub minimum_amount_out: Decimal,
    /// Compute/gas limit after the gas multiplier
    pub gas_limit: u64,
    /// Priority fee after the gas multiplier
    pub priority_fee: u64,
    pub recent_blockhash: String,
    pub built_at: DateTime<Utc>,
}

/// One recorded state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: ExecutionState,
    pub to: ExecutionState,
    pub at: DateTime<Utc>,
}

/// Working state of one execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub order: Order,
    pub state: ExecutionState,
    pub selected_quote: Option<DexQuote>,
    /// Slippage floor derived from the selected quote
    pub minimum_output: Option<Decimal>,
    pub transaction: Option<SimulatedTransaction>,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_transition_at: DateTime<Utc>,
    /// Set once the attempt reaches a terminal state
    pub elapsed_ms: Option<u64>,
    pub transitions: Vec<StateTransition>,
}

impl ExecutionContext {
    /// Fresh context in PENDING for `order`
    pub fn new(order: Order) -> Self {
        let now = Utc::now();
        Self {
            execution_id: Uuid::new_v4(),
            order,
            state: ExecutionState::Pending,
            selected_quote: None,
            minimum_output: None,
            transaction: None,
            tx_hash: None,
            error: None,
            started_at: now,
            last_transition_at: now,
            elapsed_ms: None,
            transitions: vec![],
        }
    }

    pub fn order_id(&self) -> &str {
        &self.order.id
    }

    /// Move to `to`, returning the previous state
    pub fn transition(&mut self, to: ExecutionState) -> ExecutionState {
        let now = Utc::now();
        let from = self.state;
        self.transitions.push(StateTransition { from, to, at: now });
        self.state = to;
        self.last_transition_at = now;
        if to.is_terminal() {
            self.elapsed_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
        }
        from
    }
}

/// Kind of execution lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionEventType {
    Started,
    Validated,
    Routed,
    Built,
    Submitted,
    Confirmed,
    Failed,
}

/// Event emitted on every execution step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    #[serde(rename = "type")]
    pub event_type: ExecutionEventType,
    pub execution_id: ExecutionId,
    pub order_id: String,
    pub state: ExecutionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate statistics across all executions
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionStats {
    pub total_executed: u64,
    pub total_successful: u64,
    pub total_failed: u64,
    /// Running mean over finished executions
    pub average_execution_ms: f64,
    /// How many executions currently sit in each state
    pub state_counts: BTreeMap<ExecutionState, u64>,
}

impl ExecutionStats {
    /// Count of executions currently in `state`
    pub fn count(&self, state: ExecutionState) -> u64 {
        self.state_counts.get(&state).copied().unwrap_or(0)
    }

    /// Percentage of finished executions that confirmed
    pub fn success_rate(&self) -> f64 {
        if self.total_executed == 0 {
            return 0.0;
        }
        self.total_successful as f64 / self.total_executed as f64 * 100.0
    }

    pub(crate) fn enter(&mut self, state: ExecutionState) {
        *self.state_counts.entry(state).or_insert(0) += 1;
    }

    pub(crate) fn move_state(&mut self, from: ExecutionState, to: ExecutionState) {
        if let Some(n) = self.state_counts.get_mut(&from) {
            *n = n.saturating_sub(1);
        }
        self.enter(to);
    }

    pub(crate) fn record_finished(&mut self, success: bool, elapsed_ms: u64) {
        self.total_executed += 1;
        if success {
            self.total_successful += 1;
        } else {
            self.total_failed += 1;
        }
        let n = self.total_executed as f64;
        self.average_execution_ms += (elapsed_ms as f64 - self.average_execution_ms) / n;
    }
}
