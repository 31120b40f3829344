//! Cost model
//!
//! Rate configuration, per-tick cost breakdowns, and per-agent accumulators.
//! All accrued costs are integer cents; intermediate rate computation uses
//! f64 and rounds exactly once per accrual through [`math::bps_cost`] /
//! [`math::rate_cost`].

pub mod math;
pub mod rates;
pub mod schema_docs;

pub use rates::{get_priority_band, CostRates, PriorityBand, PriorityDelayMultipliers};

use serde::{Deserialize, Serialize};

/// Cost breakdown for a single tick or event, per agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Overdraft cost accrued this tick (cents)
    pub overdraft_cost: i64,

    /// Queue 1 delay cost accrued this tick (cents)
    pub delay_cost: i64,

    /// Collateral opportunity cost accrued this tick (cents)
    pub collateral_cost: i64,

    /// One-time penalties incurred this tick (deadline, EOD) (cents)
    pub penalty_cost: i64,

    /// Transaction splitting friction charged this tick (cents)
    ///
    /// A split into N parts charges split_friction_cost × (N-1).
    pub split_friction_cost: i64,
}

impl CostBreakdown {
    /// Total cost across all categories
    pub fn total(&self) -> i64 {
        self.overdraft_cost
            + self.delay_cost
            + self.collateral_cost
            + self.penalty_cost
            + self.split_friction_cost
    }

    /// Merge another breakdown into this one
    pub fn add(&mut self, other: &CostBreakdown) {
        self.overdraft_cost += other.overdraft_cost;
        self.delay_cost += other.delay_cost;
        self.collateral_cost += other.collateral_cost;
        self.penalty_cost += other.penalty_cost;
        self.split_friction_cost += other.split_friction_cost;
    }
}

/// Accumulated costs for an agent over a day (or a whole run)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostAccumulator {
    pub total_overdraft_cost: i64,
    pub total_delay_cost: i64,
    pub total_collateral_cost: i64,
    pub total_penalty_cost: i64,
    pub total_split_friction_cost: i64,

    /// Peak net debit observed (most negative balance)
    pub peak_net_debit: i64,
}

impl CostAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add costs from a tick
    pub fn add(&mut self, costs: &CostBreakdown) {
        self.total_overdraft_cost += costs.overdraft_cost;
        self.total_delay_cost += costs.delay_cost;
        self.total_collateral_cost += costs.collateral_cost;
        self.total_penalty_cost += costs.penalty_cost;
        self.total_split_friction_cost += costs.split_friction_cost;
    }

    /// Update peak net debit if current balance is more negative
    pub fn update_peak_debit(&mut self, current_balance: i64) {
        if current_balance < 0 {
            self.peak_net_debit = self.peak_net_debit.min(current_balance);
        }
    }

    /// Total cost across all categories
    pub fn total(&self) -> i64 {
        self.total_overdraft_cost
            + self.total_delay_cost
            + self.total_collateral_cost
            + self.total_penalty_cost
            + self.total_split_friction_cost
    }
}
