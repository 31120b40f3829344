//! Cost Rates and Related Types
//!
//! Defines rates for various costs accrued during simulation.
//! All monetary values in cents/minor units.
//!
//! Delay cost applies to Queue 1 residents only. Queue 2 waits are free: once
//! an agent has released a payment, the wait for liquidity is the system's
//! problem, not a policy cost.

use serde::{Deserialize, Serialize};

/// Priority band for categorizing transaction urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorityBand {
    /// Priority 8-10: Time-critical payments
    Urgent,
    /// Priority 4-7: Standard payments
    Normal,
    /// Priority 0-3: Low priority/batch payments
    Low,
}

/// Get the priority band for a given priority level (0-10)
pub fn get_priority_band(priority: u8) -> PriorityBand {
    match priority {
        8..=10 => PriorityBand::Urgent,
        4..=7 => PriorityBand::Normal,
        _ => PriorityBand::Low,
    }
}

/// Priority-based delay cost multipliers
///
/// Allows different delay costs per priority band, so urgent payments can
/// carry higher delay costs than batch payments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriorityDelayMultipliers {
    /// Multiplier for urgent priority (8-10). Default: 1.0
    pub urgent_multiplier: f64,
    /// Multiplier for normal priority (4-7). Default: 1.0
    pub normal_multiplier: f64,
    /// Multiplier for low priority (0-3). Default: 1.0
    pub low_multiplier: f64,
}

impl Default for PriorityDelayMultipliers {
    fn default() -> Self {
        Self {
            urgent_multiplier: 1.0,
            normal_multiplier: 1.0,
            low_multiplier: 1.0,
        }
    }
}

impl PriorityDelayMultipliers {
    /// Get the delay cost multiplier for a given priority level (0-10)
    pub fn multiplier_for_priority(&self, priority: u8) -> f64 {
        match get_priority_band(priority) {
            PriorityBand::Urgent => self.urgent_multiplier,
            PriorityBand::Normal => self.normal_multiplier,
            PriorityBand::Low => self.low_multiplier,
        }
    }
}

/// Cost Rates Configuration
///
/// All rates are config-supplied; the defaults documented per field apply
/// when a section is omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRates {
    /// Overdraft cost in basis points per tick, applied to max(-balance, 0)
    /// (e.g., 0.001 = 1 bp per tick ≈ 10 bp per day at 100 ticks/day)
    pub overdraft_bps_per_tick: f64,

    /// Delay cost per tick per cent of Queue-1-resident remaining value
    /// (e.g., 0.0001 = 1 bp delay cost per tick)
    pub delay_cost_per_tick_per_cent: f64,

    /// Collateral opportunity cost in basis points per tick,
    /// applied to posted collateral
    pub collateral_cost_per_tick_bps: f64,

    /// Split friction cost per split boundary (cents)
    ///
    /// A split into N parts charges split_friction_cost × (N-1) at decision
    /// time: the operational overhead of processing multiple instructions
    /// instead of one.
    pub split_friction_cost: i64,

    /// One-time penalty when a transaction becomes overdue (cents)
    pub deadline_penalty: i64,

    /// End-of-day penalty per unsettled Queue 1 transaction (cents)
    pub eod_penalty_per_transaction: i64,

    /// Multiplier on delay cost while a transaction is overdue (default: 1.0)
    ///
    /// The deadline penalty fires once; this keeps pressure on afterwards.
    #[serde(default = "default_overdue_multiplier")]
    pub overdue_delay_multiplier: f64,

    /// Priority-band delay cost multipliers. None = all bands at 1.0.
    #[serde(default)]
    pub priority_delay_multipliers: Option<PriorityDelayMultipliers>,
}

fn default_overdue_multiplier() -> f64 {
    1.0
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            overdraft_bps_per_tick: 0.001,        // 1 bp/tick
            delay_cost_per_tick_per_cent: 0.0001, // 0.1 bp/tick
            collateral_cost_per_tick_bps: 0.0002,
            split_friction_cost: 1_000,          // $10 per split boundary
            deadline_penalty: 50_000,            // $500 per missed deadline
            eod_penalty_per_transaction: 10_000, // $100 per unsettled tx
            overdue_delay_multiplier: 1.0,
            priority_delay_multipliers: None,
        }
    }
}

impl CostRates {
    /// Effective delay multiplier for a transaction: priority band multiplier
    /// times the overdue multiplier when applicable.
    pub fn delay_multiplier(&self, priority: u8, is_overdue: bool) -> f64 {
        let band = self
            .priority_delay_multipliers
            .as_ref()
            .map(|m| m.multiplier_for_priority(priority))
            .unwrap_or(1.0);
        if is_overdue {
            band * self.overdue_delay_multiplier
        } else {
            band
        }
    }
}
