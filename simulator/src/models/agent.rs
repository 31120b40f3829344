//! Agent (Bank) model
//!
//! Represents a bank participating in the payment system. Each agent holds:
//! - Settlement balance at the central bank (i64 cents, negative = overdraft)
//! - Unsecured daylight overdraft cap
//! - Posted collateral with a haircut, backing secured intraday credit
//! - Queue 1: the internal queue of outgoing payment instructions
//! - Up to 10 named state registers (policy micro-memory, reset at EOD)
//!
//! # Overdraft invariant
//!
//! `balance >= -(unsecured_cap + floor(posted_collateral * (1 - haircut)))`
//! holds at all times. `debit` enforces it; LSM settlement verifies projected
//! balances before using `adjust_balance`.
//!
//! # Liquidity vocabulary
//!
//! Two related but different quantities are exposed to policies, and picking
//! the wrong one is a classic policy-authoring mistake:
//!
//! - `available_liquidity`: own funds only, `max(balance, 0)`. Excludes
//!   intraday credit entirely.
//! - `effective_liquidity`: `available_liquidity + credit_headroom`. What the
//!   agent can actually pay right now. Settlement feasibility uses this.
//!
//! A splitting predicate written against `available_liquidity` stops
//! releasing the moment the agent dips into overdraft, even with ample
//! headroom left. Use `effective_liquidity` for "can I pay X?" checks.
//!
//! CRITICAL: All money values are i64 (cents)

use serde::{Deserialize, Serialize};
use thiserror::Error;
use std::collections::BTreeMap;

/// Maximum number of named state registers per agent
pub const MAX_STATE_REGISTERS: usize = 10;

/// Errors that can occur during agent operations
#[derive(Debug, Error, PartialEq)]
pub enum AgentError {
    #[error("Insufficient liquidity: required {required}, available {available}")]
    InsufficientLiquidity { required: i64, available: i64 },

    #[error("Collateral capacity exceeded: posting {requested} leaves capacity {capacity}")]
    CollateralCapacityExceeded { requested: i64, capacity: i64 },

    #[error("State register budget exhausted ({MAX_STATE_REGISTERS} registers)")]
    RegisterBudgetExhausted,
}

/// Errors that can occur when withdrawing collateral
#[derive(Debug, Error, PartialEq)]
pub enum WithdrawError {
    #[error("Withdrawal {requested} exceeds posted collateral {posted}")]
    ExceedsPosted { requested: i64, posted: i64 },

    #[error("Withdrawal would strand credit usage: usable after withdrawal {usable}, used {used}")]
    WouldStrandCreditUsage { usable: i64, used: i64 },
}

/// Represents a bank (agent) in the payment system
///
/// # Example
/// ```
/// use rtgs_simulator_core::Agent;
///
/// let mut agent = Agent::new("BANK_A".to_string(), 1_000_000, 500_000);
/// assert_eq!(agent.balance(), 1_000_000);
///
/// agent.debit(300_000).unwrap();
/// assert_eq!(agent.balance(), 700_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent identifier (e.g., "BANK_A")
    id: String,

    /// Current balance in settlement account (i64 cents)
    /// Positive = funds available, negative = using intraday credit
    balance: i64,

    /// Unsecured daylight overdraft cap (i64 cents, non-negative)
    unsecured_cap: i64,

    /// Collateral currently posted (i64 cents, non-negative)
    posted_collateral: i64,

    /// Upper bound on posted collateral (i64 cents, non-negative)
    max_collateral_capacity: i64,

    /// Haircut applied to collateral value, in [0, 1)
    collateral_haircut: f64,

    /// Advisory soft-minimum balance target read by policies (i64 cents)
    liquidity_buffer: i64,

    /// Queue 1: outgoing transaction IDs awaiting a release decision.
    /// Iteration order is fixed by the engine's deterministic sort.
    outgoing_queue: Vec<String>,

    /// Expected inflow forecast: tx IDs the agent anticipates receiving
    incoming_expected: Vec<String>,

    /// Named state registers (policy micro-memory). Inline storage with a
    /// linear scan: at most MAX_STATE_REGISTERS entries, hot path.
    state_registers: Vec<(String, f64)>,

    /// Face value sent per counterparty over the run, for top-K ranking
    sent_value_by_counterparty: BTreeMap<String, i64>,
}

impl Agent {
    /// Create a new agent with a balance and unsecured overdraft cap
    ///
    /// # Panics
    /// Panics if unsecured_cap is negative
    pub fn new(id: String, balance: i64, unsecured_cap: i64) -> Self {
        assert!(unsecured_cap >= 0, "unsecured_cap must be non-negative");
        Self {
            id,
            balance,
            unsecured_cap,
            posted_collateral: 0,
            max_collateral_capacity: 0,
            collateral_haircut: 0.0,
            liquidity_buffer: 0,
            outgoing_queue: Vec::new(),
            incoming_expected: Vec::new(),
            state_registers: Vec::new(),
            sent_value_by_counterparty: BTreeMap::new(),
        }
    }

    /// Set collateral parameters (builder pattern)
    ///
    /// # Panics
    /// Panics if haircut is outside [0, 1) or capacities are negative
    pub fn with_collateral(
        mut self,
        posted: i64,
        max_capacity: i64,
        haircut: f64,
    ) -> Self {
        assert!(posted >= 0, "posted collateral must be non-negative");
        assert!(max_capacity >= 0, "collateral capacity must be non-negative");
        assert!(posted <= max_capacity, "posted exceeds capacity");
        assert!(
            (0.0..1.0).contains(&haircut),
            "haircut must be in [0, 1)"
        );
        self.posted_collateral = posted;
        self.max_collateral_capacity = max_capacity;
        self.collateral_haircut = haircut;
        self
    }

    /// Set the advisory liquidity buffer (builder pattern)
    pub fn with_liquidity_buffer(mut self, buffer: i64) -> Self {
        assert!(buffer >= 0, "liquidity buffer must be non-negative");
        self.liquidity_buffer = buffer;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn unsecured_cap(&self) -> i64 {
        self.unsecured_cap
    }

    /// Replace the unsecured cap (scenario events)
    pub fn set_unsecured_cap(&mut self, cap: i64) {
        assert!(cap >= 0, "unsecured_cap must be non-negative");
        self.unsecured_cap = cap;
    }

    pub fn posted_collateral(&self) -> i64 {
        self.posted_collateral
    }

    pub fn max_collateral_capacity(&self) -> i64 {
        self.max_collateral_capacity
    }

    pub fn collateral_haircut(&self) -> f64 {
        self.collateral_haircut
    }

    pub fn liquidity_buffer(&self) -> i64 {
        self.liquidity_buffer
    }

    /// Credit value of posted collateral after the haircut, floored to cents
    pub fn collateral_value(&self) -> i64 {
        ((self.posted_collateral as f64) * (1.0 - self.collateral_haircut)).floor() as i64
    }

    /// Remaining room for additional collateral posting
    pub fn remaining_collateral_capacity(&self) -> i64 {
        self.max_collateral_capacity - self.posted_collateral
    }

    /// Maximum overdraft the agent may run: unsecured cap + collateral value
    pub fn allowed_overdraft_limit(&self) -> i64 {
        self.unsecured_cap.saturating_add(self.collateral_value())
    }

    /// Intraday credit currently in use: max(-balance, 0)
    pub fn credit_used(&self) -> i64 {
        (-self.balance).max(0)
    }

    /// Remaining overdraft capacity before hitting the allowed limit
    pub fn credit_headroom(&self) -> i64 {
        (self.allowed_overdraft_limit() - self.credit_used()).max(0)
    }

    /// Own funds available for payment: max(balance, 0). Excludes credit.
    pub fn available_liquidity(&self) -> i64 {
        self.balance.max(0)
    }

    /// What the agent can actually pay right now: own funds + credit headroom
    pub fn effective_liquidity(&self) -> i64 {
        self.available_liquidity().saturating_add(self.credit_headroom())
    }

    /// Check if agent can pay a given amount without breaching the overdraft cap
    pub fn can_pay(&self, amount: i64) -> bool {
        amount <= self.effective_liquidity()
    }

    /// Check if agent is currently using intraday credit
    pub fn is_using_credit(&self) -> bool {
        self.balance < 0
    }

    /// Fraction of the allowed overdraft currently used, in [0, 1+]
    pub fn liquidity_pressure(&self) -> f64 {
        let limit = self.allowed_overdraft_limit();
        if limit <= 0 {
            if self.is_using_credit() {
                1.0
            } else {
                0.0
            }
        } else {
            self.credit_used() as f64 / limit as f64
        }
    }

    /// Debit (decrease) balance, enforcing the overdraft invariant
    pub fn debit(&mut self, amount: i64) -> Result<(), AgentError> {
        assert!(amount >= 0, "amount must be non-negative");

        if !self.can_pay(amount) {
            return Err(AgentError::InsufficientLiquidity {
                required: amount,
                available: self.effective_liquidity(),
            });
        }

        self.balance -= amount;
        Ok(())
    }

    /// Credit (increase) balance
    pub fn credit(&mut self, amount: i64) {
        assert!(amount >= 0, "amount must be non-negative");
        self.balance += amount;
    }

    /// Adjust balance by a signed delta without a liquidity check.
    ///
    /// Only for callers that have already verified the projected balance
    /// stays within the overdraft limit (LSM net settlement, scenario
    /// direct transfers).
    pub fn adjust_balance(&mut self, delta: i64) {
        self.balance = self.balance.saturating_add(delta);
    }

    // =========================================================================
    // Collateral management
    // =========================================================================

    /// Post additional collateral
    pub fn post_collateral(&mut self, amount: i64) -> Result<(), AgentError> {
        assert!(amount >= 0, "amount must be non-negative");

        let capacity = self.remaining_collateral_capacity();
        if amount > capacity {
            return Err(AgentError::CollateralCapacityExceeded {
                requested: amount,
                capacity,
            });
        }

        self.posted_collateral += amount;
        Ok(())
    }

    /// Withdraw posted collateral.
    ///
    /// Rejects withdrawals that would leave the allowed overdraft limit below
    /// the credit currently in use (the overdraft invariant must keep
    /// holding after the withdrawal).
    pub fn withdraw_collateral(&mut self, amount: i64) -> Result<(), WithdrawError> {
        assert!(amount >= 0, "amount must be non-negative");

        if amount > self.posted_collateral {
            return Err(WithdrawError::ExceedsPosted {
                requested: amount,
                posted: self.posted_collateral,
            });
        }

        let remaining_posted = self.posted_collateral - amount;
        let remaining_value =
            ((remaining_posted as f64) * (1.0 - self.collateral_haircut)).floor() as i64;
        let usable = self.unsecured_cap.saturating_add(remaining_value);
        if usable < self.credit_used() {
            return Err(WithdrawError::WouldStrandCreditUsage {
                usable,
                used: self.credit_used(),
            });
        }

        self.posted_collateral = remaining_posted;
        Ok(())
    }

    /// Largest withdrawal that keeps the overdraft invariant intact
    pub fn max_withdrawable_collateral(&self) -> i64 {
        let one_minus_h = 1.0 - self.collateral_haircut;
        let excess_over_unsecured = (self.credit_used() - self.unsecured_cap).max(0);
        // Minimum collateral that must stay posted to back current usage
        let required_posted = if one_minus_h > 0.0 {
            ((excess_over_unsecured as f64) / one_minus_h).ceil() as i64
        } else {
            self.posted_collateral
        };
        (self.posted_collateral - required_posted).max(0)
    }

    // =========================================================================
    // Queue 1 (internal outgoing queue)
    // =========================================================================

    /// Add a transaction ID to the outgoing queue
    pub fn queue_outgoing(&mut self, tx_id: String) {
        self.outgoing_queue.push(tx_id);
    }

    /// Remove a transaction ID from the outgoing queue
    pub fn remove_outgoing(&mut self, tx_id: &str) {
        self.outgoing_queue.retain(|id| id != tx_id);
    }

    pub fn outgoing_queue(&self) -> &[String] {
        &self.outgoing_queue
    }

    pub fn outgoing_queue_size(&self) -> usize {
        self.outgoing_queue.len()
    }

    /// Replace the outgoing queue order (the engine's deterministic sort)
    pub fn set_outgoing_queue(&mut self, queue: Vec<String>) {
        self.outgoing_queue = queue;
    }

    /// Expected inflow forecast
    pub fn incoming_expected(&self) -> &[String] {
        &self.incoming_expected
    }

    pub fn add_incoming_expected(&mut self, tx_id: String) {
        self.incoming_expected.push(tx_id);
    }

    pub fn remove_incoming_expected(&mut self, tx_id: &str) {
        self.incoming_expected.retain(|id| id != tx_id);
    }

    // =========================================================================
    // State registers (policy micro-memory)
    // =========================================================================

    /// Read a register. Unset registers read as 0.0.
    pub fn register(&self, key: &str) -> f64 {
        self.state_registers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
            .unwrap_or(0.0)
    }

    /// Write a register, creating it if the budget allows
    pub fn set_register(&mut self, key: &str, value: f64) -> Result<(), AgentError> {
        if let Some(slot) = self.state_registers.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
            return Ok(());
        }
        if self.state_registers.len() >= MAX_STATE_REGISTERS {
            return Err(AgentError::RegisterBudgetExhausted);
        }
        self.state_registers.push((key.to_string(), value));
        Ok(())
    }

    /// Add a delta to a register, creating it at `delta` if unset
    pub fn add_register(&mut self, key: &str, delta: f64) -> Result<(), AgentError> {
        let current = self.register(key);
        self.set_register(key, current + delta)
    }

    /// All registers, for context construction
    pub fn state_registers(&self) -> &[(String, f64)] {
        &self.state_registers
    }

    /// Clear all registers (end of day)
    pub fn reset_registers(&mut self) {
        self.state_registers.clear();
    }

    // =========================================================================
    // Counterparty statistics
    // =========================================================================

    /// Record face value sent to a counterparty (settled payments)
    pub fn record_sent_value(&mut self, counterparty: &str, amount: i64) {
        *self
            .sent_value_by_counterparty
            .entry(counterparty.to_string())
            .or_insert(0) += amount;
    }

    /// Top `k` counterparties by cumulative sent value, ties broken by ID
    pub fn top_counterparties(&self, k: usize) -> Vec<String> {
        let mut entries: Vec<(&String, &i64)> = self.sent_value_by_counterparty.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        entries.into_iter().take(k).map(|(id, _)| id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "unsecured_cap must be non-negative")]
    fn test_negative_unsecured_cap_panics() {
        Agent::new("BANK_A".to_string(), 1_000_000, -500_000);
    }

    #[test]
    fn test_effective_liquidity_includes_credit() {
        let agent = Agent::new("BANK_A".to_string(), 1_000_000, 500_000);
        assert_eq!(agent.available_liquidity(), 1_000_000);
        assert_eq!(agent.effective_liquidity(), 1_500_000);
        assert!(agent.can_pay(1_500_000));
        assert!(!agent.can_pay(1_500_001));
    }

    #[test]
    fn test_overdraft_accounting() {
        let mut agent = Agent::new("BANK_A".to_string(), 1_000_000, 500_000);
        agent.debit(1_200_000).unwrap();

        assert_eq!(agent.balance(), -200_000);
        assert!(agent.is_using_credit());
        assert_eq!(agent.credit_used(), 200_000);
        assert_eq!(agent.credit_headroom(), 300_000);
        assert_eq!(agent.available_liquidity(), 0);
        assert_eq!(agent.effective_liquidity(), 300_000);
    }

    #[test]
    fn test_collateral_extends_overdraft() {
        let agent = Agent::new("BANK_A".to_string(), 0, 100_000)
            .with_collateral(200_000, 500_000, 0.10);

        // 200k posted at 10% haircut backs 180k of credit
        assert_eq!(agent.collateral_value(), 180_000);
        assert_eq!(agent.allowed_overdraft_limit(), 280_000);
        assert!(agent.can_pay(280_000));
        assert!(!agent.can_pay(280_001));
    }

    #[test]
    fn test_withdraw_clamped_to_credit_usage() {
        let mut agent = Agent::new("BANK_A".to_string(), 0, 0)
            .with_collateral(200_000, 500_000, 0.0);
        agent.debit(150_000).unwrap();

        // 150k of credit in use, backed only by collateral
        assert_eq!(agent.max_withdrawable_collateral(), 50_000);
        assert!(agent.withdraw_collateral(60_000).is_err());
        agent.withdraw_collateral(50_000).unwrap();
        assert_eq!(agent.posted_collateral(), 150_000);
    }

    #[test]
    fn test_register_budget() {
        let mut agent = Agent::new("BANK_A".to_string(), 0, 0);
        for i in 0..MAX_STATE_REGISTERS {
            agent
                .set_register(&format!("bank_state_{}", i), i as f64)
                .unwrap();
        }
        assert_eq!(
            agent.set_register("bank_state_overflow", 1.0),
            Err(AgentError::RegisterBudgetExhausted)
        );

        // Overwriting an existing register is always allowed
        agent.set_register("bank_state_0", 42.0).unwrap();
        assert_eq!(agent.register("bank_state_0"), 42.0);

        agent.reset_registers();
        assert_eq!(agent.register("bank_state_0"), 0.0);
    }

    #[test]
    fn test_top_counterparties_ordering() {
        let mut agent = Agent::new("BANK_A".to_string(), 0, 0);
        agent.record_sent_value("BANK_C", 300);
        agent.record_sent_value("BANK_B", 500);
        agent.record_sent_value("BANK_D", 300);

        assert_eq!(
            agent.top_counterparties(2),
            vec!["BANK_B".to_string(), "BANK_C".to_string()]
        );
    }
}
