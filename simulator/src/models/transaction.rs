//! Transaction model
//!
//! Represents a payment instruction between two agents.
//! Each transaction has:
//! - Sender and receiver agent IDs
//! - Amount (i64 cents) - original and remaining
//! - Arrival and deadline ticks
//! - Priority level (0-10)
//! - Divisibility and split-lineage flags
//! - Status (Pending, PartiallySettled, Settled, Dropped)
//!
//! CRITICAL: All money values are i64 (cents)

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transaction status
///
/// Tracks the lifecycle of a payment through the system. Queue membership is
/// tracked separately: a Pending transaction sits either in its sender's
/// Queue 1, or, once it carries an `rtgs_priority` token, in Queue 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Transaction waiting to be settled
    Pending,

    /// Transaction partially settled (divisible transactions only)
    PartiallySettled {
        /// Tick when first partial settlement occurred
        first_settlement_tick: usize,
    },

    /// Transaction fully settled
    Settled {
        /// Tick when final settlement occurred
        tick: usize,
    },

    /// Transaction dropped (policy decision, or replaced by split children)
    Dropped {
        /// Tick when transaction was dropped
        tick: usize,
    },
}

/// Errors that can occur during transaction operations
#[derive(Debug, Error, PartialEq)]
pub enum TransactionError {
    #[error("Cannot partially settle indivisible transaction")]
    IndivisibleTransaction,

    #[error("Settlement amount {amount} exceeds remaining amount {remaining}")]
    AmountExceedsRemaining { amount: i64, remaining: i64 },

    #[error("Transaction already fully settled")]
    AlreadySettled,

    #[error("Cannot settle dropped transaction")]
    TransactionDropped,

    #[error("Settlement amount must be positive")]
    InvalidAmount,
}

/// Represents a payment transaction between two agents
///
/// # Example
/// ```
/// use rtgs_simulator_core::Transaction;
///
/// let tx = Transaction::new(
///     "BANK_A".to_string(),
///     "BANK_B".to_string(),
///     100000, // $1,000.00 in cents
///     10,     // arrival_tick
///     50,     // deadline_tick
/// ).with_priority(8).divisible();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction identifier (UUID)
    id: String,

    /// Sender agent ID
    sender_id: String,

    /// Receiver agent ID
    receiver_id: String,

    /// Original transaction amount (i64 cents)
    amount: i64,

    /// Remaining amount to be settled (i64 cents)
    remaining_amount: i64,

    /// Tick when transaction arrived in system
    arrival_tick: usize,

    /// Tick by which transaction must be settled
    deadline_tick: usize,

    /// Priority level (higher = more urgent). Default: 5, Range: 0-10
    priority: u8,

    /// Can the transaction be split into multiple parts?
    is_divisible: bool,

    /// Is this transaction a child created by a split?
    is_split: bool,

    /// Parent transaction ID if this is a split child
    parent_tx_id: Option<String>,

    /// Tick at which the transaction first became overdue, if ever.
    /// Set exactly once; the deadline penalty keys off this transition.
    overdue_since_tick: Option<usize>,

    /// Ordering token assigned when the transaction enters Queue 2.
    /// None = not in Queue 2. Lower tokens settle first.
    rtgs_priority: Option<u64>,

    /// Current status
    status: TransactionStatus,
}

impl Transaction {
    /// Create a new transaction
    ///
    /// # Arguments
    /// * `sender_id` - Sender agent ID
    /// * `receiver_id` - Receiver agent ID
    /// * `amount` - Transaction amount in cents (must be positive)
    /// * `arrival_tick` - Tick when transaction arrives
    /// * `deadline_tick` - Tick by which transaction must settle
    ///
    /// # Panics
    /// Panics if amount <= 0 or deadline <= arrival
    pub fn new(
        sender_id: String,
        receiver_id: String,
        amount: i64,
        arrival_tick: usize,
        deadline_tick: usize,
    ) -> Self {
        assert!(amount > 0, "amount must be positive");
        assert!(
            deadline_tick > arrival_tick,
            "deadline must be after arrival"
        );

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender_id,
            receiver_id,
            amount,
            remaining_amount: amount,
            arrival_tick,
            deadline_tick,
            priority: 5,
            is_divisible: false,
            is_split: false,
            parent_tx_id: None,
            overdue_since_tick: None,
            rtgs_priority: None,
            status: TransactionStatus::Pending,
        }
    }

    /// Replace the generated UUID with a caller-assigned ID (builder
    /// pattern). The engine assigns sequential IDs so that event streams are
    /// byte-identical across runs with the same seed.
    pub fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }

    /// Set priority (builder pattern). Capped at 10.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(10);
        self
    }

    /// Mark transaction as divisible (builder pattern)
    pub fn divisible(mut self) -> Self {
        self.is_divisible = true;
        self
    }

    /// Mark transaction as a split child of `parent_id` (builder pattern)
    pub fn as_split_child(mut self, parent_id: String) -> Self {
        self.is_split = true;
        self.parent_tx_id = Some(parent_id);
        self
    }

    /// Get transaction ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get sender agent ID
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Get receiver agent ID
    pub fn receiver_id(&self) -> &str {
        &self.receiver_id
    }

    /// Get original transaction amount (i64 cents)
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Get remaining amount to be settled (i64 cents)
    pub fn remaining_amount(&self) -> i64 {
        self.remaining_amount
    }

    /// Get amount already settled (i64 cents)
    pub fn settled_amount(&self) -> i64 {
        self.amount - self.remaining_amount
    }

    /// Get arrival tick
    pub fn arrival_tick(&self) -> usize {
        self.arrival_tick
    }

    /// Get deadline tick
    pub fn deadline_tick(&self) -> usize {
        self.deadline_tick
    }

    /// Get priority level
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Set priority. Capped at 10.
    pub fn set_priority(&mut self, priority: u8) {
        self.priority = priority.min(10);
    }

    /// Check if transaction is divisible
    pub fn is_divisible(&self) -> bool {
        self.is_divisible
    }

    /// Check if transaction is a split child
    pub fn is_split(&self) -> bool {
        self.is_split
    }

    /// Get parent transaction ID (split children only)
    pub fn parent_tx_id(&self) -> Option<&str> {
        self.parent_tx_id.as_deref()
    }

    /// Get current status
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Check if transaction is pending
    pub fn is_pending(&self) -> bool {
        matches!(
            self.status,
            TransactionStatus::Pending | TransactionStatus::PartiallySettled { .. }
        )
    }

    /// Check if transaction is fully settled
    pub fn is_fully_settled(&self) -> bool {
        self.remaining_amount == 0
    }

    /// Check if transaction is past its deadline at `current_tick`
    pub fn is_past_deadline(&self, current_tick: usize) -> bool {
        current_tick > self.deadline_tick
    }

    /// Check if the overdue transition has been recorded
    pub fn is_overdue(&self) -> bool {
        self.overdue_since_tick.is_some()
    }

    /// Tick at which the transaction became overdue, if it did
    pub fn overdue_since_tick(&self) -> Option<usize> {
        self.overdue_since_tick
    }

    /// Record the overdue transition. Returns true only on the first call,
    /// so the caller can charge the one-time deadline penalty exactly once.
    pub fn mark_overdue(&mut self, tick: usize) -> bool {
        if self.overdue_since_tick.is_none() {
            self.overdue_since_tick = Some(tick);
            true
        } else {
            false
        }
    }

    /// Queue 2 ordering token, if the transaction has been submitted
    pub fn rtgs_priority(&self) -> Option<u64> {
        self.rtgs_priority
    }

    /// Assign the Queue 2 ordering token on submission
    pub fn set_rtgs_priority(&mut self, token: u64) {
        self.rtgs_priority = Some(token);
    }

    /// Clear the Queue 2 ordering token (withdrawal back to Queue 1)
    pub fn clear_rtgs_priority(&mut self) {
        self.rtgs_priority = None;
    }

    /// Settle transaction (full or partial)
    ///
    /// # Arguments
    /// * `amount` - Amount to settle (i64 cents, must be > 0 and <= remaining)
    /// * `tick` - Tick when settlement occurs
    pub fn settle(&mut self, amount: i64, tick: usize) -> Result<(), TransactionError> {
        if amount <= 0 {
            return Err(TransactionError::InvalidAmount);
        }

        if self.remaining_amount == 0 {
            return Err(TransactionError::AlreadySettled);
        }

        if matches!(self.status, TransactionStatus::Dropped { .. }) {
            return Err(TransactionError::TransactionDropped);
        }

        if amount > self.remaining_amount {
            return Err(TransactionError::AmountExceedsRemaining {
                amount,
                remaining: self.remaining_amount,
            });
        }

        if amount < self.remaining_amount && !self.is_divisible {
            return Err(TransactionError::IndivisibleTransaction);
        }

        self.remaining_amount -= amount;

        if self.remaining_amount == 0 {
            self.status = TransactionStatus::Settled { tick };
        } else if matches!(self.status, TransactionStatus::Pending) {
            self.status = TransactionStatus::PartiallySettled {
                first_settlement_tick: tick,
            };
        }

        Ok(())
    }

    /// Drop transaction (policy decision, or parent replaced by split children)
    pub fn drop_transaction(&mut self, tick: usize) {
        self.status = TransactionStatus::Dropped { tick };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx() -> Transaction {
        Transaction::new("BANK_A".to_string(), "BANK_B".to_string(), 100_000, 10, 50)
    }

    #[test]
    fn test_priority_capped_at_10() {
        assert_eq!(tx().with_priority(255).priority(), 10);
    }

    #[test]
    fn test_settle_full() {
        let mut t = tx();
        t.settle(100_000, 20).unwrap();
        assert!(t.is_fully_settled());
        assert_eq!(t.status(), &TransactionStatus::Settled { tick: 20 });
    }

    #[test]
    fn test_partial_settle_requires_divisible() {
        let mut t = tx();
        assert_eq!(
            t.settle(40_000, 20),
            Err(TransactionError::IndivisibleTransaction)
        );

        let mut d = tx().divisible();
        d.settle(40_000, 20).unwrap();
        assert_eq!(d.remaining_amount(), 60_000);
        assert_eq!(d.settled_amount(), 40_000);
        d.settle(60_000, 30).unwrap();
        assert!(d.is_fully_settled());
    }

    #[test]
    fn test_mark_overdue_fires_once() {
        let mut t = tx();
        assert!(t.mark_overdue(51));
        assert!(!t.mark_overdue(52));
        assert_eq!(t.overdue_since_tick(), Some(51));
    }

    #[test]
    fn test_split_child_lineage() {
        let parent = tx();
        let child = Transaction::new(
            "BANK_A".to_string(),
            "BANK_B".to_string(),
            25_000,
            10,
            50,
        )
        .as_split_child(parent.id().to_string());

        assert!(child.is_split());
        assert_eq!(child.parent_tx_id(), Some(parent.id()));
    }

    #[test]
    fn test_cannot_settle_dropped() {
        let mut t = tx();
        t.drop_transaction(15);
        assert_eq!(
            t.settle(100_000, 20),
            Err(TransactionError::TransactionDropped)
        );
    }
}
