//! RTGS (Real-Time Gross Settlement) engine
//!
//! Core T2-style settlement: each payment is final individually, debiting the
//! sender's central-bank account and crediting the receiver's.
//!
//! ```text
//! Client A → Bank A (Queue 1) → RTGS @ Central Bank → Bank B → Client B
//!                                      ↓
//!                               Debit Bank A's CB account
//!                               Credit Bank B's CB account
//! ```
//!
//! 1. Receive a released payment order
//! 2. Check the sender's effective liquidity (balance + credit headroom)
//! 3. If covered: immediate settlement (debit sender, credit receiver)
//! 4. If not: the transaction stays in Queue 2 and retries each tick
//!
//! A transaction waiting in Queue 2 is not an error and carries no delay
//! cost; it simply waits for liquidity or for the LSM to release it.
//!
//! # Critical Invariants
//!
//! - **Atomicity**: debit and credit happen together, or neither
//! - **Balance conservation**: total system balance unchanged
//! - **Credit limits**: the sender may go negative only up to its allowed
//!   overdraft limit

use crate::models::agent::{Agent, AgentError};
use crate::models::state::SimulationState;
use crate::models::transaction::{Transaction, TransactionError, TransactionStatus};
use thiserror::Error;

/// Errors that can occur during RTGS settlement
#[derive(Debug, Error, PartialEq)]
pub enum SettlementError {
    #[error("Insufficient liquidity: required {required}, available {available}")]
    InsufficientLiquidity { required: i64, available: i64 },

    #[error("Transaction already fully settled")]
    AlreadySettled,

    #[error("Transaction has been dropped")]
    Dropped,

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Agent error: {0}")]
    AgentError(#[from] AgentError),

    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),
}

/// Attempt immediate RTGS settlement between two agents
///
/// Checks the sender's effective liquidity, then debits, credits, and marks
/// the transaction settled. On insufficient liquidity no state changes occur.
pub fn try_settle(
    sender: &mut Agent,
    receiver: &mut Agent,
    transaction: &mut Transaction,
    tick: usize,
) -> Result<(), SettlementError> {
    if transaction.is_fully_settled() {
        return Err(SettlementError::AlreadySettled);
    }

    if matches!(transaction.status(), TransactionStatus::Dropped { .. }) {
        return Err(SettlementError::Dropped);
    }

    let amount = transaction.remaining_amount();

    if !sender.can_pay(amount) {
        return Err(SettlementError::InsufficientLiquidity {
            required: amount,
            available: sender.effective_liquidity(),
        });
    }

    sender.debit(amount)?;
    receiver.credit(amount);
    transaction.settle(amount, tick)?;

    Ok(())
}

/// Result of submitting a transaction to RTGS
#[derive(Debug, PartialEq)]
pub enum SubmissionResult {
    /// Transaction settled immediately
    SettledImmediately { tick: usize },

    /// Transaction queued (insufficient liquidity)
    Queued {
        /// Position in queue (1-indexed)
        position: usize,
    },
}

/// Statistics from one pass over the RTGS queue
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueProcessingResult {
    /// Number of transactions settled this pass
    pub settled_count: usize,

    /// Total value settled (cents)
    pub settled_value: i64,

    /// Number of transactions remaining in queue
    pub remaining_queue_size: usize,

    /// IDs settled this pass, in settlement order (for event emission)
    pub settled_tx_ids: Vec<String>,
}

/// Submit a transaction already registered in state to RTGS.
///
/// The transaction must carry its rtgs_priority token. Attempts immediate
/// settlement; on insufficient liquidity the transaction joins Queue 2.
pub fn submit_registered(
    state: &mut SimulationState,
    tx_id: &str,
    tick: usize,
) -> Result<SubmissionResult, SettlementError> {
    let (sender_id, receiver_id, amount) = {
        let tx = state
            .get_transaction(tx_id)
            .ok_or_else(|| SettlementError::UnknownAgent(tx_id.to_string()))?;
        (
            tx.sender_id().to_string(),
            tx.receiver_id().to_string(),
            tx.remaining_amount(),
        )
    };

    if state.get_agent(&sender_id).is_none() {
        return Err(SettlementError::UnknownAgent(sender_id));
    }
    if state.get_agent(&receiver_id).is_none() {
        return Err(SettlementError::UnknownAgent(receiver_id));
    }

    let can_pay = state.get_agent(&sender_id).unwrap().can_pay(amount);

    if can_pay {
        state.get_agent_mut(&sender_id).unwrap().debit(amount)?;
        state.get_agent_mut(&receiver_id).unwrap().credit(amount);
        state
            .get_transaction_mut(tx_id)
            .unwrap()
            .settle(amount, tick)?;
        state
            .get_agent_mut(&sender_id)
            .unwrap()
            .record_sent_value(&receiver_id, amount);

        Ok(SubmissionResult::SettledImmediately { tick })
    } else {
        state.queue_transaction(tx_id.to_string());
        let position = state.queue_size();
        Ok(SubmissionResult::Queued { position })
    }
}

/// Process the RTGS queue: retry queued transactions in token order.
///
/// Transactions settle when the sender's liquidity now covers them; the rest
/// stay queued. Queue 2 never drops transactions; past-deadline items keep
/// waiting (overdue accounting happens in cost accrual).
pub fn process_queue(state: &mut SimulationState, tick: usize) -> QueueProcessingResult {
    state.sort_rtgs_queue();

    let mut settled_count = 0;
    let mut settled_value = 0i64;
    let mut settled_tx_ids = Vec::new();
    let mut still_pending = Vec::new();

    let tx_ids: Vec<String> = state.rtgs_queue_mut().drain(..).collect();

    for tx_id in tx_ids {
        let Some(transaction) = state.get_transaction(&tx_id) else {
            continue;
        };

        if transaction.is_fully_settled() {
            continue;
        }

        let sender_id = transaction.sender_id().to_string();
        let receiver_id = transaction.receiver_id().to_string();
        let amount = transaction.remaining_amount();

        let can_settle = state
            .get_agent(&sender_id)
            .map(|sender| sender.can_pay(amount))
            .unwrap_or(false);

        if can_settle {
            state.get_agent_mut(&sender_id).unwrap().debit(amount).unwrap();
            state.get_agent_mut(&receiver_id).unwrap().credit(amount);
            state
                .get_transaction_mut(&tx_id)
                .unwrap()
                .settle(amount, tick)
                .unwrap();
            state
                .get_agent_mut(&sender_id)
                .unwrap()
                .record_sent_value(&receiver_id, amount);

            settled_count += 1;
            settled_value += amount;
            settled_tx_ids.push(tx_id);
        } else {
            still_pending.push(tx_id);
        }
    }

    *state.rtgs_queue_mut() = still_pending;

    QueueProcessingResult {
        settled_count,
        settled_value,
        remaining_queue_size: state.queue_size(),
        settled_tx_ids,
    }
}
