//! Simulation State
//!
//! The complete state of the payment system: all agents, all transactions,
//! and the central RTGS queue (Queue 2) with its secondary indices.
//!
//! # Queue Architecture
//!
//! - **Queue 1**: per-agent internal queues (`Agent::outgoing_queue`) holding
//!   arrivals awaiting a release decision
//! - **Queue 2**: the central `rtgs_queue` here, holding released-but-
//!   unsettled transactions
//!
//! # Critical Invariants
//!
//! 1. **Balance conservation**: the sum of agent balances only changes
//!    through scenario-event direct transfers
//! 2. **Transaction uniqueness**: each transaction ID appears exactly once
//! 3. **Queue validity**: every ID in rtgs_queue exists in the transactions map
//! 4. **Index consistency**: after `rebuild_queue2_index`, the secondary
//!    indices answer exactly what a linear scan of rtgs_queue would

use crate::models::agent::Agent;
use crate::models::event::{Event, EventLog};
use crate::models::queue_index::Queue2Index;
use crate::models::transaction::Transaction;
use std::collections::BTreeMap;

/// Complete simulation state
#[derive(Debug, Clone)]
pub struct SimulationState {
    /// All agents (banks) in the system, indexed by ID
    agents: BTreeMap<String, Agent>,

    /// All transactions, indexed by transaction ID
    transactions: BTreeMap<String, Transaction>,

    /// Central RTGS queue (Queue 2): transaction IDs awaiting settlement
    rtgs_queue: Vec<String>,

    /// Event log for replay and auditing
    event_log: EventLog,

    /// Secondary indices over the RTGS queue
    queue2_index: Queue2Index,

    /// Monotone counter feeding the rtgs_priority ordering token
    next_entry_seq: u64,
}

impl SimulationState {
    /// Create a new simulation state with given agents
    pub fn new(agents: Vec<Agent>) -> Self {
        let agents_map = agents
            .into_iter()
            .map(|agent| (agent.id().to_string(), agent))
            .collect();

        Self {
            agents: agents_map,
            transactions: BTreeMap::new(),
            rtgs_queue: Vec::new(),
            event_log: EventLog::new(),
            queue2_index: Queue2Index::new(),
            next_entry_seq: 0,
        }
    }

    /// Reassemble a state from checkpointed parts
    ///
    /// Validates that every queue reference resolves to a known transaction.
    pub fn from_parts(
        agents: BTreeMap<String, Agent>,
        transactions: BTreeMap<String, Transaction>,
        rtgs_queue: Vec<String>,
        next_entry_seq: u64,
    ) -> Result<Self, String> {
        for tx_id in &rtgs_queue {
            if !transactions.contains_key(tx_id) {
                return Err(format!(
                    "RTGS queue contains invalid transaction ID: {}",
                    tx_id
                ));
            }
        }

        for (agent_id, agent) in &agents {
            for tx_id in agent.outgoing_queue() {
                if !transactions.contains_key(tx_id) {
                    return Err(format!(
                        "Agent {} queue contains invalid transaction ID: {}",
                        agent_id, tx_id
                    ));
                }
            }
        }

        let mut state = Self {
            agents,
            transactions,
            rtgs_queue,
            event_log: EventLog::new(),
            queue2_index: Queue2Index::new(),
            next_entry_seq,
        };
        state.rebuild_queue2_index();
        Ok(state)
    }

    // =========================================================================
    // Agents
    // =========================================================================

    pub fn get_agent(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn get_agent_mut(&mut self, id: &str) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    /// Agent IDs in deterministic sorted order
    pub fn agent_ids(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn agents(&self) -> &BTreeMap<String, Agent> {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut BTreeMap<String, Agent> {
        &mut self.agents
    }

    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    pub fn get_transaction(&self, id: &str) -> Option<&Transaction> {
        self.transactions.get(id)
    }

    pub fn get_transaction_mut(&mut self, id: &str) -> Option<&mut Transaction> {
        self.transactions.get_mut(id)
    }

    /// Add a transaction to the system
    ///
    /// # Panics
    /// Panics if the transaction ID already exists
    pub fn add_transaction(&mut self, transaction: Transaction) {
        let id = transaction.id().to_string();
        assert!(
            !self.transactions.contains_key(&id),
            "Transaction ID {} already exists",
            id
        );
        self.transactions.insert(id, transaction);
    }

    pub fn transactions(&self) -> &BTreeMap<String, Transaction> {
        &self.transactions
    }

    pub fn transactions_mut(&mut self) -> &mut BTreeMap<String, Transaction> {
        &mut self.transactions
    }

    pub fn num_transactions(&self) -> usize {
        self.transactions.len()
    }

    // =========================================================================
    // Queue 2 (RTGS queue)
    // =========================================================================

    /// Queue 2 ordering token: priority band first (higher priority = lower
    /// token), entry sequence second. Lower tokens settle first.
    pub fn assign_rtgs_token(&mut self, priority: u8) -> u64 {
        let seq = self.next_entry_seq;
        self.next_entry_seq += 1;
        ((10u64 - priority.min(10) as u64) << 48) | seq
    }

    /// Current value of the entry-sequence counter (checkpointing)
    pub fn next_entry_seq(&self) -> u64 {
        self.next_entry_seq
    }

    /// Add a transaction to the RTGS queue
    ///
    /// # Panics
    /// Panics if the transaction ID doesn't exist
    pub fn queue_transaction(&mut self, transaction_id: String) {
        assert!(
            self.transactions.contains_key(&transaction_id),
            "Cannot queue non-existent transaction {}",
            transaction_id
        );
        self.rtgs_queue.push(transaction_id);
    }

    pub fn queue_size(&self) -> usize {
        self.rtgs_queue.len()
    }

    pub fn rtgs_queue(&self) -> &Vec<String> {
        &self.rtgs_queue
    }

    pub fn rtgs_queue_mut(&mut self) -> &mut Vec<String> {
        &mut self.rtgs_queue
    }

    /// Total remaining value in Queue 2
    pub fn queue_value(&self) -> i64 {
        self.rtgs_queue
            .iter()
            .filter_map(|tx_id| self.transactions.get(tx_id))
            .map(|tx| tx.remaining_amount())
            .sum()
    }

    /// Sort Queue 2 by the rtgs_priority token (ascending). Transactions
    /// without a token sort last, by ID.
    pub fn sort_rtgs_queue(&mut self) {
        let transactions = &self.transactions;
        self.rtgs_queue.sort_by(|a, b| {
            let ta = transactions.get(a).and_then(|t| t.rtgs_priority());
            let tb = transactions.get(b).and_then(|t| t.rtgs_priority());
            match (ta, tb) {
                (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => a.cmp(b),
            }
        });
    }

    /// Rebuild Queue 2 secondary indices. Must be called after any batch of
    /// mutations to rtgs_queue.
    pub fn rebuild_queue2_index(&mut self) {
        self.queue2_index.rebuild(&self.rtgs_queue, &self.transactions);
    }

    pub fn queue2_index(&self) -> &Queue2Index {
        &self.queue2_index
    }

    // =========================================================================
    // Queue 1 aggregates
    // =========================================================================

    /// Total number of transactions across all agents' internal queues
    pub fn total_internal_queue_size(&self) -> usize {
        self.agents
            .values()
            .map(|agent| agent.outgoing_queue_size())
            .sum()
    }

    /// Total remaining value across all agents' internal queues
    pub fn total_internal_queue_value(&self) -> i64 {
        self.agents
            .values()
            .flat_map(|agent| agent.outgoing_queue())
            .filter_map(|tx_id| self.transactions.get(tx_id))
            .map(|tx| tx.remaining_amount())
            .sum()
    }

    /// Remaining value in one agent's internal queue
    pub fn agent_queue_value(&self, agent_id: &str) -> i64 {
        self.agents
            .get(agent_id)
            .map(|agent| {
                agent
                    .outgoing_queue()
                    .iter()
                    .filter_map(|tx_id| self.transactions.get(tx_id))
                    .map(|tx| tx.remaining_amount())
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Liquidity the agent would need beyond its effective liquidity to clear
    /// its whole Queue 1 right now (0 when fully covered)
    pub fn agent_queue1_liquidity_gap(&self, agent_id: &str) -> i64 {
        let Some(agent) = self.agents.get(agent_id) else {
            return 0;
        };
        let queue_value = self.agent_queue_value(agent_id);
        (queue_value - agent.effective_liquidity()).max(0)
    }

    // =========================================================================
    // Invariant checks
    // =========================================================================

    /// Sum of all agent balances. Constant under settlement; moves only with
    /// scenario direct transfers.
    pub fn total_balance(&self) -> i64 {
        self.agents.values().map(|agent| agent.balance()).sum()
    }

    /// Verify every agent satisfies the overdraft invariant
    pub fn check_overdraft_invariant(&self) -> Result<(), String> {
        for agent in self.agents.values() {
            if agent.balance() < -agent.allowed_overdraft_limit() {
                return Err(format!(
                    "Agent {} balance {} breaches overdraft limit {}",
                    agent.id(),
                    agent.balance(),
                    agent.allowed_overdraft_limit()
                ));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Event log
    // =========================================================================

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn event_log_mut(&mut self) -> &mut EventLog {
        &mut self.event_log
    }

    pub fn log_event(&mut self, event: Event) {
        self.event_log.log(event);
    }
}
