//! Event logging for simulation replay and auditing.
//!
//! The event stream is the replay-identity contract: every observable state
//! change is captured as a self-contained record, and replaying the stream in
//! order reproduces all downstream output without querying live state.
//!
//! Events are emitted in a total order per tick: tick-step order first, then
//! agent lexicographic, then transaction lexicographic. The position of an
//! event in the log is its sequence number.
//!
//! # Event Types
//!
//! - **Arrival**: new transaction enters Queue 1 (or is rejected at the cap)
//! - **Policy**: per-transaction release decision
//! - **Settlement**: RTGS immediate settlement, Queue 2 submission
//! - **LSM**: bilateral offsets and cycle settlements
//! - **Cost**: per-agent per-tick accruals, one-time penalties
//! - **EOD**: end-of-day processing

use crate::costs::CostBreakdown;
use serde::{Deserialize, Serialize};

/// Simulation event capturing a state change.
///
/// All events include a tick number for temporal ordering. Money fields are
/// i64 cents, always.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum Event {
    /// New transaction arrived in the sender's Queue 1
    TransactionArrived {
        tick: usize,
        tx_id: String,
        sender_id: String,
        receiver_id: String,
        amount: i64,
        deadline_tick: usize,
        priority: u8,
        is_divisible: bool,
    },

    /// An arrival was rejected because Queue 2 hit its soft cap
    ArrivalRejected {
        tick: usize,
        sender_id: String,
        receiver_id: String,
        amount: i64,
        queue2_size: usize,
    },

    /// Policy decided what to do with a Queue 1 transaction
    PolicyDecision {
        tick: usize,
        agent_id: String,
        tx_id: String,
        /// "Release" | "Hold" | "Drop" | "Split"
        action: String,
        reason: Option<String>,
    },

    /// Transaction moved from Queue 1 into the central RTGS queue
    TransactionSubmittedToQueue2 {
        tick: usize,
        agent_id: String,
        tx_id: String,
        rtgs_priority: u64,
    },

    /// Transaction settled individually against the sender's liquidity
    RtgsImmediateSettlement {
        tick: usize,
        tx_id: String,
        sender_id: String,
        receiver_id: String,
        amount: i64,
    },

    /// All queued transactions between two agents settled against the net flow
    LsmBilateralOffset {
        tick: usize,
        agent_a: String,
        agent_b: String,
        amount_a_to_b: i64,
        amount_b_to_a: i64,
        tx_ids: Vec<String>,
    },

    /// A payment cycle settled atomically with net-position funding
    LsmCycleSettled {
        tick: usize,
        /// Agent IDs in cycle order, first repeated at the end
        agents: Vec<String>,
        tx_ids: Vec<String>,
        /// Gross value across every settled transaction
        total_value: i64,
        /// Net position per agent, in `agents` order (without the closing repeat)
        net_positions: Vec<i64>,
        max_net_outflow: i64,
    },

    /// Transaction crossed its deadline unsettled; one-time penalty charged
    TransactionOverdue {
        tick: usize,
        agent_id: String,
        tx_id: String,
        penalty: i64,
    },

    /// Policy split a transaction into child transactions
    TransactionSplit {
        tick: usize,
        agent_id: String,
        tx_id: String,
        num_splits: usize,
        child_ids: Vec<String>,
        friction_cost: i64,
    },

    /// Policy dropped a transaction from Queue 1
    TransactionDropped {
        tick: usize,
        agent_id: String,
        tx_id: String,
        reason: String,
    },

    /// Agent posted collateral to increase available credit
    CollateralPosted {
        tick: usize,
        agent_id: String,
        amount: i64,
        new_total: i64,
    },

    /// Agent withdrew collateral to reduce opportunity cost
    CollateralWithdrawn {
        tick: usize,
        agent_id: String,
        amount: i64,
        new_total: i64,
    },

    /// Costs accrued for an agent this tick
    CostAccrued {
        tick: usize,
        agent_id: String,
        costs: CostBreakdown,
    },

    /// End-of-day penalty for a transaction left in Queue 1
    EodPenalty {
        tick: usize,
        day: usize,
        agent_id: String,
        tx_id: String,
        penalty: i64,
    },

    /// A scheduled scenario intervention executed
    ScenarioEventExecuted {
        tick: usize,
        kind: String,
        details: serde_json::Value,
    },

    /// Policy evaluation failed arithmetically; safe default action applied
    PolicyEvalFailed {
        tick: usize,
        agent_id: String,
        tx_id: Option<String>,
        error: String,
        fallback_action: String,
    },
}

impl Event {
    /// Get the tick number when this event occurred
    pub fn tick(&self) -> usize {
        match self {
            Event::TransactionArrived { tick, .. }
            | Event::ArrivalRejected { tick, .. }
            | Event::PolicyDecision { tick, .. }
            | Event::TransactionSubmittedToQueue2 { tick, .. }
            | Event::RtgsImmediateSettlement { tick, .. }
            | Event::LsmBilateralOffset { tick, .. }
            | Event::LsmCycleSettled { tick, .. }
            | Event::TransactionOverdue { tick, .. }
            | Event::TransactionSplit { tick, .. }
            | Event::TransactionDropped { tick, .. }
            | Event::CollateralPosted { tick, .. }
            | Event::CollateralWithdrawn { tick, .. }
            | Event::CostAccrued { tick, .. }
            | Event::EodPenalty { tick, .. }
            | Event::ScenarioEventExecuted { tick, .. }
            | Event::PolicyEvalFailed { tick, .. } => *tick,
        }
    }

    /// Get a short description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::TransactionArrived { .. } => "TransactionArrived",
            Event::ArrivalRejected { .. } => "ArrivalRejected",
            Event::PolicyDecision { .. } => "PolicyDecision",
            Event::TransactionSubmittedToQueue2 { .. } => "TransactionSubmittedToQueue2",
            Event::RtgsImmediateSettlement { .. } => "RtgsImmediateSettlement",
            Event::LsmBilateralOffset { .. } => "LsmBilateralOffset",
            Event::LsmCycleSettled { .. } => "LsmCycleSettled",
            Event::TransactionOverdue { .. } => "TransactionOverdue",
            Event::TransactionSplit { .. } => "TransactionSplit",
            Event::TransactionDropped { .. } => "TransactionDropped",
            Event::CollateralPosted { .. } => "CollateralPosted",
            Event::CollateralWithdrawn { .. } => "CollateralWithdrawn",
            Event::CostAccrued { .. } => "CostAccrued",
            Event::EodPenalty { .. } => "EodPenalty",
            Event::ScenarioEventExecuted { .. } => "ScenarioEventExecuted",
            Event::PolicyEvalFailed { .. } => "PolicyEvalFailed",
        }
    }

    /// Get transaction ID if event relates to a specific transaction
    pub fn tx_id(&self) -> Option<&str> {
        match self {
            Event::TransactionArrived { tx_id, .. }
            | Event::PolicyDecision { tx_id, .. }
            | Event::TransactionSubmittedToQueue2 { tx_id, .. }
            | Event::RtgsImmediateSettlement { tx_id, .. }
            | Event::TransactionOverdue { tx_id, .. }
            | Event::TransactionSplit { tx_id, .. }
            | Event::TransactionDropped { tx_id, .. }
            | Event::EodPenalty { tx_id, .. } => Some(tx_id),
            Event::PolicyEvalFailed { tx_id, .. } => tx_id.as_deref(),
            _ => None,
        }
    }

    /// Get agent ID if event relates to a specific agent
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Event::TransactionArrived { sender_id, .. }
            | Event::ArrivalRejected { sender_id, .. }
            | Event::RtgsImmediateSettlement { sender_id, .. } => Some(sender_id),
            Event::PolicyDecision { agent_id, .. }
            | Event::TransactionSubmittedToQueue2 { agent_id, .. }
            | Event::TransactionOverdue { agent_id, .. }
            | Event::TransactionSplit { agent_id, .. }
            | Event::TransactionDropped { agent_id, .. }
            | Event::CollateralPosted { agent_id, .. }
            | Event::CollateralWithdrawn { agent_id, .. }
            | Event::CostAccrued { agent_id, .. }
            | Event::EodPenalty { agent_id, .. }
            | Event::PolicyEvalFailed { agent_id, .. } => Some(agent_id),
            _ => None,
        }
    }
}

/// Event log for storing and querying simulation events.
///
/// The position of an event in the log is its sequence number; the log is
/// append-only during a run.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Append an event; returns its sequence number
    pub fn log(&mut self, event: Event) -> usize {
        self.events.push(event);
        self.events.len() - 1
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events with `from_tick <= tick < to_tick`, in sequence order
    pub fn events_between(&self, from_tick: usize, to_tick: usize) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.tick() >= from_tick && e.tick() < to_tick)
            .collect()
    }

    pub fn events_at_tick(&self, tick: usize) -> Vec<&Event> {
        self.events.iter().filter(|e| e.tick() == tick).collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_for_tx(&self, tx_id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.tx_id() == Some(tx_id))
            .collect()
    }

    pub fn events_for_agent(&self, agent_id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.agent_id() == Some(agent_id))
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrival(tick: usize, tx_id: &str, sender: &str) -> Event {
        Event::TransactionArrived {
            tick,
            tx_id: tx_id.to_string(),
            sender_id: sender.to_string(),
            receiver_id: "BANK_B".to_string(),
            amount: 100_000,
            deadline_tick: tick + 10,
            priority: 5,
            is_divisible: false,
        }
    }

    #[test]
    fn test_event_accessors() {
        let event = arrival(42, "tx_001", "BANK_A");
        assert_eq!(event.tick(), 42);
        assert_eq!(event.event_type(), "TransactionArrived");
        assert_eq!(event.tx_id(), Some("tx_001"));
        assert_eq!(event.agent_id(), Some("BANK_A"));
    }

    #[test]
    fn test_log_sequence_numbers() {
        let mut log = EventLog::new();
        assert_eq!(log.log(arrival(1, "tx_001", "BANK_A")), 0);
        assert_eq!(log.log(arrival(1, "tx_002", "BANK_A")), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_query_by_tick_range() {
        let mut log = EventLog::new();
        log.log(arrival(1, "tx_001", "BANK_A"));
        log.log(arrival(2, "tx_002", "BANK_A"));
        log.log(arrival(3, "tx_003", "BANK_A"));

        assert_eq!(log.events_between(1, 3).len(), 2);
        assert_eq!(log.events_at_tick(2).len(), 1);
    }

    #[test]
    fn test_serde_round_trip_preserves_event() {
        let event = Event::LsmCycleSettled {
            tick: 7,
            agents: vec!["A".into(), "B".into(), "C".into(), "A".into()],
            tx_ids: vec!["t1".into(), "t2".into(), "t3".into()],
            total_value: 600_000,
            net_positions: vec![0, 0, 0],
            max_net_outflow: 0,
        };

        let json = serde_json::to_string(&event).unwrap();
        let restored: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event, restored);
    }

    #[test]
    fn test_money_fields_serialize_as_integers() {
        let event = arrival(1, "tx_001", "BANK_A");
        let value = serde_json::to_value(&event).unwrap();
        assert!(value["amount"].is_i64());
    }
}
