//! Queue 2 secondary indices
//!
//! The RTGS queue is the primary structure; this module maintains secondary
//! views over it so that the hot paths (policy context construction, cost
//! accrual, LSM pair discovery) avoid O(agents × queue) rescans:
//!
//! - per-agent transaction lists with cached metrics
//!   {count, total value, nearest deadline}
//! - per-ordered-pair flow sums (sender → receiver)
//! - top-K counterparties per agent by queued outbound/inbound value
//!
//! The index is rebuilt after each batch of queue mutations via
//! `SimulationState::rebuild_queue2_index`. Invariant: after a rebuild, every
//! query answers exactly what a linear scan of the primary would answer;
//! tests verify this.

use std::collections::BTreeMap;

/// Cached metrics for an agent's Queue 2 transactions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentQueue2Metrics {
    /// Number of this agent's transactions in Queue 2
    pub count: usize,

    /// Nearest deadline among this agent's Queue 2 transactions
    /// (usize::MAX when the agent has no queued transactions)
    pub nearest_deadline: usize,

    /// Total remaining value of this agent's Queue 2 transactions
    pub total_value: i64,
}

/// Agent- and pair-indexed view of the RTGS queue
#[derive(Debug, Clone, Default)]
pub struct Queue2Index {
    /// Sender agent ID → tx IDs queued in Queue 2
    by_agent: BTreeMap<String, Vec<String>>,

    /// Cached per-agent metrics (computed at rebuild)
    metrics: BTreeMap<String, AgentQueue2Metrics>,

    /// (sender, receiver) → summed remaining value
    pair_flow: BTreeMap<(String, String), i64>,
}

impl Queue2Index {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from the current RTGS queue: single O(queue) scan
    pub fn rebuild(
        &mut self,
        rtgs_queue: &[String],
        transactions: &BTreeMap<String, crate::models::transaction::Transaction>,
    ) {
        self.by_agent.clear();
        self.metrics.clear();
        self.pair_flow.clear();

        for tx_id in rtgs_queue {
            let Some(tx) = transactions.get(tx_id) else {
                continue;
            };
            let sender = tx.sender_id().to_string();
            let receiver = tx.receiver_id().to_string();
            let value = tx.remaining_amount();

            self.by_agent
                .entry(sender.clone())
                .or_default()
                .push(tx_id.clone());

            let metrics = self.metrics.entry(sender.clone()).or_insert_with(|| {
                AgentQueue2Metrics {
                    count: 0,
                    nearest_deadline: usize::MAX,
                    total_value: 0,
                }
            });
            metrics.count += 1;
            metrics.total_value = metrics.total_value.saturating_add(value);
            metrics.nearest_deadline = metrics.nearest_deadline.min(tx.deadline_tick());

            *self.pair_flow.entry((sender, receiver)).or_insert(0) += value;
        }
    }

    /// Transactions queued by `agent_id`, in queue order
    pub fn agent_transactions(&self, agent_id: &str) -> &[String] {
        self.by_agent
            .get(agent_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Cached metrics for `agent_id` (zeroed default when absent)
    pub fn metrics(&self, agent_id: &str) -> AgentQueue2Metrics {
        self.metrics.get(agent_id).cloned().unwrap_or(AgentQueue2Metrics {
            count: 0,
            nearest_deadline: usize::MAX,
            total_value: 0,
        })
    }

    /// Summed queued value flowing sender → receiver
    pub fn pair_flow(&self, sender: &str, receiver: &str) -> i64 {
        self.pair_flow
            .get(&(sender.to_string(), receiver.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Top `k` counterparties of `agent_id` by queued outbound value.
    /// Ties broken lexicographically on counterparty ID.
    pub fn top_outflow_counterparties(&self, agent_id: &str, k: usize) -> Vec<(String, i64)> {
        let mut flows: Vec<(String, i64)> = self
            .pair_flow
            .iter()
            .filter(|((sender, _), _)| sender == agent_id)
            .map(|((_, receiver), value)| (receiver.clone(), *value))
            .collect();
        flows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        flows.truncate(k);
        flows
    }

    /// Top `k` counterparties of `agent_id` by queued inbound value.
    pub fn top_inflow_counterparties(&self, agent_id: &str, k: usize) -> Vec<(String, i64)> {
        let mut flows: Vec<(String, i64)> = self
            .pair_flow
            .iter()
            .filter(|((_, receiver), _)| receiver == agent_id)
            .map(|((sender, _), value)| (sender.clone(), *value))
            .collect();
        flows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        flows.truncate(k);
        flows
    }

    /// Top `k` counterparties of `agent_id` by |outbound − inbound| queued net
    pub fn top_bilateral_nets(&self, agent_id: &str, k: usize) -> Vec<(String, i64)> {
        let mut nets: BTreeMap<String, i64> = BTreeMap::new();
        for ((sender, receiver), value) in &self.pair_flow {
            if sender == agent_id {
                *nets.entry(receiver.clone()).or_insert(0) += value;
            } else if receiver == agent_id {
                *nets.entry(sender.clone()).or_insert(0) -= value;
            }
        }
        let mut entries: Vec<(String, i64)> = nets.into_iter().collect();
        entries.sort_by(|a, b| b.1.abs().cmp(&a.1.abs()).then(a.0.cmp(&b.0)));
        entries.truncate(k);
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.by_agent.is_empty()
    }

    /// Number of agents with Queue 2 transactions
    pub fn num_agents(&self) -> usize {
        self.by_agent.len()
    }
}
