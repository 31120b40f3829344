//! Incremental pair index for bilateral offsetting
//!
//! Maintains per-direction flow buckets and a ready set of bilateral pairs
//! (both directions have queued flow), so the bilateral pass pops pairs in a
//! deterministic priority order without rescanning the queue.
//!
//! Priority: larger liquidity release first (min of the two directional
//! sums), ties broken lexicographically on the canonical (agent_a, agent_b)
//! ordering.

use crate::models::state::SimulationState;
use std::collections::{BTreeMap, BTreeSet};

/// Key for ready bilateral pairs with deterministic priority ordering
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ReadyKey {
    /// Negated liquidity release: BTreeSet pops smallest first, so negation
    /// turns it into a max-priority pop
    neg_liquidity: i64,

    /// First agent (lexicographically smaller)
    agent_a: String,

    /// Second agent (lexicographically larger)
    agent_b: String,
}

impl ReadyKey {
    /// Create a key, canonicalizing so agent_a < agent_b
    pub fn new(liquidity_release: i64, agent_x: &str, agent_y: &str) -> Self {
        let (agent_a, agent_b) = if agent_x < agent_y {
            (agent_x.to_string(), agent_y.to_string())
        } else {
            (agent_y.to_string(), agent_x.to_string())
        };

        Self {
            neg_liquidity: -liquidity_release,
            agent_a,
            agent_b,
        }
    }

    pub fn agent_a(&self) -> &str {
        &self.agent_a
    }

    pub fn agent_b(&self) -> &str {
        &self.agent_b
    }

    pub fn liquidity_release(&self) -> i64 {
        -self.neg_liquidity
    }
}

impl Ord for ReadyKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.neg_liquidity
            .cmp(&other.neg_liquidity)
            .then_with(|| self.agent_a.cmp(&other.agent_a))
            .then_with(|| self.agent_b.cmp(&other.agent_b))
    }
}

impl PartialOrd for ReadyKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Bucket of transactions flowing in one direction (sender → receiver)
#[derive(Debug, Clone, Default)]
struct PairBucket {
    /// Sum of remaining amounts in this direction
    sum: i64,

    /// Transaction IDs in enqueue order
    tx_ids: Vec<String>,
}

impl PairBucket {
    fn add(&mut self, tx_id: &str, amount: i64) {
        self.sum = self.sum.saturating_add(amount);
        self.tx_ids.push(tx_id.to_string());
    }

    fn remove(&mut self, tx_id: &str, amount: i64) {
        self.sum = self.sum.saturating_sub(amount);
        self.tx_ids.retain(|id| id != tx_id);
    }

    fn is_empty(&self) -> bool {
        self.sum == 0 && self.tx_ids.is_empty()
    }
}

/// Incremental index of bilateral payment pairs in Queue 2
#[derive(Debug, Default)]
pub struct PairIndex {
    /// Adjacency: sender → receiver → bucket
    adj: BTreeMap<String, BTreeMap<String, PairBucket>>,

    /// Ready pairs (both directions have flow), sorted by priority
    ready: BTreeSet<ReadyKey>,
}

impl PairIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from the current Queue 2 contents
    pub fn from_queue(state: &SimulationState) -> Self {
        let mut index = Self::new();

        for tx_id in state.rtgs_queue() {
            if let Some(tx) = state.get_transaction(tx_id) {
                index.add_transaction(tx_id, tx.sender_id(), tx.receiver_id(), tx.remaining_amount());
            }
        }

        index
    }

    /// Add a transaction, updating the ready set
    pub fn add_transaction(&mut self, tx_id: &str, sender: &str, receiver: &str, amount: i64) {
        self.adj
            .entry(sender.to_string())
            .or_default()
            .entry(receiver.to_string())
            .or_default()
            .add(tx_id, amount);

        self.update_ready(sender, receiver);
    }

    /// Remove a transaction, updating the ready set
    pub fn remove_transaction(&mut self, tx_id: &str, sender: &str, receiver: &str, amount: i64) {
        if let Some(receivers) = self.adj.get_mut(sender) {
            if let Some(bucket) = receivers.get_mut(receiver) {
                bucket.remove(tx_id, amount);
                if bucket.is_empty() {
                    receivers.remove(receiver);
                }
            }
            if receivers.is_empty() {
                self.adj.remove(sender);
            }
        }

        self.update_ready(sender, receiver);
    }

    /// Pop the highest-priority ready pair
    pub fn pop_ready(&mut self) -> Option<ReadyKey> {
        let key = self.ready.iter().next().cloned()?;
        self.ready.remove(&key);
        Some(key)
    }

    /// Sum of queued flow in one direction
    pub fn flow_sum(&self, sender: &str, receiver: &str) -> i64 {
        self.adj
            .get(sender)
            .and_then(|receivers| receivers.get(receiver))
            .map(|bucket| bucket.sum)
            .unwrap_or(0)
    }

    /// Transaction IDs for a ready pair, both directions: (a→b, b→a)
    pub fn pair_transactions(&self, key: &ReadyKey) -> (Vec<String>, Vec<String>) {
        let txs = |sender: &str, receiver: &str| {
            self.adj
                .get(sender)
                .and_then(|r| r.get(receiver))
                .map(|b| b.tx_ids.clone())
                .unwrap_or_default()
        };
        (
            txs(key.agent_a(), key.agent_b()),
            txs(key.agent_b(), key.agent_a()),
        )
    }

    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    /// Recompute this pair's membership in the ready set
    fn update_ready(&mut self, agent_x: &str, agent_y: &str) {
        let sum_xy = self.flow_sum(agent_x, agent_y);
        let sum_yx = self.flow_sum(agent_y, agent_x);

        let (agent_a, agent_b) = if agent_x < agent_y {
            (agent_x, agent_y)
        } else {
            (agent_y, agent_x)
        };

        // The old key carries a stale priority; remove it by pair identity
        self.ready
            .retain(|k| !(k.agent_a() == agent_a && k.agent_b() == agent_b));

        if sum_xy > 0 && sum_yx > 0 {
            let liquidity_release = sum_xy.min(sum_yx);
            self.ready.insert(ReadyKey::new(liquidity_release, agent_a, agent_b));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_key_canonicalizes() {
        let key1 = ReadyKey::new(1000, "B", "A");
        let key2 = ReadyKey::new(1000, "A", "B");

        assert_eq!(key1.agent_a(), "A");
        assert_eq!(key1.agent_b(), "B");
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_higher_release_pops_first() {
        let mut index = PairIndex::new();
        index.add_transaction("t1", "A", "B", 100_000);
        index.add_transaction("t2", "B", "A", 50_000);
        index.add_transaction("t3", "C", "D", 500_000);
        index.add_transaction("t4", "D", "C", 400_000);

        assert_eq!(index.ready_count(), 2);
        let first = index.pop_ready().unwrap();
        assert_eq!(first.agent_a(), "C");
        assert_eq!(first.liquidity_release(), 400_000);
    }

    #[test]
    fn test_pair_not_ready_until_both_directions() {
        let mut index = PairIndex::new();
        index.add_transaction("t1", "A", "B", 100_000);
        assert_eq!(index.ready_count(), 0);

        index.add_transaction("t2", "B", "A", 50_000);
        assert_eq!(index.ready_count(), 1);

        index.remove_transaction("t2", "B", "A", 50_000);
        assert_eq!(index.ready_count(), 0);
    }

    #[test]
    fn test_pair_transactions_both_directions() {
        let mut index = PairIndex::new();
        index.add_transaction("t1", "A", "B", 100_000);
        index.add_transaction("t2", "A", "B", 200_000);
        index.add_transaction("t3", "B", "A", 50_000);

        let key = index.pop_ready().unwrap();
        let (ab, ba) = index.pair_transactions(&key);
        assert_eq!(ab, vec!["t1".to_string(), "t2".to_string()]);
        assert_eq!(ba, vec!["t3".to_string()]);
    }
}
