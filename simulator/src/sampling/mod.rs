//! Bootstrap sampling of historical transaction flows
//!
//! The optimization loop evaluates candidate policies against resamples of
//! the context simulation's transaction history rather than fresh stochastic
//! arrivals: the population distribution stays fixed while the policy
//! varies. Three resampling methods:
//!
//! - **bootstrap**: draw pool-size transactions with replacement
//! - **permutation**: same transactions, arrival slots shuffled
//! - **stratified**: bootstrap within priority bands, preserving band sizes
//!
//! All draws go through the injected deterministic RNG.

use crate::costs::{get_priority_band, PriorityBand};
use crate::orchestrator::Orchestrator;
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};

/// One captured historical payment instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalTransaction {
    pub sender_id: String,
    pub receiver_id: String,
    pub amount: i64,
    pub priority: u8,
    pub arrival_tick: usize,
    pub deadline_tick: usize,
    pub divisible: bool,
}

impl HistoricalTransaction {
    /// Deadline window relative to arrival
    pub fn deadline_offset(&self) -> usize {
        self.deadline_tick.saturating_sub(self.arrival_tick).max(1)
    }
}

/// Resampling method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMethod {
    Bootstrap,
    Permutation,
    Stratified,
}

/// The captured transaction pool of a context simulation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionPool {
    transactions: Vec<HistoricalTransaction>,
}

impl TransactionPool {
    /// Capture every original (non-split-child) transaction from a finished
    /// run, ordered by (arrival_tick, sender, receiver, amount) for
    /// determinism.
    pub fn capture(engine: &Orchestrator) -> Self {
        let mut transactions: Vec<HistoricalTransaction> = engine
            .state()
            .transactions()
            .values()
            .filter(|tx| !tx.is_split())
            .map(|tx| HistoricalTransaction {
                sender_id: tx.sender_id().to_string(),
                receiver_id: tx.receiver_id().to_string(),
                amount: tx.amount(),
                priority: tx.priority(),
                arrival_tick: tx.arrival_tick(),
                deadline_tick: tx.deadline_tick(),
                divisible: tx.is_divisible(),
            })
            .collect();
        transactions.sort_by(|a, b| {
            a.arrival_tick
                .cmp(&b.arrival_tick)
                .then_with(|| a.sender_id.cmp(&b.sender_id))
                .then_with(|| a.receiver_id.cmp(&b.receiver_id))
                .then_with(|| a.amount.cmp(&b.amount))
        });
        Self { transactions }
    }

    pub fn from_transactions(transactions: Vec<HistoricalTransaction>) -> Self {
        Self { transactions }
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn transactions(&self) -> &[HistoricalTransaction] {
        &self.transactions
    }

    /// Agents appearing anywhere in the pool, sorted
    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .transactions
            .iter()
            .flat_map(|tx| [tx.sender_id.clone(), tx.receiver_id.clone()])
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Draw one sample with the given method
    pub fn sample(&self, method: SamplingMethod, rng: &mut RngManager) -> Vec<HistoricalTransaction> {
        match method {
            SamplingMethod::Bootstrap => self.bootstrap(rng),
            SamplingMethod::Permutation => self.permutation(rng),
            SamplingMethod::Stratified => self.stratified(rng),
        }
    }

    /// Pool-size draws with replacement
    fn bootstrap(&self, rng: &mut RngManager) -> Vec<HistoricalTransaction> {
        if self.transactions.is_empty() {
            return Vec::new();
        }
        (0..self.transactions.len())
            .map(|_| {
                let idx = rng.range(0, self.transactions.len() as i64) as usize;
                self.transactions[idx].clone()
            })
            .collect()
    }

    /// Same transactions, arrival slots shuffled (Fisher-Yates). Each
    /// transaction keeps its relative deadline window.
    fn permutation(&self, rng: &mut RngManager) -> Vec<HistoricalTransaction> {
        let slots: Vec<usize> = self.transactions.iter().map(|tx| tx.arrival_tick).collect();
        let mut shuffled = self.transactions.clone();
        for i in (1..shuffled.len()).rev() {
            let j = rng.range(0, i as i64 + 1) as usize;
            shuffled.swap(i, j);
        }
        for (tx, slot) in shuffled.iter_mut().zip(slots.iter()) {
            let offset = tx.deadline_offset();
            tx.arrival_tick = *slot;
            tx.deadline_tick = slot + offset;
        }
        shuffled
    }

    /// Bootstrap within each priority band, preserving band sizes
    fn stratified(&self, rng: &mut RngManager) -> Vec<HistoricalTransaction> {
        let mut sample = Vec::with_capacity(self.transactions.len());
        for band in [PriorityBand::Urgent, PriorityBand::Normal, PriorityBand::Low] {
            let stratum: Vec<&HistoricalTransaction> = self
                .transactions
                .iter()
                .filter(|tx| get_priority_band(tx.priority) == band)
                .collect();
            for _ in 0..stratum.len() {
                let idx = rng.range(0, stratum.len() as i64) as usize;
                sample.push(stratum[idx].clone());
            }
        }
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> TransactionPool {
        let tx = |sender: &str, amount: i64, priority: u8, arrival: usize| HistoricalTransaction {
            sender_id: sender.to_string(),
            receiver_id: "BANK_Z".to_string(),
            amount,
            priority,
            arrival_tick: arrival,
            deadline_tick: arrival + 10,
            divisible: false,
        };
        TransactionPool::from_transactions(vec![
            tx("BANK_A", 100, 9, 0),
            tx("BANK_A", 200, 5, 1),
            tx("BANK_B", 300, 5, 2),
            tx("BANK_B", 400, 1, 3),
            tx("BANK_C", 500, 1, 4),
        ])
    }

    #[test]
    fn test_bootstrap_preserves_size_and_membership() {
        let pool = pool();
        let mut rng = RngManager::new(42);
        let sample = pool.sample(SamplingMethod::Bootstrap, &mut rng);

        assert_eq!(sample.len(), pool.len());
        for tx in &sample {
            assert!(pool.transactions().contains(tx));
        }
    }

    #[test]
    fn test_bootstrap_is_deterministic() {
        let pool = pool();
        let a = pool.sample(SamplingMethod::Bootstrap, &mut RngManager::new(7));
        let b = pool.sample(SamplingMethod::Bootstrap, &mut RngManager::new(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_permutation_keeps_multiset_and_slots() {
        let pool = pool();
        let mut rng = RngManager::new(13);
        let sample = pool.sample(SamplingMethod::Permutation, &mut rng);

        assert_eq!(sample.len(), pool.len());

        // Arrival slots are exactly the original slots
        let mut original_slots: Vec<usize> =
            pool.transactions().iter().map(|t| t.arrival_tick).collect();
        let mut sample_slots: Vec<usize> = sample.iter().map(|t| t.arrival_tick).collect();
        original_slots.sort_unstable();
        sample_slots.sort_unstable();
        assert_eq!(original_slots, sample_slots);

        // The amounts are a permutation, not a resample
        let mut original_amounts: Vec<i64> =
            pool.transactions().iter().map(|t| t.amount).collect();
        let mut sample_amounts: Vec<i64> = sample.iter().map(|t| t.amount).collect();
        original_amounts.sort_unstable();
        sample_amounts.sort_unstable();
        assert_eq!(original_amounts, sample_amounts);
    }

    #[test]
    fn test_stratified_preserves_band_sizes() {
        let pool = pool();
        let mut rng = RngManager::new(99);
        let sample = pool.sample(SamplingMethod::Stratified, &mut rng);

        assert_eq!(sample.len(), pool.len());
        let count_band = |txs: &[HistoricalTransaction], band: PriorityBand| {
            txs.iter()
                .filter(|t| get_priority_band(t.priority) == band)
                .count()
        };
        for band in [PriorityBand::Urgent, PriorityBand::Normal, PriorityBand::Low] {
            assert_eq!(
                count_band(&sample, band),
                count_band(pool.transactions(), band),
                "band sizes must be preserved"
            );
        }
    }

    #[test]
    fn test_agent_ids_sorted_unique() {
        let pool = pool();
        assert_eq!(
            pool.agent_ids(),
            vec!["BANK_A", "BANK_B", "BANK_C", "BANK_Z"]
        );
    }
}
