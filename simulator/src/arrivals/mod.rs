//! Arrival generation: deterministic transaction creation.
//!
//! Each agent draws its per-tick arrival count from a Poisson process and
//! fills in amount, counterparty, deadline, and priority from configured
//! distributions. All draws go through the engine-owned RNG, so the same
//! seed and config always produce the same arrival stream.
//!
//! Scenario events mutate the live configs (rate multipliers, counterparty
//! weights, deadline windows); the base configs keep the original values so
//! multipliers compose against the configured baseline, not against each
//! other.

use crate::models::Transaction;
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Priority distribution types for transaction generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PriorityDistribution {
    /// Fixed priority (all transactions get same value)
    Fixed { value: u8 },

    /// Categorical distribution (discrete values with weights)
    Categorical { values: Vec<u8>, weights: Vec<f64> },

    /// Uniform distribution (random integer in [min, max])
    Uniform { min: u8, max: u8 },
}

impl Default for PriorityDistribution {
    fn default() -> Self {
        PriorityDistribution::Fixed { value: 5 }
    }
}

/// Amount distribution types for transaction generation.
///
/// Amounts are drawn as f64 and floored to integer cents, clamped to at
/// least 1 cent. Normal and log-normal require an explicit spread.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AmountDistribution {
    /// Uniform distribution between min and max cents (inclusive)
    Uniform { min: i64, max: i64 },

    /// Normal distribution with mean and standard deviation in cents
    Normal { mean: i64, std_dev: i64 },

    /// Log-normal distribution (parameters on the log scale)
    LogNormal { mean: f64, std_dev: f64 },

    /// Exponential distribution with the given rate (1/mean-cents)
    Exponential { rate: f64 },
}

/// Daily time window during which an agent generates arrivals,
/// as fractions of the day: `[start_frac, end_frac)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_frac: f64,
    pub end_frac: f64,
}

impl TimeWindow {
    pub fn contains(&self, day_progress: f64) -> bool {
        day_progress >= self.start_frac && day_progress < self.end_frac
    }
}

/// Configuration for transaction arrivals for a single agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrivalConfig {
    /// Expected number of arrivals per tick (Poisson λ parameter)
    pub rate_per_tick: f64,

    /// Distribution for transaction amounts
    pub amount_distribution: AmountDistribution,

    /// Counterparty selection weights (agent_id → weight).
    /// Empty = uniform selection across all other agents.
    #[serde(default)]
    pub counterparty_weights: BTreeMap<String, f64>,

    /// Deadline range in ticks from arrival (min, max), both >= 1
    pub deadline_range: (usize, usize),

    /// Priority distribution for generated transactions
    #[serde(default)]
    pub priority_distribution: PriorityDistribution,

    /// Whether generated transactions are divisible
    #[serde(default)]
    pub divisible: bool,

    /// Optional daily windows outside which the arrival rate is zero
    #[serde(default)]
    pub time_windows: Vec<TimeWindow>,
}

/// Generator for transaction arrivals across all agents.
///
/// Serializable so checkpoints capture the live (scenario-mutated) configs
/// and the ID counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrivalGenerator {
    /// Per-agent arrival configurations (mutated by scenario events)
    configs: BTreeMap<String, ArrivalConfig>,

    /// Base configurations (original values, never mutated)
    base_configs: BTreeMap<String, ArrivalConfig>,

    /// All agent IDs, sorted (for uniform counterparty selection)
    all_agent_ids: Vec<String>,

    /// Sequential transaction ID counter. Generated IDs are deterministic so
    /// event streams are byte-identical across runs with the same seed.
    next_tx_id: usize,

    /// Episode end tick (deadlines are capped here)
    episode_end_tick: usize,

    /// Ticks per day (time windows, EOD deadline cap)
    ticks_per_day: usize,

    /// Whether to cap deadlines at the end of the current day
    deadline_cap_at_eod: bool,
}

impl ArrivalGenerator {
    pub fn new(
        configs: BTreeMap<String, ArrivalConfig>,
        mut all_agent_ids: Vec<String>,
        episode_end_tick: usize,
        ticks_per_day: usize,
        deadline_cap_at_eod: bool,
    ) -> Self {
        all_agent_ids.sort();
        Self {
            base_configs: configs.clone(),
            configs,
            all_agent_ids,
            next_tx_id: 0,
            episode_end_tick,
            ticks_per_day,
            deadline_cap_at_eod,
        }
    }

    /// Generate arrivals for one agent at the given tick.
    ///
    /// Draws are consumed in a fixed order (count, then per-transaction:
    /// amount, counterparty, deadline, priority) so the stream is stable
    /// under replay.
    pub fn generate_for_agent(
        &mut self,
        agent_id: &str,
        tick: usize,
        rng: &mut RngManager,
    ) -> Vec<Transaction> {
        let Some(config) = self.configs.get(agent_id).cloned() else {
            return Vec::new();
        };

        if !config.time_windows.is_empty() {
            let day_progress =
                (tick % self.ticks_per_day) as f64 / self.ticks_per_day as f64;
            if !config.time_windows.iter().any(|w| w.contains(day_progress)) {
                return Vec::new();
            }
        }

        let num_arrivals = rng.poisson(config.rate_per_tick);
        let mut transactions = Vec::with_capacity(num_arrivals as usize);

        for _ in 0..num_arrivals {
            let amount = self.sample_amount(&config.amount_distribution, rng);
            let Some(receiver) =
                self.select_counterparty(agent_id, &config.counterparty_weights, rng)
            else {
                continue;
            };
            let deadline = self.generate_deadline(tick, config.deadline_range, rng);
            let priority = self.sample_priority(&config.priority_distribution, rng);

            let tx_id = format!("tx_{:08}", self.next_tx_id);
            self.next_tx_id += 1;

            let mut tx =
                Transaction::new(agent_id.to_string(), receiver, amount, tick, deadline)
                    .with_id(tx_id)
                    .with_priority(priority);
            if config.divisible {
                tx = tx.divisible();
            }
            transactions.push(tx);
        }

        transactions
    }

    fn sample_amount(&self, distribution: &AmountDistribution, rng: &mut RngManager) -> i64 {
        let raw = match distribution {
            AmountDistribution::Uniform { min, max } => rng.range(*min, max + 1) as f64,
            AmountDistribution::Normal { mean, std_dev } => {
                rng.normal(*mean as f64, *std_dev as f64)
            }
            AmountDistribution::LogNormal { mean, std_dev } => rng.lognormal(*mean, *std_dev),
            AmountDistribution::Exponential { rate } => rng.exponential(*rate),
        };
        (raw.floor() as i64).max(1)
    }

    fn select_counterparty(
        &self,
        sender_id: &str,
        weights: &BTreeMap<String, f64>,
        rng: &mut RngManager,
    ) -> Option<String> {
        if weights.is_empty() {
            // Uniform over all other agents, in sorted order
            let candidates: Vec<&String> = self
                .all_agent_ids
                .iter()
                .filter(|id| id.as_str() != sender_id)
                .collect();
            if candidates.is_empty() {
                return None;
            }
            let idx = rng.range(0, candidates.len() as i64) as usize;
            return Some(candidates[idx].clone());
        }

        // Weighted draw in sorted key order for determinism
        let mut ids: Vec<&String> = weights.keys().filter(|id| id.as_str() != sender_id).collect();
        ids.sort();
        let ws: Vec<f64> = ids.iter().map(|id| weights[*id]).collect();
        rng.weighted_index(&ws).map(|idx| ids[idx].clone())
    }

    fn generate_deadline(
        &self,
        tick: usize,
        (min_offset, max_offset): (usize, usize),
        rng: &mut RngManager,
    ) -> usize {
        let offset = if max_offset > min_offset {
            rng.range(min_offset as i64, max_offset as i64 + 1) as usize
        } else {
            min_offset
        };
        let mut deadline = tick + offset.max(1);

        if self.deadline_cap_at_eod {
            let eod = (tick / self.ticks_per_day + 1) * self.ticks_per_day - 1;
            deadline = deadline.min(eod);
        }
        deadline = deadline.min(self.episode_end_tick);
        deadline.max(tick + 1)
    }

    fn sample_priority(&self, distribution: &PriorityDistribution, rng: &mut RngManager) -> u8 {
        match distribution {
            PriorityDistribution::Fixed { value } => (*value).min(10),
            PriorityDistribution::Uniform { min, max } => {
                if max > min {
                    rng.range(*min as i64, *max as i64 + 1) as u8
                } else {
                    *min
                }
            }
            PriorityDistribution::Categorical { values, weights } => rng
                .weighted_index(weights)
                .and_then(|idx| values.get(idx).copied())
                .unwrap_or(5)
                .min(10),
        }
    }

    // =========================================================================
    // Scenario-event hooks
    // =========================================================================

    /// Multiply every agent's rate against its configured baseline
    pub fn apply_global_rate_multiplier(&mut self, multiplier: f64) {
        for (agent_id, config) in self.configs.iter_mut() {
            if let Some(base) = self.base_configs.get(agent_id) {
                config.rate_per_tick = base.rate_per_tick * multiplier;
            }
        }
    }

    /// Multiply one agent's rate against its configured baseline
    pub fn apply_agent_rate_multiplier(&mut self, agent_id: &str, multiplier: f64) {
        if let (Some(config), Some(base)) =
            (self.configs.get_mut(agent_id), self.base_configs.get(agent_id))
        {
            config.rate_per_tick = base.rate_per_tick * multiplier;
        }
    }

    /// Set one counterparty weight; optionally rescale the others so the
    /// total weight is preserved.
    pub fn set_counterparty_weight(
        &mut self,
        agent_id: &str,
        counterparty: &str,
        new_weight: f64,
        rebalance_others: bool,
    ) {
        let Some(config) = self.configs.get_mut(agent_id) else {
            return;
        };

        let old_total: f64 = config.counterparty_weights.values().sum();
        let old_weight = config
            .counterparty_weights
            .get(counterparty)
            .copied()
            .unwrap_or(0.0);
        config
            .counterparty_weights
            .insert(counterparty.to_string(), new_weight);

        if rebalance_others {
            let others_old = old_total - old_weight;
            let others_target = (old_total - new_weight).max(0.0);
            if others_old > 0.0 {
                let scale = others_target / others_old;
                for (id, w) in config.counterparty_weights.iter_mut() {
                    if id != counterparty {
                        *w *= scale;
                    }
                }
            }
        }
    }

    /// Scale the deadline window of every agent against its baseline
    pub fn apply_deadline_window_multipliers(
        &mut self,
        min_multiplier: Option<f64>,
        max_multiplier: Option<f64>,
    ) {
        for (agent_id, config) in self.configs.iter_mut() {
            let Some(base) = self.base_configs.get(agent_id) else {
                continue;
            };
            let (base_min, base_max) = base.deadline_range;
            let new_min = min_multiplier
                .map(|m| ((base_min as f64) * m).round().max(1.0) as usize)
                .unwrap_or(config.deadline_range.0);
            let new_max = max_multiplier
                .map(|m| ((base_max as f64) * m).round().max(1.0) as usize)
                .unwrap_or(config.deadline_range.1);
            config.deadline_range = (new_min, new_max.max(new_min));
        }
    }

    /// Current live rate for an agent (tests, snapshots)
    pub fn rate_for(&self, agent_id: &str) -> Option<f64> {
        self.configs.get(agent_id).map(|c| c.rate_per_tick)
    }

    /// Current live counterparty weight (tests, snapshots)
    pub fn counterparty_weight(&self, agent_id: &str, counterparty: &str) -> Option<f64> {
        self.configs
            .get(agent_id)
            .and_then(|c| c.counterparty_weights.get(counterparty))
            .copied()
    }

    /// Current live deadline range (tests, snapshots)
    pub fn deadline_range_for(&self, agent_id: &str) -> Option<(usize, usize)> {
        self.configs.get(agent_id).map(|c| c.deadline_range)
    }
}
