//! Engine checkpointing
//!
//! Serializes the complete mutable state of an orchestrator (agents,
//! transactions, queues, RNG state, cost accumulators, the live arrival
//! configs) so a run can resume mid-episode. A SHA-256 hash over the payload
//! guards against corrupted or hand-edited checkpoints.
//!
//! Resuming at tick K and calling `tick()` produces exactly the state that
//! running K+1 ticks from scratch produces; the determinism tests rely on
//! this.

use super::engine::{Orchestrator, OrchestratorConfig, SimulationError};
use crate::arrivals::ArrivalGenerator;
use crate::core::time::TimeManager;
use crate::costs::CostAccumulator;
use crate::models::{Agent, SimulationState, Transaction};
use crate::policy::tree::create_policy;
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Serializable engine state
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointPayload {
    version: String,
    tick: usize,
    rng_state: u64,
    next_entry_seq: u64,
    agents: BTreeMap<String, Agent>,
    transactions: BTreeMap<String, Transaction>,
    rtgs_queue: Vec<String>,
    arrivals: ArrivalGenerator,
    day_costs: BTreeMap<String, CostAccumulator>,
    total_costs: BTreeMap<String, CostAccumulator>,
}

/// A checkpoint: payload plus integrity hash
#[derive(Debug, Serialize, Deserialize)]
struct Checkpoint {
    payload: CheckpointPayload,
    state_hash: String,
}

fn hash_payload(payload: &CheckpointPayload) -> Result<String, SimulationError> {
    let bytes = serde_json::to_vec(payload)
        .map_err(|e| SimulationError::Checkpoint(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

impl Orchestrator {
    /// Serialize the engine's mutable state to a JSON checkpoint.
    ///
    /// The event log is not captured: a resumed engine starts a fresh log
    /// from its resume tick.
    pub fn save_state(&self) -> Result<String, SimulationError> {
        let payload = CheckpointPayload {
            version: "1.0".to_string(),
            tick: self.time.current_tick(),
            rng_state: self.rng.get_state(),
            next_entry_seq: self.state.next_entry_seq(),
            agents: self.state.agents().clone(),
            transactions: self.state.transactions().clone(),
            rtgs_queue: self.state.rtgs_queue().clone(),
            arrivals: self.arrivals.clone(),
            day_costs: self.day_costs.clone(),
            total_costs: self.total_costs.clone(),
        };

        let state_hash = hash_payload(&payload)?;
        serde_json::to_string(&Checkpoint {
            payload,
            state_hash,
        })
        .map_err(|e| SimulationError::Checkpoint(e.to_string()))
    }

    /// Reconstruct an engine from a config and a checkpoint produced by
    /// [`save_state`](Orchestrator::save_state).
    ///
    /// Policies and the scenario schedule come from the config (they are
    /// immutable during a run); everything mutable comes from the
    /// checkpoint.
    pub fn load_state(
        config: OrchestratorConfig,
        checkpoint_json: &str,
    ) -> Result<Self, SimulationError> {
        let checkpoint: Checkpoint = serde_json::from_str(checkpoint_json)
            .map_err(|e| SimulationError::Checkpoint(e.to_string()))?;

        let expected_hash = hash_payload(&checkpoint.payload)?;
        if expected_hash != checkpoint.state_hash {
            return Err(SimulationError::Checkpoint(format!(
                "state hash mismatch: expected {}, found {}",
                expected_hash, checkpoint.state_hash
            )));
        }

        // A fresh engine from the config supplies policies, scenario
        // schedule, and validated settings
        let mut engine = Orchestrator::new(config)?;
        let payload = checkpoint.payload;

        let agent_ids_config: Vec<String> = engine.state.agent_ids();
        let agent_ids_checkpoint: Vec<String> = payload.agents.keys().cloned().collect();
        if agent_ids_config != agent_ids_checkpoint {
            return Err(SimulationError::Checkpoint(
                "checkpoint agents do not match configuration".to_string(),
            ));
        }

        engine.state = SimulationState::from_parts(
            payload.agents,
            payload.transactions,
            payload.rtgs_queue,
            payload.next_entry_seq,
        )
        .map_err(SimulationError::Checkpoint)?;
        engine.time = TimeManager::at_tick(engine.config.ticks_per_day, payload.tick);
        engine.rng = RngManager::new(payload.rng_state);
        engine.arrivals = payload.arrivals;
        engine.day_costs = payload.day_costs;
        engine.total_costs = payload.total_costs;

        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrivals::{AmountDistribution, ArrivalConfig};
    use crate::orchestrator::engine::{AgentConfig, PolicySpec};

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            ticks_per_day: 20,
            num_days: 2,
            rng_seed: 777,
            eod_rush_threshold: 0.8,
            agent_configs: vec![
                AgentConfig {
                    id: "BANK_A".to_string(),
                    opening_balance: 1_000_000,
                    unsecured_cap: 500_000,
                    policy: PolicySpec::Fifo,
                    arrival_config: Some(ArrivalConfig {
                        rate_per_tick: 1.0,
                        amount_distribution: AmountDistribution::Uniform {
                            min: 10_000,
                            max: 50_000,
                        },
                        counterparty_weights: Default::default(),
                        deadline_range: (5, 15),
                        priority_distribution: Default::default(),
                        divisible: false,
                        time_windows: Vec::new(),
                    }),
                    posted_collateral: None,
                    max_collateral_capacity: None,
                    collateral_haircut: None,
                    liquidity_buffer: None,
                },
                AgentConfig {
                    id: "BANK_B".to_string(),
                    opening_balance: 1_000_000,
                    unsecured_cap: 500_000,
                    policy: PolicySpec::Fifo,
                    arrival_config: None,
                    posted_collateral: None,
                    max_collateral_capacity: None,
                    collateral_haircut: None,
                    liquidity_buffer: None,
                },
            ],
            cost_rates: Default::default(),
            lsm_config: Default::default(),
            scenario_events: None,
            max_pacing_factor: 8,
            max_queue2_size: None,
            deadline_cap_at_eod: false,
        }
    }

    #[test]
    fn test_checkpoint_round_trip_resumes_identically() {
        let mut original = Orchestrator::new(config()).unwrap();
        for _ in 0..10 {
            original.tick().unwrap();
        }

        let saved = original.save_state().unwrap();
        let mut resumed = Orchestrator::load_state(config(), &saved).unwrap();

        assert_eq!(resumed.current_tick(), 10);
        assert_eq!(resumed.snapshot().balances, original.snapshot().balances);

        // Continue both and compare observable state
        for _ in 0..10 {
            original.tick().unwrap();
            resumed.tick().unwrap();
        }
        assert_eq!(resumed.snapshot().balances, original.snapshot().balances);
        assert_eq!(resumed.snapshot().queue2_size, original.snapshot().queue2_size);
    }

    #[test]
    fn test_tampered_checkpoint_rejected() {
        let mut engine = Orchestrator::new(config()).unwrap();
        engine.tick().unwrap();

        let saved = engine.save_state().unwrap();
        let tampered = saved.replace("\"rng_state\":", "\"rng_state\": 1, \"x\":");
        assert!(Orchestrator::load_state(config(), &tampered).is_err());
    }
}
