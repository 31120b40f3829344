//! Evaluation sandbox
//!
//! Builds a small deterministic scenario per bootstrap sample and runs it to
//! cost out a policy. The sandbox contains the target agent and the agents
//! its sample touches; the sample's historical transactions are replayed at
//! their original arrival ticks as scheduled injections, and no stochastic
//! arrivals are generated. Paired runs (candidate vs incumbent) reuse the
//! identical sandbox and seed, so only the policy differs.

use crate::events::{EventSchedule, ScenarioEvent, ScheduledEvent};
use crate::orchestrator::{
    AgentConfig, Orchestrator, OrchestratorConfig, PolicySpec, SimulationError,
};
use crate::policy::tree::DecisionTreeDef;
use crate::sampling::{HistoricalTransaction, SamplingMethod};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Evaluator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Number of bootstrap samples per proposal
    pub num_samples: usize,

    /// Resampling method
    pub method: SamplingMethod,

    /// Ticks each sandbox run simulates
    pub evaluation_ticks: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            num_samples: 10,
            method: SamplingMethod::Bootstrap,
            evaluation_ticks: 100,
        }
    }
}

/// Builds and runs sandbox scenarios against a base configuration
pub struct SandboxEvaluator {
    base_config: OrchestratorConfig,
    eval_config: EvaluatorConfig,
}

impl SandboxEvaluator {
    pub fn new(base_config: OrchestratorConfig, eval_config: EvaluatorConfig) -> Self {
        Self {
            base_config,
            eval_config,
        }
    }

    pub fn eval_config(&self) -> &EvaluatorConfig {
        &self.eval_config
    }

    /// Run one sandbox and return the target agent's total accrued cost.
    ///
    /// `policies` maps every agent to the policy it runs in this sandbox;
    /// the caller substitutes the candidate for the target agent.
    pub fn evaluate(
        &self,
        target_agent: &str,
        policies: &BTreeMap<String, DecisionTreeDef>,
        sample: &[HistoricalTransaction],
        seed: u64,
    ) -> Result<i64, SimulationError> {
        let config = self.build_sandbox_config(target_agent, policies, sample, seed)?;
        let mut engine = Orchestrator::new(config)?;

        let ticks = self.eval_config.evaluation_ticks.min(engine.episode_end_tick());
        for _ in 0..ticks {
            engine.tick()?;
        }

        Ok(engine
            .total_costs(target_agent)
            .map(|acc| acc.total())
            .unwrap_or(0))
    }

    /// Sandbox configuration: the target agent plus the agents its sample
    /// touches, historical transactions replayed as scheduled injections,
    /// stochastic arrivals off.
    fn build_sandbox_config(
        &self,
        target_agent: &str,
        policies: &BTreeMap<String, DecisionTreeDef>,
        sample: &[HistoricalTransaction],
        seed: u64,
    ) -> Result<OrchestratorConfig, SimulationError> {
        let mut participants: Vec<String> = sample
            .iter()
            .flat_map(|tx| [tx.sender_id.clone(), tx.receiver_id.clone()])
            .collect();
        participants.push(target_agent.to_string());
        participants.sort();
        participants.dedup();

        // The engine needs at least two agents; a degenerate sample falls
        // back to the full base roster
        let roster: Vec<&AgentConfig> = if participants.len() >= 2 {
            self.base_config
                .agent_configs
                .iter()
                .filter(|a| participants.contains(&a.id))
                .collect()
        } else {
            self.base_config.agent_configs.iter().collect()
        };

        let agent_configs: Vec<AgentConfig> = roster
            .into_iter()
            .map(|base| {
                let policy = policies
                    .get(&base.id)
                    .map(|def| PolicySpec::Inline(def.clone()))
                    .unwrap_or_else(|| base.policy.clone());
                AgentConfig {
                    id: base.id.clone(),
                    opening_balance: base.opening_balance,
                    unsecured_cap: base.unsecured_cap,
                    policy,
                    arrival_config: None,
                    posted_collateral: base.posted_collateral,
                    max_collateral_capacity: base.max_collateral_capacity,
                    collateral_haircut: base.collateral_haircut,
                    liquidity_buffer: base.liquidity_buffer,
                }
            })
            .collect();

        let last_injectable_tick = self.eval_config.evaluation_ticks.saturating_sub(2);
        let scenario_events: Vec<ScheduledEvent> = sample
            .iter()
            .map(|tx| ScheduledEvent {
                event: ScenarioEvent::CustomTransactionArrival {
                    sender: tx.sender_id.clone(),
                    receiver: tx.receiver_id.clone(),
                    amount: tx.amount,
                    deadline_offset: tx.deadline_offset(),
                    priority: tx.priority,
                    divisible: tx.divisible,
                },
                schedule: EventSchedule::OneTime {
                    tick: tx.arrival_tick.min(last_injectable_tick),
                },
            })
            .collect();

        let ticks_per_day = self.base_config.ticks_per_day;
        let num_days = self.eval_config.evaluation_ticks.div_ceil(ticks_per_day).max(1);

        Ok(OrchestratorConfig {
            ticks_per_day,
            num_days,
            rng_seed: seed,
            eod_rush_threshold: self.base_config.eod_rush_threshold,
            agent_configs,
            cost_rates: self.base_config.cost_rates.clone(),
            lsm_config: self.base_config.lsm_config.clone(),
            scenario_events: Some(scenario_events),
            max_pacing_factor: self.base_config.max_pacing_factor,
            max_queue2_size: self.base_config.max_queue2_size,
            deadline_cap_at_eod: self.base_config.deadline_cap_at_eod,
        })
    }
}
