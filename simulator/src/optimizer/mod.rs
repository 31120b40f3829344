//! Policy optimization loop
//!
//! Iteratively improves agent policies: run a context simulation, capture
//! its transaction history, then per iteration {pick an agent round-robin,
//! ask the proposer for a candidate policy, evaluate candidate and incumbent
//! on the same bootstrap samples with the same seeds, accept only strict
//! aggregate improvement}. Convergence stops the loop when costs stabilize
//! or nothing is accepted for a full window.
//!
//! Every stochastic draw is parameterized by the seed matrix, so the same
//! master seed reproduces the full iteration trace.

pub mod evaluator;
pub mod llm;

pub use evaluator::{EvaluatorConfig, SandboxEvaluator};
pub use llm::{MockProposer, PolicyProposer, PolicyRequest, ProposalError};

use crate::orchestrator::{Orchestrator, OrchestratorConfig, SimulationError};
use crate::persist::{
    drain_events_to_sink, EvaluationRecord, EventSink, IterationRecord, RunRecord,
};
use crate::policy::tree::{schema_docs, DecisionTreeDef, TreePolicy};
use crate::rng::RngManager;
use crate::sampling::TransactionPool;
use crate::seeds::SeedMatrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Convergence criteria
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    /// Hard iteration cap
    pub max_iterations: usize,

    /// Relative cost change at or below which an iteration counts as stable
    pub stability_threshold: f64,

    /// Number of trailing iterations that must be stable (or acceptance-free)
    pub stability_window: usize,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            stability_threshold: 0.01,
            stability_window: 3,
        }
    }
}

/// Optimization loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Agents whose policies are optimized, in round-robin order
    pub optimized_agents: Vec<String>,

    pub convergence: ConvergenceConfig,

    pub evaluator: EvaluatorConfig,

    /// Bounded retries per proposal on proposer failure
    pub proposal_retries: usize,
}

/// One iteration's outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationOutcome {
    pub iteration: usize,
    pub agent_id: String,
    pub accepted: bool,

    /// Σ over samples of (cost_old − cost_new), cents
    pub sum_delta: i64,

    /// Mean candidate cost across samples, cents
    pub mean_candidate_cost: i64,

    /// Mean incumbent cost across samples, cents
    pub mean_incumbent_cost: i64,

    pub reason: String,
}

/// Final result of an optimization run
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub iterations: Vec<IterationOutcome>,
    pub converged: bool,
    pub final_policies: BTreeMap<String, DecisionTreeDef>,
}

/// The optimization loop
pub struct OptimizationLoop<P: PolicyProposer> {
    base_config: OrchestratorConfig,
    config: OptimizerConfig,
    seeds: SeedMatrix,
    proposer: P,
    experiment_id: String,
}

impl<P: PolicyProposer> OptimizationLoop<P> {
    pub fn new(
        base_config: OrchestratorConfig,
        config: OptimizerConfig,
        master_seed: u64,
        proposer: P,
        experiment_id: String,
    ) -> Result<Self, SimulationError> {
        if config.optimized_agents.is_empty() {
            return Err(SimulationError::ConfigInvalid(
                "optimized_agents must not be empty".to_string(),
            ));
        }
        let known: Vec<&String> = base_config.agent_configs.iter().map(|a| &a.id).collect();
        for agent in &config.optimized_agents {
            if !known.contains(&agent) {
                return Err(SimulationError::ConfigInvalid(format!(
                    "optimized agent '{}' is not configured",
                    agent
                )));
            }
        }
        if config.convergence.stability_window == 0 {
            return Err(SimulationError::ConfigInvalid(
                "stability_window must be >= 1".to_string(),
            ));
        }

        Ok(Self {
            base_config,
            config,
            seeds: SeedMatrix::new(master_seed),
            proposer,
            experiment_id,
        })
    }

    /// Run the loop to convergence or the iteration cap
    pub fn run(&mut self, sink: &mut dyn EventSink) -> Result<OptimizationResult, SimulationError> {
        // Context simulation: full episode with the initial policies
        let mut context_config = self.base_config.clone();
        context_config.rng_seed = self.seeds.simulation_seed(0);
        let mut context_engine = Orchestrator::new(context_config)?;
        context_engine.run_to_completion()?;

        let pool = TransactionPool::capture(&context_engine);

        let context_run_id = format!("{}_context", self.experiment_id);
        if let Err(error) = sink.record_run(&RunRecord {
            run_id: context_run_id.clone(),
            seed: self.seeds.simulation_seed(0),
            purpose: "context".to_string(),
            experiment_id: Some(self.experiment_id.clone()),
            iteration: None,
        }) {
            tracing::warn!(%error, "failed to register context run; continuing");
        }
        drain_events_to_sink(sink, &context_run_id, context_engine.event_log().events());

        // Initial policies per agent, from the base configuration
        let mut current_policies: BTreeMap<String, DecisionTreeDef> = BTreeMap::new();
        for agent_config in &self.base_config.agent_configs {
            let policy = crate::policy::tree::create_policy(&agent_config.policy)
                .map_err(|e| SimulationError::PolicyInvalid {
                    agent_id: agent_config.id.clone(),
                    message: e.to_string(),
                })?;
            current_policies.insert(agent_config.id.clone(), policy.def().clone());
        }

        let evaluator =
            SandboxEvaluator::new(self.base_config.clone(), self.config.evaluator.clone());
        let constraints_schema = schema_docs::policy_schema_json();

        let mut outcomes: Vec<IterationOutcome> = Vec::new();
        let mut tracked_costs: Vec<f64> = Vec::new();
        let mut converged = false;

        for iteration in 1..=self.config.convergence.max_iterations {
            let agent_id = self.config.optimized_agents
                [(iteration - 1) % self.config.optimized_agents.len()]
            .clone();

            let outcome = self.run_iteration(
                iteration,
                &agent_id,
                &pool,
                &evaluator,
                &constraints_schema,
                &mut current_policies,
                &outcomes,
                sink,
            )?;

            // Persist the iteration trace; sink failures never stop the loop
            if let Err(error) = sink.record_iteration(&IterationRecord {
                experiment_id: self.experiment_id.clone(),
                iteration,
                agent_id: agent_id.clone(),
                costs_per_agent: BTreeMap::from([(
                    agent_id.clone(),
                    if outcome.accepted {
                        outcome.mean_candidate_cost
                    } else {
                        outcome.mean_incumbent_cost
                    },
                )]),
                accepted: outcome.accepted,
            }) {
                tracing::warn!(%error, iteration, "iteration record write failed; continuing");
            }

            tracked_costs.push(if outcome.accepted {
                outcome.mean_candidate_cost as f64
            } else {
                outcome.mean_incumbent_cost as f64
            });
            outcomes.push(outcome);

            if self.is_converged(&outcomes, &tracked_costs) {
                converged = true;
                break;
            }
        }

        if let Err(error) = sink.flush() {
            tracing::warn!(%error, "sink flush failed");
        }

        Ok(OptimizationResult {
            iterations: outcomes,
            converged,
            final_policies: current_policies,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn run_iteration(
        &mut self,
        iteration: usize,
        agent_id: &str,
        pool: &TransactionPool,
        evaluator: &SandboxEvaluator,
        constraints_schema: &str,
        current_policies: &mut BTreeMap<String, DecisionTreeDef>,
        history: &[IterationOutcome],
        sink: &mut dyn EventSink,
    ) -> Result<IterationOutcome, SimulationError> {
        let rejected = |reason: String| IterationOutcome {
            iteration,
            agent_id: agent_id.to_string(),
            accepted: false,
            sum_delta: 0,
            mean_candidate_cost: 0,
            mean_incumbent_cost: 0,
            reason,
        };

        // Proposal, with bounded retries. Every failure mode is a rejection.
        let request = PolicyRequest {
            system_prompt: "Propose a payment release policy as a decision tree.".to_string(),
            user_prompt: self.build_user_prompt(agent_id, current_policies, history),
            constraints_schema: constraints_schema.to_string(),
            seed: self.seeds.llm_seed(iteration, agent_id),
        };

        let mut candidate = None;
        let mut last_error = String::new();
        for _ in 0..=self.config.proposal_retries {
            match self.proposer.propose(&request) {
                Ok(def) => match TreePolicy::from_def(def.clone()) {
                    Ok(_) => {
                        candidate = Some(def);
                        break;
                    }
                    Err(error) => last_error = error.to_string(),
                },
                Err(error) => last_error = error.to_string(),
            }
        }
        let Some(candidate) = candidate else {
            return Ok(rejected(format!("proposal failed: {}", last_error)));
        };

        // Paired bootstrap evaluation: candidate and incumbent on identical
        // samples with identical seeds
        let sampling_seed = self.seeds.sampling_seed(iteration, agent_id);
        let mut sampler_rng = RngManager::new(sampling_seed);

        let mut candidate_policies = current_policies.clone();
        candidate_policies.insert(agent_id.to_string(), candidate.clone());

        let mut deltas = Vec::with_capacity(self.config.evaluator.num_samples);
        let mut total_new = 0i64;
        let mut total_old = 0i64;

        for sample_index in 0..self.config.evaluator.num_samples {
            let sample = pool.sample(self.config.evaluator.method, &mut sampler_rng);
            let run_seed = sampling_seed ^ (sample_index as u64);

            let cost_new = evaluator.evaluate(agent_id, &candidate_policies, &sample, run_seed)?;
            let cost_old = evaluator.evaluate(agent_id, current_policies, &sample, run_seed)?;

            deltas.push(cost_old - cost_new);
            total_new += cost_new;
            total_old += cost_old;
        }

        let num_samples = self.config.evaluator.num_samples.max(1) as i64;
        let sum_delta: i64 = deltas.iter().sum();
        let accepted = sum_delta > 0;
        let reason = if accepted {
            format!("aggregate improvement of {} cents", sum_delta)
        } else {
            "no strict improvement".to_string()
        };

        if accepted {
            current_policies.insert(agent_id.to_string(), candidate.clone());
        }

        let outcome = IterationOutcome {
            iteration,
            agent_id: agent_id.to_string(),
            accepted,
            sum_delta,
            mean_candidate_cost: total_new / num_samples,
            mean_incumbent_cost: total_old / num_samples,
            reason: reason.clone(),
        };

        // The evaluation record is informational; failures are logged only
        if let Err(error) = sink.record_evaluation(&EvaluationRecord {
            experiment_id: self.experiment_id.clone(),
            iteration,
            agent_id: agent_id.to_string(),
            proposed_policy: serde_json::to_string(&candidate).unwrap_or_default(),
            proposed_cost: outcome.mean_candidate_cost,
            current_best_cost: outcome.mean_incumbent_cost,
            accepted,
            acceptance_reason: reason,
            deltas,
        }) {
            tracing::warn!(%error, iteration, "evaluation record write failed; continuing");
        }

        Ok(outcome)
    }

    /// Optimization context handed to the proposer: the agent's current
    /// policy and its recent outcomes. Only the target agent's history is
    /// included; other agents' private events never leak into a prompt.
    fn build_user_prompt(
        &self,
        agent_id: &str,
        current_policies: &BTreeMap<String, DecisionTreeDef>,
        history: &[IterationOutcome],
    ) -> String {
        let current = current_policies
            .get(agent_id)
            .and_then(|def| serde_json::to_string(def).ok())
            .unwrap_or_default();

        let agent_history: Vec<&IterationOutcome> = history
            .iter()
            .filter(|o| o.agent_id == agent_id)
            .rev()
            .take(5)
            .collect();
        let history_lines: Vec<String> = agent_history
            .iter()
            .map(|o| {
                format!(
                    "iteration {}: {} (cost {} vs incumbent {})",
                    o.iteration,
                    if o.accepted { "accepted" } else { "rejected" },
                    o.mean_candidate_cost,
                    o.mean_incumbent_cost
                )
            })
            .collect();

        format!(
            "Agent: {}\nCurrent policy: {}\nRecent proposals:\n{}",
            agent_id,
            current,
            history_lines.join("\n")
        )
    }

    /// Converged when the trailing window is acceptance-free, or when every
    /// trailing relative cost change is within the stability threshold.
    fn is_converged(&self, outcomes: &[IterationOutcome], tracked_costs: &[f64]) -> bool {
        let window = self.config.convergence.stability_window;
        if outcomes.len() < window {
            return false;
        }

        let recent = &outcomes[outcomes.len() - window..];
        if recent.iter().all(|o| !o.accepted) {
            return true;
        }

        if tracked_costs.len() < window + 1 {
            return false;
        }
        let tail = &tracked_costs[tracked_costs.len() - window - 1..];
        tail.windows(2).all(|pair| {
            let (prev, next) = (pair[0], pair[1]);
            let denom = prev.abs().max(1.0);
            ((next - prev).abs() / denom) <= self.config.convergence.stability_threshold
        })
    }
}
