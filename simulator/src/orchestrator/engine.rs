//! Simulation orchestrator
//!
//! Owns all simulation state and advances it one tick at a time. The tick
//! step order is a contract, not an implementation detail:
//!
//! 1. Arrival injection
//! 2. Scenario events
//! 3. Strategic collateral decisions
//! 4. Bank-tree decisions, then the Queue 1 policy pass
//! 5. Queue 2 immediate settlement
//! 6. LSM pass
//! 7. End-of-tick collateral decisions
//! 8. Cost accrual
//! 9. End-of-day handling
//!
//! The engine is single-threaded and strictly sequential within a tick; all
//! randomness flows through the owned RNG, and event emission order follows
//! the step order (then agent lexicographic, then transaction lexicographic).
//! A detected invariant violation poisons the engine: every subsequent call
//! fails. Silently masked corruption would be worse than a dead simulator.

use crate::arrivals::{AmountDistribution, ArrivalConfig, ArrivalGenerator};
use crate::core::time::TimeManager;
use crate::costs::{math, CostAccumulator, CostBreakdown, CostRates};
use crate::events::{ScenarioError, ScenarioEventHandler, ScheduledEvent};
use crate::models::{Event, EventLog, SimulationState, Transaction};
use crate::models::agent::Agent;
use crate::policy::tree::{create_policy, DecisionTreeDef, EvalContext, TreePolicy};
use crate::policy::{BankDecision, CollateralDecision, ReleaseDecision};
use crate::rng::RngManager;
use crate::settlement::lsm::{run_lsm_pass, LsmConfig};
use crate::settlement::rtgs::process_queue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

fn default_eod_rush_threshold() -> f64 {
    0.8
}

fn default_max_pacing_factor() -> usize {
    8
}

/// Complete orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Number of ticks per business day
    pub ticks_per_day: usize,

    /// Number of business days to simulate
    pub num_days: usize,

    /// RNG seed for deterministic simulation
    pub rng_seed: u64,

    /// Fraction of the day (0.0-1.0) at which the EOD rush period begins;
    /// policies read it through the `is_eod_rush` field
    #[serde(default = "default_eod_rush_threshold")]
    pub eod_rush_threshold: f64,

    /// Per-agent configuration
    pub agent_configs: Vec<AgentConfig>,

    /// Cost calculation rates
    #[serde(default)]
    pub cost_rates: CostRates,

    /// LSM configuration
    #[serde(default)]
    pub lsm_config: LsmConfig,

    /// Scheduled scenario interventions
    #[serde(default)]
    pub scenario_events: Option<Vec<ScheduledEvent>>,

    /// Upper clamp on Split.num_splits
    #[serde(default = "default_max_pacing_factor")]
    pub max_pacing_factor: usize,

    /// Soft cap on Queue 2: arrivals are rejected (with an accounting event)
    /// once the queue reaches this size. None = unbounded.
    #[serde(default)]
    pub max_queue2_size: Option<usize>,

    /// Cap generated deadlines at the end of the arrival's day
    #[serde(default)]
    pub deadline_cap_at_eod: bool,
}

/// Per-agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent identifier, format [A-Z0-9_]+
    pub id: String,

    /// Opening balance in the settlement account (cents, >= 0)
    pub opening_balance: i64,

    /// Unsecured daylight overdraft cap (cents, >= 0)
    pub unsecured_cap: i64,

    /// Cash manager policy
    pub policy: PolicySpec,

    /// Arrival generation configuration (None = no automatic arrivals)
    #[serde(default)]
    pub arrival_config: Option<ArrivalConfig>,

    /// Collateral posted at open (cents). Default 0.
    #[serde(default)]
    pub posted_collateral: Option<i64>,

    /// Upper bound on posted collateral (cents). Default 0 (no collateral
    /// capability).
    #[serde(default)]
    pub max_collateral_capacity: Option<i64>,

    /// Haircut applied to collateral value, in [0, 1). Default 0.02.
    #[serde(default)]
    pub collateral_haircut: Option<f64>,

    /// Advisory soft-minimum balance target read by policies (cents)
    #[serde(default)]
    pub liquidity_buffer: Option<i64>,
}

/// Policy selection for an agent.
///
/// The named variants compile to built-in decision trees with the given
/// parameters injected; at runtime everything is a tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PolicySpec {
    /// Release every transaction immediately (baseline)
    Fifo,

    /// Release transactions approaching their deadline, hold the rest
    Deadline { urgency_threshold: usize },

    /// Preserve a liquidity buffer; urgency overrides
    LiquidityAware {
        target_buffer: i64,
        urgency_threshold: usize,
    },

    /// Arbitrary JSON policy definition
    FromJson { json: String },

    /// Pre-parsed policy definition (optimizer-proposed candidates)
    Inline(DecisionTreeDef),
}

/// Errors that can occur constructing or running a simulation
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Invalid scenario: {0}")]
    ScenarioInvalid(#[from] ScenarioError),

    #[error("Invalid policy for agent {agent_id}: {message}")]
    PolicyInvalid { agent_id: String, message: String },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Simulation already complete at tick {0}")]
    Complete(usize),

    #[error("Engine poisoned by an earlier invariant violation")]
    Poisoned,

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
}

/// Summary of one tick
#[derive(Debug, Clone, Default)]
pub struct TickResult {
    pub tick: usize,
    pub day: usize,

    /// Transactions that arrived this tick (generated + scenario-injected)
    pub arrivals: usize,

    /// Arrivals rejected at the Queue 2 soft cap
    pub arrivals_rejected: usize,

    /// Transactions settled via immediate RTGS processing
    pub rtgs_settled: usize,

    /// Value settled via immediate RTGS processing
    pub rtgs_settled_value: i64,

    /// Bilateral offsets performed by the LSM
    pub lsm_bilateral_offsets: usize,

    /// Cycles settled by the LSM
    pub lsm_cycles_settled: usize,

    /// Transactions dropped by policy decisions
    pub dropped: usize,

    /// Split decisions executed
    pub splits: usize,

    /// Queue 2 size at end of tick
    pub queue2_size: usize,

    /// Per-agent cost deltas accrued this tick
    pub cost_deltas: BTreeMap<String, CostBreakdown>,
}

/// Read-only snapshot of engine state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimSnapshot {
    pub tick: usize,
    pub day: usize,
    pub balances: BTreeMap<String, i64>,
    pub queue1_sizes: BTreeMap<String, usize>,
    pub queue2_size: usize,
}

/// The simulation engine
pub struct Orchestrator {
    pub(crate) config: OrchestratorConfig,
    pub(crate) time: TimeManager,
    pub(crate) rng: RngManager,
    pub(crate) state: SimulationState,
    pub(crate) arrivals: ArrivalGenerator,
    scenario: ScenarioEventHandler,
    policies: BTreeMap<String, TreePolicy>,

    /// Costs accumulated within the current day (reset at EOD)
    pub(crate) day_costs: BTreeMap<String, CostAccumulator>,

    /// Costs accumulated over the whole run
    pub(crate) total_costs: BTreeMap<String, CostAccumulator>,

    /// Split friction charged during the policy pass, folded into the cost
    /// accrual step's breakdown
    pending_split_friction: BTreeMap<String, i64>,

    episode_end_tick: usize,
    poisoned: bool,
}

impl Orchestrator {
    /// Construct an engine from a validated configuration
    pub fn new(config: OrchestratorConfig) -> Result<Self, SimulationError> {
        Self::validate_config(&config)?;

        let episode_end_tick = config.ticks_per_day * config.num_days;

        let mut agents = Vec::new();
        let mut policies = BTreeMap::new();
        let mut arrival_configs = BTreeMap::new();

        for agent_config in &config.agent_configs {
            let haircut = agent_config.collateral_haircut.unwrap_or(0.02);
            let posted = agent_config.posted_collateral.unwrap_or(0);
            let capacity = agent_config.max_collateral_capacity.unwrap_or(posted);

            let agent = Agent::new(
                agent_config.id.clone(),
                agent_config.opening_balance,
                agent_config.unsecured_cap,
            )
            .with_collateral(posted, capacity.max(posted), haircut)
            .with_liquidity_buffer(agent_config.liquidity_buffer.unwrap_or(0));
            agents.push(agent);

            let policy = create_policy(&agent_config.policy).map_err(|e| {
                SimulationError::PolicyInvalid {
                    agent_id: agent_config.id.clone(),
                    message: e.to_string(),
                }
            })?;
            policies.insert(agent_config.id.clone(), policy);

            if let Some(arrival_config) = &agent_config.arrival_config {
                arrival_configs.insert(agent_config.id.clone(), arrival_config.clone());
            }
        }

        let agent_ids: Vec<String> = agents.iter().map(|a| a.id().to_string()).collect();

        let arrivals = ArrivalGenerator::new(
            arrival_configs,
            agent_ids.clone(),
            episode_end_tick,
            config.ticks_per_day,
            config.deadline_cap_at_eod,
        );

        let scenario = ScenarioEventHandler::new(
            config.scenario_events.clone().unwrap_or_default(),
            &agent_ids,
        )?;

        let day_costs = agent_ids
            .iter()
            .map(|id| (id.clone(), CostAccumulator::new()))
            .collect();
        let total_costs = agent_ids
            .iter()
            .map(|id| (id.clone(), CostAccumulator::new()))
            .collect();

        Ok(Self {
            time: TimeManager::new(config.ticks_per_day),
            rng: RngManager::new(config.rng_seed),
            state: SimulationState::new(agents),
            arrivals,
            scenario,
            policies,
            day_costs,
            total_costs,
            pending_split_friction: BTreeMap::new(),
            episode_end_tick,
            poisoned: false,
            config,
        })
    }

    fn validate_config(config: &OrchestratorConfig) -> Result<(), SimulationError> {
        let invalid = |msg: String| Err(SimulationError::ConfigInvalid(msg));

        if config.ticks_per_day == 0 {
            return invalid("ticks_per_day must be >= 1".to_string());
        }
        if config.num_days == 0 {
            return invalid("num_days must be >= 1".to_string());
        }
        if config.agent_configs.len() < 2 {
            return invalid("at least 2 agents required".to_string());
        }
        if !(0.0..=1.0).contains(&config.eod_rush_threshold) {
            return invalid("eod_rush_threshold must be in [0, 1]".to_string());
        }
        if config.max_pacing_factor == 0 {
            return invalid("max_pacing_factor must be >= 1".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for agent in &config.agent_configs {
            if agent.id.is_empty()
                || !agent
                    .id
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
            {
                return invalid(format!(
                    "agent id '{}' must match [A-Z0-9_]+",
                    agent.id
                ));
            }
            if !seen.insert(agent.id.clone()) {
                return invalid(format!("duplicate agent id '{}'", agent.id));
            }
            if agent.opening_balance < 0 {
                return invalid(format!("agent {} opening_balance < 0", agent.id));
            }
            if agent.unsecured_cap < 0 {
                return invalid(format!("agent {} unsecured_cap < 0", agent.id));
            }
            if let Some(haircut) = agent.collateral_haircut {
                if !(0.0..1.0).contains(&haircut) {
                    return invalid(format!(
                        "agent {} collateral_haircut must be in [0, 1)",
                        agent.id
                    ));
                }
            }
            if let Some(arrival) = &agent.arrival_config {
                if arrival.rate_per_tick <= 0.0 {
                    return invalid(format!("agent {} rate_per_tick must be > 0", agent.id));
                }
                match &arrival.amount_distribution {
                    AmountDistribution::Uniform { min, max } => {
                        if *min <= 0 || max < min {
                            return invalid(format!(
                                "agent {} uniform amount range invalid",
                                agent.id
                            ));
                        }
                    }
                    AmountDistribution::Normal { mean, std_dev } => {
                        if *mean <= 0 || *std_dev <= 0 {
                            return invalid(format!(
                                "agent {} normal amount parameters must be positive",
                                agent.id
                            ));
                        }
                    }
                    AmountDistribution::LogNormal { std_dev, .. } => {
                        if *std_dev <= 0.0 {
                            return invalid(format!(
                                "agent {} lognormal std_dev must be positive",
                                agent.id
                            ));
                        }
                    }
                    AmountDistribution::Exponential { rate } => {
                        if *rate <= 0.0 {
                            return invalid(format!(
                                "agent {} exponential rate must be positive",
                                agent.id
                            ));
                        }
                    }
                }
                if arrival.deadline_range.0 == 0
                    || arrival.deadline_range.1 < arrival.deadline_range.0
                {
                    return invalid(format!("agent {} deadline_range invalid", agent.id));
                }
            }
        }

        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn current_tick(&self) -> usize {
        self.time.current_tick()
    }

    pub fn current_day(&self) -> usize {
        self.time.current_day()
    }

    pub fn ticks_per_day(&self) -> usize {
        self.config.ticks_per_day
    }

    /// Final tick of the episode (exclusive)
    pub fn episode_end_tick(&self) -> usize {
        self.episode_end_tick
    }

    pub fn is_complete(&self) -> bool {
        self.time.current_tick() >= self.episode_end_tick
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn cost_rates(&self) -> &CostRates {
        &self.config.cost_rates
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn event_log(&self) -> &EventLog {
        self.state.event_log()
    }

    /// Events with `from_tick <= tick < to_tick`, in emission order
    pub fn events_between(&self, from_tick: usize, to_tick: usize) -> Vec<&Event> {
        self.state.event_log().events_between(from_tick, to_tick)
    }

    /// Whole-run cost accumulator for an agent
    pub fn total_costs(&self, agent_id: &str) -> Option<&CostAccumulator> {
        self.total_costs.get(agent_id)
    }

    /// Current-day cost accumulator for an agent
    pub fn day_costs(&self, agent_id: &str) -> Option<&CostAccumulator> {
        self.day_costs.get(agent_id)
    }

    pub fn agent_policy(&self, agent_id: &str) -> Option<&TreePolicy> {
        self.policies.get(agent_id)
    }

    /// Replace an agent's policy (optimizer accept step)
    pub fn set_agent_policy(&mut self, agent_id: &str, policy: TreePolicy) {
        self.policies.insert(agent_id.to_string(), policy);
    }

    /// Read-only snapshot of the engine
    pub fn snapshot(&self) -> SimSnapshot {
        SimSnapshot {
            tick: self.time.current_tick(),
            day: self.time.current_day(),
            balances: self
                .state
                .agents()
                .iter()
                .map(|(id, a)| (id.clone(), a.balance()))
                .collect(),
            queue1_sizes: self
                .state
                .agents()
                .iter()
                .map(|(id, a)| (id.clone(), a.outgoing_queue_size()))
                .collect(),
            queue2_size: self.state.queue_size(),
        }
    }

    /// Run every remaining tick, collecting the results
    pub fn run_to_completion(&mut self) -> Result<Vec<TickResult>, SimulationError> {
        let mut results = Vec::new();
        while !self.is_complete() {
            results.push(self.tick()?);
        }
        Ok(results)
    }

    // =========================================================================
    // The tick loop
    // =========================================================================

    /// Advance the simulation by exactly one tick
    pub fn tick(&mut self) -> Result<TickResult, SimulationError> {
        if self.poisoned {
            return Err(SimulationError::Poisoned);
        }
        let tick = self.time.current_tick();
        if tick >= self.episode_end_tick {
            return Err(SimulationError::Complete(tick));
        }

        let mut result = TickResult {
            tick,
            day: self.time.current_day(),
            ..Default::default()
        };
        let expected_total_balance = self.state.total_balance();

        // STEP 1: ARRIVALS
        let agent_ids = self.state.agent_ids();
        for agent_id in &agent_ids {
            let generated = self.arrivals.generate_for_agent(agent_id, tick, &mut self.rng);
            for tx in generated {
                self.inject_arrival(tx, tick, &mut result);
            }
        }

        // STEP 2: SCENARIO EVENTS
        let effects = self.scenario.execute_tick_events(
            &mut self.state,
            &mut self.arrivals,
            tick,
            self.episode_end_tick,
        );
        for tx in effects.custom_arrivals {
            self.inject_arrival(tx, tick, &mut result);
        }

        // STEP 3: STRATEGIC COLLATERAL DECISIONS
        self.state.rebuild_queue2_index();
        for agent_id in &agent_ids {
            self.collateral_decision(agent_id, tick, CollateralPhase::Strategic);
        }

        // STEP 4: BANK-TREE DECISIONS, THEN QUEUE 1 POLICY PASS
        for agent_id in &agent_ids {
            self.bank_decision(agent_id, tick);
        }
        for agent_id in &agent_ids {
            self.queue1_policy_pass(agent_id, tick, &mut result);
        }

        // STEP 5: QUEUE 2 IMMEDIATE SETTLEMENT
        let processed = process_queue(&mut self.state, tick);
        result.rtgs_settled += processed.settled_count;
        result.rtgs_settled_value += processed.settled_value;
        for tx_id in &processed.settled_tx_ids {
            self.log_settlement(tx_id, tick);
        }
        self.state.rebuild_queue2_index();

        // STEP 6: LSM PASS
        let lsm = run_lsm_pass(&mut self.state, &self.config.lsm_config, tick);
        result.lsm_bilateral_offsets = lsm.bilateral_offsets;
        result.lsm_cycles_settled = lsm.cycles_settled;
        for event in lsm.events {
            self.state.log_event(event);
        }
        self.state.rebuild_queue2_index();

        // STEP 7: END-OF-TICK COLLATERAL DECISIONS
        for agent_id in &agent_ids {
            self.collateral_decision(agent_id, tick, CollateralPhase::EndOfTick);
        }

        // STEP 8: COST ACCRUAL
        for agent_id in &agent_ids {
            let costs = self.accrue_costs(agent_id, tick);
            if costs.total() != 0 {
                self.state.log_event(Event::CostAccrued {
                    tick,
                    agent_id: agent_id.clone(),
                    costs: costs.clone(),
                });
            }
            result.cost_deltas.insert(agent_id.clone(), costs);
        }

        // STEP 9: END-OF-DAY HANDLING
        if self.time.is_end_of_day() {
            self.handle_end_of_day(tick)?;
        }

        // Invariants: conservation and overdraft bounds. Scenario direct
        // transfers move money between agents, so the sum never drifts.
        if self.state.total_balance() != expected_total_balance {
            self.poisoned = true;
            return Err(SimulationError::InvariantViolation(format!(
                "balance sum drifted: {} -> {}",
                expected_total_balance,
                self.state.total_balance()
            )));
        }
        if let Err(msg) = self.state.check_overdraft_invariant() {
            self.poisoned = true;
            return Err(SimulationError::InvariantViolation(msg));
        }

        result.queue2_size = self.state.queue_size();
        self.time.advance_tick();
        Ok(result)
    }

    /// Route one arrival into the sender's Queue 1, honoring the Queue 2
    /// soft cap.
    fn inject_arrival(&mut self, tx: Transaction, tick: usize, result: &mut TickResult) {
        if let Some(cap) = self.config.max_queue2_size {
            if self.state.queue_size() >= cap {
                result.arrivals_rejected += 1;
                self.state.log_event(Event::ArrivalRejected {
                    tick,
                    sender_id: tx.sender_id().to_string(),
                    receiver_id: tx.receiver_id().to_string(),
                    amount: tx.amount(),
                    queue2_size: self.state.queue_size(),
                });
                return;
            }
        }

        result.arrivals += 1;
        self.state.log_event(Event::TransactionArrived {
            tick,
            tx_id: tx.id().to_string(),
            sender_id: tx.sender_id().to_string(),
            receiver_id: tx.receiver_id().to_string(),
            amount: tx.amount(),
            deadline_tick: tx.deadline_tick(),
            priority: tx.priority(),
            is_divisible: tx.is_divisible(),
        });

        let sender_id = tx.sender_id().to_string();
        let receiver_id = tx.receiver_id().to_string();
        let tx_id = tx.id().to_string();
        self.state.add_transaction(tx);
        self.state
            .get_agent_mut(&sender_id)
            .expect("sender exists")
            .queue_outgoing(tx_id.clone());
        if let Some(receiver) = self.state.get_agent_mut(&receiver_id) {
            receiver.add_incoming_expected(tx_id);
        }
    }

    /// Evaluate and execute one agent's collateral tree for the given phase
    fn collateral_decision(&mut self, agent_id: &str, tick: usize, phase: CollateralPhase) {
        let Some(policy) = self.policies.get(agent_id) else {
            return;
        };
        let has_tree = match phase {
            CollateralPhase::Strategic => policy.has_strategic_collateral_tree(),
            CollateralPhase::EndOfTick => policy.has_end_of_tick_collateral_tree(),
        };
        if !has_tree {
            return;
        }

        let agent = self.state.get_agent(agent_id).expect("agent exists").clone();
        let context = EvalContext::bank_level(
            &agent,
            &self.state,
            tick,
            &self.config.cost_rates,
            self.config.ticks_per_day,
            self.config.eod_rush_threshold,
        );

        let policy = self.policies.get(agent_id).unwrap();
        let outcome = match phase {
            CollateralPhase::Strategic => policy.evaluate_strategic_collateral(&context),
            CollateralPhase::EndOfTick => policy.evaluate_end_of_tick_collateral(&context),
        };

        let decision = match outcome {
            Some(Ok(decision)) => decision,
            Some(Err(error)) => {
                // Arithmetic failure: safe default for collateral trees
                self.state.log_event(Event::PolicyEvalFailed {
                    tick,
                    agent_id: agent_id.to_string(),
                    tx_id: None,
                    error: error.to_string(),
                    fallback_action: "HoldCollateral".to_string(),
                });
                CollateralDecision::Hold
            }
            None => return,
        };

        match decision {
            CollateralDecision::Post { amount, .. } => {
                let agent = self.state.get_agent_mut(agent_id).unwrap();
                let applied = amount.min(agent.remaining_collateral_capacity());
                if applied > 0 && agent.post_collateral(applied).is_ok() {
                    let new_total = agent.posted_collateral();
                    self.state.log_event(Event::CollateralPosted {
                        tick,
                        agent_id: agent_id.to_string(),
                        amount: applied,
                        new_total,
                    });
                }
            }
            CollateralDecision::Withdraw { amount, .. } => {
                let agent = self.state.get_agent_mut(agent_id).unwrap();
                let applied = amount.min(agent.max_withdrawable_collateral());
                if applied > 0 && agent.withdraw_collateral(applied).is_ok() {
                    let new_total = agent.posted_collateral();
                    self.state.log_event(Event::CollateralWithdrawn {
                        tick,
                        agent_id: agent_id.to_string(),
                        amount: applied,
                        new_total,
                    });
                }
            }
            CollateralDecision::Hold => {}
        }
    }

    /// Evaluate and execute one agent's bank tree (state registers)
    fn bank_decision(&mut self, agent_id: &str, tick: usize) {
        let Some(policy) = self.policies.get(agent_id) else {
            return;
        };
        if !policy.has_bank_tree() {
            return;
        }

        let agent = self.state.get_agent(agent_id).expect("agent exists").clone();
        let context = EvalContext::bank_level(
            &agent,
            &self.state,
            tick,
            &self.config.cost_rates,
            self.config.ticks_per_day,
            self.config.eod_rush_threshold,
        );

        let policy = self.policies.get(agent_id).unwrap();
        let decision = match policy.evaluate_bank(&context) {
            Some(Ok(decision)) => decision,
            Some(Err(error)) => {
                self.state.log_event(Event::PolicyEvalFailed {
                    tick,
                    agent_id: agent_id.to_string(),
                    tx_id: None,
                    error: error.to_string(),
                    fallback_action: "NoAction".to_string(),
                });
                BankDecision::NoAction
            }
            None => return,
        };

        let agent = self.state.get_agent_mut(agent_id).unwrap();
        match decision {
            BankDecision::SetState { key, value } => {
                let _ = agent.set_register(&key, value);
            }
            BankDecision::AddState { key, delta } => {
                let _ = agent.add_register(&key, delta);
            }
            BankDecision::NoAction => {}
        }
    }

    /// Queue 1 iteration order: priority desc, deadline asc, arrival asc,
    /// tx_id asc.
    fn sorted_queue1(&self, agent_id: &str) -> Vec<String> {
        let agent = self.state.get_agent(agent_id).expect("agent exists");
        let mut queue: Vec<String> = agent.outgoing_queue().to_vec();
        queue.sort_by(|a, b| {
            let ta = self.state.get_transaction(a);
            let tb = self.state.get_transaction(b);
            match (ta, tb) {
                (Some(x), Some(y)) => y
                    .priority()
                    .cmp(&x.priority())
                    .then_with(|| x.deadline_tick().cmp(&y.deadline_tick()))
                    .then_with(|| x.arrival_tick().cmp(&y.arrival_tick()))
                    .then_with(|| a.cmp(b)),
                _ => a.cmp(b),
            }
        });
        queue
    }

    /// Evaluate the agent's payment tree over its Queue 1 and execute the
    /// resulting decisions.
    fn queue1_policy_pass(&mut self, agent_id: &str, tick: usize, result: &mut TickResult) {
        let queue = self.sorted_queue1(agent_id);

        for tx_id in queue {
            // Rebuild per-transaction context against current state: earlier
            // decisions this pass change balances and queues
            self.state.rebuild_queue2_index();

            let Some(tx) = self.state.get_transaction(&tx_id).cloned() else {
                continue;
            };
            let agent = self.state.get_agent(agent_id).expect("agent exists").clone();
            let context = EvalContext::payment(
                &tx,
                &agent,
                &self.state,
                tick,
                &self.config.cost_rates,
                self.config.ticks_per_day,
                self.config.eod_rush_threshold,
            );

            let policy = self.policies.get(agent_id).expect("policy exists");
            let decision = match policy.evaluate_payment(
                &context,
                tx_id.clone(),
                self.config.max_pacing_factor,
            ) {
                Ok(decision) => decision,
                Err(error) => {
                    // Arithmetic failure: safe default for payment trees is
                    // Release
                    self.state.log_event(Event::PolicyEvalFailed {
                        tick,
                        agent_id: agent_id.to_string(),
                        tx_id: Some(tx_id.clone()),
                        error: error.to_string(),
                        fallback_action: "Release".to_string(),
                    });
                    ReleaseDecision::Release {
                        tx_id: tx_id.clone(),
                    }
                }
            };

            self.execute_release_decision(agent_id, decision, tick, result);
        }
    }

    fn execute_release_decision(
        &mut self,
        agent_id: &str,
        decision: ReleaseDecision,
        tick: usize,
        result: &mut TickResult,
    ) {
        match decision {
            ReleaseDecision::Release { tx_id } => {
                self.state.log_event(Event::PolicyDecision {
                    tick,
                    agent_id: agent_id.to_string(),
                    tx_id: tx_id.clone(),
                    action: "Release".to_string(),
                    reason: None,
                });
                self.submit_to_queue2(agent_id, &tx_id, tick);
            }

            ReleaseDecision::Hold { tx_id, reason } => {
                self.state.log_event(Event::PolicyDecision {
                    tick,
                    agent_id: agent_id.to_string(),
                    tx_id,
                    action: "Hold".to_string(),
                    reason: Some(reason.as_str().to_string()),
                });
            }

            ReleaseDecision::Drop { tx_id } => {
                self.state.log_event(Event::PolicyDecision {
                    tick,
                    agent_id: agent_id.to_string(),
                    tx_id: tx_id.clone(),
                    action: "Drop".to_string(),
                    reason: None,
                });
                self.state
                    .get_agent_mut(agent_id)
                    .unwrap()
                    .remove_outgoing(&tx_id);
                if let Some(tx) = self.state.get_transaction_mut(&tx_id) {
                    let receiver_id = tx.receiver_id().to_string();
                    tx.drop_transaction(tick);
                    if let Some(receiver) = self.state.get_agent_mut(&receiver_id) {
                        receiver.remove_incoming_expected(&tx_id);
                    }
                }
                self.state.log_event(Event::TransactionDropped {
                    tick,
                    agent_id: agent_id.to_string(),
                    tx_id,
                    reason: "PolicyDecision".to_string(),
                });
                result.dropped += 1;
            }

            ReleaseDecision::Split { tx_id, num_splits } => {
                self.execute_split(agent_id, &tx_id, num_splits, tick, result);
            }
        }
    }

    /// Split a parent into `num_splits` children and submit them all.
    ///
    /// Children inherit sender, receiver, deadline, and priority; the last
    /// child absorbs the rounding remainder so the amounts sum exactly.
    /// Friction of split_friction_cost × (num_splits − 1) accrues to the
    /// agent in this tick's cost step.
    fn execute_split(
        &mut self,
        agent_id: &str,
        tx_id: &str,
        num_splits: usize,
        tick: usize,
        result: &mut TickResult,
    ) {
        let Some(parent) = self.state.get_transaction(tx_id).cloned() else {
            return;
        };

        let amounts = math::split_amounts(parent.remaining_amount(), num_splits);
        let mut child_ids = Vec::with_capacity(num_splits);

        for (i, amount) in amounts.iter().enumerate() {
            let child = Transaction::new(
                parent.sender_id().to_string(),
                parent.receiver_id().to_string(),
                *amount,
                tick,
                parent.deadline_tick(),
            )
            .with_id(format!("{}_s{}", tx_id, i + 1))
            .with_priority(parent.priority())
            .as_split_child(tx_id.to_string());

            child_ids.push(child.id().to_string());
            self.state.add_transaction(child);
        }

        let friction =
            self.config.cost_rates.split_friction_cost * (num_splits as i64 - 1);
        *self
            .pending_split_friction
            .entry(agent_id.to_string())
            .or_insert(0) += friction;

        self.state.log_event(Event::PolicyDecision {
            tick,
            agent_id: agent_id.to_string(),
            tx_id: tx_id.to_string(),
            action: "Split".to_string(),
            reason: None,
        });
        self.state.log_event(Event::TransactionSplit {
            tick,
            agent_id: agent_id.to_string(),
            tx_id: tx_id.to_string(),
            num_splits,
            child_ids: child_ids.clone(),
            friction_cost: friction,
        });

        // The parent leaves Queue 1, replaced by its children
        self.state
            .get_agent_mut(agent_id)
            .unwrap()
            .remove_outgoing(tx_id);
        let receiver_id = parent.receiver_id().to_string();
        if let Some(receiver) = self.state.get_agent_mut(&receiver_id) {
            receiver.remove_incoming_expected(tx_id);
        }
        self.state
            .get_transaction_mut(tx_id)
            .unwrap()
            .drop_transaction(tick);

        for child_id in &child_ids {
            if let Some(receiver) = self.state.get_agent_mut(&receiver_id) {
                receiver.add_incoming_expected(child_id.clone());
            }
            self.submit_to_queue2(agent_id, child_id, tick);
        }

        result.splits += 1;
    }

    /// Move a transaction from Queue 1 into Queue 2 with a fresh ordering
    /// token. Settlement happens in the tick's Queue 2 processing step.
    fn submit_to_queue2(&mut self, agent_id: &str, tx_id: &str, tick: usize) {
        let Some(priority) = self.state.get_transaction(tx_id).map(|t| t.priority()) else {
            return;
        };
        let token = self.state.assign_rtgs_token(priority);
        self.state
            .get_transaction_mut(tx_id)
            .unwrap()
            .set_rtgs_priority(token);

        self.state
            .get_agent_mut(agent_id)
            .unwrap()
            .remove_outgoing(tx_id);
        self.state.queue_transaction(tx_id.to_string());

        self.state.log_event(Event::TransactionSubmittedToQueue2 {
            tick,
            agent_id: agent_id.to_string(),
            tx_id: tx_id.to_string(),
            rtgs_priority: token,
        });
    }

    /// Log an immediate settlement and clear the receiver's inflow forecast
    fn log_settlement(&mut self, tx_id: &str, tick: usize) {
        let Some(tx) = self.state.get_transaction(tx_id) else {
            return;
        };
        let event = Event::RtgsImmediateSettlement {
            tick,
            tx_id: tx_id.to_string(),
            sender_id: tx.sender_id().to_string(),
            receiver_id: tx.receiver_id().to_string(),
            amount: tx.settled_amount(),
        };
        let receiver_id = tx.receiver_id().to_string();
        self.state.log_event(event);
        if let Some(receiver) = self.state.get_agent_mut(&receiver_id) {
            receiver.remove_incoming_expected(tx_id);
        }
    }

    /// STEP 8: per-agent cost accrual.
    ///
    /// Overdraft on credit in use, collateral opportunity cost, delay on
    /// Queue 1 residents (with priority-band and overdue multipliers), the
    /// one-time deadline penalty at the overdue transition, and any split
    /// friction charged during the policy pass. Delay cost applies to
    /// Queue 1 only; Queue 2 waits are free.
    fn accrue_costs(&mut self, agent_id: &str, tick: usize) -> CostBreakdown {
        let rates = self.config.cost_rates.clone();
        let mut costs = CostBreakdown::default();

        let agent = self.state.get_agent(agent_id).expect("agent exists");
        costs.overdraft_cost = math::bps_cost(agent.credit_used(), rates.overdraft_bps_per_tick);
        costs.collateral_cost =
            math::bps_cost(agent.posted_collateral(), rates.collateral_cost_per_tick_bps);

        // Deadline penalties: any pending transaction of this agent crossing
        // its deadline, whether waiting in Queue 1 or Queue 2
        let mut pending: Vec<String> = agent.outgoing_queue().to_vec();
        pending.extend(
            self.state
                .queue2_index()
                .agent_transactions(agent_id)
                .iter()
                .cloned(),
        );
        pending.sort();
        let mut overdue_events = Vec::new();
        for tx_id in &pending {
            let Some(tx) = self.state.get_transaction_mut(tx_id) else {
                continue;
            };
            if tx.is_pending() && tx.is_past_deadline(tick) && tx.mark_overdue(tick) {
                costs.penalty_cost += rates.deadline_penalty;
                overdue_events.push(Event::TransactionOverdue {
                    tick,
                    agent_id: agent_id.to_string(),
                    tx_id: tx_id.clone(),
                    penalty: rates.deadline_penalty,
                });
            }
        }
        for event in overdue_events {
            self.state.log_event(event);
        }

        // Delay cost: Queue 1 residents only, rounded per transaction
        let agent = self.state.get_agent(agent_id).expect("agent exists");
        let queue1: Vec<String> = agent.outgoing_queue().to_vec();
        for tx_id in &queue1 {
            let Some(tx) = self.state.get_transaction(tx_id) else {
                continue;
            };
            let multiplier = rates.delay_multiplier(tx.priority(), tx.is_overdue());
            costs.delay_cost += math::rate_cost(
                tx.remaining_amount(),
                rates.delay_cost_per_tick_per_cent * multiplier,
            );
        }

        costs.split_friction_cost = self
            .pending_split_friction
            .remove(agent_id)
            .unwrap_or(0);

        let balance = self.state.get_agent(agent_id).unwrap().balance();
        if let Some(acc) = self.day_costs.get_mut(agent_id) {
            acc.add(&costs);
            acc.update_peak_debit(balance);
        }
        if let Some(acc) = self.total_costs.get_mut(agent_id) {
            acc.add(&costs);
            acc.update_peak_debit(balance);
        }

        costs
    }

    /// STEP 9: each residual Queue 1 transaction pays the EOD penalty;
    /// state registers reset; the day cost accumulators roll over.
    fn handle_end_of_day(&mut self, tick: usize) -> Result<(), SimulationError> {
        let day = self.time.current_day();
        let penalty = self.config.cost_rates.eod_penalty_per_transaction;

        for agent_id in self.state.agent_ids() {
            let residual: Vec<String> = self
                .state
                .get_agent(&agent_id)
                .expect("agent exists")
                .outgoing_queue()
                .to_vec();

            let mut breakdown = CostBreakdown::default();
            for tx_id in residual {
                breakdown.penalty_cost += penalty;
                self.state.log_event(Event::EodPenalty {
                    tick,
                    day,
                    agent_id: agent_id.clone(),
                    tx_id,
                    penalty,
                });
            }

            // Day accumulators reset below, so EOD penalties only land in
            // the run totals
            if breakdown.penalty_cost != 0 {
                if let Some(acc) = self.total_costs.get_mut(&agent_id) {
                    acc.add(&breakdown);
                }
            }

            let agent = self.state.get_agent_mut(&agent_id).unwrap();
            agent.reset_registers();
        }

        for acc in self.day_costs.values_mut() {
            *acc = CostAccumulator::new();
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum CollateralPhase {
    Strategic,
    EndOfTick,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tick", &self.time.current_tick())
            .field("agents", &self.state.num_agents())
            .field("queue2_size", &self.state.queue_size())
            .field("events", &self.state.event_log().len())
            .finish()
    }
}
