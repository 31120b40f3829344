//! RTGS Settlement Simulator - Core Engine
//!
//! Intraday Real-Time Gross Settlement simulator with deterministic
//! execution, liquidity-saving mechanisms, a decision-tree policy DSL, and a
//! bootstrap-evaluated policy optimization loop.
//!
//! # Architecture
//!
//! - **core**: time management
//! - **rng**: deterministic random number generation
//! - **seeds**: hierarchical seed derivation (seed matrix)
//! - **models**: domain types (Agent, Transaction, State, Event)
//! - **costs**: cost rates, breakdowns, accumulators
//! - **arrivals**: Poisson arrival generation
//! - **events**: scheduled scenario interventions
//! - **policy**: decision-tree DSL (types, interpreter, validation)
//! - **settlement**: RTGS immediate settlement and the LSM
//! - **orchestrator**: the tick loop and checkpointing
//! - **sampling**: bootstrap/permutation/stratified resampling
//! - **optimizer**: the policy optimization loop and its sandbox
//! - **persist**: the narrow event/metric sink contract
//!
//! # Critical Invariants
//!
//! 1. All money values are i64 (cents)
//! 2. All randomness is deterministic (seeded RNG, seed matrix)
//! 3. The tick step order is a contract; event order is replay identity

pub mod arrivals;
pub mod core;
pub mod costs;
pub mod events;
pub mod models;
pub mod optimizer;
pub mod orchestrator;
pub mod persist;
pub mod policy;
pub mod rng;
pub mod sampling;
pub mod seeds;
pub mod settlement;

// Re-exports for convenience
pub use arrivals::{AmountDistribution, ArrivalConfig, ArrivalGenerator, PriorityDistribution};
pub use crate::core::time::TimeManager;
pub use costs::{
    get_priority_band, CostAccumulator, CostBreakdown, CostRates, PriorityBand,
    PriorityDelayMultipliers,
};
pub use models::{
    agent::{Agent, AgentError, WithdrawError},
    event::{Event, EventLog},
    state::SimulationState,
    transaction::{Transaction, TransactionError, TransactionStatus},
};
pub use optimizer::{
    ConvergenceConfig, EvaluatorConfig, MockProposer, OptimizationLoop, OptimizationResult,
    OptimizerConfig, PolicyProposer, PolicyRequest, ProposalError,
};
pub use orchestrator::{
    AgentConfig, Orchestrator, OrchestratorConfig, PolicySpec, SimSnapshot, SimulationError,
    TickResult,
};
pub use persist::{EventSink, MemorySink, RunRecord, SinkError};
pub use policy::tree::{DecisionTreeDef, EvalContext, Field, TreePolicy, TreePolicyError};
pub use rng::RngManager;
pub use sampling::{HistoricalTransaction, SamplingMethod, TransactionPool};
pub use seeds::SeedMatrix;
pub use settlement::lsm::LsmConfig;
pub use settlement::{try_settle, SettlementError};
