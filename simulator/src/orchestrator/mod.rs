//! Simulation orchestration
//!
//! - **engine**: the tick loop and its configuration
//! - **checkpoint**: save/restore of mutable engine state

pub mod checkpoint;
pub mod engine;

pub use engine::{
    AgentConfig, Orchestrator, OrchestratorConfig, PolicySpec, SimSnapshot, SimulationError,
    TickResult,
};
