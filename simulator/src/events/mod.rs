//! Scenario events module
//!
//! Scheduled, deterministic interventions that modify simulation state at
//! specific ticks.
//!
//! - **types**: event type definitions and schedules
//! - **handler**: load-time validation and per-tick execution

pub mod handler;
pub mod types;

pub use handler::{ScenarioEffects, ScenarioError, ScenarioEventHandler};
pub use types::{EventSchedule, ScenarioEvent, ScheduledEvent};
