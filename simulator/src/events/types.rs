//! Scenario event types
//!
//! Scenario events are deterministic interventions applied at specific ticks:
//! liquidity injections, collateral adjustments, arrival-process changes, and
//! injected transactions.
//!
//! # Design Principles
//!
//! 1. **Determinism**: events execute at their scheduled ticks, in config
//!    order within a tick
//! 2. **Money is i64**: all monetary values are integer cents
//! 3. **Self-contained**: events include all data needed for execution
//! 4. **Logged**: every execution is logged for replay identity

use serde::{Deserialize, Serialize};

/// A scenario event that modifies simulation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioEvent {
    /// Direct transfer of funds between agents, bypassing both queues.
    /// Models external liquidity injections or withdrawals.
    DirectTransfer {
        from_agent: String,
        to_agent: String,
        amount: i64,
    },

    /// Inject a transaction into the sender's Queue 1
    CustomTransactionArrival {
        sender: String,
        receiver: String,
        amount: i64,
        /// Deadline offset in ticks from the injection tick
        deadline_offset: usize,
        #[serde(default = "default_priority")]
        priority: u8,
        #[serde(default)]
        divisible: bool,
    },

    /// Delta to an agent's posted collateral (positive or negative)
    CollateralAdjustment { agent: String, delta: i64 },

    /// Multiply all agents' arrival rates against their configured baselines
    GlobalArrivalRateChange { multiplier: f64 },

    /// Multiply one agent's arrival rate against its configured baseline
    AgentArrivalRateChange { agent: String, multiplier: f64 },

    /// Set one counterparty weight; optionally rescale the others so the
    /// total stays constant
    CounterpartyWeightChange {
        agent: String,
        counterparty: String,
        new_weight: f64,
        #[serde(default)]
        rebalance_others: bool,
    },

    /// Scale deadline windows against the configured baselines
    DeadlineWindowChange {
        min_ticks_multiplier: Option<f64>,
        max_ticks_multiplier: Option<f64>,
    },
}

fn default_priority() -> u8 {
    5
}

/// When to execute a scenario event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventSchedule {
    /// Execute at regular intervals from start_tick, optionally ending at
    /// end_tick (inclusive)
    Repeating {
        start_tick: usize,
        interval: usize,
        #[serde(default)]
        end_tick: Option<usize>,
    },

    /// Execute once at a specific tick
    OneTime { tick: usize },
}

impl EventSchedule {
    /// Check if this schedule triggers at the given tick
    pub fn should_execute(&self, tick: usize) -> bool {
        match self {
            EventSchedule::OneTime { tick: event_tick } => tick == *event_tick,
            EventSchedule::Repeating {
                start_tick,
                interval,
                end_tick,
            } => {
                if tick < *start_tick {
                    return false;
                }
                if let Some(end) = end_tick {
                    if tick > *end {
                        return false;
                    }
                }
                (tick - start_tick) % interval == 0
            }
        }
    }

    /// First tick at which this schedule fires
    pub fn first_tick(&self) -> usize {
        match self {
            EventSchedule::OneTime { tick } => *tick,
            EventSchedule::Repeating { start_tick, .. } => *start_tick,
        }
    }
}

/// A scenario event paired with its schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub event: ScenarioEvent,
    pub schedule: EventSchedule,
}
