//! Scenario event execution and scheduling
//!
//! Validates schedules at load time (unknown agents and negative amounts are
//! fatal), then executes the events due at each tick in configuration order.
//! Every execution is logged to the event stream for replay identity.

use crate::arrivals::ArrivalGenerator;
use crate::events::types::{ScenarioEvent, ScheduledEvent};
use crate::models::{Event, SimulationState, Transaction};
use serde_json::json;
use thiserror::Error;

/// Errors raised when a scenario is malformed. Fatal at load.
#[derive(Debug, Error, PartialEq)]
pub enum ScenarioError {
    #[error("Scenario event references unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Scenario event has non-positive amount: {0}")]
    NonPositiveAmount(i64),

    #[error("Scenario event has non-positive multiplier: {0}")]
    NonPositiveMultiplier(f64),

    #[error("Repeating schedule has zero interval")]
    ZeroInterval,
}

/// Side effects of a tick's scenario events that the orchestrator routes
/// through its normal paths.
#[derive(Debug, Default)]
pub struct ScenarioEffects {
    /// Injected transactions, to enter the sender's Queue 1 as arrivals
    pub custom_arrivals: Vec<Transaction>,

    /// Number of events executed this tick
    pub executed: usize,
}

/// Handles scenario event scheduling and execution
#[derive(Debug, Clone)]
pub struct ScenarioEventHandler {
    events: Vec<ScheduledEvent>,
}

impl ScenarioEventHandler {
    /// Create a handler, validating every event against the agent set.
    ///
    /// Events are sorted by (first fire tick, original index); within a tick
    /// they execute in that order.
    pub fn new(
        mut events: Vec<ScheduledEvent>,
        agent_ids: &[String],
    ) -> Result<Self, ScenarioError> {
        for scheduled in &events {
            Self::validate_event(&scheduled.event, agent_ids)?;
            if let crate::events::types::EventSchedule::Repeating { interval, .. } =
                scheduled.schedule
            {
                if interval == 0 {
                    return Err(ScenarioError::ZeroInterval);
                }
            }
        }

        // Stable sort keeps config order as the within-tick sequence
        events.sort_by_key(|s| s.schedule.first_tick());
        Ok(Self { events })
    }

    fn validate_event(event: &ScenarioEvent, agent_ids: &[String]) -> Result<(), ScenarioError> {
        let known = |id: &String| agent_ids.contains(id);
        match event {
            ScenarioEvent::DirectTransfer {
                from_agent,
                to_agent,
                amount,
            } => {
                if !known(from_agent) {
                    return Err(ScenarioError::UnknownAgent(from_agent.clone()));
                }
                if !known(to_agent) {
                    return Err(ScenarioError::UnknownAgent(to_agent.clone()));
                }
                if *amount <= 0 {
                    return Err(ScenarioError::NonPositiveAmount(*amount));
                }
            }
            ScenarioEvent::CustomTransactionArrival {
                sender,
                receiver,
                amount,
                ..
            } => {
                if !known(sender) {
                    return Err(ScenarioError::UnknownAgent(sender.clone()));
                }
                if !known(receiver) {
                    return Err(ScenarioError::UnknownAgent(receiver.clone()));
                }
                if *amount <= 0 {
                    return Err(ScenarioError::NonPositiveAmount(*amount));
                }
            }
            ScenarioEvent::CollateralAdjustment { agent, .. } => {
                if !known(agent) {
                    return Err(ScenarioError::UnknownAgent(agent.clone()));
                }
            }
            ScenarioEvent::GlobalArrivalRateChange { multiplier } => {
                if *multiplier <= 0.0 {
                    return Err(ScenarioError::NonPositiveMultiplier(*multiplier));
                }
            }
            ScenarioEvent::AgentArrivalRateChange { agent, multiplier } => {
                if !known(agent) {
                    return Err(ScenarioError::UnknownAgent(agent.clone()));
                }
                if *multiplier <= 0.0 {
                    return Err(ScenarioError::NonPositiveMultiplier(*multiplier));
                }
            }
            ScenarioEvent::CounterpartyWeightChange {
                agent, counterparty, ..
            } => {
                if !known(agent) {
                    return Err(ScenarioError::UnknownAgent(agent.clone()));
                }
                if !known(counterparty) {
                    return Err(ScenarioError::UnknownAgent(counterparty.clone()));
                }
            }
            ScenarioEvent::DeadlineWindowChange { .. } => {}
        }
        Ok(())
    }

    /// All events scheduled for a specific tick, in sequence order
    pub fn events_for_tick(&self, tick: usize) -> Vec<&ScenarioEvent> {
        self.events
            .iter()
            .filter(|scheduled| scheduled.schedule.should_execute(tick))
            .map(|scheduled| &scheduled.event)
            .collect()
    }

    /// Execute all events due at `tick`, mutating state and the arrival
    /// generator, logging each execution.
    pub fn execute_tick_events(
        &self,
        state: &mut SimulationState,
        arrivals: &mut ArrivalGenerator,
        tick: usize,
        episode_end_tick: usize,
    ) -> ScenarioEffects {
        let mut effects = ScenarioEffects::default();
        let mut injected_this_tick = 0usize;

        for event in self.events_for_tick(tick) {
            match event {
                ScenarioEvent::DirectTransfer {
                    from_agent,
                    to_agent,
                    amount,
                } => {
                    // Bypasses liquidity checks; external money can push an
                    // agent negative
                    state.get_agent_mut(from_agent).unwrap().adjust_balance(-amount);
                    state.get_agent_mut(to_agent).unwrap().adjust_balance(*amount);
                    state.log_event(Event::ScenarioEventExecuted {
                        tick,
                        kind: "direct_transfer".to_string(),
                        details: json!({
                            "from_agent": from_agent,
                            "to_agent": to_agent,
                            "amount": amount,
                        }),
                    });
                }

                ScenarioEvent::CustomTransactionArrival {
                    sender,
                    receiver,
                    amount,
                    deadline_offset,
                    priority,
                    divisible,
                } => {
                    let deadline = (tick + deadline_offset.max(&1)).min(episode_end_tick);
                    // Deterministic ID: scenario arrivals must not perturb
                    // replay identity
                    let tx_id = format!("scn_{:08}_{}", tick, injected_this_tick);
                    injected_this_tick += 1;
                    let mut tx = Transaction::new(
                        sender.clone(),
                        receiver.clone(),
                        *amount,
                        tick,
                        deadline.max(tick + 1),
                    )
                    .with_id(tx_id)
                    .with_priority(*priority);
                    if *divisible {
                        tx = tx.divisible();
                    }
                    state.log_event(Event::ScenarioEventExecuted {
                        tick,
                        kind: "custom_transaction_arrival".to_string(),
                        details: json!({
                            "sender": sender,
                            "receiver": receiver,
                            "amount": amount,
                            "tx_id": tx.id(),
                        }),
                    });
                    effects.custom_arrivals.push(tx);
                }

                ScenarioEvent::CollateralAdjustment { agent, delta } => {
                    let agent_ref = state.get_agent_mut(agent).unwrap();
                    let applied = if *delta >= 0 {
                        let capped = (*delta).min(agent_ref.remaining_collateral_capacity());
                        agent_ref.post_collateral(capped).ok();
                        capped
                    } else {
                        let withdrawal =
                            (-*delta).min(agent_ref.max_withdrawable_collateral());
                        agent_ref.withdraw_collateral(withdrawal).ok();
                        -withdrawal
                    };
                    let new_total = state.get_agent(agent).unwrap().posted_collateral();
                    state.log_event(Event::ScenarioEventExecuted {
                        tick,
                        kind: "collateral_adjustment".to_string(),
                        details: json!({
                            "agent": agent,
                            "requested_delta": delta,
                            "applied_delta": applied,
                            "new_total": new_total,
                        }),
                    });
                }

                ScenarioEvent::GlobalArrivalRateChange { multiplier } => {
                    arrivals.apply_global_rate_multiplier(*multiplier);
                    state.log_event(Event::ScenarioEventExecuted {
                        tick,
                        kind: "global_arrival_rate_change".to_string(),
                        details: json!({ "multiplier": multiplier }),
                    });
                }

                ScenarioEvent::AgentArrivalRateChange { agent, multiplier } => {
                    arrivals.apply_agent_rate_multiplier(agent, *multiplier);
                    state.log_event(Event::ScenarioEventExecuted {
                        tick,
                        kind: "agent_arrival_rate_change".to_string(),
                        details: json!({ "agent": agent, "multiplier": multiplier }),
                    });
                }

                ScenarioEvent::CounterpartyWeightChange {
                    agent,
                    counterparty,
                    new_weight,
                    rebalance_others,
                } => {
                    arrivals.set_counterparty_weight(
                        agent,
                        counterparty,
                        *new_weight,
                        *rebalance_others,
                    );
                    state.log_event(Event::ScenarioEventExecuted {
                        tick,
                        kind: "counterparty_weight_change".to_string(),
                        details: json!({
                            "agent": agent,
                            "counterparty": counterparty,
                            "new_weight": new_weight,
                        }),
                    });
                }

                ScenarioEvent::DeadlineWindowChange {
                    min_ticks_multiplier,
                    max_ticks_multiplier,
                } => {
                    arrivals.apply_deadline_window_multipliers(
                        *min_ticks_multiplier,
                        *max_ticks_multiplier,
                    );
                    state.log_event(Event::ScenarioEventExecuted {
                        tick,
                        kind: "deadline_window_change".to_string(),
                        details: json!({
                            "min_ticks_multiplier": min_ticks_multiplier,
                            "max_ticks_multiplier": max_ticks_multiplier,
                        }),
                    });
                }
            }
            effects.executed += 1;
        }

        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrivals::{AmountDistribution, ArrivalConfig};
    use crate::events::types::EventSchedule;
    use crate::models::Agent;
    use std::collections::BTreeMap;

    fn agents() -> Vec<String> {
        vec!["A".to_string(), "B".to_string()]
    }

    fn empty_generator() -> ArrivalGenerator {
        let mut configs = BTreeMap::new();
        configs.insert(
            "A".to_string(),
            ArrivalConfig {
                rate_per_tick: 1.0,
                amount_distribution: AmountDistribution::Uniform {
                    min: 1_000,
                    max: 2_000,
                },
                counterparty_weights: BTreeMap::new(),
                deadline_range: (5, 10),
                priority_distribution: Default::default(),
                divisible: false,
                time_windows: Vec::new(),
            },
        );
        ArrivalGenerator::new(configs, agents(), 1_000, 100, false)
    }

    #[test]
    fn test_unknown_agent_rejected_at_load() {
        let events = vec![ScheduledEvent {
            event: ScenarioEvent::DirectTransfer {
                from_agent: "GHOST".to_string(),
                to_agent: "B".to_string(),
                amount: 100,
            },
            schedule: EventSchedule::OneTime { tick: 1 },
        }];

        assert_eq!(
            ScenarioEventHandler::new(events, &agents()).unwrap_err(),
            ScenarioError::UnknownAgent("GHOST".to_string())
        );
    }

    #[test]
    fn test_negative_amount_rejected_at_load() {
        let events = vec![ScheduledEvent {
            event: ScenarioEvent::DirectTransfer {
                from_agent: "A".to_string(),
                to_agent: "B".to_string(),
                amount: -100,
            },
            schedule: EventSchedule::OneTime { tick: 1 },
        }];

        assert!(matches!(
            ScenarioEventHandler::new(events, &agents()),
            Err(ScenarioError::NonPositiveAmount(-100))
        ));
    }

    #[test]
    fn test_direct_transfer_moves_balance_and_logs() {
        let handler = ScenarioEventHandler::new(
            vec![ScheduledEvent {
                event: ScenarioEvent::DirectTransfer {
                    from_agent: "A".to_string(),
                    to_agent: "B".to_string(),
                    amount: 100_000,
                },
                schedule: EventSchedule::OneTime { tick: 5 },
            }],
            &agents(),
        )
        .unwrap();

        let mut state = SimulationState::new(vec![
            Agent::new("A".to_string(), 500_000, 0),
            Agent::new("B".to_string(), 0, 0),
        ]);
        let mut arrivals = empty_generator();

        // Not due yet
        let effects = handler.execute_tick_events(&mut state, &mut arrivals, 4, 1_000);
        assert_eq!(effects.executed, 0);

        let effects = handler.execute_tick_events(&mut state, &mut arrivals, 5, 1_000);
        assert_eq!(effects.executed, 1);
        assert_eq!(state.get_agent("A").unwrap().balance(), 400_000);
        assert_eq!(state.get_agent("B").unwrap().balance(), 100_000);
        assert_eq!(state.event_log().events_of_type("ScenarioEventExecuted").len(), 1);
    }

    #[test]
    fn test_custom_arrival_returned_as_effect() {
        let handler = ScenarioEventHandler::new(
            vec![ScheduledEvent {
                event: ScenarioEvent::CustomTransactionArrival {
                    sender: "A".to_string(),
                    receiver: "B".to_string(),
                    amount: 250_000,
                    deadline_offset: 20,
                    priority: 8,
                    divisible: false,
                },
                schedule: EventSchedule::OneTime { tick: 3 },
            }],
            &agents(),
        )
        .unwrap();

        let mut state = SimulationState::new(vec![
            Agent::new("A".to_string(), 0, 0),
            Agent::new("B".to_string(), 0, 0),
        ]);
        let mut arrivals = empty_generator();

        let effects = handler.execute_tick_events(&mut state, &mut arrivals, 3, 1_000);
        assert_eq!(effects.custom_arrivals.len(), 1);
        let tx = &effects.custom_arrivals[0];
        assert_eq!(tx.amount(), 250_000);
        assert_eq!(tx.priority(), 8);
        assert_eq!(tx.deadline_tick(), 23);
    }

    #[test]
    fn test_rate_change_applies_to_generator() {
        let handler = ScenarioEventHandler::new(
            vec![ScheduledEvent {
                event: ScenarioEvent::AgentArrivalRateChange {
                    agent: "A".to_string(),
                    multiplier: 2.0,
                },
                schedule: EventSchedule::OneTime { tick: 0 },
            }],
            &agents(),
        )
        .unwrap();

        let mut state = SimulationState::new(vec![
            Agent::new("A".to_string(), 0, 0),
            Agent::new("B".to_string(), 0, 0),
        ]);
        let mut arrivals = empty_generator();

        handler.execute_tick_events(&mut state, &mut arrivals, 0, 1_000);
        assert_eq!(arrivals.rate_for("A"), Some(2.0));
    }
}
