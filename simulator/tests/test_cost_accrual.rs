//! Cost accrual: overdraft, delay (with priority bands and the overdue
//! multiplier), the one-time deadline penalty, and EOD penalties.
//!
//! Delay cost applies to Queue 1 residents only; Queue 2 waits are free.

use rtgs_simulator_core::events::{EventSchedule, ScenarioEvent, ScheduledEvent};
use rtgs_simulator_core::{
    AgentConfig, CostRates, Event, Orchestrator, OrchestratorConfig, PolicySpec,
    PriorityDelayMultipliers,
};

fn agent(id: &str, balance: i64, cap: i64, policy: PolicySpec) -> AgentConfig {
    AgentConfig {
        id: id.to_string(),
        opening_balance: balance,
        unsecured_cap: cap,
        policy,
        arrival_config: None,
        posted_collateral: None,
        max_collateral_capacity: None,
        collateral_haircut: None,
        liquidity_buffer: None,
    }
}

fn base_config(agents: Vec<AgentConfig>, rates: CostRates) -> OrchestratorConfig {
    OrchestratorConfig {
        ticks_per_day: 30,
        num_days: 1,
        rng_seed: 1,
        eod_rush_threshold: 0.8,
        agent_configs: agents,
        cost_rates: rates,
        lsm_config: Default::default(),
        scenario_events: None,
        max_pacing_factor: 8,
        max_queue2_size: None,
        deadline_cap_at_eod: false,
    }
}

fn inject(tick: usize, sender: &str, receiver: &str, amount: i64, deadline_offset: usize, priority: u8) -> ScheduledEvent {
    ScheduledEvent {
        event: ScenarioEvent::CustomTransactionArrival {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
            deadline_offset,
            priority,
            divisible: false,
        },
        schedule: EventSchedule::OneTime { tick },
    }
}

/// Policy that never releases: everything stays in Queue 1
fn always_hold() -> PolicySpec {
    PolicySpec::FromJson {
        json: r#"{
            "version": "1.0",
            "policy_id": "always_hold",
            "payment_tree": {
                "node_id": "A_Hold",
                "type": "action",
                "action": "Hold",
                "reason": "AwaitingInflows"
            }
        }"#
        .to_string(),
    }
}

#[test]
fn test_overdraft_cost_on_credit_used() {
    // A pays 600k from a 100k balance with a 1M cap: 500k of credit in use
    let rates = CostRates {
        overdraft_bps_per_tick: 10.0, // exaggerated for visibility
        delay_cost_per_tick_per_cent: 0.0,
        ..Default::default()
    };
    let mut cfg = base_config(
        vec![
            agent("BANK_A", 100_000, 1_000_000, PolicySpec::Fifo),
            agent("BANK_B", 0, 0, PolicySpec::Fifo),
        ],
        rates,
    );
    cfg.scenario_events = Some(vec![inject(0, "BANK_A", "BANK_B", 600_000, 20, 5)]);

    let mut engine = Orchestrator::new(cfg).unwrap();
    let result = engine.tick().unwrap();

    // credit_used = 500_000; 10 bps = 500_000 * 10 / 10_000 = 500 cents
    assert_eq!(result.cost_deltas["BANK_A"].overdraft_cost, 500);
    assert_eq!(result.cost_deltas["BANK_B"].overdraft_cost, 0);
}

#[test]
fn test_delay_cost_applies_to_queue1_only() {
    let rates = CostRates {
        overdraft_bps_per_tick: 0.0,
        delay_cost_per_tick_per_cent: 0.001,
        deadline_penalty: 0,
        ..Default::default()
    };

    // Holder keeps its payment in Queue 1; Fifo releases an unaffordable
    // payment into Queue 2. Only the holder pays delay.
    let mut cfg = base_config(
        vec![
            agent("HOLDER", 1_000_000, 0, always_hold()),
            agent("RELEASER", 0, 0, PolicySpec::Fifo),
            agent("SINK", 0, 0, PolicySpec::Fifo),
        ],
        rates,
    );
    cfg.scenario_events = Some(vec![
        inject(0, "HOLDER", "SINK", 100_000, 25, 5),
        inject(0, "RELEASER", "SINK", 100_000, 25, 5),
    ]);

    let mut engine = Orchestrator::new(cfg).unwrap();
    engine.tick().unwrap();
    let result = engine.tick().unwrap();

    // 100_000 * 0.001 = 100 cents per tick for the Queue 1 resident
    assert_eq!(result.cost_deltas["HOLDER"].delay_cost, 100);
    assert_eq!(
        result.cost_deltas["RELEASER"].delay_cost, 0,
        "Queue 2 waits are free"
    );
}

#[test]
fn test_deadline_penalty_charged_exactly_once() {
    let rates = CostRates {
        overdraft_bps_per_tick: 0.0,
        delay_cost_per_tick_per_cent: 0.0,
        deadline_penalty: 50_000,
        eod_penalty_per_transaction: 0,
        ..Default::default()
    };
    let mut cfg = base_config(
        vec![
            agent("BANK_A", 1_000_000, 0, always_hold()),
            agent("BANK_B", 0, 0, PolicySpec::Fifo),
        ],
        rates,
    );
    // Deadline at tick 5; held forever
    cfg.scenario_events = Some(vec![inject(0, "BANK_A", "BANK_B", 100_000, 5, 5)]);

    let mut engine = Orchestrator::new(cfg).unwrap();
    let mut penalty_total = 0i64;
    for _ in 0..15 {
        let result = engine.tick().unwrap();
        penalty_total += result.cost_deltas["BANK_A"].penalty_cost;
    }

    assert_eq!(penalty_total, 50_000, "penalty fires once, not per tick");
    assert_eq!(
        engine.event_log().events_of_type("TransactionOverdue").len(),
        1
    );
}

#[test]
fn test_overdue_delay_multiplier_continues_after_penalty() {
    let rates = CostRates {
        overdraft_bps_per_tick: 0.0,
        delay_cost_per_tick_per_cent: 0.001,
        deadline_penalty: 0,
        eod_penalty_per_transaction: 0,
        overdue_delay_multiplier: 5.0,
        ..Default::default()
    };
    let mut cfg = base_config(
        vec![
            agent("BANK_A", 1_000_000, 0, always_hold()),
            agent("BANK_B", 0, 0, PolicySpec::Fifo),
        ],
        rates,
    );
    cfg.scenario_events = Some(vec![inject(0, "BANK_A", "BANK_B", 100_000, 3, 5)]);

    let mut engine = Orchestrator::new(cfg).unwrap();
    let mut per_tick = Vec::new();
    for _ in 0..6 {
        let result = engine.tick().unwrap();
        per_tick.push(result.cost_deltas["BANK_A"].delay_cost);
    }

    // Base delay 100/tick until the deadline passes at tick 4, then 5x
    assert_eq!(per_tick[..4], [100, 100, 100, 100]);
    assert_eq!(per_tick[4..], [500, 500]);
}

#[test]
fn test_priority_band_multipliers() {
    let rates = CostRates {
        overdraft_bps_per_tick: 0.0,
        delay_cost_per_tick_per_cent: 0.001,
        deadline_penalty: 0,
        eod_penalty_per_transaction: 0,
        priority_delay_multipliers: Some(PriorityDelayMultipliers {
            urgent_multiplier: 2.0,
            normal_multiplier: 1.0,
            low_multiplier: 0.5,
        }),
        ..Default::default()
    };
    let mut cfg = base_config(
        vec![
            agent("BANK_A", 1_000_000, 0, always_hold()),
            agent("BANK_B", 0, 0, PolicySpec::Fifo),
        ],
        rates,
    );
    cfg.scenario_events = Some(vec![
        inject(0, "BANK_A", "BANK_B", 100_000, 25, 9), // urgent
        inject(0, "BANK_A", "BANK_B", 100_000, 25, 5), // normal
        inject(0, "BANK_A", "BANK_B", 100_000, 25, 1), // low
    ]);

    let mut engine = Orchestrator::new(cfg).unwrap();
    let result = engine.tick().unwrap();

    // 100k at 0.001: urgent 200 + normal 100 + low 50 = 350 cents
    assert_eq!(result.cost_deltas["BANK_A"].delay_cost, 350);
}

#[test]
fn test_eod_penalty_per_residual_transaction() {
    let rates = CostRates {
        overdraft_bps_per_tick: 0.0,
        delay_cost_per_tick_per_cent: 0.0,
        deadline_penalty: 0,
        eod_penalty_per_transaction: 10_000,
        ..Default::default()
    };
    let mut cfg = base_config(
        vec![
            agent("BANK_A", 1_000_000, 0, always_hold()),
            agent("BANK_B", 0, 0, PolicySpec::Fifo),
        ],
        rates,
    );
    cfg.scenario_events = Some(vec![
        inject(0, "BANK_A", "BANK_B", 100_000, 60, 5),
        inject(0, "BANK_A", "BANK_B", 100_000, 60, 5),
    ]);

    let mut engine = Orchestrator::new(cfg).unwrap();
    engine.run_to_completion().unwrap();

    let eod_events = engine.event_log().events_of_type("EodPenalty");
    assert_eq!(eod_events.len(), 2, "one penalty per residual Queue 1 tx");
    assert_eq!(
        engine.total_costs("BANK_A").unwrap().total_penalty_cost,
        20_000
    );
}

#[test]
fn test_event_stream_sums_to_recorded_costs() {
    // The accounting identity: for each agent, CostAccrued plus EodPenalty
    // events sum to the recorded total.
    let rates = CostRates {
        overdraft_bps_per_tick: 2.0,
        delay_cost_per_tick_per_cent: 0.0005,
        deadline_penalty: 25_000,
        eod_penalty_per_transaction: 10_000,
        ..Default::default()
    };
    let mut cfg = base_config(
        vec![
            agent("BANK_A", 50_000, 500_000, always_hold()),
            agent("BANK_B", 0, 0, PolicySpec::Fifo),
        ],
        rates,
    );
    cfg.scenario_events = Some(vec![
        inject(0, "BANK_A", "BANK_B", 100_000, 5, 8),
        inject(2, "BANK_A", "BANK_B", 200_000, 60, 3),
    ]);

    let mut engine = Orchestrator::new(cfg).unwrap();
    engine.run_to_completion().unwrap();

    let mut event_sum = 0i64;
    for event in engine.event_log().events() {
        match event {
            Event::CostAccrued {
                agent_id, costs, ..
            } if agent_id == "BANK_A" => event_sum += costs.total(),
            Event::EodPenalty {
                agent_id, penalty, ..
            } if agent_id == "BANK_A" => event_sum += penalty,
            _ => {}
        }
    }

    assert_eq!(event_sum, engine.total_costs("BANK_A").unwrap().total());
}
