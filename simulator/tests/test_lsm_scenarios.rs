//! LSM end-to-end scenarios
//!
//! Bilateral offset smoke test, three-ring cycle settlement, and gridlock
//! with the LSM disabled. Transactions are queued directly into Queue 2 to
//! model simultaneous submission.

use rtgs_simulator_core::settlement::lsm::{run_lsm_pass, LsmConfig};
use rtgs_simulator_core::{Agent, Event, SimulationState, Transaction, TransactionStatus};

fn create_agent(id: &str, balance: i64, unsecured_cap: i64) -> Agent {
    Agent::new(id.to_string(), balance, unsecured_cap)
}

fn queue_tx(state: &mut SimulationState, sender: &str, receiver: &str, amount: i64) -> String {
    let tx = Transaction::new(sender.to_string(), receiver.to_string(), amount, 0, 100);
    let id = tx.id().to_string();
    state.add_transaction(tx);
    state.queue_transaction(id.clone());
    id
}

// ============================================================================
// Scenario: bilateral offset smoke
// ============================================================================

#[test]
fn test_bilateral_offset_smoke() {
    // A and B each open with $1,000 and a $5,000 unsecured cap; they owe
    // each other $3,000 simultaneously.
    let agents = vec![
        create_agent("BANK_A", 100_000, 500_000),
        create_agent("BANK_B", 100_000, 500_000),
    ];
    let mut state = SimulationState::new(agents);

    let tx_ab = queue_tx(&mut state, "BANK_A", "BANK_B", 300_000);
    let tx_ba = queue_tx(&mut state, "BANK_B", "BANK_A", 300_000);

    let config = LsmConfig {
        enable_bilateral: true,
        enable_cycles: false,
        ..Default::default()
    };
    let result = run_lsm_pass(&mut state, &config, 1);

    assert_eq!(result.bilateral_offsets, 1, "exactly one LSM offset");
    assert_eq!(result.queue_size_after, 0);

    for tx_id in [&tx_ab, &tx_ba] {
        assert!(matches!(
            state.get_transaction(tx_id).unwrap().status(),
            TransactionStatus::Settled { .. }
        ));
    }

    // Equal gross flows: both balances unchanged
    assert_eq!(state.get_agent("BANK_A").unwrap().balance(), 100_000);
    assert_eq!(state.get_agent("BANK_B").unwrap().balance(), 100_000);

    let offset_events = result
        .events
        .iter()
        .filter(|e| matches!(e, Event::LsmBilateralOffset { .. }))
        .count();
    assert_eq!(offset_events, 1);
}

// ============================================================================
// Scenario: three-ring cycle
// ============================================================================

#[test]
fn test_three_ring_cycle() {
    // A→B→C→A, $2,000 each. Net positions are all zero; the ring settles
    // with no liquidity at all.
    let agents = vec![
        create_agent("A", 50_000, 500_000),
        create_agent("B", 50_000, 500_000),
        create_agent("C", 50_000, 500_000),
    ];
    let mut state = SimulationState::new(agents);

    queue_tx(&mut state, "A", "B", 200_000);
    queue_tx(&mut state, "B", "C", 200_000);
    queue_tx(&mut state, "C", "A", 200_000);

    let result = run_lsm_pass(&mut state, &LsmConfig::default(), 1);

    assert_eq!(result.cycles_settled, 1);
    assert_eq!(result.queue_size_after, 0);

    for id in ["A", "B", "C"] {
        assert_eq!(
            state.get_agent(id).unwrap().balance(),
            50_000,
            "net zero for each ring member"
        );
    }
}

#[test]
fn test_cycle_settlement_balance_sum_is_zero() {
    let agents = vec![
        create_agent("A", 0, 0),
        create_agent("B", 300_000, 0),
        create_agent("C", 0, 0),
    ];
    let mut state = SimulationState::new(agents);

    queue_tx(&mut state, "A", "B", 500_000);
    queue_tx(&mut state, "B", "C", 800_000);
    queue_tx(&mut state, "C", "A", 700_000);

    let before: i64 = ["A", "B", "C"]
        .iter()
        .map(|id| state.get_agent(id).unwrap().balance())
        .sum();
    let result = run_lsm_pass(&mut state, &LsmConfig::default(), 1);
    let after: i64 = ["A", "B", "C"]
        .iter()
        .map(|id| state.get_agent(id).unwrap().balance())
        .sum();

    assert_eq!(result.cycles_settled, 1);
    assert_eq!(before, after, "cycle settlement conserves total balance");
}

// ============================================================================
// Scenario: gridlock without LSM
// ============================================================================

#[test]
fn test_gridlock_without_lsm() {
    let agents = vec![
        create_agent("A", 50_000, 0),
        create_agent("B", 50_000, 0),
        create_agent("C", 50_000, 0),
    ];
    let mut state = SimulationState::new(agents);

    queue_tx(&mut state, "A", "B", 200_000);
    queue_tx(&mut state, "B", "C", 200_000);
    queue_tx(&mut state, "C", "A", 200_000);

    let config = LsmConfig {
        enable_bilateral: false,
        enable_cycles: false,
        ..Default::default()
    };
    let result = run_lsm_pass(&mut state, &config, 1);

    assert_eq!(result.cycles_settled, 0);
    assert_eq!(result.bilateral_offsets, 0);
    assert_eq!(result.total_settled_value, 0);
    assert_eq!(state.queue_size(), 3, "gridlock persists");

    for id in ["A", "B", "C"] {
        assert_eq!(state.get_agent(id).unwrap().balance(), 50_000);
    }
}

// ============================================================================
// Boundary: net payer exactly at the funding edge
// ============================================================================

#[test]
fn test_cycle_boundary_exact_funding() {
    // A→B 500k, B→C 800k, C→A 700k: B is the only net payer (-300k)
    let build = |b_cap: i64| {
        let agents = vec![
            create_agent("A", 0, 0),
            create_agent("B", 0, b_cap),
            create_agent("C", 0, 0),
        ];
        let mut state = SimulationState::new(agents);
        queue_tx(&mut state, "A", "B", 500_000);
        queue_tx(&mut state, "B", "C", 800_000);
        queue_tx(&mut state, "C", "A", 700_000);
        state
    };

    // Headroom exactly covers the net: settles
    let mut exact = build(300_000);
    let result = run_lsm_pass(&mut exact, &LsmConfig::default(), 1);
    assert_eq!(result.cycles_settled, 1);
    assert_eq!(exact.get_agent("B").unwrap().balance(), -300_000);

    // One cent short: all-or-nothing rejection
    let mut short = build(299_999);
    let result = run_lsm_pass(&mut short, &LsmConfig::default(), 1);
    assert_eq!(result.cycles_settled, 0);
    assert_eq!(short.queue_size(), 3);
    for id in ["A", "B", "C"] {
        assert_eq!(short.get_agent(id).unwrap().balance(), 0);
    }
}
