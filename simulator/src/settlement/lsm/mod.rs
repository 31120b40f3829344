//! LSM (Liquidity-Saving Mechanisms)
//!
//! Dissolves Queue 2 gridlock by settling groups of whole transactions whose
//! net positions are fundable:
//!
//! - **Bilateral offsetting**: all queued A↔B transactions settle together,
//!   funded only by the net difference of the two gross flows
//! - **Multilateral cycle settlement**: a directed ring of payments settles
//!   atomically, each member funding only its net position within the ring
//!
//! Every payment settles at full value or not at all; there is no partial
//! netting of individual transactions. If any participant cannot fund its
//! net position, the whole group is rejected and the queue is unchanged.
//!
//! # Example: bilateral
//!
//! A owes B 500k, B owes A 300k. Gross liquidity needed without LSM: 800k.
//! With LSM both legs settle and only the 200k net flows; A must be able to
//! fund 200k, B funds nothing.
//!
//! # Example: cycle with unequal values
//!
//! A→B 500k, B→C 800k, C→A 700k. Net positions: A +200k, B −300k, C +100k.
//! If B can fund 300k, all three payments settle at full value (2M of gross
//! settlement for 300k of liquidity).

pub mod graph;
pub mod pair_index;

use crate::models::event::Event;
use crate::models::state::SimulationState;
use crate::settlement::rtgs::process_queue;
use graph::{AggregatedGraph, CycleCandidate, SccFinder, TriangleFinder};
use pair_index::PairIndex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Configuration for LSM behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LsmConfig {
    /// Enable bilateral offsetting (A↔B netting)
    pub enable_bilateral: bool,

    /// Enable cycle detection and settlement
    pub enable_cycles: bool,

    /// Maximum cycle length to detect (3-5 typical)
    pub max_cycle_length: usize,

    /// Maximum LSM iterations per tick (settlements change the graph, so
    /// detection reruns until no progress or this cap)
    pub max_iterations: usize,
}

impl Default for LsmConfig {
    fn default() -> Self {
        Self {
            enable_bilateral: true,
            enable_cycles: true,
            max_cycle_length: 4,
            max_iterations: 3,
        }
    }
}

/// Result of the bilateral offsetting sub-pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BilateralOffsetResult {
    /// Number of pairs offset
    pub pairs_offset: usize,

    /// Gross value settled across both directions
    pub gross_value: i64,

    /// Number of transactions settled
    pub settlements_count: usize,

    /// Events describing each offset, for the orchestrator to log
    pub events: Vec<Event>,
}

/// Result of a complete LSM pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LsmPassResult {
    /// Number of iterations run
    pub iterations_run: usize,

    /// Number of bilateral offsets performed
    pub bilateral_offsets: usize,

    /// Number of cycles settled
    pub cycles_settled: usize,

    /// Gross value settled by the LSM (offsets + cycles + unlocked retries)
    pub total_settled_value: i64,

    /// Queue size before the pass
    pub queue_size_before: usize,

    /// Queue size after the pass
    pub queue_size_after: usize,

    /// Events describing offsets and cycles, in execution order
    pub events: Vec<Event>,
}

// ============================================================================
// Bilateral offsetting
// ============================================================================

/// Find and settle bilateral offsetting opportunities.
///
/// Pops ready pairs from the incremental pair index in deterministic priority
/// order (largest liquidity release first). For each pair, both directions
/// settle in full if the net sender can fund the net difference.
pub fn bilateral_offset(state: &mut SimulationState, tick: usize) -> BilateralOffsetResult {
    let mut result = BilateralOffsetResult::default();
    let mut to_remove: BTreeSet<String> = BTreeSet::new();

    let mut index = PairIndex::from_queue(state);

    while let Some(key) = index.pop_ready() {
        let agent_a = key.agent_a().to_string();
        let agent_b = key.agent_b().to_string();

        let sum_ab = index.flow_sum(&agent_a, &agent_b);
        let sum_ba = index.flow_sum(&agent_b, &agent_a);
        let (txs_ab, txs_ba) = index.pair_transactions(&key);

        let net = (sum_ab - sum_ba).abs();
        let net_sender = if sum_ab >= sum_ba { &agent_a } else { &agent_b };

        // The net sender must stay within its overdraft limit after paying
        // the net difference
        let fundable = {
            let sender = state.get_agent(net_sender).expect("agent exists");
            sender.balance() - net >= -sender.allowed_overdraft_limit()
        };
        if !fundable {
            continue;
        }

        // Atomic: settle every transaction in both directions at full value
        for tx_id in txs_ab.iter().chain(txs_ba.iter()) {
            let Some(tx) = state.get_transaction(tx_id) else {
                continue;
            };
            let amount = tx.remaining_amount();
            let sender_id = tx.sender_id().to_string();
            let receiver_id = tx.receiver_id().to_string();

            state.get_agent_mut(&sender_id).unwrap().adjust_balance(-amount);
            state.get_agent_mut(&receiver_id).unwrap().adjust_balance(amount);
            state
                .get_transaction_mut(tx_id)
                .unwrap()
                .settle(amount, tick)
                .expect("queued transaction settles");
            state
                .get_agent_mut(&sender_id)
                .unwrap()
                .record_sent_value(&receiver_id, amount);

            to_remove.insert(tx_id.clone());
            result.settlements_count += 1;
        }

        let mut tx_ids = txs_ab.clone();
        tx_ids.extend(txs_ba.clone());

        result.pairs_offset += 1;
        result.gross_value += sum_ab + sum_ba;
        result.events.push(Event::LsmBilateralOffset {
            tick,
            agent_a: agent_a.clone(),
            agent_b: agent_b.clone(),
            amount_a_to_b: sum_ab,
            amount_b_to_a: sum_ba,
            tx_ids,
        });
    }

    if !to_remove.is_empty() {
        state.rtgs_queue_mut().retain(|id| !to_remove.contains(id));
    }

    result
}

// ============================================================================
// Cycle settlement
// ============================================================================

/// Why a candidate cycle could not settle
#[derive(Debug, PartialEq)]
pub enum CycleRejection {
    /// Some transaction in the cycle no longer exists or already settled
    StaleTransaction,

    /// Net positions did not sum to zero (should be impossible for a ring)
    ConservationViolated { sum: i64 },

    /// A net payer cannot fund its net outflow
    InsufficientLiquidity {
        agent_id: String,
        required: i64,
        available: i64,
    },
}

/// Net position per agent in the cycle: Σ inbound − Σ outbound
fn cycle_net_positions(
    state: &SimulationState,
    cycle: &CycleCandidate,
) -> Option<BTreeMap<String, i64>> {
    let mut positions: BTreeMap<String, i64> = BTreeMap::new();

    for tx_id in &cycle.transactions {
        let tx = state.get_transaction(tx_id)?;
        if tx.is_fully_settled() {
            return None;
        }
        *positions.entry(tx.sender_id().to_string()).or_insert(0) -= tx.remaining_amount();
        *positions.entry(tx.receiver_id().to_string()).or_insert(0) += tx.remaining_amount();
    }

    Some(positions)
}

/// Attempt to settle a candidate cycle atomically.
///
/// Phase 1 (read-only): net positions, conservation, funding checks against
/// the agents' *current* balances — which already reflect any cycles settled
/// earlier in this tick. Phase 2: settle every transaction at full value.
pub fn settle_cycle(
    state: &mut SimulationState,
    cycle: &CycleCandidate,
    tick: usize,
    to_remove: &mut BTreeSet<String>,
) -> Result<BTreeMap<String, i64>, CycleRejection> {
    let Some(net_positions) = cycle_net_positions(state, cycle) else {
        return Err(CycleRejection::StaleTransaction);
    };

    let sum: i64 = net_positions.values().sum();
    if sum != 0 {
        return Err(CycleRejection::ConservationViolated { sum });
    }

    for (agent_id, &net) in &net_positions {
        if net < 0 {
            let agent = state
                .get_agent(agent_id)
                .ok_or(CycleRejection::StaleTransaction)?;
            let projected = agent.balance() + net;
            if projected < -agent.allowed_overdraft_limit() {
                return Err(CycleRejection::InsufficientLiquidity {
                    agent_id: agent_id.clone(),
                    required: -net,
                    available: agent.effective_liquidity(),
                });
            }
        }
    }

    // All checks passed: settle every transaction at full value
    for tx_id in &cycle.transactions {
        let tx = state.get_transaction(tx_id).unwrap();
        let amount = tx.remaining_amount();
        let sender_id = tx.sender_id().to_string();
        let receiver_id = tx.receiver_id().to_string();

        state.get_agent_mut(&sender_id).unwrap().adjust_balance(-amount);
        state.get_agent_mut(&receiver_id).unwrap().adjust_balance(amount);
        state
            .get_transaction_mut(tx_id)
            .unwrap()
            .settle(amount, tick)
            .expect("queued transaction settles");
        state
            .get_agent_mut(&sender_id)
            .unwrap()
            .record_sent_value(&receiver_id, amount);

        to_remove.insert(tx_id.clone());
    }

    Ok(net_positions)
}

/// Detect candidate cycles in the current queue.
///
/// Triangles come from the SCC-gated fast path; longer cycles (4..=max) from
/// bounded DFS. Candidates are deduplicated by canonical key and ordered by
/// the settlement preference: greater aggregate value, then shorter cycle,
/// then lexicographic agent IDs.
pub fn detect_cycles(state: &SimulationState, max_cycle_length: usize) -> Vec<CycleCandidate> {
    let agg = AggregatedGraph::from_queue(state);
    if agg.vertex_count() < 3 {
        return Vec::new();
    }

    let mut candidates = Vec::new();

    let sccs = SccFinder::find_sccs(&agg);
    if sccs.iter().any(|scc| scc.len() >= 3) {
        candidates.extend(TriangleFinder::find_triangles(&agg));
    }

    if max_cycle_length >= 4 {
        candidates.extend(graph::find_long_cycles(&agg, max_cycle_length));
    }

    let mut seen: BTreeSet<Vec<String>> = BTreeSet::new();
    candidates.retain(|c| c.len() >= 3 && seen.insert(c.canonical_key()));

    candidates.sort_by(|a, b| {
        b.total_value
            .cmp(&a.total_value)
            .then_with(|| a.len().cmp(&b.len()))
            .then_with(|| a.agents.cmp(&b.agents))
    });

    candidates
}

// ============================================================================
// LSM coordinator
// ============================================================================

/// Run a complete LSM pass over Queue 2.
///
/// Each iteration: bilateral offsetting, a queue retry (offsets may unlock
/// plain settlements), cycle detection and settlement, another retry.
/// Iterates until no progress or `max_iterations`.
pub fn run_lsm_pass(
    state: &mut SimulationState,
    config: &LsmConfig,
    tick: usize,
) -> LsmPassResult {
    let mut result = LsmPassResult {
        queue_size_before: state.queue_size(),
        ..Default::default()
    };

    while result.iterations_run < config.max_iterations && !state.rtgs_queue().is_empty() {
        result.iterations_run += 1;
        let settled_before_iteration = result.total_settled_value;

        if config.enable_bilateral {
            let bilateral = bilateral_offset(state, tick);
            result.bilateral_offsets += bilateral.pairs_offset;
            result.total_settled_value += bilateral.gross_value;
            result.events.extend(bilateral.events);

            if bilateral.settlements_count > 0 {
                let retry = process_queue(state, tick);
                result.total_settled_value += retry.settled_value;
            }
        }

        if config.enable_cycles && !state.rtgs_queue().is_empty() {
            let mut to_remove: BTreeSet<String> = BTreeSet::new();
            let candidates = detect_cycles(state, config.max_cycle_length);
            let mut any_settled = false;

            for cycle in &candidates {
                // Earlier settlements this iteration may have consumed some
                // of this candidate's transactions
                if cycle.transactions.iter().any(|id| to_remove.contains(id)) {
                    continue;
                }
                match settle_cycle(state, cycle, tick, &mut to_remove) {
                    Ok(net_positions) => {
                        any_settled = true;
                        result.cycles_settled += 1;
                        result.total_settled_value += cycle.total_value;

                        let ordered_nets: Vec<i64> = cycle.agents[..cycle.len()]
                            .iter()
                            .map(|id| net_positions.get(id).copied().unwrap_or(0))
                            .collect();
                        let max_net_outflow = ordered_nets
                            .iter()
                            .filter(|&&n| n < 0)
                            .map(|n| -n)
                            .max()
                            .unwrap_or(0);

                        result.events.push(Event::LsmCycleSettled {
                            tick,
                            agents: cycle.agents.clone(),
                            tx_ids: cycle.transactions.clone(),
                            total_value: cycle.total_value,
                            net_positions: ordered_nets,
                            max_net_outflow,
                        });
                    }
                    Err(_rejection) => {
                        // All-or-nothing: rejected cycles leave the queue
                        // untouched
                    }
                }
            }

            if !to_remove.is_empty() {
                state.rtgs_queue_mut().retain(|id| !to_remove.contains(id));
            }

            if any_settled {
                let retry = process_queue(state, tick);
                result.total_settled_value += retry.settled_value;
            }
        }

        if result.total_settled_value == settled_before_iteration {
            break;
        }
    }

    result.queue_size_after = state.queue_size();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Agent, Transaction};

    fn queue_tx(state: &mut SimulationState, sender: &str, receiver: &str, amount: i64) -> String {
        let tx = Transaction::new(sender.to_string(), receiver.to_string(), amount, 0, 100);
        let id = tx.id().to_string();
        state.add_transaction(tx);
        state.queue_transaction(id.clone());
        id
    }

    #[test]
    fn test_bilateral_equal_amounts_zero_liquidity() {
        let mut state = SimulationState::new(vec![
            Agent::new("BANK_A".to_string(), 0, 0),
            Agent::new("BANK_B".to_string(), 0, 0),
        ]);
        queue_tx(&mut state, "BANK_A", "BANK_B", 500_000);
        queue_tx(&mut state, "BANK_B", "BANK_A", 500_000);

        let result = bilateral_offset(&mut state, 5);

        assert_eq!(result.pairs_offset, 1);
        assert_eq!(result.settlements_count, 2);
        assert_eq!(state.queue_size(), 0);
        assert_eq!(state.get_agent("BANK_A").unwrap().balance(), 0);
        assert_eq!(state.get_agent("BANK_B").unwrap().balance(), 0);
    }

    #[test]
    fn test_bilateral_asymmetric_needs_net_funding() {
        let mut state = SimulationState::new(vec![
            Agent::new("BANK_A".to_string(), 200_000, 0),
            Agent::new("BANK_B".to_string(), 0, 0),
        ]);
        queue_tx(&mut state, "BANK_A", "BANK_B", 500_000);
        queue_tx(&mut state, "BANK_B", "BANK_A", 300_000);

        let result = bilateral_offset(&mut state, 5);

        assert_eq!(result.pairs_offset, 1);
        assert_eq!(state.get_agent("BANK_A").unwrap().balance(), 0);
        assert_eq!(state.get_agent("BANK_B").unwrap().balance(), 200_000);
    }

    #[test]
    fn test_bilateral_rejected_when_net_unfundable() {
        let mut state = SimulationState::new(vec![
            Agent::new("BANK_A".to_string(), 100_000, 0),
            Agent::new("BANK_B".to_string(), 0, 0),
        ]);
        // Net is 200k A→B but A only has 100k and no credit
        queue_tx(&mut state, "BANK_A", "BANK_B", 500_000);
        queue_tx(&mut state, "BANK_B", "BANK_A", 300_000);

        let result = bilateral_offset(&mut state, 5);

        assert_eq!(result.pairs_offset, 0);
        assert_eq!(state.queue_size(), 2);
        assert_eq!(state.get_agent("BANK_A").unwrap().balance(), 100_000);
    }

    #[test]
    fn test_three_ring_equal_settles_at_zero() {
        let mut state = SimulationState::new(vec![
            Agent::new("A".to_string(), 50_000, 0),
            Agent::new("B".to_string(), 50_000, 0),
            Agent::new("C".to_string(), 50_000, 0),
        ]);
        queue_tx(&mut state, "A", "B", 200_000);
        queue_tx(&mut state, "B", "C", 200_000);
        queue_tx(&mut state, "C", "A", 200_000);

        let result = run_lsm_pass(&mut state, &LsmConfig::default(), 1);

        assert_eq!(result.cycles_settled, 1);
        assert_eq!(result.queue_size_after, 0);
        for id in ["A", "B", "C"] {
            assert_eq!(state.get_agent(id).unwrap().balance(), 50_000);
        }
    }

    #[test]
    fn test_unequal_ring_settles_iff_net_payer_funded() {
        // A→B 500k, B→C 800k, C→A 700k. B is the only net payer at 300k.
        let build = |b_balance: i64| {
            let mut state = SimulationState::new(vec![
                Agent::new("A".to_string(), 0, 0),
                Agent::new("B".to_string(), b_balance, 0),
                Agent::new("C".to_string(), 0, 0),
            ]);
            queue_tx(&mut state, "A", "B", 500_000);
            queue_tx(&mut state, "B", "C", 800_000);
            queue_tx(&mut state, "C", "A", 700_000);
            state
        };

        let mut funded = build(300_000);
        let result = run_lsm_pass(&mut funded, &LsmConfig::default(), 1);
        assert_eq!(result.cycles_settled, 1);
        assert_eq!(funded.get_agent("A").unwrap().balance(), 200_000);
        assert_eq!(funded.get_agent("B").unwrap().balance(), 0);
        assert_eq!(funded.get_agent("C").unwrap().balance(), 100_000);

        let mut starved = build(299_999);
        let result = run_lsm_pass(&mut starved, &LsmConfig::default(), 1);
        assert_eq!(result.cycles_settled, 0);
        assert_eq!(starved.queue_size(), 3, "rejected cycle leaves queue intact");
    }

    #[test]
    fn test_cycle_settlement_conserves_balances() {
        let mut state = SimulationState::new(vec![
            Agent::new("A".to_string(), 100_000, 500_000),
            Agent::new("B".to_string(), 100_000, 500_000),
            Agent::new("C".to_string(), 100_000, 500_000),
        ]);
        queue_tx(&mut state, "A", "B", 300_000);
        queue_tx(&mut state, "B", "C", 450_000);
        queue_tx(&mut state, "C", "A", 150_000);

        let before = state.total_balance();
        let result = run_lsm_pass(&mut state, &LsmConfig::default(), 1);
        assert_eq!(result.cycles_settled, 1);
        assert_eq!(state.total_balance(), before);
    }

    #[test]
    fn test_disabled_lsm_does_nothing() {
        let mut state = SimulationState::new(vec![
            Agent::new("A".to_string(), 0, 0),
            Agent::new("B".to_string(), 0, 0),
            Agent::new("C".to_string(), 0, 0),
        ]);
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
        assert_eq!(state.queue_size(), 3);
    }

    #[test]
    fn test_cycle_events_carry_net_positions() {
        let mut state = SimulationState::new(vec![
            Agent::new("A".to_string(), 0, 0),
            Agent::new("B".to_string(), 300_000, 0),
            Agent::new("C".to_string(), 0, 0),
        ]);
        queue_tx(&mut state, "A", "B", 500_000);
        queue_tx(&mut state, "B", "C", 800_000);
        queue_tx(&mut state, "C", "A", 700_000);

        let result = run_lsm_pass(&mut state, &LsmConfig::default(), 1);
        let cycle_events: Vec<_> = result
            .events
            .iter()
            .filter(|e| matches!(e, Event::LsmCycleSettled { .. }))
            .collect();
        assert_eq!(cycle_events.len(), 1);

        if let Event::LsmCycleSettled {
            net_positions,
            max_net_outflow,
            total_value,
            ..
        } = cycle_events[0]
        {
            assert_eq!(net_positions.iter().sum::<i64>(), 0);
            assert_eq!(*max_net_outflow, 300_000);
            assert_eq!(*total_value, 2_000_000);
        }
    }
}
