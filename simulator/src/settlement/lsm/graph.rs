//! Graph-based cycle detection for the LSM
//!
//! The payment graph is ephemeral: built from Queue 2 at the start of each
//! cycle sub-pass and discarded afterwards. Queue 2 mutates too heavily to
//! cache it across ticks.
//!
//! Detection strategy:
//! - Tarjan SCC prefilter: only components with ≥ 3 members can hold a
//!   multilateral cycle
//! - Triangle enumeration fast path (3-cycles dominate in practice)
//! - Bounded DFS for cycle lengths 4..=max_cycle_length
//!
//! Everything iterates in sorted order (BTreeMap adjacency, lexicographic
//! vertex indexing) so candidate discovery is deterministic.

use crate::models::state::SimulationState;
use std::collections::{BTreeMap, BTreeSet};

/// Aggregated payment graph from Queue 2
///
/// Vertices: agents with queued payments. Edges: aggregated directed flows
/// (sender → receiver) carrying the summed amount and the contributing
/// transaction IDs in enqueue order.
#[derive(Debug, Clone, Default)]
pub struct AggregatedGraph {
    /// Agent ID → vertex index (lexicographic, stable)
    agent_to_index: BTreeMap<String, usize>,

    /// Vertex index → agent ID
    index_to_agent: Vec<String>,

    /// Adjacency: sender_idx → receiver_idx → (total_amount, tx_ids)
    adj: BTreeMap<usize, BTreeMap<usize, (i64, Vec<String>)>>,
}

impl AggregatedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the aggregated graph from the current queue state
    pub fn from_queue(state: &SimulationState) -> Self {
        let mut graph = Self::new();

        let mut agent_set: BTreeSet<String> = BTreeSet::new();
        for tx_id in state.rtgs_queue() {
            if let Some(tx) = state.get_transaction(tx_id) {
                agent_set.insert(tx.sender_id().to_string());
                agent_set.insert(tx.receiver_id().to_string());
            }
        }

        for (idx, agent_id) in agent_set.iter().enumerate() {
            graph.agent_to_index.insert(agent_id.clone(), idx);
            graph.index_to_agent.push(agent_id.clone());
        }

        for tx_id in state.rtgs_queue() {
            if let Some(tx) = state.get_transaction(tx_id) {
                let sender_idx = graph.agent_to_index[tx.sender_id()];
                let receiver_idx = graph.agent_to_index[tx.receiver_id()];

                let edge = graph
                    .adj
                    .entry(sender_idx)
                    .or_default()
                    .entry(receiver_idx)
                    .or_insert((0, Vec::new()));
                edge.0 += tx.remaining_amount();
                edge.1.push(tx_id.clone());
            }
        }

        graph
    }

    pub fn vertex_count(&self) -> usize {
        self.index_to_agent.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adj.values().map(|neighbors| neighbors.len()).sum()
    }

    /// Edge data (total amount, contributing tx IDs) if the edge exists
    pub fn edge_data(&self, sender: &str, receiver: &str) -> Option<(i64, Vec<String>)> {
        let sender_idx = self.agent_to_index.get(sender)?;
        let receiver_idx = self.agent_to_index.get(receiver)?;
        self.adj
            .get(sender_idx)
            .and_then(|neighbors| neighbors.get(receiver_idx))
            .cloned()
    }

    pub fn agent_by_index(&self, idx: usize) -> Option<&str> {
        self.index_to_agent.get(idx).map(|s| s.as_str())
    }

    /// Outgoing neighbors of a vertex, sorted
    pub fn out_neighbors(&self, vertex_idx: usize) -> Vec<usize> {
        self.adj
            .get(&vertex_idx)
            .map(|neighbors| neighbors.keys().copied().collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// SCC Finder - Tarjan's Algorithm
// ============================================================================

/// Strongly connected component finder (Tarjan)
///
/// O(V+E), deterministic visit order. Only SCCs with size ≥ 3 can contain
/// multilateral cycles.
pub struct SccFinder;

struct TarjanState {
    index: usize,
    indices: Vec<Option<usize>>,
    lowlinks: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    sccs: Vec<Vec<usize>>,
}

impl SccFinder {
    /// Find all strongly connected components as agent-ID sets
    pub fn find_sccs(graph: &AggregatedGraph) -> Vec<BTreeSet<String>> {
        let n = graph.vertex_count();
        if n == 0 {
            return Vec::new();
        }

        let mut state = TarjanState {
            index: 0,
            indices: vec![None; n],
            lowlinks: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            sccs: Vec::new(),
        };

        for v in 0..n {
            if state.indices[v].is_none() {
                Self::strongconnect(graph, v, &mut state);
            }
        }

        state
            .sccs
            .into_iter()
            .map(|scc| {
                scc.into_iter()
                    .filter_map(|idx| graph.agent_by_index(idx).map(|s| s.to_string()))
                    .collect()
            })
            .collect()
    }

    fn strongconnect(graph: &AggregatedGraph, v: usize, state: &mut TarjanState) {
        state.indices[v] = Some(state.index);
        state.lowlinks[v] = state.index;
        state.index += 1;
        state.stack.push(v);
        state.on_stack[v] = true;

        for &w in &graph.out_neighbors(v) {
            if state.indices[w].is_none() {
                Self::strongconnect(graph, w, state);
                state.lowlinks[v] = state.lowlinks[v].min(state.lowlinks[w]);
            } else if state.on_stack[w] {
                state.lowlinks[v] = state.lowlinks[v].min(state.indices[w].unwrap());
            }
        }

        if Some(state.lowlinks[v]) == state.indices[v] {
            let mut scc = Vec::new();
            loop {
                let w = state.stack.pop().unwrap();
                state.on_stack[w] = false;
                scc.push(w);
                if w == v {
                    break;
                }
            }
            scc.sort_unstable();
            state.sccs.push(scc);
        }
    }
}

// ============================================================================
// Cycle candidates
// ============================================================================

/// A candidate payment cycle (any length ≥ 3)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleCandidate {
    /// Agent IDs in cycle order, first repeated at the end
    pub agents: Vec<String>,

    /// All transaction IDs across the cycle's edges, edge order
    pub transactions: Vec<String>,

    /// Aggregated edge amounts in cycle order
    pub edge_amounts: Vec<i64>,

    /// Total value across all transactions in the cycle
    pub total_value: i64,
}

impl CycleCandidate {
    /// Number of distinct agents in the cycle
    pub fn len(&self) -> usize {
        self.agents.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical key for deduplication: the edge set is invariant under
    /// rotation of the cycle, so rotate to start at the smallest agent ID.
    pub fn canonical_key(&self) -> Vec<String> {
        let n = self.len();
        if n == 0 {
            return Vec::new();
        }
        let nodes = &self.agents[..n];
        let start = nodes
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        (0..n).map(|i| nodes[(start + i) % n].clone()).collect()
    }
}

// ============================================================================
// Triangle finder (3-cycles)
// ============================================================================

/// Fast 3-cycle enumeration: u→v→w→u with u the minimal index, so each
/// directed triangle is found exactly once (both orientations of a pair of
/// mutual triangles are distinct cycles and are both reported)
pub struct TriangleFinder;

impl TriangleFinder {
    pub fn find_triangles(graph: &AggregatedGraph) -> Vec<CycleCandidate> {
        let mut triangles = Vec::new();
        let n = graph.vertex_count();

        for u in 0..n {
            for &v in &graph.out_neighbors(u) {
                if v <= u {
                    continue;
                }
                for &w in &graph.out_neighbors(v) {
                    if w <= u || w == v {
                        continue;
                    }
                    if graph.out_neighbors(w).contains(&u) {
                        if let Some(candidate) = Self::build_candidate(graph, u, v, w) {
                            triangles.push(candidate);
                        }
                    }
                }
            }
        }

        triangles
    }

    fn build_candidate(
        graph: &AggregatedGraph,
        u: usize,
        v: usize,
        w: usize,
    ) -> Option<CycleCandidate> {
        let agent_u = graph.agent_by_index(u)?;
        let agent_v = graph.agent_by_index(v)?;
        let agent_w = graph.agent_by_index(w)?;

        let (amt_uv, txs_uv) = graph.edge_data(agent_u, agent_v)?;
        let (amt_vw, txs_vw) = graph.edge_data(agent_v, agent_w)?;
        let (amt_wu, txs_wu) = graph.edge_data(agent_w, agent_u)?;

        let agents = vec![
            agent_u.to_string(),
            agent_v.to_string(),
            agent_w.to_string(),
            agent_u.to_string(),
        ];

        let mut transactions = Vec::new();
        transactions.extend(txs_uv);
        transactions.extend(txs_vw);
        transactions.extend(txs_wu);

        Some(CycleCandidate {
            agents,
            transactions,
            edge_amounts: vec![amt_uv, amt_vw, amt_wu],
            total_value: amt_uv + amt_vw + amt_wu,
        })
    }
}

// ============================================================================
// Bounded DFS (cycles of length 4..=max)
// ============================================================================

/// Find simple cycles of length 4..=max_length via depth-bounded DFS.
///
/// Each cycle is reported once: only paths whose start vertex is the minimum
/// index on the cycle are accepted.
pub fn find_long_cycles(graph: &AggregatedGraph, max_length: usize) -> Vec<CycleCandidate> {
    let mut cycles = Vec::new();
    if max_length < 4 {
        return cycles;
    }
    let n = graph.vertex_count();

    for start in 0..n {
        let mut path = vec![start];
        let mut on_path = vec![false; n];
        on_path[start] = true;
        dfs_from(graph, start, start, max_length, &mut path, &mut on_path, &mut cycles);
    }

    cycles
}

fn dfs_from(
    graph: &AggregatedGraph,
    start: usize,
    current: usize,
    max_length: usize,
    path: &mut Vec<usize>,
    on_path: &mut Vec<bool>,
    cycles: &mut Vec<CycleCandidate>,
) {
    for &next in &graph.out_neighbors(current) {
        if next == start && path.len() >= 4 {
            if let Some(candidate) = build_from_path(graph, path) {
                cycles.push(candidate);
            }
        } else if !on_path[next] && next > start && path.len() < max_length {
            // next > start keeps the start vertex minimal on the cycle,
            // so each cycle is discovered from exactly one root
            path.push(next);
            on_path[next] = true;
            dfs_from(graph, start, next, max_length, path, on_path, cycles);
            on_path[next] = false;
            path.pop();
        }
    }
}

fn build_from_path(graph: &AggregatedGraph, path: &[usize]) -> Option<CycleCandidate> {
    let mut agents: Vec<String> = path
        .iter()
        .map(|&idx| graph.agent_by_index(idx).map(|s| s.to_string()))
        .collect::<Option<Vec<_>>>()?;
    agents.push(agents[0].clone());

    let mut transactions = Vec::new();
    let mut edge_amounts = Vec::new();
    let mut total_value = 0i64;

    for window in agents.windows(2) {
        let (amount, txs) = graph.edge_data(&window[0], &window[1])?;
        total_value += amount;
        edge_amounts.push(amount);
        transactions.extend(txs);
    }

    Some(CycleCandidate {
        agents,
        transactions,
        edge_amounts,
        total_value,
    })
}
