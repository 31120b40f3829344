//! Persistence contract
//!
//! The engine and the optimization loop write through this narrow interface;
//! nothing in the core reads it back. Writes are fire-and-forget: a failing
//! sink is logged and skipped, never fatal. Engines running concurrently
//! must be wired to distinct sinks or distinct run IDs within one sink.
//!
//! The record shapes mirror the relational layout an external store would
//! use (runs, events, iterations, policy evaluations); all money columns are
//! i64 cents.

use crate::models::Event;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors surfaced by a sink. Callers log and continue.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink write failed: {0}")]
    WriteFailed(String),

    #[error("Unknown run: {0}")]
    UnknownRun(String),
}

/// A simulation run registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub seed: u64,
    /// "context" | "evaluation" | "standalone"
    pub purpose: String,
    /// Experiment this run belongs to, if any
    pub experiment_id: Option<String>,
    pub iteration: Option<usize>,
}

/// One optimization iteration summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub experiment_id: String,
    pub iteration: usize,
    pub agent_id: String,
    pub costs_per_agent: BTreeMap<String, i64>,
    pub accepted: bool,
}

/// One policy evaluation (paired bootstrap comparison)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub experiment_id: String,
    pub iteration: usize,
    pub agent_id: String,
    /// Serialized candidate policy
    pub proposed_policy: String,
    /// Mean candidate cost across samples (cents)
    pub proposed_cost: i64,
    /// Mean incumbent cost across samples (cents)
    pub current_best_cost: i64,
    pub accepted: bool,
    pub acceptance_reason: String,
    /// Per-sample cost_old − cost_new (cents)
    pub deltas: Vec<i64>,
}

/// The narrow write contract the core depends on
pub trait EventSink {
    /// Register a run before its events arrive
    fn record_run(&mut self, run: &RunRecord) -> Result<(), SinkError>;

    /// Append one event of a run. `seq` is the event's position in the
    /// run's log; together with the run ID it is the replay key.
    fn record_event(&mut self, run_id: &str, seq: usize, event: &Event) -> Result<(), SinkError>;

    /// Record an optimization iteration summary
    fn record_iteration(&mut self, record: &IterationRecord) -> Result<(), SinkError>;

    /// Record a policy evaluation
    fn record_evaluation(&mut self, record: &EvaluationRecord) -> Result<(), SinkError>;

    /// Make all prior writes durable
    fn flush(&mut self) -> Result<(), SinkError>;
}

/// In-memory sink with run-scoped namespaces.
///
/// The reference implementation of the contract; replay-identity tests
/// compare the event streams of two runs recorded here.
#[derive(Debug, Default)]
pub struct MemorySink {
    runs: BTreeMap<String, RunRecord>,
    events: BTreeMap<String, Vec<(usize, Event)>>,
    iterations: Vec<IterationRecord>,
    evaluations: Vec<EvaluationRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(&self, run_id: &str) -> Option<&RunRecord> {
        self.runs.get(run_id)
    }

    /// Events of a run, in sequence order
    pub fn events(&self, run_id: &str) -> &[(usize, Event)] {
        self.events.get(run_id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn iterations(&self) -> &[IterationRecord] {
        &self.iterations
    }

    pub fn evaluations(&self) -> &[EvaluationRecord] {
        &self.evaluations
    }
}

impl EventSink for MemorySink {
    fn record_run(&mut self, run: &RunRecord) -> Result<(), SinkError> {
        self.runs.insert(run.run_id.clone(), run.clone());
        self.events.entry(run.run_id.clone()).or_default();
        Ok(())
    }

    fn record_event(&mut self, run_id: &str, seq: usize, event: &Event) -> Result<(), SinkError> {
        let run_events = self
            .events
            .get_mut(run_id)
            .ok_or_else(|| SinkError::UnknownRun(run_id.to_string()))?;
        run_events.push((seq, event.clone()));
        Ok(())
    }

    fn record_iteration(&mut self, record: &IterationRecord) -> Result<(), SinkError> {
        self.iterations.push(record.clone());
        Ok(())
    }

    fn record_evaluation(&mut self, record: &EvaluationRecord) -> Result<(), SinkError> {
        self.evaluations.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Write a full event log to a sink under one run, logging (not
/// propagating) sink failures.
pub fn drain_events_to_sink(
    sink: &mut dyn EventSink,
    run_id: &str,
    events: &[Event],
) {
    for (seq, event) in events.iter().enumerate() {
        if let Err(error) = sink.record_event(run_id, seq, event) {
            tracing::warn!(run_id, seq, %error, "event sink write failed; continuing");
        }
    }
}
