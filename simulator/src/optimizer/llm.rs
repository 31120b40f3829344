//! Policy-generation client contract
//!
//! The optimization loop asks an external service for candidate policies.
//! The core crate defines only the contract: a request carrying prompts, the
//! machine-readable constraint schema, and a derivation seed, and a response
//! that must parse into a policy tree. Every failure mode (transport, parse,
//! validation, timeout) maps to a rejected proposal, never a fatal error;
//! retries are bounded by the loop.
//!
//! No network implementation lives here. Tests and deterministic runs use
//! [`MockProposer`].

use crate::policy::tree::DecisionTreeDef;
use thiserror::Error;

/// A policy-generation request
#[derive(Debug, Clone)]
pub struct PolicyRequest {
    /// Role framing for the generator
    pub system_prompt: String,

    /// Iteration-specific context: current policy, cost breakdown, history
    pub user_prompt: String,

    /// Machine-readable grammar constraints (policy schema JSON)
    pub constraints_schema: String,

    /// Derivation seed: implementations that support seeded generation must
    /// honor it so the optimization trace is reproducible
    pub seed: u64,
}

/// Why a proposal attempt failed. Always recoverable: the loop records a
/// rejection and moves on.
#[derive(Debug, Error)]
pub enum ProposalError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Response did not parse as a policy: {0}")]
    Parse(String),

    #[error("Proposed policy failed validation: {0}")]
    Validation(String),

    #[error("Request timed out")]
    Timeout,
}

/// The policy-generation contract
pub trait PolicyProposer {
    /// Produce a candidate policy for the request
    fn propose(&mut self, request: &PolicyRequest) -> Result<DecisionTreeDef, ProposalError>;
}

/// Deterministic proposer for tests and offline runs: cycles through a fixed
/// list of candidate policies.
#[derive(Debug, Clone)]
pub struct MockProposer {
    candidates: Vec<DecisionTreeDef>,
    next: usize,
}

impl MockProposer {
    /// Always propose the same candidate
    pub fn fixed(candidate: DecisionTreeDef) -> Self {
        Self {
            candidates: vec![candidate],
            next: 0,
        }
    }

    /// Cycle through a list of candidates
    pub fn cycling(candidates: Vec<DecisionTreeDef>) -> Self {
        assert!(!candidates.is_empty(), "need at least one candidate");
        Self {
            candidates,
            next: 0,
        }
    }
}

impl PolicyProposer for MockProposer {
    fn propose(&mut self, _request: &PolicyRequest) -> Result<DecisionTreeDef, ProposalError> {
        let candidate = self.candidates[self.next % self.candidates.len()].clone();
        self.next += 1;
        Ok(candidate)
    }
}

/// Proposer that always fails; exercises the rejection path
#[derive(Debug, Clone, Default)]
pub struct FailingProposer;

impl PolicyProposer for FailingProposer {
    fn propose(&mut self, _request: &PolicyRequest) -> Result<DecisionTreeDef, ProposalError> {
        Err(ProposalError::Transport("unavailable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fifo_def() -> DecisionTreeDef {
        serde_json::from_str(
            r#"{
            "version": "1.0",
            "policy_id": "fifo_policy",
            "payment_tree": {"node_id": "A1", "type": "action", "action": "Release"}
        }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_mock_proposer_cycles() {
        let mut def_b = fifo_def();
        def_b.policy_id = "other".to_string();
        let mut proposer = MockProposer::cycling(vec![fifo_def(), def_b]);

        let request = PolicyRequest {
            system_prompt: String::new(),
            user_prompt: String::new(),
            constraints_schema: String::new(),
            seed: 0,
        };

        assert_eq!(proposer.propose(&request).unwrap().policy_id, "fifo_policy");
        assert_eq!(proposer.propose(&request).unwrap().policy_id, "other");
        assert_eq!(proposer.propose(&request).unwrap().policy_id, "fifo_policy");
    }
}
