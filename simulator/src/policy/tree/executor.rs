//! TreePolicy: a validated, executable policy
//!
//! Wraps a [`DecisionTreeDef`] that has passed validation and exposes typed
//! evaluation entry points per tree. Parameter injection (for the built-in
//! policy variants) merges into the definition's parameter table.

use super::context::EvalContext;
use super::interpreter::{
    build_bank_decision, build_collateral_decision, build_payment_decision, traverse, EvalError,
};
use super::types::DecisionTreeDef;
use super::validation::{validate_tree, ValidationError};
use crate::policy::{BankDecision, CollateralDecision, ReleaseDecision};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors loading a policy
#[derive(Debug, Error)]
pub enum TreePolicyError {
    #[error("Policy JSON parse error: {0}")]
    Parse(String),

    #[error("Policy validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A validated decision-tree policy
#[derive(Debug, Clone)]
pub struct TreePolicy {
    def: DecisionTreeDef,
}

impl TreePolicy {
    /// Wrap a definition, validating it first
    pub fn from_def(def: DecisionTreeDef) -> Result<Self, TreePolicyError> {
        validate_tree(&def).map_err(TreePolicyError::Validation)?;
        Ok(Self { def })
    }

    /// Parse and validate a JSON policy
    pub fn from_json(json: &str) -> Result<Self, TreePolicyError> {
        let def: DecisionTreeDef =
            serde_json::from_str(json).map_err(|e| TreePolicyError::Parse(e.to_string()))?;
        Self::from_def(def)
    }

    /// Merge parameters into the policy (built-in parameter injection)
    pub fn with_parameters(mut self, params: BTreeMap<String, f64>) -> Self {
        self.def.parameters.extend(params);
        self
    }

    pub fn policy_id(&self) -> &str {
        &self.def.policy_id
    }

    pub fn def(&self) -> &DecisionTreeDef {
        &self.def
    }

    pub fn has_payment_tree(&self) -> bool {
        self.def.payment_tree.is_some()
    }

    pub fn has_strategic_collateral_tree(&self) -> bool {
        self.def.strategic_collateral_tree.is_some()
    }

    pub fn has_end_of_tick_collateral_tree(&self) -> bool {
        self.def.end_of_tick_collateral_tree.is_some()
    }

    pub fn has_bank_tree(&self) -> bool {
        self.def.bank_tree.is_some()
    }

    /// Evaluate the payment tree for one transaction
    pub fn evaluate_payment(
        &self,
        context: &EvalContext,
        tx_id: String,
        max_pacing_factor: usize,
    ) -> Result<ReleaseDecision, EvalError> {
        let root = self
            .def
            .payment_tree
            .as_ref()
            .ok_or(EvalError::MissingTree("payment_tree"))?;
        let action = traverse(root, context, &self.def.parameters)?;
        build_payment_decision(action, tx_id, context, &self.def.parameters, max_pacing_factor)
    }

    /// Evaluate the strategic collateral tree, if defined
    pub fn evaluate_strategic_collateral(
        &self,
        context: &EvalContext,
    ) -> Option<Result<CollateralDecision, EvalError>> {
        let root = self.def.strategic_collateral_tree.as_ref()?;
        Some(
            traverse(root, context, &self.def.parameters).and_then(|action| {
                build_collateral_decision(action, context, &self.def.parameters)
            }),
        )
    }

    /// Evaluate the end-of-tick collateral tree, if defined
    pub fn evaluate_end_of_tick_collateral(
        &self,
        context: &EvalContext,
    ) -> Option<Result<CollateralDecision, EvalError>> {
        let root = self.def.end_of_tick_collateral_tree.as_ref()?;
        Some(
            traverse(root, context, &self.def.parameters).and_then(|action| {
                build_collateral_decision(action, context, &self.def.parameters)
            }),
        )
    }

    /// Evaluate the bank tree, if defined
    pub fn evaluate_bank(
        &self,
        context: &EvalContext,
    ) -> Option<Result<BankDecision, EvalError>> {
        let root = self.def.bank_tree.as_ref()?;
        Some(
            traverse(root, context, &self.def.parameters)
                .and_then(|action| build_bank_decision(action, context, &self.def.parameters)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costs::CostRates;
    use crate::models::{Agent, SimulationState, Transaction};

    fn payment_context(balance: i64, amount: i64, ticks_to_deadline: i64) -> EvalContext {
        let agent = Agent::new("BANK_A".to_string(), balance, 0);
        let tick = 10usize;
        let deadline = (tick as i64 + ticks_to_deadline) as usize;
        let tx = Transaction::new(
            "BANK_A".to_string(),
            "BANK_B".to_string(),
            amount,
            0,
            deadline.max(1),
        );
        let state = SimulationState::new(vec![agent.clone()]);
        EvalContext::payment(&tx, &agent, &state, tick, &CostRates::default(), 100, 0.8)
    }

    const LIQUIDITY_GATE: &str = r#"{
        "version": "1.0",
        "policy_id": "liquidity_gate",
        "payment_tree": {
            "node_id": "N1",
            "type": "condition",
            "condition": {
                "op": ">=",
                "left": {"field": "effective_liquidity"},
                "right": {"field": "amount"}
            },
            "on_true": {"node_id": "A1", "type": "action", "action": "Release"},
            "on_false": {"node_id": "A2", "type": "action", "action": "Hold", "reason": "InsufficientLiquidity"}
        }
    }"#;

    #[test]
    fn test_load_and_evaluate() {
        let policy = TreePolicy::from_json(LIQUIDITY_GATE).unwrap();
        assert_eq!(policy.policy_id(), "liquidity_gate");

        let rich = payment_context(1_000_000, 100_000, 40);
        let decision = policy
            .evaluate_payment(&rich, "tx".to_string(), 8)
            .unwrap();
        assert!(matches!(decision, ReleaseDecision::Release { .. }));

        let poor = payment_context(10_000, 100_000, 40);
        let decision = policy.evaluate_payment(&poor, "tx".to_string(), 8).unwrap();
        assert!(matches!(decision, ReleaseDecision::Hold { .. }));
    }

    #[test]
    fn test_invalid_policy_rejected_at_load() {
        let bad = r#"{
            "version": "1.0",
            "policy_id": "bad",
            "payment_tree": {"node_id": "A1", "type": "action", "action": "HoldCollateral"}
        }"#;
        assert!(matches!(
            TreePolicy::from_json(bad),
            Err(TreePolicyError::Validation(_))
        ));
    }

    #[test]
    fn test_parameter_injection() {
        let json = r#"{
            "version": "1.0",
            "policy_id": "parametrized",
            "payment_tree": {
                "node_id": "N1",
                "type": "condition",
                "condition": {
                    "op": "<=",
                    "left": {"field": "ticks_to_deadline"},
                    "right": {"param": "urgency_threshold"}
                },
                "on_true": {"node_id": "A1", "type": "action", "action": "Release"},
                "on_false": {"node_id": "A2", "type": "action", "action": "Hold"}
            },
            "parameters": {"urgency_threshold": 5.0}
        }"#;

        let policy = TreePolicy::from_json(json)
            .unwrap()
            .with_parameters(BTreeMap::from([("urgency_threshold".to_string(), 50.0)]));

        // With the injected threshold of 50, a 40-tick deadline is urgent
        let ctx = payment_context(0, 100_000, 40);
        let decision = policy.evaluate_payment(&ctx, "tx".to_string(), 8).unwrap();
        assert!(matches!(decision, ReleaseDecision::Release { .. }));
    }

    #[test]
    fn test_missing_payment_tree_reported() {
        let json = r#"{
            "version": "1.0",
            "policy_id": "collateral_only",
            "strategic_collateral_tree": {
                "node_id": "C1", "type": "action", "action": "HoldCollateral"
            }
        }"#;
        let policy = TreePolicy::from_json(json).unwrap();
        let ctx = payment_context(0, 100_000, 40);

        assert_eq!(
            policy.evaluate_payment(&ctx, "tx".to_string(), 8),
            Err(EvalError::MissingTree("payment_tree"))
        );
        assert!(policy.evaluate_strategic_collateral(&ctx).is_some());
        assert!(policy.evaluate_bank(&ctx).is_none());
    }
}
