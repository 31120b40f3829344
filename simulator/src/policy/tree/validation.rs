//! Decision tree validation
//!
//! Pre-execution safety checks, run once at tree load:
//! - node ID uniqueness across all trees of a policy
//! - tree depth bound (configurable; interpreter carries a hard cap too)
//! - field references legal for the tree's kind
//! - parameter references exist in the parameters dict
//! - action family matches the tree (no collateral actions in a payment
//!   tree, and so on)
//! - state-register keys are well-formed
//! - static division-by-zero risk (literal zero divisor)
//!
//! Unknown field names never reach here: they fail at deserialization.

use super::fields::TreeKind;
use super::types::{ActionNode, Computation, DecisionTreeDef, Expression, TreeNode, ValueExpr};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Duplicate node ID: {0}")]
    DuplicateNodeId(String),

    #[error("Tree depth {actual} exceeds maximum {max}")]
    ExcessiveDepth { actual: usize, max: usize },

    #[error("Field '{field}' is not available in {tree} trees (node {node_id})")]
    FieldNotAllowed {
        field: String,
        tree: &'static str,
        node_id: String,
    },

    #[error("Parameter reference '{0}' not found in tree parameters")]
    InvalidParameterReference(String),

    #[error("Action {action} is not valid in a {tree} tree (node {node_id})")]
    ActionNotAllowed {
        action: &'static str,
        tree: &'static str,
        node_id: String,
    },

    #[error("State register key '{0}' is not of the form bank_state_0..bank_state_9")]
    InvalidRegisterKey(String),

    #[error("Literal zero divisor in computation at node {0}")]
    DivisionByZeroRisk(String),

    #[error("Policy defines no trees")]
    EmptyPolicy,
}

/// Validation result: all errors found, not just the first
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Default depth bound applied at load
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// Validate a complete policy definition with the default depth bound
pub fn validate_tree(def: &DecisionTreeDef) -> ValidationResult {
    validate_tree_with_depth(def, DEFAULT_MAX_DEPTH)
}

/// Validate a complete policy definition
pub fn validate_tree_with_depth(def: &DecisionTreeDef, max_depth: usize) -> ValidationResult {
    let mut errors = Vec::new();

    let trees: [(&Option<TreeNode>, TreeKind, &'static str); 4] = [
        (&def.payment_tree, TreeKind::Payment, "payment"),
        (
            &def.strategic_collateral_tree,
            TreeKind::Collateral,
            "collateral",
        ),
        (
            &def.end_of_tick_collateral_tree,
            TreeKind::Collateral,
            "collateral",
        ),
        (&def.bank_tree, TreeKind::Bank, "bank"),
    ];

    if trees.iter().all(|(t, _, _)| t.is_none()) {
        return Err(vec![ValidationError::EmptyPolicy]);
    }

    let mut seen_ids = HashSet::new();
    for (tree, kind, tree_name) in trees {
        if let Some(root) = tree {
            check_node_ids(root, &mut seen_ids, &mut errors);

            let depth = tree_depth(root, 0);
            if depth > max_depth {
                errors.push(ValidationError::ExcessiveDepth {
                    actual: depth,
                    max: max_depth,
                });
            }

            check_node(root, kind, tree_name, &def.parameters, &mut errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_node_ids(
    node: &TreeNode,
    seen: &mut HashSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    if !seen.insert(node.node_id().to_string()) {
        errors.push(ValidationError::DuplicateNodeId(node.node_id().to_string()));
    }

    if let TreeNode::Condition {
        on_true, on_false, ..
    } = node
    {
        check_node_ids(on_true, seen, errors);
        check_node_ids(on_false, seen, errors);
    }
}

fn tree_depth(node: &TreeNode, current: usize) -> usize {
    match node {
        TreeNode::Action { .. } => current,
        TreeNode::Condition {
            on_true, on_false, ..
        } => tree_depth(on_true, current + 1).max(tree_depth(on_false, current + 1)),
    }
}

fn check_node(
    node: &TreeNode,
    kind: TreeKind,
    tree_name: &'static str,
    params: &BTreeMap<String, f64>,
    errors: &mut Vec<ValidationError>,
) {
    match node {
        TreeNode::Condition {
            node_id,
            condition,
            on_true,
            on_false,
            ..
        } => {
            check_expression(condition, kind, tree_name, node_id, params, errors);
            check_node(on_true, kind, tree_name, params, errors);
            check_node(on_false, kind, tree_name, params, errors);
        }

        TreeNode::Action { node_id, action } => {
            check_action(action, kind, tree_name, node_id, params, errors);
        }
    }
}

fn check_action(
    action: &ActionNode,
    kind: TreeKind,
    tree_name: &'static str,
    node_id: &str,
    params: &BTreeMap<String, f64>,
    errors: &mut Vec<ValidationError>,
) {
    let allowed = match kind {
        TreeKind::Payment => matches!(
            action,
            ActionNode::Release | ActionNode::Hold { .. } | ActionNode::Drop | ActionNode::Split { .. }
        ),
        TreeKind::Collateral => matches!(
            action,
            ActionNode::PostCollateral { .. }
                | ActionNode::WithdrawCollateral { .. }
                | ActionNode::HoldCollateral
        ),
        TreeKind::Bank => matches!(
            action,
            ActionNode::SetState { .. } | ActionNode::AddState { .. } | ActionNode::NoAction
        ),
    };

    if !allowed {
        errors.push(ValidationError::ActionNotAllowed {
            action: action.action_name(),
            tree: tree_name,
            node_id: node_id.to_string(),
        });
    }

    match action {
        ActionNode::Split { num_splits } => {
            check_value(num_splits, kind, tree_name, node_id, params, errors);
        }
        ActionNode::PostCollateral { amount, .. }
        | ActionNode::WithdrawCollateral { amount, .. } => {
            check_value(amount, kind, tree_name, node_id, params, errors);
        }
        ActionNode::SetState { key, value, .. } => {
            check_register_key(key, errors);
            check_value(value, kind, tree_name, node_id, params, errors);
        }
        ActionNode::AddState { key, delta, .. } => {
            check_register_key(key, errors);
            check_value(delta, kind, tree_name, node_id, params, errors);
        }
        _ => {}
    }
}

fn check_register_key(key: &str, errors: &mut Vec<ValidationError>) {
    let valid = key
        .strip_prefix("bank_state_")
        .and_then(|suffix| suffix.parse::<usize>().ok())
        .map(|idx| idx < 10)
        .unwrap_or(false);
    if !valid {
        errors.push(ValidationError::InvalidRegisterKey(key.to_string()));
    }
}

fn check_expression(
    expr: &Expression,
    kind: TreeKind,
    tree_name: &'static str,
    node_id: &str,
    params: &BTreeMap<String, f64>,
    errors: &mut Vec<ValidationError>,
) {
    match expr {
        Expression::Equal { left, right }
        | Expression::NotEqual { left, right }
        | Expression::LessThan { left, right }
        | Expression::LessOrEqual { left, right }
        | Expression::GreaterThan { left, right }
        | Expression::GreaterOrEqual { left, right } => {
            check_value(left, kind, tree_name, node_id, params, errors);
            check_value(right, kind, tree_name, node_id, params, errors);
        }

        Expression::And { conditions } | Expression::Or { conditions } => {
            for condition in conditions {
                check_expression(condition, kind, tree_name, node_id, params, errors);
            }
        }

        Expression::Not { condition } => {
            check_expression(condition, kind, tree_name, node_id, params, errors);
        }
    }
}

fn check_value(
    value: &ValueExpr,
    kind: TreeKind,
    tree_name: &'static str,
    node_id: &str,
    params: &BTreeMap<String, f64>,
    errors: &mut Vec<ValidationError>,
) {
    match value {
        ValueExpr::Field { field } => {
            if !field.allowed_in(kind) {
                errors.push(ValidationError::FieldNotAllowed {
                    field: field.name().to_string(),
                    tree: tree_name,
                    node_id: node_id.to_string(),
                });
            }
        }

        ValueExpr::Param { param } => {
            if !params.contains_key(param) {
                errors.push(ValidationError::InvalidParameterReference(param.clone()));
            }
        }

        ValueExpr::Literal { .. } => {}

        ValueExpr::Compute { compute } => {
            check_computation(compute, kind, tree_name, node_id, params, errors);
        }
    }
}

fn check_computation(
    computation: &Computation,
    kind: TreeKind,
    tree_name: &'static str,
    node_id: &str,
    params: &BTreeMap<String, f64>,
    errors: &mut Vec<ValidationError>,
) {
    match computation {
        Computation::Add { left, right }
        | Computation::Subtract { left, right }
        | Computation::Multiply { left, right } => {
            check_value(left, kind, tree_name, node_id, params, errors);
            check_value(right, kind, tree_name, node_id, params, errors);
        }

        Computation::Divide { left, right } => {
            check_value(left, kind, tree_name, node_id, params, errors);
            check_value(right, kind, tree_name, node_id, params, errors);
            if matches!(right, ValueExpr::Literal { value } if value.abs() < 1e-9) {
                errors.push(ValidationError::DivisionByZeroRisk(node_id.to_string()));
            }
        }

        Computation::Max { values } | Computation::Min { values } => {
            for value in values {
                check_value(value, kind, tree_name, node_id, params, errors);
            }
        }

        Computation::Ceil { value }
        | Computation::Floor { value }
        | Computation::Round { value }
        | Computation::Abs { value } => {
            check_value(value, kind, tree_name, node_id, params, errors);
        }

        Computation::Clamp { value, min, max } => {
            check_value(value, kind, tree_name, node_id, params, errors);
            check_value(min, kind, tree_name, node_id, params, errors);
            check_value(max, kind, tree_name, node_id, params, errors);
        }

        Computation::SafeDiv {
            numerator,
            denominator,
            default,
        } => {
            check_value(numerator, kind, tree_name, node_id, params, errors);
            check_value(denominator, kind, tree_name, node_id, params, errors);
            check_value(default, kind, tree_name, node_id, params, errors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> DecisionTreeDef {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_valid_minimal_policy() {
        let def = parse(
            r#"{
            "version": "1.0",
            "policy_id": "ok",
            "payment_tree": {"node_id": "A1", "type": "action", "action": "Release"}
        }"#,
        );
        assert!(validate_tree(&def).is_ok());
    }

    #[test]
    fn test_empty_policy_rejected() {
        let def = parse(r#"{"version": "1.0", "policy_id": "empty"}"#);
        assert_eq!(
            validate_tree(&def).unwrap_err(),
            vec![ValidationError::EmptyPolicy]
        );
    }

    #[test]
    fn test_duplicate_node_ids() {
        let def = parse(
            r#"{
            "version": "1.0",
            "policy_id": "dup",
            "payment_tree": {
                "node_id": "N1",
                "type": "condition",
                "condition": {"op": ">", "left": {"field": "balance"}, "right": {"value": 0}},
                "on_true": {"node_id": "N1", "type": "action", "action": "Release"},
                "on_false": {"node_id": "A2", "type": "action", "action": "Hold"}
            }
        }"#,
        );
        let errors = validate_tree(&def).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateNodeId("N1".to_string())));
    }

    #[test]
    fn test_transaction_field_rejected_in_collateral_tree() {
        let def = parse(
            r#"{
            "version": "1.0",
            "policy_id": "bad_collateral",
            "strategic_collateral_tree": {
                "node_id": "C1",
                "type": "condition",
                "condition": {"op": ">", "left": {"field": "amount"}, "right": {"value": 0}},
                "on_true": {"node_id": "C2", "type": "action", "action": "HoldCollateral"},
                "on_false": {"node_id": "C3", "type": "action", "action": "HoldCollateral"}
            }
        }"#,
        );
        let errors = validate_tree(&def).unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::FieldNotAllowed { field, .. } if field == "amount"
        )));
    }

    #[test]
    fn test_missing_parameter_reference() {
        let def = parse(
            r#"{
            "version": "1.0",
            "policy_id": "missing_param",
            "payment_tree": {
                "node_id": "N1",
                "type": "condition",
                "condition": {"op": "<", "left": {"field": "ticks_to_deadline"}, "right": {"param": "urgency"}},
                "on_true": {"node_id": "A1", "type": "action", "action": "Release"},
                "on_false": {"node_id": "A2", "type": "action", "action": "Hold"}
            },
            "parameters": {}
        }"#,
        );
        let errors = validate_tree(&def).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidParameterReference(
            "urgency".to_string()
        )));
    }

    #[test]
    fn test_collateral_action_rejected_in_payment_tree() {
        let def = parse(
            r#"{
            "version": "1.0",
            "policy_id": "wrong_action",
            "payment_tree": {"node_id": "A1", "type": "action", "action": "HoldCollateral"}
        }"#,
        );
        let errors = validate_tree(&def).unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::ActionNotAllowed { action: "HoldCollateral", .. }
        )));
    }

    #[test]
    fn test_depth_bound() {
        // Build a chain of depth 3, validate with max_depth 2
        let def = parse(
            r#"{
            "version": "1.0",
            "policy_id": "deep",
            "payment_tree": {
                "node_id": "N1",
                "type": "condition",
                "condition": {"op": ">", "left": {"field": "balance"}, "right": {"value": 0}},
                "on_true": {
                    "node_id": "N2",
                    "type": "condition",
                    "condition": {"op": ">", "left": {"field": "balance"}, "right": {"value": 1}},
                    "on_true": {
                        "node_id": "N3",
                        "type": "condition",
                        "condition": {"op": ">", "left": {"field": "balance"}, "right": {"value": 2}},
                        "on_true": {"node_id": "A1", "type": "action", "action": "Release"},
                        "on_false": {"node_id": "A2", "type": "action", "action": "Hold"}
                    },
                    "on_false": {"node_id": "A3", "type": "action", "action": "Hold"}
                },
                "on_false": {"node_id": "A4", "type": "action", "action": "Hold"}
            }
        }"#,
        );
        let errors = validate_tree_with_depth(&def, 2).unwrap_err();
        assert!(errors.contains(&ValidationError::ExcessiveDepth { actual: 3, max: 2 }));
        assert!(validate_tree_with_depth(&def, 3).is_ok());
    }

    #[test]
    fn test_literal_zero_divisor_flagged() {
        let def = parse(
            r#"{
            "version": "1.0",
            "policy_id": "div_zero",
            "payment_tree": {
                "node_id": "N1",
                "type": "condition",
                "condition": {
                    "op": ">",
                    "left": {"compute": {"op": "/", "left": {"field": "amount"}, "right": {"value": 0}}},
                    "right": {"value": 1}
                },
                "on_true": {"node_id": "A1", "type": "action", "action": "Release"},
                "on_false": {"node_id": "A2", "type": "action", "action": "Hold"}
            }
        }"#,
        );
        let errors = validate_tree(&def).unwrap_err();
        assert!(errors.contains(&ValidationError::DivisionByZeroRisk("N1".to_string())));
    }

    #[test]
    fn test_bad_register_key_rejected() {
        let def = parse(
            r#"{
            "version": "1.0",
            "policy_id": "bad_register",
            "bank_tree": {
                "node_id": "B1",
                "type": "action",
                "action": "SetState",
                "key": "bank_state_99",
                "value": {"value": 1}
            }
        }"#,
        );
        let errors = validate_tree(&def).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidRegisterKey(
            "bank_state_99".to_string()
        )));
    }
}
