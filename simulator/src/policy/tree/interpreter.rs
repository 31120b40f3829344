//! Decision tree interpreter
//!
//! Structurally recursive evaluation of values, computations, and boolean
//! expressions, plus tree traversal down to an action node. Depth is bounded
//! both at validation (configurable) and here (hard cap), so evaluation
//! always terminates.
//!
//! Arithmetic failure (division by zero, empty min/max) is recoverable: the
//! engine substitutes the tree's safe default action and emits a diagnostic
//! event. `div0` (SafeDiv) never fails.

use super::context::EvalContext;
use super::types::{ActionNode, Computation, Expression, TreeNode, ValueExpr};
use crate::policy::{BankDecision, CollateralDecision, HoldReason, ReleaseDecision};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during tree interpretation
#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),

    #[error("Division by zero in computation")]
    DivisionByZero,

    #[error("Empty value list for min/max computation")]
    EmptyValueList,

    #[error("Tree traversal exceeded maximum depth ({MAX_TREE_DEPTH})")]
    MaxDepthExceeded,

    #[error("Action {action} is not valid in a {tree} tree")]
    WrongActionKind {
        action: &'static str,
        tree: &'static str,
    },

    #[error("Tree is not defined: {0}")]
    MissingTree(&'static str),
}

/// Hard traversal depth cap; validation applies a tighter configurable bound
pub const MAX_TREE_DEPTH: usize = 100;

/// Epsilon for floating point equality comparison
const FLOAT_EPSILON: f64 = 1e-9;

/// Evaluate a value to a numeric result
pub fn evaluate_value(
    value: &ValueExpr,
    context: &EvalContext,
    params: &BTreeMap<String, f64>,
) -> Result<f64, EvalError> {
    match value {
        ValueExpr::Field { field } => Ok(context.get(*field)),

        ValueExpr::Param { param } => params
            .get(param)
            .copied()
            .ok_or_else(|| EvalError::ParameterNotFound(param.clone())),

        ValueExpr::Literal { value } => Ok(*value),

        ValueExpr::Compute { compute } => evaluate_computation(compute, context, params),
    }
}

/// Evaluate an arithmetic computation
pub fn evaluate_computation(
    computation: &Computation,
    context: &EvalContext,
    params: &BTreeMap<String, f64>,
) -> Result<f64, EvalError> {
    match computation {
        Computation::Add { left, right } => Ok(evaluate_value(left, context, params)?
            + evaluate_value(right, context, params)?),

        Computation::Subtract { left, right } => Ok(evaluate_value(left, context, params)?
            - evaluate_value(right, context, params)?),

        Computation::Multiply { left, right } => Ok(evaluate_value(left, context, params)?
            * evaluate_value(right, context, params)?),

        Computation::Divide { left, right } => {
            let numerator = evaluate_value(left, context, params)?;
            let denominator = evaluate_value(right, context, params)?;
            if denominator.abs() < FLOAT_EPSILON {
                return Err(EvalError::DivisionByZero);
            }
            Ok(numerator / denominator)
        }

        Computation::Max { values } => {
            if values.is_empty() {
                return Err(EvalError::EmptyValueList);
            }
            let mut max_val = f64::NEG_INFINITY;
            for value in values {
                max_val = max_val.max(evaluate_value(value, context, params)?);
            }
            Ok(max_val)
        }

        Computation::Min { values } => {
            if values.is_empty() {
                return Err(EvalError::EmptyValueList);
            }
            let mut min_val = f64::INFINITY;
            for value in values {
                min_val = min_val.min(evaluate_value(value, context, params)?);
            }
            Ok(min_val)
        }

        Computation::Ceil { value } => Ok(evaluate_value(value, context, params)?.ceil()),
        Computation::Floor { value } => Ok(evaluate_value(value, context, params)?.floor()),
        Computation::Round { value } => Ok(evaluate_value(value, context, params)?.round()),
        Computation::Abs { value } => Ok(evaluate_value(value, context, params)?.abs()),

        Computation::Clamp { value, min, max } => {
            let v = evaluate_value(value, context, params)?;
            let lo = evaluate_value(min, context, params)?;
            let hi = evaluate_value(max, context, params)?;
            Ok(v.max(lo).min(hi))
        }

        Computation::SafeDiv {
            numerator,
            denominator,
            default,
        } => {
            let denom = evaluate_value(denominator, context, params)?;
            if denom.abs() < FLOAT_EPSILON {
                evaluate_value(default, context, params)
            } else {
                Ok(evaluate_value(numerator, context, params)? / denom)
            }
        }
    }
}

/// Evaluate a boolean expression
pub fn evaluate_expression(
    expr: &Expression,
    context: &EvalContext,
    params: &BTreeMap<String, f64>,
) -> Result<bool, EvalError> {
    match expr {
        Expression::Equal { left, right } => {
            let l = evaluate_value(left, context, params)?;
            let r = evaluate_value(right, context, params)?;
            Ok((l - r).abs() < FLOAT_EPSILON)
        }

        Expression::NotEqual { left, right } => {
            let l = evaluate_value(left, context, params)?;
            let r = evaluate_value(right, context, params)?;
            Ok((l - r).abs() >= FLOAT_EPSILON)
        }

        Expression::LessThan { left, right } => Ok(evaluate_value(left, context, params)?
            < evaluate_value(right, context, params)?),

        Expression::LessOrEqual { left, right } => {
            let l = evaluate_value(left, context, params)?;
            let r = evaluate_value(right, context, params)?;
            Ok(l <= r || (l - r).abs() < FLOAT_EPSILON)
        }

        Expression::GreaterThan { left, right } => Ok(evaluate_value(left, context, params)?
            > evaluate_value(right, context, params)?),

        Expression::GreaterOrEqual { left, right } => {
            let l = evaluate_value(left, context, params)?;
            let r = evaluate_value(right, context, params)?;
            Ok(l >= r || (l - r).abs() < FLOAT_EPSILON)
        }

        Expression::And { conditions } => {
            for condition in conditions {
                if !evaluate_expression(condition, context, params)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }

        Expression::Or { conditions } => {
            for condition in conditions {
                if evaluate_expression(condition, context, params)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }

        Expression::Not { condition } => {
            Ok(!evaluate_expression(condition, context, params)?)
        }
    }
}

/// Traverse a tree to its terminal action node
pub fn traverse<'a>(
    root: &'a TreeNode,
    context: &EvalContext,
    params: &BTreeMap<String, f64>,
) -> Result<&'a ActionNode, EvalError> {
    traverse_node(root, context, params, 0)
}

fn traverse_node<'a>(
    node: &'a TreeNode,
    context: &EvalContext,
    params: &BTreeMap<String, f64>,
    depth: usize,
) -> Result<&'a ActionNode, EvalError> {
    if depth > MAX_TREE_DEPTH {
        return Err(EvalError::MaxDepthExceeded);
    }

    match node {
        TreeNode::Action { action, .. } => Ok(action),

        TreeNode::Condition {
            condition,
            on_true,
            on_false,
            ..
        } => {
            let next = if evaluate_expression(condition, context, params)? {
                on_true
            } else {
                on_false
            };
            traverse_node(next, context, params, depth + 1)
        }
    }
}

// ============================================================================
// Decision building
// ============================================================================

/// Convert a payment-tree action node into a release decision.
///
/// `Split.num_splits` rounds to nearest and clamps to [1, max_pacing_factor];
/// a result of 1 degrades to Release.
pub fn build_payment_decision(
    action: &ActionNode,
    tx_id: String,
    context: &EvalContext,
    params: &BTreeMap<String, f64>,
    max_pacing_factor: usize,
) -> Result<ReleaseDecision, EvalError> {
    match action {
        ActionNode::Release => Ok(ReleaseDecision::Release { tx_id }),

        ActionNode::Hold { reason } => Ok(ReleaseDecision::Hold {
            tx_id,
            reason: reason
                .as_deref()
                .map(HoldReason::from_str_lenient)
                .unwrap_or(HoldReason::Custom("PolicyDecision".to_string())),
        }),

        ActionNode::Drop => Ok(ReleaseDecision::Drop { tx_id }),

        ActionNode::Split { num_splits } => {
            let raw = evaluate_value(num_splits, context, params)?;
            let n = (raw.round().max(1.0) as usize).min(max_pacing_factor.max(1));
            if n <= 1 {
                Ok(ReleaseDecision::Release { tx_id })
            } else {
                Ok(ReleaseDecision::Split {
                    tx_id,
                    num_splits: n,
                })
            }
        }

        other => Err(EvalError::WrongActionKind {
            action: other.action_name(),
            tree: "payment",
        }),
    }
}

/// Convert a collateral-tree action node into a collateral decision.
///
/// Amounts floor to integer cents; non-positive amounts degrade to Hold.
pub fn build_collateral_decision(
    action: &ActionNode,
    context: &EvalContext,
    params: &BTreeMap<String, f64>,
) -> Result<CollateralDecision, EvalError> {
    match action {
        ActionNode::PostCollateral { amount, reason } => {
            let cents = evaluate_value(amount, context, params)?.floor() as i64;
            if cents <= 0 {
                return Ok(CollateralDecision::Hold);
            }
            Ok(CollateralDecision::Post {
                amount: cents,
                reason: reason.clone(),
            })
        }

        ActionNode::WithdrawCollateral { amount, reason } => {
            let cents = evaluate_value(amount, context, params)?.floor() as i64;
            if cents <= 0 {
                return Ok(CollateralDecision::Hold);
            }
            Ok(CollateralDecision::Withdraw {
                amount: cents,
                reason: reason.clone(),
            })
        }

        ActionNode::HoldCollateral => Ok(CollateralDecision::Hold),

        other => Err(EvalError::WrongActionKind {
            action: other.action_name(),
            tree: "collateral",
        }),
    }
}

/// Convert a bank-tree action node into a bank decision
pub fn build_bank_decision(
    action: &ActionNode,
    context: &EvalContext,
    params: &BTreeMap<String, f64>,
) -> Result<BankDecision, EvalError> {
    match action {
        ActionNode::SetState { key, value, .. } => Ok(BankDecision::SetState {
            key: key.clone(),
            value: evaluate_value(value, context, params)?,
        }),

        ActionNode::AddState { key, delta, .. } => Ok(BankDecision::AddState {
            key: key.clone(),
            delta: evaluate_value(delta, context, params)?,
        }),

        ActionNode::NoAction => Ok(BankDecision::NoAction),

        other => Err(EvalError::WrongActionKind {
            action: other.action_name(),
            tree: "bank",
        }),
    }
}
