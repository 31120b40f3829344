//! Policy DSL type definitions
//!
//! JSON decision-tree format for declarative, machine-editable policies.
//! The AST is typed at deserialization: field references resolve to the
//! closed [`Field`](super::fields::Field) catalog while parsing, so a tree
//! that names an unknown field never loads.

use super::fields::Field;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete decision tree definition
///
/// The root object deserialized from JSON policy files. A policy may carry up
/// to four trees:
/// - `payment_tree`: per-transaction release decisions (Queue 1 → Queue 2)
/// - `strategic_collateral_tree`: forward-looking collateral decisions,
///   evaluated before settlements
/// - `end_of_tick_collateral_tree`: reactive collateral cleanup after the
///   LSM pass
/// - `bank_tree`: once-per-tick agent-level decisions (state registers)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeDef {
    /// Schema version (currently "1.0")
    pub version: String,

    /// Unique identifier for this policy
    pub policy_id: String,

    /// Optional human-readable description
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub payment_tree: Option<TreeNode>,

    #[serde(default)]
    pub strategic_collateral_tree: Option<TreeNode>,

    #[serde(default)]
    pub end_of_tick_collateral_tree: Option<TreeNode>,

    #[serde(default)]
    pub bank_tree: Option<TreeNode>,

    /// Named parameters (thresholds, constants) referenced via `{"param": ...}`.
    /// BTreeMap so the canonical serialized form is stable.
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
}

/// A node in the decision tree
///
/// Internal nodes are conditions; leaves are actions. It is a tree, not a
/// DAG: each node owns its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeNode {
    /// Conditional branch node
    Condition {
        /// Unique node identifier
        node_id: String,

        /// Optional human-readable description
        #[serde(default, skip_serializing_if = "String::is_empty")]
        description: String,

        /// Boolean expression to evaluate
        condition: Expression,

        on_true: Box<TreeNode>,

        on_false: Box<TreeNode>,
    },

    /// Terminal action node
    Action {
        /// Unique node identifier
        node_id: String,

        #[serde(flatten)]
        action: ActionNode,
    },
}

impl TreeNode {
    pub fn node_id(&self) -> &str {
        match self {
            TreeNode::Condition { node_id, .. } => node_id,
            TreeNode::Action { node_id, .. } => node_id,
        }
    }

    pub fn is_condition(&self) -> bool {
        matches!(self, TreeNode::Condition { .. })
    }

    pub fn is_action(&self) -> bool {
        matches!(self, TreeNode::Action { .. })
    }
}

/// Boolean expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Expression {
    /// Equal (with epsilon tolerance for floats)
    #[serde(rename = "==")]
    Equal { left: ValueExpr, right: ValueExpr },

    #[serde(rename = "!=")]
    NotEqual { left: ValueExpr, right: ValueExpr },

    #[serde(rename = "<")]
    LessThan { left: ValueExpr, right: ValueExpr },

    #[serde(rename = "<=")]
    LessOrEqual { left: ValueExpr, right: ValueExpr },

    #[serde(rename = ">")]
    GreaterThan { left: ValueExpr, right: ValueExpr },

    #[serde(rename = ">=")]
    GreaterOrEqual { left: ValueExpr, right: ValueExpr },

    /// Logical AND (short-circuit evaluation)
    #[serde(rename = "and")]
    And { conditions: Vec<Expression> },

    /// Logical OR (short-circuit evaluation)
    #[serde(rename = "or")]
    Or { conditions: Vec<Expression> },

    #[serde(rename = "not")]
    Not { condition: Box<Expression> },
}

/// A value in an expression: field reference, parameter, literal, or
/// computed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueExpr {
    /// Reference to a context field, e.g. `{"field": "balance"}`
    Field { field: Field },

    /// Reference to a named parameter, e.g. `{"param": "urgency_threshold"}`
    Param { param: String },

    /// Literal float, e.g. `{"value": 100000}`
    Literal { value: f64 },

    /// Arithmetic computation
    Compute { compute: Box<Computation> },
}

/// Arithmetic computation over values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Computation {
    #[serde(rename = "+")]
    Add { left: ValueExpr, right: ValueExpr },

    #[serde(rename = "-")]
    Subtract { left: ValueExpr, right: ValueExpr },

    #[serde(rename = "*")]
    Multiply { left: ValueExpr, right: ValueExpr },

    /// Division; a zero divisor fails the evaluation (use `div0` for a
    /// total version)
    #[serde(rename = "/")]
    Divide { left: ValueExpr, right: ValueExpr },

    #[serde(rename = "max")]
    Max { values: Vec<ValueExpr> },

    #[serde(rename = "min")]
    Min { values: Vec<ValueExpr> },

    #[serde(rename = "ceil")]
    Ceil { value: ValueExpr },

    #[serde(rename = "floor")]
    Floor { value: ValueExpr },

    #[serde(rename = "round")]
    Round { value: ValueExpr },

    #[serde(rename = "abs")]
    Abs { value: ValueExpr },

    /// Constrain value to [min, max]
    #[serde(rename = "clamp")]
    Clamp {
        value: ValueExpr,
        min: ValueExpr,
        max: ValueExpr,
    },

    /// Safe division: returns `default` when the denominator is (near) zero.
    /// Never fails.
    #[serde(rename = "div0")]
    SafeDiv {
        numerator: ValueExpr,
        denominator: ValueExpr,
        default: ValueExpr,
    },
}

/// Terminal action, flattened into the Action tree node.
///
/// Which actions are legal depends on the tree:
/// - payment tree: Release, Hold, Drop, Split
/// - collateral trees: PostCollateral, WithdrawCollateral, HoldCollateral
/// - bank tree: SetState, AddState, NoAction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ActionNode {
    /// Submit the transaction to RTGS now
    Release,

    /// Keep the transaction in Queue 1 for later
    Hold {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Remove the transaction from Queue 1 without submitting
    Drop,

    /// Split the transaction into N children and submit them.
    /// `num_splits` is rounded to nearest and clamped to
    /// [1, max_pacing_factor]; a result of 1 degrades to Release.
    Split { num_splits: ValueExpr },

    /// Post collateral to increase available credit. Amount floors to cents;
    /// non-positive amounts degrade to HoldCollateral.
    PostCollateral {
        amount: ValueExpr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Withdraw collateral to reduce opportunity cost
    WithdrawCollateral {
        amount: ValueExpr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Keep the current collateral level
    HoldCollateral,

    /// Write a state register
    SetState {
        key: String,
        value: ValueExpr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Add a delta to a state register
    AddState {
        key: String,
        delta: ValueExpr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Do nothing this tick
    NoAction,
}

impl ActionNode {
    /// Wire name of the action
    pub fn action_name(&self) -> &'static str {
        match self {
            ActionNode::Release => "Release",
            ActionNode::Hold { .. } => "Hold",
            ActionNode::Drop => "Drop",
            ActionNode::Split { .. } => "Split",
            ActionNode::PostCollateral { .. } => "PostCollateral",
            ActionNode::WithdrawCollateral { .. } => "WithdrawCollateral",
            ActionNode::HoldCollateral => "HoldCollateral",
            ActionNode::SetState { .. } => "SetState",
            ActionNode::AddState { .. } => "AddState",
            ActionNode::NoAction => "NoAction",
        }
    }
}
