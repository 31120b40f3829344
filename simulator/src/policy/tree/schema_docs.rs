//! Machine-readable documentation of the policy DSL
//!
//! Drives the `policy-schema` CLI command and the constraint schema handed
//! to the policy-generation service: which fields exist per tree, which
//! actions are legal where, and the expression/computation grammar.

use super::fields::{Field, TreeKind};
use serde::{Deserialize, Serialize};

/// Documentation for one context field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDoc {
    pub name: String,
    /// Trees this field may appear in: "payment" | "bank" | "collateral"
    pub trees: Vec<String>,
}

/// Documentation for one action type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDoc {
    pub name: String,
    pub tree: String,
    pub parameters: Vec<String>,
}

/// Complete policy schema document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySchemaDoc {
    pub version: String,
    pub comparison_ops: Vec<String>,
    pub logical_ops: Vec<String>,
    pub compute_ops: Vec<String>,
    pub fields: Vec<FieldDoc>,
    pub actions: Vec<ActionDoc>,
}

/// Build the policy schema document
pub fn policy_schema() -> PolicySchemaDoc {
    let fields = Field::ALL
        .iter()
        .map(|field| {
            let mut trees = Vec::new();
            for (kind, name) in [
                (TreeKind::Payment, "payment"),
                (TreeKind::Bank, "bank"),
                (TreeKind::Collateral, "collateral"),
            ] {
                if field.allowed_in(kind) {
                    trees.push(name.to_string());
                }
            }
            FieldDoc {
                name: field.name().to_string(),
                trees,
            }
        })
        .collect();

    let action = |name: &str, tree: &str, parameters: &[&str]| ActionDoc {
        name: name.to_string(),
        tree: tree.to_string(),
        parameters: parameters.iter().map(|p| p.to_string()).collect(),
    };

    PolicySchemaDoc {
        version: "1.0".to_string(),
        comparison_ops: ["==", "!=", "<", "<=", ">", ">="]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        logical_ops: ["and", "or", "not"].iter().map(|s| s.to_string()).collect(),
        compute_ops: [
            "+", "-", "*", "/", "min", "max", "ceil", "floor", "round", "abs", "clamp", "div0",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        actions: vec![
            action("Release", "payment", &[]),
            action("Hold", "payment", &["reason?"]),
            action("Drop", "payment", &[]),
            action("Split", "payment", &["num_splits"]),
            action("PostCollateral", "collateral", &["amount", "reason?"]),
            action("WithdrawCollateral", "collateral", &["amount", "reason?"]),
            action("HoldCollateral", "collateral", &[]),
            action("SetState", "bank", &["key", "value", "reason?"]),
            action("AddState", "bank", &["key", "delta", "reason?"]),
            action("NoAction", "bank", &[]),
        ],
        fields,
    }
}

/// The policy schema as a JSON string
pub fn policy_schema_json() -> String {
    serde_json::to_string_pretty(&policy_schema()).expect("policy schema serializes")
}

/// The policy schema as markdown
pub fn policy_schema_markdown() -> String {
    let schema = policy_schema();
    let mut out = String::from("# Policy Schema\n\n## Actions\n\n| Action | Tree | Parameters |\n|---|---|---|\n");
    for a in &schema.actions {
        out.push_str(&format!(
            "| `{}` | {} | {} |\n",
            a.name,
            a.tree,
            a.parameters.join(", ")
        ));
    }
    out.push_str("\n## Fields\n\n| Field | Trees |\n|---|---|\n");
    for f in &schema.fields {
        out.push_str(&format!("| `{}` | {} |\n", f.name, f.trees.join(", ")));
    }
    out
}
