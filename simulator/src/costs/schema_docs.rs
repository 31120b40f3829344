//! Machine-readable documentation of the cost model
//!
//! Drives the `cost-schema` CLI command and the constraint material handed to
//! the policy-generation service. Everything here describes configuration,
//! not live state.

use serde::{Deserialize, Serialize};

/// Documentation for a single cost type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostTypeDoc {
    /// Config key in the cost_rates section
    pub key: String,

    /// "per_tick" | "one_time" | "modifier"
    pub category: String,

    /// What the rate applies to
    pub base: String,

    /// Accrual formula, human-readable
    pub formula: String,

    /// Default value when the config omits the rate
    pub default: f64,
}

/// Complete cost schema document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostSchemaDoc {
    pub version: String,
    pub cost_types: Vec<CostTypeDoc>,
}

/// Build the cost schema document
pub fn cost_schema() -> CostSchemaDoc {
    let doc = |key: &str, category: &str, base: &str, formula: &str, default: f64| CostTypeDoc {
        key: key.to_string(),
        category: category.to_string(),
        base: base.to_string(),
        formula: formula.to_string(),
        default,
    };

    CostSchemaDoc {
        version: "1.0".to_string(),
        cost_types: vec![
            doc(
                "overdraft_bps_per_tick",
                "per_tick",
                "max(-balance, 0)",
                "round(max(-balance, 0) * bps / 10000)",
                0.001,
            ),
            doc(
                "delay_cost_per_tick_per_cent",
                "per_tick",
                "remaining_amount of each Queue 1 transaction",
                "round(remaining_amount * rate * priority_multiplier * overdue_multiplier)",
                0.0001,
            ),
            doc(
                "collateral_cost_per_tick_bps",
                "per_tick",
                "posted_collateral",
                "round(posted_collateral * bps / 10000)",
                0.0002,
            ),
            doc(
                "split_friction_cost",
                "one_time",
                "each split decision",
                "split_friction_cost * (num_splits - 1)",
                1_000.0,
            ),
            doc(
                "deadline_penalty",
                "one_time",
                "each transaction crossing its deadline unsettled",
                "deadline_penalty, charged exactly once per transaction",
                50_000.0,
            ),
            doc(
                "eod_penalty_per_transaction",
                "one_time",
                "each Queue 1 transaction at end of day",
                "eod_penalty_per_transaction per residual transaction",
                10_000.0,
            ),
            doc(
                "overdue_delay_multiplier",
                "modifier",
                "delay cost of overdue transactions",
                "delay_cost * overdue_delay_multiplier while overdue",
                1.0,
            ),
            doc(
                "priority_delay_multipliers",
                "modifier",
                "delay cost by priority band (urgent 8-10, normal 4-7, low 0-3)",
                "delay_cost * band_multiplier",
                1.0,
            ),
        ],
    }
}

/// The cost schema as a JSON string
pub fn cost_schema_json() -> String {
    serde_json::to_string_pretty(&cost_schema()).expect("cost schema serializes")
}

/// The cost schema as a markdown table
pub fn cost_schema_markdown() -> String {
    let schema = cost_schema();
    let mut out = String::from("# Cost Schema\n\n| Key | Category | Base | Formula | Default |\n|---|---|---|---|---|\n");
    for c in &schema.cost_types {
        out.push_str(&format!(
            "| `{}` | {} | {} | `{}` | {} |\n",
            c.key, c.category, c.base, c.formula, c.default
        ));
    }
    out
}
