//! Policy factory
//!
//! Creates [`TreePolicy`] instances from the configured policy variant.
//! The named variants (FIFO, deadline, liquidity-aware) are embedded JSON
//! trees with their configured parameters injected; everything is a tree at
//! runtime, so the engine has exactly one policy code path.

use super::executor::{TreePolicy, TreePolicyError};
use crate::orchestrator::PolicySpec;
use std::collections::BTreeMap;

/// FIFO: release every transaction as soon as it is seen
const FIFO_POLICY: &str = r#"{
    "version": "1.0",
    "policy_id": "fifo_policy",
    "description": "Release every transaction immediately",
    "payment_tree": {
        "node_id": "A_Release",
        "type": "action",
        "action": "Release"
    }
}"#;

/// Deadline: release once the deadline is close, hold otherwise
const DEADLINE_POLICY: &str = r#"{
    "version": "1.0",
    "policy_id": "deadline_policy",
    "description": "Release transactions approaching their deadline",
    "payment_tree": {
        "node_id": "N_Urgency",
        "type": "condition",
        "condition": {
            "op": "<=",
            "left": {"field": "ticks_to_deadline"},
            "right": {"param": "urgency_threshold"}
        },
        "on_true": {"node_id": "A_Release", "type": "action", "action": "Release"},
        "on_false": {"node_id": "A_Hold", "type": "action", "action": "Hold", "reason": "LowPriority"}
    },
    "parameters": {"urgency_threshold": 5.0}
}"#;

/// Liquidity-aware: preserve a buffer of effective liquidity, overridden
/// when the deadline gets close.
///
/// The gate reads effective_liquidity (which includes credit headroom), not
/// available_liquidity: gating on own funds alone stalls releases the moment
/// the agent dips into overdraft, even with ample headroom left.
const LIQUIDITY_AWARE_POLICY: &str = r#"{
    "version": "1.0",
    "policy_id": "liquidity_aware_policy",
    "description": "Hold when releasing would breach the liquidity buffer; urgency overrides",
    "payment_tree": {
        "node_id": "N_Urgency",
        "type": "condition",
        "condition": {
            "op": "<=",
            "left": {"field": "ticks_to_deadline"},
            "right": {"param": "urgency_threshold"}
        },
        "on_true": {"node_id": "A_UrgentRelease", "type": "action", "action": "Release"},
        "on_false": {
            "node_id": "N_Buffer",
            "type": "condition",
            "condition": {
                "op": ">=",
                "left": {
                    "compute": {
                        "op": "-",
                        "left": {"field": "effective_liquidity"},
                        "right": {"field": "amount"}
                    }
                },
                "right": {"param": "target_buffer"}
            },
            "on_true": {"node_id": "A_Release", "type": "action", "action": "Release"},
            "on_false": {
                "node_id": "A_Hold",
                "type": "action",
                "action": "Hold",
                "reason": "InsufficientLiquidity"
            }
        }
    },
    "parameters": {"target_buffer": 0.0, "urgency_threshold": 5.0}
}"#;

/// Create a TreePolicy from the configured variant
pub fn create_policy(spec: &PolicySpec) -> Result<TreePolicy, TreePolicyError> {
    match spec {
        PolicySpec::Fifo => TreePolicy::from_json(FIFO_POLICY),

        PolicySpec::Deadline { urgency_threshold } => {
            Ok(TreePolicy::from_json(DEADLINE_POLICY)?.with_parameters(BTreeMap::from([(
                "urgency_threshold".to_string(),
                *urgency_threshold as f64,
            )])))
        }

        PolicySpec::LiquidityAware {
            target_buffer,
            urgency_threshold,
        } => Ok(
            TreePolicy::from_json(LIQUIDITY_AWARE_POLICY)?.with_parameters(BTreeMap::from([
                ("target_buffer".to_string(), *target_buffer as f64),
                ("urgency_threshold".to_string(), *urgency_threshold as f64),
            ])),
        ),

        PolicySpec::FromJson { json } => TreePolicy::from_json(json),

        PolicySpec::Inline(def) => TreePolicy::from_def(def.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costs::CostRates;
    use crate::models::{Agent, SimulationState, Transaction};
    use crate::policy::tree::context::EvalContext;
    use crate::policy::ReleaseDecision;

    fn context(balance: i64, amount: i64, ticks_to_deadline: usize) -> EvalContext {
        let agent = Agent::new("BANK_A".to_string(), balance, 0);
        let tick = 10usize;
        let tx = Transaction::new(
            "BANK_A".to_string(),
            "BANK_B".to_string(),
            amount,
            0,
            tick + ticks_to_deadline,
        );
        let state = SimulationState::new(vec![agent.clone()]);
        EvalContext::payment(&tx, &agent, &state, tick, &CostRates::default(), 100, 0.8)
    }

    #[test]
    fn test_fifo_always_releases() {
        let policy = create_policy(&PolicySpec::Fifo).unwrap();
        assert_eq!(policy.policy_id(), "fifo_policy");

        let ctx = context(0, 1_000_000, 50);
        let decision = policy.evaluate_payment(&ctx, "tx".to_string(), 8).unwrap();
        assert!(matches!(decision, ReleaseDecision::Release { .. }));
    }

    #[test]
    fn test_deadline_holds_until_urgent() {
        let policy = create_policy(&PolicySpec::Deadline {
            urgency_threshold: 10,
        })
        .unwrap();

        let relaxed = context(1_000_000, 100_000, 50);
        assert!(matches!(
            policy.evaluate_payment(&relaxed, "tx".to_string(), 8).unwrap(),
            ReleaseDecision::Hold { .. }
        ));

        let urgent = context(1_000_000, 100_000, 5);
        assert!(matches!(
            policy.evaluate_payment(&urgent, "tx".to_string(), 8).unwrap(),
            ReleaseDecision::Release { .. }
        ));
    }

    #[test]
    fn test_liquidity_aware_buffer_and_override() {
        let policy = create_policy(&PolicySpec::LiquidityAware {
            target_buffer: 500_000,
            urgency_threshold: 5,
        })
        .unwrap();

        // 600k liquidity - 200k amount = 400k < 500k buffer → hold
        let tight = context(600_000, 200_000, 50);
        assert!(matches!(
            policy.evaluate_payment(&tight, "tx".to_string(), 8).unwrap(),
            ReleaseDecision::Hold { .. }
        ));

        // Plenty of room → release
        let comfortable = context(1_000_000, 200_000, 50);
        assert!(matches!(
            policy
                .evaluate_payment(&comfortable, "tx".to_string(), 8)
                .unwrap(),
            ReleaseDecision::Release { .. }
        ));

        // Urgency overrides the buffer
        let urgent = context(600_000, 200_000, 3);
        assert!(matches!(
            policy.evaluate_payment(&urgent, "tx".to_string(), 8).unwrap(),
            ReleaseDecision::Release { .. }
        ));
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        let spec = PolicySpec::FromJson {
            json: "{not valid json".to_string(),
        };
        assert!(create_policy(&spec).is_err());
    }
}
