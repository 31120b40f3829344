//! Evaluation-context field catalog
//!
//! The closed set of fields a decision tree may reference. Fields are a Rust
//! enum, not strings: name-to-field resolution happens once, when a tree is
//! deserialized, and evaluation indexes the context array directly. An
//! unknown field name is a load-time error, never an eval-time one.
//!
//! Transaction fields exist only in payment-tree contexts; state registers
//! are readable from payment and bank trees but not collateral trees (those
//! run outside the per-day register lifecycle).

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Which tree a node belongs to, for field- and action-permission checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeKind {
    /// Per-transaction release decisions (Queue 1 → Queue 2)
    Payment,
    /// Once-per-tick agent-level decisions (state registers)
    Bank,
    /// Strategic and end-of-tick collateral decisions
    Collateral,
}

macro_rules! context_fields {
    ($( $variant:ident => $name:literal ),+ $(,)?) => {
        /// A field readable from the evaluation context
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(usize)]
        pub enum Field {
            $( $variant ),+
        }

        impl Field {
            /// Number of fields in the catalog
            pub const COUNT: usize = [$( Field::$variant ),+].len();

            /// Every field, in declaration order
            pub const ALL: [Field; Field::COUNT] = [$( Field::$variant ),+];

            /// The field's wire name
            pub fn name(&self) -> &'static str {
                match self {
                    $( Field::$variant => $name ),+
                }
            }

            /// Resolve a wire name to a field. Load-time only.
            pub fn parse(name: &str) -> Option<Field> {
                match name {
                    $( $name => Some(Field::$variant), )+
                    _ => None,
                }
            }
        }
    };
}

context_fields! {
    // Transaction fields (payment tree only)
    Amount => "amount",
    RemainingAmount => "remaining_amount",
    SettledAmount => "settled_amount",
    ArrivalTick => "arrival_tick",
    DeadlineTick => "deadline_tick",
    Priority => "priority",
    IsDivisible => "is_divisible",
    IsSplit => "is_split",
    IsPastDeadline => "is_past_deadline",
    IsOverdue => "is_overdue",
    OverdueDuration => "overdue_duration",
    TicksToDeadline => "ticks_to_deadline",
    QueueAge => "queue_age",
    IsInQueue2 => "is_in_queue2",
    TxIsTopCounterparty => "tx_is_top_counterparty",

    // Agent balance and credit
    Balance => "balance",
    UnsecuredCap => "unsecured_cap",
    CreditUsed => "credit_used",
    CreditHeadroom => "credit_headroom",
    AvailableLiquidity => "available_liquidity",
    EffectiveLiquidity => "effective_liquidity",
    IsUsingCredit => "is_using_credit",
    LiquidityPressure => "liquidity_pressure",
    LiquidityBuffer => "liquidity_buffer",
    AllowedOverdraftLimit => "allowed_overdraft_limit",
    OverdraftUtilization => "overdraft_utilization",

    // Queue 1
    OutgoingQueueSize => "outgoing_queue_size",
    Queue1TotalValue => "queue1_total_value",
    Queue1LiquidityGap => "queue1_liquidity_gap",
    Headroom => "headroom",
    IncomingExpectedCount => "incoming_expected_count",

    // Queue 2
    RtgsQueueSize => "rtgs_queue_size",
    RtgsQueueValue => "rtgs_queue_value",
    Queue2CountForAgent => "queue2_count_for_agent",
    Queue2ValueForAgent => "queue2_value_for_agent",
    Queue2NearestDeadline => "queue2_nearest_deadline",
    TicksToNearestQueue2Deadline => "ticks_to_nearest_queue2_deadline",
    SystemQueue2PressureIndex => "system_queue2_pressure_index",
    TotalAgents => "total_agents",

    // Collateral
    PostedCollateral => "posted_collateral",
    MaxCollateralCapacity => "max_collateral_capacity",
    RemainingCollateralCapacity => "remaining_collateral_capacity",
    CollateralUtilization => "collateral_utilization",
    CollateralHaircut => "collateral_haircut",
    RequiredCollateralForUsage => "required_collateral_for_usage",
    ExcessCollateral => "excess_collateral",

    // LSM awareness: own-bank Queue 2 composition only. Never exposes other
    // banks' queues.
    MyQ2OutValueToCounterparty => "my_q2_out_value_to_counterparty",
    MyQ2InValueFromCounterparty => "my_q2_in_value_from_counterparty",
    MyBilateralNetQ2 => "my_bilateral_net_q2",
    MyQ2OutValueTop1 => "my_q2_out_value_top_1",
    MyQ2OutValueTop2 => "my_q2_out_value_top_2",
    MyQ2OutValueTop3 => "my_q2_out_value_top_3",
    MyQ2OutValueTop4 => "my_q2_out_value_top_4",
    MyQ2OutValueTop5 => "my_q2_out_value_top_5",
    MyQ2InValueTop1 => "my_q2_in_value_top_1",
    MyQ2InValueTop2 => "my_q2_in_value_top_2",
    MyQ2InValueTop3 => "my_q2_in_value_top_3",
    MyQ2InValueTop4 => "my_q2_in_value_top_4",
    MyQ2InValueTop5 => "my_q2_in_value_top_5",
    MyBilateralNetQ2Top1 => "my_bilateral_net_q2_top_1",
    MyBilateralNetQ2Top2 => "my_bilateral_net_q2_top_2",
    MyBilateralNetQ2Top3 => "my_bilateral_net_q2_top_3",
    MyBilateralNetQ2Top4 => "my_bilateral_net_q2_top_4",
    MyBilateralNetQ2Top5 => "my_bilateral_net_q2_top_5",

    // Cost rates and per-transaction derived costs
    CostOverdraftBpsPerTick => "cost_overdraft_bps_per_tick",
    CostDelayPerTickPerCent => "cost_delay_per_tick_per_cent",
    CostCollateralBpsPerTick => "cost_collateral_bps_per_tick",
    CostSplitFriction => "cost_split_friction",
    CostDeadlinePenalty => "cost_deadline_penalty",
    CostEodPenalty => "cost_eod_penalty",
    CostDelayThisTxOneTick => "cost_delay_this_tx_one_tick",
    CostOverdraftThisAmountOneTick => "cost_overdraft_this_amount_one_tick",

    // Time of day
    CurrentTick => "current_tick",
    SystemTicksPerDay => "system_ticks_per_day",
    SystemCurrentDay => "system_current_day",
    SystemTickInDay => "system_tick_in_day",
    TicksRemainingInDay => "ticks_remaining_in_day",
    DayProgressFraction => "day_progress_fraction",
    IsEodRush => "is_eod_rush",

    // Throughput progress
    MyThroughputFractionToday => "my_throughput_fraction_today",
    ExpectedThroughputFractionByNow => "expected_throughput_fraction_by_now",
    ThroughputGap => "throughput_gap",

    // State registers (policy micro-memory, reset at EOD)
    BankState0 => "bank_state_0",
    BankState1 => "bank_state_1",
    BankState2 => "bank_state_2",
    BankState3 => "bank_state_3",
    BankState4 => "bank_state_4",
    BankState5 => "bank_state_5",
    BankState6 => "bank_state_6",
    BankState7 => "bank_state_7",
    BankState8 => "bank_state_8",
    BankState9 => "bank_state_9",
}

impl Field {
    /// Array index of this field in the context value table
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Transaction-specific fields exist only in payment-tree contexts
    pub fn is_transaction_field(&self) -> bool {
        matches!(
            self,
            Field::Amount
                | Field::RemainingAmount
                | Field::SettledAmount
                | Field::ArrivalTick
                | Field::DeadlineTick
                | Field::Priority
                | Field::IsDivisible
                | Field::IsSplit
                | Field::IsPastDeadline
                | Field::IsOverdue
                | Field::OverdueDuration
                | Field::TicksToDeadline
                | Field::QueueAge
                | Field::IsInQueue2
                | Field::TxIsTopCounterparty
                | Field::MyQ2OutValueToCounterparty
                | Field::MyQ2InValueFromCounterparty
                | Field::MyBilateralNetQ2
                | Field::CostDelayThisTxOneTick
                | Field::CostOverdraftThisAmountOneTick
        )
    }

    /// State registers are per-day micro-memory
    pub fn is_state_register(&self) -> bool {
        matches!(
            self,
            Field::BankState0
                | Field::BankState1
                | Field::BankState2
                | Field::BankState3
                | Field::BankState4
                | Field::BankState5
                | Field::BankState6
                | Field::BankState7
                | Field::BankState8
                | Field::BankState9
        )
    }

    /// May this field appear in a tree of the given kind?
    pub fn allowed_in(&self, kind: TreeKind) -> bool {
        match kind {
            TreeKind::Payment => true,
            TreeKind::Bank => !self.is_transaction_field(),
            TreeKind::Collateral => !self.is_transaction_field() && !self.is_state_register(),
        }
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Field::parse(&name).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown context field '{}'", name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_parse_round_trip() {
        for field in Field::ALL {
            assert_eq!(Field::parse(field.name()), Some(field));
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        assert_eq!(Field::parse("nonexistent_field"), None);
        assert_eq!(Field::parse("bank_state_10"), None);
    }

    #[test]
    fn test_indices_are_dense() {
        for (i, field) in Field::ALL.iter().enumerate() {
            assert_eq!(field.index(), i);
        }
    }

    #[test]
    fn test_tree_kind_permissions() {
        assert!(Field::Amount.allowed_in(TreeKind::Payment));
        assert!(!Field::Amount.allowed_in(TreeKind::Bank));
        assert!(!Field::Amount.allowed_in(TreeKind::Collateral));

        assert!(Field::Balance.allowed_in(TreeKind::Payment));
        assert!(Field::Balance.allowed_in(TreeKind::Bank));
        assert!(Field::Balance.allowed_in(TreeKind::Collateral));

        assert!(Field::BankState3.allowed_in(TreeKind::Bank));
        assert!(!Field::BankState3.allowed_in(TreeKind::Collateral));
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&Field::EffectiveLiquidity).unwrap();
        assert_eq!(json, "\"effective_liquidity\"");

        let field: Field = serde_json::from_str("\"ticks_to_deadline\"").unwrap();
        assert_eq!(field, Field::TicksToDeadline);

        assert!(serde_json::from_str::<Field>("\"no_such_field\"").is_err());
    }
}
