//! Evaluation context
//!
//! An immutable per-call snapshot of everything a decision tree may read,
//! stored as a dense array indexed by the closed [`Field`] catalog. Building
//! the context walks simulation state once; evaluation is then plain array
//! reads with no string lookups and no access back into live state.
//!
//! Two constructors: [`EvalContext::payment`] (per-transaction, payment
//! trees) and [`EvalContext::bank_level`] (collateral and bank trees, no
//! transaction fields).

use super::fields::Field;
use crate::costs::{math, CostRates};
use crate::models::{Agent, SimulationState, Transaction};

/// Immutable field snapshot for one policy evaluation
#[derive(Debug, Clone)]
pub struct EvalContext {
    values: [f64; Field::COUNT],
}

impl EvalContext {
    /// Read a field. Always total: every field has a value (unset state
    /// registers and absent transaction fields read as 0.0).
    pub fn get(&self, field: Field) -> f64 {
        self.values[field.index()]
    }

    /// Build the per-transaction context for payment-tree evaluation
    pub fn payment(
        tx: &Transaction,
        agent: &Agent,
        state: &SimulationState,
        tick: usize,
        cost_rates: &CostRates,
        ticks_per_day: usize,
        eod_rush_threshold: f64,
    ) -> Self {
        let mut ctx = Self::bank_level(agent, state, tick, cost_rates, ticks_per_day, eod_rush_threshold);
        let set = |ctx: &mut Self, f: Field, v: f64| ctx.values[f.index()] = v;

        // Transaction fields
        set(&mut ctx, Field::Amount, tx.amount() as f64);
        set(&mut ctx, Field::RemainingAmount, tx.remaining_amount() as f64);
        set(&mut ctx, Field::SettledAmount, tx.settled_amount() as f64);
        set(&mut ctx, Field::ArrivalTick, tx.arrival_tick() as f64);
        set(&mut ctx, Field::DeadlineTick, tx.deadline_tick() as f64);
        set(&mut ctx, Field::Priority, tx.priority() as f64);
        set(&mut ctx, Field::IsDivisible, bool_field(tx.is_divisible()));
        set(&mut ctx, Field::IsSplit, bool_field(tx.is_split()));
        set(
            &mut ctx,
            Field::IsPastDeadline,
            bool_field(tx.is_past_deadline(tick)),
        );
        set(&mut ctx, Field::IsOverdue, bool_field(tx.is_overdue()));
        set(
            &mut ctx,
            Field::OverdueDuration,
            tx.overdue_since_tick()
                .map(|since| tick.saturating_sub(since) as f64)
                .unwrap_or(0.0),
        );
        set(
            &mut ctx,
            Field::TicksToDeadline,
            tx.deadline_tick() as f64 - tick as f64,
        );
        set(
            &mut ctx,
            Field::QueueAge,
            tick.saturating_sub(tx.arrival_tick()) as f64,
        );
        set(
            &mut ctx,
            Field::IsInQueue2,
            bool_field(tx.rtgs_priority().is_some()),
        );

        // LSM awareness relative to this transaction's counterparty.
        // Own-bank queue composition only; other banks' queues stay private.
        let counterparty = tx.receiver_id();
        let index = state.queue2_index();
        let out_value = index.pair_flow(agent.id(), counterparty);
        let in_value = index.pair_flow(counterparty, agent.id());
        set(&mut ctx, Field::MyQ2OutValueToCounterparty, out_value as f64);
        set(&mut ctx, Field::MyQ2InValueFromCounterparty, in_value as f64);
        set(&mut ctx, Field::MyBilateralNetQ2, (out_value - in_value) as f64);

        set(
            &mut ctx,
            Field::TxIsTopCounterparty,
            bool_field(agent.top_counterparties(5).iter().any(|id| id == counterparty)),
        );

        // Per-transaction derived costs
        let remaining = tx.remaining_amount();
        set(
            &mut ctx,
            Field::CostDelayThisTxOneTick,
            math::rate_cost(remaining, cost_rates.delay_cost_per_tick_per_cent) as f64,
        );
        set(
            &mut ctx,
            Field::CostOverdraftThisAmountOneTick,
            math::bps_cost(remaining, cost_rates.overdraft_bps_per_tick) as f64,
        );

        ctx
    }

    /// Build the agent-level context for bank and collateral trees.
    /// Transaction fields are absent (they read 0.0, and validation keeps
    /// them out of these trees).
    pub fn bank_level(
        agent: &Agent,
        state: &SimulationState,
        tick: usize,
        cost_rates: &CostRates,
        ticks_per_day: usize,
        eod_rush_threshold: f64,
    ) -> Self {
        let mut values = [0.0f64; Field::COUNT];
        let mut set = |f: Field, v: f64| values[f.index()] = v;

        // Agent balance and credit
        set(Field::Balance, agent.balance() as f64);
        set(Field::UnsecuredCap, agent.unsecured_cap() as f64);
        set(Field::CreditUsed, agent.credit_used() as f64);
        set(Field::CreditHeadroom, agent.credit_headroom() as f64);
        set(Field::AvailableLiquidity, agent.available_liquidity() as f64);
        set(Field::EffectiveLiquidity, agent.effective_liquidity() as f64);
        set(Field::IsUsingCredit, bool_field(agent.is_using_credit()));
        set(Field::LiquidityPressure, agent.liquidity_pressure());
        set(Field::LiquidityBuffer, agent.liquidity_buffer() as f64);
        set(
            Field::AllowedOverdraftLimit,
            agent.allowed_overdraft_limit() as f64,
        );
        let allowed = agent.allowed_overdraft_limit();
        set(
            Field::OverdraftUtilization,
            if allowed > 0 {
                agent.credit_used() as f64 / allowed as f64
            } else {
                0.0
            },
        );

        // Queue 1
        let queue1_value = state.agent_queue_value(agent.id());
        set(Field::OutgoingQueueSize, agent.outgoing_queue_size() as f64);
        set(Field::Queue1TotalValue, queue1_value as f64);
        set(
            Field::Queue1LiquidityGap,
            state.agent_queue1_liquidity_gap(agent.id()) as f64,
        );
        set(
            Field::Headroom,
            (agent.effective_liquidity() - queue1_value) as f64,
        );
        set(
            Field::IncomingExpectedCount,
            agent.incoming_expected().len() as f64,
        );

        // Queue 2
        let index = state.queue2_index();
        let metrics = index.metrics(agent.id());
        set(Field::RtgsQueueSize, state.queue_size() as f64);
        set(Field::RtgsQueueValue, state.queue_value() as f64);
        set(Field::Queue2CountForAgent, metrics.count as f64);
        set(Field::Queue2ValueForAgent, metrics.total_value as f64);
        let (nearest, ticks_to_nearest) = if metrics.nearest_deadline == usize::MAX {
            (f64::INFINITY, f64::INFINITY)
        } else {
            (
                metrics.nearest_deadline as f64,
                metrics.nearest_deadline.saturating_sub(tick) as f64,
            )
        };
        set(Field::Queue2NearestDeadline, nearest);
        set(Field::TicksToNearestQueue2Deadline, ticks_to_nearest);
        set(
            Field::SystemQueue2PressureIndex,
            queue2_pressure_index(state),
        );
        set(Field::TotalAgents, state.num_agents() as f64);

        // Collateral
        set(Field::PostedCollateral, agent.posted_collateral() as f64);
        set(
            Field::MaxCollateralCapacity,
            agent.max_collateral_capacity() as f64,
        );
        set(
            Field::RemainingCollateralCapacity,
            agent.remaining_collateral_capacity() as f64,
        );
        let max_cap = agent.max_collateral_capacity();
        set(
            Field::CollateralUtilization,
            if max_cap > 0 {
                agent.posted_collateral() as f64 / max_cap as f64
            } else {
                0.0
            },
        );
        set(Field::CollateralHaircut, agent.collateral_haircut());

        // Minimum collateral needed to back credit usage beyond the
        // unsecured cap, inverted through the haircut
        let one_minus_h = (1.0 - agent.collateral_haircut()).max(0.0);
        let usage_after_unsecured =
            (agent.credit_used() - agent.unsecured_cap()).max(0);
        let required_collateral = if one_minus_h > 0.0 {
            (usage_after_unsecured as f64 / one_minus_h).ceil()
        } else {
            0.0
        };
        set(Field::RequiredCollateralForUsage, required_collateral);
        set(
            Field::ExcessCollateral,
            (agent.posted_collateral() as f64 - required_collateral).max(0.0),
        );

        // Top-5 counterparty views over own Queue 2 composition
        let top_out = index.top_outflow_counterparties(agent.id(), 5);
        let top_in = index.top_inflow_counterparties(agent.id(), 5);
        let top_net = index.top_bilateral_nets(agent.id(), 5);
        let out_slots = [
            Field::MyQ2OutValueTop1,
            Field::MyQ2OutValueTop2,
            Field::MyQ2OutValueTop3,
            Field::MyQ2OutValueTop4,
            Field::MyQ2OutValueTop5,
        ];
        let in_slots = [
            Field::MyQ2InValueTop1,
            Field::MyQ2InValueTop2,
            Field::MyQ2InValueTop3,
            Field::MyQ2InValueTop4,
            Field::MyQ2InValueTop5,
        ];
        let net_slots = [
            Field::MyBilateralNetQ2Top1,
            Field::MyBilateralNetQ2Top2,
            Field::MyBilateralNetQ2Top3,
            Field::MyBilateralNetQ2Top4,
            Field::MyBilateralNetQ2Top5,
        ];
        for (i, slot) in out_slots.into_iter().enumerate() {
            set(slot, top_out.get(i).map(|(_, v)| *v as f64).unwrap_or(0.0));
        }
        for (i, slot) in in_slots.into_iter().enumerate() {
            set(slot, top_in.get(i).map(|(_, v)| *v as f64).unwrap_or(0.0));
        }
        for (i, slot) in net_slots.into_iter().enumerate() {
            set(slot, top_net.get(i).map(|(_, v)| *v as f64).unwrap_or(0.0));
        }

        // Cost rates
        set(Field::CostOverdraftBpsPerTick, cost_rates.overdraft_bps_per_tick);
        set(
            Field::CostDelayPerTickPerCent,
            cost_rates.delay_cost_per_tick_per_cent,
        );
        set(
            Field::CostCollateralBpsPerTick,
            cost_rates.collateral_cost_per_tick_bps,
        );
        set(Field::CostSplitFriction, cost_rates.split_friction_cost as f64);
        set(Field::CostDeadlinePenalty, cost_rates.deadline_penalty as f64);
        set(
            Field::CostEodPenalty,
            cost_rates.eod_penalty_per_transaction as f64,
        );

        // Time of day
        let tick_in_day = tick % ticks_per_day;
        let day_progress = tick_in_day as f64 / ticks_per_day as f64;
        set(Field::CurrentTick, tick as f64);
        set(Field::SystemTicksPerDay, ticks_per_day as f64);
        set(Field::SystemCurrentDay, (tick / ticks_per_day) as f64);
        set(Field::SystemTickInDay, tick_in_day as f64);
        set(
            Field::TicksRemainingInDay,
            ticks_per_day.saturating_sub(tick_in_day).saturating_sub(1) as f64,
        );
        set(Field::DayProgressFraction, day_progress);
        set(Field::IsEodRush, bool_field(day_progress >= eod_rush_threshold));

        // Throughput progress
        let my_throughput = throughput_fraction(state, agent.id());
        set(Field::MyThroughputFractionToday, my_throughput);
        set(Field::ExpectedThroughputFractionByNow, day_progress);
        set(Field::ThroughputGap, my_throughput - day_progress);

        // State registers
        let register_slots = [
            Field::BankState0,
            Field::BankState1,
            Field::BankState2,
            Field::BankState3,
            Field::BankState4,
            Field::BankState5,
            Field::BankState6,
            Field::BankState7,
            Field::BankState8,
            Field::BankState9,
        ];
        for (i, slot) in register_slots.into_iter().enumerate() {
            set(slot, agent.register(&format!("bank_state_{}", i)));
        }

        Self { values }
    }
}

fn bool_field(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// System-wide Queue 2 pressure: queued value relative to the system's total
/// effective liquidity, clamped to [0, 1]. Coarse and public: every agent
/// sees the same number.
fn queue2_pressure_index(state: &SimulationState) -> f64 {
    let total_liquidity: i64 = state
        .agents()
        .values()
        .map(|a| a.effective_liquidity())
        .sum();
    if total_liquidity <= 0 {
        return if state.queue_value() > 0 { 1.0 } else { 0.0 };
    }
    (state.queue_value() as f64 / total_liquidity as f64).min(1.0)
}

/// Fraction of the agent's originated face value that has settled so far:
/// Σ settled_amount / Σ amount over transactions it sent. 0 when it has
/// sent nothing.
fn throughput_fraction(state: &SimulationState, agent_id: &str) -> f64 {
    let mut total = 0i64;
    let mut settled = 0i64;
    for tx in state.transactions().values() {
        if tx.sender_id() == agent_id && !tx.is_split() {
            total += tx.amount();
            settled += tx.settled_amount();
        }
    }
    if total == 0 {
        0.0
    } else {
        settled as f64 / total as f64
    }
}
