//! Deterministic money math for cost accrual
//!
//! All cost formulas reduce to "amount × rate, rounded to integer cents".
//! The rounding happens exactly once per accrual, here, so every accrual in
//! the engine rounds the same way: half away from zero.

/// Cost of `amount` cents at `bps` basis points: amount × bps / 10_000
///
/// Rounds half away from zero to integer cents.
pub fn bps_cost(amount: i64, bps: f64) -> i64 {
    rate_cost(amount, bps / 10_000.0)
}

/// Cost of `amount` cents at a plain per-cent rate: amount × rate
///
/// Rounds half away from zero to integer cents.
pub fn rate_cost(amount: i64, rate: f64) -> i64 {
    ((amount as f64) * rate).round() as i64
}

/// Split `amount` into `n` child amounts: floor division with the remainder
/// folded into the last child, so the children sum exactly to the parent.
///
/// # Panics
/// Panics if n == 0 or amount <= 0
pub fn split_amounts(amount: i64, n: usize) -> Vec<i64> {
    assert!(n > 0, "split count must be positive");
    assert!(amount > 0, "amount must be positive");

    let n_i64 = n as i64;
    let base = amount / n_i64;
    let remainder = amount - base * n_i64;

    let mut amounts = vec![base; n];
    if let Some(last) = amounts.last_mut() {
        *last += remainder;
    }
    amounts
}
