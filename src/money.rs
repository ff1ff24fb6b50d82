//! Amount helpers.
//!
//! Amounts are base currency units stored as `f64`. Rounding and allocation
//! run on [`Decimal`] and convert back at the edge.

use rust_decimal::prelude::*;

use crate::error::{LedgerError, Result};

const DECIMAL_PLACES: u32 = 2;

/// Tolerance used when comparing balances, absorbs floating rounding.
pub const EPSILON: f64 = 0.01;

#[inline]
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

/// Back to `f64`, rounded to cents half away from zero.
#[inline]
pub fn to_f64(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

/// Round to cents. Applied to every persisted or returned sum.
pub fn round2(value: f64) -> f64 {
    to_f64(to_decimal(value))
}

/// Accept only finite amounts that stay above zero once rounded to cents.
pub fn require_positive(amount: f64, field: &str) -> Result<f64> {
    let rounded = if amount.is_finite() { round2(amount) } else { 0.0 };
    if rounded <= 0.0 {
        return Err(LedgerError::validation(format!(
            "{field} must be a positive amount of at least 0.01 (got {amount})"
        )));
    }
    Ok(rounded)
}

/// Accept finite amounts that may be zero (order fields, counted cash).
pub fn require_non_negative(amount: f64, field: &str) -> Result<f64> {
    let rounded = if amount.is_finite() { round2(amount) } else { -1.0 };
    if rounded < 0.0 {
        return Err(LedgerError::validation(format!(
            "{field} must be zero or more (got {amount})"
        )));
    }
    Ok(rounded)
}

/// Split `total` across `expected` slots: each slot is filled up to its
/// expected value in order, any excess lands on the last slot. The parts
/// always sum to `total` after rounding.
pub fn allocate(total: f64, expected: &[f64]) -> Vec<f64> {
    if expected.is_empty() {
        return Vec::new();
    }
    let mut remaining = to_decimal(round2(total));
    let mut parts: Vec<Decimal> = Vec::with_capacity(expected.len());
    for amount in expected {
        let part = remaining.min(to_decimal(round2(*amount))).max(Decimal::ZERO);
        remaining -= part;
        parts.push(part);
    }
    if remaining > Decimal::ZERO {
        if let Some(last) = parts.last_mut() {
            *last += remaining;
        }
    }
    parts.into_iter().map(to_f64).collect()
}
