use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::model::Side;

pub const EPSILON: f64 = 1e-9;

pub fn floats_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

fn to_decimal(value: f64) -> Option<Decimal> {
    // f64 Display gives the shortest text that round-trips, never exponent notation
    Decimal::from_str(&value.to_string()).ok()
}

/// Number of fractional digits in the shortest decimal form of `value`.
pub fn decimal_count(value: f64) -> u32 {
    to_decimal(value).map(|d| d.normalize().scale()).unwrap_or(0)
}

/// Rounds toward negative infinity at `decimals` fractional digits.
pub fn floor_to_decimal(value: f64, decimals: u32) -> f64 {
    match to_decimal(value) {
        Some(d) => d
            .round_dp_with_strategy(decimals, RoundingStrategy::ToNegativeInfinity)
            .to_string()
            .parse::<f64>()
            .unwrap_or(value),
        None => {
            let factor = 10f64.powi(decimals as i32);
            (value * factor).floor() / factor
        }
    }
}

/// Rounds `value` down to a whole multiple of `step`.
pub fn floor_to_step(value: f64, step: f64) -> f64 {
    let value = floor_to_decimal(value, decimal_count(step));
    match (to_decimal(value), to_decimal(step)) {
        (Some(v), Some(s)) if s > Decimal::ZERO => v
            .checked_div(s)
            .map(|steps| steps.floor())
            .and_then(|steps| steps.checked_mul(s))
            .and_then(|d| d.normalize().to_string().parse::<f64>().ok())
            .unwrap_or(value),
        _ => value,
    }
}

/// Limit price that crosses the book by `cross_ticks` ticks from the best opposite level.
pub fn aggressive_price(best: f64, tick_size: f64, side: Side, cross_ticks: u32) -> f64 {
    let offset = cross_ticks as f64 * tick_size;
    match side {
        Side::Buy => best + offset,
        Side::Sell => best - offset,
    }
}
