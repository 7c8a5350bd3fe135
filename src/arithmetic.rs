//! Money and percentage arithmetic shared by every stage of the engine.
//!
//! All functions here are total: they never fail and never produce NaN for
//! finite input.

/// Upper bound of any completion percentage.
pub const FULL_PERCENT: f64 = 100.0;

/// Slack allowed above [`FULL_PERCENT`] to absorb float noise when summing
/// percentages such as `33.3 + 66.7`.
pub const PERCENT_EPSILON: f64 = 1e-9;

/// Default tolerance for closure and carry-forward checks.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

pub fn item_total(quantity: f64, unit_price: f64) -> f64 {
    quantity * unit_price
}

/// `100 * part / whole`, or 0 when `whole <= 0`.
pub fn share_percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part * FULL_PERCENT / whole
    } else {
        0.0
    }
}

/// Monetary value of `percent` of `total`.
pub fn amount_at_percent(total: f64, percent: f64) -> f64 {
    total * (percent / FULL_PERCENT)
}

pub fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}
