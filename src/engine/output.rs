// Copyright © 2024 Pathway

use super::value::{AggregatedRow, GroupKey};

pub const FARE_DECIMAL_PLACES: i32 = 2;

/// Rounds to `decimal_places`, ties going away from zero (`f64::round`).
///
/// The tie-break is applied to the scaled binary value, so `0.125` becomes `0.13`,
/// while a literal such as `2.675`, stored slightly below its decimal spelling,
/// may round either way. Applying the function to its own output is a no-op.
pub fn round_half_away_from_zero(value: f64, decimal_places: i32) -> f64 {
    let scale = 10_f64.powi(decimal_places);
    let rounded = (value * scale).round() / scale;
    if rounded == 0.0 {
        // avoid emitting "-0"
        0.0
    } else {
        rounded
    }
}

/// Turns a finished group into an output row. Rounding happens here and nowhere
/// earlier, accumulation always runs at full precision.
pub fn format_row(key: GroupKey, total: f64) -> AggregatedRow {
    AggregatedRow {
        age_range: key.age_range,
        state: key.state,
        total_fare: round_half_away_from_zero(total, FARE_DECIMAL_PLACES),
    }
}
