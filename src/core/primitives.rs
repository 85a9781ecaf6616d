use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::{OverlayError, OverlayResult};

/// Converts a decimal price anchor into the `f64` space used by axis mappings.
pub fn decimal_to_f64(value: Decimal, field_name: &str) -> OverlayResult<f64> {
    value.to_f64().ok_or_else(|| {
        OverlayError::InvalidData(format!("{field_name} cannot be represented as f64"))
    })
}

/// Converts a UTC timestamp into the unix-seconds space of the time axis.
#[must_use]
pub fn datetime_to_unix_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_millis() as f64 / 1000.0
}
