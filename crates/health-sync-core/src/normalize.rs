//! Interval repair, unit conversion, and timestamp parsing.
//!
//! Everything here is pure and total: no I/O, no logging. Callers decide
//! what to do with values that fail to parse.
//!
//! # Example
//!
//! ```rust
//! use health_sync_core::normalize::{convert_unit, repair_interval, UnitRule, MIN_INTERVAL_MS};
//!
//! assert_eq!(repair_interval(1_000, 1_000, MIN_INTERVAL_MS), (1_000, 61_000));
//! assert!((convert_unit(0.97, UnitRule::FractionToPercent) - 97.0).abs() < 1e-9);
//! ```

use chrono::DateTime;

/// Shortest interval the remote API accepts for a point: one minute.
pub const MIN_INTERVAL_MS: i64 = 60 * 1000;

/// Apple Health export date layout, e.g. `2024-01-01 08:00:00 -0800`.
const EXPORT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Repair an empty or inverted interval.
///
/// When `end_ms <= start_ms` the end becomes `start_ms + min_duration_ms`;
/// otherwise the interval is returned unchanged.
pub fn repair_interval(start_ms: i64, end_ms: i64, min_duration_ms: i64) -> (i64, i64) {
    if end_ms <= start_ms {
        (start_ms, start_ms + min_duration_ms)
    } else {
        (start_ms, end_ms)
    }
}

/// Per-metric scalar conversion from source units to destination units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitRule {
    Identity,
    /// `0.97` → `97.0`
    FractionToPercent,
    /// `97.0` → `0.97`
    PercentToFraction,
    /// `180.0` cm → `1.8` m
    CentimetersToMeters,
    /// `1.8` m → `180.0` cm
    MetersToCentimeters,
}

impl UnitRule {
    /// The rule that undoes this one.
    pub fn inverse(&self) -> UnitRule {
        match self {
            UnitRule::Identity => UnitRule::Identity,
            UnitRule::FractionToPercent => UnitRule::PercentToFraction,
            UnitRule::PercentToFraction => UnitRule::FractionToPercent,
            UnitRule::CentimetersToMeters => UnitRule::MetersToCentimeters,
            UnitRule::MetersToCentimeters => UnitRule::CentimetersToMeters,
        }
    }
}

/// Apply a unit rule to a source value.
pub fn convert_unit(value: f64, rule: UnitRule) -> f64 {
    match rule {
        UnitRule::Identity => value,
        UnitRule::FractionToPercent => value * 100.0,
        UnitRule::PercentToFraction => value / 100.0,
        UnitRule::CentimetersToMeters => value / 100.0,
        UnitRule::MetersToCentimeters => value * 100.0,
    }
}

/// Parse an export timestamp into milliseconds since the Unix epoch.
///
/// Accepts the export's `YYYY-MM-DD HH:MM:SS ±HHMM` layout and RFC 3339.
/// Returns `None` for anything else.
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    DateTime::parse_from_str(raw, EXPORT_DATE_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Parse a numeric attribute, rejecting NaN and infinities.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Milliseconds to the API's nanosecond decimal-string encoding.
pub fn ms_to_ns(ms: i64) -> String {
    (i128::from(ms) * 1_000_000).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repair_extends_empty_and_inverted_intervals() {
        for (start, end) in [(0, 0), (5_000, 4_999), (10, -10), (i64::from(i32::MAX), 0)] {
            assert_eq!(
                repair_interval(start, end, MIN_INTERVAL_MS),
                (start, start + MIN_INTERVAL_MS)
            );
        }
    }

    #[test]
    fn repair_keeps_valid_intervals() {
        for (start, end) in [(0, 1), (1_000, 61_000), (-5, 5)] {
            assert_eq!(repair_interval(start, end, MIN_INTERVAL_MS), (start, end));
        }
    }

    #[test]
    fn percentage_and_length_rules_invert() {
        for rule in [UnitRule::FractionToPercent, UnitRule::CentimetersToMeters] {
            for v in [0.0, 0.01, 0.97, 1.0, 172.5, 12_345.678] {
                let back = convert_unit(convert_unit(v, rule), rule.inverse());
                assert!((back - v).abs() < 1e-6, "{:?} {} -> {}", rule, v, back);
            }
        }
    }

    #[test]
    fn fraction_to_percent_keeps_two_decimals() {
        let pct = convert_unit(0.9712, UnitRule::FractionToPercent);
        assert_eq!((pct * 100.0).round() / 100.0, 97.12);
    }

    #[test]
    fn parses_export_dates_with_offset() {
        assert_eq!(
            parse_timestamp_ms("2024-01-01 00:00:00 +0000"),
            Some(1_704_067_200_000)
        );
        assert_eq!(
            parse_timestamp_ms("2024-01-01 01:00:00 +0100"),
            Some(1_704_067_200_000)
        );
        assert_eq!(
            parse_timestamp_ms("2024-01-01T00:00:00Z"),
            Some(1_704_067_200_000)
        );
        assert_eq!(parse_timestamp_ms("yesterday"), None);
        assert_eq!(parse_timestamp_ms(""), None);
    }

    #[test]
    fn parse_number_rejects_garbage() {
        assert_eq!(parse_number(" 70.5 "), Some(70.5));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn nanosecond_encoding() {
        assert_eq!(ms_to_ns(0), "0");
        assert_eq!(ms_to_ns(1_704_067_200_000), "1704067200000000000");
    }
}
