//! Go-style duration strings (`"15m"`, `"1h30m"`, `"90s"`).
//!
//! Capability grants carry their period in this format, and sign-in
//! records persist it the same way so they stay human-readable.

use std::time::Duration;

use crate::error::AppError;

/// Parses a duration string made of `<number><unit>` segments.
///
/// Supported units: `h`, `m`, `s`, `ms`, `us`, `ns`. Fractions are not
/// supported.
pub fn parse_duration(input: &str) -> Result<Duration, AppError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AppError::validation("duration must not be empty"));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;

    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return Err(AppError::validation(format!(
                "invalid duration '{input}': expected a number"
            )));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|_| AppError::validation(format!("invalid duration '{input}'")))?;
        rest = &rest[digits..];

        let unit_len = rest.chars().take_while(|c| c.is_ascii_alphabetic()).count();
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let segment = match unit {
            "h" => value.checked_mul(3600).map(Duration::from_secs),
            "m" => value.checked_mul(60).map(Duration::from_secs),
            "s" => Some(Duration::from_secs(value)),
            "ms" => Some(Duration::from_millis(value)),
            "us" => Some(Duration::from_micros(value)),
            "ns" => Some(Duration::from_nanos(value)),
            "" => {
                return Err(AppError::validation(format!(
                    "invalid duration '{input}': missing unit"
                )));
            }
            other => {
                return Err(AppError::validation(format!(
                    "invalid duration '{input}': unknown unit '{other}'"
                )));
            }
        };

        total = segment
            .and_then(|s| total.checked_add(s))
            .ok_or_else(|| AppError::validation(format!("duration '{input}' overflows")))?;
    }

    Ok(total)
}

/// Formats a duration in the shortest form that parses back exactly.
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }

    let secs = duration.as_secs();
    let nanos = duration.subsec_nanos();
    let segments = [
        (secs / 3600, "h"),
        ((secs % 3600) / 60, "m"),
        (secs % 60, "s"),
        (u64::from(nanos / 1_000_000), "ms"),
        (u64::from(nanos / 1_000 % 1_000), "us"),
        (u64::from(nanos % 1_000), "ns"),
    ];

    segments
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| format!("{value}{unit}"))
        .collect()
}

/// Serde adapter storing a [`Duration`] as a duration string.
pub mod as_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a duration as a string.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    /// Deserialize a duration from a string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
