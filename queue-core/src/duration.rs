//! Recycle-duration grammar: `5s`, `1m30s`, `2h`, empty ⇒ zero.
//!
//! This is the Rust-side equivalent of Go's `time.ParseDuration`, restricted
//! to the unit suffixes a recycle duration actually needs (`h`, `m`, `s`,
//! `ms`).

use std::time::Duration;

use crate::error::QueueError;

/// Parse a recycle-duration string. An empty string means zero.
pub fn parse_recycle(value: &str) -> Result<Duration, QueueError> {
    if value.is_empty() {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = value;
    let mut saw_component = false;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| invalid(value))?;
        if digits_end == 0 {
            return Err(invalid(value));
        }
        let (number, tail) = rest.split_at(digits_end);
        let number: f64 = number.parse().map_err(|_| invalid(value))?;

        let (unit, tail) = split_unit(tail).ok_or_else(|| invalid(value))?;
        let nanos_per_unit = match unit {
            "h" => 3_600_000_000_000u64,
            "m" => 60_000_000_000u64,
            "s" => 1_000_000_000u64,
            "ms" => 1_000_000u64,
            _ => return Err(invalid(value)),
        };

        let nanos = number * nanos_per_unit as f64;
        if nanos < 0.0 || !nanos.is_finite() {
            return Err(invalid(value));
        }
        total += Duration::from_nanos(nanos as u64);
        saw_component = true;
        rest = tail;
    }

    if !saw_component {
        return Err(invalid(value));
    }

    Ok(total)
}

/// Split the longest known unit suffix off the front of `s`.
fn split_unit(s: &str) -> Option<(&str, &str)> {
    for unit in ["ms", "h", "m", "s"] {
        if let Some(tail) = s.strip_prefix(unit) {
            return Some((unit, tail));
        }
    }
    None
}

fn invalid(value: &str) -> QueueError {
    QueueError::InvalidForm(value.to_string())
}
