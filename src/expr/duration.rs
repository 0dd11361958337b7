// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::time::Duration;

use crate::comm::Value;
use crate::errors::BlockError;

/// Longest period a timeout may request. Keeps every deadline representable.
pub const MAX_PERIOD: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn within_range(period: Duration) -> Result<Duration, String> {
    if period > MAX_PERIOD {
        return Err("longer than 100 years".to_string());
    }
    Ok(period)
}

/// Parses a duration literal such as `100ms`, `10s` or `1h30m`. A bare `0`
/// is accepted as zero.
pub fn parse_duration(literal: &str) -> Result<Duration, String> {
    let literal = literal.trim();
    if literal == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(literal)
        .map_err(|e| e.to_string())
        .and_then(within_range)
}

/// Interprets an evaluated timeout: numbers are seconds, strings are
/// duration literals, anything else is an error.
pub fn timeout_from_value(value: &Value) -> Result<Duration, BlockError> {
    match value {
        Value::Number(number) => {
            let seconds = number.as_f64().unwrap_or(-1.0);
            Duration::try_from_secs_f64(seconds)
                .map_err(|e| e.to_string())
                .and_then(within_range)
                .map_err(|reason| {
                    BlockError::InvalidTimeout(format!("{} seconds: {}", number, reason))
                })
        }
        Value::String(literal) => parse_duration(literal)
            .map_err(|reason| BlockError::InvalidTimeout(format!("'{}': {}", literal, reason))),
        other => Err(BlockError::InvalidTimeout(format!(
            "wrong timeout type: {}",
            value_kind(other)
        ))),
    }
}

/// Human name of a value's type, for error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "object",
    }
}
