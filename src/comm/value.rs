// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde_json::json;

/// Payload type flowing through the block graph.
pub type Value = serde_json::Value;

/// The canonical "this represents a failure" value: an object whose `err`
/// attribute is null.
pub fn error_reply() -> Value {
    json!({ "err": null })
}

/// Whether `value` follows the failure convention: an object with an `err`
/// attribute holding null.
///
/// This matches [`error_reply`] itself as well as aggregates flagged with
/// `err` by the fan-out aggregator.
pub fn is_error_reply(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| matches!(map.get("err"), Some(Value::Null)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_is_error() {
        assert!(is_error_reply(&error_reply()));
    }

    #[test]
    fn test_flagged_aggregate_is_error() {
        assert!(is_error_reply(&json!({ "results": [1, null], "err": null })));
    }

    #[test]
    fn test_values_that_are_not_errors() {
        assert!(!is_error_reply(&json!({ "err": "boom" })));
        assert!(!is_error_reply(&json!({ "results": [] })));
        assert!(!is_error_reply(&json!(null)));
        assert!(!is_error_reply(&json!({})));
        assert!(!is_error_reply(&json!(["err"])));
    }
}
