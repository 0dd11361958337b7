// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Expressions evaluated against a message.
//!
//! Any configuration value is an expression. Evaluation walks it
//! structurally and substitutes `${path}` placeholders found in strings:
//!
//! * a string that is exactly `"${msg.user.name}"` evaluates to the referenced
//!   value itself, whatever its type
//! * a string with embedded placeholders, such as `"user ${msg.id} is late"`,
//!   interpolates them (strings verbatim, everything else as JSON)
//! * everything else evaluates to itself
//!
//! A path starts with a root variable (`msg`, `env` or a configured default)
//! followed by `.field`, `.0` or `[0]` segments.
//!
//! # Example
//! ```
//! use deadmanswitch::expr::{DefaultVariables, Expression, Variables};
//! use serde_json::json;
//!
//! let expr: Expression = serde_yaml::from_str(r#"{ text: "${msg.host} is down", host: "${msg.host}" }"#).unwrap();
//! let msg = json!({ "host": "db-1" });
//! let defaults = DefaultVariables::new();
//!
//! let value = expr.evaluate(&Variables::new(&msg, &defaults)).unwrap();
//! assert_eq!(value, json!({ "text": "db-1 is down", "host": "db-1" }));
//! ```

mod duration;
mod path;

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Map;

use crate::comm::Value;
use crate::errors::EvalError;

pub use duration::{parse_duration, timeout_from_value, value_kind, MAX_PERIOD};
use path::Path;

/// Name under which the current message's value is visible to expressions.
pub const MSG_VARIABLE: &str = "msg";

/// Name under which the process environment is visible to expressions.
pub const ENV_VARIABLE: &str = "env";

/// Process-wide variables visible to every expression, next to `msg`.
#[derive(Debug, Clone, Default)]
pub struct DefaultVariables(HashMap<String, Value>);

impl DefaultVariables {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Defaults holding the process environment under `env`.
    pub fn from_process_env() -> Self {
        let env: Map<String, Value> = std::env::vars()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();
        let mut defaults = Self::new();
        defaults.insert(ENV_VARIABLE, Value::Object(env));
        defaults
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }
}

/// Evaluation context: the message value plus the defaults.
pub struct Variables<'a> {
    msg: &'a Value,
    defaults: &'a DefaultVariables,
}

impl<'a> Variables<'a> {
    pub fn new(msg: &'a Value, defaults: &'a DefaultVariables) -> Self {
        Self { msg, defaults }
    }

    fn root(&self, name: &str) -> Option<&'a Value> {
        if name == MSG_VARIABLE {
            Some(self.msg)
        } else {
            self.defaults.get(name)
        }
    }
}

/// A configured expression. The default (and an omitted setting) is null.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Expression(Value);

impl Expression {
    pub fn new(template: Value) -> Self {
        Self(template)
    }

    /// Whether the expression was omitted.
    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }

    /// Checks every placeholder for syntax errors without evaluating.
    pub fn validate(&self) -> Result<(), EvalError> {
        validate_value(&self.0)
    }

    pub fn evaluate(&self, vars: &Variables<'_>) -> Result<Value, EvalError> {
        evaluate_value(&self.0, vars)
    }

    /// Evaluates and requires a string result.
    pub fn evaluate_string(&self, vars: &Variables<'_>) -> Result<String, EvalError> {
        match self.evaluate(vars)? {
            Value::String(text) => Ok(text),
            other => Err(EvalError::WrongType {
                expected: "string",
                found: value_kind(&other),
            }),
        }
    }
}

fn validate_value(template: &Value) -> Result<(), EvalError> {
    match template {
        Value::String(text) => {
            for segment in split_template(text)? {
                if let Segment::Placeholder(expr) = segment {
                    Path::parse(expr)?;
                }
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(validate_value),
        Value::Object(map) => map.values().try_for_each(validate_value),
        _ => Ok(()),
    }
}

fn evaluate_value(template: &Value, vars: &Variables<'_>) -> Result<Value, EvalError> {
    match template {
        Value::String(text) => evaluate_string(text, vars),
        Value::Array(items) => items
            .iter()
            .map(|item| evaluate_value(item, vars))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(key, item)| Ok((key.clone(), evaluate_value(item, vars)?)))
            .collect::<Result<Map<_, _>, EvalError>>()
            .map(Value::Object),
        scalar => Ok(scalar.clone()),
    }
}

fn evaluate_string(text: &str, vars: &Variables<'_>) -> Result<Value, EvalError> {
    let segments = split_template(text)?;

    // A lone placeholder keeps the referenced value's type.
    if let [Segment::Placeholder(expr)] = segments.as_slice() {
        return Path::parse(expr)?.resolve(vars).cloned();
    }

    let mut out = String::with_capacity(text.len());
    for segment in segments {
        match segment {
            Segment::Literal(literal) => out.push_str(literal),
            Segment::Placeholder(expr) => match Path::parse(expr)?.resolve(vars)? {
                Value::String(inner) => out.push_str(inner),
                other => out.push_str(&other.to_string()),
            },
        }
    }
    Ok(Value::String(out))
}

enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn split_template(text: &str) -> Result<Vec<Segment<'_>>, EvalError> {
    let mut segments = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        if start > 0 {
            segments.push(Segment::Literal(&rest[..start]));
        }
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| EvalError::Syntax {
            expr: text.to_string(),
            reason: "unterminated '${'".to_string(),
        })?;
        segments.push(Segment::Placeholder(after[..end].trim()));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(template: Value, msg: Value) -> Result<Value, EvalError> {
        let mut defaults = DefaultVariables::new();
        defaults.insert("env", json!({ "TOKEN": "s3cret" }));
        Expression::new(template).evaluate(&Variables::new(&msg, &defaults))
    }

    #[test]
    fn test_literals_evaluate_to_themselves() {
        assert_eq!(eval(json!(42), json!(null)).unwrap(), json!(42));
        assert_eq!(eval(json!("plain"), json!(null)).unwrap(), json!("plain"));
        assert_eq!(eval(json!([true, null]), json!(null)).unwrap(), json!([true, null]));
    }

    #[test]
    fn test_lone_placeholder_keeps_type() {
        let msg = json!({ "items": [1, 2, 3], "timeout": 5 });
        assert_eq!(eval(json!("${msg.items}"), msg.clone()).unwrap(), json!([1, 2, 3]));
        assert_eq!(eval(json!("${ msg.timeout }"), msg.clone()).unwrap(), json!(5));
        assert_eq!(eval(json!("${msg}"), msg.clone()).unwrap(), msg);
    }

    #[test]
    fn test_interpolation() {
        let msg = json!({ "host": "db-1", "load": 0.5, "tags": ["a"] });
        assert_eq!(
            eval(json!("${msg.host} at ${msg.load} ${msg.tags}"), msg).unwrap(),
            json!("db-1 at 0.5 [\"a\"]")
        );
    }

    #[test]
    fn test_default_variables_are_visible() {
        assert_eq!(
            eval(json!("Bearer ${env.TOKEN}"), json!(null)).unwrap(),
            json!("Bearer s3cret")
        );
    }

    #[test]
    fn test_nested_templates() {
        let msg = json!({ "event": "timeout" });
        assert_eq!(
            eval(json!({ "text": "got ${msg.event}", "raw": ["${msg.event}"] }), msg).unwrap(),
            json!({ "text": "got timeout", "raw": ["timeout"] })
        );
    }

    #[test]
    fn test_unknown_values() {
        assert_eq!(
            eval(json!("${msg.missing}"), json!({})).unwrap_err(),
            EvalError::Unknown("msg.missing".to_string())
        );
        assert!(matches!(
            eval(json!("${nope}"), json!({})),
            Err(EvalError::Unknown(_))
        ));
    }

    #[test]
    fn test_syntax_errors_are_caught_by_validate() {
        assert!(Expression::new(json!({ "a": ["${msg.x"] })).validate().is_err());
        assert!(Expression::new(json!("${msg..x}")).validate().is_err());
        assert!(Expression::new(json!("${msg.x[0]}")).validate().is_ok());
    }

    #[test]
    fn test_evaluate_string_requires_string() {
        let defaults = DefaultVariables::new();
        let msg = json!({ "n": 1 });
        let vars = Variables::new(&msg, &defaults);
        assert_eq!(
            Expression::new(json!("${msg.n}")).evaluate_string(&vars),
            Err(EvalError::WrongType {
                expected: "string",
                found: "number"
            })
        );
    }

    #[test]
    fn test_omitted_expression_is_empty() {
        assert!(Expression::default().is_empty());
        assert!(!Expression::new(json!("")).is_empty());
    }
}
