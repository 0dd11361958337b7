// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::comm::Value;
use crate::errors::EvalError;

use super::Variables;

#[derive(Debug, Clone, PartialEq)]
enum Step<'a> {
    Field(&'a str),
    Index(usize),
}

/// A parsed `root.field[0].other` reference.
#[derive(Debug)]
pub(super) struct Path<'a> {
    text: &'a str,
    root: &'a str,
    steps: Vec<Step<'a>>,
}

impl<'a> Path<'a> {
    pub(super) fn parse(text: &'a str) -> Result<Self, EvalError> {
        let syntax = |reason: &str| EvalError::Syntax {
            expr: text.to_string(),
            reason: reason.to_string(),
        };

        let mut rest = text;
        let root_len = ident_len(rest);
        if root_len == 0 {
            return Err(syntax("expected a variable name"));
        }
        let root = &rest[..root_len];
        rest = &rest[root_len..];

        let mut steps = Vec::new();
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('.') {
                let len = ident_len(after);
                if len == 0 {
                    return Err(syntax("expected a field name after '.'"));
                }
                let name = &after[..len];
                steps.push(match name.parse::<usize>() {
                    Ok(index) => Step::Index(index),
                    Err(_) => Step::Field(name),
                });
                rest = &after[len..];
            } else if let Some(after) = rest.strip_prefix('[') {
                let close = after.find(']').ok_or_else(|| syntax("unterminated '['"))?;
                let index = after[..close]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| syntax("index must be a non-negative integer"))?;
                steps.push(Step::Index(index));
                rest = &after[close + 1..];
            } else {
                return Err(syntax("unexpected character"));
            }
        }

        Ok(Self { text, root, steps })
    }

    pub(super) fn resolve<'v>(&self, vars: &Variables<'v>) -> Result<&'v Value, EvalError> {
        let unknown = || EvalError::Unknown(self.text.to_string());
        let mut current = vars.root(self.root).ok_or_else(unknown)?;
        for step in &self.steps {
            current = match (step, current) {
                (Step::Field(name), Value::Object(map)) => map.get(*name),
                (Step::Index(index), Value::Array(items)) => items.get(*index),
                (Step::Index(index), Value::Object(map)) => map.get(&index.to_string()),
                _ => None,
            }
            .ok_or_else(unknown)?;
        }
        Ok(current)
    }
}

fn ident_len(text: &str) -> usize {
    text.find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_steps() {
        let path = Path::parse("msg.items[2].name.0").unwrap();
        assert_eq!(path.root, "msg");
        assert_eq!(
            path.steps,
            vec![
                Step::Field("items"),
                Step::Index(2),
                Step::Field("name"),
                Step::Index(0)
            ]
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Path::parse("").is_err());
        assert!(Path::parse(".msg").is_err());
        assert!(Path::parse("msg.").is_err());
        assert!(Path::parse("msg[x]").is_err());
        assert!(Path::parse("msg[1").is_err());
        assert!(Path::parse("msg + 1").is_err());
    }
}
