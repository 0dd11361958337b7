// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Body encodings shared by the HTTP blocks.

use serde::Deserialize;
use serde_json::Map;

use crate::comm::Value;
use crate::expr::value_kind;

pub const JSON: &str = "application/json";
pub const FORM: &str = "application/x-www-form-urlencoded";
pub const TEXT: &str = "text/plain";

/// Encoding of an outgoing request body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Json,
    Form,
    Raw,
}

impl ContentType {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Json => JSON,
            ContentType::Form => FORM,
            ContentType::Raw => TEXT,
        }
    }

    /// Serializes `value` for the wire.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, String> {
        match self {
            ContentType::Json => serde_json::to_vec(value).map_err(|e| e.to_string()),
            ContentType::Form => encode_form(value).map(String::into_bytes),
            ContentType::Raw => match value {
                Value::String(text) => Ok(text.clone().into_bytes()),
                other => Err(format!("raw body must be a string, got {}", value_kind(other))),
            },
        }
    }
}

/// Flat string map from a query string or a form body. A repeated key keeps
/// its last value.
pub fn decode_form(input: &[u8]) -> Value {
    let map: Map<String, Value> = url::form_urlencoded::parse(input)
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect();
    Value::Object(map)
}

/// Form encoding of a flat object. Scalars are written as text, nested
/// values are rejected.
pub fn encode_form(value: &Value) -> Result<String, String> {
    let Value::Object(map) = value else {
        return Err(format!("form body must be an object, got {}", value_kind(value)));
    };
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, item) in map {
        let text = match item {
            Value::String(text) => text.clone(),
            Value::Number(number) => number.to_string(),
            Value::Bool(flag) => flag.to_string(),
            Value::Null => String::new(),
            other => {
                return Err(format!(
                    "form field '{}' must be a scalar, got {}",
                    key,
                    value_kind(other)
                ))
            }
        };
        serializer.append_pair(key, &text);
    }
    Ok(serializer.finish())
}

/// Decodes a body according to its `Content-Type`. A missing type is read
/// as JSON, an empty body is null.
pub fn decode_body(content_type: Option<&str>, body: &[u8]) -> Result<Value, String> {
    if body.is_empty() {
        return Ok(Value::Null);
    }
    let mime = content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase());

    match mime.as_deref() {
        None => serde_json::from_slice(body).map_err(|e| e.to_string()),
        Some(mime) if mime == JSON || mime.ends_with("+json") => {
            serde_json::from_slice(body).map_err(|e| e.to_string())
        }
        Some(FORM) => Ok(decode_form(body)),
        Some(mime) if mime.starts_with("text/") => String::from_utf8(body.to_vec())
            .map(Value::String)
            .map_err(|e| e.to_string()),
        Some(other) => Err(format!("unsupported content type '{}'", other)),
    }
}
