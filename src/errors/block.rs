// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-message errors.
//!
//! None of these are fatal: the harness reports them and error-replies to the
//! message, then the block carries on with the next one.

use thiserror::Error;

/// Failure while evaluating an expression against a message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// The expression references something that does not exist
    #[error("Unknown value: '{0}'")]
    Unknown(String),

    /// The expression text is malformed
    #[error("Invalid expression '{expr}': {reason}")]
    Syntax { expr: String, reason: String },

    /// The expression evaluated to a type the caller cannot use
    #[error("Expected {expected}, got {found}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
}

/// Failure while handling a single message.
#[derive(Error, Debug)]
pub enum BlockError {
    /// Expression evaluation failed.
    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    /// A timeout expression did not produce a usable duration.
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    /// The body could not be encoded for the outgoing request.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Outgoing HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote side answered with a non-success status.
    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    /// The response body could not be decoded.
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// JSON serialization or parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The message was cancelled by its origin.
    #[error("Cancelled")]
    Cancelled,

    /// A downstream block answered with the error sentinel.
    #[error("Error from downstream in '{0}'")]
    Downstream(String),
}
