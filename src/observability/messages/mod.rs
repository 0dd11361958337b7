// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for the human-readable line and
//! [`StructuredLog`] to emit it with the right level and fields.
//!
//! * `block` - graph construction, harness and block lifecycle events
//! * `timer` - timer and dead man's switch events
//! * `http` - HTTP ingress and egress events

pub mod block;
pub mod http;
pub mod timer;

/// A message that knows its own log level and structured fields.
pub trait StructuredLog {
    /// Emit the message as a tracing event.
    fn log(&self);
}
