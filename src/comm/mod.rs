// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Messaging primitives shared by every block.
//!
//! * `value` - the payload type and the system-wide error sentinel
//! * `message` - the envelope with its at-most-once reply protocol

mod message;
mod value;

pub use message::{Message, ReplyReceiver};
pub use value::{error_reply, is_error_reply, Value};
