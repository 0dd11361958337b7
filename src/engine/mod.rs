// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Coordination machinery shared by several blocks.
//!
//! * `timer` - the reset/timeout/repeat state machine with backoff
//! * `fanout` - concurrent fan-out with index-faithful result collection

pub mod fanout;
pub mod timer;

pub use fanout::{send_all, SendRequest};
pub use timer::{Backoff, TimeoutSource, TimerEvent, TimerLoop, TimerSink, TimerState};
