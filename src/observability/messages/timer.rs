// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the timer state machine.
//!
//! Shared by the `timer` and `dead_mans_switch` blocks.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Timer re-armed by an inbound message or at start.
///
/// # Log Level
/// `debug!` - Happens on every heartbeat
pub struct TimerReset<'a> {
    pub block_id: &'a str,
    pub timeout: Duration,
}

impl Display for TimerReset<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.timeout.is_zero() {
            write!(f, "Timer '{}' reset and disarmed", self.block_id)
        } else {
            write!(
                f,
                "Timer '{}' reset, firing in {:?}",
                self.block_id, self.timeout
            )
        }
    }
}

impl StructuredLog for TimerReset<'_> {
    fn log(&self) {
        tracing::debug!(
            block = self.block_id,
            timeout_ms = self.timeout.as_millis() as u64,
            "{}", self
        );
    }
}

/// Timer fired a `timeout` or `repeat` event.
///
/// # Log Level
/// `warn!` - Something stopped reporting in
///
/// # Example
/// ```
/// use deadmanswitch::observability::messages::timer::TimerFired;
/// use std::time::Duration;
///
/// let msg = TimerFired {
///     block_id: "heartbeat",
///     event: "timeout",
///     next_timeout: Duration::from_secs(60),
/// };
///
/// assert_eq!(msg.to_string(), "Timer 'heartbeat' fired 'timeout', next in 60s");
/// ```
pub struct TimerFired<'a> {
    pub block_id: &'a str,
    pub event: &'a str,
    pub next_timeout: Duration,
}

impl Display for TimerFired<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.next_timeout.is_zero() {
            write!(
                f,
                "Timer '{}' fired '{}', not re-armed",
                self.block_id, self.event
            )
        } else {
            write!(
                f,
                "Timer '{}' fired '{}', next in {:?}",
                self.block_id, self.event, self.next_timeout
            )
        }
    }
}

impl StructuredLog for TimerFired<'_> {
    fn log(&self) {
        tracing::warn!(
            block = self.block_id,
            event = self.event,
            next_timeout_ms = self.next_timeout.as_millis() as u64,
            "{}", self
        );
    }
}

/// A downstream notification was superseded and cancelled.
///
/// # Log Level
/// `debug!` - Diagnostic detail
pub struct NotificationCancelled<'a> {
    pub block_id: &'a str,
}

impl Display for NotificationCancelled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Timer '{}' cancelled its previous downstream notification",
            self.block_id
        )
    }
}

impl StructuredLog for NotificationCancelled<'_> {
    fn log(&self) {
        tracing::debug!(block = self.block_id, "{}", self);
    }
}
