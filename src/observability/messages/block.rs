// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for graph construction and block lifecycle events.
//!
//! This module contains message types for logging events related to:
//! * Configuration loading and graph construction
//! * Block startup and supervision
//! * Per-message handler failures caught by the processing harness
//! * Output of the `log` and `deduplicate` blocks

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};

/// Block graph built and all blocks started.
///
/// # Log Level
/// `info!` - Important operational event
pub struct GraphStarted {
    pub block_count: usize,
    pub channel_count: usize,
}

impl Display for GraphStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Started {} blocks wired through {} channels",
            self.block_count, self.channel_count
        )
    }
}

impl StructuredLog for GraphStarted {
    fn log(&self) {
        tracing::info!(
            block_count = self.block_count,
            channel_count = self.channel_count,
            "{}", self
        );
    }
}

/// A single block was started.
///
/// # Log Level
/// `debug!` - Lifecycle detail
pub struct BlockStarted<'a> {
    pub block_id: &'a str,
    pub block_type: &'a str,
}

impl Display for BlockStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Block '{}' ({}) started", self.block_id, self.block_type)
    }
}

impl StructuredLog for BlockStarted<'_> {
    fn log(&self) {
        tracing::debug!(block = self.block_id, block_type = self.block_type, "{}", self);
    }
}

/// Configuration rejected at startup.
///
/// # Log Level
/// `error!` - Fatal, the process exits
pub struct ConfigurationRejected<'a> {
    pub error: &'a dyn std::error::Error,
}

impl Display for ConfigurationRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl StructuredLog for ConfigurationRejected<'_> {
    fn log(&self) {
        tracing::error!(error = %self.error, "{}", self);
    }
}

/// A message handler returned an error; the message is error-replied.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use deadmanswitch::observability::messages::block::HandlerFailed;
///
/// let error = std::io::Error::new(std::io::ErrorKind::Other, "test error");
/// let msg = HandlerFailed {
///     block_id: "alert",
///     error: &error,
/// };
///
/// assert_eq!(msg.to_string(), "Block 'alert' failed to handle message: test error");
/// ```
pub struct HandlerFailed<'a> {
    pub block_id: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for HandlerFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Block '{}' failed to handle message: {}",
            self.block_id, self.error
        )
    }
}

impl StructuredLog for HandlerFailed<'_> {
    fn log(&self) {
        tracing::error!(block = self.block_id, error = %self.error, "{}", self);
    }
}

/// A message handler panicked; the panic was contained by the harness.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct HandlerPanicked<'a> {
    pub block_id: &'a str,
    pub reason: &'a str,
}

impl Display for HandlerPanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Block '{}' panicked while handling message: {}",
            self.block_id, self.reason
        )
    }
}

impl StructuredLog for HandlerPanicked<'_> {
    fn log(&self) {
        tracing::error!(block = self.block_id, reason = self.reason, "{}", self);
    }
}

/// The input channel of a block closed. Channels are never closed in normal
/// operation, so this means the graph is broken.
///
/// # Log Level
/// `error!` - Fatal
pub struct InputChannelClosed<'a> {
    pub block_id: &'a str,
}

impl Display for InputChannelClosed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Communication channel of block '{}' closed", self.block_id)
    }
}

impl StructuredLog for InputChannelClosed<'_> {
    fn log(&self) {
        tracing::error!(block = self.block_id, "{}", self);
    }
}

/// A long-lived block task ended.
///
/// # Log Level
/// `error!` - Fatal, the process exits
pub struct BlockTaskExited<'a> {
    pub block_id: &'a str,
}

impl Display for BlockTaskExited<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Block '{}' stopped running", self.block_id)
    }
}

impl StructuredLog for BlockTaskExited<'_> {
    fn log(&self) {
        tracing::error!(block = self.block_id, "{}", self);
    }
}

/// Output line of a `log` block.
///
/// # Log Level
/// `info!` - The whole point of the block
///
/// # Example
/// ```
/// use deadmanswitch::observability::messages::block::LogOutput;
///
/// let msg = LogOutput {
///     block_id: "audit",
///     text: r#"{"event":"timeout"}"#,
/// };
///
/// assert_eq!(msg.to_string(), r#"{"event":"timeout"}"#);
/// ```
pub struct LogOutput<'a> {
    pub block_id: &'a str,
    pub text: &'a str,
}

impl Display for LogOutput<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl StructuredLog for LogOutput<'_> {
    fn log(&self) {
        tracing::info!(block = self.block_id, "{}", self);
    }
}

/// A repeated value was dropped by a `deduplicate` block.
///
/// # Log Level
/// `debug!` - Diagnostic detail
pub struct DuplicateSuppressed<'a> {
    pub block_id: &'a str,
}

impl Display for DuplicateSuppressed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Block '{}' suppressed a repeated value", self.block_id)
    }
}

impl StructuredLog for DuplicateSuppressed<'_> {
    fn log(&self) {
        tracing::debug!(block = self.block_id, "{}", self);
    }
}
