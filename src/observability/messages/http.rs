// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the HTTP bridge blocks.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// HTTP server bound its address.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ServerListening<'a> {
    pub block_id: &'a str,
    pub address: &'a str,
    pub endpoint_count: usize,
}

impl Display for ServerListening<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "HTTP server '{}' listening on {} with {} endpoints",
            self.block_id, self.address, self.endpoint_count
        )
    }
}

impl StructuredLog for ServerListening<'_> {
    fn log(&self) {
        tracing::info!(
            block = self.block_id,
            address = self.address,
            endpoint_count = self.endpoint_count,
            "{}", self
        );
    }
}

/// HTTP server stopped serving.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ServerFailed<'a> {
    pub block_id: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for ServerFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "HTTP server '{}' failed: {}", self.block_id, self.error)
    }
}

impl StructuredLog for ServerFailed<'_> {
    fn log(&self) {
        tracing::error!(block = self.block_id, error = %self.error, "{}", self);
    }
}

/// No reply arrived before the endpoint timeout.
///
/// # Log Level
/// `warn!` - The caller got a 408
pub struct RequestTimedOut<'a> {
    pub block_id: &'a str,
    pub route: &'a str,
    pub timeout: Duration,
}

impl Display for RequestTimedOut<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Request to '{}' on '{}' timed out after {:?}",
            self.route, self.block_id, self.timeout
        )
    }
}

impl StructuredLog for RequestTimedOut<'_> {
    fn log(&self) {
        tracing::warn!(
            block = self.block_id,
            route = self.route,
            timeout_ms = self.timeout.as_millis() as u64,
            "{}", self
        );
    }
}

/// The client went away before a response was produced.
///
/// # Log Level
/// `warn!` - Nothing is sent back
pub struct ClientDisconnected<'a> {
    pub block_id: &'a str,
    pub route: &'a str,
}

impl Display for ClientDisconnected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Client disconnected from '{}' on '{}' before a reply",
            self.route, self.block_id
        )
    }
}

impl StructuredLog for ClientDisconnected<'_> {
    fn log(&self) {
        tracing::warn!(block = self.block_id, route = self.route, "{}", self);
    }
}

/// Inbound request body could not be decoded.
///
/// # Log Level
/// `warn!` - The caller got a 400
pub struct BodyRejected<'a> {
    pub block_id: &'a str,
    pub route: &'a str,
    pub reason: &'a str,
}

impl Display for BodyRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Rejected body for '{}' on '{}': {}",
            self.route, self.block_id, self.reason
        )
    }
}

impl StructuredLog for BodyRejected<'_> {
    fn log(&self) {
        tracing::warn!(
            block = self.block_id,
            route = self.route,
            reason = self.reason,
            "{}", self
        );
    }
}
