// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and metrics.
//!
//! This module provides centralized message types for all diagnostic and operational
//! logging throughout the engine. Message types follow a struct-based pattern
//! with `Display` trait implementation to:
//!
//! * Eliminate magic strings scattered throughout the codebase
//! * Keep field names consistent between log lines
//! * Provide consistent, structured logging output
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::block` - graph construction, harness and block lifecycle events
//! * `messages::timer` - timer and dead man's switch events
//! * `messages::http` - HTTP ingress and egress events
//!
//! Counters live in [`metrics`]; every block gets its own [`metrics::BlockMetrics`]
//! handle at start time instead of addressing a global registry.
//!
//! # Usage
//!
//! ```rust
//! use deadmanswitch::observability::messages::block::HandlerFailed;
//! use deadmanswitch::observability::messages::StructuredLog;
//!
//! let error = std::io::Error::new(std::io::ErrorKind::Other, "test error");
//! HandlerFailed {
//!     block_id: "alert",
//!     error: &error,
//! }
//! .log();
//! ```

pub mod messages;
pub mod metrics;
