// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Counters scoped per block.
//!
//! A [`MetricsSink`] is handed to the graph once; every block receives a
//! [`BlockMetrics`] bound to its own id when it starts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Destination for block counters.
pub trait MetricsSink: Send + Sync {
    fn increment(&self, block_id: &str, counter: &'static str);
}

/// Emits every increment as a `trace` event. The default sink.
#[derive(Debug, Default)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn increment(&self, block_id: &str, counter: &'static str) {
        tracing::trace!(block = block_id, counter = counter, "counter incremented");
    }
}

/// Keeps counts in memory, keyed by `(block id, counter)`.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counts: Mutex<HashMap<(String, &'static str), u64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter, zero if never incremented.
    pub fn get(&self, block_id: &str, counter: &'static str) -> u64 {
        self.counts
            .lock()
            .map(|counts| {
                counts
                    .get(&(block_id.to_string(), counter))
                    .copied()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment(&self, block_id: &str, counter: &'static str) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry((block_id.to_string(), counter)).or_insert(0) += 1;
        }
    }
}

/// A block's handle on the metrics sink.
#[derive(Clone)]
pub struct BlockMetrics {
    block_id: Arc<str>,
    sink: Arc<dyn MetricsSink>,
}

impl BlockMetrics {
    pub fn new(block_id: &str, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            block_id: Arc::from(block_id),
            sink,
        }
    }

    pub fn increment(&self, counter: &'static str) {
        self.sink.increment(&self.block_id, counter);
    }
}

impl std::fmt::Debug for BlockMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockMetrics")
            .field("block_id", &self.block_id)
            .finish()
    }
}
