// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::comm::Message;
use crate::errors::ConfigError;
use crate::expr::DefaultVariables;
use crate::observability::messages::block::BlockTaskExited;
use crate::observability::messages::StructuredLog;
use crate::observability::metrics::{BlockMetrics, MetricsSink};

use super::channels::{ChannelPointer, ChannelRegistry};

/// Everything a block needs while the graph is being wired and started.
///
/// Holds the channel registry, the address book mapping block ids to their
/// input channels, the default variables, the metrics sink and the set of
/// long-lived block tasks.
pub struct BlockEnv {
    channels: ChannelRegistry,
    blocks: HashSet<String>,
    addresses: HashMap<String, ChannelPointer>,
    defaults: Arc<DefaultVariables>,
    metrics: Arc<dyn MetricsSink>,
    tasks: JoinSet<String>,
}

impl BlockEnv {
    pub fn new(defaults: DefaultVariables, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            channels: ChannelRegistry::new(),
            blocks: HashSet::new(),
            addresses: HashMap::new(),
            defaults: Arc::new(defaults),
            metrics,
            tasks: JoinSet::new(),
        }
    }

    /// Allocates a new channel in the registry.
    pub fn new_channel(&mut self) -> ChannelPointer {
        self.channels.new_channel()
    }

    /// Records a block and, when it has one, its input channel.
    pub fn declare_block(&mut self, block_id: &str, input: Option<ChannelPointer>) {
        self.blocks.insert(block_id.to_string());
        if let Some(pointer) = input {
            self.addresses.insert(block_id.to_string(), pointer);
        }
    }

    /// Checks that `reference` names a block accepting messages.
    pub fn check_reference(&self, block_id: &str, reference: &str) -> Result<(), ConfigError> {
        if self.addresses.contains_key(reference) {
            Ok(())
        } else if self.blocks.contains(reference) {
            Err(ConfigError::NotAddressable {
                block_id: block_id.to_string(),
                reference: reference.to_string(),
            })
        } else {
            Err(ConfigError::UnknownBlockReference {
                block_id: block_id.to_string(),
                reference: reference.to_string(),
            })
        }
    }

    /// Send end of the input channel of the block named by `reference`.
    pub fn sender_for(
        &self,
        block_id: &str,
        reference: &str,
    ) -> Result<mpsc::Sender<Message>, ConfigError> {
        self.check_reference(block_id, reference)?;
        match self.addresses.get(reference) {
            Some(pointer) => Ok(self.channels.resolve_send(pointer)),
            None => Err(ConfigError::UnknownBlockReference {
                block_id: block_id.to_string(),
                reference: reference.to_string(),
            }),
        }
    }

    /// Send end of a channel by pointer.
    pub fn resolve_send(&self, pointer: &ChannelPointer) -> mpsc::Sender<Message> {
        self.channels.resolve_send(pointer)
    }

    /// Receive end of a channel by pointer. Taken once, by the owning block.
    pub fn resolve_receive(&mut self, pointer: &ChannelPointer) -> mpsc::Receiver<Message> {
        self.channels.resolve_receive(pointer)
    }

    pub fn defaults(&self) -> Arc<DefaultVariables> {
        self.defaults.clone()
    }

    pub fn metrics_for(&self, block_id: &str) -> BlockMetrics {
        BlockMetrics::new(block_id, self.metrics.clone())
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Runs a block's main loop. These loops are expected to run forever.
    ///
    /// The task stays in the caller's span.
    pub fn spawn_block<F>(&mut self, block_id: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let block_id = block_id.to_string();
        self.tasks.spawn(
            async move {
                future.await;
                block_id
            }
            .instrument(tracing::Span::current()),
        );
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for the first block task to end and returns its id.
    ///
    /// Returns `None` when no task was ever spawned.
    pub async fn supervise(&mut self) -> Option<String> {
        let finished = self.tasks.join_next().await?;
        let block_id = match finished {
            Ok(block_id) => block_id,
            Err(error) => format!("<block task: {}>", error),
        };
        BlockTaskExited {
            block_id: &block_id,
        }
        .log();
        Some(block_id)
    }

    /// Aborts every block task.
    pub fn shutdown(&mut self) {
        self.tasks.abort_all();
    }
}
