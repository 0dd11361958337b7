// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Block implementations and the capability set they share.
//!
//! A block goes through three phases, driven by the runtime builder:
//!
//! 1. `bind` - allocate the input channel, if the block accepts messages
//! 2. `configure` - parse and validate its settings
//! 3. `start` - resolve the blocks it sends to and spawn its tasks
//!
//! Every phase runs for all blocks before the next one starts, so by the time
//! a block starts, every address in the graph is known.

mod codec;
mod dead_mans_switch;
mod deduplicate;
mod factory;
mod http_request;
mod http_server;
mod log;
mod map;
mod mux;
mod split;
mod splitter;
mod timer;

use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::comm::Message;
use crate::errors::ConfigError;
use crate::expr::{parse_duration, Expression};
use crate::runtime::{BlockEnv, ChannelPointer};

pub use dead_mans_switch::DeadMansSwitchBlock;
pub use deduplicate::DeduplicateBlock;
pub use factory::BlockFactory;
pub use http_request::HttpRequestBlock;
pub use http_server::{build_router, HttpServerBlock, Route};
pub use log::LogBlock;
pub use map::MapBlock;
pub use mux::MuxBlock;
pub use split::SplitBlock;
pub use splitter::SplitterBlock;
pub use timer::TimerBlock;

/// A node of the graph.
pub trait Block: Send {
    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    /// Registered type name, as written in the configuration.
    fn block_type(&self) -> &'static str;

    /// Allocates the input channel. Blocks that only produce messages
    /// return `None` and cannot be sent to.
    fn bind(&mut self, env: &mut BlockEnv) -> Option<ChannelPointer>;

    /// Parses the block's settings (everything except `type` and `id`).
    fn configure(&mut self, settings: serde_yaml::Value) -> Result<(), ConfigError>;

    /// Blocks this block sends to. Checked before anything starts.
    fn references(&self) -> Vec<&BlockRef> {
        Vec::new()
    }

    /// Spawns the block's tasks.
    fn start(self: Box<Self>, env: &mut BlockEnv) -> Result<(), ConfigError>;
}

/// Name of another block, used as a destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct BlockRef(String);

impl BlockRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Send end of the referenced block's input channel.
    pub fn sender(&self, block_id: &str, env: &BlockEnv) -> Result<mpsc::Sender<Message>, ConfigError> {
        env.sender_for(block_id, &self.0)
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity plus input channel, shared by every block that accepts messages.
#[derive(Debug, Default)]
pub struct SingleChannel {
    id: String,
    input: Option<ChannelPointer>,
}

impl SingleChannel {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: String) {
        self.id = id;
    }

    pub fn bind(&mut self, env: &mut BlockEnv) -> Option<ChannelPointer> {
        let pointer = env.new_channel();
        self.input = Some(pointer.clone());
        Some(pointer)
    }

    /// Receive end of the input channel.
    pub fn take_input(&mut self, env: &mut BlockEnv) -> Result<mpsc::Receiver<Message>, ConfigError> {
        match self.input.take() {
            Some(pointer) => Ok(env.resolve_receive(&pointer)),
            None => Err(ConfigError::NotConfigured {
                block_id: self.id.clone(),
            }),
        }
    }
}

/// Deserializes a block's settings.
pub(crate) fn parse_settings<T: DeserializeOwned>(
    block_id: &str,
    settings: serde_yaml::Value,
) -> Result<T, ConfigError> {
    serde_yaml::from_value(settings).map_err(|source| ConfigError::Parse {
        block_id: Some(block_id.to_string()),
        source,
    })
}

/// Parses a duration setting, `default` when absent.
pub(crate) fn duration_setting(
    block_id: &str,
    field: &'static str,
    literal: Option<&str>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match literal {
        None => Ok(default),
        Some(literal) => parse_duration(literal).map_err(|reason| ConfigError::InvalidDuration {
            block_id: block_id.to_string(),
            field,
            value: literal.to_string(),
            reason,
        }),
    }
}

/// Rejects expressions with malformed placeholders.
pub(crate) fn check_expression(
    block_id: &str,
    field: &'static str,
    expr: &Expression,
) -> Result<(), ConfigError> {
    expr.validate().map_err(|e| ConfigError::InvalidSetting {
        block_id: block_id.to_string(),
        field,
        reason: e.to_string(),
    })
}

/// Configuration taken out of a block at start.
pub(crate) fn configured<T>(block_id: &str, config: Option<T>) -> Result<T, ConfigError> {
    config.ok_or_else(|| ConfigError::NotConfigured {
        block_id: block_id.to_string(),
    })
}
