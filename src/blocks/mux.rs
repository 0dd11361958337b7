// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::comm::Message;
use crate::engine::fanout::{send_all, SendRequest};
use crate::errors::{BlockError, ConfigError};
use crate::runtime::{start_processing, BlockEnv, ChannelPointer, MessageHandler};

use super::{configured, parse_settings, Block, BlockRef, SingleChannel};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MuxSettings {
    send_to: Vec<BlockRef>,
    #[serde(default)]
    terminate_on_error: bool,
}

/// Sends every message to all destinations and replies with the collected
/// results.
#[derive(Debug, Default)]
pub struct MuxBlock {
    channel: SingleChannel,
    settings: Option<MuxSettings>,
}

impl Block for MuxBlock {
    fn id(&self) -> &str {
        self.channel.id()
    }

    fn set_id(&mut self, id: String) {
        self.channel.set_id(id);
    }

    fn block_type(&self) -> &'static str {
        "mux"
    }

    fn bind(&mut self, env: &mut BlockEnv) -> Option<ChannelPointer> {
        self.channel.bind(env)
    }

    fn configure(&mut self, settings: serde_yaml::Value) -> Result<(), ConfigError> {
        self.settings = Some(parse_settings(self.channel.id(), settings)?);
        Ok(())
    }

    fn references(&self) -> Vec<&BlockRef> {
        self.settings
            .iter()
            .flat_map(|settings| settings.send_to.iter())
            .collect()
    }

    fn start(mut self: Box<Self>, env: &mut BlockEnv) -> Result<(), ConfigError> {
        let settings = configured(self.channel.id(), self.settings.take())?;
        let id = self.channel.id().to_string();
        let handler = Mux {
            targets: settings
                .send_to
                .iter()
                .map(|target| target.sender(&id, env))
                .collect::<Result<_, _>>()?,
            terminate_on_error: settings.terminate_on_error,
        };
        let input = self.channel.take_input(env)?;
        let metrics = env.metrics_for(&id);
        env.spawn_block(&id, start_processing(id.clone(), input, Arc::new(handler), metrics));
        Ok(())
    }
}

struct Mux {
    targets: Vec<mpsc::Sender<Message>>,
    terminate_on_error: bool,
}

#[async_trait]
impl MessageHandler for Mux {
    async fn handle(&self, msg: &Message) -> Result<(), BlockError> {
        let requests = self
            .targets
            .iter()
            .map(|target| SendRequest {
                ctx: msg.context().clone(),
                send_to: target.clone(),
                value: msg.value().clone(),
            })
            .collect();
        let (result, _) = send_all(self.terminate_on_error, requests).await;
        msg.reply(result);
        Ok(())
    }
}
