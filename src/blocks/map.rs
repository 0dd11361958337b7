// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::comm::Message;
use crate::errors::{BlockError, ConfigError};
use crate::expr::{DefaultVariables, Expression, Variables};
use crate::runtime::{start_processing, BlockEnv, ChannelPointer, MessageHandler};

use super::{check_expression, configured, parse_settings, Block, BlockRef, SingleChannel};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MapSettings {
    expr: Expression,
    send_to: BlockRef,
}

/// Rewrites each message with `expr` and forwards it, relaying the reply.
#[derive(Debug, Default)]
pub struct MapBlock {
    channel: SingleChannel,
    settings: Option<MapSettings>,
}

impl Block for MapBlock {
    fn id(&self) -> &str {
        self.channel.id()
    }

    fn set_id(&mut self, id: String) {
        self.channel.set_id(id);
    }

    fn block_type(&self) -> &'static str {
        "map"
    }

    fn bind(&mut self, env: &mut BlockEnv) -> Option<ChannelPointer> {
        self.channel.bind(env)
    }

    fn configure(&mut self, settings: serde_yaml::Value) -> Result<(), ConfigError> {
        let settings: MapSettings = parse_settings(self.channel.id(), settings)?;
        check_expression(self.channel.id(), "expr", &settings.expr)?;
        self.settings = Some(settings);
        Ok(())
    }

    fn references(&self) -> Vec<&BlockRef> {
        self.settings.iter().map(|settings| &settings.send_to).collect()
    }

    fn start(mut self: Box<Self>, env: &mut BlockEnv) -> Result<(), ConfigError> {
        let settings = configured(self.channel.id(), self.settings.take())?;
        let id = self.channel.id().to_string();
        let handler = Map {
            block_id: id.clone(),
            expr: settings.expr,
            send_to: settings.send_to.sender(&id, env)?,
            defaults: env.defaults(),
        };
        let input = self.channel.take_input(env)?;
        let metrics = env.metrics_for(&id);
        env.spawn_block(&id, start_processing(id.clone(), input, Arc::new(handler), metrics));
        Ok(())
    }
}

struct Map {
    block_id: String,
    expr: Expression,
    send_to: mpsc::Sender<Message>,
    defaults: Arc<DefaultVariables>,
}

#[async_trait]
impl MessageHandler for Map {
    async fn handle(&self, msg: &Message) -> Result<(), BlockError> {
        let value = self.expr.evaluate(&Variables::new(msg.value(), &self.defaults))?;
        let ctx = msg.context().clone();
        let (forward, reply) = Message::with_reply(ctx.clone(), value);
        self.send_to
            .send(forward)
            .await
            .map_err(|_| BlockError::Downstream(self.block_id.clone()))?;

        tokio::select! {
            _ = ctx.cancelled() => msg.close(),
            reply = reply => match reply {
                Ok(value) => msg.reply(value),
                Err(_) => msg.close(),
            },
        }
        Ok(())
    }
}
