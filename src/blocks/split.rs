// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::comm::Message;
use crate::errors::{BlockError, ConfigError};
use crate::expr::Expression;
use crate::runtime::{start_processing, BlockEnv, ChannelPointer, MessageHandler};

use super::splitter::ElementWise;
use super::{check_expression, configured, parse_settings, Block, BlockRef, SingleChannel};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SplitSettings {
    expr: Expression,
    send_to: BlockRef,
}

/// Like `splitter`, but all-or-nothing: collection stops at the first
/// failed element and the failure is reported upstream.
#[derive(Debug, Default)]
pub struct SplitBlock {
    channel: SingleChannel,
    settings: Option<SplitSettings>,
}

impl Block for SplitBlock {
    fn id(&self) -> &str {
        self.channel.id()
    }

    fn set_id(&mut self, id: String) {
        self.channel.set_id(id);
    }

    fn block_type(&self) -> &'static str {
        "split"
    }

    fn bind(&mut self, env: &mut BlockEnv) -> Option<ChannelPointer> {
        self.channel.bind(env)
    }

    fn configure(&mut self, settings: serde_yaml::Value) -> Result<(), ConfigError> {
        let settings: SplitSettings = parse_settings(self.channel.id(), settings)?;
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
        let handler = Split {
            elements: ElementWise {
                expr: settings.expr,
                send_to: settings.send_to.sender(&id, env)?,
                defaults: env.defaults(),
                terminate_on_error: true,
            },
        };
        let input = self.channel.take_input(env)?;
        let metrics = env.metrics_for(&id);
        env.spawn_block(&id, start_processing(id.clone(), input, Arc::new(handler), metrics));
        Ok(())
    }
}

struct Split {
    elements: ElementWise,
}

#[async_trait]
impl MessageHandler for Split {
    async fn handle(&self, msg: &Message) -> Result<(), BlockError> {
        // The aggregate carries the error marker when an element failed.
        let (result, _) = self.elements.split(msg).await?;
        msg.reply(result);
        Ok(())
    }
}
