// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::comm::Message;
use crate::errors::{BlockError, ConfigError};
use crate::expr::{DefaultVariables, Expression, Variables};
use crate::observability::messages::block::LogOutput;
use crate::observability::messages::StructuredLog;
use crate::runtime::{start_processing, BlockEnv, ChannelPointer, MessageHandler};

use super::{check_expression, configured, parse_settings, Block, SingleChannel};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogSettings {
    #[serde(default)]
    text: Expression,
}

/// Writes each message (or `text` evaluated against it) to the log as JSON.
#[derive(Debug, Default)]
pub struct LogBlock {
    channel: SingleChannel,
    settings: Option<LogSettings>,
}

impl Block for LogBlock {
    fn id(&self) -> &str {
        self.channel.id()
    }

    fn set_id(&mut self, id: String) {
        self.channel.set_id(id);
    }

    fn block_type(&self) -> &'static str {
        "log"
    }

    fn bind(&mut self, env: &mut BlockEnv) -> Option<ChannelPointer> {
        self.channel.bind(env)
    }

    fn configure(&mut self, settings: serde_yaml::Value) -> Result<(), ConfigError> {
        // A bare `- type: log` has no settings at all.
        let settings: LogSettings = if settings.is_null() {
            LogSettings::default()
        } else {
            parse_settings(self.channel.id(), settings)?
        };
        check_expression(self.channel.id(), "text", &settings.text)?;
        self.settings = Some(settings);
        Ok(())
    }

    fn start(mut self: Box<Self>, env: &mut BlockEnv) -> Result<(), ConfigError> {
        let settings = configured(self.channel.id(), self.settings.take())?;
        let id = self.channel.id().to_string();
        let handler = Log {
            block_id: id.clone(),
            text: settings.text,
            defaults: env.defaults(),
        };
        let input = self.channel.take_input(env)?;
        let metrics = env.metrics_for(&id);
        env.spawn_block(&id, start_processing(id.clone(), input, Arc::new(handler), metrics));
        Ok(())
    }
}

struct Log {
    block_id: String,
    text: Expression,
    defaults: Arc<DefaultVariables>,
}

impl Log {
    fn render(&self, msg: &Message) -> Result<String, BlockError> {
        let line = if self.text.is_empty() {
            serde_json::to_string(msg.value())?
        } else {
            let value = self.text.evaluate(&Variables::new(msg.value(), &self.defaults))?;
            serde_json::to_string(&value)?
        };
        Ok(line)
    }
}

#[async_trait]
impl MessageHandler for Log {
    async fn handle(&self, msg: &Message) -> Result<(), BlockError> {
        let line = self.render(msg)?;
        LogOutput {
            block_id: &self.block_id,
            text: &line,
        }
        .log();
        Ok(())
    }
}
