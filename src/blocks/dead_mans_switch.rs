// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::comm::Message;
use crate::engine::timer::{Backoff, TimerEvent, TimerLoop, TimerSink};
use crate::errors::ConfigError;
use crate::runtime::{BlockEnv, ChannelPointer};

use super::{configured, duration_setting, parse_settings, Block, BlockRef, SingleChannel};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeadMansSwitchSettings {
    timeout: String,
    repeat_after: Option<String>,
    backoff_factor: Option<f64>,
    send_to: Vec<BlockRef>,
}

#[derive(Debug)]
struct DeadMansSwitchConfig {
    timeout: Duration,
    backoff: Backoff,
    send_to: Vec<BlockRef>,
}

/// Fires unless it keeps hearing from upstream.
///
/// Armed from the start with a fixed period; any inbound message re-arms it.
/// Each `timeout` or `repeat` firing is sent as `{"event"}` to every
/// destination.
#[derive(Debug, Default)]
pub struct DeadMansSwitchBlock {
    channel: SingleChannel,
    config: Option<DeadMansSwitchConfig>,
}

impl Block for DeadMansSwitchBlock {
    fn id(&self) -> &str {
        self.channel.id()
    }

    fn set_id(&mut self, id: String) {
        self.channel.set_id(id);
    }

    fn block_type(&self) -> &'static str {
        "dead_mans_switch"
    }

    fn bind(&mut self, env: &mut BlockEnv) -> Option<ChannelPointer> {
        self.channel.bind(env)
    }

    fn configure(&mut self, settings: serde_yaml::Value) -> Result<(), ConfigError> {
        let id = self.channel.id();
        let settings: DeadMansSwitchSettings = parse_settings(id, settings)?;
        let timeout = duration_setting(id, "timeout", Some(&settings.timeout), Duration::ZERO)?;
        if timeout.is_zero() {
            return Err(ConfigError::InvalidDuration {
                block_id: id.to_string(),
                field: "timeout",
                value: settings.timeout,
                reason: "must be greater than zero".to_string(),
            });
        }
        let repeat_after =
            duration_setting(id, "repeat_after", settings.repeat_after.as_deref(), Duration::ZERO)?;
        self.config = Some(DeadMansSwitchConfig {
            timeout,
            backoff: Backoff::new(repeat_after, settings.backoff_factor),
            send_to: settings.send_to,
        });
        Ok(())
    }

    fn references(&self) -> Vec<&BlockRef> {
        self.config
            .iter()
            .flat_map(|config| config.send_to.iter())
            .collect()
    }

    fn start(mut self: Box<Self>, env: &mut BlockEnv) -> Result<(), ConfigError> {
        let config = configured(self.channel.id(), self.config.take())?;
        let id = self.channel.id().to_string();
        let targets = config
            .send_to
            .iter()
            .map(|target| target.sender(&id, env))
            .collect::<Result<Vec<_>, _>>()?;
        let input = self.channel.take_input(env)?;
        let switch = TimerLoop::new(
            id.clone(),
            config.timeout,
            config.backoff,
            config.timeout,
            Broadcast { targets },
            env.metrics_for(&id),
        );
        env.spawn_block(&id, switch.run(input));
        Ok(())
    }
}

/// Sends each firing to every target, under one shared token.
struct Broadcast {
    targets: Vec<mpsc::Sender<Message>>,
}

#[async_trait]
impl TimerSink for Broadcast {
    async fn notify(&mut self, event: TimerEvent, _timeout: Duration, ctx: CancellationToken) {
        if event == TimerEvent::Reset {
            return;
        }
        for target in &self.targets {
            let msg = Message::new(ctx.clone(), json!({ "event": event.as_str() }));
            let _ = target.send(msg).await;
        }
    }
}
