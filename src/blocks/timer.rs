// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::comm::Message;
use crate::engine::timer::{Backoff, TimeoutSource, TimerEvent, TimerLoop, TimerSink};
use crate::errors::{BlockError, ConfigError};
use crate::expr::{timeout_from_value, DefaultVariables, Expression, Variables};
use crate::runtime::{BlockEnv, ChannelPointer};

use super::{check_expression, configured, duration_setting, parse_settings, Block, BlockRef, SingleChannel};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TimerSettings {
    initial_timeout: Option<String>,
    timeout: Expression,
    repeat_after: Option<String>,
    backoff_factor: Option<f64>,
    on_reset: Option<BlockRef>,
    on_timeout: Option<BlockRef>,
    on_repeat: Option<BlockRef>,
}

#[derive(Debug)]
struct TimerConfig {
    initial_timeout: Duration,
    backoff: Backoff,
    timeout: Expression,
    on_reset: Option<BlockRef>,
    on_timeout: Option<BlockRef>,
    on_repeat: Option<BlockRef>,
}

/// Watchdog timer. Every inbound message re-arms it with the period its
/// `timeout` expression evaluates to; `reset`, `timeout` and `repeat` events
/// go to their own destinations as `{"event", "timeout"}`.
#[derive(Debug, Default)]
pub struct TimerBlock {
    channel: SingleChannel,
    config: Option<TimerConfig>,
}

impl Block for TimerBlock {
    fn id(&self) -> &str {
        self.channel.id()
    }

    fn set_id(&mut self, id: String) {
        self.channel.set_id(id);
    }

    fn block_type(&self) -> &'static str {
        "timer"
    }

    fn bind(&mut self, env: &mut BlockEnv) -> Option<ChannelPointer> {
        self.channel.bind(env)
    }

    fn configure(&mut self, settings: serde_yaml::Value) -> Result<(), ConfigError> {
        let id = self.channel.id();
        let settings: TimerSettings = parse_settings(id, settings)?;
        check_expression(id, "timeout", &settings.timeout)?;
        self.config = Some(TimerConfig {
            initial_timeout: duration_setting(
                id,
                "initial_timeout",
                settings.initial_timeout.as_deref(),
                Duration::ZERO,
            )?,
            backoff: Backoff::new(
                duration_setting(id, "repeat_after", settings.repeat_after.as_deref(), Duration::ZERO)?,
                settings.backoff_factor,
            ),
            timeout: settings.timeout,
            on_reset: settings.on_reset,
            on_timeout: settings.on_timeout,
            on_repeat: settings.on_repeat,
        });
        Ok(())
    }

    fn references(&self) -> Vec<&BlockRef> {
        self.config
            .iter()
            .flat_map(|config| [&config.on_reset, &config.on_timeout, &config.on_repeat])
            .flatten()
            .collect()
    }

    fn start(mut self: Box<Self>, env: &mut BlockEnv) -> Result<(), ConfigError> {
        let config = configured(self.channel.id(), self.config.take())?;
        let id = self.channel.id().to_string();
        let resolve = |target: &Option<BlockRef>| {
            target
                .as_ref()
                .map(|target| target.sender(&id, env))
                .transpose()
        };
        let outputs = TimerOutputs {
            on_reset: resolve(&config.on_reset)?,
            on_timeout: resolve(&config.on_timeout)?,
            on_repeat: resolve(&config.on_repeat)?,
        };
        let source = ExpressionTimeout {
            expr: config.timeout,
            defaults: env.defaults(),
        };
        let input = self.channel.take_input(env)?;
        let timer = TimerLoop::new(
            id.clone(),
            config.initial_timeout,
            config.backoff,
            source,
            outputs,
            env.metrics_for(&id),
        );
        env.spawn_block(&id, timer.run(input));
        Ok(())
    }
}

struct ExpressionTimeout {
    expr: Expression,
    defaults: Arc<DefaultVariables>,
}

impl TimeoutSource for ExpressionTimeout {
    fn timeout_for(&self, msg: &Message) -> Result<Duration, BlockError> {
        let value = self.expr.evaluate(&Variables::new(msg.value(), &self.defaults))?;
        timeout_from_value(&value)
    }
}

struct TimerOutputs {
    on_reset: Option<mpsc::Sender<Message>>,
    on_timeout: Option<mpsc::Sender<Message>>,
    on_repeat: Option<mpsc::Sender<Message>>,
}

#[async_trait]
impl TimerSink for TimerOutputs {
    async fn notify(&mut self, event: TimerEvent, timeout: Duration, ctx: CancellationToken) {
        let target = match event {
            TimerEvent::Reset => &self.on_reset,
            TimerEvent::Timeout => &self.on_timeout,
            TimerEvent::Repeat => &self.on_repeat,
        };
        if let Some(target) = target {
            let payload = json!({
                "event": event.as_str(),
                "timeout": timeout.as_secs_f64(),
            });
            let _ = target.send(Message::new(ctx, payload)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::testing::TestEnv;
    use crate::comm::is_error_reply;

    const SETTINGS: &str = r#"
initial_timeout: 1s
timeout: "${msg.timeout}"
repeat_after: 2s
backoff_factor: 2
on_reset: resets
on_timeout: alarms
on_repeat: alarms
"#;

    #[tokio::test(start_paused = true)]
    async fn test_initial_timeout_then_backoff() {
        let mut test = TestEnv::new();
        let mut resets = test.downstream("resets");
        let mut alarms = test.downstream("alarms");
        test.start(Box::new(TimerBlock::default()), "watchdog", SETTINGS)
            .unwrap();

        let reset = resets.recv().await.unwrap();
        assert_eq!(reset.value(), &json!({ "event": "reset", "timeout": 1.0 }));

        let timeout = alarms.recv().await.unwrap();
        assert_eq!(timeout.value(), &json!({ "event": "timeout", "timeout": 2.0 }));
        assert!(!timeout.expects_reply());

        let repeat = alarms.recv().await.unwrap();
        assert_eq!(repeat.value(), &json!({ "event": "repeat", "timeout": 4.0 }));
        // The previous notification was superseded.
        assert!(timeout.context().is_cancelled());
        assert_eq!(test.metrics.get("watchdog", "repeat"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_sets_period() {
        let mut test = TestEnv::new();
        let mut resets = test.downstream("resets");
        let mut alarms = test.downstream("alarms");
        let input = test
            .start(Box::new(TimerBlock::default()), "watchdog", SETTINGS)
            .unwrap()
            .unwrap();
        resets.recv().await.unwrap();

        let (msg, rx) = Message::with_reply(CancellationToken::new(), json!({ "timeout": "5s" }));
        input.send(msg).await.unwrap();
        let reset = resets.recv().await.unwrap();
        assert_eq!(reset.value()["timeout"], json!(5.0));
        assert!(rx.await.is_err());

        let started = tokio::time::Instant::now();
        let timeout = alarms.recv().await.unwrap();
        assert_eq!(timeout.value()["event"], json!("timeout"));
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_timeout_value_is_error_replied() {
        let mut test = TestEnv::new();
        let _resets = test.downstream("resets");
        let _alarms = test.downstream("alarms");
        let input = test
            .start(Box::new(TimerBlock::default()), "watchdog", SETTINGS)
            .unwrap()
            .unwrap();

        let (msg, rx) = Message::with_reply(CancellationToken::new(), json!({ "timeout": true }));
        input.send(msg).await.unwrap();
        assert!(is_error_reply(&rx.await.unwrap()));

        let (msg, rx) = Message::with_reply(CancellationToken::new(), json!({}));
        input.send(msg).await.unwrap();
        assert!(is_error_reply(&rx.await.unwrap()));
    }

    #[tokio::test]
    async fn test_configuration_errors() {
        let mut test = TestEnv::new();
        let result = test.start(
            Box::new(TimerBlock::default()),
            "t1",
            "timeout: 1s\nrepeat_after: sometimes",
        );
        assert!(matches!(result, Err(ConfigError::InvalidDuration { field: "repeat_after", .. })));

        let result = test.start(
            Box::new(TimerBlock::default()),
            "t5",
            "timeout: 1s\nrepeat_after: 1000000y",
        );
        assert!(matches!(result, Err(ConfigError::InvalidDuration { field: "repeat_after", .. })));

        let result = test.start(Box::new(TimerBlock::default()), "t2", "timeout: 1s\nbogus: 1");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));

        let result = test.start(Box::new(TimerBlock::default()), "t3", "timeout: 1s\non_timeout: nowhere");
        assert!(matches!(result, Err(ConfigError::UnknownBlockReference { .. })));

        let result = test.start(Box::new(TimerBlock::default()), "t4", "timeout: \"${msg.\"");
        assert!(matches!(result, Err(ConfigError::InvalidSetting { field: "timeout", .. })));
    }
}
