// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Deserialize;
use tokio::sync::mpsc;

use crate::comm::{Message, Value};
use crate::errors::ConfigError;
use crate::observability::messages::block::{DuplicateSuppressed, InputChannelClosed};
use crate::observability::messages::StructuredLog;
use crate::observability::metrics::BlockMetrics;
use crate::runtime::{BlockEnv, ChannelPointer};

use super::{configured, parse_settings, Block, BlockRef, SingleChannel};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeduplicateSettings {
    send_to: BlockRef,
}

/// Drops a message whose value equals the previous one; everything else is
/// forwarded as is, reply sink included.
#[derive(Debug, Default)]
pub struct DeduplicateBlock {
    channel: SingleChannel,
    settings: Option<DeduplicateSettings>,
}

impl Block for DeduplicateBlock {
    fn id(&self) -> &str {
        self.channel.id()
    }

    fn set_id(&mut self, id: String) {
        self.channel.set_id(id);
    }

    fn block_type(&self) -> &'static str {
        "deduplicate"
    }

    fn bind(&mut self, env: &mut BlockEnv) -> Option<ChannelPointer> {
        self.channel.bind(env)
    }

    fn configure(&mut self, settings: serde_yaml::Value) -> Result<(), ConfigError> {
        self.settings = Some(parse_settings(self.channel.id(), settings)?);
        Ok(())
    }

    fn references(&self) -> Vec<&BlockRef> {
        self.settings.iter().map(|settings| &settings.send_to).collect()
    }

    fn start(mut self: Box<Self>, env: &mut BlockEnv) -> Result<(), ConfigError> {
        let settings = configured(self.channel.id(), self.settings.take())?;
        let id = self.channel.id().to_string();
        let send_to = settings.send_to.sender(&id, env)?;
        let input = self.channel.take_input(env)?;
        let metrics = env.metrics_for(&id);
        env.spawn_block(&id, deduplicate(id.clone(), input, send_to, metrics));
        Ok(())
    }
}

/// Single task owning the last seen value, so ordering is preserved.
async fn deduplicate(
    block_id: String,
    mut input: mpsc::Receiver<Message>,
    send_to: mpsc::Sender<Message>,
    metrics: BlockMetrics,
) {
    let mut previous: Option<Value> = None;
    while let Some(msg) = input.recv().await {
        let current = msg.value().clone();
        if previous.as_ref() == Some(&current) {
            metrics.increment("suppressed");
            DuplicateSuppressed {
                block_id: &block_id,
            }
            .log();
            msg.close();
            continue;
        }
        metrics.increment("forwarded");
        previous = Some(current);
        if send_to.send(msg).await.is_err() {
            break;
        }
    }
    InputChannelClosed {
        block_id: &block_id,
    }
    .log();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::testing::TestEnv;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    async fn feed(values: &[Value]) -> (Vec<Value>, Vec<bool>) {
        let mut test = TestEnv::new();
        let mut sink = test.downstream("sink");
        let input = test
            .start(Box::new(DeduplicateBlock::default()), "dedup", "send_to: sink")
            .unwrap()
            .unwrap();

        let collector = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(msg) = sink.recv().await {
                seen.push(msg.value().clone());
                msg.reply(json!("delivered"));
            }
            seen
        });

        let mut delivered = Vec::new();
        for value in values {
            let (msg, rx) = Message::with_reply(CancellationToken::new(), value.clone());
            input.send(msg).await.unwrap();
            delivered.push(rx.await.is_ok());
        }
        drop(input);
        drop(test);
        (collector.await.unwrap(), delivered)
    }

    #[tokio::test]
    async fn test_repeated_value_is_forwarded_once() {
        let (seen, delivered) = feed(&[json!({ "v": 1 }), json!({ "v": 1 })]).await;
        assert_eq!(seen, vec![json!({ "v": 1 })]);
        // The duplicate is closed, not forwarded.
        assert_eq!(delivered, vec![true, false]);
    }

    #[tokio::test]
    async fn test_only_consecutive_repeats_are_dropped() {
        let (seen, _) = feed(&[json!("v"), json!("w"), json!("v")]).await;
        assert_eq!(seen, vec![json!("v"), json!("w"), json!("v")]);
    }
}
