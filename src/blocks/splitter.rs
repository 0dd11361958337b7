// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::comm::{Message, Value};
use crate::engine::fanout::{send_all, SendRequest};
use crate::errors::{BlockError, ConfigError, EvalError};
use crate::expr::{value_kind, DefaultVariables, Expression, Variables};
use crate::runtime::{start_processing, BlockEnv, ChannelPointer, MessageHandler};

use super::{check_expression, configured, parse_settings, Block, BlockRef, SingleChannel};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SplitterSettings {
    expr: Expression,
    send_to: BlockRef,
    #[serde(default)]
    terminate_on_error: bool,
}

/// Evaluates `expr` to a sequence and sends each element to one destination
/// as its own message; replies with the collected results.
#[derive(Debug, Default)]
pub struct SplitterBlock {
    channel: SingleChannel,
    settings: Option<SplitterSettings>,
}

impl Block for SplitterBlock {
    fn id(&self) -> &str {
        self.channel.id()
    }

    fn set_id(&mut self, id: String) {
        self.channel.set_id(id);
    }

    fn block_type(&self) -> &'static str {
        "splitter"
    }

    fn bind(&mut self, env: &mut BlockEnv) -> Option<ChannelPointer> {
        self.channel.bind(env)
    }

    fn configure(&mut self, settings: serde_yaml::Value) -> Result<(), ConfigError> {
        let settings: SplitterSettings = parse_settings(self.channel.id(), settings)?;
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
        let handler = ElementWise {
            expr: settings.expr,
            send_to: settings.send_to.sender(&id, env)?,
            defaults: env.defaults(),
            terminate_on_error: settings.terminate_on_error,
        };
        let input = self.channel.take_input(env)?;
        let metrics = env.metrics_for(&id);
        env.spawn_block(&id, start_processing(id.clone(), input, Arc::new(handler), metrics));
        Ok(())
    }
}

/// Shared by `splitter` and `split`.
pub(super) struct ElementWise {
    pub(super) expr: Expression,
    pub(super) send_to: mpsc::Sender<Message>,
    pub(super) defaults: Arc<DefaultVariables>,
    pub(super) terminate_on_error: bool,
}

impl ElementWise {
    /// Sends each element and returns the aggregate and whether any failed.
    pub(super) async fn split(&self, msg: &Message) -> Result<(Value, bool), BlockError> {
        let items = match self.expr.evaluate(&Variables::new(msg.value(), &self.defaults))? {
            Value::Array(items) => items,
            other => {
                return Err(EvalError::WrongType {
                    expected: "sequence",
                    found: value_kind(&other),
                }
                .into())
            }
        };
        let requests = items
            .into_iter()
            .map(|value| SendRequest {
                ctx: msg.context().clone(),
                send_to: self.send_to.clone(),
                value,
            })
            .collect();
        Ok(send_all(self.terminate_on_error, requests).await)
    }
}

#[async_trait]
impl MessageHandler for ElementWise {
    async fn handle(&self, msg: &Message) -> Result<(), BlockError> {
        let (result, _) = self.split(msg).await?;
        msg.reply(result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::testing::TestEnv;
    use crate::comm::is_error_reply;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_elements_are_sent_one_by_one() {
        let mut test = TestEnv::new();
        let mut workers = test.downstream("workers");
        let input = test
            .start(
                Box::new(SplitterBlock::default()),
                "splitter",
                "expr: \"${msg.hosts}\"\nsend_to: workers",
            )
            .unwrap()
            .unwrap();

        tokio::spawn(async move {
            while let Some(msg) = workers.recv().await {
                let host = msg.value().as_str().unwrap_or_default().to_uppercase();
                msg.reply(json!(host));
            }
        });

        let (msg, rx) = Message::with_reply(
            CancellationToken::new(),
            json!({ "hosts": ["db", "web", "cache"] }),
        );
        input.send(msg).await.unwrap();
        assert_eq!(
            rx.await.unwrap(),
            json!({ "results": ["DB", "WEB", "CACHE"] })
        );
    }

    #[tokio::test]
    async fn test_non_sequence_is_an_error() {
        let mut test = TestEnv::new();
        let _workers = test.downstream("workers");
        let input = test
            .start(
                Box::new(SplitterBlock::default()),
                "splitter",
                "expr: \"${msg.hosts}\"\nsend_to: workers",
            )
            .unwrap()
            .unwrap();

        let (msg, rx) = Message::with_reply(CancellationToken::new(), json!({ "hosts": "db" }));
        input.send(msg).await.unwrap();
        assert!(is_error_reply(&rx.await.unwrap()));
    }
}
