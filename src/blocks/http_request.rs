// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! HTTP egress: one outgoing request per message.
//!
//! The reply is `{"body": <decoded response>}`. Transport failures, non-2xx
//! statuses and undecodable bodies are per-message errors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::json;

use crate::comm::{Message, Value};
use crate::errors::{BlockError, ConfigError};
use crate::expr::{DefaultVariables, Expression, Variables};
use crate::runtime::{start_processing, BlockEnv, ChannelPointer, MessageHandler};

use super::codec::{decode_body, ContentType};
use super::{
    check_expression, configured, duration_setting, parse_settings, Block, SingleChannel,
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HttpRequestSettings {
    method: String,
    url: Expression,
    #[serde(default)]
    content_type: ContentType,
    #[serde(default)]
    headers: HashMap<String, Expression>,
    #[serde(default)]
    body: Expression,
    timeout: Option<String>,
    #[serde(default)]
    discard_response: bool,
}

#[derive(Debug)]
struct HttpRequestConfig {
    method: Method,
    url: Expression,
    content_type: ContentType,
    headers: Vec<(String, Expression)>,
    body: Expression,
    timeout: Duration,
    discard_response: bool,
}

#[derive(Debug, Default)]
pub struct HttpRequestBlock {
    channel: SingleChannel,
    config: Option<HttpRequestConfig>,
}

impl Block for HttpRequestBlock {
    fn id(&self) -> &str {
        self.channel.id()
    }

    fn set_id(&mut self, id: String) {
        self.channel.set_id(id);
    }

    fn block_type(&self) -> &'static str {
        "http_request"
    }

    fn bind(&mut self, env: &mut BlockEnv) -> Option<ChannelPointer> {
        self.channel.bind(env)
    }

    fn configure(&mut self, settings: serde_yaml::Value) -> Result<(), ConfigError> {
        let id = self.channel.id();
        let settings: HttpRequestSettings = parse_settings(id, settings)?;

        let method = Method::from_bytes(settings.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| ConfigError::InvalidSetting {
                block_id: id.to_string(),
                field: "method",
                reason: format!("'{}': {}", settings.method, e),
            })?;
        check_expression(id, "url", &settings.url)?;
        check_expression(id, "body", &settings.body)?;
        for expr in settings.headers.values() {
            check_expression(id, "headers", expr)?;
        }
        let timeout = duration_setting(
            id,
            "timeout",
            settings.timeout.as_deref(),
            DEFAULT_REQUEST_TIMEOUT,
        )?;

        let mut headers: Vec<_> = settings.headers.into_iter().collect();
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        self.config = Some(HttpRequestConfig {
            method,
            url: settings.url,
            content_type: settings.content_type,
            headers,
            body: settings.body,
            timeout,
            discard_response: settings.discard_response,
        });
        Ok(())
    }

    fn start(mut self: Box<Self>, env: &mut BlockEnv) -> Result<(), ConfigError> {
        let config = configured(self.channel.id(), self.config.take())?;
        let id = self.channel.id().to_string();
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::InvalidSetting {
                block_id: id.clone(),
                field: "timeout",
                reason: e.to_string(),
            })?;
        let handler = HttpRequest {
            client,
            config,
            defaults: env.defaults(),
        };
        let input = self.channel.take_input(env)?;
        let metrics = env.metrics_for(&id);
        env.spawn_block(&id, start_processing(id.clone(), input, Arc::new(handler), metrics));
        Ok(())
    }
}

struct HttpRequest {
    client: Client,
    config: HttpRequestConfig,
    defaults: Arc<DefaultVariables>,
}

impl HttpRequest {
    fn build(&self, msg: &Message) -> Result<reqwest::RequestBuilder, BlockError> {
        let vars = Variables::new(msg.value(), &self.defaults);
        let url = self.config.url.evaluate_string(&vars)?;

        let mut request = self.client.request(self.config.method.clone(), &url);
        for (name, expr) in &self.config.headers {
            request = request.header(name, expr.evaluate_string(&vars)?);
        }
        if !self.config.body.is_empty() {
            let body = self.config.body.evaluate(&vars)?;
            let bytes = self
                .config
                .content_type
                .encode(&body)
                .map_err(BlockError::Encoding)?;
            request = request
                .header(CONTENT_TYPE, self.config.content_type.mime())
                .body(bytes);
        }
        Ok(request)
    }

    async fn exchange(&self, request: reqwest::RequestBuilder) -> Result<Value, BlockError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BlockError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        if self.config.discard_response {
            return Ok(Value::Null);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        decode_body(content_type.as_deref(), &bytes).map_err(BlockError::Decoding)
    }
}

#[async_trait]
impl MessageHandler for HttpRequest {
    async fn handle(&self, msg: &Message) -> Result<(), BlockError> {
        let request = self.build(msg)?;
        let body = tokio::select! {
            _ = msg.context().cancelled() => return Err(BlockError::Cancelled),
            result = self.exchange(request) => result?,
        };
        msg.reply(json!({ "body": body }));
        Ok(())
    }
}
