// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! HTTP ingress.
//!
//! Each endpoint turns a request into a message with a reply sink and waits
//! for exactly one of three outcomes:
//!
//! * a reply: the error marker maps to 400, anything else to 200 with the
//!   value as JSON; a close without value is an empty 200
//! * the endpoint timeout: 408
//! * the client going away: nothing to answer, only logged
//!
//! Whatever the outcome, the request's cancellation token is cancelled once
//! the request is over, which tells downstream blocks to stop working on it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::RawQuery;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::comm::{is_error_reply, Message};
use crate::errors::ConfigError;
use crate::observability::messages::http::{
    BodyRejected, ClientDisconnected, RequestTimedOut, ServerFailed, ServerListening,
};
use crate::observability::messages::StructuredLog;
use crate::runtime::{BlockEnv, ChannelPointer};

use super::codec::{decode_body, decode_form};
use super::{configured, duration_setting, parse_settings, Block, BlockRef};

const DEFAULT_ENDPOINT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HttpServerSettings {
    address: String,
    endpoints: Vec<EndpointSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EndpointSettings {
    method: String,
    path: String,
    send_to: BlockRef,
    timeout: Option<String>,
}

#[derive(Debug)]
struct Endpoint {
    method: Method,
    path: String,
    send_to: BlockRef,
    timeout: Duration,
}

#[derive(Debug)]
struct HttpServerConfig {
    address: String,
    endpoints: Vec<Endpoint>,
}

/// One routed endpoint, wired to its destination.
#[derive(Debug, Clone)]
pub struct Route {
    method: Method,
    filter: MethodFilter,
    path: String,
    send_to: mpsc::Sender<Message>,
    timeout: Duration,
}

impl Route {
    /// Fails for methods the router cannot dispatch on.
    pub fn new(
        method: Method,
        path: impl Into<String>,
        send_to: mpsc::Sender<Message>,
        timeout: Duration,
    ) -> Result<Self, String> {
        let filter = MethodFilter::try_from(method.clone()).map_err(|e| e.to_string())?;
        Ok(Self {
            method,
            filter,
            path: path.into(),
            send_to,
            timeout,
        })
    }
}

/// Listens on `address` and serves the configured endpoints. Has no input
/// channel.
#[derive(Debug, Default)]
pub struct HttpServerBlock {
    id: String,
    config: Option<HttpServerConfig>,
}

impl Block for HttpServerBlock {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn block_type(&self) -> &'static str {
        "http_server"
    }

    fn bind(&mut self, _env: &mut BlockEnv) -> Option<ChannelPointer> {
        None
    }

    fn configure(&mut self, settings: serde_yaml::Value) -> Result<(), ConfigError> {
        let settings: HttpServerSettings = parse_settings(&self.id, settings)?;
        let invalid = |field: &'static str, reason: String| ConfigError::InvalidSetting {
            block_id: self.id.clone(),
            field,
            reason,
        };

        let mut endpoints = Vec::with_capacity(settings.endpoints.len());
        for endpoint in settings.endpoints {
            let method = Method::from_bytes(endpoint.method.to_ascii_uppercase().as_bytes())
                .map_err(|e| invalid("method", e.to_string()))?;
            MethodFilter::try_from(method.clone())
                .map_err(|_| invalid("method", format!("unsupported method '{}'", method)))?;
            if !endpoint.path.starts_with('/') {
                return Err(invalid(
                    "path",
                    format!("'{}' must start with '/'", endpoint.path),
                ));
            }
            let duplicate = endpoints
                .iter()
                .any(|other: &Endpoint| other.method == method && other.path == endpoint.path);
            if duplicate {
                return Err(invalid(
                    "endpoints",
                    format!("{} {} is declared twice", method, endpoint.path),
                ));
            }
            endpoints.push(Endpoint {
                timeout: duration_setting(
                    &self.id,
                    "timeout",
                    endpoint.timeout.as_deref(),
                    DEFAULT_ENDPOINT_TIMEOUT,
                )?,
                method,
                path: endpoint.path,
                send_to: endpoint.send_to,
            });
        }

        self.config = Some(HttpServerConfig {
            address: settings.address,
            endpoints,
        });
        Ok(())
    }

    fn references(&self) -> Vec<&BlockRef> {
        self.config
            .iter()
            .flat_map(|config| config.endpoints.iter().map(|endpoint| &endpoint.send_to))
            .collect()
    }

    fn start(mut self: Box<Self>, env: &mut BlockEnv) -> Result<(), ConfigError> {
        let config = configured(&self.id, self.config.take())?;
        let id = self.id.clone();
        let invalid = |field: &'static str, reason: String| ConfigError::InvalidSetting {
            block_id: id.clone(),
            field,
            reason,
        };

        let mut routes = Vec::with_capacity(config.endpoints.len());
        for endpoint in config.endpoints {
            let send_to = endpoint.send_to.sender(&id, env)?;
            routes.push(
                Route::new(endpoint.method, endpoint.path, send_to, endpoint.timeout)
                    .map_err(|reason| invalid("method", reason))?,
            );
        }
        let endpoint_count = routes.len();
        let router = build_router(&id, routes);

        let listener = std::net::TcpListener::bind(&config.address)
            .and_then(|listener| {
                listener.set_nonblocking(true)?;
                tokio::net::TcpListener::from_std(listener)
            })
            .map_err(|e| invalid("address", format!("cannot listen on '{}': {}", config.address, e)))?;
        let address = listener
            .local_addr()
            .map(|address| address.to_string())
            .unwrap_or(config.address);
        ServerListening {
            block_id: &id,
            address: &address,
            endpoint_count,
        }
        .log();

        env.spawn_block(&id, run_server(id.clone(), listener, router));
        Ok(())
    }
}

async fn run_server(block_id: String, listener: tokio::net::TcpListener, router: Router) {
    if let Err(error) = axum::serve(listener, router).await {
        ServerFailed {
            block_id: &block_id,
            error: &error,
        }
        .log();
    }
}

struct RouteState {
    block_id: Arc<str>,
    route: String,
    method: Method,
    send_to: mpsc::Sender<Message>,
    timeout: Duration,
}

/// Router serving `routes`, one handler per method and path.
pub fn build_router(block_id: &str, routes: Vec<Route>) -> Router {
    let block_id: Arc<str> = Arc::from(block_id);
    let mut by_path: BTreeMap<String, Vec<Route>> = BTreeMap::new();
    for route in routes {
        by_path.entry(route.path.clone()).or_default().push(route);
    }

    by_path
        .into_iter()
        .fold(Router::new(), |router, (path, routes)| {
            let methods = routes.into_iter().fold(MethodRouter::new(), |methods, route| {
                let state = Arc::new(RouteState {
                    block_id: block_id.clone(),
                    route: format!("{} {}", route.method, route.path),
                    method: route.method,
                    send_to: route.send_to,
                    timeout: route.timeout,
                });
                methods.on(
                    route.filter,
                    move |RawQuery(query): RawQuery, headers: HeaderMap, body: Bytes| {
                        let state = state.clone();
                        async move { handle_request(state, query, headers, body).await }
                    },
                )
            });
            router.route(&path, methods)
        })
}

/// Cancels the request's token when the request ends, however it ends.
struct InFlight {
    ctx: CancellationToken,
    state: Arc<RouteState>,
    completed: bool,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.completed {
            ClientDisconnected {
                block_id: &self.state.block_id,
                route: &self.state.route,
            }
            .log();
        }
        self.ctx.cancel();
    }
}

async fn handle_request(
    state: Arc<RouteState>,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ctx = CancellationToken::new();

    let (msg, reply) = if state.method == Method::GET || state.method == Method::DELETE {
        let query = query.unwrap_or_default();
        Message::lazy_with_reply(ctx.clone(), move || decode_form(query.as_bytes()))
    } else {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());
        match decode_body(content_type, &body) {
            Ok(value) => Message::with_reply(ctx.clone(), value),
            Err(reason) => {
                BodyRejected {
                    block_id: &state.block_id,
                    route: &state.route,
                    reason: &reason,
                }
                .log();
                return StatusCode::BAD_REQUEST.into_response();
            }
        }
    };

    let mut in_flight = InFlight {
        ctx,
        state: state.clone(),
        completed: false,
    };

    let exchange = async {
        state.send_to.send(msg).await.ok()?;
        reply.await.ok()
    };

    let response = match tokio::time::timeout(state.timeout, exchange).await {
        Err(_) => {
            RequestTimedOut {
                block_id: &state.block_id,
                route: &state.route,
                timeout: state.timeout,
            }
            .log();
            StatusCode::REQUEST_TIMEOUT.into_response()
        }
        Ok(Some(value)) if is_error_reply(&value) => {
            (StatusCode::BAD_REQUEST, Json(value)).into_response()
        }
        Ok(Some(value)) => Json(value).into_response(),
        Ok(None) => StatusCode::OK.into_response(),
    };
    in_flight.completed = true;
    response
}
