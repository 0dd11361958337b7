// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Generic per-message processing loop.
//!
//! Every inbound message is handled on its own task, so a slow handler never
//! holds up the next message. The harness owns finalization: whatever the
//! handler does, the message ends up replied to or closed exactly once.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinError;

use crate::comm::Message;
use crate::errors::BlockError;
use crate::observability::messages::block::{HandlerFailed, HandlerPanicked, InputChannelClosed};
use crate::observability::messages::StructuredLog;
use crate::observability::metrics::BlockMetrics;

pub const HANDLED: &str = "handled";
pub const FAILED: &str = "failed";
pub const PANICKED: &str = "panicked";

/// Per-message logic of a block.
///
/// Handlers may `reply` themselves. Returning `Ok(())` lets the harness close
/// the message if nobody did; returning an error makes it reply with the
/// error sentinel.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, msg: &Message) -> Result<(), BlockError>;
}

/// Receives from `input` until the channel closes, handling each message on
/// a separate task.
///
/// Channels are never closed while the graph runs, so returning from here is
/// fatal for the process; the supervisor takes it from there.
pub async fn start_processing<H: MessageHandler>(
    block_id: String,
    mut input: mpsc::Receiver<Message>,
    handler: Arc<H>,
    metrics: BlockMetrics,
) {
    let block_id: Arc<str> = Arc::from(block_id);
    while let Some(msg) = input.recv().await {
        let handler = handler.clone();
        let metrics = metrics.clone();
        let block_id = block_id.clone();
        tokio::spawn(async move { process(&block_id, handler, msg, &metrics).await });
    }
    InputChannelClosed {
        block_id: &block_id,
    }
    .log();
}

async fn process<H: MessageHandler>(
    block_id: &str,
    handler: Arc<H>,
    msg: Message,
    metrics: &BlockMetrics,
) {
    let worker = {
        let msg = msg.clone();
        tokio::spawn(async move { handler.handle(&msg).await })
    };

    match worker.await {
        Ok(Ok(())) => {
            metrics.increment(HANDLED);
            msg.close();
        }
        Ok(Err(error)) => {
            metrics.increment(FAILED);
            HandlerFailed {
                block_id,
                error: &error,
            }
            .log();
            msg.reply_with_error();
        }
        Err(join_error) => {
            metrics.increment(PANICKED);
            let reason = panic_reason(join_error);
            HandlerPanicked {
                block_id,
                reason: &reason,
            }
            .log();
            msg.reply_with_error();
        }
    }
}

fn panic_reason(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload: Box<dyn Any + Send> = error.into_panic();
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
