// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::value::{error_reply, Value};

/// Receiving half of a message's one-shot reply sink.
///
/// Resolves to `Ok(value)` when the message was replied to and to `Err(_)`
/// when it was closed (or dropped) without a value.
pub type ReplyReceiver = oneshot::Receiver<Value>;

type ValueFactory = Box<dyn FnOnce() -> Value + Send>;

/// The unit of communication between blocks.
///
/// A `Message` is a cheap handle: clones share the same payload, reply sink
/// and `answered` flag, so the handler, the harness and any racing
/// cancellation path can all try to finalize it. Only the first `reply` or
/// `close` has an effect.
///
/// # Example
/// ```
/// use deadmanswitch::comm::Message;
/// use tokio_util::sync::CancellationToken;
///
/// let (msg, mut rx) = Message::with_reply(CancellationToken::new(), serde_json::json!(1));
/// msg.reply(serde_json::json!(2));
/// msg.close(); // no-op, already answered
/// assert_eq!(rx.try_recv().unwrap(), serde_json::json!(2));
/// ```
#[derive(Clone)]
pub struct Message {
    ctx: CancellationToken,
    envelope: Arc<Envelope>,
}

struct Envelope {
    value: OnceLock<Value>,
    factory: Mutex<Option<ValueFactory>>,
    expects_reply: bool,
    reply_to: Mutex<Option<oneshot::Sender<Value>>>,
    answered: AtomicBool,
}

impl Envelope {
    fn new(
        value: Option<Value>,
        factory: Option<ValueFactory>,
        reply_to: Option<oneshot::Sender<Value>>,
    ) -> Self {
        let cell = OnceLock::new();
        if let Some(value) = value {
            let _ = cell.set(value);
        }
        Self {
            value: cell,
            factory: Mutex::new(factory),
            expects_reply: reply_to.is_some(),
            reply_to: Mutex::new(reply_to),
            answered: AtomicBool::new(false),
        }
    }
}

impl Message {
    /// Fire-and-forget message carrying an eager value.
    pub fn new(ctx: CancellationToken, value: Value) -> Self {
        Self::build(ctx, Some(value), None, None)
    }

    /// Fire-and-forget message whose value is computed on first access.
    pub fn lazy<F>(ctx: CancellationToken, factory: F) -> Self
    where
        F: FnOnce() -> Value + Send + 'static,
    {
        Self::build(ctx, None, Some(Box::new(factory)), None)
    }

    /// Message with a dedicated one-shot reply sink.
    pub fn with_reply(ctx: CancellationToken, value: Value) -> (Self, ReplyReceiver) {
        let (tx, rx) = oneshot::channel();
        (Self::build(ctx, Some(value), None, Some(tx)), rx)
    }

    /// Lazily valued message with a dedicated one-shot reply sink.
    pub fn lazy_with_reply<F>(ctx: CancellationToken, factory: F) -> (Self, ReplyReceiver)
    where
        F: FnOnce() -> Value + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        (Self::build(ctx, None, Some(Box::new(factory)), Some(tx)), rx)
    }

    fn build(
        ctx: CancellationToken,
        value: Option<Value>,
        factory: Option<ValueFactory>,
        reply_to: Option<oneshot::Sender<Value>>,
    ) -> Self {
        Self {
            ctx,
            envelope: Arc::new(Envelope::new(value, factory, reply_to)),
        }
    }

    /// Cancellation token inherited from the message's origin.
    pub fn context(&self) -> &CancellationToken {
        &self.ctx
    }

    /// The payload; a lazy factory runs at most once per message.
    pub fn value(&self) -> &Value {
        self.envelope.value.get_or_init(|| {
            let factory = self
                .envelope
                .factory
                .lock()
                .ok()
                .and_then(|mut slot| slot.take());
            factory.map(|f| f()).unwrap_or(Value::Null)
        })
    }

    /// Whether a caller is waiting on this message.
    pub fn expects_reply(&self) -> bool {
        self.envelope.expects_reply
    }

    /// Whether `reply` or `close` already finalized this message.
    pub fn is_answered(&self) -> bool {
        self.envelope.answered.load(Ordering::Acquire)
    }

    /// Sends `value` to the reply sink and closes it. No-op without a sink or
    /// once the message has been finalized.
    pub fn reply(&self, value: Value) {
        if let Some(sink) = self.finalize() {
            // The waiter may have gone away; that is not our concern.
            let _ = sink.send(value);
        }
    }

    /// Replies with the error sentinel.
    pub fn reply_with_error(&self) {
        self.reply(error_reply());
    }

    /// Closes the reply sink without a value: "processed, nothing to say".
    pub fn close(&self) {
        drop(self.finalize());
    }

    /// Single atomic test-and-set; only the winner gets the sink.
    fn finalize(&self) -> Option<oneshot::Sender<Value>> {
        if !self.envelope.expects_reply {
            return None;
        }
        self.envelope
            .answered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.envelope
            .reply_to
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("value", &self.envelope.value.get())
            .field("expects_reply", &self.envelope.expects_reply)
            .field("answered", &self.is_answered())
            .field("cancelled", &self.ctx.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::is_error_reply;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_reply_delivers_value() {
        let (msg, rx) = Message::with_reply(CancellationToken::new(), json!("ping"));
        msg.reply(json!("pong"));
        assert_eq!(rx.await.unwrap(), json!("pong"));
        assert!(msg.is_answered());
    }

    #[tokio::test]
    async fn test_close_signals_without_value() {
        let (msg, rx) = Message::with_reply(CancellationToken::new(), json!(1));
        msg.close();
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_first_finalizer_wins() {
        let (msg, rx) = Message::with_reply(CancellationToken::new(), json!(1));
        msg.close();
        msg.reply(json!(2));
        msg.reply_with_error();
        assert!(rx.await.is_err());

        let (msg, rx) = Message::with_reply(CancellationToken::new(), json!(1));
        msg.reply_with_error();
        msg.reply(json!(2));
        msg.close();
        assert!(is_error_reply(&rx.await.unwrap()));
    }

    #[tokio::test]
    async fn test_concurrent_finalizers_reply_at_most_once() {
        for _ in 0..50 {
            let (msg, mut rx) = Message::with_reply(CancellationToken::new(), json!(null));
            let mut tasks = Vec::new();
            for i in 0..16 {
                let msg = msg.clone();
                tasks.push(tokio::spawn(async move {
                    if i % 2 == 0 {
                        msg.reply(json!(i));
                    } else {
                        msg.close();
                    }
                }));
            }
            for task in tasks {
                task.await.unwrap();
            }

            // At most one value, then the sink is closed.
            match rx.try_recv() {
                Ok(value) => assert!(value.as_i64().unwrap() % 2 == 0),
                Err(oneshot::error::TryRecvError::Closed) => {}
                Err(oneshot::error::TryRecvError::Empty) => panic!("sink left open"),
            }
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_fire_and_forget_ignores_finalizers() {
        let msg = Message::new(CancellationToken::new(), json!(1));
        msg.reply(json!(2));
        msg.close();
        assert!(!msg.expects_reply());
        assert!(!msg.is_answered());
    }

    #[test]
    fn test_lazy_value_is_computed_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let msg = Message::lazy(CancellationToken::new(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            json!({ "computed": true })
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        for _ in 0..5 {
            assert_eq!(msg.value(), &json!({ "computed": true }));
        }
        let clone = msg.clone();
        assert_eq!(clone.value(), &json!({ "computed": true }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
