// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Concurrent fan-out with index-faithful fan-in.
//!
//! [`send_all`] sends one message per request, waits for the replies in
//! whatever order they arrive and puts each back at its request's index.
//! Used by `mux`, `splitter` and `split`.

use serde_json::Map;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::comm::{is_error_reply, Message, Value};

/// One message to send.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub ctx: CancellationToken,
    pub send_to: mpsc::Sender<Message>,
    pub value: Value,
}

#[derive(Debug)]
struct Outcome {
    index: usize,
    reply: Option<Value>,
}

/// Sends every request and collects the replies.
///
/// Returns the aggregate `{"results": [...]}` (plus `"err": null` when any
/// reply was an error) and whether an error was seen. A request closed
/// without a value leaves `null` at its index. With `terminate_on_error`
/// collection stops at the first error and the remaining replies are
/// abandoned.
pub async fn send_all(terminate_on_error: bool, requests: Vec<SendRequest>) -> (Value, bool) {
    let count = requests.len();
    let (collect_tx, mut collect_rx) = mpsc::channel(count.max(1));

    for (index, request) in requests.into_iter().enumerate() {
        let (msg, reply) = Message::with_reply(request.ctx, request.value);
        let collect_tx = collect_tx.clone();
        tokio::spawn(async move {
            let outcome = Outcome {
                index,
                reply: reply.await.ok(),
            };
            // Nobody listens any more after an early termination.
            let _ = collect_tx.send(outcome).await;
        });
        // A closed destination drops the message, which reads as "no reply".
        let _ = request.send_to.send(msg).await;
    }
    drop(collect_tx);

    let mut results = vec![Value::Null; count];
    let mut has_errors = false;
    for _ in 0..count {
        let Some(outcome) = collect_rx.recv().await else {
            break;
        };
        let Some(value) = outcome.reply else {
            continue;
        };
        let failed = is_error_reply(&value);
        results[outcome.index] = value;
        if failed {
            has_errors = true;
            if terminate_on_error {
                break;
            }
        }
    }

    (aggregate(results, has_errors), has_errors)
}

fn aggregate(results: Vec<Value>, has_errors: bool) -> Value {
    let mut out = Map::new();
    out.insert("results".to_string(), Value::Array(results));
    if has_errors {
        out.insert("err".to_string(), Value::Null);
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::error_reply;
    use serde_json::json;
    use std::time::Duration;

    fn requests(sender: &mpsc::Sender<Message>, values: &[Value]) -> Vec<SendRequest> {
        values
            .iter()
            .map(|value| SendRequest {
                ctx: CancellationToken::new(),
                send_to: sender.clone(),
                value: value.clone(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_results_keep_request_order() {
        let (sender, mut receiver) = mpsc::channel::<Message>(1);
        // Hold every message, then answer in reverse order.
        tokio::spawn(async move {
            let mut held = Vec::new();
            for _ in 0..3 {
                held.push(receiver.recv().await.unwrap());
            }
            for msg in held.into_iter().rev() {
                let doubled = msg.value().as_i64().unwrap() * 2;
                msg.reply(json!(doubled));
                tokio::task::yield_now().await;
            }
        });

        let (result, has_errors) =
            send_all(false, requests(&sender, &[json!(1), json!(2), json!(3)])).await;
        assert!(!has_errors);
        assert_eq!(result, json!({ "results": [2, 4, 6] }));
    }

    #[tokio::test]
    async fn test_closed_without_reply_is_null() {
        let (sender, mut receiver) = mpsc::channel::<Message>(1);
        tokio::spawn(async move {
            while let Some(msg) = receiver.recv().await {
                if msg.value() == &json!("quiet") {
                    msg.close();
                } else {
                    msg.reply(json!("loud"));
                }
            }
        });

        let (result, has_errors) =
            send_all(false, requests(&sender, &[json!("quiet"), json!("x")])).await;
        assert!(!has_errors);
        assert_eq!(result, json!({ "results": [null, "loud"] }));
    }

    #[tokio::test]
    async fn test_errors_are_flagged() {
        let (sender, mut receiver) = mpsc::channel::<Message>(1);
        tokio::spawn(async move {
            while let Some(msg) = receiver.recv().await {
                if msg.value() == &json!("bad") {
                    msg.reply_with_error();
                } else {
                    msg.reply(json!("ok"));
                }
            }
        });

        let (result, has_errors) =
            send_all(false, requests(&sender, &[json!("good"), json!("bad")])).await;
        assert!(has_errors);
        assert_eq!(
            result,
            json!({ "results": ["ok", { "err": null }], "err": null })
        );
        assert!(is_error_reply(&result));
    }

    #[tokio::test]
    async fn test_terminate_on_error_returns_promptly() {
        let (sender, mut receiver) = mpsc::channel::<Message>(1);
        // Fails the first message and never answers the others.
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Some(msg) = receiver.recv().await {
                if msg.value() == &json!(0) {
                    msg.reply(error_reply());
                } else {
                    held.push(msg);
                }
            }
        });

        let values: Vec<Value> = (0..4).map(|i| json!(i)).collect();
        let (result, has_errors) = tokio::time::timeout(
            Duration::from_secs(1),
            send_all(true, requests(&sender, &values)),
        )
        .await
        .unwrap();
        assert!(has_errors);
        assert_eq!(result["results"][0], error_reply());
        assert_eq!(result["results"][1], Value::Null);
    }

    #[tokio::test]
    async fn test_closed_destination_yields_nulls() {
        let (sender, receiver) = mpsc::channel::<Message>(1);
        drop(receiver);
        let (result, has_errors) = send_all(false, requests(&sender, &[json!(1), json!(2)])).await;
        assert!(!has_errors);
        assert_eq!(result, json!({ "results": [null, null] }));
    }

    #[tokio::test]
    async fn test_no_requests() {
        assert_eq!(send_all(true, Vec::new()).await, (json!({ "results": [] }), false));
    }
}
