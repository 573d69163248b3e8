//! Local mock of the exchange feed for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gmi_core::{IndexOperation, OperationSink};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

/// Frames to send for one accepted connection, given its subscribe frame.
pub type Script = Arc<dyn Fn(&serde_json::Value) -> Vec<String> + Send + Sync>;

pub struct MockExchange {
    pub url: String,
    /// Subscribe frames received, in connection order.
    pub subscriptions: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl MockExchange {
    /// Accept connections forever. After sending the scripted frames the
    /// connection is either held open until the client closes it, or closed
    /// by the exchange when `hang_up` is set.
    pub async fn start(script: Script, hang_up: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let subscriptions = Arc::new(Mutex::new(Vec::new()));

        let subs = subscriptions.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let script = script.clone();
                let subs = subs.clone();
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    let subscribe: serde_json::Value = match ws.next().await {
                        Some(Ok(Message::Text(text))) => serde_json::from_str(text.as_str()).unwrap(),
                        _ => return,
                    };
                    subs.lock().unwrap().push(subscribe.clone());

                    let ack = serde_json::json!({ "type": "subscriptions", "channels": subscribe["channels"] });
                    if ws.send(Message::Text(ack.to_string().into())).await.is_err() {
                        return;
                    }
                    for frame in script(&subscribe) {
                        if ws.send(Message::Text(frame.into())).await.is_err() {
                            return;
                        }
                    }

                    if hang_up {
                        let _ = ws.close(None).await;
                        return;
                    }
                    while let Some(Ok(msg)) = ws.next().await {
                        if msg.is_close() {
                            break;
                        }
                    }
                });
            }
        });

        Self { url, subscriptions }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }
}

/// Channel name and product of a subscribe frame.
pub fn subscribed(subscribe: &serde_json::Value) -> (String, String) {
    let channel = subscribe["channels"][0]["name"].as_str().unwrap_or_default().to_string();
    let product = subscribe["channels"][0]["product_ids"][0].as_str().unwrap_or_default().to_string();
    (channel, product)
}

/// A ticker frame with a real timestamp.
pub fn ticker_frame(product: &str, sequence: u64) -> String {
    serde_json::json!({
        "type": "ticker",
        "sequence": sequence,
        "product_id": product,
        "price": "4388.01",
        "best_bid": "4388.00",
        "best_ask": "4388.01",
        "time": "2017-09-02T17:05:49.250000Z"
    })
    .to_string()
}

/// Operation sink that keeps everything it receives.
#[derive(Default)]
pub struct CollectingSink {
    pub ops: Mutex<Vec<IndexOperation>>,
}

impl CollectingSink {
    pub fn len(&self) -> usize {
        self.ops.lock().unwrap().len()
    }
}

impl OperationSink for CollectingSink {
    fn enqueue(&self, op: IndexOperation) {
        self.ops.lock().unwrap().push(op);
    }
}

/// Poll `cond` every 10ms until it holds or `timeout` passes.
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
