//! Stream task: one exchange connection for one (market, channel) pair.
//!
//! ```text
//! connect ──► subscribe ──► loop {
//!                             next_frame(lifetime)
//!                               ├─ Text      → decode → market data? → enqueue
//!                               ├─ Cancelled → close connection, Ok(())
//!                               ├─ Closed    → Err(StreamFault::Closed)
//!                               └─ Failed    → Err(StreamFault::Transport)
//!                           }
//! ```
//!
//! Decode failures are logged and skipped; anything that leaves the
//! connection unusable ends the instance with a [`StreamFault`] for the
//! supervisor to handle.

use std::sync::Arc;

use gmi_core::error::GmiError;
use gmi_core::ws::{FeedConnection, ReadOutcome};
use gmi_core::{Channel, IndexOperation, MessageEnvelope, OperationSink, Subscription};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a stream task instance stopped without being cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamFault {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("stream closed by exchange: {0}")]
    Closed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task aborted: {0}")]
    Aborted(String),
}

/// Result of one stream task instance: `Ok(())` when the lifetime token
/// fired, otherwise the fault that ended it.
pub type TaskOutcome = Result<(), StreamFault>;

/// Settings shared by every stream task of a pipeline.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Exchange streaming endpoint.
    pub feed_url: String,
    /// Index every operation is tagged with.
    pub index_name: String,
}

/// Decode one text frame into an index operation.
///
/// Returns `Ok(None)` for control frames (absent or zero timestamp).
pub fn frame_to_operation(text: &str, index: &str, channel: Channel) -> Result<Option<IndexOperation>, GmiError> {
    let envelope = MessageEnvelope::from_json(text)?;
    if !envelope.is_market_data() {
        return Ok(None);
    }
    Ok(Some(IndexOperation::new(index, channel, envelope)))
}

pub struct StreamTask {
    subscription: Subscription,
    settings: Arc<StreamSettings>,
    sink: Arc<dyn OperationSink>,
}

impl StreamTask {
    pub fn new(subscription: Subscription, settings: Arc<StreamSettings>, sink: Arc<dyn OperationSink>) -> Self {
        Self { subscription, settings, sink }
    }

    /// Connect, subscribe, and forward frames until cancelled or faulted.
    pub async fn run(self, cancel: CancellationToken) -> TaskOutcome {
        let label = self.subscription.label();
        let url = self.settings.feed_url.as_str();

        info!("[stream {label}] connecting to {url}");
        let mut conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            res = FeedConnection::connect(url) => res.map_err(|e| StreamFault::Connect(e.to_string()))?,
        };

        conn.send_text(self.subscription.subscribe_message())
            .await
            .map_err(|e| StreamFault::Subscribe(e.to_string()))?;
        info!("[stream {label}] subscribed");

        let mut forwarded: u64 = 0;
        loop {
            match conn.next_frame(&cancel).await {
                ReadOutcome::Text(text) => {
                    if self.handle_frame(&label, &text) {
                        forwarded += 1;
                    }
                }
                ReadOutcome::Cancelled => {
                    conn.close().await;
                    info!("[stream {label}] stopped after {forwarded} operation(s)");
                    return Ok(());
                }
                ReadOutcome::Closed(reason) => {
                    return Err(StreamFault::Closed(reason.unwrap_or_else(|| "eof".to_string())));
                }
                ReadOutcome::Failed(e) => return Err(StreamFault::Transport(e)),
            }
        }
    }

    /// Returns `true` when the frame was enqueued.
    fn handle_frame(&self, label: &str, text: &str) -> bool {
        match frame_to_operation(text, &self.settings.index_name, self.subscription.channel) {
            Ok(Some(op)) => {
                self.sink.enqueue(op);
                true
            }
            Ok(None) => {
                debug!("[stream {label}] discarding control frame");
                false
            }
            Err(e) => {
                warn!("[stream {label}] {e}");
                false
            }
        }
    }
}
