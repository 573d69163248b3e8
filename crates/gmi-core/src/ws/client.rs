//! Single exchange feed connection with cancellable reads.
//!
//! A `FeedConnection` is owned by exactly one stream task:
//! 1. [`connect`](FeedConnection::connect) opens the WebSocket (TLS for `wss://`).
//! 2. [`send_text`](FeedConnection::send_text) sends the subscribe frame.
//! 3. [`next_frame`](FeedConnection::next_frame) waits for the next text frame
//!    *or* the lifetime token, answering pings along the way.
//! 4. [`close`](FeedConnection::close) sends a close frame.
//!
//! There is no reconnect logic here; a failed connection is dropped and the
//! supervisor opens a fresh one.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::USER_AGENT;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::GmiError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Result of one [`FeedConnection::next_frame`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A text frame.
    Text(String),
    /// The lifetime token fired before a frame arrived.
    Cancelled,
    /// The peer closed the stream (close frame or EOF).
    Closed(Option<String>),
    /// The transport failed.
    Failed(String),
}

/// An open WebSocket connection to the exchange feed.
pub struct FeedConnection {
    url: String,
    stream: WsStream,
}

impl FeedConnection {
    /// Open a connection to `url` (`ws://` or `wss://`).
    pub async fn connect(url: &str) -> Result<Self, GmiError> {
        let parsed = url::Url::parse(url).map_err(|e| GmiError::WebSocket(format!("invalid url {url}: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(GmiError::WebSocket(format!("unsupported scheme in {url}")));
        }

        let mut request = url.into_client_request().map_err(|e| GmiError::WebSocket(e.to_string()))?;
        request
            .headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static(concat!("gmi/", env!("CARGO_PKG_VERSION"))));

        let (stream, _response) =
            tokio_tungstenite::connect_async(request).await.map_err(|e| GmiError::WebSocket(e.to_string()))?;
        Ok(Self { url: url.to_string(), stream })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one text frame.
    pub async fn send_text(&mut self, text: String) -> Result<(), GmiError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| GmiError::WebSocket(e.to_string()))
    }

    /// Wait for the next text frame, or for `cancel` to fire.
    ///
    /// Pings are answered in place; binary and pong frames are skipped.
    pub async fn next_frame(&mut self, cancel: &CancellationToken) -> ReadOutcome {
        loop {
            let msg = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ReadOutcome::Cancelled,
                msg = self.stream.next() => msg,
            };

            match msg {
                Some(Ok(Message::Text(text))) => return ReadOutcome::Text(text.as_str().to_owned()),
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        return ReadOutcome::Failed(format!("pong send failed: {e}"));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return ReadOutcome::Closed(frame.map(|f| f.reason.as_str().to_owned()));
                }
                Some(Ok(_)) => {} // binary, pong, raw frame
                Some(Err(e)) => return ReadOutcome::Failed(e.to_string()),
                None => return ReadOutcome::Closed(None),
            }
        }
    }

    /// Send a close frame. Errors are logged, never returned.
    pub async fn close(&mut self) {
        match self.stream.close(None).await {
            Ok(()) => debug!("[ws] closed {}", self.url),
            Err(e) => warn!("[ws] close of {} failed: {e}", self.url),
        }
    }
}
