//! Index store client errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Request could not be sent or the response could not be read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The index store answered with a non-success status.
    #[error("unexpected status {status} from {url}: {body}")]
    Status { status: u16, url: String, body: String },

    /// No configured endpoint answered the connection check.
    #[error("no live index store node among {0:?}")]
    NoLiveNodes(Vec<String>),

    /// A configured endpoint is not a valid URL.
    #[error("invalid endpoint {0}")]
    InvalidEndpoint(String),

    /// The client was released by [`BulkSink::close`](crate::BulkSink::close).
    #[error("index store client already released")]
    Released,

    /// A batch could not be serialized.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}
