//! Error type shared by the indexer crates.
//!
//! Stream-level faults live in `gmi-stream` and index-store transport errors
//! in `gmi-index`; [`GmiError`] covers everything that is decided in the core
//! crate or surfaces at startup.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GmiError {
    /// Config file missing, malformed, or failing validation.
    #[error("config error: {0}")]
    Config(String),

    /// Feed connection could not be opened or written to.
    #[error("feed connection error: {0}")]
    WebSocket(String),

    /// An exchange frame that is not a JSON object of the expected shape.
    #[error("unable to decode frame: {0}")]
    Parse(#[from] serde_json::Error),

    /// Index existence check, template read, or index creation failed.
    #[error("unable to initialize index: {0}")]
    Bootstrap(String),
}
