//! # gmi-index
//!
//! Index store side of the pipeline.
//!
//! - [`client`]: Elasticsearch HTTP client (connection check, sniffing, bulk)
//! - [`bulk`]: batching [`BulkIndexer`] with size/interval flush policy
//! - [`bootstrap`]: create the target index from a template on first run
//! - [`wire`]: `_bulk` NDJSON encoding and response counting

pub mod bootstrap;
pub mod bulk;
pub mod client;
pub mod error;
pub mod wire;

pub use bulk::{BulkIndexer, BulkSettings, BulkSink, FlushCallback};
pub use client::EsClient;
pub use error::IndexError;
