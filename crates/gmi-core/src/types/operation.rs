//! Index operations and flush results.

use super::{envelope::MessageEnvelope, subscription::Channel};

/// One document to be written to the index store.
///
/// Created once per valid envelope; owned by the bulk indexer from the moment
/// it is enqueued until its batch is flushed.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexOperation {
    /// Target index name.
    pub index: String,
    /// Document-type label (`snap-shot` or `ticker`).
    pub doc_type: &'static str,
    /// Document body.
    pub body: MessageEnvelope,
}

impl IndexOperation {
    pub fn new(index: impl Into<String>, channel: Channel, body: MessageEnvelope) -> Self {
        Self { index: index.into(), doc_type: channel.doc_type(), body }
    }
}

/// Outcome of one bulk flush, consumed only for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushResult {
    pub succeeded: usize,
    pub failed: usize,
}

impl FlushResult {
    /// Every operation of a batch of `n` failed (transport-level error).
    pub fn all_failed(n: usize) -> Self {
        Self { succeeded: 0, failed: n }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Destination for index operations produced by stream tasks.
///
/// `enqueue` must never block: stream tasks call it from their read loop.
pub trait OperationSink: Send + Sync {
    fn enqueue(&self, op: IndexOperation);
}
