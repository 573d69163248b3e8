//! Core data types flowing through the pipeline.
//!
//! A [`Subscription`] names one (market, channel) stream, each decoded frame
//! becomes a [`MessageEnvelope`], and every envelope that carries market data
//! is wrapped into an [`IndexOperation`] for the bulk indexer.

pub mod envelope;
pub mod operation;
pub mod subscription;

pub use envelope::*;
pub use operation::*;
pub use subscription::*;
