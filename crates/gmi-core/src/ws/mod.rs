//! WebSocket feed connection with cancellable reads.

pub mod client;

pub use client::{FeedConnection, ReadOutcome};
