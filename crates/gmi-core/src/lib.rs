//! # gmi-core
//!
//! Core crate for the GDAX market indexer, providing:
//!
//! - **Types** (`types`): subscriptions, message envelopes, index operations
//! - **Configuration** (`config`): JSON config deserialization and validation
//! - **Error types** (`error`): domain-specific `GmiError` via thiserror
//! - **Lifecycle** (`lifecycle`): lifetime token, task registrations, OS signals
//! - **WebSocket** (`ws`): feed connection with cancellable reads
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use types::*;
