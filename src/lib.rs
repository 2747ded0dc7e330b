#![deny(missing_docs)]
//! TRON wallet bot library.
//!
//! Conversational flow persistence and recovery for a Telegram wallet bot:
//! rate limiting, durable sessions and pending flow snapshots, the flow state
//! machines and the restoration logic that resumes them after a restart.

/// Telegram transport: dispatcher endpoints, rendering and delivery.
pub mod bot;
/// Configuration management.
pub mod config;
/// Flow model, scenes, restoration and the event engine.
pub mod flow;
/// Per-user admission control.
pub mod rate_limit;
/// External collaborators (ledger, OTP, wallet records).
pub mod services;
/// Durable storage layer (R2/S3 and in-memory).
pub mod storage;
/// Utility functions.
pub mod utils;

/// Fixtures and mock constructors for unit tests.
#[cfg(test)]
pub mod testing;
