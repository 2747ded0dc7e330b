//! Durable storage for sessions, suspended flows, wallets and two-factor
//! records
//!
//! [`r2::R2Storage`] is the production backend. [`memory::MemoryStorage`]
//! keeps the same contracts in process memory.

/// In-process backend
pub mod memory;
/// Cloudflare R2 / AWS S3 backend
pub mod r2;
/// Background TTL sweeps
pub mod sweep;

use crate::flow::{FlowKind, FlowState, Session};
use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryStorage;
pub use r2::R2Storage;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error retrieving object from S3
    #[error("S3 Get error: {0}")]
    S3Get(Box<SdkError<GetObjectError>>),
    /// Error putting or deleting an object
    #[error("S3 put error: {0}")]
    S3Put(String),
    /// Error listing objects
    #[error("S3 list error: {0}")]
    S3List(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration error (missing credentials, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
    /// Stored record exists but cannot be used
    #[error("Corrupt record at {0}")]
    Corrupt(String),
}

/// One conversation record per user
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the session of a user
    async fn load_session(&self, user_id: i64) -> Result<Option<Session>, StorageError>;
    /// Upsert a session
    async fn save_session(&self, session: &Session) -> Result<(), StorageError>;
    /// Remove a session
    async fn delete_session(&self, user_id: i64) -> Result<(), StorageError>;
    /// Remove sessions not updated within `ttl`; returns how many were removed
    async fn sweep_sessions(&self, ttl: Duration) -> Result<usize, StorageError>;
}

/// Suspended flow snapshots keyed by (user, flow)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PendingStateStore: Send + Sync {
    /// Upsert the snapshot of `state.kind()`
    async fn set_pending(&self, user_id: i64, state: &FlowState) -> Result<(), StorageError>;
    /// Load a snapshot
    ///
    /// A record that exists but does not decode to a `kind` snapshot yields
    /// [`StorageError::Corrupt`].
    async fn get_pending(
        &self,
        user_id: i64,
        kind: FlowKind,
    ) -> Result<Option<FlowState>, StorageError>;
    /// Remove a snapshot; `false` if there was none
    async fn clear_pending(&self, user_id: i64, kind: FlowKind) -> Result<bool, StorageError>;
    /// Remove snapshots not refreshed within `ttl`; returns how many were removed
    async fn sweep_pending(&self, ttl: Duration) -> Result<usize, StorageError>;
}

/// Returns the R2 key for a user's session
#[must_use]
pub fn user_session_key(user_id: i64) -> String {
    format!("users/{user_id}/session.json")
}

/// Returns the R2 key for a user's suspended flow of `kind`
#[must_use]
pub fn user_pending_key(user_id: i64, kind: FlowKind) -> String {
    format!("users/{user_id}/pending/{kind}.json")
}

/// Returns the R2 key for a user's two-factor record
#[must_use]
pub fn user_two_factor_key(user_id: i64) -> String {
    format!("users/{user_id}/two_factor.json")
}

/// Returns the R2 prefix holding a user's wallets
#[must_use]
pub fn user_wallets_prefix(user_id: i64) -> String {
    format!("users/{user_id}/wallets/")
}

/// Returns the R2 key for one wallet record
#[must_use]
pub fn user_wallet_key(user_id: i64, wallet_id: i64) -> String {
    format!("{}{wallet_id}.json", user_wallets_prefix(user_id))
}

/// Returns the R2 key of the wallet-id to owner pointer
#[must_use]
pub fn wallet_owner_key(wallet_id: i64) -> String {
    format!("wallets/{wallet_id}.json")
}

/// Whether `key` names a session object
#[must_use]
pub fn is_session_key(key: &str) -> bool {
    key.starts_with("users/") && key.ends_with("/session.json")
}

/// Whether `key` names a pending flow object
#[must_use]
pub fn is_pending_key(key: &str) -> bool {
    key.starts_with("users/") && key.contains("/pending/") && key.ends_with(".json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(user_session_key(7), "users/7/session.json");
        assert_eq!(
            user_pending_key(7, FlowKind::Enable2fa),
            "users/7/pending/enable2fa.json"
        );
        assert_eq!(user_wallet_key(7, 3), "users/7/wallets/3.json");
        assert_eq!(wallet_owner_key(3), "wallets/3.json");
    }

    #[test]
    fn test_sweep_key_filters() {
        assert!(is_session_key(&user_session_key(1)));
        assert!(!is_session_key(&user_two_factor_key(1)));
        assert!(is_pending_key(&user_pending_key(1, FlowKind::Label)));
        assert!(!is_pending_key(&user_wallet_key(1, 2)));
    }
}
