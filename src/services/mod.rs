//! External collaborators of the flow engine
//!
//! The engine only talks to these traits. Concrete implementations live in
//! [`ledger`], [`otp`] and [`crate::storage`].

/// HTTP ledger gateway client
pub mod ledger;
/// Time-based one-time codes
pub mod otp;

use crate::config::UNNAMED_WALLET_LABEL;
use crate::storage::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the ledger service
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Transport-level failure talking to the gateway
    #[error("Ledger HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Gateway answered with a non-success status
    #[error("Ledger returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },
}

/// Errors raised by the OTP service
#[derive(Error, Debug)]
pub enum OtpError {
    /// Stored secret is not valid base32
    #[error("Malformed OTP secret")]
    MalformedSecret,
    /// HMAC could not be keyed
    #[error("Invalid OTP key length")]
    InvalidKey,
}

/// Wallet record as held by the wallet directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletRecord {
    /// Wallet identifier
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Base58 TRON address
    pub address: String,
    /// Signing secret; never leaves the directory except for a transfer
    pub private_key: String,
    /// Optional display label
    pub label: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl WalletRecord {
    /// Whether this wallet belongs to `user_id`
    #[must_use]
    pub const fn is_owned_by(&self, user_id: i64) -> bool {
        self.user_id == user_id
    }

    /// Point-in-time copy safe to embed in a flow snapshot
    #[must_use]
    pub fn snapshot(&self) -> WalletSnapshot {
        WalletSnapshot {
            id: self.id,
            user_id: self.user_id,
            address: self.address.clone(),
            label: self.label.clone(),
        }
    }
}

/// Cached view of a wallet carried inside flow state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletSnapshot {
    /// Wallet identifier
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Base58 TRON address
    pub address: String,
    /// Optional display label
    pub label: Option<String>,
}

impl WalletSnapshot {
    /// Label to show, falling back to a placeholder
    #[must_use]
    pub fn display_label(&self) -> &str {
        match self.label.as_deref() {
            Some(label) if !label.is_empty() => label,
            _ => UNNAMED_WALLET_LABEL,
        }
    }

    /// Phrase the user must type to confirm deletion: the wallet's label,
    /// or its address for unlabeled wallets
    #[must_use]
    pub fn confirmation_phrase(&self) -> &str {
        match self.label.as_deref() {
            Some(label) if !label.is_empty() => label,
            _ => &self.address,
        }
    }
}

/// Stored two-factor secret of a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TwoFactorRecord {
    /// Base32 TOTP secret
    pub secret: String,
    /// Whether the secret has been verified and activated
    pub enabled: bool,
}

/// Result of a transfer request accepted by the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Transfer broadcast
    Sent {
        /// Ledger transaction id
        transfer_id: String,
    },
    /// Ledger refused the transfer
    Rejected {
        /// Reason reported by the ledger
        reason: String,
    },
}

/// Balance, transfer and address validation operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Balance of `address` in sun
    async fn get_balance(&self, address: &str) -> Result<u64, LedgerError>;
    /// Sign with `secret` and broadcast a transfer of `amount_sun`
    async fn send_transfer(
        &self,
        secret: &str,
        to_address: &str,
        amount_sun: u64,
    ) -> Result<TransferOutcome, LedgerError>;
    /// Whether `value` is a syntactically valid address on the target network
    fn validate_address(&self, value: &str) -> bool;
}

/// Wallet record storage and lookup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletDirectory: Send + Sync {
    /// Look up a wallet by id
    async fn get_wallet(&self, wallet_id: i64) -> Result<Option<WalletRecord>, StorageError>;
    /// All wallets of a user
    async fn list_wallets(&self, user_id: i64) -> Result<Vec<WalletRecord>, StorageError>;
    /// Replace a wallet's label; `false` if the wallet does not exist
    async fn update_label(&self, wallet_id: i64, label: &str) -> Result<bool, StorageError>;
    /// Delete a wallet; `false` if the wallet does not exist
    async fn delete_wallet(&self, wallet_id: i64) -> Result<bool, StorageError>;
}

/// Per-user two-factor secret storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TwoFactorStore: Send + Sync {
    /// Current record of a user
    async fn get_two_factor(&self, user_id: i64) -> Result<Option<TwoFactorRecord>, StorageError>;
    /// Store a freshly generated, not yet activated secret
    async fn store_pending_secret(&self, user_id: i64, secret: &str) -> Result<(), StorageError>;
    /// Mark `secret` as the user's active secret
    async fn activate_secret(&self, user_id: i64, secret: &str) -> Result<(), StorageError>;
    /// Remove the user's secret entirely
    async fn erase_secret(&self, user_id: i64) -> Result<(), StorageError>;
    /// Remove the user's secret only if it was never activated
    async fn erase_pending_secret(&self, user_id: i64) -> Result<(), StorageError>;
}

/// One-time code secrets
#[cfg_attr(test, mockall::automock)]
pub trait OtpService: Send + Sync {
    /// New random base32 secret
    fn generate_secret(&self) -> String;
    /// `otpauth://` URI for authenticator apps
    fn provisioning_uri(&self, secret: &str, account: &str) -> String;
    /// Check `code` against `secret` with clock skew tolerance
    ///
    /// # Errors
    ///
    /// Returns an error if the secret cannot be decoded.
    fn verify(&self, secret: &str, code: &str) -> Result<bool, OtpError>;
}
