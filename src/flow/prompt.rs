//! Semantic replies produced by the engine
//!
//! A prompt names what to show, never how. Rendering to chat markup lives in
//! the transport layer.

use super::state::FlowKind;
use crate::services::WalletSnapshot;

/// Message key plus parameters for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// Wallet list and account actions
    MainMenu {
        /// Wallets of the user
        wallets: Vec<WalletSnapshot>,
        /// Whether two-factor is active
        two_factor_enabled: bool,
    },
    /// Event dropped while the user is blocked
    SlowDown,
    /// Event that triggered a block
    TooManyRequests,

    /// Ask for the withdrawal destination
    WithdrawAddress {
        /// Source wallet
        wallet: WalletSnapshot,
        /// Balance at entry, in sun
        balance_sun: u64,
        /// Largest amount that can be sent, in sun
        max_sun: u64,
    },
    /// Ask for the withdrawal amount
    WithdrawAmount {
        /// Source wallet
        wallet: WalletSnapshot,
        /// Chosen destination
        to_address: String,
        /// Largest amount that can be sent, in sun
        max_sun: u64,
    },
    /// Destination is not a valid address
    InvalidAddress {
        /// Source wallet id
        wallet_id: i64,
    },
    /// Destination equals the source wallet
    SameAddress {
        /// Source wallet id
        wallet_id: i64,
    },
    /// Amount is not a positive number with at most six decimals
    InvalidAmount {
        /// Source wallet id
        wallet_id: i64,
    },
    /// Amount exceeds what can be sent
    InsufficientBalance {
        /// Source wallet id
        wallet_id: i64,
        /// Largest amount that can be sent, in sun
        max_sun: u64,
    },
    /// Balance does not even cover the fee reserve
    BalanceTooLow {
        /// Current balance, in sun
        balance_sun: u64,
    },
    /// Transfer broadcast
    WithdrawSuccess {
        /// Amount sent, in sun
        amount_sun: u64,
        /// Destination
        to_address: String,
        /// Ledger transaction id
        transfer_id: String,
    },
    /// Ledger refused the transfer
    WithdrawRejected {
        /// Reason reported by the ledger
        reason: String,
    },

    /// Ask for a new label
    LabelPrompt {
        /// Wallet being renamed
        wallet: WalletSnapshot,
    },
    /// Label normalized to nothing
    LabelEmpty {
        /// Wallet id
        wallet_id: i64,
    },
    /// Label longer than allowed
    LabelTooLong {
        /// Wallet id
        wallet_id: i64,
    },
    /// Label saved
    LabelUpdated {
        /// Normalized label
        label: String,
    },

    /// Ask for the deletion confirmation phrase
    DeleteConfirm {
        /// Wallet being deleted
        wallet: WalletSnapshot,
        /// Fresh balance, in sun
        balance_sun: u64,
    },
    /// Wallet deleted
    WalletDeleted {
        /// Deleted wallet
        wallet: WalletSnapshot,
    },
    /// Confirmation did not match; nothing deleted
    DeleteNotConfirmed,

    /// Show the new secret for the authenticator app
    TwoFactorQr {
        /// Base32 secret
        secret: String,
        /// `otpauth://` URI to encode as QR
        provisioning_uri: String,
    },
    /// Ask for the first code
    TwoFactorVerify,
    /// Code is not six digits
    InvalidCodeFormat(FlowKind),
    /// Code did not verify
    InvalidCode(FlowKind),
    /// Two-factor activated
    TwoFactorEnabled,
    /// Two-factor was already active
    TwoFactorAlreadyEnabled,
    /// Ask for a code to disable two-factor
    TwoFactorDisablePrompt,
    /// Two-factor removed
    TwoFactorDisabled,
    /// Two-factor was not active
    TwoFactorNotEnabled,

    /// Flow cancelled by the user
    Cancelled(FlowKind),
    /// Cancel pressed with nothing in progress
    NothingToCancel,
    /// Wallet missing or owned by someone else
    AccessDenied,
    /// A collaborator failed
    ServiceUnavailable,
    /// Stored state was unusable
    RestartRequired,
}
