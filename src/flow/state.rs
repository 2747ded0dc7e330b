//! Flow discriminants, payloads and the per-user session record

use crate::services::WalletSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a multi-step flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    /// Fund withdrawal
    Withdrawal,
    /// Wallet label change
    Label,
    /// Wallet deletion
    Delete,
    /// Two-factor setup
    Enable2fa,
    /// Two-factor teardown
    Disable2fa,
}

impl FlowKind {
    /// Restoration order, highest priority first
    pub const PRIORITY: [Self; 5] = [
        Self::Withdrawal,
        Self::Label,
        Self::Delete,
        Self::Enable2fa,
        Self::Disable2fa,
    ];

    /// Stable identifier used in storage keys and logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Withdrawal => "withdrawal",
            Self::Label => "label",
            Self::Delete => "delete",
            Self::Enable2fa => "enable2fa",
            Self::Disable2fa => "disable2fa",
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Withdrawal step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WithdrawalStep {
    /// Waiting for the destination address
    Address,
    /// Waiting for the amount
    Amount,
}

/// Withdrawal payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalState {
    /// Current step
    pub step: WithdrawalStep,
    /// Source wallet as seen at entry
    pub wallet: WalletSnapshot,
    /// Balance in sun fetched at entry
    pub balance_sun: u64,
    /// Destination chosen in the address step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_address: Option<String>,
}

/// Label change payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelState {
    /// Wallet being renamed
    pub wallet: WalletSnapshot,
}

/// Deletion payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteState {
    /// Wallet being deleted
    pub wallet: WalletSnapshot,
    /// Balance shown in the confirmation prompt, in sun
    #[serde(default)]
    pub balance_sun: u64,
}

/// Two-factor setup step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TwoFactorStep {
    /// Secret shown, waiting for "next"
    Qr,
    /// Waiting for the first code
    Verify,
}

/// Two-factor setup payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnableTwoFactorState {
    /// Not yet activated secret
    pub secret: String,
    /// Current step
    pub step: TwoFactorStep,
}

/// Two-factor teardown payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableTwoFactorState {}

/// Self-describing flow snapshot
///
/// The variant is the flow discriminant, so a session pointer and its payload
/// can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flow", content = "state", rename_all = "lowercase")]
pub enum FlowState {
    /// Withdrawal in progress
    Withdrawal(WithdrawalState),
    /// Label change in progress
    Label(LabelState),
    /// Deletion in progress
    Delete(DeleteState),
    /// Two-factor setup in progress
    Enable2fa(EnableTwoFactorState),
    /// Two-factor teardown in progress
    Disable2fa(DisableTwoFactorState),
}

impl FlowState {
    /// Discriminant of this snapshot
    #[must_use]
    pub const fn kind(&self) -> FlowKind {
        match self {
            Self::Withdrawal(_) => FlowKind::Withdrawal,
            Self::Label(_) => FlowKind::Label,
            Self::Delete(_) => FlowKind::Delete,
            Self::Enable2fa(_) => FlowKind::Enable2fa,
            Self::Disable2fa(_) => FlowKind::Disable2fa,
        }
    }

    /// Wallet the flow operates on, if any
    #[must_use]
    pub fn wallet(&self) -> Option<&WalletSnapshot> {
        match self {
            Self::Withdrawal(s) => Some(&s.wallet),
            Self::Label(s) => Some(&s.wallet),
            Self::Delete(s) => Some(&s.wallet),
            Self::Enable2fa(_) | Self::Disable2fa(_) => None,
        }
    }

    /// Whether a button shown for `wallet_id` applies to this state; buttons
    /// without a wallet, and flows without one, always match
    #[must_use]
    pub fn matches_wallet(&self, wallet_id: Option<i64>) -> bool {
        match (self.wallet(), wallet_id) {
            (Some(wallet), Some(id)) => wallet.id == id,
            _ => true,
        }
    }

    /// Whether the snapshot carries everything needed to re-render its last
    /// prompt
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        let wallet_ok = |w: &WalletSnapshot| w.id > 0 && !w.address.is_empty();
        match self {
            Self::Withdrawal(s) => {
                wallet_ok(&s.wallet)
                    && match s.step {
                        WithdrawalStep::Address => true,
                        WithdrawalStep::Amount => {
                            s.to_address.as_deref().is_some_and(|a| !a.is_empty())
                        }
                    }
            }
            Self::Label(s) => wallet_ok(&s.wallet),
            Self::Delete(s) => wallet_ok(&s.wallet),
            Self::Enable2fa(s) => !s.secret.is_empty(),
            Self::Disable2fa(_) => true,
        }
    }

    /// Fills fields this state lacks from a stored snapshot of the same flow.
    ///
    /// Returns `true` if anything changed. Snapshots of another flow or
    /// another wallet are ignored.
    pub fn merge_missing(&mut self, stored: &Self) -> bool {
        match (self, stored) {
            (Self::Withdrawal(live), Self::Withdrawal(saved)) if live.wallet.id == saved.wallet.id => {
                let mut changed = false;
                if live.to_address.is_none() && saved.to_address.is_some() {
                    live.to_address.clone_from(&saved.to_address);
                    changed = true;
                }
                if live.step == WithdrawalStep::Address
                    && saved.step == WithdrawalStep::Amount
                    && live.to_address.is_some()
                {
                    live.step = WithdrawalStep::Amount;
                    changed = true;
                }
                changed
            }
            (Self::Enable2fa(live), Self::Enable2fa(saved)) => {
                let mut changed = false;
                if live.secret.is_empty() && !saved.secret.is_empty() {
                    live.secret.clone_from(&saved.secret);
                    changed = true;
                }
                if live.step == TwoFactorStep::Qr
                    && saved.step == TwoFactorStep::Verify
                    && live.secret == saved.secret
                {
                    live.step = TwoFactorStep::Verify;
                    changed = true;
                }
                changed
            }
            _ => false,
        }
    }
}

/// Conversation record of one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Owner of the session
    pub user_id: i64,
    /// Flow in progress, with its working state
    #[serde(default)]
    pub active: Option<FlowState>,
    /// Last time an event touched the session
    pub last_updated: DateTime<Utc>,
}

impl Session {
    /// Empty session for a user seen for the first time
    #[must_use]
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            active: None,
            last_updated: Utc::now(),
        }
    }

    /// Kind of the active flow
    #[must_use]
    pub fn active_flow(&self) -> Option<FlowKind> {
        self.active.as_ref().map(FlowState::kind)
    }

    /// Bump the last-updated timestamp
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

/// Stored envelope of a suspended flow
///
/// The payload is kept as raw JSON so a malformed snapshot can be told apart
/// from a malformed envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRecord {
    /// Owner
    pub user_id: i64,
    /// Flow this record belongs to
    pub flow: FlowKind,
    /// Serialized [`FlowState`]
    pub payload: serde_json::Value,
    /// Time of the last write
    pub updated_at: DateTime<Utc>,
}

impl PendingRecord {
    /// Wrap a snapshot for storage
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be serialized.
    pub fn new(user_id: i64, state: &FlowState) -> Result<Self, serde_json::Error> {
        Ok(Self {
            user_id,
            flow: state.kind(),
            payload: serde_json::to_value(state)?,
            updated_at: Utc::now(),
        })
    }

    /// Decode the payload, checking it belongs to `self.flow`
    #[must_use]
    pub fn decode(&self) -> Option<FlowState> {
        serde_json::from_value::<FlowState>(self.payload.clone())
            .ok()
            .filter(|state| state.kind() == self.flow)
    }
}
