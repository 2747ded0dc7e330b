//! Inbound events and button actions

use super::state::FlowKind;

/// Button action, decoded from callback data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAction {
    /// Back to the main menu
    ShowMenu,
    /// Begin a flow from its menu button
    Start {
        /// Flow to start
        kind: FlowKind,
        /// Target wallet for wallet flows
        wallet_id: Option<i64>,
    },
    /// Cancel button of a flow
    Cancel {
        /// Flow to cancel
        kind: FlowKind,
        /// Wallet the button was shown for, if a wallet flow
        wallet_id: Option<i64>,
    },
    /// "Next" button of the two-factor setup QR step
    TwoFactorNext,
}

impl FlowAction {
    /// Decode callback data
    ///
    /// # Examples
    ///
    /// ```
    /// use tron_wallet_bot::flow::{FlowAction, FlowKind};
    ///
    /// assert_eq!(
    ///     FlowAction::parse("withdraw_12"),
    ///     Some(FlowAction::Start { kind: FlowKind::Withdrawal, wallet_id: Some(12) })
    /// );
    /// assert_eq!(FlowAction::parse("withdraw_x"), None);
    /// ```
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        let cancel_wallet = |kind, id: &str| {
            id.parse::<i64>()
                .ok()
                .map(|id| Self::cancel(kind, Some(id)))
        };
        let with_wallet = |kind, id: &str| {
            id.parse::<i64>().ok().map(|id| Self::Start {
                kind,
                wallet_id: Some(id),
            })
        };

        match data {
            "wallets" | "main" | "menu" => return Some(Self::ShowMenu),
            "enable_two_factor_auth" => {
                return Some(Self::Start {
                    kind: FlowKind::Enable2fa,
                    wallet_id: None,
                })
            }
            "disable_two_factor_auth" => {
                return Some(Self::Start {
                    kind: FlowKind::Disable2fa,
                    wallet_id: None,
                })
            }
            "2fa_enable_next_step" => return Some(Self::TwoFactorNext),
            "2fa_enable_cancel" => return Some(Self::cancel(FlowKind::Enable2fa, None)),
            "2fa_disable_cancel" => return Some(Self::cancel(FlowKind::Disable2fa, None)),
            _ => {}
        }

        if let Some(rest) = data.strip_prefix("cancel_withdraw_") {
            return cancel_wallet(FlowKind::Withdrawal, rest);
        }
        if let Some(rest) = data.strip_prefix("cancel_change_label_") {
            return cancel_wallet(FlowKind::Label, rest);
        }
        if let Some(rest) = data.strip_prefix("cancel_delete_") {
            return cancel_wallet(FlowKind::Delete, rest);
        }
        if let Some(rest) = data.strip_prefix("withdraw_") {
            return with_wallet(FlowKind::Withdrawal, rest);
        }
        if let Some(rest) = data.strip_prefix("change_label_wallet_") {
            return with_wallet(FlowKind::Label, rest);
        }
        if let Some(rest) = data.strip_prefix("delete_wallet_") {
            return with_wallet(FlowKind::Delete, rest);
        }
        None
    }

    /// Cancel button of `kind`, optionally bound to one wallet
    #[must_use]
    pub const fn cancel(kind: FlowKind, wallet_id: Option<i64>) -> Self {
        Self::Cancel { kind, wallet_id }
    }

    /// Encode as callback data; `wallet_id` fills the cancel buttons of
    /// wallet flows
    #[must_use]
    pub fn callback_data(self, wallet_id: Option<i64>) -> String {
        let id = wallet_id.unwrap_or_default();
        match self {
            Self::ShowMenu => "wallets".to_string(),
            Self::Start { kind, wallet_id } => {
                let id = wallet_id.unwrap_or(id);
                match kind {
                    FlowKind::Withdrawal => format!("withdraw_{id}"),
                    FlowKind::Label => format!("change_label_wallet_{id}"),
                    FlowKind::Delete => format!("delete_wallet_{id}"),
                    FlowKind::Enable2fa => "enable_two_factor_auth".to_string(),
                    FlowKind::Disable2fa => "disable_two_factor_auth".to_string(),
                }
            }
            Self::Cancel { kind, wallet_id } => {
                let id = wallet_id.unwrap_or(id);
                match kind {
                FlowKind::Withdrawal => format!("cancel_withdraw_{id}"),
                FlowKind::Label => format!("cancel_change_label_{id}"),
                FlowKind::Delete => format!("cancel_delete_{id}"),
                FlowKind::Enable2fa => "2fa_enable_cancel".to_string(),
                FlowKind::Disable2fa => "2fa_disable_cancel".to_string(),
                }
            }
            Self::TwoFactorNext => "2fa_enable_next_step".to_string(),
        }
    }
}

/// Slash commands the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `/start`
    Start,
}

/// Transport-neutral inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// Free text
    Text(String),
    /// Button press
    Action(FlowAction),
    /// Slash command
    Command(Command),
}

impl FlowEvent {
    /// Whether the event explicitly starts something new, bypassing
    /// restoration
    #[must_use]
    pub const fn is_fresh_start(&self) -> bool {
        matches!(
            self,
            Self::Command(Command::Start)
                | Self::Action(FlowAction::ShowMenu | FlowAction::Start { .. })
        )
    }
}
