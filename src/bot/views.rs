//! Presentation layer: prompts to HTML text and inline keyboards

use crate::config::{LABEL_MAX_LEN, OTP_DIGITS};
use crate::flow::{FlowAction, FlowKind, Prompt};
use crate::services::WalletSnapshot;
use crate::utils::format_trx;
use html_escape::encode_text;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

/// A prompt ready to send
#[derive(Debug, Clone)]
pub struct View {
    /// HTML message text
    pub text: String,
    /// Inline buttons, if any
    pub keyboard: Option<InlineKeyboardMarkup>,
}

impl View {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    fn with_keyboard(mut self, keyboard: InlineKeyboardMarkup) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

fn button(text: &str, action: FlowAction, wallet_id: Option<i64>) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, action.callback_data(wallet_id))
}

fn cancel_keyboard(kind: FlowKind, wallet_id: Option<i64>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button(
        "❌ Cancel",
        FlowAction::cancel(kind, wallet_id),
        None,
    )]])
}

fn back_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button("↩ Back to wallets", FlowAction::ShowMenu, None)]])
}

fn wallet_name(wallet: &WalletSnapshot) -> String {
    encode_text(wallet.display_label()).into_owned()
}

fn main_menu(wallets: &[WalletSnapshot], two_factor_enabled: bool) -> View {
    let mut text = String::from("👛 <b>Your wallets</b>\n");
    if wallets.is_empty() {
        text.push_str("\nYou have no wallets yet.");
    }
    for wallet in wallets {
        text.push_str(&format!(
            "\n• <b>{}</b>\n<code>{}</code>",
            wallet_name(wallet),
            encode_text(&wallet.address)
        ));
    }

    let mut rows: Vec<Vec<InlineKeyboardButton>> = wallets
        .iter()
        .map(|wallet| {
            let start = |kind| FlowAction::Start {
                kind,
                wallet_id: Some(wallet.id),
            };
            vec![
                button(
                    &format!("💸 {}", wallet.display_label()),
                    start(FlowKind::Withdrawal),
                    None,
                ),
                button("✏️ Rename", start(FlowKind::Label), None),
                button("🗑 Delete", start(FlowKind::Delete), None),
            ]
        })
        .collect();

    let two_factor = if two_factor_enabled {
        ("🔓 Disable 2FA", FlowKind::Disable2fa)
    } else {
        ("🔐 Enable 2FA", FlowKind::Enable2fa)
    };
    rows.push(vec![button(
        two_factor.0,
        FlowAction::Start {
            kind: two_factor.1,
            wallet_id: None,
        },
        None,
    )]);

    View::text(text).with_keyboard(InlineKeyboardMarkup::new(rows))
}

fn flow_name(kind: FlowKind) -> &'static str {
    match kind {
        FlowKind::Withdrawal => "Withdrawal",
        FlowKind::Label => "Renaming",
        FlowKind::Delete => "Deletion",
        FlowKind::Enable2fa => "Two-factor setup",
        FlowKind::Disable2fa => "Two-factor removal",
    }
}

/// Render a prompt
#[must_use]
pub fn render(prompt: &Prompt) -> View {
    use FlowKind as K;

    match prompt {
        Prompt::MainMenu {
            wallets,
            two_factor_enabled,
        } => main_menu(wallets, *two_factor_enabled),
        Prompt::SlowDown => {
            View::text("⏳ You are sending requests too quickly. Please wait a moment.")
        }
        Prompt::TooManyRequests => View::text("❗ Too many requests. Please wait a moment."),

        Prompt::WithdrawAddress {
            wallet,
            balance_sun,
            max_sun,
        } => View::text(format!(
            "💸 <b>Withdraw from {}</b>\n\nBalance: <b>{} TRX</b>\nAvailable to send: <b>{} TRX</b>\n\nSend the destination address.",
            wallet_name(wallet),
            format_trx(*balance_sun),
            format_trx(*max_sun)
        ))
        .with_keyboard(cancel_keyboard(K::Withdrawal, Some(wallet.id))),
        Prompt::WithdrawAmount {
            wallet,
            to_address,
            max_sun,
        } => View::text(format!(
            "💸 <b>Withdraw from {}</b>\n\nTo: <code>{}</code>\n\nSend the amount in TRX (up to <b>{}</b>).",
            wallet_name(wallet),
            encode_text(to_address),
            format_trx(*max_sun)
        ))
        .with_keyboard(cancel_keyboard(K::Withdrawal, Some(wallet.id))),
        Prompt::InvalidAddress { wallet_id } => {
            View::text("❌ That is not a valid TRON address. Try again.")
                .with_keyboard(cancel_keyboard(K::Withdrawal, Some(*wallet_id)))
        }
        Prompt::SameAddress { wallet_id } => {
            View::text("❌ You cannot withdraw to the same wallet. Send another address.")
                .with_keyboard(cancel_keyboard(K::Withdrawal, Some(*wallet_id)))
        }
        Prompt::InvalidAmount { wallet_id } => View::text(
            "❌ Send a positive amount with at most 6 decimal places, for example <code>1.5</code>.",
        )
        .with_keyboard(cancel_keyboard(K::Withdrawal, Some(*wallet_id))),
        Prompt::InsufficientBalance { wallet_id, max_sun } => View::text(format!(
            "❌ Insufficient balance. You can send at most <b>{} TRX</b> (network fees are reserved).",
            format_trx(*max_sun)
        ))
        .with_keyboard(cancel_keyboard(K::Withdrawal, Some(*wallet_id))),
        Prompt::BalanceTooLow { balance_sun } => View::text(format!(
            "❌ Insufficient funds. Balance <b>{} TRX</b> does not cover the network fee reserve.",
            format_trx(*balance_sun)
        ))
        .with_keyboard(back_keyboard()),
        Prompt::WithdrawSuccess {
            amount_sun,
            to_address,
            transfer_id,
        } => View::text(format!(
            "✅ Sent <b>{} TRX</b> to <code>{}</code>\n\nTransaction: <code>{}</code>",
            format_trx(*amount_sun),
            encode_text(to_address),
            encode_text(transfer_id)
        ))
        .with_keyboard(back_keyboard()),
        Prompt::WithdrawRejected { reason } => View::text(format!(
            "❌ The transfer was rejected: {}",
            encode_text(reason)
        ))
        .with_keyboard(back_keyboard()),

        Prompt::LabelPrompt { wallet } => View::text(format!(
            "✏️ Send a new name for <b>{}</b> (up to {LABEL_MAX_LEN} characters).",
            wallet_name(wallet)
        ))
        .with_keyboard(cancel_keyboard(K::Label, Some(wallet.id))),
        Prompt::LabelEmpty { wallet_id } => View::text("❌ The name cannot be empty. Try again.")
            .with_keyboard(cancel_keyboard(K::Label, Some(*wallet_id))),
        Prompt::LabelTooLong { wallet_id } => View::text(format!(
            "❌ The name is too long, use at most {LABEL_MAX_LEN} characters."
        ))
        .with_keyboard(cancel_keyboard(K::Label, Some(*wallet_id))),
        Prompt::LabelUpdated { label } => View::text(format!(
            "✅ Wallet renamed to <b>{}</b>.",
            encode_text(label)
        ))
        .with_keyboard(back_keyboard()),

        Prompt::DeleteConfirm {
            wallet,
            balance_sun,
        } => View::text(format!(
            "🗑 <b>Delete {}?</b>\n\nBalance: <b>{} TRX</b>\nFunds left on a deleted wallet cannot be recovered.\n\nTo confirm, send: <code>{}</code>",
            wallet_name(wallet),
            format_trx(*balance_sun),
            encode_text(wallet.confirmation_phrase())
        ))
        .with_keyboard(cancel_keyboard(K::Delete, Some(wallet.id))),
        Prompt::WalletDeleted { wallet } => View::text(format!(
            "✅ Wallet <b>{}</b> deleted.",
            wallet_name(wallet)
        ))
        .with_keyboard(back_keyboard()),
        Prompt::DeleteNotConfirmed => {
            View::text("Deletion cancelled: the confirmation did not match.")
                .with_keyboard(back_keyboard())
        }

        Prompt::TwoFactorQr {
            secret,
            provisioning_uri,
        } => View::text(format!(
            "🔐 <b>Two-factor setup</b>\n\nAdd this key to your authenticator app:\n<code>{}</code>\n\nOr open: <code>{}</code>\n\nThen press Next.",
            encode_text(secret),
            encode_text(provisioning_uri)
        ))
        .with_keyboard(InlineKeyboardMarkup::new(vec![
            vec![button("➡️ Next", FlowAction::TwoFactorNext, None)],
            vec![button("❌ Cancel", FlowAction::cancel(K::Enable2fa, None), None)],
        ])),
        Prompt::TwoFactorVerify => View::text(format!(
            "🔐 Send the {OTP_DIGITS}-digit code from your authenticator app."
        ))
        .with_keyboard(cancel_keyboard(K::Enable2fa, None)),
        Prompt::InvalidCodeFormat(kind) => View::text(format!(
            "❌ The code must be exactly {OTP_DIGITS} digits."
        ))
        .with_keyboard(cancel_keyboard(*kind, None)),
        Prompt::InvalidCode(kind) => View::text("❌ Invalid code. Try again.")
            .with_keyboard(cancel_keyboard(*kind, None)),
        Prompt::TwoFactorEnabled => {
            View::text("✅ Two-factor authentication enabled.").with_keyboard(back_keyboard())
        }
        Prompt::TwoFactorAlreadyEnabled => {
            View::text("Two-factor authentication is already enabled.")
                .with_keyboard(back_keyboard())
        }
        Prompt::TwoFactorDisablePrompt => View::text(format!(
            "🔓 Send a {OTP_DIGITS}-digit code to disable two-factor authentication."
        ))
        .with_keyboard(cancel_keyboard(K::Disable2fa, None)),
        Prompt::TwoFactorDisabled => {
            View::text("✅ Two-factor authentication disabled.").with_keyboard(back_keyboard())
        }
        Prompt::TwoFactorNotEnabled => {
            View::text("Two-factor authentication is not enabled.").with_keyboard(back_keyboard())
        }

        Prompt::Cancelled(kind) => {
            View::text(format!("{} cancelled.", flow_name(*kind))).with_keyboard(back_keyboard())
        }
        Prompt::NothingToCancel => {
            View::text("There is nothing to cancel.").with_keyboard(back_keyboard())
        }
        Prompt::AccessDenied => {
            View::text("⛔ This wallet is not available.").with_keyboard(back_keyboard())
        }
        Prompt::ServiceUnavailable => {
            View::text("⚠️ Service temporarily unavailable. Please try again later.")
                .with_keyboard(back_keyboard())
        }
        Prompt::RestartRequired => View::text(
            "⚠️ Your previous action could not be restored. Please start again.",
        )
        .with_keyboard(back_keyboard()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    fn callbacks(view: &View) -> Vec<String> {
        view.keyboard
            .iter()
            .flat_map(|k| k.inline_keyboard.iter().flatten())
            .filter_map(|b| match &b.kind {
                InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    fn wallet(label: &str) -> WalletSnapshot {
        WalletSnapshot {
            id: 4,
            user_id: 1,
            address: "TFyBPFdoS9tzSBcATFtiLKJrn7GeNrA5mt".to_string(),
            label: Some(label.to_string()),
        }
    }

    #[test]
    fn test_labels_are_escaped() {
        let view = render(&Prompt::LabelPrompt {
            wallet: wallet("<b>x</b>"),
        });
        assert!(view.text.contains("&lt;b&gt;x&lt;/b&gt;"));
        assert_eq!(callbacks(&view), vec!["cancel_change_label_4"]);
    }

    #[test]
    fn test_menu_buttons_round_trip() {
        let view = render(&Prompt::MainMenu {
            wallets: vec![wallet("Main")],
            two_factor_enabled: false,
        });
        let data = callbacks(&view);
        assert_eq!(
            data,
            vec![
                "withdraw_4",
                "change_label_wallet_4",
                "delete_wallet_4",
                "enable_two_factor_auth"
            ]
        );
        assert!(data.iter().all(|d| FlowAction::parse(d).is_some()));
    }

    #[test]
    fn test_amounts_render_as_trx() {
        let view = render(&Prompt::InsufficientBalance {
            wallet_id: 4,
            max_sun: 8_000_000,
        });
        assert!(view.text.contains("<b>8 TRX</b>"));
    }
}
