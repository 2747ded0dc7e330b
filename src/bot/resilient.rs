//! Message delivery with automatic retry for Telegram API operations.
//!
//! Transient network failures are retried with exponential backoff and
//! jitter. Delivery is best effort: the flow state has already been saved
//! when these run.

use super::views::View;
use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Message, MessageId, ParseMode};
use tracing::{debug, warn};

/// Telegram rejects longer messages
const MAX_MESSAGE_CHARS: usize = 4000;

fn bounded_text(text: &str) -> String {
    if text.chars().count() > MAX_MESSAGE_CHARS {
        format!("{}…", crate::utils::truncate_str(text, MAX_MESSAGE_CHARS))
    } else {
        text.to_string()
    }
}

/// Send a rendered view with automatic retry on network failures.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn send_view_resilient(bot: &Bot, chat_id: ChatId, view: &View) -> Result<Message> {
    let text = bounded_text(&view.text);
    crate::utils::retry_telegram_operation(|| async {
        let mut req = bot
            .send_message(chat_id, text.clone())
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = &view.keyboard {
            req = req.reply_markup(keyboard.clone());
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Edit a message into a rendered view with automatic retry.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn edit_view_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    view: &View,
) -> Result<Message> {
    let text = bounded_text(&view.text);
    crate::utils::retry_telegram_operation(|| async {
        let mut req = bot
            .edit_message_text(chat_id, msg_id, text.clone())
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = &view.keyboard {
            req = req.reply_markup(keyboard.clone());
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram edit error: {e}"))
    })
    .await
}

/// Edit a message into `view`, falling back to a new message when the
/// original cannot be edited.
///
/// Returns `false` only if nothing could be delivered.
pub async fn edit_or_send(bot: &Bot, chat_id: ChatId, msg_id: MessageId, view: &View) -> bool {
    const ERROR_NOT_MODIFIED: &str = "message is not modified";

    match edit_view_resilient(bot, chat_id, msg_id, view).await {
        Ok(_) => true,
        Err(e) if e.to_string().contains(ERROR_NOT_MODIFIED) => {
            debug!("Message update skipped: {e}");
            true
        }
        Err(e) => {
            debug!("Edit failed, sending instead: {e}");
            match send_view_resilient(bot, chat_id, view).await {
                Ok(_) => true,
                Err(e) => {
                    warn!("Failed to deliver message after retries: {e}");
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_text_is_bounded() {
        let long = "x".repeat(MAX_MESSAGE_CHARS + 10);
        assert_eq!(bounded_text(&long).chars().count(), MAX_MESSAGE_CHARS + 1);
        assert_eq!(bounded_text("short"), "short");
    }
}
