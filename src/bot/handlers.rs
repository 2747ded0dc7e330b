use super::resilient::{edit_or_send, send_view_resilient};
use super::views::render;
use crate::flow::{Command, FlowAction, FlowEngine, FlowEvent, Prompt};
use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, ChatId, MessageId};
use teloxide::utils::command::BotCommands;
use tracing::{debug, warn};

/// Supported commands for the bot
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum BotCommand {
    /// Show the wallet menu, leaving any flow in progress
    #[command(description = "Show your wallets.")]
    Start,
}

impl From<BotCommand> for Command {
    fn from(command: BotCommand) -> Self {
        match command {
            BotCommand::Start => Self::Start,
        }
    }
}

/// Sender of a message; `None` for channel posts and anonymous admins,
/// which have no user to keep state for
#[must_use]
pub fn sender_id(msg: &Message) -> Option<i64> {
    msg.from.as_ref().map(|u| u.id.0.cast_signed())
}

async fn deliver(bot: &Bot, chat_id: ChatId, replies: &[Prompt]) {
    for prompt in replies {
        if let Err(e) = send_view_resilient(bot, chat_id, &render(prompt)).await {
            warn!(chat_id = chat_id.0, "Failed to deliver reply: {e}");
        }
    }
}

/// Handle a bot command
///
/// # Errors
///
/// Never fails; delivery errors are logged.
pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: BotCommand,
    engine: Arc<FlowEngine>,
) -> Result<()> {
    let Some(user_id) = sender_id(&msg) else {
        debug!(chat_id = msg.chat.id.0, "Command without sender skipped");
        return Ok(());
    };
    let replies = engine
        .handle(user_id, FlowEvent::Command(cmd.into()))
        .await;
    deliver(&bot, msg.chat.id, &replies).await;
    Ok(())
}

/// Handle a plain text message
///
/// # Errors
///
/// Never fails; delivery errors are logged.
pub async fn handle_text(bot: Bot, msg: Message, engine: Arc<FlowEngine>) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(user_id) = sender_id(&msg) else {
        debug!(chat_id = msg.chat.id.0, "Message without sender skipped");
        return Ok(());
    };
    let replies = engine
        .handle(user_id, FlowEvent::Text(text.to_string()))
        .await;
    deliver(&bot, msg.chat.id, &replies).await;
    Ok(())
}

/// Handle an inline button press.
///
/// The first reply replaces the message that carried the button; the rest
/// are sent as new messages.
///
/// # Errors
///
/// Returns an error if the callback carries no message to answer in.
pub async fn handle_callback(bot: Bot, q: CallbackQuery, engine: Arc<FlowEngine>) -> Result<()> {
    let _ = bot.answer_callback_query(q.id.clone()).await;

    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    let Some(action) = FlowAction::parse(data) else {
        debug!(data, "Unknown callback data");
        return Ok(());
    };

    let user_id = q.from.id.0.cast_signed();
    let (chat_id, msg_id): (ChatId, MessageId) = q
        .message
        .as_ref()
        .map(|msg| (msg.chat().id, msg.id()))
        .ok_or_else(|| anyhow::anyhow!("Callback message missing chat id"))?;

    let replies = engine.handle(user_id, FlowEvent::Action(action)).await;
    let Some((first, rest)) = replies.split_first() else {
        return Ok(());
    };
    if !edit_or_send(&bot, chat_id, msg_id, &render(first)).await {
        warn!(user_id, "Callback reply was not delivered");
    }
    deliver(&bot, chat_id, rest).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(value: serde_json::Value) -> Result<Message, serde_json::Error> {
        serde_json::from_value(value)
    }

    #[test]
    fn test_sender_id_of_private_message() -> Result<(), serde_json::Error> {
        let msg = message(json!({
            "message_id": 1,
            "date": 1_700_000_000,
            "chat": {"id": 42, "type": "private", "first_name": "Ann"},
            "from": {"id": 42, "is_bot": false, "first_name": "Ann"},
            "text": "hi"
        }))?;
        assert_eq!(sender_id(&msg), Some(42));
        Ok(())
    }

    #[test]
    fn test_channel_post_has_no_sender() -> Result<(), serde_json::Error> {
        let msg = message(json!({
            "message_id": 2,
            "date": 1_700_000_000,
            "chat": {"id": -1_001_234_567_890_i64, "type": "channel", "title": "News"},
            "text": "hi"
        }))?;
        assert_eq!(sender_id(&msg), None);
        Ok(())
    }
}
