use crate::flow::context::SceneContext;
use crate::flow::error::FlowError;
use crate::flow::prompt::Prompt;
use crate::flow::registry::{Entry, Scene};
use crate::flow::state::{DisableTwoFactorState, FlowKind, FlowState};
use crate::services::otp::is_code_format;
use async_trait::async_trait;
use tracing::info;

const KIND: FlowKind = FlowKind::Disable2fa;

/// Single step: wait for a code from the active secret
pub struct DisableTwoFactorScene;

#[async_trait]
impl Scene for DisableTwoFactorScene {
    fn kind(&self) -> FlowKind {
        KIND
    }

    async fn enter(&self, ctx: &mut SceneContext<'_>, entry: Entry) -> Result<(), FlowError> {
        match entry {
            Entry::Fresh { .. } => {
                let record = ctx.services.two_factor.get_two_factor(ctx.user_id).await?;
                if !record.is_some_and(|r| r.enabled) {
                    ctx.finish(KIND).await?;
                    ctx.reply(Prompt::TwoFactorNotEnabled);
                    return Ok(());
                }
                ctx.checkpoint(FlowState::Disable2fa(DisableTwoFactorState {}))
                    .await?;
            }
            Entry::Resume(state @ FlowState::Disable2fa(_)) => ctx.adopt(state),
            Entry::Resume(other) => {
                return Err(FlowError::CorruptState(format!(
                    "{} snapshot offered to disable2fa",
                    other.kind()
                )))
            }
        }
        ctx.reply(Prompt::TwoFactorDisablePrompt);
        Ok(())
    }

    async fn on_text(&self, ctx: &mut SceneContext<'_>, text: &str) -> Result<(), FlowError> {
        ctx.expect_state(KIND)?;

        let code = text.trim();
        if !is_code_format(code) {
            ctx.reply(Prompt::InvalidCodeFormat(KIND));
            return Ok(());
        }

        let record = match ctx.services.two_factor.get_two_factor(ctx.user_id).await? {
            Some(record) if record.enabled => record,
            _ => {
                ctx.finish(KIND).await?;
                ctx.reply(Prompt::TwoFactorNotEnabled);
                return Ok(());
            }
        };
        if !ctx.services.otp.verify(&record.secret, code)? {
            ctx.reply(Prompt::InvalidCode(KIND));
            return Ok(());
        }

        ctx.services.two_factor.erase_secret(ctx.user_id).await?;
        ctx.finish(KIND).await?;

        info!(user_id = ctx.user_id, "Two-factor disabled");
        ctx.reply(Prompt::TwoFactorDisabled);
        Ok(())
    }
}
