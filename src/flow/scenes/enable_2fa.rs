use crate::flow::action::FlowAction;
use crate::flow::context::SceneContext;
use crate::flow::error::FlowError;
use crate::flow::prompt::Prompt;
use crate::flow::registry::{Entry, Scene};
use crate::flow::state::{EnableTwoFactorState, FlowKind, FlowState, TwoFactorStep};
use crate::services::otp::is_code_format;
use async_trait::async_trait;
use tracing::info;

const KIND: FlowKind = FlowKind::Enable2fa;

/// QR → VERIFY → activated
pub struct EnableTwoFactorScene;

fn prompt_for(ctx: &SceneContext<'_>, state: &EnableTwoFactorState) -> Prompt {
    match state.step {
        TwoFactorStep::Qr => Prompt::TwoFactorQr {
            secret: state.secret.clone(),
            provisioning_uri: ctx
                .services
                .otp
                .provisioning_uri(&state.secret, &ctx.user_id.to_string()),
        },
        TwoFactorStep::Verify => Prompt::TwoFactorVerify,
    }
}

fn current(ctx: &SceneContext<'_>) -> Result<EnableTwoFactorState, FlowError> {
    match ctx.expect_state(KIND)? {
        FlowState::Enable2fa(state) => Ok(state),
        other => Err(FlowError::CorruptState(format!("{:?}", other.kind()))),
    }
}

#[async_trait]
impl Scene for EnableTwoFactorScene {
    fn kind(&self) -> FlowKind {
        KIND
    }

    async fn enter(&self, ctx: &mut SceneContext<'_>, entry: Entry) -> Result<(), FlowError> {
        let state = match entry {
            Entry::Fresh { .. } => {
                let existing = ctx.services.two_factor.get_two_factor(ctx.user_id).await?;
                if existing.is_some_and(|record| record.enabled) {
                    ctx.finish(KIND).await?;
                    ctx.reply(Prompt::TwoFactorAlreadyEnabled);
                    return Ok(());
                }

                let secret = ctx.services.otp.generate_secret();
                ctx.services
                    .two_factor
                    .store_pending_secret(ctx.user_id, &secret)
                    .await?;
                let state = EnableTwoFactorState {
                    secret,
                    step: TwoFactorStep::Qr,
                };
                ctx.checkpoint(FlowState::Enable2fa(state.clone())).await?;
                state
            }
            Entry::Resume(FlowState::Enable2fa(state)) => {
                ctx.adopt(FlowState::Enable2fa(state.clone()));
                state
            }
            Entry::Resume(other) => {
                return Err(FlowError::CorruptState(format!(
                    "{} snapshot offered to enable2fa",
                    other.kind()
                )))
            }
        };
        let prompt = prompt_for(ctx, &state);
        ctx.reply(prompt);
        Ok(())
    }

    async fn on_text(&self, ctx: &mut SceneContext<'_>, text: &str) -> Result<(), FlowError> {
        let state = current(ctx)?;
        if state.step == TwoFactorStep::Qr {
            let prompt = prompt_for(ctx, &state);
            ctx.reply(prompt);
            return Ok(());
        }

        let code = text.trim();
        if !is_code_format(code) {
            ctx.reply(Prompt::InvalidCodeFormat(KIND));
            return Ok(());
        }
        if !ctx.services.otp.verify(&state.secret, code)? {
            ctx.reply(Prompt::InvalidCode(KIND));
            return Ok(());
        }

        ctx.services
            .two_factor
            .activate_secret(ctx.user_id, &state.secret)
            .await?;
        ctx.finish(KIND).await?;

        info!(user_id = ctx.user_id, "Two-factor enabled");
        ctx.reply(Prompt::TwoFactorEnabled);
        Ok(())
    }

    async fn on_action(
        &self,
        ctx: &mut SceneContext<'_>,
        action: FlowAction,
    ) -> Result<bool, FlowError> {
        match action {
            FlowAction::TwoFactorNext => {
                let mut state = current(ctx)?;
                state.step = TwoFactorStep::Verify;
                ctx.checkpoint(FlowState::Enable2fa(state)).await?;
                ctx.reply(Prompt::TwoFactorVerify);
                Ok(true)
            }
            FlowAction::Cancel { kind: KIND, .. } => {
                self.cancel(ctx).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn abort(&self, ctx: &mut SceneContext<'_>) -> Result<(), FlowError> {
        ctx.services
            .two_factor
            .erase_pending_secret(ctx.user_id)
            .await?;
        ctx.finish(KIND).await
    }
}
