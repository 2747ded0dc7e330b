//! Static mapping from flow kind to its handler set

use super::action::FlowAction;
use super::context::SceneContext;
use super::error::FlowError;
use super::prompt::Prompt;
use super::scenes::{
    delete::DeleteScene, disable_2fa::DisableTwoFactorScene, enable_2fa::EnableTwoFactorScene,
    label::LabelScene, withdrawal::WithdrawalScene,
};
use super::state::{FlowKind, FlowState};
use async_trait::async_trait;
use tracing::debug;

/// How a scene is entered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// From a start action
    Fresh {
        /// Target wallet for wallet flows
        wallet_id: Option<i64>,
    },
    /// From a stored snapshot; re-render only
    Resume(FlowState),
}

/// Handler set of one flow
#[async_trait]
pub trait Scene: Send + Sync {
    /// Flow handled by this scene
    fn kind(&self) -> FlowKind;

    /// Start or resume the flow
    async fn enter(&self, ctx: &mut SceneContext<'_>, entry: Entry) -> Result<(), FlowError>;

    /// Handle free text while the flow is active
    async fn on_text(&self, ctx: &mut SceneContext<'_>, text: &str) -> Result<(), FlowError>;

    /// Handle a button; `false` if the action does not belong to this flow
    async fn on_action(
        &self,
        ctx: &mut SceneContext<'_>,
        action: FlowAction,
    ) -> Result<bool, FlowError> {
        match action {
            FlowAction::Cancel { kind, wallet_id } if kind == self.kind() => {
                if ctx.active().is_some_and(|state| !state.matches_wallet(wallet_id)) {
                    debug!(
                        user_id = ctx.user_id,
                        flow = %kind,
                        ?wallet_id,
                        "Stale cancel button ignored"
                    );
                    return Ok(true);
                }
                self.cancel(ctx).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Leave the flow without a reply, undoing partial setup
    async fn abort(&self, ctx: &mut SceneContext<'_>) -> Result<(), FlowError> {
        ctx.finish(self.kind()).await
    }

    /// User-requested cancel
    async fn cancel(&self, ctx: &mut SceneContext<'_>) -> Result<(), FlowError> {
        self.abort(ctx).await?;
        ctx.reply(Prompt::Cancelled(self.kind()));
        Ok(())
    }
}

static WITHDRAWAL: WithdrawalScene = WithdrawalScene;
static LABEL: LabelScene = LabelScene;
static DELETE: DeleteScene = DeleteScene;
static ENABLE_2FA: EnableTwoFactorScene = EnableTwoFactorScene;
static DISABLE_2FA: DisableTwoFactorScene = DisableTwoFactorScene;

/// Scene handling `kind`
#[must_use]
pub fn scene(kind: FlowKind) -> &'static dyn Scene {
    match kind {
        FlowKind::Withdrawal => &WITHDRAWAL,
        FlowKind::Label => &LABEL,
        FlowKind::Delete => &DELETE,
        FlowKind::Enable2fa => &ENABLE_2FA,
        FlowKind::Disable2fa => &DISABLE_2FA,
    }
}
