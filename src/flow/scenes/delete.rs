use super::{require_wallet_id, revalidate_snapshot};
use crate::flow::context::SceneContext;
use crate::flow::error::FlowError;
use crate::flow::prompt::Prompt;
use crate::flow::registry::{Entry, Scene};
use crate::flow::state::{DeleteState, FlowKind, FlowState};
use crate::services::WalletSnapshot;
use async_trait::async_trait;
use tracing::info;

const KIND: FlowKind = FlowKind::Delete;

/// Single step: wait for the confirmation phrase. Anything else cancels.
pub struct DeleteScene;

/// Whether `input` confirms deletion of `wallet`
#[must_use]
pub fn is_confirmation(wallet: &WalletSnapshot, input: &str) -> bool {
    input.trim().to_lowercase() == wallet.confirmation_phrase().trim().to_lowercase()
}

fn current(ctx: &SceneContext<'_>) -> Result<DeleteState, FlowError> {
    match ctx.expect_state(KIND)? {
        FlowState::Delete(state) => Ok(state),
        other => Err(FlowError::CorruptState(format!("{:?}", other.kind()))),
    }
}

#[async_trait]
impl Scene for DeleteScene {
    fn kind(&self) -> FlowKind {
        KIND
    }

    async fn enter(&self, ctx: &mut SceneContext<'_>, entry: Entry) -> Result<(), FlowError> {
        let state = match entry {
            Entry::Fresh { wallet_id } => {
                let wallet = ctx.owned_wallet(require_wallet_id(wallet_id)?).await?;
                let balance_sun = ctx.services.ledger.get_balance(&wallet.address).await?;
                let state = DeleteState {
                    wallet: wallet.snapshot(),
                    balance_sun,
                };
                ctx.checkpoint(FlowState::Delete(state.clone())).await?;
                state
            }
            Entry::Resume(FlowState::Delete(state)) => {
                revalidate_snapshot(ctx, &state.wallet).await?;
                ctx.adopt(FlowState::Delete(state.clone()));
                state
            }
            Entry::Resume(other) => {
                return Err(FlowError::CorruptState(format!(
                    "{} snapshot offered to delete",
                    other.kind()
                )))
            }
        };
        ctx.reply(Prompt::DeleteConfirm {
            wallet: state.wallet,
            balance_sun: state.balance_sun,
        });
        Ok(())
    }

    async fn on_text(&self, ctx: &mut SceneContext<'_>, text: &str) -> Result<(), FlowError> {
        let state = current(ctx)?;
        let wallet_id = state.wallet.id;

        if !is_confirmation(&state.wallet, text) {
            ctx.finish(KIND).await?;
            ctx.reply(Prompt::DeleteNotConfirmed);
            return Ok(());
        }

        ctx.owned_wallet(wallet_id).await?;
        if !ctx.services.wallets.delete_wallet(wallet_id).await? {
            return Err(FlowError::Ownership { wallet_id });
        }
        ctx.finish(KIND).await?;

        info!(user_id = ctx.user_id, wallet_id, "Wallet deleted");
        ctx.reply(Prompt::WalletDeleted {
            wallet: state.wallet,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(label: Option<&str>) -> WalletSnapshot {
        WalletSnapshot {
            id: 1,
            user_id: 1,
            address: "TFyBPFdoS9tzSBcATFtiLKJrn7GeNrA5mt".to_string(),
            label: label.map(str::to_string),
        }
    }

    #[test]
    fn test_confirmation_is_case_insensitive() {
        let w = wallet(Some("Savings"));
        assert!(is_confirmation(&w, "  savings "));
        assert!(is_confirmation(&w, "SAVINGS"));
        assert!(!is_confirmation(&w, "saving"));
        assert!(!is_confirmation(&w, "yes"));
    }

    #[test]
    fn test_unlabeled_wallet_confirms_with_address() {
        let w = wallet(None);
        assert!(is_confirmation(&w, "TFyBPFdoS9tzSBcATFtiLKJrn7GeNrA5mt"));
        assert!(is_confirmation(&w, "tfybpfdos9tzsbcatftilkjrn7genra5mt"));
        assert!(!is_confirmation(&w, "Unnamed Wallet"));
    }
}
