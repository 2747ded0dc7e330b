use super::{require_wallet_id, revalidate_snapshot};
use crate::config::LABEL_MAX_LEN;
use crate::flow::context::SceneContext;
use crate::flow::error::FlowError;
use crate::flow::prompt::Prompt;
use crate::flow::registry::{Entry, Scene};
use crate::flow::state::{FlowKind, FlowState, LabelState};
use crate::utils::{grapheme_len, truncate_graphemes};
use async_trait::async_trait;
use tracing::info;

const KIND: FlowKind = FlowKind::Label;

/// Why a label was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelRejection {
    /// Nothing left after normalization
    Empty,
    /// Input longer than [`LABEL_MAX_LEN`]
    TooLong,
}

/// Trims, removes control characters (tabs and newlines included), collapses
/// the remaining whitespace runs to one space and truncates to
/// [`LABEL_MAX_LEN`] characters
///
/// # Examples
///
/// ```
/// use tron_wallet_bot::flow::scenes::label::normalize_label;
/// assert_eq!(normalize_label("  My   Wallet!!\n"), "My Wallet!!");
/// assert_eq!(normalize_label("My\tWallet"), "MyWallet");
/// ```
#[must_use]
pub fn normalize_label(input: &str) -> String {
    let visible: String = input.trim().chars().filter(|c| !c.is_control()).collect();
    let collapsed = visible.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_graphemes(&collapsed, LABEL_MAX_LEN).trim_end().to_string()
}

/// Validate and normalize user input for a label
///
/// # Errors
///
/// Returns the reason the input cannot be used.
pub fn validate_label(input: &str) -> Result<String, LabelRejection> {
    if grapheme_len(input.trim()) > LABEL_MAX_LEN {
        return Err(LabelRejection::TooLong);
    }
    let label = normalize_label(input);
    if label.is_empty() {
        return Err(LabelRejection::Empty);
    }
    Ok(label)
}

/// Single step: wait for the new label
pub struct LabelScene;

fn current(ctx: &SceneContext<'_>) -> Result<LabelState, FlowError> {
    match ctx.expect_state(KIND)? {
        FlowState::Label(state) => Ok(state),
        other => Err(FlowError::CorruptState(format!("{:?}", other.kind()))),
    }
}

#[async_trait]
impl Scene for LabelScene {
    fn kind(&self) -> FlowKind {
        KIND
    }

    async fn enter(&self, ctx: &mut SceneContext<'_>, entry: Entry) -> Result<(), FlowError> {
        let state = match entry {
            Entry::Fresh { wallet_id } => {
                let wallet = ctx.owned_wallet(require_wallet_id(wallet_id)?).await?;
                let state = LabelState {
                    wallet: wallet.snapshot(),
                };
                ctx.checkpoint(FlowState::Label(state.clone())).await?;
                state
            }
            Entry::Resume(FlowState::Label(state)) => {
                revalidate_snapshot(ctx, &state.wallet).await?;
                ctx.adopt(FlowState::Label(state.clone()));
                state
            }
            Entry::Resume(other) => {
                return Err(FlowError::CorruptState(format!(
                    "{} snapshot offered to label",
                    other.kind()
                )))
            }
        };
        ctx.reply(Prompt::LabelPrompt {
            wallet: state.wallet,
        });
        Ok(())
    }

    async fn on_text(&self, ctx: &mut SceneContext<'_>, text: &str) -> Result<(), FlowError> {
        let state = current(ctx)?;
        let wallet_id = state.wallet.id;

        let label = match validate_label(text) {
            Ok(label) => label,
            Err(LabelRejection::Empty) => {
                ctx.reply(Prompt::LabelEmpty { wallet_id });
                return Ok(());
            }
            Err(LabelRejection::TooLong) => {
                ctx.reply(Prompt::LabelTooLong { wallet_id });
                return Ok(());
            }
        };

        ctx.owned_wallet(wallet_id).await?;
        if !ctx.services.wallets.update_label(wallet_id, &label).await? {
            return Err(FlowError::Ownership { wallet_id });
        }
        ctx.finish(KIND).await?;

        info!(user_id = ctx.user_id, wallet_id, "Wallet label updated");
        ctx.reply(Prompt::LabelUpdated { label });
        Ok(())
    }
}
