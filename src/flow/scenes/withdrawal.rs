use super::{require_wallet_id, revalidate_snapshot};
use crate::config::FEE_RESERVE_SUN;
use crate::flow::context::SceneContext;
use crate::flow::error::FlowError;
use crate::flow::prompt::Prompt;
use crate::flow::registry::{Entry, Scene};
use crate::flow::state::{FlowKind, FlowState, WithdrawalState, WithdrawalStep};
use crate::services::TransferOutcome;
use crate::utils::parse_trx_amount;
use async_trait::async_trait;
use tracing::{info, warn};

const KIND: FlowKind = FlowKind::Withdrawal;

/// ADDRESS → AMOUNT → transfer
pub struct WithdrawalScene;

/// Largest amount that can leave a wallet holding `balance_sun`
#[must_use]
pub const fn max_withdrawable(balance_sun: u64) -> u64 {
    balance_sun.saturating_sub(FEE_RESERVE_SUN)
}

fn prompt_for(state: &WithdrawalState) -> Prompt {
    let max_sun = max_withdrawable(state.balance_sun);
    match (state.step, &state.to_address) {
        (WithdrawalStep::Amount, Some(to_address)) => Prompt::WithdrawAmount {
            wallet: state.wallet.clone(),
            to_address: to_address.clone(),
            max_sun,
        },
        _ => Prompt::WithdrawAddress {
            wallet: state.wallet.clone(),
            balance_sun: state.balance_sun,
            max_sun,
        },
    }
}

fn current(ctx: &SceneContext<'_>) -> Result<WithdrawalState, FlowError> {
    match ctx.expect_state(KIND)? {
        FlowState::Withdrawal(state) => Ok(state),
        other => Err(FlowError::CorruptState(format!("{:?}", other.kind()))),
    }
}

impl WithdrawalScene {
    async fn on_address(
        ctx: &mut SceneContext<'_>,
        mut state: WithdrawalState,
        input: &str,
    ) -> Result<(), FlowError> {
        let wallet_id = state.wallet.id;
        if input.eq_ignore_ascii_case(&state.wallet.address) {
            ctx.reply(Prompt::SameAddress { wallet_id });
            return Ok(());
        }
        if !ctx.services.ledger.validate_address(input) {
            ctx.reply(Prompt::InvalidAddress { wallet_id });
            return Ok(());
        }

        state.to_address = Some(input.to_string());
        state.step = WithdrawalStep::Amount;
        let prompt = prompt_for(&state);
        ctx.checkpoint(FlowState::Withdrawal(state)).await?;
        ctx.reply(prompt);
        Ok(())
    }

    async fn on_amount(
        ctx: &mut SceneContext<'_>,
        state: WithdrawalState,
        input: &str,
    ) -> Result<(), FlowError> {
        let wallet_id = state.wallet.id;
        let max_sun = max_withdrawable(state.balance_sun);
        let amount_sun = match parse_trx_amount(input) {
            Some(amount) if amount > 0 => amount,
            _ => {
                ctx.reply(Prompt::InvalidAmount { wallet_id });
                return Ok(());
            }
        };
        if amount_sun > max_sun {
            ctx.reply(Prompt::InsufficientBalance { wallet_id, max_sun });
            return Ok(());
        }

        let to_address = state
            .to_address
            .ok_or_else(|| FlowError::CorruptState("amount step without destination".into()))?;
        // The snapshot never holds the signing secret
        let wallet = ctx.owned_wallet(wallet_id).await?;

        // Past this point a crash must not resume into a second transfer
        ctx.finish(KIND).await?;

        let outcome = ctx
            .services
            .ledger
            .send_transfer(&wallet.private_key, &to_address, amount_sun)
            .await?;

        match outcome {
            TransferOutcome::Sent { transfer_id } => {
                info!(
                    user_id = ctx.user_id,
                    wallet_id,
                    amount_sun,
                    transfer_id = %transfer_id,
                    "Withdrawal sent"
                );
                ctx.reply(Prompt::WithdrawSuccess {
                    amount_sun,
                    to_address,
                    transfer_id,
                });
            }
            TransferOutcome::Rejected { reason } => {
                warn!(user_id = ctx.user_id, wallet_id, reason = %reason, "Withdrawal rejected");
                ctx.reply(Prompt::WithdrawRejected { reason });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Scene for WithdrawalScene {
    fn kind(&self) -> FlowKind {
        KIND
    }

    async fn enter(&self, ctx: &mut SceneContext<'_>, entry: Entry) -> Result<(), FlowError> {
        match entry {
            Entry::Fresh { wallet_id } => {
                let wallet = ctx.owned_wallet(require_wallet_id(wallet_id)?).await?;
                let balance_sun = ctx.services.ledger.get_balance(&wallet.address).await?;

                if max_withdrawable(balance_sun) == 0 {
                    ctx.finish(KIND).await?;
                    ctx.reply(Prompt::BalanceTooLow { balance_sun });
                    return Ok(());
                }

                let state = WithdrawalState {
                    step: WithdrawalStep::Address,
                    wallet: wallet.snapshot(),
                    balance_sun,
                    to_address: None,
                };
                let prompt = prompt_for(&state);
                ctx.checkpoint(FlowState::Withdrawal(state)).await?;
                ctx.reply(prompt);
            }
            Entry::Resume(FlowState::Withdrawal(state)) => {
                revalidate_snapshot(ctx, &state.wallet).await?;
                let prompt = prompt_for(&state);
                ctx.adopt(FlowState::Withdrawal(state));
                ctx.reply(prompt);
            }
            Entry::Resume(other) => {
                return Err(FlowError::CorruptState(format!(
                    "{} snapshot offered to withdrawal",
                    other.kind()
                )))
            }
        }
        Ok(())
    }

    async fn on_text(&self, ctx: &mut SceneContext<'_>, text: &str) -> Result<(), FlowError> {
        let state = current(ctx)?;
        let input = text.trim();
        match state.step {
            WithdrawalStep::Address => Self::on_address(ctx, state, input).await,
            WithdrawalStep::Amount => Self::on_amount(ctx, state, input).await,
        }
    }
}
