//! One state machine per flow

/// Wallet deletion
pub mod delete;
/// Two-factor teardown
pub mod disable_2fa;
/// Two-factor setup
pub mod enable_2fa;
/// Wallet label change
pub mod label;
/// Fund withdrawal
pub mod withdrawal;

use super::context::SceneContext;
use super::error::FlowError;
use crate::services::WalletSnapshot;

/// Checks that a stored wallet snapshot still points at a wallet the user
/// owns. The snapshot itself stays the source for display.
pub(crate) async fn revalidate_snapshot(
    ctx: &SceneContext<'_>,
    snapshot: &WalletSnapshot,
) -> Result<(), FlowError> {
    if snapshot.user_id != ctx.user_id {
        return Err(FlowError::Ownership {
            wallet_id: snapshot.id,
        });
    }
    ctx.owned_wallet(snapshot.id).await.map(|_| ())
}

/// Wallet id a wallet flow was started for
pub(crate) fn require_wallet_id(wallet_id: Option<i64>) -> Result<i64, FlowError> {
    wallet_id.ok_or_else(|| FlowError::CorruptState("start action without wallet id".to_string()))
}
