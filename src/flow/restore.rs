//! Choosing which suspended flow, if any, to resume

use super::error::FlowError;
use super::state::{FlowKind, FlowState};
use crate::storage::{PendingStateStore, StorageError};
use tracing::{debug, info, warn};

/// Arbitrates between suspended flows of one user
pub struct RestorationCoordinator;

impl RestorationCoordinator {
    /// First resumable snapshot in [`FlowKind::PRIORITY`] order.
    ///
    /// Snapshots that cannot resume (corrupt or structurally incomplete) are
    /// cleared and skipped. Snapshots of lower priority than the selected one
    /// are not touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the store itself fails.
    pub async fn select(
        pending: &dyn PendingStateStore,
        user_id: i64,
    ) -> Result<Option<FlowState>, FlowError> {
        for kind in FlowKind::PRIORITY {
            match pending.get_pending(user_id, kind).await {
                Ok(Some(state)) if state.is_resumable() => {
                    info!(user_id, flow = %kind, "Resuming suspended flow");
                    return Ok(Some(state));
                }
                Ok(Some(_)) => {
                    warn!(user_id, flow = %kind, "Discarding incomplete snapshot");
                    Self::discard(pending, user_id, kind).await;
                }
                Err(StorageError::Corrupt(key)) => {
                    warn!(user_id, flow = %kind, key, "Discarding corrupt snapshot");
                    Self::discard(pending, user_id, kind).await;
                }
                Ok(None) => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(user_id, "No suspended flow to resume");
        Ok(None)
    }

    /// Fill gaps in the active state from its stored snapshot.
    ///
    /// Best effort: a missing or unreadable snapshot leaves `active` as is.
    pub async fn reconcile(pending: &dyn PendingStateStore, user_id: i64, active: &mut FlowState) {
        let kind = active.kind();
        match pending.get_pending(user_id, kind).await {
            Ok(Some(stored)) => {
                if active.merge_missing(&stored) {
                    info!(user_id, flow = %kind, "Active flow reconciled with stored snapshot");
                }
            }
            Ok(None) => {}
            Err(e) => debug!(user_id, flow = %kind, error = %e, "Reconcile skipped"),
        }
    }

    async fn discard(pending: &dyn PendingStateStore, user_id: i64, kind: FlowKind) {
        if let Err(e) = pending.clear_pending(user_id, kind).await {
            warn!(user_id, flow = %kind, error = %e, "Failed to clear snapshot");
        }
    }
}
