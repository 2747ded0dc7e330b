use super::{PendingStateStore, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What a sweeper removes and how often
#[derive(Debug, Clone, Copy)]
pub struct SweepPolicy {
    /// Maximum age of a pending flow snapshot
    pub pending_ttl: Duration,
    /// Maximum age of a session
    pub session_ttl: Duration,
    /// Time between sweeps
    pub interval: Duration,
}

/// Removes expired pending snapshots and sessions once.
///
/// A failure of one sweep is logged and does not stop the other.
pub async fn sweep_once(
    sessions: &dyn SessionStore,
    pending: &dyn PendingStateStore,
    policy: SweepPolicy,
) -> (usize, usize) {
    let removed_pending = pending
        .sweep_pending(policy.pending_ttl)
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Pending state sweep failed");
            0
        });
    let removed_sessions = sessions
        .sweep_sessions(policy.session_ttl)
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Session sweep failed");
            0
        });

    if removed_pending > 0 || removed_sessions > 0 {
        info!(removed_pending, removed_sessions, "Expired records swept");
    }
    (removed_pending, removed_sessions)
}

/// Runs [`sweep_once`] immediately and then every `policy.interval` until
/// `token` is cancelled
pub fn spawn_sweeper(
    sessions: Arc<dyn SessionStore>,
    pending: Arc<dyn PendingStateStore>,
    policy: SweepPolicy,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(policy.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = token.cancelled() => {
                    info!("Sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    sweep_once(sessions.as_ref(), pending.as_ref(), policy).await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MockPendingStateStore, MockSessionStore, StorageError};

    fn policy() -> SweepPolicy {
        SweepPolicy {
            pending_ttl: Duration::from_secs(24 * 3600),
            session_ttl: Duration::from_secs(168 * 3600),
            interval: Duration::from_secs(3600),
        }
    }

    #[tokio::test]
    async fn test_session_sweep_runs_after_pending_failure() {
        let mut pending = MockPendingStateStore::new();
        pending
            .expect_sweep_pending()
            .returning(|_| Err(StorageError::S3List("down".to_string())));
        let mut sessions = MockSessionStore::new();
        sessions
            .expect_sweep_sessions()
            .withf(|ttl| *ttl == Duration::from_secs(168 * 3600))
            .times(1)
            .returning(|_| Ok(3));

        assert_eq!(sweep_once(&sessions, &pending, policy()).await, (0, 3));
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_cancel() {
        let mut pending = MockPendingStateStore::new();
        pending.expect_sweep_pending().returning(|_| Ok(0));
        let mut sessions = MockSessionStore::new();
        sessions.expect_sweep_sessions().returning(|_| Ok(0));

        let token = CancellationToken::new();
        let handle = spawn_sweeper(Arc::new(sessions), Arc::new(pending), policy(), token.clone());
        token.cancel();

        assert!(tokio::time::timeout(Duration::from_secs(5), handle).await.is_ok());
    }
}
