use super::error::FlowError;
use super::prompt::Prompt;
use super::state::{FlowKind, FlowState, Session};
use crate::services::{LedgerService, OtpService, TwoFactorStore, WalletDirectory, WalletRecord};
use crate::storage::{PendingStateStore, SessionStore};
use std::sync::Arc;
use tracing::debug;

/// Collaborators shared by every scene
#[derive(Clone)]
pub struct Services {
    /// Session records
    pub sessions: Arc<dyn SessionStore>,
    /// Suspended flow snapshots
    pub pending: Arc<dyn PendingStateStore>,
    /// Wallet records
    pub wallets: Arc<dyn WalletDirectory>,
    /// Two-factor records
    pub two_factor: Arc<dyn TwoFactorStore>,
    /// Balances and transfers
    pub ledger: Arc<dyn LedgerService>,
    /// One-time codes
    pub otp: Arc<dyn OtpService>,
}

impl Services {
    /// Wire every store to one backend
    pub fn with_storage<S>(
        storage: Arc<S>,
        ledger: Arc<dyn LedgerService>,
        otp: Arc<dyn OtpService>,
    ) -> Self
    where
        S: SessionStore + PendingStateStore + WalletDirectory + TwoFactorStore + 'static,
    {
        Self {
            sessions: storage.clone(),
            pending: storage.clone(),
            wallets: storage.clone(),
            two_factor: storage,
            ledger,
            otp,
        }
    }
}

/// Working context of one event inside the user's exclusive section
pub struct SceneContext<'a> {
    /// User the event belongs to
    pub user_id: i64,
    /// Collaborators
    pub services: &'a Services,
    /// Loaded session, saved by the engine after the event
    pub session: &'a mut Session,
    replies: Vec<Prompt>,
}

impl<'a> SceneContext<'a> {
    /// Context for one event
    pub fn new(user_id: i64, services: &'a Services, session: &'a mut Session) -> Self {
        Self {
            user_id,
            services,
            session,
            replies: Vec::new(),
        }
    }

    /// Queue a reply
    pub fn reply(&mut self, prompt: Prompt) {
        self.replies.push(prompt);
    }

    /// Replies queued so far
    #[must_use]
    pub fn into_replies(self) -> Vec<Prompt> {
        self.replies
    }

    /// Working state of the active flow
    #[must_use]
    pub fn active(&self) -> Option<&FlowState> {
        self.session.active.as_ref()
    }

    /// Persist `state` as the pending snapshot and make it the active state
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub async fn checkpoint(&mut self, state: FlowState) -> Result<(), FlowError> {
        self.services.pending.set_pending(self.user_id, &state).await?;
        self.session.active = Some(state);
        Ok(())
    }

    /// Make `state` active without writing it (it was just read from storage)
    pub fn adopt(&mut self, state: FlowState) {
        self.session.active = Some(state);
    }

    /// End flow `kind`: leave it and drop its pending snapshot
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be removed.
    pub async fn finish(&mut self, kind: FlowKind) -> Result<(), FlowError> {
        if self.session.active_flow() == Some(kind) {
            self.session.active = None;
        }
        let cleared = self.services.pending.clear_pending(self.user_id, kind).await?;
        debug!(user_id = self.user_id, flow = %kind, cleared, "Flow finished");
        Ok(())
    }

    /// Fresh lookup of a wallet the user must own
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Ownership`] if the wallet is gone or belongs to
    /// someone else.
    pub async fn owned_wallet(&self, wallet_id: i64) -> Result<WalletRecord, FlowError> {
        match self.services.wallets.get_wallet(wallet_id).await? {
            Some(wallet) if wallet.is_owned_by(self.user_id) => Ok(wallet),
            _ => Err(FlowError::Ownership { wallet_id }),
        }
    }

    /// State of the active flow, which must be `kind`
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::CorruptState`] if another flow or none is active.
    pub fn expect_state(&self, kind: FlowKind) -> Result<FlowState, FlowError> {
        match self.active() {
            Some(state) if state.kind() == kind => Ok(state.clone()),
            other => Err(FlowError::CorruptState(format!(
                "expected {kind}, found {:?}",
                other.map(FlowState::kind)
            ))),
        }
    }
}
