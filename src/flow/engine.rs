use super::action::{FlowAction, FlowEvent};
use super::context::{SceneContext, Services};
use super::error::FlowError;
use super::locks::UserLocks;
use super::prompt::Prompt;
use super::registry::{scene, Entry};
use super::restore::RestorationCoordinator;
use super::state::{FlowKind, Session};
use crate::rate_limit::{Admission, RateLimiter};
use crate::storage::StorageError;
use tracing::{debug, error, instrument, warn};

/// A failed step and the flow it belonged to
struct Failure {
    kind: Option<FlowKind>,
    error: FlowError,
}

impl Failure {
    fn flow(kind: FlowKind, error: FlowError) -> Self {
        Self {
            kind: Some(kind),
            error,
        }
    }

    fn idle(error: FlowError) -> Self {
        Self { kind: None, error }
    }
}

/// Routes inbound events through admission, the user's exclusive section,
/// restoration and the scenes
pub struct FlowEngine {
    services: Services,
    limiter: RateLimiter,
    locks: UserLocks,
}

impl FlowEngine {
    /// Engine over `services`, gated by `limiter`
    #[must_use]
    pub fn new(services: Services, limiter: RateLimiter) -> Self {
        Self {
            services,
            limiter,
            locks: UserLocks::new(),
        }
    }

    /// Handle one event and return the replies to show, in order
    pub async fn handle(&self, user_id: i64, event: FlowEvent) -> Vec<Prompt> {
        match self.limiter.admit(user_id) {
            Admission::Allowed => self.handle_admitted(user_id, event).await,
            Admission::Blocked => vec![Prompt::SlowDown],
            Admission::Throttled => vec![Prompt::TooManyRequests],
        }
    }

    #[instrument(skip(self, event))]
    async fn handle_admitted(&self, user_id: i64, event: FlowEvent) -> Vec<Prompt> {
        let _section = self.locks.acquire(user_id).await;

        let mut session = match self.services.sessions.load_session(user_id).await {
            Ok(Some(session)) => session,
            Ok(None) => Session::new(user_id),
            Err(e) => {
                warn!(error = %e, "Unreadable session, starting fresh");
                Session::new(user_id)
            }
        };

        let mut ctx = SceneContext::new(user_id, &self.services, &mut session);
        if let Err(failure) = self.process(&mut ctx, event).await {
            self.recover(&mut ctx, failure).await;
        }
        let replies = ctx.into_replies();

        session.touch();
        if let Err(e) = self.services.sessions.save_session(&session).await {
            error!(error = %e, "Failed to save session");
        }
        replies
    }

    async fn process(&self, ctx: &mut SceneContext<'_>, event: FlowEvent) -> Result<(), Failure> {
        if event.is_fresh_start() {
            self.abandon_active(ctx).await;
            return match event {
                FlowEvent::Action(FlowAction::Start { kind, wallet_id }) => scene(kind)
                    .enter(ctx, Entry::Fresh { wallet_id })
                    .await
                    .map_err(|e| Failure::flow(kind, e)),
                _ => self.show_menu(ctx).await.map_err(Failure::idle),
            };
        }

        if let Some(mut active) = ctx.session.active.take() {
            RestorationCoordinator::reconcile(
                self.services.pending.as_ref(),
                ctx.user_id,
                &mut active,
            )
            .await;
            let kind = active.kind();
            ctx.session.active = Some(active);
            return self
                .dispatch(ctx, kind, event)
                .await
                .map_err(|e| Failure::flow(kind, e));
        }

        if let FlowEvent::Action(FlowAction::Cancel { kind, wallet_id }) = event {
            return self
                .cancel_inactive(ctx, kind, wallet_id)
                .await
                .map_err(|e| Failure::flow(kind, e));
        }

        let selected =
            RestorationCoordinator::select(self.services.pending.as_ref(), ctx.user_id)
                .await
                .map_err(Failure::idle)?;
        match selected {
            Some(state) => {
                let kind = state.kind();
                scene(kind)
                    .enter(ctx, Entry::Resume(state))
                    .await
                    .map_err(|e| Failure::flow(kind, e))
            }
            None => self.show_menu(ctx).await.map_err(Failure::idle),
        }
    }

    async fn dispatch(
        &self,
        ctx: &mut SceneContext<'_>,
        kind: FlowKind,
        event: FlowEvent,
    ) -> Result<(), FlowError> {
        let scene = scene(kind);
        match event {
            FlowEvent::Text(text) => scene.on_text(ctx, &text).await,
            FlowEvent::Action(action) => {
                if scene.on_action(ctx, action).await? {
                    return Ok(());
                }
                match action {
                    FlowAction::Cancel { kind, wallet_id } => {
                        self.cancel_inactive(ctx, kind, wallet_id).await
                    }
                    _ => {
                        debug!(flow = %kind, ?action, "Action ignored by active flow");
                        Ok(())
                    }
                }
            }
            FlowEvent::Command(command) => {
                debug!(flow = %kind, ?command, "Command ignored by active flow");
                Ok(())
            }
        }
    }

    /// Cancel button of a flow that is not active
    async fn cancel_inactive(
        &self,
        ctx: &mut SceneContext<'_>,
        kind: FlowKind,
        wallet_id: Option<i64>,
    ) -> Result<(), FlowError> {
        match self.services.pending.get_pending(ctx.user_id, kind).await {
            Ok(Some(state)) if !state.matches_wallet(wallet_id) => {
                debug!(
                    user_id = ctx.user_id,
                    flow = %kind,
                    ?wallet_id,
                    "Stale cancel button ignored"
                );
                ctx.reply(Prompt::NothingToCancel);
                Ok(())
            }
            Ok(Some(_)) | Err(StorageError::Corrupt(_)) => scene(kind).cancel(ctx).await,
            Ok(None) => {
                ctx.reply(Prompt::NothingToCancel);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn abandon_active(&self, ctx: &mut SceneContext<'_>) {
        let Some(kind) = ctx.session.active_flow() else {
            return;
        };
        debug!(user_id = ctx.user_id, flow = %kind, "Abandoning active flow");
        if let Err(e) = scene(kind).abort(ctx).await {
            warn!(user_id = ctx.user_id, flow = %kind, error = %e, "Failed to abandon flow");
            ctx.session.active = None;
        }
    }

    async fn show_menu(&self, ctx: &mut SceneContext<'_>) -> Result<(), FlowError> {
        let wallets = self
            .services
            .wallets
            .list_wallets(ctx.user_id)
            .await?
            .iter()
            .map(|w| w.snapshot())
            .collect();
        let two_factor_enabled = self
            .services
            .two_factor
            .get_two_factor(ctx.user_id)
            .await?
            .is_some_and(|r| r.enabled);

        ctx.reply(Prompt::MainMenu {
            wallets,
            two_factor_enabled,
        });
        Ok(())
    }

    /// Error boundary: log, leave the flow, drop its snapshot, reply safely
    async fn recover(&self, ctx: &mut SceneContext<'_>, failure: Failure) {
        let Failure { kind, error } = failure;
        let flow = kind.map(FlowKind::as_str);
        match &error {
            FlowError::Ownership { wallet_id } => {
                warn!(user_id = ctx.user_id, flow, wallet_id, "Wallet access refused");
            }
            other => error!(user_id = ctx.user_id, flow, error = %other, "Flow step failed"),
        }

        if let Some(kind) = kind {
            if let Err(e) = scene(kind).abort(ctx).await {
                warn!(user_id = ctx.user_id, flow = %kind, error = %e, "Cleanup after failure failed");
                if ctx.session.active_flow() == Some(kind) {
                    ctx.session.active = None;
                }
            }
        }
        ctx.reply(error.prompt());
    }
}
