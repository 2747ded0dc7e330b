//! Multi-step conversational flows
//!
//! Every inbound event goes through [`FlowEngine::handle`]: admission by the
//! rate limiter, then the user's exclusive section, where the session is
//! loaded, the event is routed to the active flow (or a suspended one is
//! restored), and the session is saved again.

/// Inbound events and button actions
pub mod action;
/// Per-event working context and shared collaborators
pub mod context;
/// The event engine
pub mod engine;
/// Step failures
pub mod error;
/// Per-user exclusive sections
pub mod locks;
/// Semantic replies
pub mod prompt;
/// Scene trait and the static scene table
pub mod registry;
/// Restoration of suspended flows
pub mod restore;
/// Flow state machines
pub mod scenes;
/// Flow model and session record
pub mod state;

pub use action::{Command, FlowAction, FlowEvent};
pub use context::{SceneContext, Services};
pub use engine::FlowEngine;
pub use error::FlowError;
pub use prompt::Prompt;
pub use state::{
    DeleteState, DisableTwoFactorState, EnableTwoFactorState, FlowKind, FlowState, LabelState,
    PendingRecord, Session, TwoFactorStep, WithdrawalState, WithdrawalStep,
};
