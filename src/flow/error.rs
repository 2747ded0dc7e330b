use super::prompt::Prompt;
use crate::services::{LedgerError, OtpError};
use crate::storage::StorageError;
use thiserror::Error;

/// Failures that end a flow step
///
/// Validation problems are not errors: scenes answer them with a re-prompt.
#[derive(Error, Debug)]
pub enum FlowError {
    /// Wallet missing or owned by another user
    #[error("Wallet {wallet_id} is not accessible")]
    Ownership {
        /// Requested wallet
        wallet_id: i64,
    },
    /// An external collaborator failed
    #[error("Service error: {0}")]
    Service(String),
    /// Working state does not match the flow
    #[error("Corrupt flow state: {0}")]
    CorruptState(String),
    /// Durable store failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<LedgerError> for FlowError {
    fn from(e: LedgerError) -> Self {
        Self::Service(e.to_string())
    }
}

impl From<OtpError> for FlowError {
    fn from(e: OtpError) -> Self {
        Self::Service(e.to_string())
    }
}

impl FlowError {
    /// User-facing reply; details stay in the logs
    #[must_use]
    pub fn prompt(&self) -> Prompt {
        match self {
            Self::Ownership { .. } => Prompt::AccessDenied,
            Self::Service(_) | Self::Storage(_) => Prompt::ServiceUnavailable,
            Self::CorruptState(_) => Prompt::RestartRequired,
        }
    }
}
