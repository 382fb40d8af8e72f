//! Error types for the session subsystem.

use std::fmt;
use std::time::Duration;

use beam_core::{ApiError, ChainId, OperationStatus, UnknownChainId};
use thiserror::Error;

use crate::storage::StorageError;

/// Interactive flow a confirmation message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Connection,
    Session,
    Operation,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Flow::Connection => "connection request",
            Flow::Session => "session request",
            Flow::Operation => "operation signing",
        };
        f.write_str(label)
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("At least one chain must be configured")]
    NoChains,

    #[error("Chain {0} is not configured")]
    ChainNotConfigured(ChainId),

    #[error("No chain selected")]
    ChainNotSelected,

    #[error(transparent)]
    UnknownChain(#[from] UnknownChainId),

    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Missing required variable {0}")]
    MissingEnv(&'static str),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("configuration lock was poisoned")]
    LockPoisoned,
}

/// Failures of the popup/overlay handshake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfirmationError {
    #[error("User rejected {0}")]
    UserRejected(Flow),

    #[error("Error during {0}")]
    Remote(Flow),

    #[error("Unsupported message type: {0}")]
    UnsupportedMessageType(String),

    #[error("Malformed {message_type} payload: {reason}")]
    MalformedPayload {
        message_type: String,
        reason: String,
    },

    #[error("Confirmation message channel closed")]
    ChannelClosed,

    #[error("Confirmation timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors surfaced by the session manager.
#[derive(Debug, Error)]
pub enum SessionError {
    // ------------------------------------------------------------------------
    // Not found
    // ------------------------------------------------------------------------
    #[error("No active session found")]
    NoActiveSession,

    #[error("No active session found to revoke")]
    NoSessionToRevoke,

    #[error("Failed to get operation {operation_id}: {source}")]
    OperationNotFound {
        operation_id: String,
        #[source]
        source: ApiError,
    },

    #[error("No actions found in operation")]
    NoActions,

    #[error("No signature found in operation")]
    MissingSignature,

    #[error("Operation {0} has no confirmation URL")]
    MissingUrl(String),

    // ------------------------------------------------------------------------
    // User cancelled
    // ------------------------------------------------------------------------
    #[error("Unable to confirm session request")]
    SessionNotConfirmed,

    #[error("Unable to sign operation")]
    OperationNotConfirmed,

    #[error("Connection request was not confirmed")]
    ConnectionNotConfirmed,

    // ------------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------------
    #[error("Already has an active session")]
    AlreadyActive,

    #[error(
        "Unable to sign operation, no valid session or key found and no browser fallback enabled"
    )]
    NoSessionNoFallback,

    #[error("Operation failed with status: {status}")]
    OperationFailed { status: OperationStatus },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("{0} not set")]
    MissingComponent(&'static str),

    // ------------------------------------------------------------------------
    // Wrapped
    // ------------------------------------------------------------------------
    #[error("{context}: {source}")]
    Api {
        context: &'static str,
        #[source]
        source: ApiError,
    },

    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SessionError {
    pub(crate) fn api(context: &'static str) -> impl FnOnce(ApiError) -> Self {
        move |source| SessionError::Api { context, source }
    }

    /// True for errors caused by the user closing or rejecting a confirmation.
    pub fn is_user_cancelled(&self) -> bool {
        matches!(
            self,
            SessionError::SessionNotConfirmed
                | SessionError::OperationNotConfirmed
                | SessionError::ConnectionNotConfirmed
                | SessionError::Confirmation(ConfirmationError::UserRejected(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_messages() {
        assert_eq!(
            ConfirmationError::UserRejected(Flow::Session).to_string(),
            "User rejected session request"
        );
        assert_eq!(
            ConfirmationError::Remote(Flow::Operation).to_string(),
            "Error during operation signing"
        );
        assert_eq!(
            ConfirmationError::UserRejected(Flow::Connection).to_string(),
            "User rejected connection request"
        );
    }

    #[test]
    fn test_user_cancelled_family() {
        assert!(SessionError::SessionNotConfirmed.is_user_cancelled());
        assert!(
            SessionError::Confirmation(ConfirmationError::UserRejected(Flow::Operation))
                .is_user_cancelled()
        );
        assert!(!SessionError::NoActions.is_user_cancelled());
    }
}
