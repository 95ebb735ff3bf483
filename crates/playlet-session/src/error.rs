//! Session error types.

use crate::validate::ValidationError;
use thiserror::Error;

/// Session error type.
///
/// These never escape [`crate::SessionManager`]'s user-facing operations
/// (those publish the mapped message on the session snapshot instead); they
/// are returned from the internal token API and used for classification.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Backend rejected the credentials
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Client-side form validation failed
    #[error("Validation failed: {0}")]
    Validation(ValidationError),

    /// Token refresh failed
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// Refresh retries exhausted
    #[error("Token refresh failed after {0} attempts")]
    RefreshExhausted(u32),

    /// No authenticated session
    #[error("Not signed in")]
    NotAuthenticated,

    /// Another auth operation holds the single in-flight slot
    #[error("Another account operation is already in progress")]
    OperationInProgress,

    /// Invalid state transition in the session FSM
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] playlet_storage::StorageError),

    /// API error
    #[error("API error: {0}")]
    Api(#[from] playlet_api::ApiError),
}

impl SessionError {
    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            SessionError::Api(e) => e.is_transient(),
            _ => false,
        }
    }

    /// User-facing message for this error, per the error taxonomy:
    /// transport errors collapse to a retry prompt, backend auth messages
    /// pass through verbatim, validation messages render as-is.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::InvalidCredentials(msg) if !msg.is_empty() => msg.clone(),
            SessionError::InvalidCredentials(_) => "Invalid username or password.".to_string(),
            SessionError::Validation(v) => v.message.clone(),
            SessionError::Api(e) => e.user_message(),
            SessionError::NotAuthenticated => "You need to sign in first.".to_string(),
            SessionError::OperationInProgress => {
                "Another account operation is already in progress.".to_string()
            }
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

/// Result type alias using SessionError.
pub type SessionResult<T> = Result<T, SessionError>;
