//! API error types.

use thiserror::Error;

/// Fallback message shown when the failure is not worth explaining.
const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// API error type.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport-level HTTP error (connect failure, timeout, decode)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned a non-success status
    #[error("API returned {status}: {message}")]
    Status { status: u16, message: String },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// Returns true if this error is transient and the request can be retried.
    ///
    /// Transient errors include connection failures, timeouts, and 5xx
    /// server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::Json(_) => false,
        }
    }

    /// User-facing message for this error.
    ///
    /// Backend messages on 4xx responses are passed through verbatim (the
    /// backend phrases those for end users); everything else collapses to a
    /// generic retry prompt.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { status, message } if *status < 500 && !message.is_empty() => {
                message.clone()
            }
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// Result type alias using ApiError.
pub type ApiResult<T> = Result<T, ApiError>;
