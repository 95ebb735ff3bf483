//! Query error types.

use thiserror::Error;

/// Query error type.
///
/// `Clone` because one failure fans out to every waiter de-duplicated onto
/// the same in-flight request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The underlying request failed
    #[error("Request failed: {message}")]
    Request { message: String, transient: bool },

    /// Retries exhausted on transient failures
    #[error("Request failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// Cached value could not be decoded into the requested type
    #[error("Failed to decode cached value: {0}")]
    Decode(String),

    /// The in-flight request was dropped without delivering a result
    #[error("In-flight request was dropped")]
    Cancelled,
}

impl QueryError {
    /// Returns true if the underlying failure was transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueryError::Request { transient: true, .. })
    }
}

impl From<playlet_api::ApiError> for QueryError {
    fn from(err: playlet_api::ApiError) -> Self {
        QueryError::Request {
            transient: err.is_transient(),
            message: err.to_string(),
        }
    }
}

/// Result type alias using QueryError.
pub type QueryResult<T> = Result<T, QueryError>;
