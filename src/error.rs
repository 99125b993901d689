//! Error types for the nonce-relay crate

use std::time::Duration;

use thiserror::Error;

/// Main error type for nonce allocation and resend operations
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RelayError {
    #[error("network proxy is not set")]
    MissingProxy,

    #[error("resend interval {got:?} is below the minimum of {min:?}")]
    InvalidResendInterval { got: Duration, min: Duration },

    #[error("empty account address")]
    EmptyAddress,

    #[error("transaction has no sender address")]
    MissingSender,

    #[error("network error: {0}")]
    Network(String),

    #[error("handler is closed")]
    Closed,
}

impl RelayError {
    /// Check if the failed operation can succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, RelayError::Network(_))
    }
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;
