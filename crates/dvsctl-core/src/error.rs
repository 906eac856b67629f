//! Unified error handling for dvsctl-core
//!
//! Every failure surfaced by the watcher, the workflows, or the vSphere
//! client lands in one of these variants.
//!
//! # Example
//!
//! ```rust
//! use dvsctl_core::{CoreError, Result};
//! use std::time::Duration;
//!
//! fn handle_error(err: CoreError) {
//!     if err.is_timeout() {
//!         println!("Operation did not finish in time");
//!     } else if err.is_connection() {
//!         println!("Could not reach the management endpoint");
//!     }
//! }
//!
//! let err = CoreError::Timeout(Duration::from_secs(30));
//! assert!(err.is_timeout());
//! ```

use std::time::Duration;
use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// The remote session could not be established or authenticated
    #[error("Connection error: {0}")]
    Connection(String),

    /// The remote operation reached the `error` state
    #[error("Operation failed: {message}")]
    OperationFailed {
        message: String,
        /// Fault payload exactly as the server reported it
        detail: serde_json::Value,
    },

    /// Polling exceeded the caller's deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled polling before a terminal state was seen
    #[error("Operation polling was cancelled")]
    Cancelled,

    /// Anything the collaborator did that we did not anticipate
    #[error("Unexpected fault during {operation} (handle {handle}): {message}")]
    UnexpectedFault {
        operation: String,
        handle: String,
        message: String,
    },

    /// Request rejected before submission
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level failure talking to the endpoint
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Wrap an arbitrary collaborator failure with operation/handle context
    pub fn unexpected(
        operation: impl Into<String>,
        handle: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CoreError::UnexpectedFault {
            operation: operation.into(),
            handle: handle.into(),
            message: message.into(),
        }
    }

    /// Returns true if the session could not be established
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, CoreError::Connection(_))
    }

    /// Returns true if this is a timeout error
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            CoreError::Timeout(_) => true,
            CoreError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Returns true if the remote operation itself failed
    #[must_use]
    pub fn is_operation_failure(&self) -> bool {
        matches!(self, CoreError::OperationFailed { .. })
    }

    /// Returns true if this is a bad request error
    #[must_use]
    pub fn is_bad_request(&self) -> bool {
        matches!(self, CoreError::Validation(_))
    }

    /// Returns true if the caller may reasonably try again.
    ///
    /// Only failures where nothing was created on the server qualify.
    /// A timed-out operation may still complete remotely, so re-submitting
    /// it could create a duplicate switch.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Connection(_) => true,
            CoreError::Http(e) => e.is_connect(),
            _ => false,
        }
    }
}
