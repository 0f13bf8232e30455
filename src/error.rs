//! Engine-level error types.
//!
//! [`RecoveryError`] describes failures of the recovery engine itself: bad
//! configuration, a controller that is already busy, or a sequence that was
//! cancelled. Failures of the *operations* the engine runs are never reported
//! here; those are classified into [`AppError`](crate::AppError) values and
//! carried inside a [`RecoveryResult`](crate::RecoveryResult).
//!
//! # Example
//!
//! ```rust
//! use error_recovery::{EngineResult, RecoveryError};
//!
//! fn check(max_attempts: u32) -> EngineResult<()> {
//!     if max_attempts == 0 {
//!         return Err(RecoveryError::invalid_options("max_attempts must be at least 1"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check(0).is_err());
//! ```

use crate::logging::{log_debug, log_error, log_warn};
use thiserror::Error;

/// Convenient result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, RecoveryError>;

/// Errors raised by the recovery engine itself.
///
/// | Variant | Meaning |
/// |---------|---------|
/// | `InvalidOptions` | Retry options failed validation |
/// | `Configuration` | Engine configuration is invalid or unreadable |
/// | `Busy` | A controller already has a sequence in flight |
/// | `Cancelled` | The sequence was cancelled before it produced a result |
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecoveryError {
    /// Retry options are outside their valid range.
    #[error("Invalid retry options: {message}")]
    InvalidOptions {
        /// What was wrong with the options.
        message: String,
    },

    /// Engine configuration is invalid.
    #[error("Recovery configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// A second sequence was started while one was still in flight.
    #[error("Recovery already in progress for action: {action}")]
    Busy {
        /// The action of the rejected call.
        action: String,
    },

    /// The sequence was cancelled; no result was produced.
    #[error("Recovery cancelled for action: {action}")]
    Cancelled {
        /// The action of the cancelled sequence.
        action: String,
    },
}

impl RecoveryError {
    /// Whether this error only reports a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn invalid_options(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "invalid_options",
            message = %message,
            "Retry options validation failed"
        );
        Self::InvalidOptions { message }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "configuration",
            message = %message,
            "Recovery configuration validation failed"
        );
        Self::Configuration { message }
    }

    pub fn busy(action: impl Into<String>) -> Self {
        let action = action.into();
        log_warn!(
            error_type = "busy",
            action = %action,
            "Rejected recovery call while another sequence is in flight"
        );
        Self::Busy { action }
    }

    /// Cancellation is expected during teardown, so it only logs at debug.
    pub fn cancelled(action: impl Into<String>) -> Self {
        let action = action.into();
        log_debug!(
            error_type = "cancelled",
            action = %action,
            "Recovery sequence cancelled"
        );
        Self::Cancelled { action }
    }
}
