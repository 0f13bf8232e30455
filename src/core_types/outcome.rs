//! Outcome of a scheduled operation.

use crate::core_types::errors::AppError;
use serde::Serialize;

/// Result of running an operation through the retry scheduler.
///
/// Holds exactly one of the success value or the final classified error, and
/// the number of attempts made (always within `[1, max_attempts]`).
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryResult<T> {
    outcome: Result<T, AppError>,
    attempts_made: u32,
}

impl<T> RecoveryResult<T> {
    pub(crate) fn succeeded(data: T, attempts_made: u32) -> Self {
        Self {
            outcome: Ok(data),
            attempts_made,
        }
    }

    pub(crate) fn failed(error: AppError, attempts_made: u32) -> Self {
        Self {
            outcome: Err(error),
            attempts_made,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn data(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&AppError> {
        self.outcome.as_ref().err()
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    pub fn into_result(self) -> Result<T, AppError> {
        self.outcome
    }

    /// Non-generic view used by callbacks and status reporting.
    pub fn summary(&self) -> RecoverySummary {
        RecoverySummary {
            success: self.is_success(),
            attempts_made: self.attempts_made,
            error: self.error().cloned(),
        }
    }
}

/// Type-erased projection of a [`RecoveryResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoverySummary {
    pub success: bool,
    pub attempts_made: u32,
    pub error: Option<AppError>,
}
