//! Classified error values.
//!
//! An [`AppError`] is the canonical, immutable description of a failed
//! operation: its [`ErrorKind`], [`ErrorSeverity`], whether it may be retried
//! and whether the surrounding application state stays usable.

use crate::core_types::context::ErrorContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Closed taxonomy of failure kinds.
///
/// | Kind | Severity | Retryable |
/// |------|----------|-----------|
/// | `Network` | High | Yes |
/// | `Timeout` | Medium | Yes |
/// | `RateLimited` | Medium | Yes |
/// | `Auth` | High (Critical when the session is gone) | No |
/// | `Validation` | Low | No |
/// | `Policy` | High | No |
/// | `Unknown` | Medium | No |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request never received a response (refused, DNS, reset).
    Network,
    /// The operation ran out of its wall-clock budget.
    Timeout,
    /// The service signalled backpressure.
    RateLimited,
    /// Authentication or authorization was refused.
    Auth,
    /// The request was malformed.
    Validation,
    /// A cross-origin or security policy blocked the request.
    Policy,
    /// Anything the classifier cannot explain.
    Unknown,
}

impl ErrorKind {
    /// Every kind, in taxonomy order.
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::Network,
        ErrorKind::Timeout,
        ErrorKind::RateLimited,
        ErrorKind::Auth,
        ErrorKind::Validation,
        ErrorKind::Policy,
        ErrorKind::Unknown,
    ];

    /// Default retryability of the kind.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::RateLimited)
    }

    /// Default severity of the kind.
    pub fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Network | Self::Auth | Self::Policy => ErrorSeverity::High,
            Self::Timeout | Self::RateLimited | Self::Unknown => ErrorSeverity::Medium,
            Self::Validation => ErrorSeverity::Low,
        }
    }

    /// Whether application state stays usable after this kind of failure.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, Self::Auth | Self::Policy)
    }

    /// Stable snake_case name, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Auth => "auth",
            Self::Validation => "validation",
            Self::Policy => "policy",
            Self::Unknown => "unknown",
        }
    }

    /// Key used to look up user-facing copy.
    pub fn message_key(self) -> &'static str {
        match self {
            Self::Network => "errors.network",
            Self::Timeout => "errors.timeout",
            Self::RateLimited => "errors.rate_limited",
            Self::Auth => "errors.auth",
            Self::Validation => "errors.validation",
            Self::Policy => "errors.policy",
            Self::Unknown => "errors.unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered severity scale, `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Expected, user-correctable failure.
    Low,
    /// Unexpected but usually transient.
    Medium,
    /// The action failed and needs attention.
    High,
    /// Recovery requires an action outside the retry loop.
    Critical,
}

/// A classified failure.
///
/// Built only by the classifier through [`AppError::new`], which enforces
/// that a critical error is never retryable. Fields are read through
/// accessors so a value cannot be altered after classification; a new
/// classification produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppError {
    kind: ErrorKind,
    severity: ErrorSeverity,
    retryable: bool,
    recoverable: bool,
    original_message: String,
    status: Option<u16>,
    retry_after: Option<Duration>,
    context: ErrorContext,
}

impl AppError {
    pub(crate) fn new(
        kind: ErrorKind,
        severity: ErrorSeverity,
        original_message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        let retryable = kind.is_retryable() && severity != ErrorSeverity::Critical;
        let recoverable = kind.is_recoverable() && severity != ErrorSeverity::Critical;
        Self {
            kind,
            severity,
            retryable,
            recoverable,
            original_message: original_message.into(),
            status: None,
            retry_after: None,
            context,
        }
    }

    pub(crate) fn with_status(mut self, status: Option<u16>) -> Self {
        self.status = status;
        self
    }

    pub(crate) fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    /// The raw underlying message. For diagnostics only, never for display.
    pub fn original_message(&self) -> &str {
        &self.original_message
    }

    /// Response status, when a response was received.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Server-signalled wait before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    pub fn message_key(&self) -> &'static str {
        self.kind.message_key()
    }

    /// Whether recovery needs the user to act outside the retry loop.
    pub fn requires_user_action(&self) -> bool {
        self.severity == ErrorSeverity::Critical
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error during {}: {}",
            self.kind, self.context.action, self.original_message
        )
    }
}

impl std::error::Error for AppError {}
