//! Failure classification.
//!
//! Operations report failures as anything convertible into a [`RawFailure`];
//! [`classify`] maps that signature plus an [`ErrorContext`] into an
//! [`AppError`]. Rules are evaluated in priority order and the first match
//! wins:
//!
//! 1. transport failures → `network`
//! 2. wall-clock budget exceeded → `timeout`
//! 3. rate-limit signal → `rate_limited`
//! 4. authentication/authorization refused → `auth`
//! 5. malformed request → `validation`
//! 6. cross-origin or security policy rejection → `policy`
//! 7. everything else → `unknown`
//!
//! Free-form messages (`RawFailure::Other`) are matched against the same rules
//! with text heuristics. Classification never fails; anything unmatched
//! degrades to `unknown`.

use crate::core_types::{AppError, ErrorContext, ErrorKind, ErrorSeverity};
use crate::logging::{log_debug, log_error, log_warn};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Failure signature consumed by the classifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RawFailure {
    /// No response was received: refused, reset, DNS failure.
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// The operation exceeded its time budget.
    #[error("timed out: {message}")]
    TimedOut { message: String },

    /// A response arrived with a non-success status.
    #[error("status {status}: {message}")]
    Status {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    /// The request could not be built or was rejected locally as malformed.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// A cross-origin or security policy blocked the request.
    #[error("policy rejection: {message}")]
    PolicyRejected { message: String },

    /// Transport succeeded but the response had an unexpected shape.
    #[error("unexpected response: {message}")]
    UnexpectedResponse { message: String },

    /// Anything else, classified by message heuristics.
    #[error("{message}")]
    Other { message: String },
}

impl RawFailure {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::TimedOut {
            message: message.into(),
        }
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Rate-limit response carrying a `Retry-After` hint.
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::Status {
            status: 429,
            message: "Too Many Requests".to_string(),
            retry_after,
        }
    }

    /// Failure for a non-success response, keeping any `Retry-After` hint.
    ///
    /// Use this instead of `error_for_status()` when the hint matters:
    /// [`reqwest::Error`] does not carry response headers.
    pub fn from_response(response: &reqwest::Response) -> Self {
        Self::from_status_and_headers(response.status(), response.headers())
    }

    pub fn from_status_and_headers(status: StatusCode, headers: &HeaderMap) -> Self {
        Self::Status {
            status: status.as_u16(),
            message: status.to_string(),
            retry_after: retry_after_from_headers(headers),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn policy_rejected(message: impl Into<String>) -> Self {
        Self::PolicyRejected {
            message: message.into(),
        }
    }

    pub fn unexpected_response(message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// The raw message, kept on the classified error for diagnostics.
    pub fn message(&self) -> &str {
        match self {
            Self::Transport { message }
            | Self::TimedOut { message }
            | Self::Status { message, .. }
            | Self::InvalidRequest { message }
            | Self::PolicyRejected { message }
            | Self::UnexpectedResponse { message }
            | Self::Other { message } => message,
        }
    }

    fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Parse `Retry-After` as delta-seconds or an HTTP-date. Dates in the past
/// yield a zero hint; unparseable values yield none.
fn retry_after_from_headers(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}

impl From<reqwest::Error> for RawFailure {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        if let Some(status) = err.status() {
            return Self::status(status.as_u16(), message);
        }
        if err.is_timeout() {
            Self::timed_out(message)
        } else if err.is_connect() || err.is_request() {
            Self::transport(message)
        } else if err.is_builder() {
            Self::invalid_request(message)
        } else if err.is_decode() || err.is_body() {
            Self::unexpected_response(message)
        } else {
            Self::other(message)
        }
    }
}

impl From<std::io::Error> for RawFailure {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        let message = err.to_string();
        match err.kind() {
            Io::TimedOut => Self::timed_out(message),
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::AddrNotAvailable
            | Io::BrokenPipe
            | Io::UnexpectedEof => Self::transport(message),
            Io::PermissionDenied => Self::policy_rejected(message),
            Io::InvalidInput => Self::invalid_request(message),
            Io::InvalidData => Self::unexpected_response(message),
            _ => Self::other(message),
        }
    }
}

impl From<tokio::time::error::Elapsed> for RawFailure {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::timed_out(err.to_string())
    }
}

impl From<anyhow::Error> for RawFailure {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<RawFailure>() {
            Ok(raw) => return raw,
            Err(err) => err,
        };
        let err = match err.downcast::<reqwest::Error>() {
            Ok(e) => return e.into(),
            Err(err) => err,
        };
        let err = match err.downcast::<std::io::Error>() {
            Ok(e) => return e.into(),
            Err(err) => err,
        };
        match err.downcast::<tokio::time::error::Elapsed>() {
            Ok(e) => e.into(),
            Err(err) => Self::other(format!("{err:#}")),
        }
    }
}

impl From<String> for RawFailure {
    fn from(message: String) -> Self {
        Self::other(message)
    }
}

impl From<&str> for RawFailure {
    fn from(message: &str) -> Self {
        Self::other(message)
    }
}

/// Message heuristics in rule priority order.
static MESSAGE_RULES: Lazy<Vec<(ErrorKind, Regex)>> = Lazy::new(|| {
    let sources = [
        (
            ErrorKind::Network,
            r"(?i)failed to fetch|network\s*(error|request failed)|connection (refused|reset|closed)|econnrefused|econnreset|enotfound|\bdns\b|unreachable|\boffline\b",
        ),
        (
            ErrorKind::Timeout,
            r"(?i)timed?\s*out|timeout|deadline exceeded|\baborted?\b",
        ),
        (
            ErrorKind::RateLimited,
            r"(?i)rate.?limit|too many requests|\b429\b|throttl",
        ),
        (
            ErrorKind::Auth,
            r"(?i)unauthori[sz]ed|forbidden|not authenticated|invalid token|\b40[13]\b|(token|session|credentials?)\s+(has\s+)?(been\s+)?(expired|revoked)",
        ),
        (
            ErrorKind::Validation,
            r"(?i)validation|invalid (input|request|parameter|argument)|bad request|\b4(00|13|22)\b",
        ),
        (
            ErrorKind::Policy,
            r"(?i)\bcors\b|cross-origin|content security policy|blocked by (client|policy)",
        ),
    ];

    // A pattern that fails to compile is skipped; its kind degrades to unknown.
    let mut rules = Vec::with_capacity(sources.len());
    for (kind, source) in sources {
        if let Ok(regex) = Regex::new(source) {
            rules.push((kind, regex));
        }
    }
    rules
});

static SESSION_GONE_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)(token|session|credentials?)\s+(has\s+)?(been\s+)?(expired|revoked)").ok()
});

/// Classify a raw failure within its context.
pub fn classify(failure: &RawFailure, context: &ErrorContext) -> AppError {
    let kind = classify_kind(failure);
    let severity = severity_for(kind, failure.message());
    let error = AppError::new(kind, severity, failure.message(), context.clone())
        .with_status(failure.status_code())
        .with_retry_after(failure.retry_after());

    log_classification(&error);
    error
}

fn classify_kind(failure: &RawFailure) -> ErrorKind {
    match failure {
        RawFailure::Transport { .. } => ErrorKind::Network,
        RawFailure::TimedOut { .. } => ErrorKind::Timeout,
        RawFailure::Status { status, .. } => kind_for_status(*status),
        RawFailure::InvalidRequest { .. } => ErrorKind::Validation,
        RawFailure::PolicyRejected { .. } => ErrorKind::Policy,
        RawFailure::UnexpectedResponse { .. } => ErrorKind::Unknown,
        RawFailure::Other { message } => kind_for_message(message),
    }
}

fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        502 | 503 => ErrorKind::Network,
        408 | 504 => ErrorKind::Timeout,
        429 => ErrorKind::RateLimited,
        401 | 403 => ErrorKind::Auth,
        400 | 413 | 422 => ErrorKind::Validation,
        _ => ErrorKind::Unknown,
    }
}

fn kind_for_message(message: &str) -> ErrorKind {
    MESSAGE_RULES
        .iter()
        .find(|(_, pattern)| pattern.is_match(message))
        .map_or(ErrorKind::Unknown, |(kind, _)| *kind)
}

// An auth failure whose session is gone cannot be fixed by the same
// credentials, so it escalates to critical.
fn severity_for(kind: ErrorKind, message: &str) -> ErrorSeverity {
    let session_gone = SESSION_GONE_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(message));
    if kind == ErrorKind::Auth && session_gone {
        return ErrorSeverity::Critical;
    }
    kind.default_severity()
}

fn log_classification(error: &AppError) {
    let context = error.context();
    match error.severity() {
        ErrorSeverity::Low => log_debug!(
            error_kind = %error.kind(),
            action = %context.action,
            sequence_id = %context.sequence_id,
            retryable = error.is_retryable(),
            "Failure classified"
        ),
        ErrorSeverity::Medium => log_warn!(
            error_kind = %error.kind(),
            action = %context.action,
            sequence_id = %context.sequence_id,
            retryable = error.is_retryable(),
            "Failure classified"
        ),
        ErrorSeverity::High | ErrorSeverity::Critical => log_error!(
            error_kind = %error.kind(),
            severity = ?error.severity(),
            action = %context.action,
            sequence_id = %context.sequence_id,
            retryable = error.is_retryable(),
            "Failure classified"
        ),
    }
}
