//! User-facing copy for classified errors.
//!
//! Lookup is keyed by [`ErrorKind`] only, so a kind always yields the same
//! text however often it recurs and whatever its severity. A
//! [`MessageCatalog`] can override entries (for localisation); missing or
//! empty entries fall back to the built-in table.

use crate::core_types::{AppError, ErrorKind};
use crate::error::{EngineResult, RecoveryError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message and ordered suggestions for one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub message: String,
    pub suggestions: Vec<String>,
}

impl MessageEntry {
    fn is_usable(&self) -> bool {
        !self.message.trim().is_empty() && self.suggestions.iter().any(|s| !s.trim().is_empty())
    }
}

/// Overrides keyed by kind, e.g. loaded from a JSON translation file.
pub type MessageCatalog = HashMap<ErrorKind, MessageEntry>;

/// Display-ready description of an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub message: String,
    pub suggestions: Vec<String>,
    /// Recovery needs the user to act outside the retry loop.
    pub requires_action: bool,
}

const CRITICAL_FALLBACK_SUGGESTION: &str = "Sign in again or contact support";

fn builtin(kind: ErrorKind) -> (&'static str, &'static [&'static str]) {
    match kind {
        ErrorKind::Network => (
            "Unable to connect. Please check your internet connection.",
            &[
                "Check your internet connection",
                "Try again in a few moments",
                "Switch to a different network if the problem persists",
            ],
        ),
        ErrorKind::Timeout => (
            "The request took too long to complete.",
            &[
                "Try again in a few moments",
                "Check your connection speed",
                "Try a shorter request if the problem persists",
            ],
        ),
        ErrorKind::RateLimited => (
            "Too many requests. Please wait a moment before trying again.",
            &[
                "Wait a few seconds before trying again",
                "Avoid sending many requests in quick succession",
            ],
        ),
        ErrorKind::Auth => (
            "Your session has expired or you are not authorized. Please sign in again.",
            &[
                "Sign in again",
                "Check that your account has access to this feature",
                "Contact support if the problem persists",
            ],
        ),
        ErrorKind::Validation => (
            "Some of the information provided is invalid.",
            &[
                "Review the information you entered",
                "Make sure all required fields are filled in",
                "Shorten very long messages",
            ],
        ),
        ErrorKind::Policy => (
            "The request was blocked by a security policy.",
            &[
                "Refresh the page",
                "Disable browser extensions that block requests",
                "Contact support if the problem persists",
            ],
        ),
        ErrorKind::Unknown => (
            "Something went wrong. Please try again.",
            &[
                "Try again",
                "Refresh the page",
                "Contact support if the problem persists",
            ],
        ),
    }
}

/// Stateless message lookup.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    catalog: MessageCatalog,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: MessageCatalog) -> Self {
        Self { catalog }
    }

    /// Build a notifier from a JSON object keyed by kind name
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Configuration`] if the JSON is malformed or
    /// names an unknown kind.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let catalog: MessageCatalog = serde_json::from_str(json)
            .map_err(|e| RecoveryError::configuration(format!("Invalid message catalog: {e}")))?;
        Ok(Self::with_catalog(catalog))
    }

    /// Message for the error's kind.
    pub fn user_message(&self, error: &AppError) -> String {
        self.entry(error.kind()).message
    }

    /// Ordered suggestions for the error's kind, never empty.
    ///
    /// Critical errors never get a plain "try again" suggestion, since retrying
    /// cannot fix them.
    pub fn recovery_suggestions(&self, error: &AppError) -> Vec<String> {
        let suggestions = self.entry(error.kind()).suggestions;
        if !error.requires_user_action() {
            return suggestions;
        }

        let filtered: Vec<String> = suggestions
            .into_iter()
            .filter(|s| !s.to_lowercase().contains("try again"))
            .collect();
        if filtered.is_empty() {
            vec![CRITICAL_FALLBACK_SUGGESTION.to_string()]
        } else {
            filtered
        }
    }

    pub fn notify(&self, error: &AppError) -> Notification {
        Notification {
            message: self.user_message(error),
            suggestions: self.recovery_suggestions(error),
            requires_action: error.requires_user_action(),
        }
    }

    fn entry(&self, kind: ErrorKind) -> MessageEntry {
        if let Some(entry) = self.catalog.get(&kind).filter(|e| e.is_usable()) {
            return MessageEntry {
                message: entry.message.clone(),
                suggestions: entry
                    .suggestions
                    .iter()
                    .filter(|s| !s.trim().is_empty())
                    .cloned()
                    .collect(),
            };
        }

        let (message, suggestions) = builtin(kind);
        MessageEntry {
            message: message.to_string(),
            suggestions: suggestions.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}
