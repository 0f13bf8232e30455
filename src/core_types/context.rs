//! Provenance attached to a recovery sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller-supplied provenance for one recovery sequence.
///
/// Created fresh per invocation and read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Operation name, e.g. `send_message` or `save_progress`.
    pub action: String,
    /// When the sequence started.
    pub timestamp: DateTime<Utc>,
    /// Location the operation was issued from.
    pub url: Option<String>,
    /// User agent or other client fingerprint.
    pub client_fingerprint: Option<String>,
    /// Free-form payload for diagnostics.
    pub additional_data: Option<serde_json::Value>,
    /// Correlates log lines of one sequence.
    pub sequence_id: Uuid,
}

impl ErrorContext {
    /// Minimal context for an action; remaining fields use defaults.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            timestamp: Utc::now(),
            url: None,
            client_fingerprint: None,
            additional_data: None,
            sequence_id: Uuid::new_v4(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_client_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.client_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn with_additional_data(mut self, data: serde_json::Value) -> Self {
        self.additional_data = Some(data);
        self
    }
}

/// Context defaults held by a controller for its call site.
///
/// The action always comes from here or from [`ContextOverrides`]; the
/// engine never invents one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDefaults {
    pub action: String,
    pub url: Option<String>,
    pub client_fingerprint: Option<String>,
}

impl ContextDefaults {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            url: None,
            client_fingerprint: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_client_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.client_fingerprint = Some(fingerprint.into());
        self
    }

    /// Build a complete context, preferring override values.
    pub fn build(&self, overrides: ContextOverrides, now: DateTime<Utc>) -> ErrorContext {
        ErrorContext {
            action: overrides.action.unwrap_or_else(|| self.action.clone()),
            timestamp: now,
            url: overrides.url.or_else(|| self.url.clone()),
            client_fingerprint: overrides
                .client_fingerprint
                .or_else(|| self.client_fingerprint.clone()),
            additional_data: overrides.additional_data,
            sequence_id: Uuid::new_v4(),
        }
    }
}

/// Per-call partial context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextOverrides {
    pub action: Option<String>,
    pub url: Option<String>,
    pub client_fingerprint: Option<String>,
    pub additional_data: Option<serde_json::Value>,
}

impl ContextOverrides {
    pub fn action(action: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            ..Self::default()
        }
    }

    pub fn with_additional_data(mut self, data: serde_json::Value) -> Self {
        self.additional_data = Some(data);
        self
    }
}
