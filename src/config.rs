//! Engine configuration.
//!
//! [`RecoveryConfig`] aggregates everything a controller needs: default retry
//! options, the backoff policy, connectivity probe settings and the
//! concurrency mode. Values are serde-friendly so they can be embedded in a
//! host application's configuration; [`RecoveryConfig::from_env`] is the only
//! code that reads environment variables.

use crate::error::{EngineResult, RecoveryError};
use crate::logging::log_debug;
use crate::network::DEFAULT_PROBE_TIMEOUT;
use crate::retry::{is_valid_jitter_fraction, BackoffPolicy, Jitter, RetryOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a controller does with a call that arrives while a sequence is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    /// Fail the second call with [`RecoveryError::Busy`].
    #[default]
    Reject,
    /// Wait until the in-flight sequence finishes.
    Queue,
}

/// Active connectivity probe settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Endpoint hit with a `HEAD` request; `None` disables HTTP probing.
    pub url: Option<String>,
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    pub retry: RetryOptions,
    pub backoff: BackoffPolicy,
    pub probe: ProbeConfig,
    pub concurrency: ConcurrencyMode,
}

impl RecoveryConfig {
    /// Validate every section
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::InvalidOptions`] for bad retry options and
    /// [`RecoveryError::Configuration`] for a bad backoff policy or probe
    /// timeout.
    pub fn validate(&self) -> EngineResult<()> {
        self.retry.validate()?;
        self.backoff.validate()?;
        if self.probe.timeout.is_zero() {
            return Err(RecoveryError::configuration(
                "probe timeout must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Load configuration from environment variables
    /// Environment variables are read here and nowhere else in the crate
    ///
    /// Recognized variables, all optional:
    /// - `RECOVERY_MAX_ATTEMPTS`
    /// - `RECOVERY_BASE_DELAY_MS`
    /// - `RECOVERY_MAX_DELAY_MS`
    /// - `RECOVERY_JITTER`: `none`, `full`, or a fraction in `[0, 1]` such as `0.1`
    /// - `RECOVERY_PROBE_URL`
    /// - `RECOVERY_PROBE_TIMEOUT_MS`
    /// - `RECOVERY_CONCURRENCY`: `reject` or `queue`
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Configuration`] if a variable is present but
    /// cannot be parsed, or if the resulting configuration fails validation.
    pub fn from_env() -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(attempts) = read_env::<u32>("RECOVERY_MAX_ATTEMPTS")? {
            config.retry.max_attempts = attempts;
        }
        if let Some(ms) = read_env::<u64>("RECOVERY_BASE_DELAY_MS")? {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = read_env::<u64>("RECOVERY_MAX_DELAY_MS")? {
            config.backoff.max_delay = Duration::from_millis(ms);
        }
        if let Ok(jitter) = std::env::var("RECOVERY_JITTER") {
            config.backoff.jitter = parse_jitter(&jitter)?;
        }
        if let Ok(url) = std::env::var("RECOVERY_PROBE_URL") {
            config.probe.url = Some(url);
        }
        if let Some(ms) = read_env::<u64>("RECOVERY_PROBE_TIMEOUT_MS")? {
            config.probe.timeout = Duration::from_millis(ms);
        }
        if let Ok(mode) = std::env::var("RECOVERY_CONCURRENCY") {
            config.concurrency = parse_concurrency(&mode)?;
        }

        config.validate().map_err(|e| match e {
            RecoveryError::InvalidOptions { message } => RecoveryError::configuration(message),
            other => other,
        })?;

        log_debug!(
            max_attempts = config.retry.max_attempts,
            base_delay_ms = config.retry.base_delay.as_millis(),
            max_delay_ms = config.backoff.max_delay.as_millis(),
            concurrency = ?config.concurrency,
            "Loaded recovery configuration from environment"
        );

        Ok(config)
    }
}

fn read_env<T: std::str::FromStr>(name: &str) -> EngineResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| RecoveryError::configuration(format!("{name} has invalid value '{raw}'"))),
        Err(_) => Ok(None),
    }
}

fn parse_jitter(raw: &str) -> EngineResult<Jitter> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "none" | "off" => Ok(Jitter::None),
        "full" => Ok(Jitter::Full),
        other => other
            .parse::<f64>()
            .ok()
            .filter(|fraction| is_valid_jitter_fraction(*fraction))
            .map(Jitter::Proportional)
            .ok_or_else(|| {
                RecoveryError::configuration(format!("RECOVERY_JITTER has invalid value '{raw}'"))
            }),
    }
}

fn parse_concurrency(raw: &str) -> EngineResult<ConcurrencyMode> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "reject" => Ok(ConcurrencyMode::Reject),
        "queue" => Ok(ConcurrencyMode::Queue),
        _ => Err(RecoveryError::configuration(format!(
            "RECOVERY_CONCURRENCY has invalid value '{raw}'"
        ))),
    }
}
