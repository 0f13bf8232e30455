//! Retry scheduling with exponential backoff
//!
//! This module runs operations with:
//! - Bounded attempts: a single try up to `max_attempts`
//! - Exponential backoff: `base_delay * multiplier^(attempt-1)`, capped at `max_delay`
//! - A per-kind multiplier table: ×2 by default, ×4 for rate-limited failures
//! - Jitter to desynchronize concurrent retries
//! - Optional snapshot/restore of caller state before every retry
//! - Connectivity-aware waits when a network monitor is attached

use crate::classifier::{classify, RawFailure};
use crate::core_types::{AppError, ErrorContext, ErrorKind, RecoveryResult};
use crate::error::{EngineResult, RecoveryError};
use crate::internals::clock::{Clock, TokioClock};
use crate::logging::{log_debug, log_error, log_warn};
use crate::network::NetworkMonitor;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-call retry tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryOptions {
    /// Total attempts including the first, at least 1.
    pub max_attempts: u32,
    /// Delay before the first retry, greater than zero.
    pub base_delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryOptions {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Validate option ranges
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::InvalidOptions`] if `max_attempts` is zero or
    /// `base_delay` is zero.
    pub fn validate(&self) -> EngineResult<()> {
        if self.max_attempts == 0 {
            return Err(RecoveryError::invalid_options(
                "max_attempts must be at least 1",
            ));
        }
        if self.base_delay.is_zero() {
            return Err(RecoveryError::invalid_options(
                "base_delay must be greater than zero",
            ));
        }
        Ok(())
    }

    /// New options with the overrides applied on top of these.
    pub fn with_overrides(&self, overrides: &RetryOverrides) -> Self {
        Self {
            max_attempts: overrides.max_attempts.unwrap_or(self.max_attempts),
            base_delay: overrides.base_delay.unwrap_or(self.base_delay),
        }
    }
}

/// Partial per-call override of a controller's retry options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryOverrides {
    pub max_attempts: Option<u32>,
    pub base_delay: Option<Duration>,
}

/// Randomization added on top of the computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jitter {
    /// No randomization.
    None,
    /// Adds a uniform random amount in `[0, delay]`.
    Full,
    /// Adds up to the given fraction of the delay, in `[0, 1]`.
    Proportional(f64),
}

/// Backoff tuning shared by every sequence a scheduler runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Ceiling for the pre-jitter delay
    pub max_delay: Duration,
    /// Growth per attempt for retryable kinds
    pub multiplier: f64,
    /// Growth per attempt after a rate-limit signal
    pub rate_limit_multiplier: f64,
    pub jitter: Jitter,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            rate_limit_multiplier: 4.0,
            jitter: Jitter::Full,
        }
    }
}

impl BackoffPolicy {
    /// Validate the policy
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Configuration`] if a multiplier is below 1.0
    /// (which would shrink delays), the ceiling is zero, or a proportional
    /// jitter fraction lies outside `[0, 1]`.
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.multiplier >= 1.0 && self.rate_limit_multiplier >= 1.0) {
            return Err(RecoveryError::configuration(
                "backoff multipliers must be at least 1.0",
            ));
        }
        if self.max_delay.is_zero() {
            return Err(RecoveryError::configuration(
                "max_delay must be greater than zero",
            ));
        }
        if let Jitter::Proportional(fraction) = self.jitter {
            if !is_valid_jitter_fraction(fraction) {
                return Err(RecoveryError::configuration(
                    "jitter fraction must be between 0.0 and 1.0",
                ));
            }
        }
        Ok(())
    }

    /// Multiplier table keyed by error kind.
    pub fn multiplier_for(&self, kind: ErrorKind) -> f64 {
        match kind {
            ErrorKind::RateLimited => self.rate_limit_multiplier,
            _ => self.multiplier,
        }
    }

    /// Delay before jitter for the retry following `attempt`.
    ///
    /// Non-decreasing in `attempt` and never above `max_delay`. A server
    /// `retry_after` hint raises the delay to at least the hint.
    pub fn delay_before_jitter(
        &self,
        attempt: u32,
        base_delay: Duration,
        kind: ErrorKind,
        retry_after: Option<Duration>,
    ) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_seconds = base_delay.as_secs_f64() * self.multiplier_for(kind).powi(exponent);

        let capped = if delay_seconds.is_finite() {
            delay_seconds.clamp(0.0, self.max_delay.as_secs_f64())
        } else {
            self.max_delay.as_secs_f64()
        };
        let delay = Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay);

        match retry_after {
            Some(hint) => delay.max(hint).min(self.max_delay),
            None => delay,
        }
    }

    /// Add jitter to prevent thundering herd
    ///
    /// Saturates at [`Duration::MAX`] instead of overflowing.
    pub fn apply_jitter(&self, delay: Duration) -> Duration {
        let extra = match self.jitter {
            Jitter::None => 0.0,
            Jitter::Full => fastrand::f64(),
            Jitter::Proportional(fraction) => fastrand::f64() * fraction,
        };
        Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + extra)).unwrap_or(Duration::MAX)
    }
}

/// Proportional jitter adds at most one extra delay.
pub(crate) fn is_valid_jitter_fraction(fraction: f64) -> bool {
    (0.0..=1.0).contains(&fraction)
}

/// Scheduler state transitions reported to an observer.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// About to invoke the operation for `attempt`.
    Attempting { attempt: u32 },
    /// `attempt` failed with a retryable error; waiting `delay` before the next.
    Waiting {
        attempt: u32,
        delay: Duration,
        error: AppError,
    },
}

/// Runs operations with classification-driven retries.
///
/// The scheduler holds no per-sequence state; each call to
/// [`with_retry`](Self::with_retry) is independent. Cancelling the scheduler's
/// token aborts the pending operation or backoff wait.
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    policy: BackoffPolicy,
    clock: Arc<dyn Clock>,
    monitor: Option<Arc<NetworkMonitor>>,
    cancel: CancellationToken,
}

impl Default for RetryScheduler {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

impl RetryScheduler {
    /// Create a scheduler with the given policy and the tokio clock
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            clock: Arc::new(TokioClock),
            monitor: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Wait for connectivity before retrying network failures.
    pub fn with_network_monitor(mut self, monitor: Arc<NetworkMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Jittered delay for the retry following `attempt`.
    pub fn compute_backoff(&self, attempt: u32, base_delay: Duration, error: &AppError) -> Duration {
        let delay =
            self.policy
                .delay_before_jitter(attempt, base_delay, error.kind(), error.retry_after());
        self.policy.apply_jitter(delay)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or
    /// exhausts `options.max_attempts`.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::InvalidOptions`] for invalid options,
    /// [`RecoveryError::Configuration`] for an invalid backoff policy, and
    /// [`RecoveryError::Cancelled`] if the scheduler's token is cancelled
    /// before a result is produced. Operation failures are reported inside
    /// the [`RecoveryResult`].
    pub async fn with_retry<T, E, F, Fut>(
        &self,
        operation: F,
        context: &ErrorContext,
        options: &RetryOptions,
    ) -> EngineResult<RecoveryResult<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawFailure>,
    {
        self.run(operation, context, options, |_| {}, |_| {}).await
    }

    /// Like [`with_retry`](Self::with_retry), but before every attempt after
    /// the first it takes `snapshot()` and hands it straight to `restore`, so
    /// the next attempt observes the snapshot taken after the previous
    /// failure rather than whatever that failure left behind.
    ///
    /// # Errors
    ///
    /// Same as [`with_retry`](Self::with_retry).
    pub async fn with_context_preservation<T, E, F, Fut, S, Snap, Rest>(
        &self,
        operation: F,
        context: &ErrorContext,
        options: &RetryOptions,
        mut snapshot: Snap,
        mut restore: Rest,
    ) -> EngineResult<RecoveryResult<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawFailure>,
        Snap: FnMut() -> S,
        Rest: FnMut(S),
    {
        let prepare = |attempt: u32| {
            log_debug!(
                action = %context.action,
                attempt = attempt,
                "Restoring preserved state before retry"
            );
            restore(snapshot());
        };
        self.run(operation, context, options, prepare, |_| {}).await
    }

    /// Core loop shared by both variants. `prepare` runs before every attempt
    /// after the first; `observer` sees each state transition.
    pub(crate) async fn run<T, E, F, Fut, P, O>(
        &self,
        mut operation: F,
        context: &ErrorContext,
        options: &RetryOptions,
        mut prepare: P,
        mut observer: O,
    ) -> EngineResult<RecoveryResult<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawFailure>,
        P: FnMut(u32),
        O: FnMut(Transition),
    {
        options.validate()?;
        self.policy.validate()?;
        let options = options.clone();
        let mut attempt = 1;

        loop {
            if attempt > 1 {
                prepare(attempt);
            }
            observer(Transition::Attempting { attempt });

            let error = match self.attempt(&mut operation, context, attempt, &options).await? {
                Ok(data) => return Ok(RecoveryResult::succeeded(data, attempt)),
                Err(error) => error,
            };

            if !error.is_retryable() || attempt >= options.max_attempts {
                log_error!(
                    action = %context.action,
                    sequence_id = %context.sequence_id,
                    attempts = attempt,
                    error_kind = %error.kind(),
                    retryable = error.is_retryable(),
                    "Operation failed, not retrying"
                );
                return Ok(RecoveryResult::failed(error, attempt));
            }

            let delay = self.compute_backoff(attempt, options.base_delay, &error);
            log_debug!(
                action = %context.action,
                attempt = attempt,
                max_attempts = options.max_attempts,
                delay_ms = delay.as_millis(),
                error_kind = %error.kind(),
                "Operation failed, retrying after delay"
            );
            observer(Transition::Waiting {
                attempt,
                delay,
                error: error.clone(),
            });

            self.wait(delay, &context.action).await?;
            self.await_connectivity(&error, &context.action).await?;
            attempt += 1;
        }
    }

    /// Invoke the operation once and classify a failure.
    pub(crate) async fn attempt<T, E, F, Fut>(
        &self,
        operation: &mut F,
        context: &ErrorContext,
        attempt: u32,
        options: &RetryOptions,
    ) -> EngineResult<Result<T, AppError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawFailure>,
    {
        log_debug!(
            action = %context.action,
            sequence_id = %context.sequence_id,
            attempt = attempt,
            max_attempts = options.max_attempts,
            "Executing operation with retry logic"
        );

        let outcome = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                return Err(RecoveryError::cancelled(context.action.clone()));
            }
            outcome = operation() => outcome,
        };

        match outcome {
            Ok(data) => {
                log_debug!(
                    action = %context.action,
                    attempt = attempt,
                    "Operation succeeded"
                );
                Ok(Ok(data))
            }
            Err(failure) => {
                let raw: RawFailure = failure.into();
                Ok(Err(classify(&raw, context)))
            }
        }
    }

    /// Cancellable backoff wait.
    pub(crate) async fn wait(&self, delay: Duration, action: &str) -> EngineResult<()> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(RecoveryError::cancelled(action)),
            () = self.clock.sleep(delay) => Ok(()),
        }
    }

    // Offline network failures also wait for the online transition, bounded
    // by the backoff ceiling.
    pub(crate) async fn await_connectivity(&self, error: &AppError, action: &str) -> EngineResult<()> {
        let Some(monitor) = &self.monitor else {
            return Ok(());
        };
        if error.kind() != ErrorKind::Network || monitor.is_online() {
            return Ok(());
        }

        log_warn!(
            action = %action,
            max_wait_ms = self.policy.max_delay.as_millis(),
            "Network offline, waiting for connectivity before retrying"
        );

        let mut status = monitor.watch();
        let back_online = async move {
            let _ = status.wait_for(|online| *online).await;
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(RecoveryError::cancelled(action)),
            () = back_online => Ok(()),
            () = self.clock.sleep(self.policy.max_delay) => Ok(()),
        }
    }
}
