//! Recovery controller consumed by call sites.
//!
//! A [`RecoveryController`] wraps the [`RetryScheduler`] for one call site
//! (chat send, progress save, profile load, ...). It runs at most one
//! sequence at a time and publishes a [`RecoveryStatus`] that moves through
//! the phases
//!
//! ```text
//! Idle ──▶ Attempting ──▶ Succeeded
//!              │  ▲
//!              ▼  │
//!            Waiting ──▶ Failed ──(handle_retry)──▶ Waiting
//! ```
//!
//! Terminal outcomes are forwarded to the optional `on_error` and
//! `on_recovery` callbacks exactly once. Cancellation (through
//! [`clear_error`](RecoveryController::clear_error) or
//! [`shutdown`](RecoveryController::shutdown)) produces no result and fires no
//! callback.

use crate::classifier::{classify, RawFailure};
use crate::config::{ConcurrencyMode, RecoveryConfig};
use crate::core_types::{
    AppError, ContextDefaults, ContextOverrides, ErrorContext, RecoveryResult, RecoverySummary,
};
use crate::error::{EngineResult, RecoveryError};
use crate::internals::clock::Clock;
use crate::logging::{log_debug, log_error, log_info};
use crate::network::NetworkMonitor;
use crate::notifier::{Notification, Notifier};
use crate::retry::{RetryOptions, RetryOverrides, RetryScheduler, Transition};

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

/// Phase of the controller's state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPhase {
    #[default]
    Idle,
    Attempting,
    Waiting,
    Succeeded,
    Failed,
}

/// Observable controller state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecoveryStatus {
    pub phase: RecoveryPhase,
    /// A sequence or manual retry is in flight.
    pub is_retrying: bool,
    /// Attempts made so far; monotonic within a sequence.
    pub attempts_made: u32,
    /// The stored terminal error, if any.
    pub error: Option<AppError>,
    /// Display-ready text for `error`.
    pub notification: Option<Notification>,
    pub last_recovery_attempt: Option<DateTime<Utc>>,
}

pub type ErrorCallback = Arc<dyn Fn(&AppError) + Send + Sync>;
pub type RecoveryCallback = Arc<dyn Fn(&RecoverySummary) + Send + Sync>;

type BoxedOperation<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, RawFailure>> + Send + Sync>;
type PrepareFn = Arc<dyn Fn() + Send + Sync>;

/// Last operation, kept so a manual retry can re-run it.
struct RememberedOperation<T> {
    operation: BoxedOperation<T>,
    prepare: Option<PrepareFn>,
    context: ErrorContext,
    options: RetryOptions,
}

impl<T> Clone for RememberedOperation<T> {
    fn clone(&self) -> Self {
        Self {
            operation: Arc::clone(&self.operation),
            prepare: self.prepare.clone(),
            context: self.context.clone(),
            options: self.options.clone(),
        }
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Façade over classification, retry scheduling and notification for one call site.
pub struct RecoveryController<T> {
    defaults: ContextDefaults,
    options: RetryOptions,
    concurrency: ConcurrencyMode,
    scheduler: RetryScheduler,
    notifier: Notifier,
    status: watch::Sender<RecoveryStatus>,
    in_flight: tokio::sync::Mutex<()>,
    cancel: Mutex<CancellationToken>,
    last_operation: Mutex<Option<RememberedOperation<T>>>,
    on_error: Mutex<Option<ErrorCallback>>,
    on_recovery: Mutex<Option<RecoveryCallback>>,
}

impl<T> std::fmt::Debug for RecoveryController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryController")
            .field("defaults", &self.defaults)
            .field("options", &self.options)
            .field("concurrency", &self.concurrency)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> RecoveryController<T> {
    /// Create a controller for a call site
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::InvalidOptions`] or
    /// [`RecoveryError::Configuration`] if `config` fails validation.
    pub fn new(defaults: ContextDefaults, config: &RecoveryConfig) -> EngineResult<Self> {
        config.validate()?;
        let (status, _) = watch::channel(RecoveryStatus::default());

        log_debug!(
            action = %defaults.action,
            max_attempts = config.retry.max_attempts,
            concurrency = ?config.concurrency,
            "RecoveryController created"
        );

        Ok(Self {
            defaults,
            options: config.retry.clone(),
            concurrency: config.concurrency,
            scheduler: RetryScheduler::new(config.backoff.clone()),
            notifier: Notifier::new(),
            status,
            in_flight: tokio::sync::Mutex::new(()),
            cancel: Mutex::new(CancellationToken::new()),
            last_operation: Mutex::new(None),
            on_error: Mutex::new(None),
            on_recovery: Mutex::new(None),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.scheduler = self.scheduler.with_clock(clock);
        self
    }

    pub fn with_network_monitor(mut self, monitor: Arc<NetworkMonitor>) -> Self {
        self.scheduler = self.scheduler.with_network_monitor(monitor);
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_on_error<F>(self, callback: F) -> Self
    where
        F: Fn(&AppError) + Send + Sync + 'static,
    {
        self.set_on_error(callback);
        self
    }

    pub fn with_on_recovery<F>(self, callback: F) -> Self
    where
        F: Fn(&RecoverySummary) + Send + Sync + 'static,
    {
        self.set_on_recovery(callback);
        self
    }

    pub fn set_on_error<F>(&self, callback: F)
    where
        F: Fn(&AppError) + Send + Sync + 'static,
    {
        *lock(&self.on_error) = Some(Arc::new(callback));
    }

    pub fn set_on_recovery<F>(&self, callback: F)
    where
        F: Fn(&RecoverySummary) + Send + Sync + 'static,
    {
        *lock(&self.on_recovery) = Some(Arc::new(callback));
    }

    /// Drop both callbacks; the caller owns their lifecycle.
    pub fn clear_callbacks(&self) {
        *lock(&self.on_error) = None;
        *lock(&self.on_recovery) = None;
    }

    pub fn status(&self) -> RecoveryStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecoveryStatus> {
        self.status.subscribe()
    }

    /// Stream of status snapshots, starting with the current one.
    pub fn status_stream(&self) -> WatchStream<RecoveryStatus> {
        WatchStream::new(self.status.subscribe())
    }

    /// Display-ready text for the stored error.
    pub fn notification(&self) -> Option<Notification> {
        self.status.borrow().notification.clone()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Classify a failure and store it as the current error.
    ///
    /// No recovery is attempted and nothing is remembered for
    /// [`handle_retry`](Self::handle_retry).
    pub fn handle_error(&self, failure: impl Into<RawFailure>, overrides: ContextOverrides) -> AppError {
        let context = self.build_context(overrides);
        let error = classify(&failure.into(), &context);
        *lock(&self.last_operation) = None;

        let notification = self.notifier.notify(&error);
        self.status.send_modify(|status| {
            status.phase = RecoveryPhase::Failed;
            status.is_retrying = false;
            status.error = Some(error.clone());
            status.notification = Some(notification);
        });

        self.fire_on_error(&error);
        error
    }

    /// Run `operation` with retries and update the observable status.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Busy`] when another sequence is in flight and
    /// the controller rejects concurrent calls, [`RecoveryError::InvalidOptions`]
    /// for bad overrides, and [`RecoveryError::Cancelled`] when the sequence is
    /// cancelled. Operation failures are reported in the [`RecoveryResult`].
    pub async fn execute_with_error_handling<F, Fut, E>(
        &self,
        operation: F,
        overrides: ContextOverrides,
        retry_overrides: RetryOverrides,
    ) -> EngineResult<RecoveryResult<T>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<RawFailure> + 'static,
    {
        self.run_sequence(box_operation(operation), None, overrides, retry_overrides)
            .await
    }

    /// Like [`execute_with_error_handling`](Self::execute_with_error_handling),
    /// restoring `snapshot()` through `restore` before every retry.
    ///
    /// # Errors
    ///
    /// Same as [`execute_with_error_handling`](Self::execute_with_error_handling).
    pub async fn execute_with_context_preservation<F, Fut, E, S, Snap, Rest>(
        &self,
        operation: F,
        overrides: ContextOverrides,
        retry_overrides: RetryOverrides,
        snapshot: Snap,
        restore: Rest,
    ) -> EngineResult<RecoveryResult<T>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<RawFailure> + 'static,
        S: 'static,
        Snap: Fn() -> S + Send + Sync + 'static,
        Rest: Fn(S) + Send + Sync + 'static,
    {
        let prepare: PrepareFn = Arc::new(move || restore(snapshot()));
        self.run_sequence(
            box_operation(operation),
            Some(prepare),
            overrides,
            retry_overrides,
        )
        .await
    }

    /// Manually schedule one more attempt of the last operation.
    ///
    /// Only runs when the stored error is retryable and an operation is
    /// remembered; returns `Ok(None)` otherwise. The delay is computed from
    /// the current attempt count, not restarted from the first attempt. After
    /// an offline `network` failure it also waits for connectivity, as
    /// automatic retries do.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Busy`] or [`RecoveryError::Cancelled`] like
    /// [`execute_with_error_handling`](Self::execute_with_error_handling).
    pub async fn handle_retry(&self) -> EngineResult<Option<RecoveryResult<T>>> {
        // Status is read under the guard so a queued retry sees the latest error.
        let _guard = self.acquire(&self.defaults.action).await?;
        let status = self.status();
        let Some(error) = status.error.filter(AppError::is_retryable) else {
            log_debug!(
                action = %self.defaults.action,
                "Manual retry skipped: no retryable error stored"
            );
            return Ok(None);
        };
        let Some(remembered) = lock(&self.last_operation).clone() else {
            log_debug!(
                action = %self.defaults.action,
                "Manual retry skipped: no operation to retry"
            );
            return Ok(None);
        };

        let token = self.begin_sequence();
        let scheduler = self.scheduler.clone().with_cancellation(token.clone());
        let context = &remembered.context;

        let current_attempts = status.attempts_made.max(1);
        let delay = scheduler.compute_backoff(current_attempts, remembered.options.base_delay, &error);
        let now = scheduler.clock().now();
        self.update_if_active(&token, |s| {
            s.phase = RecoveryPhase::Waiting;
            s.is_retrying = true;
            s.last_recovery_attempt = Some(now);
        });
        log_info!(
            action = %context.action,
            attempt = current_attempts + 1,
            delay_ms = delay.as_millis(),
            "Scheduling manual retry"
        );

        scheduler.wait(delay, &context.action).await?;
        scheduler.await_connectivity(&error, &context.action).await?;
        if let Some(prepare) = &remembered.prepare {
            prepare();
        }

        let attempt = current_attempts + 1;
        self.update_if_active(&token, |s| {
            s.phase = RecoveryPhase::Attempting;
            s.attempts_made = attempt;
        });

        let mut operation = || (remembered.operation)();
        let outcome = scheduler
            .attempt(&mut operation, context, attempt, &remembered.options)
            .await?;
        let result = match outcome {
            Ok(data) => RecoveryResult::succeeded(data, 1),
            Err(error) => RecoveryResult::failed(error, 1),
        };

        self.finish(&token, &result, attempt, true)?;
        Ok(Some(result))
    }

    /// Reset status to its initial values and cancel anything pending.
    ///
    /// Calling it again is a no-op that does not notify observers.
    pub fn clear_error(&self) {
        lock(&self.cancel).cancel();
        *lock(&self.last_operation) = None;
        let changed = self.status.send_if_modified(|status| {
            if *status == RecoveryStatus::default() {
                return false;
            }
            *status = RecoveryStatus::default();
            true
        });
        if changed {
            log_debug!(action = %self.defaults.action, "Recovery status cleared");
        }
    }

    /// Cancel anything pending without resetting the stored error.
    pub fn shutdown(&self) {
        lock(&self.cancel).cancel();
        self.status.send_if_modified(|status| {
            if !status.is_retrying {
                return false;
            }
            status.is_retrying = false;
            if matches!(status.phase, RecoveryPhase::Attempting | RecoveryPhase::Waiting) {
                status.phase = if status.error.is_some() {
                    RecoveryPhase::Failed
                } else {
                    RecoveryPhase::Idle
                };
            }
            true
        });
    }

    async fn run_sequence(
        &self,
        operation: BoxedOperation<T>,
        prepare: Option<PrepareFn>,
        overrides: ContextOverrides,
        retry_overrides: RetryOverrides,
    ) -> EngineResult<RecoveryResult<T>> {
        let context = self.build_context(overrides);
        let options = self.options.with_overrides(&retry_overrides);
        options.validate()?;

        let _guard = self.acquire(&context.action).await?;
        let token = self.begin_sequence();
        let scheduler = self.scheduler.clone().with_cancellation(token.clone());

        *lock(&self.last_operation) = Some(RememberedOperation {
            operation: Arc::clone(&operation),
            prepare: prepare.clone(),
            context: context.clone(),
            options: options.clone(),
        });

        let started = scheduler.clock().now();
        self.update_if_active(&token, |s| {
            *s = RecoveryStatus {
                phase: RecoveryPhase::Attempting,
                is_retrying: true,
                attempts_made: 0,
                error: None,
                notification: None,
                last_recovery_attempt: Some(started),
            };
        });

        let run_prepare = |_attempt: u32| {
            if let Some(prepare) = &prepare {
                prepare();
            }
        };
        let observe = |transition: Transition| match transition {
            Transition::Attempting { attempt } => self.update_if_active(&token, |s| {
                s.phase = RecoveryPhase::Attempting;
                s.attempts_made = attempt;
            }),
            Transition::Waiting { .. } => self.update_if_active(&token, |s| {
                s.phase = RecoveryPhase::Waiting;
            }),
        };

        let result = scheduler
            .run(|| operation(), &context, &options, run_prepare, observe)
            .await?;

        let recovered = result.attempts_made() > 1;
        self.finish(&token, &result, result.attempts_made(), recovered)?;
        Ok(result)
    }

    // Publishes the terminal status, then fires callbacks. A sequence whose
    // token was cancelled meanwhile reports cancellation instead.
    fn finish(
        &self,
        token: &CancellationToken,
        result: &RecoveryResult<T>,
        attempts_made: u32,
        recovered: bool,
    ) -> EngineResult<()> {
        if token.is_cancelled() {
            return Err(RecoveryError::cancelled(self.defaults.action.clone()));
        }

        let notification = result.error().map(|e| self.notifier.notify(e));
        self.status.send_modify(|s| {
            s.phase = if result.is_success() {
                RecoveryPhase::Succeeded
            } else {
                RecoveryPhase::Failed
            };
            s.is_retrying = false;
            s.attempts_made = attempts_made;
            s.error = result.error().cloned();
            s.notification = notification;
        });

        match result.error() {
            Some(error) => self.fire_on_error(error),
            None => {
                *lock(&self.last_operation) = None;
                if recovered {
                    log_info!(
                        action = %self.defaults.action,
                        attempts_made = attempts_made,
                        "Operation recovered after retry"
                    );
                    self.fire_on_recovery(&result.summary());
                }
            }
        }
        Ok(())
    }

    fn build_context(&self, overrides: ContextOverrides) -> ErrorContext {
        self.defaults.build(overrides, self.scheduler.clock().now())
    }

    async fn acquire(&self, action: &str) -> EngineResult<tokio::sync::MutexGuard<'_, ()>> {
        match self.concurrency {
            ConcurrencyMode::Reject => self
                .in_flight
                .try_lock()
                .map_err(|_| RecoveryError::busy(action)),
            ConcurrencyMode::Queue => Ok(self.in_flight.lock().await),
        }
    }

    fn begin_sequence(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *lock(&self.cancel) = token.clone();
        token
    }

    fn update_if_active(&self, token: &CancellationToken, update: impl FnOnce(&mut RecoveryStatus)) {
        if !token.is_cancelled() {
            self.status.send_modify(update);
        }
    }

    fn fire_on_error(&self, error: &AppError) {
        let callback = lock(&self.on_error).clone();
        if let Some(callback) = callback {
            if catch_unwind(AssertUnwindSafe(|| callback(error))).is_err() {
                log_error!(
                    action = %self.defaults.action,
                    callback = "on_error",
                    "Recovery callback panicked"
                );
            }
        }
    }

    fn fire_on_recovery(&self, summary: &RecoverySummary) {
        let callback = lock(&self.on_recovery).clone();
        if let Some(callback) = callback {
            if catch_unwind(AssertUnwindSafe(|| callback(summary))).is_err() {
                log_error!(
                    action = %self.defaults.action,
                    callback = "on_recovery",
                    "Recovery callback panicked"
                );
            }
        }
    }
}

fn box_operation<T, F, Fut, E>(operation: F) -> BoxedOperation<T>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<RawFailure> + 'static,
{
    Arc::new(move || -> BoxFuture<'static, Result<T, RawFailure>> {
        let pending = operation();
        async move { pending.await.map_err(Into::<RawFailure>::into) }.boxed()
    })
}
