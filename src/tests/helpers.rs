//! Test helper utilities shared across unit test modules
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

#![allow(dead_code)]

use crate::classifier::RawFailure;
use crate::core_types::ErrorContext;
use crate::internals::clock::Clock;
use crate::retry::{BackoffPolicy, Jitter, RetryOptions};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Clock that records every requested sleep and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for RecordingClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}

/// Clock whose sleeps never finish, for cancellation tests.
#[derive(Debug, Default)]
pub struct PendingClock;

#[async_trait]
impl Clock for PendingClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, _duration: Duration) {
        std::future::pending::<()>().await;
    }
}

/// Backoff policy without jitter so recorded delays are exact.
pub fn deterministic_policy() -> BackoffPolicy {
    BackoffPolicy {
        jitter: Jitter::None,
        ..BackoffPolicy::default()
    }
}

pub fn options(max_attempts: u32, base_delay_ms: u64) -> RetryOptions {
    RetryOptions::new(max_attempts, Duration::from_millis(base_delay_ms))
}

pub fn test_context(action: &str) -> ErrorContext {
    ErrorContext::new(action)
        .with_url("https://app.example.com/chat")
        .with_client_fingerprint("test-agent/1.0")
}

/// Counts calls and fails the first `failures` of them with `failure`.
#[derive(Debug, Clone)]
pub struct ScriptedOperation {
    calls: Arc<AtomicU32>,
    failures: u32,
    failure: RawFailure,
}

impl ScriptedOperation {
    pub fn failing(failures: u32, failure: RawFailure) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            failures,
            failure,
        }
    }

    pub fn always_failing(failure: RawFailure) -> Self {
        Self::failing(u32::MAX, failure)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Invoke once; the returned future resolves to the scripted outcome.
    pub fn call(&self) -> impl std::future::Future<Output = Result<String, RawFailure>> + Send {
        let count = self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = if count < self.failures {
            Err(self.failure.clone())
        } else {
            Ok(format!("success after {} calls", count + 1))
        };
        async move { outcome }
    }
}
