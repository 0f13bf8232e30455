//! Injected time source.
//!
//! Backoff waits and timestamps go through [`Clock`] instead of calling tokio
//! or chrono directly, so retry sequences can be driven deterministically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Source of wall-clock time and suspension.
#[async_trait]
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Suspend for `duration`. Dropping the future cancels the wait.
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by the tokio timer.
///
/// Honors `tokio::time::pause`, so paused-time tests advance instantly.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
