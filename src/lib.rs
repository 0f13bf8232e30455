//! # error-recovery
//!
//! Error classification and recovery engine for async operations.
//!
//! ## Key Features
//!
//! - **Classification**: Raw failures (transport, timeouts, HTTP statuses, free-form
//!   messages) map onto a closed taxonomy with severity and retry guidance
//! - **Retry Scheduling**: Bounded attempts with exponential backoff, per-kind
//!   multipliers and jitter
//! - **State Preservation**: Snapshot/restore of caller state before every retry
//! - **Connectivity**: Observable online/offline status with active probing
//! - **User Messages**: Display-ready messages and recovery suggestions per kind
//!
//! ## Example
//!
//! ```rust,no_run
//! use error_recovery::{
//!     ContextDefaults, ContextOverrides, RawFailure, RecoveryConfig, RecoveryController,
//!     RetryOverrides,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let controller: RecoveryController<String> =
//!     RecoveryController::new(ContextDefaults::new("send_message"), &RecoveryConfig::default())?
//!         .with_on_error(|error| eprintln!("giving up: {error}"));
//!
//! let result = controller
//!     .execute_with_error_handling(
//!         || async { Ok::<_, RawFailure>("delivered".to_string()) },
//!         ContextOverrides::default(),
//!         RetryOverrides::default(),
//!     )
//!     .await?;
//!
//! if let Some(error) = result.error() {
//!     println!("{}", controller.notifier().user_message(error));
//! }
//! # Ok(())
//! # }
//! ```

// Engine errors are documented once on RecoveryError rather than per function
#![allow(clippy::missing_errors_doc)]

pub mod core_types;

// tracing macros under log_* names, crate-private
pub(crate) mod logging;

pub mod classifier;
pub mod config;
pub mod controller;
pub mod error;
pub(crate) mod internals;
pub mod network;
pub mod notifier;
pub mod retry;

#[cfg(test)]
pub mod tests;

// Re-export main types
pub use classifier::{classify, RawFailure};
pub use config::{ConcurrencyMode, ProbeConfig, RecoveryConfig};
pub use controller::{RecoveryController, RecoveryPhase, RecoveryStatus};
pub use error::{EngineResult, RecoveryError};
pub use internals::clock::{Clock, TokioClock};
pub use network::{HttpProbe, ListenerHandle, NetworkMonitor, NetworkProbe, SignalProbe};
pub use notifier::{MessageCatalog, MessageEntry, Notification, Notifier};
pub use retry::{BackoffPolicy, Jitter, RetryOptions, RetryOverrides, RetryScheduler, Transition};

pub use core_types::{
    AppError, ContextDefaults, ContextOverrides, ErrorContext, ErrorKind, ErrorSeverity,
    RecoveryResult, RecoverySummary,
};
