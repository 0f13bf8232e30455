//! Connectivity tracking.
//!
//! [`NetworkMonitor`] owns the process-wide online/offline status. Platform
//! signals arrive through a [`NetworkProbe`]; the monitor is the only writer
//! of the shared status and fans every transition out to its listeners in
//! registration order. [`NetworkMonitor::test_connectivity`] runs an active
//! probe that only records when it ran and never overrides the passive signal.

use crate::config::ProbeConfig;
use crate::error::{EngineResult, RecoveryError};
use crate::internals::clock::{Clock, TokioClock};
use crate::logging::{log_debug, log_error, log_info, log_warn};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Default budget for a single active probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Platform connectivity source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// Last connectivity state reported by the platform.
    fn current_status(&self) -> bool;

    /// Passive transition feed, if the platform provides one.
    fn subscribe(&self) -> Option<watch::Receiver<bool>>;

    /// Active reachability check.
    async fn probe(&self) -> bool;
}

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    entries: Mutex<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    fn entries(&self) -> MutexGuard<'_, Vec<(u64, Listener)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, listener: Listener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries().push((id, listener));
        id
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    fn snapshot(&self) -> Vec<Listener> {
        self.entries().iter().map(|(_, l)| Arc::clone(l)).collect()
    }
}

/// Registration returned by [`NetworkMonitor::on_network_change`].
///
/// Dropping the handle keeps the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug)]
pub struct ListenerHandle {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl ListenerHandle {
    /// Remove the listener. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.remove(self.id))
    }
}

/// Shared, observable connectivity state.
pub struct NetworkMonitor {
    probe: Arc<dyn NetworkProbe>,
    status: watch::Sender<bool>,
    last_tested: Mutex<Option<DateTime<Utc>>>,
    listeners: Arc<ListenerRegistry>,
    probe_timeout: Duration,
    clock: Arc<dyn Clock>,
    shutdown: Mutex<CancellationToken>,
}

impl fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("online", &self.is_online())
            .field("last_tested", &self.last_tested())
            .field("probe_timeout", &self.probe_timeout)
            .finish_non_exhaustive()
    }
}

impl NetworkMonitor {
    /// Create a monitor seeded with the probe's current status.
    pub fn new(probe: Arc<dyn NetworkProbe>) -> Self {
        let (status, _) = watch::channel(probe.current_status());
        Self {
            probe,
            status,
            last_tested: Mutex::new(None),
            listeners: Arc::new(ListenerRegistry::default()),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            clock: Arc::new(TokioClock),
            shutdown: Mutex::new(CancellationToken::new()),
        }
    }

    /// Monitor backed by an [`HttpProbe`] for the configured URL, or `None`
    /// when HTTP probing is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Configuration`] if the probe client cannot be
    /// built.
    pub fn from_probe_config(config: &ProbeConfig) -> EngineResult<Option<Self>> {
        let Some(url) = &config.url else {
            return Ok(None);
        };
        let probe = HttpProbe::new(url.clone(), config.timeout)?;
        Ok(Some(
            Self::new(Arc::new(probe)).with_probe_timeout(config.timeout),
        ))
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Last known passive state.
    pub fn is_online(&self) -> bool {
        *self.status.borrow()
    }

    /// Receiver that observes every status change.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.status.subscribe()
    }

    /// When the last active probe completed.
    pub fn last_tested(&self) -> Option<DateTime<Utc>> {
        *self
            .last_tested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener for status transitions.
    ///
    /// Safe to call at any time, including from inside another listener; a
    /// listener added during a notification first fires on the next one.
    pub fn on_network_change<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.listeners.add(Arc::new(listener));
        ListenerHandle {
            id,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.entries().len()
    }

    /// Apply a passive connectivity signal.
    ///
    /// Listeners run synchronously, in registration order, only when the
    /// status actually changes. Returns whether it changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.status.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if !changed {
            return false;
        }

        log_info!(online = online, "Network status changed");

        for listener in self.listeners.snapshot() {
            if catch_unwind(AssertUnwindSafe(|| listener(online))).is_err() {
                log_error!(online = online, "Network listener panicked");
            }
        }
        true
    }

    /// Actively check reachability.
    ///
    /// Bounded by the probe timeout and cancelled by [`teardown`](Self::teardown).
    /// Updates only the last-tested timestamp; a cancelled probe returns
    /// `false` and records nothing.
    pub async fn test_connectivity(&self) -> bool {
        let token = self.shutdown_token();
        let reachable = tokio::select! {
            biased;
            () = token.cancelled() => {
                log_debug!("Connectivity probe cancelled");
                return false;
            }
            result = tokio::time::timeout(self.probe_timeout, self.probe.probe()) => {
                result.unwrap_or_else(|_| {
                    log_warn!(
                        timeout_ms = self.probe_timeout.as_millis(),
                        "Connectivity probe timed out"
                    );
                    false
                })
            }
        };

        *self
            .last_tested
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(self.clock.now());
        log_debug!(reachable = reachable, "Connectivity probe completed");
        reachable
    }

    /// Pump the probe's passive feed into this monitor.
    ///
    /// Returns `false` when the probe has no feed. The pump stops on
    /// [`teardown`](Self::teardown), when the feed closes, or when the
    /// monitor is dropped.
    pub fn attach(self: &Arc<Self>) -> bool {
        let Some(mut feed) = self.probe.subscribe() else {
            return false;
        };
        let monitor = Arc::downgrade(self);
        let token = self.shutdown_token();

        tokio::spawn(async move {
            loop {
                let online = *feed.borrow_and_update();
                match monitor.upgrade() {
                    Some(monitor) => {
                        monitor.set_online(online);
                    }
                    None => break,
                }
                tokio::select! {
                    () = token.cancelled() => break,
                    changed = feed.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            log_debug!("Network feed pump stopped");
        });
        true
    }

    /// Cancel the feed pump and pending probes, drop every listener and reset
    /// the status to the probe's current value without notifying anyone.
    pub fn teardown(&self) {
        {
            let mut shutdown = self.shutdown.lock().unwrap_or_else(PoisonError::into_inner);
            shutdown.cancel();
            *shutdown = CancellationToken::new();
        }
        self.listeners.entries().clear();
        self.status.send_replace(self.probe.current_status());
        *self
            .last_tested
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        log_debug!("Network monitor torn down");
    }

    fn shutdown_token(&self) -> CancellationToken {
        self.shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Probe that issues a lightweight `HEAD` request.
///
/// Any response, whatever its status, counts as reachable. There is no
/// passive feed; the platform status is assumed online.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    /// Create a probe for `url` with its own request timeout
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::Configuration`] if the HTTP client cannot be
    /// built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecoveryError::configuration(format!("Failed to build probe client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NetworkProbe for HttpProbe {
    fn current_status(&self) -> bool {
        true
    }

    fn subscribe(&self) -> Option<watch::Receiver<bool>> {
        None
    }

    async fn probe(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(response) => {
                log_debug!(url = %self.url, status = %response.status(), "Probe reached endpoint");
                true
            }
            Err(e) => {
                log_debug!(url = %self.url, error = %e, "Probe failed to reach endpoint");
                false
            }
        }
    }
}

/// Probe driven by an explicit signal.
///
/// Host applications feed OS connectivity events through
/// [`set`](Self::set); tests use it to simulate transitions.
#[derive(Debug)]
pub struct SignalProbe {
    signal: watch::Sender<bool>,
}

impl SignalProbe {
    pub fn new(online: bool) -> Self {
        let (signal, _) = watch::channel(online);
        Self { signal }
    }

    pub fn set(&self, online: bool) {
        self.signal.send_replace(online);
    }
}

#[async_trait]
impl NetworkProbe for SignalProbe {
    fn current_status(&self) -> bool {
        *self.signal.borrow()
    }

    fn subscribe(&self) -> Option<watch::Receiver<bool>> {
        Some(self.signal.subscribe())
    }

    async fn probe(&self) -> bool {
        self.current_status()
    }
}
