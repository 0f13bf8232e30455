// Unit Tests for Connectivity Tracking
//
// UNIT UNDER TEST: NetworkMonitor / SignalProbe
//
// BUSINESS RESPONSIBILITY:
//   - Owns the shared online/offline status and notifies listeners on transitions
//   - Runs bounded, cancellable active probes without overriding passive signals
//   - Pumps a platform feed into the shared status until teardown
//
// TEST COVERAGE:
//   - Listener delivery: once per transition, in registration order
//   - Unsubscribe semantics, including from inside a listener
//   - Panic isolation between listeners
//   - Active probe bookkeeping, timeout and teardown cancellation
//   - Feed pumping from a signal probe

use crate::network::{MockNetworkProbe, NetworkMonitor, NetworkProbe, SignalProbe};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};

fn monitor_starting(online: bool) -> Arc<NetworkMonitor> {
    Arc::new(NetworkMonitor::new(Arc::new(SignalProbe::new(online))))
}

/// Probe that never answers within any reasonable budget.
struct SlowProbe {
    started: Arc<Notify>,
}

#[async_trait]
impl NetworkProbe for SlowProbe {
    fn current_status(&self) -> bool {
        true
    }

    fn subscribe(&self) -> Option<watch::Receiver<bool>> {
        None
    }

    async fn probe(&self) -> bool {
        self.started.notify_one();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        true
    }
}

#[cfg(test)]
mod listener_tests {
    use super::*;

    #[test]
    fn test_listener_fires_once_per_transition() {
        // Test verifies listeners see every real transition exactly once
        // Ensures repeated identical signals do not spam the UI

        // Arrange
        let monitor = monitor_starting(false);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        monitor.on_network_change(move |online| sink.lock().unwrap().push(online));

        // Act
        let first = monitor.set_online(true);
        let duplicate = monitor.set_online(true);
        monitor.set_online(false);

        // Assert
        assert!(first);
        assert!(!duplicate, "Same status must not count as a change");
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
        assert!(!monitor.is_online());
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let monitor = monitor_starting(true);
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["banner", "queue", "composer"] {
            let order = Arc::clone(&order);
            monitor.on_network_change(move |_| order.lock().unwrap().push(name));
        }
        monitor.set_online(false);

        assert_eq!(*order.lock().unwrap(), vec!["banner", "queue", "composer"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        // Arrange
        let monitor = monitor_starting(true);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = monitor.on_network_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Act
        monitor.set_online(false);
        let removed = handle.unsubscribe();
        monitor.set_online(true);

        // Assert
        assert!(removed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.listener_count(), 0);
    }

    #[test]
    fn test_unsubscribe_after_teardown_reports_missing() {
        let monitor = monitor_starting(true);
        let handle = monitor.on_network_change(|_| {});

        monitor.teardown();

        assert!(!handle.unsubscribe(), "Listener was already dropped by teardown");
    }

    #[test]
    fn test_listener_may_unsubscribe_itself_during_notification() {
        // Test verifies registry changes from inside a listener are safe
        // Ensures a one-shot "back online" handler can remove itself

        // Arrange
        let monitor = monitor_starting(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<crate::network::ListenerHandle>>> = Arc::new(Mutex::new(None));

        let counter = Arc::clone(&calls);
        let own_slot = Arc::clone(&slot);
        let handle = monitor.on_network_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = own_slot.lock().unwrap().take() {
                handle.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(handle);

        // Act
        monitor.set_online(true);
        monitor.set_online(false);

        // Assert
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.listener_count(), 0);
    }

    #[test]
    fn test_listener_added_during_notification_fires_next_time() {
        // Arrange
        let monitor = monitor_starting(false);
        let late_calls = Arc::new(AtomicUsize::new(0));
        let registered = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&monitor);
        let late = Arc::clone(&late_calls);
        let once = Arc::clone(&registered);
        monitor.on_network_change(move |_| {
            if once.fetch_add(1, Ordering::SeqCst) == 0 {
                if let Some(monitor) = weak.upgrade() {
                    let late = Arc::clone(&late);
                    monitor.on_network_change(move |_| {
                        late.fetch_add(1, Ordering::SeqCst);
                    });
                }
            }
        });

        // Act
        monitor.set_online(true);
        let after_first = late_calls.load(Ordering::SeqCst);
        monitor.set_online(false);

        // Assert
        assert_eq!(after_first, 0);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        // Test verifies a faulty listener cannot break fan-out
        // Ensures the offline banner still updates when another subscriber panics

        // Arrange
        let monitor = monitor_starting(true);
        let calls = Arc::new(AtomicUsize::new(0));
        monitor.on_network_change(|_| panic!("listener bug"));
        let counter = Arc::clone(&calls);
        monitor.on_network_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Act
        let changed = monitor.set_online(false);

        // Assert
        assert!(changed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!monitor.is_online());
    }
}

#[cfg(test)]
mod active_probe_tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_result_does_not_override_passive_status() {
        // Test verifies active probes only record when they ran
        // Ensures a failed probe cannot flip the app offline by itself

        // Arrange
        let mut probe = MockNetworkProbe::new();
        probe.expect_current_status().return_const(true);
        probe.expect_probe().times(1).returning(|| false);
        let monitor = NetworkMonitor::new(Arc::new(probe));

        // Act
        let reachable = monitor.test_connectivity().await;

        // Assert
        assert!(!reachable);
        assert!(monitor.is_online(), "Passive status must be unchanged");
        assert!(monitor.last_tested().is_some());
    }

    #[tokio::test]
    async fn test_successful_probe_records_timestamp() {
        let mut probe = MockNetworkProbe::new();
        probe.expect_current_status().return_const(false);
        probe.expect_probe().returning(|| true);
        let monitor = NetworkMonitor::new(Arc::new(probe));
        assert!(monitor.last_tested().is_none());

        assert!(monitor.test_connectivity().await);
        assert!(monitor.last_tested().is_some());
        assert!(!monitor.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_is_bounded_by_timeout() {
        // Arrange
        let probe = SlowProbe {
            started: Arc::new(Notify::new()),
        };
        let monitor =
            NetworkMonitor::new(Arc::new(probe)).with_probe_timeout(Duration::from_secs(5));

        // Act
        let reachable = monitor.test_connectivity().await;

        // Assert
        assert!(!reachable, "Timed out probe counts as unreachable");
        assert!(monitor.last_tested().is_some());
    }

    #[tokio::test]
    async fn test_teardown_cancels_pending_probe() {
        // Test verifies teardown aborts an in-flight probe without recording it
        // Ensures a probe never completes against a torn-down monitor

        // Arrange
        let started = Arc::new(Notify::new());
        let probe = SlowProbe {
            started: Arc::clone(&started),
        };
        let monitor = Arc::new(
            NetworkMonitor::new(Arc::new(probe)).with_probe_timeout(Duration::from_secs(3600)),
        );
        let pending = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.test_connectivity().await })
        };
        started.notified().await;

        // Act
        monitor.teardown();
        let reachable = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .expect("probe should be cancelled promptly")
            .unwrap();

        // Assert
        assert!(!reachable);
        assert!(monitor.last_tested().is_none());
    }

    #[tokio::test]
    async fn test_teardown_resets_status_to_platform_value() {
        let monitor = monitor_starting(true);
        monitor.on_network_change(|_| {});
        monitor.set_online(false);
        monitor.test_connectivity().await;

        monitor.teardown();

        assert!(monitor.is_online());
        assert_eq!(monitor.listener_count(), 0);
        assert!(monitor.last_tested().is_none());
    }
}

#[cfg(test)]
mod feed_pump_tests {
    use super::*;

    #[tokio::test]
    async fn test_attach_pumps_signal_transitions() {
        // Test verifies platform signals reach the shared status and listeners
        // Ensures OS connectivity events drive the offline banner

        // Arrange
        let probe = Arc::new(SignalProbe::new(true));
        let monitor = Arc::new(NetworkMonitor::new(probe.clone()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        monitor.on_network_change(move |online| sink.lock().unwrap().push(online));
        let mut status = monitor.watch();

        // Act
        let attached = monitor.attach();
        probe.set(false);
        let offline = tokio::time::timeout(Duration::from_secs(5), status.wait_for(|online| !*online))
            .await
            .expect("pump should deliver the transition")
            .map(|value| *value);

        // Assert
        assert!(attached);
        assert_eq!(offline.ok(), Some(false));
        assert_eq!(*seen.lock().unwrap(), vec![false]);
    }

    #[test]
    fn test_probe_config_without_url_builds_no_monitor() {
        let config = crate::config::ProbeConfig::default();

        let monitor = NetworkMonitor::from_probe_config(&config).unwrap();

        assert!(monitor.is_none());
    }

    #[tokio::test]
    async fn test_attach_without_feed_returns_false() {
        let mut probe = MockNetworkProbe::new();
        probe.expect_current_status().return_const(true);
        probe.expect_subscribe().returning(|| None);
        let monitor = Arc::new(NetworkMonitor::new(Arc::new(probe)));

        assert!(!monitor.attach());
    }
}
