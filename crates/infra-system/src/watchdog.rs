// Read-timeout watchdog: periodic liveness check owned by one run
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Counts live watchdogs of one runner instance (observability + tests)
#[derive(Clone, Default)]
pub struct WatchdogRegistry {
    active: Arc<AtomicUsize>,
}

impl WatchdogRegistry {
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn lease(&self) -> WatchdogLease {
        self.active.fetch_add(1, Ordering::SeqCst);
        WatchdogLease {
            active: Arc::clone(&self.active),
        }
    }
}

/// Released on drop
struct WatchdogLease {
    active: Arc<AtomicUsize>,
}

impl Drop for WatchdogLease {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Periodic timer comparing read silence against the read timeout
///
/// The poll interval is independent of the timeout, so a silent process
/// is killed within `[read_timeout, read_timeout + poll_interval]`.
pub(crate) struct Watchdog {
    interval: Interval,
    read_timeout_ms: i64,
    _lease: WatchdogLease,
}

impl Watchdog {
    /// First tick fires one poll interval after start
    pub(crate) fn start(
        read_timeout: Duration,
        poll_interval: Duration,
        registry: &WatchdogRegistry,
    ) -> Self {
        let mut interval = interval_at(Instant::now() + poll_interval, poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            interval,
            read_timeout_ms: i64::try_from(read_timeout.as_millis()).unwrap_or(i64::MAX),
            _lease: registry.lease(),
        }
    }

    pub(crate) async fn tick(&mut self) {
        self.interval.tick().await;
    }

    /// Has the silence exceeded the read timeout?
    pub(crate) fn is_breached(&self, silence_ms: i64) -> bool {
        silence_ms > self.read_timeout_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test]
    async fn test_registry_counts_leases() {
        let registry = WatchdogRegistry::default();
        let first = Watchdog::start(Duration::from_secs(1), Duration::from_secs(1), &registry);
        let second = Watchdog::start(Duration::from_secs(1), Duration::from_secs(1), &registry);
        assert_eq!(registry.active(), 2);

        drop(first);
        assert_eq!(registry.active(), 1);
        drop(second);
        assert_eq!(registry.active(), 0);
    }

    #[tokio::test]
    async fn test_breach_is_strictly_greater() {
        let registry = WatchdogRegistry::default();
        let watchdog = Watchdog::start(
            Duration::from_millis(500),
            Duration::from_millis(100),
            &registry,
        );

        assert!(!watchdog.is_breached(500));
        assert!(watchdog.is_breached(501));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_interval() {
        let registry = WatchdogRegistry::default();
        let mut watchdog = Watchdog::start(
            Duration::from_millis(50),
            Duration::from_millis(1000),
            &registry,
        );

        let mut tick = tokio_test::task::spawn(watchdog.tick());
        assert_pending!(tick.poll());

        tokio::time::advance(Duration::from_millis(999)).await;
        assert_pending!(tick.poll());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_ready!(tick.poll());
    }
}
