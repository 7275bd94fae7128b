//! Interval-driven polling loop.
//!
//! Starting is idempotent: at most one loop runs per `Poller`. The first
//! tick fires immediately, then once per period. A closed poller refuses
//! to start until it is reopened.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

#[derive(Default)]
struct PollerState {
    handle: Option<JoinHandle<()>>,
    closed: bool,
}

#[derive(Clone, Default)]
pub struct Poller {
    inner: Arc<Mutex<PollerState>>,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the loop unless one is already running, the poller is closed
    /// or `period` is zero. Returns true if this call started it.
    pub fn start<F, Fut>(&self, period: Duration, tick: F) -> bool
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period.is_zero() {
            tracing::warn!("refusing to poll with a zero interval");
            return false;
        }
        let Ok(mut state) = self.inner.lock() else {
            return false;
        };
        if state.closed || state.handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }

        tracing::info!(period_ms = period.as_millis() as u64, "polling started");
        state.handle = Some(tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick().await;
            }
        }));
        true
    }

    /// Stop the loop. Returns true if one was running.
    pub fn stop(&self) -> bool {
        let Ok(mut state) = self.inner.lock() else {
            return false;
        };
        Self::abort(&mut state)
    }

    /// Stop the loop and refuse further starts until [`Poller::open`].
    pub fn close(&self) -> bool {
        let Ok(mut state) = self.inner.lock() else {
            return false;
        };
        state.closed = true;
        Self::abort(&mut state)
    }

    pub fn open(&self) {
        if let Ok(mut state) = self.inner.lock() {
            state.closed = false;
        }
    }

    fn abort(state: &mut PollerState) -> bool {
        match state.handle.take() {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                if was_running {
                    tracing::info!("polling stopped");
                }
                was_running
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .lock()
            .map(|s| s.handle.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let poller = Poller::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = ticks.clone();
        assert!(poller.start(Duration::from_millis(20), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));
        let counter = ticks.clone();
        assert!(!poller.start(Duration::from_millis(20), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(100, Ordering::SeqCst);
            }
        }));

        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(poller.is_running());
        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 3, "expected several ticks, got {}", seen);
        assert!(seen < 100, "second loop must not have started");

        assert!(poller.stop());
        assert!(!poller.is_running());
        assert!(!poller.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_period() {
        let poller = Poller::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        poller.start(Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        // immediate first tick
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 4);

        poller.stop();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 4);
    }

    fn noop() -> impl Fn() -> std::future::Ready<()> + Send + 'static {
        || std::future::ready(())
    }

    #[tokio::test]
    async fn test_closed_poller_refuses_to_start() {
        let poller = Poller::new();
        assert!(poller.start(Duration::from_millis(50), noop()));

        assert!(poller.close());
        assert!(!poller.is_running());
        assert!(!poller.start(Duration::from_millis(50), noop()));
        assert!(!poller.is_running());

        poller.open();
        assert!(poller.start(Duration::from_millis(50), noop()));
        assert!(poller.stop());
    }

    #[tokio::test]
    async fn test_zero_period_is_rejected() {
        let poller = Poller::new();
        assert!(!poller.start(Duration::ZERO, noop()));
        assert!(!poller.is_running());
    }
}
