//! Periodic purge of expired state.
//!
//! # Responsibilities
//! - Run every registered purge target on a fixed interval
//! - Isolate failures: a panicking target is logged and the cycle moves on
//! - Explicit start/stop owned by the server
//!
//! # Design Decisions
//! - Coarse cadence (default one minute); purging bounds memory, it is not a timer
//! - The first cycle runs one interval after start, not immediately

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::observability::metrics;

/// Default interval between purge cycles.
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Shortest accepted interval; smaller values are raised to it.
pub const MIN_PURGE_INTERVAL: Duration = Duration::from_millis(1);

/// Something holding entries that expire.
pub trait Purgeable: Send + Sync {
    /// Label used in logs and metrics.
    fn name(&self) -> &str;

    /// Remove expired entries, returning how many were dropped.
    fn purge(&self) -> usize;
}

/// Background task purging its targets on a fixed interval.
pub struct PurgeScheduler {
    interval: Duration,
    targets: Arc<Vec<Arc<dyn Purgeable>>>,
    running: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl PurgeScheduler {
    pub fn new(interval: Duration, targets: Vec<Arc<dyn Purgeable>>) -> Self {
        if interval < MIN_PURGE_INTERVAL {
            tracing::warn!(
                requested_ms = interval.as_millis() as u64,
                "Purge interval too short; using the minimum"
            );
        }
        Self {
            interval: interval.max(MIN_PURGE_INTERVAL),
            targets: Arc::new(targets),
            running: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }

    /// Spawn the purge loop. Returns false if it is already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(|(_, handle)| !handle.is_finished()) {
            return false;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let targets = self.targets.clone();
        let interval = self.interval;

        tracing::info!(
            interval_secs = interval.as_secs_f64(),
            targets = targets.len(),
            "Purge scheduler starting"
        );

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_cycle(&targets);
                    }
                    _ = stop_rx.wait_for(|stopped| *stopped) => {
                        tracing::info!("Purge scheduler received stop signal, exiting loop");
                        break;
                    }
                }
            }
        });

        *running = Some((stop_tx, handle));
        true
    }

    /// Stop the purge loop and wait for it to exit.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((stop_tx, handle)) = running {
            stop_tx.send_replace(true);
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Purge scheduler task failed");
            }
        }
    }

    /// Run one purge cycle immediately, returning the total removed.
    pub fn run_once(&self) -> usize {
        run_cycle(&self.targets)
    }
}

fn run_cycle(targets: &[Arc<dyn Purgeable>]) -> usize {
    let mut total = 0;
    for target in targets {
        match catch_unwind(AssertUnwindSafe(|| target.purge())) {
            Ok(removed) => {
                if removed > 0 {
                    tracing::debug!(purge_target = target.name(), removed, "Purged expired entries");
                }
                metrics::record_purged(target.name(), removed);
                total += removed;
            }
            Err(_) => {
                tracing::error!(purge_target = target.name(), "Purge failed; continuing with remaining targets");
            }
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        name: &'static str,
        calls: AtomicUsize,
        panics: bool,
    }

    impl Counter {
        fn new(name: &'static str, panics: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
                panics,
            })
        }
    }

    impl Purgeable for Counter {
        fn name(&self) -> &str {
            self.name
        }

        fn purge(&self) -> usize {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panics {
                panic!("purge blew up");
            }
            2
        }
    }

    #[test]
    fn failing_target_does_not_stop_the_cycle() {
        let bad = Counter::new("bad", true);
        let good = Counter::new("good", false);
        let scheduler = PurgeScheduler::new(
            Duration::from_secs(60),
            vec![bad.clone() as Arc<dyn Purgeable>, good.clone()],
        );

        assert_eq!(scheduler.run_once(), 2);
        assert_eq!(bad.calls.load(Ordering::SeqCst), 1);
        assert_eq!(good.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_on_interval_until_stopped() {
        let bad = Counter::new("bad", true);
        let good = Counter::new("good", false);
        let scheduler = PurgeScheduler::new(
            Duration::from_secs(60),
            vec![bad.clone() as Arc<dyn Purgeable>, good.clone()],
        );

        assert!(scheduler.start());
        assert!(!scheduler.start());
        assert!(scheduler.is_running());

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(good.calls.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_secs(100)).await;
        assert_eq!(good.calls.load(Ordering::SeqCst), 2);
        assert_eq!(bad.calls.load(Ordering::SeqCst), 2);

        scheduler.stop().await;
        assert!(!scheduler.is_running());

        time::sleep(Duration::from_secs(300)).await;
        assert_eq!(good.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_raised_to_the_minimum() {
        let good = Counter::new("good", false);
        let scheduler = PurgeScheduler::new(Duration::ZERO, vec![good.clone() as Arc<dyn Purgeable>]);
        assert_eq!(scheduler.interval(), MIN_PURGE_INTERVAL);

        assert!(scheduler.start());
        time::sleep(Duration::from_millis(10)).await;
        assert!(scheduler.is_running());
        assert!(good.calls.load(Ordering::SeqCst) >= 1);

        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }
}
