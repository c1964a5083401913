// src/poller.rs
//! One poller per feed: IDLE -> FETCHING -> DETECTING -> DELIVERING -> IDLE,
//! with FETCHING -> BACKOFF -> IDLE on fetch failure. Pollers share nothing
//! but the fingerprint store.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::BackoffSettings;
use crate::detect;
use crate::notify::Dispatcher;
use crate::sources::SourceFeed;
use crate::store::FingerprintStore;

/// Exponential backoff with full-range jitter and a failure-streak alert
/// threshold. The delay computation is pure so tests can pin it down; jitter
/// is applied only at sleep time.
#[derive(Debug, Clone)]
pub struct Backoff {
    settings: BackoffSettings,
    consecutive_failures: u32,
}

impl Backoff {
    pub fn new(settings: BackoffSettings) -> Self {
        Self {
            settings,
            consecutive_failures: 0,
        }
    }

    pub fn on_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Record a failure; returns true when the streak just reached the
    /// operator-alert threshold.
    pub fn on_failure(&mut self) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_failures == self.settings.max_consecutive_failures
    }

    pub fn failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Deterministic delay for the current streak: base doubled per failure,
    /// capped.
    pub fn delay_secs(&self) -> u64 {
        let exp = self.consecutive_failures.saturating_sub(1).min(31);
        self.settings
            .base_secs
            .saturating_mul(1u64 << exp)
            .min(self.settings.cap_secs)
    }

    /// Delay with ±50% jitter so recovering feeds are not hit in lockstep.
    pub fn jittered_delay(&self) -> Duration {
        let secs = self.delay_secs() as f64;
        let factor: f64 = rand::rng().random_range(0.5..=1.5);
        Duration::from_secs_f64((secs * factor).max(1.0))
    }
}

pub struct Poller {
    feed: Arc<dyn SourceFeed>,
    store: Arc<FingerprintStore>,
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
    backoff: Backoff,
    shutdown: watch::Receiver<bool>,
}

impl Poller {
    pub fn new(
        feed: Arc<dyn SourceFeed>,
        store: Arc<FingerprintStore>,
        dispatcher: Arc<Dispatcher>,
        interval: Duration,
        backoff: BackoffSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            feed,
            store,
            dispatcher,
            interval,
            backoff: Backoff::new(backoff),
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let name = self.feed.name();
        tracing::info!(feed = name, interval_secs = self.interval.as_secs(), "poller started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            match self.feed.fetch_latest().await {
                Ok(batch) => {
                    self.backoff.on_success();
                    let report = detect::detect(&self.store, &batch);
                    gauge!("poller_last_run_ts", "feed" => name)
                        .set(chrono::Utc::now().timestamp() as f64);
                    tracing::info!(
                        feed = name,
                        fetched = batch.len(),
                        new_or_changed = report.events.len(),
                        dropped = report.dropped,
                        store_errors = report.store_errors,
                        "poll cycle complete"
                    );
                    if report.store_errors > 0 {
                        counter!("poller_degraded_cycles_total", "feed" => name).increment(1);
                    }
                    if !report.events.is_empty() {
                        // The store already committed; delivery is best-effort,
                        // per-sink isolated, and detached so a slow or retrying
                        // sink never delays this feed's next tick.
                        let dispatcher = Arc::clone(&self.dispatcher);
                        let events = report.events;
                        tokio::spawn(async move {
                            let dr = dispatcher.dispatch_all(&events).await;
                            if dr.failed > 0 {
                                tracing::warn!(feed = name, failed = dr.failed, "deliveries failed this cycle");
                            }
                        });
                    }
                    if !self.sleep_or_shutdown(self.interval).await {
                        break;
                    }
                }
                Err(e) => {
                    let alert = self.backoff.on_failure();
                    counter!("poller_fetch_errors_total", "feed" => name).increment(1);
                    if alert {
                        tracing::error!(
                            feed = name,
                            failures = self.backoff.failures(),
                            error = ?e,
                            "feed unreachable past failure threshold, operator attention needed"
                        );
                    } else {
                        tracing::warn!(feed = name, failures = self.backoff.failures(), error = ?e, "fetch failed, backing off");
                    }
                    if !self.sleep_or_shutdown(self.backoff.jittered_delay()).await {
                        break;
                    }
                }
            }
        }
        tracing::info!(feed = name, "poller stopped");
    }

    /// Returns false when shutdown was signalled during the sleep.
    async fn sleep_or_shutdown(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.shutdown.changed() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> Backoff {
        Backoff::new(BackoffSettings {
            base_secs: 30,
            cap_secs: 900,
            max_consecutive_failures: 3,
        })
    }

    #[test]
    fn delay_doubles_and_caps() {
        let mut b = backoff();
        b.on_failure();
        assert_eq!(b.delay_secs(), 30);
        b.on_failure();
        assert_eq!(b.delay_secs(), 60);
        b.on_failure();
        assert_eq!(b.delay_secs(), 120);
        for _ in 0..10 {
            b.on_failure();
        }
        assert_eq!(b.delay_secs(), 900);
    }

    #[test]
    fn alert_fires_exactly_at_threshold() {
        let mut b = backoff();
        assert!(!b.on_failure());
        assert!(!b.on_failure());
        assert!(b.on_failure()); // third failure == threshold
        assert!(!b.on_failure()); // past it, no re-alert
    }

    #[test]
    fn success_resets_the_streak() {
        let mut b = backoff();
        b.on_failure();
        b.on_failure();
        b.on_success();
        assert_eq!(b.failures(), 0);
        b.on_failure();
        assert_eq!(b.delay_secs(), 30);
    }

    #[test]
    fn jitter_stays_within_half_to_threehalves() {
        let mut b = backoff();
        b.on_failure();
        for _ in 0..100 {
            let d = b.jittered_delay().as_secs_f64();
            assert!((15.0..=45.0).contains(&d), "jittered delay {d} out of range");
        }
    }
}
