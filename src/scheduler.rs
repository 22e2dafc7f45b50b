// Keywarden: Rotation and Watchdog Scheduler
//
// Two independent periodic loops driving the lifecycle service:
//
//   rotation  every `rotation_interval`, rotate the active key if it is due
//   watchdog  every `watchdog_interval`, confirm the remote side holds a key
//
// The first tick of each loop is staggered so a cold start does not hit the
// remote environment twice at once. Errors are logged and left for the next
// tick. Neither loop keeps state beyond its timer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::lifecycle::{KeyLifecycle, RotationOutcome, WatchdogOutcome};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub rotation_interval: Duration,
    pub watchdog_interval: Duration,
    /// Age at which the active key is rotated.
    pub max_key_age_days: u32,
    pub rotation_initial_delay: Duration,
    pub watchdog_initial_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rotation_interval: Duration::from_secs(6 * 3600),
            watchdog_interval: Duration::from_secs(300),
            max_key_age_days: 30,
            rotation_initial_delay: Duration::from_secs(5),
            watchdog_initial_delay: Duration::from_secs(8),
        }
    }
}

/// Handle to the running loops.
pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    rotation: JoinHandle<()>,
    watchdog: JoinHandle<()>,
}

impl Scheduler {
    /// Spawn both loops on the current runtime.
    pub fn start(lifecycle: Arc<KeyLifecycle>, config: SchedulerConfig) -> Self {
        let (shutdown, stop) = watch::channel(false);

        tracing::info!(
            rotation_interval_secs = config.rotation_interval.as_secs(),
            watchdog_interval_secs = config.watchdog_interval.as_secs(),
            max_key_age_days = config.max_key_age_days,
            "Starting key scheduler"
        );

        let rotation = {
            let lifecycle = lifecycle.clone();
            let max_age = config.max_key_age_days;
            tokio::spawn(run_periodic(
                "rotation",
                config.rotation_initial_delay,
                config.rotation_interval,
                stop.clone(),
                move || {
                    let lifecycle = lifecycle.clone();
                    async move { rotation_tick(&lifecycle, max_age).await }
                },
            ))
        };

        let watchdog = tokio::spawn(run_periodic(
            "watchdog",
            config.watchdog_initial_delay,
            config.watchdog_interval,
            stop,
            move || {
                let lifecycle = lifecycle.clone();
                async move { watchdog_tick(&lifecycle).await }
            },
        ));

        Self {
            shutdown,
            rotation,
            watchdog,
        }
    }

    /// Signal both loops to stop and wait for them. A tick already in
    /// progress runs to completion first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for (name, handle) in [("rotation", self.rotation), ("watchdog", self.watchdog)] {
            if let Err(e) = handle.await {
                tracing::error!(task = name, error = %e, "Scheduler task ended abnormally");
            }
        }
        tracing::info!("Key scheduler stopped");
    }
}

async fn run_periodic<F, Fut>(
    name: &'static str,
    initial_delay: Duration,
    period: Duration,
    mut stop: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + initial_delay, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => tick().await,
            _ = stop.changed() => break,
        }
    }
    tracing::debug!(task = name, "Scheduler loop exited");
}

async fn rotation_tick(lifecycle: &KeyLifecycle, max_age_days: u32) {
    match lifecycle.rotate_if_due(max_age_days).await {
        Ok(RotationOutcome::Rotated {
            previous,
            current,
            distributed,
            ..
        }) => {
            tracing::info!(%previous, %current, distributed, "Scheduled rotation completed");
        }
        Ok(outcome) => tracing::debug!(?outcome, "Scheduled rotation check: nothing to do"),
        Err(e) => tracing::error!(error = %e, "Scheduled rotation failed; retrying next tick"),
    }
}

async fn watchdog_tick(lifecycle: &KeyLifecycle) {
    match lifecycle.watchdog_check().await {
        WatchdogOutcome::Healthy | WatchdogOutcome::NoActiveKey => {}
        WatchdogOutcome::Redistributed { fingerprint } => {
            tracing::info!(%fingerprint, "Watchdog restored missing key")
        }
        WatchdogOutcome::Error { error } => {
            tracing::warn!(%error, "Watchdog check failed; retrying next tick")
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::testing::harness;
    use crate::metrics::Counter;
    use crate::store::{KeyStore, SYSTEM_FINGERPRINT};
    use chrono::Utc;
    use std::sync::atomic::Ordering;

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            rotation_interval: Duration::from_secs(3600),
            watchdog_interval: Duration::from_secs(60),
            max_key_age_days: 30,
            rotation_initial_delay: Duration::from_secs(5),
            watchdog_initial_delay: Duration::from_secs(8),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loops_start_after_staggered_delays() {
        let h = harness();
        let old = h.active_key().await;
        h.store
            .backdate(&old, Utc::now() - chrono::Duration::days(40))
            .unwrap();

        let scheduler = Scheduler::start(h.lifecycle.clone(), config());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(h.lifecycle.metrics().get(Counter::RotationEvents), 0);
        assert_eq!(h.remote.status_calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.lifecycle.metrics().get(Counter::RotationEvents), 1);
        assert_ne!(h.store.find_active().unwrap().unwrap().fingerprint, old);
        assert_eq!(h.remote.status_calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(h.remote.status_calls.load(Ordering::SeqCst), 1);
        // Rotation already installed the new key, so the watchdog sees it.
        assert_eq!(h.lifecycle.metrics().get(Counter::WatchdogRedistributions), 0);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_repeats_and_audits_failures() {
        let h = harness();
        h.active_key().await;
        h.remote.fail_status.store(true, Ordering::SeqCst);

        let scheduler = Scheduler::start(h.lifecycle.clone(), config());
        tokio::time::sleep(Duration::from_secs(8 + 2 * 60 + 1)).await;

        assert_eq!(h.remote.status_calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.store.audit_events(SYSTEM_FINGERPRINT).unwrap().len(), 3);
        assert_eq!(h.remote.installs(), 0);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_redistributes_when_remote_lost_key() {
        let h = harness();
        h.active_key().await;

        let scheduler = Scheduler::start(h.lifecycle.clone(), config());
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(h.lifecycle.metrics().get(Counter::WatchdogRedistributions), 1);

        // Remote loses the key again before the next tick.
        h.remote.installed.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.lifecycle.metrics().get(Counter::WatchdogRedistributions), 2);
        assert_eq!(h.remote.installs(), 2);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_both_loops() {
        let h = harness();
        let scheduler = Scheduler::start(h.lifecycle.clone(), config());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let calls = h.remote.status_calls.load(Ordering::SeqCst);
        assert_eq!(calls, 1);

        scheduler.stop().await;
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(h.remote.status_calls.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn test_default_config_matches_documented_schedule() {
        let c = SchedulerConfig::default();
        assert_eq!(c.rotation_interval, Duration::from_secs(21_600));
        assert_eq!(c.watchdog_interval, Duration::from_secs(300));
        assert!(c.rotation_initial_delay < c.watchdog_initial_delay);
    }
}
