// Keywarden: Metrics Registry
//
// Process-lifetime counters for key lifecycle events. The store stays the
// source of truth; these reset on restart. Rendered as newline-delimited
// `name value` pairs.

use std::sync::atomic::{AtomicU64, Ordering};

/// A lifecycle counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    KeysGenerated,
    KeysActivated,
    Redistributions,
    WatchdogRedistributions,
    RotationEvents,
    PurgeEvents,
}

impl Counter {
    pub const ALL: [Counter; 6] = [
        Counter::KeysGenerated,
        Counter::KeysActivated,
        Counter::Redistributions,
        Counter::WatchdogRedistributions,
        Counter::RotationEvents,
        Counter::PurgeEvents,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Counter::KeysGenerated => "ssh_keys_generated_total",
            Counter::KeysActivated => "ssh_keys_activated_total",
            Counter::Redistributions => "ssh_keys_redistributions_total",
            Counter::WatchdogRedistributions => "ssh_keys_watchdog_redistributions_total",
            Counter::RotationEvents => "ssh_keys_rotation_events_total",
            Counter::PurgeEvents => "ssh_keys_purge_events_total",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

pub const ACTIVE_KEY_AGE_GAUGE: &str = "ssh_active_key_age_seconds";

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: [AtomicU64; 6],
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, n: u64) {
        self.counters[counter.index()].fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    /// Render all counters plus the active-key age gauge. `active_key_age`
    /// is `None` when no key is active and renders as 0.
    pub fn render(&self, active_key_age: Option<i64>) -> String {
        let mut lines: Vec<String> = Counter::ALL
            .iter()
            .map(|c| format!("{} {}", c.name(), self.get(*c)))
            .collect();
        lines.push(format!(
            "{} {}",
            ACTIVE_KEY_AGE_GAUGE,
            active_key_age.unwrap_or(0)
        ));
        lines.join("\n")
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = MetricsRegistry::new();
        for counter in Counter::ALL {
            assert_eq!(metrics.get(counter), 0);
        }
    }

    #[test]
    fn test_counters_are_independent() {
        let metrics = MetricsRegistry::new();
        metrics.increment(Counter::KeysGenerated);
        metrics.increment(Counter::KeysGenerated);
        metrics.add(Counter::PurgeEvents, 3);

        assert_eq!(metrics.get(Counter::KeysGenerated), 2);
        assert_eq!(metrics.get(Counter::PurgeEvents), 3);
        assert_eq!(metrics.get(Counter::KeysActivated), 0);
    }

    #[test]
    fn test_render_format() {
        let metrics = MetricsRegistry::new();
        metrics.increment(Counter::WatchdogRedistributions);
        let text = metrics.render(Some(42));
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "ssh_keys_generated_total 0");
        assert!(lines.contains(&"ssh_keys_watchdog_redistributions_total 1"));
        assert_eq!(lines[6], "ssh_active_key_age_seconds 42");
        for line in lines {
            assert_eq!(line.split(' ').count(), 2, "bad line: {}", line);
        }
    }

    #[test]
    fn test_render_without_active_key() {
        let text = MetricsRegistry::new().render(None);
        assert!(text.ends_with("ssh_active_key_age_seconds 0"));
    }

    #[test]
    fn test_concurrent_increments() {
        let metrics = std::sync::Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        m.increment(Counter::Redistributions);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(metrics.get(Counter::Redistributions), 8000);
    }
}
