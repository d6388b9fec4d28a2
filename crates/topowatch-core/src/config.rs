// ── Runtime monitor configuration ──
//
// These types describe *how* the monitor paces its background work.
// They never touch disk: the CLI (via topowatch-config) builds a
// `MonitorConfig` and hands it to `Monitor::new`.

use std::ops::RangeInclusive;
use std::time::Duration;

/// Polling intervals outside this range fall back to the default.
pub const VALID_POLLING_RANGE_SECS: RangeInclusive<u64> = 10..=600;

/// Tuning knobs for one `Monitor` instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// How often the persisted project is polled for settings changes.
    pub hot_reload_interval: Duration,
    /// How often the full topology resync runs.
    pub full_sync_interval: Duration,
    /// Tick period of the dispatcher's scheduled-task loop.
    pub dispatch_interval: Duration,
    /// Number of worker-pool runners.
    pub worker_count: usize,
    /// Bounded job queue capacity of the worker pool.
    pub queue_capacity: usize,
    /// Capacity of the dispatcher's one-time task queue.
    pub one_time_capacity: usize,
    /// Attempts made to acquire the lifecycle lock in Start/Stop.
    pub lock_retry_attempts: u32,
    /// Sleep between lifecycle lock attempts.
    pub lock_retry_delay: Duration,
    /// Polling interval used when the project carries an invalid one.
    pub default_polling_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            hot_reload_interval: Duration::from_secs(5),
            full_sync_interval: Duration::from_secs(7),
            dispatch_interval: Duration::from_secs(3),
            worker_count: 4,
            queue_capacity: 16,
            one_time_capacity: 32,
            lock_retry_attempts: 9,
            lock_retry_delay: Duration::from_millis(200),
            default_polling_interval_secs: 15,
        }
    }
}

impl MonitorConfig {
    /// Clamp a project's polling interval into the accepted range.
    pub fn effective_polling_interval(&self, requested_secs: i64) -> u64 {
        match u64::try_from(requested_secs) {
            Ok(secs) if VALID_POLLING_RANGE_SECS.contains(&secs) => secs,
            _ => self.default_polling_interval_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_cadence() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.hot_reload_interval, Duration::from_secs(5));
        assert_eq!(cfg.full_sync_interval, Duration::from_secs(7));
        assert_eq!(cfg.dispatch_interval, Duration::from_secs(3));
        assert_eq!((cfg.worker_count, cfg.queue_capacity), (4, 16));
        assert_eq!(cfg.lock_retry_attempts, 9);
    }

    #[test]
    fn polling_interval_outside_range_falls_back() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.effective_polling_interval(10), 10);
        assert_eq!(cfg.effective_polling_interval(600), 600);
        assert_eq!(cfg.effective_polling_interval(9), 15);
        assert_eq!(cfg.effective_polling_interval(601), 15);
        assert_eq!(cfg.effective_polling_interval(-30), 15);
    }
}
