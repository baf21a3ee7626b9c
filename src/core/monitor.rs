//! Timing hooks around the phases of tree growth.
//!
//! The tree builder reports every phase (`InitData`, `InitRoot`,
//! `BuildHistogram`, `EvaluateSplits`, `ApplySplit`, `UpdatePosition`,
//! `LeafPartition`, `UpdatePredictionCache`) to an injected [`Monitor`].
//! [`NoopMonitor`] ignores them, [`TimerMonitor`] accumulates wall time.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Receiver of phase start/stop events.
pub trait Monitor: Send + Sync + fmt::Debug {
    /// Marks the beginning of a named phase.
    fn start(&self, name: &'static str);
    /// Marks the end of a named phase.
    fn stop(&self, name: &'static str);
}

/// Starts `name` on `monitor` and stops it when the guard drops.
pub fn scoped<'a>(monitor: &'a dyn Monitor, name: &'static str) -> MonitorGuard<'a> {
    monitor.start(name);
    MonitorGuard { monitor, name }
}

/// Guard returned by [`scoped`].
#[derive(Debug)]
pub struct MonitorGuard<'a> {
    monitor: &'a dyn Monitor,
    name: &'static str,
}

impl Drop for MonitorGuard<'_> {
    fn drop(&mut self) {
        self.monitor.stop(self.name);
    }
}

/// Monitor that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl Monitor for NoopMonitor {
    fn start(&self, _name: &'static str) {}
    fn stop(&self, _name: &'static str) {}
}

#[derive(Debug, Default)]
struct TimerStat {
    started: Option<Instant>,
    elapsed: Duration,
    calls: usize,
}

/// Monitor accumulating elapsed time and call counts per phase.
///
/// Accumulated timings are written at debug level when the monitor is
/// dropped, or on demand through [`TimerMonitor::report`].
#[derive(Debug)]
pub struct TimerMonitor {
    label: String,
    stats: Mutex<BTreeMap<&'static str, TimerStat>>,
}

impl TimerMonitor {
    /// Creates a new timer monitor whose report lines carry `label`.
    pub fn new<S: Into<String>>(label: S) -> Self {
        TimerMonitor {
            label: label.into(),
            stats: Mutex::new(BTreeMap::new()),
        }
    }

    /// Total time spent in a phase so far.
    pub fn elapsed(&self, name: &str) -> Option<Duration> {
        let stats = self.stats.lock().ok()?;
        stats.get(name).map(|stat| stat.elapsed)
    }

    /// Number of completed start/stop pairs for a phase.
    pub fn calls(&self, name: &str) -> usize {
        self.stats
            .lock()
            .ok()
            .and_then(|stats| stats.get(name).map(|stat| stat.calls))
            .unwrap_or(0)
    }

    /// Logs all accumulated timing statistics.
    pub fn report(&self) {
        if let Ok(stats) = self.stats.lock() {
            for (name, stat) in stats.iter() {
                log::debug!(
                    "[{}] {}: {:.6}s over {} calls",
                    self.label,
                    name,
                    stat.elapsed.as_secs_f64(),
                    stat.calls
                );
            }
        }
    }
}

impl Default for TimerMonitor {
    fn default() -> Self {
        Self::new("QuantileHistMaker")
    }
}

impl Monitor for TimerMonitor {
    fn start(&self, name: &'static str) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.entry(name).or_default().started = Some(Instant::now());
        }
    }

    fn stop(&self, name: &'static str) {
        if let Ok(mut stats) = self.stats.lock() {
            let stat = stats.entry(name).or_default();
            if let Some(started) = stat.started.take() {
                stat.elapsed += started.elapsed();
                stat.calls += 1;
            }
        }
    }
}

impl Drop for TimerMonitor {
    fn drop(&mut self) {
        self.report();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_counts_calls() {
        let monitor = TimerMonitor::new("test");
        monitor.start("BuildHistogram");
        monitor.stop("BuildHistogram");
        {
            let _guard = scoped(&monitor, "BuildHistogram");
        }
        assert_eq!(monitor.calls("BuildHistogram"), 2);
        assert!(monitor.elapsed("BuildHistogram").is_some());
        assert_eq!(monitor.calls("LeafPartition"), 0);
    }

    #[test]
    fn test_stop_without_start_is_ignored() {
        let monitor = TimerMonitor::default();
        monitor.stop("InitRoot");
        assert_eq!(monitor.calls("InitRoot"), 0);
    }
}
