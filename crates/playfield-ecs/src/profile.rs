//! Optional per-system timing.
//!
//! [`PerformanceMetrics::guard`] returns a scoped [`TimingGuard`] that records
//! the elapsed wall-clock time under a name when dropped. When metrics are
//! disabled guards still measure (callers may read
//! [`TimingGuard::elapsed`]) but nothing is recorded.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

/// Aggregated timings for one name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingStats {
    pub total: Duration,
    pub calls: u64,
    pub min: Duration,
    pub max: Duration,
    pub last: Duration,
}

impl TimingStats {
    fn first(sample: Duration) -> Self {
        Self {
            total: sample,
            calls: 1,
            min: sample,
            max: sample,
            last: sample,
        }
    }

    fn push(&mut self, sample: Duration) {
        self.total += sample;
        self.calls += 1;
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
        self.last = sample;
    }

    /// Mean duration per call.
    pub fn average(&self) -> Duration {
        if self.calls == 0 {
            return Duration::ZERO;
        }
        self.total / self.calls as u32
    }
}

/// Named timing aggregates.
#[derive(Debug, Default)]
pub struct PerformanceMetrics {
    enabled: bool,
    stats: BTreeMap<String, TimingStats>,
}

impl PerformanceMetrics {
    /// Metrics that start enabled or disabled.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            stats: BTreeMap::new(),
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Start timing `name`; the sample is recorded when the guard drops.
    pub fn guard<'a>(&'a mut self, name: &'a str) -> TimingGuard<'a> {
        TimingGuard {
            metrics: self,
            name,
            start: Instant::now(),
        }
    }

    /// Record one sample. Ignored while disabled.
    pub fn record(&mut self, name: &str, sample: Duration) {
        if !self.enabled {
            return;
        }
        match self.stats.get_mut(name) {
            Some(stats) => stats.push(sample),
            None => {
                self.stats.insert(name.to_owned(), TimingStats::first(sample));
            }
        }
    }

    /// Aggregates for `name`.
    pub fn stats(&self, name: &str) -> Option<&TimingStats> {
        self.stats.get(name)
    }

    /// Mean sample for `name`.
    pub fn average(&self, name: &str) -> Option<Duration> {
        self.stats.get(name).map(TimingStats::average)
    }

    /// One line per name, sorted by name.
    pub fn report(&self) -> String {
        let mut out = String::new();
        for (name, s) in &self.stats {
            let _ = writeln!(
                out,
                "{name}: avg {:.3}ms min {:.3}ms max {:.3}ms calls {}",
                ms(s.average()),
                ms(s.min),
                ms(s.max),
                s.calls
            );
        }
        out
    }

    /// Forget every sample.
    pub fn reset(&mut self) {
        self.stats.clear();
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Scoped timer; see [`PerformanceMetrics::guard`].
pub struct TimingGuard<'a> {
    metrics: &'a mut PerformanceMetrics,
    name: &'a str,
    start: Instant,
}

impl TimingGuard<'_> {
    /// Time since the guard was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for TimingGuard<'_> {
    fn drop(&mut self) {
        let sample = self.start.elapsed();
        self.metrics.record(self.name, sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_metrics_record_nothing() {
        let mut m = PerformanceMetrics::new(false);
        {
            let _g = m.guard("physics");
        }
        assert!(m.stats("physics").is_none());
    }

    #[test]
    fn samples_aggregate() {
        let mut m = PerformanceMetrics::new(true);
        m.record("a", Duration::from_millis(2));
        m.record("a", Duration::from_millis(4));
        let s = m.stats("a").unwrap();
        assert_eq!(s.calls, 2);
        assert_eq!(s.min, Duration::from_millis(2));
        assert_eq!(s.max, Duration::from_millis(4));
        assert_eq!(m.average("a"), Some(Duration::from_millis(3)));
        assert!(m.report().starts_with("a: avg 3.000ms"));
        m.reset();
        assert!(m.average("a").is_none());
    }

    #[test]
    fn guard_records_on_drop() {
        let mut m = PerformanceMetrics::new(true);
        drop(m.guard("x"));
        assert_eq!(m.stats("x").unwrap().calls, 1);
    }
}
