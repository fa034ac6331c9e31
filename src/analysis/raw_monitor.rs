use crate::types::Sample;
use std::collections::VecDeque;

/// Trailing window for the data-rate figure.
pub const RATE_WINDOW_MS: u64 = 1000;

/// Statistics for the raw sensor experiment: delivered count and data rate.
#[derive(Debug, Default)]
pub struct RawMonitor {
    total: u64,
    recent: VecDeque<u64>,
}

impl RawMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, sample: &Sample) {
        self.total += 1;
        self.recent.push_back(sample.timestamp);
        self.expire(sample.timestamp);
    }

    /// Samples delivered since the last reset.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Samples delivered within the trailing second.
    pub fn rate(&mut self, now: u64) -> usize {
        self.expire(now);
        self.recent.len()
    }

    /// Zero both counters.
    pub fn reset(&mut self) {
        self.total = 0;
        self.recent.clear();
    }

    fn expire(&mut self, now: u64) {
        while let Some(&ts) = self.recent.front() {
            if now.saturating_sub(ts) < RATE_WINDOW_MS {
                break;
            }
            self.recent.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_and_trailing_rate() {
        let mut monitor = RawMonitor::new();
        for t in (0..2000).step_by(20) {
            monitor.record(&Sample::new(t, 0.0, 0.0, 9.81));
        }
        assert_eq!(monitor.total(), 100);
        // Samples at 1000..=1980 are within the last second of 1980.
        assert_eq!(monitor.rate(1980), 50);
        assert_eq!(monitor.rate(2500), 24);
        assert_eq!(monitor.rate(3000), 0);
        assert_eq!(monitor.total(), 100);
    }

    #[test]
    fn test_reset() {
        let mut monitor = RawMonitor::new();
        monitor.record(&Sample::new(0, 1.0, 2.0, 3.0));
        monitor.reset();
        assert_eq!(monitor.total(), 0);
        assert_eq!(monitor.rate(0), 0);
    }
}
