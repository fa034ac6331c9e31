//! Millisecond timers driven by an explicit clock.
//!
//! Nothing here reads the wall clock: callers pass `now` (ms on the session's
//! monotonic clock) and ask `next_deadline()` when they need to sleep.

/// One-shot timer with an explicit arm/cancel lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Deadline {
    at: Option<u64>,
}

impl Deadline {
    pub fn idle() -> Self {
        Self { at: None }
    }

    /// (Re)arm to fire `delay_ms` after `now`, replacing any pending deadline.
    pub fn arm(&mut self, now: u64, delay_ms: u64) {
        self.at = Some(now.saturating_add(delay_ms));
    }

    pub fn arm_at(&mut self, at: u64) {
        self.at = Some(at);
    }

    pub fn cancel(&mut self) {
        self.at = None;
    }

    pub fn is_armed(&self) -> bool {
        self.at.is_some()
    }

    pub fn at(&self) -> Option<u64> {
        self.at
    }

    /// Consume the deadline if it has passed. True at most once per arming.
    pub fn fire(&mut self, now: u64) -> bool {
        match self.at {
            Some(at) if now >= at => {
                self.at = None;
                true
            }
            _ => false,
        }
    }
}

/// Convert a delivery rate into a throttle window. `None`, zero, negative or
/// non-finite rates disable throttling.
pub fn window_from_rate(rate_hz: Option<f64>) -> u64 {
    match rate_hz {
        Some(rate) if rate.is_finite() && rate > 0.0 => (1000.0 / rate).round() as u64,
        _ => 0,
    }
}

/// Leading + trailing throttle.
///
/// The first item of a window is released immediately. Later items inside the
/// same window replace each other; the survivor is released at the window
/// boundary by `poll`.
#[derive(Debug)]
pub struct Throttle<T> {
    window_ms: u64,
    last_release: Option<u64>,
    pending: Option<(u64, T)>,
}

impl<T> Throttle<T> {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            last_release: None,
            pending: None,
        }
    }

    pub fn from_rate(rate_hz: Option<f64>) -> Self {
        Self::new(window_from_rate(rate_hz))
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Offer an item at `now`. Returns it if it may be delivered right away.
    pub fn offer(&mut self, now: u64, item: T) -> Option<T> {
        if self.window_ms > 0 {
            if let Some(last) = self.last_release {
                let boundary = last + self.window_ms;
                if now < boundary {
                    self.pending = Some((boundary, item));
                    return None;
                }
            }
        }
        self.pending = None;
        self.last_release = Some(now);
        Some(item)
    }

    /// Release the deferred item once its boundary has been reached.
    pub fn poll(&mut self, now: u64) -> Option<T> {
        match self.pending.take() {
            Some((due, item)) if now >= due => {
                self.last_release = Some(now);
                Some(item)
            }
            other => {
                self.pending = other;
                None
            }
        }
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.as_ref().map(|(due, _)| *due)
    }

    /// Drop any deferred item without releasing it.
    pub fn clear_pending(&mut self) {
        self.pending = None;
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_fires_once() {
        let mut deadline = Deadline::idle();
        deadline.arm(100, 50);
        assert!(!deadline.fire(149));
        assert!(deadline.fire(150));
        assert!(!deadline.fire(500));
        assert!(!deadline.is_armed());
    }

    #[test]
    fn test_deadline_rearm_pushes_back() {
        let mut deadline = Deadline::idle();
        deadline.arm(0, 2000);
        deadline.arm(500, 2000);
        assert!(!deadline.fire(2000));
        assert!(deadline.fire(2500));
    }

    #[test]
    fn test_deadline_cancel() {
        let mut deadline = Deadline::idle();
        deadline.arm(0, 10);
        deadline.cancel();
        assert!(!deadline.fire(1000));
    }

    #[test]
    fn test_window_from_rate() {
        assert_eq!(window_from_rate(None), 0);
        assert_eq!(window_from_rate(Some(0.0)), 0);
        assert_eq!(window_from_rate(Some(f64::NAN)), 0);
        assert_eq!(window_from_rate(Some(25.0)), 40);
        assert_eq!(window_from_rate(Some(60.0)), 17);
    }

    #[test]
    fn test_leading_item_passes() {
        let mut throttle = Throttle::new(100);
        assert_eq!(throttle.offer(0, 'a'), Some('a'));
        assert_eq!(throttle.offer(100, 'b'), Some('b'));
    }

    #[test]
    fn test_trailing_item_coalesced() {
        let mut throttle = Throttle::new(100);
        assert_eq!(throttle.offer(0, 1), Some(1));
        assert_eq!(throttle.offer(20, 2), None);
        assert_eq!(throttle.offer(40, 3), None);
        assert_eq!(throttle.next_deadline(), Some(100));
        assert_eq!(throttle.poll(99), None);
        assert_eq!(throttle.poll(100), Some(3));
        assert_eq!(throttle.poll(200), None);
    }

    #[test]
    fn test_leading_release_supersedes_pending() {
        let mut throttle = Throttle::new(100);
        throttle.offer(0, 1);
        throttle.offer(50, 2);
        // Caller was late to poll; the next item starts a fresh window.
        assert_eq!(throttle.offer(120, 3), Some(3));
        assert_eq!(throttle.next_deadline(), None);
    }

    #[test]
    fn test_constant_source_spacing() {
        let rate_hz = 25.0;
        let mut throttle = Throttle::from_rate(Some(rate_hz));
        let mut released = Vec::new();
        for t in (0..2000).step_by(5) {
            if let Some(due) = throttle.next_deadline() {
                if due <= t {
                    if throttle.poll(due).is_some() {
                        released.push(due);
                    }
                }
            }
            if throttle.offer(t, t).is_some() {
                released.push(t);
            }
        }
        let spacings: Vec<u64> = released.windows(2).map(|w| w[1] - w[0]).collect();
        let expected = (1000.0 / rate_hz) as u64;
        assert!(spacings.iter().all(|s| s.abs_diff(expected) <= 5), "{:?}", spacings);
    }

    #[test]
    fn test_unthrottled_passes_everything() {
        let mut throttle = Throttle::new(0);
        for t in 0..10 {
            assert_eq!(throttle.offer(t, t), Some(t));
        }
    }
}
