//! Resilient, throttled subscription to a raw motion source.
//!
//! `SensorAcquisition` sits between a `MotionSource` and exactly one
//! subscriber. It rate-limits raw events, watches for a source that never
//! speaks (watchdog) or keeps sending broken vectors (incomplete streak), and
//! on failure stops listening and reports a typed error through the error
//! channel. It never blocks and never reads the clock: the caller feeds events
//! and polls timers with `now` in milliseconds.

use crate::error::{AcqResult, AcquisitionError, IncompleteKind};
use crate::timing::{Deadline, Throttle};
use crate::types::{RawMotionEvent, Sample};

/// What the subscriber receives: a clean sample or the error that stopped acquisition.
pub type Delivery = Result<Sample, AcquisitionError>;

pub type Subscriber = Box<dyn FnMut(Delivery)>;
pub type ErrorHandler = Box<dyn FnMut(AcquisitionError)>;

/// Token identifying one `listen` registration on a source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Raw event tagged with the registration it was produced for.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceEvent {
    pub listener: ListenerHandle,
    pub event: RawMotionEvent,
}

/// Platform side of acquisition: something that can start and stop emitting raw events.
pub trait MotionSource {
    /// False when the platform has no motion capability at all.
    fn is_supported(&self) -> bool;

    /// Begin producing events. Every event produced must carry the returned handle.
    fn listen(&mut self) -> AcqResult<ListenerHandle>;

    /// Stop producing events for `handle`.
    fn unlisten(&mut self, handle: ListenerHandle);
}

impl MotionSource for Box<dyn MotionSource> {
    fn is_supported(&self) -> bool {
        (**self).is_supported()
    }

    fn listen(&mut self) -> AcqResult<ListenerHandle> {
        (**self).listen()
    }

    fn unlisten(&mut self, handle: ListenerHandle) {
        (**self).unlisten(handle)
    }
}

#[derive(Clone, Debug)]
pub struct AcquisitionConfig {
    /// Delivery rate limit in Hz; `None` or 0 delivers every event.
    pub rate_hz: Option<f64>,
    /// Read the gravity-free channel instead of the gravity-inclusive one.
    pub exclude_gravity: bool,
    /// How long `start` waits for the first event.
    pub watchdog_ms: u64,
    /// Consecutive incomplete events tolerated before giving up.
    pub incomplete_threshold: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            rate_hz: None,
            exclude_gravity: false,
            watchdog_ms: 1000,
            incomplete_threshold: 10,
        }
    }
}

pub struct SensorAcquisition<S> {
    source: S,
    config: AcquisitionConfig,
    subscriber: Option<Subscriber>,
    error_handler: Option<ErrorHandler>,
    listener: Option<ListenerHandle>,
    throttle: Throttle<RawMotionEvent>,
    watchdog: Deadline,
    consecutive_failures: u32,
    delivered: u64,
}

impl<S: MotionSource> SensorAcquisition<S> {
    pub fn new(source: S, config: AcquisitionConfig) -> Self {
        let throttle = Throttle::from_rate(config.rate_hz);
        Self {
            source,
            config,
            subscriber: None,
            error_handler: None,
            listener: None,
            throttle,
            watchdog: Deadline::idle(),
            consecutive_failures: 0,
            delivered: 0,
        }
    }

    /// Set sampling behaviour. The channel applies from the next processed
    /// event; the rate from the next `start`, so a running listener keeps its
    /// window and any deferred event.
    pub fn configure(&mut self, rate_hz: Option<f64>, exclude_gravity: bool) {
        self.config.rate_hz = rate_hz;
        self.config.exclude_gravity = exclude_gravity;
    }

    /// Register the single consumer, replacing any previous one.
    pub fn subscribe(&mut self, subscriber: Subscriber) {
        self.subscriber = Some(subscriber);
    }

    /// Route errors here instead of through the subscriber.
    pub fn set_error_handler(&mut self, handler: ErrorHandler) {
        self.error_handler = Some(handler);
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn listener(&self) -> Option<ListenerHandle> {
        self.listener
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Begin listening. No-op if already listening.
    ///
    /// Missing subscriber is an integration bug and is returned directly;
    /// platform failures are reported through the error channel.
    pub fn start(&mut self, now: u64) -> AcqResult<()> {
        if self.listener.is_some() {
            return Ok(());
        }
        if self.subscriber.is_none() {
            return Err(AcquisitionError::NotSubscribed);
        }

        self.consecutive_failures = 0;
        self.throttle = Throttle::from_rate(self.config.rate_hz);

        if !self.source.is_supported() {
            log::warn!("[ACQ] Motion source unsupported, not listening");
            self.report(AcquisitionError::NoSensorSupport);
            return Ok(());
        }

        match self.source.listen() {
            Ok(handle) => {
                self.listener = Some(handle);
                self.watchdog.arm(now, self.config.watchdog_ms);
                log::info!(
                    "[ACQ] Listening (listener {}, window {} ms, {})",
                    handle.id(),
                    self.throttle.window_ms(),
                    if self.config.exclude_gravity {
                        "gravity excluded"
                    } else {
                        "gravity included"
                    }
                );
            }
            Err(err) => {
                log::warn!("[ACQ] Source refused to listen: {}", err);
                self.report(err);
            }
        }
        Ok(())
    }

    /// Stop listening. No-op if already stopped. A deferred throttled event is dropped.
    pub fn stop(&mut self) {
        if let Some(handle) = self.listener.take() {
            self.source.unlisten(handle);
            log::info!("[ACQ] Stopped listener {}", handle.id());
        }
        self.watchdog.cancel();
        self.throttle.clear_pending();
    }

    /// Change the delivery rate, restarting the listener if one is active.
    pub fn set_throttle(&mut self, now: u64, rate_hz: Option<f64>) -> AcqResult<()> {
        let was_listening = self.is_listening();
        self.stop();
        self.config.rate_hz = rate_hz;
        if was_listening {
            self.start(now)?;
        }
        Ok(())
    }

    /// Switch channel; applies from the next processed event.
    pub fn set_exclude_gravity(&mut self, exclude_gravity: bool) {
        self.config.exclude_gravity = exclude_gravity;
    }

    /// Feed a raw event. Events from any listener other than the active one are dropped.
    pub fn handle_event(&mut self, listener: ListenerHandle, now: u64, event: RawMotionEvent) {
        if self.listener != Some(listener) {
            log::debug!("[ACQ] Dropping event from stale listener {}", listener.id());
            return;
        }
        if let Some(event) = self.throttle.offer(now, event) {
            self.process(now, event);
        }
    }

    /// Fire due timers: the watchdog and the trailing throttle release.
    pub fn poll(&mut self, now: u64) {
        if self.listener.is_none() {
            return;
        }
        if self.watchdog.fire(now) {
            self.fail(AcquisitionError::NoDataTimeout {
                waited_ms: self.config.watchdog_ms,
            });
            return;
        }
        if let Some(event) = self.throttle.poll(now) {
            self.process(now, event);
        }
    }

    /// Earliest time `poll` has work to do.
    pub fn next_deadline(&self) -> Option<u64> {
        if self.listener.is_none() {
            return None;
        }
        match (self.watchdog.at(), self.throttle.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn process(&mut self, now: u64, event: RawMotionEvent) {
        // Any event proves the source is alive, complete or not.
        self.watchdog.cancel();

        let channel = event.channel(self.config.exclude_gravity);
        match channel.and_then(|c| c.complete()) {
            Some((x, y, z)) => {
                self.consecutive_failures = 0;
                self.delivered += 1;
                if let Some(subscriber) = self.subscriber.as_mut() {
                    subscriber(Ok(Sample::new(now, x, y, z)));
                }
            }
            None => {
                let kind = if channel.is_none() {
                    IncompleteKind::NoChannel
                } else {
                    IncompleteKind::MissingAxis
                };
                self.consecutive_failures += 1;
                log::debug!(
                    "[ACQ] Incomplete event ({}), streak {}/{}",
                    kind,
                    self.consecutive_failures,
                    self.config.incomplete_threshold
                );
                if self.consecutive_failures >= self.config.incomplete_threshold {
                    self.fail(AcquisitionError::IncompleteDataStreak {
                        count: self.consecutive_failures,
                        kind,
                    });
                }
            }
        }
    }

    fn fail(&mut self, err: AcquisitionError) {
        log::warn!("[ACQ] {}", err);
        self.stop();
        self.consecutive_failures = 0;
        self.report(err);
    }

    fn report(&mut self, err: AcquisitionError) {
        if let Some(handler) = self.error_handler.as_mut() {
            handler(err);
        } else if let Some(subscriber) = self.subscriber.as_mut() {
            subscriber(Err(err));
        } else {
            log::error!("[ACQ] Unreported acquisition error: {}", err);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::AxisReading;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// In-memory source recording listen/unlisten calls.
    #[derive(Default)]
    pub(crate) struct ManualSource {
        pub unsupported: bool,
        pub next_id: u64,
        pub active: Option<ListenerHandle>,
        pub listen_calls: u32,
    }

    impl MotionSource for ManualSource {
        fn is_supported(&self) -> bool {
            !self.unsupported
        }

        fn listen(&mut self) -> AcqResult<ListenerHandle> {
            self.next_id += 1;
            self.listen_calls += 1;
            let handle = ListenerHandle::new(self.next_id);
            self.active = Some(handle);
            Ok(handle)
        }

        fn unlisten(&mut self, handle: ListenerHandle) {
            if self.active == Some(handle) {
                self.active = None;
            }
        }
    }

    pub(crate) fn event_z(z: f64) -> RawMotionEvent {
        RawMotionEvent::new(
            AxisReading::new(0.0, 0.0, z - 9.81),
            AxisReading::new(0.0, 0.0, z),
        )
    }

    fn broken_event() -> RawMotionEvent {
        RawMotionEvent::new(
            AxisReading {
                x: Some(0.0),
                y: None,
                z: Some(0.0),
            },
            AxisReading {
                x: Some(0.0),
                y: None,
                z: Some(0.0),
            },
        )
    }

    fn subscribed(
        config: AcquisitionConfig,
    ) -> (SensorAcquisition<ManualSource>, Rc<RefCell<Vec<Delivery>>>) {
        let mut acq = SensorAcquisition::new(ManualSource::default(), config);
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        acq.subscribe(Box::new(move |d| sink.borrow_mut().push(d)));
        (acq, log)
    }

    fn errors(log: &Rc<RefCell<Vec<Delivery>>>) -> Vec<AcquisitionError> {
        log.borrow()
            .iter()
            .filter_map(|d| d.as_ref().err().cloned())
            .collect()
    }

    #[test]
    fn test_start_without_subscriber_fails_loudly() {
        let mut acq = SensorAcquisition::new(ManualSource::default(), AcquisitionConfig::default());
        assert_eq!(acq.start(0), Err(AcquisitionError::NotSubscribed));
        assert!(!acq.is_listening());
        assert_eq!(acq.source().listen_calls, 0);
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let (mut acq, _) = subscribed(AcquisitionConfig::default());
        acq.start(0).unwrap();
        acq.start(10).unwrap();
        assert_eq!(acq.source().listen_calls, 1);
        acq.stop();
        acq.stop();
        assert!(!acq.is_listening());
        assert!(acq.source().active.is_none());
    }

    #[test]
    fn test_unsupported_source_reports_and_never_listens() {
        let mut acq = SensorAcquisition::new(
            ManualSource {
                unsupported: true,
                ..Default::default()
            },
            AcquisitionConfig::default(),
        );
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        acq.subscribe(Box::new(move |d| sink.borrow_mut().push(d)));
        acq.start(0).unwrap();
        assert!(!acq.is_listening());
        assert_eq!(errors(&log), vec![AcquisitionError::NoSensorSupport]);
    }

    #[test]
    fn test_delivers_selected_channel() {
        let (mut acq, log) = subscribed(AcquisitionConfig::default());
        acq.start(0).unwrap();
        let handle = acq.listener().unwrap();
        acq.handle_event(handle, 5, event_z(9.81));
        acq.set_exclude_gravity(true);
        acq.handle_event(handle, 10, event_z(10.81));

        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].as_ref().unwrap().z, 9.81);
        assert_eq!(log[0].as_ref().unwrap().timestamp, 5);
        assert!((log[1].as_ref().unwrap().z - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_watchdog_trips_without_events() {
        let (mut acq, log) = subscribed(AcquisitionConfig::default());
        acq.start(0).unwrap();
        assert_eq!(acq.next_deadline(), Some(1000));
        acq.poll(999);
        assert!(acq.is_listening());
        acq.poll(1000);
        assert!(!acq.is_listening());
        assert_eq!(
            errors(&log),
            vec![AcquisitionError::NoDataTimeout { waited_ms: 1000 }]
        );
        // Not re-armed: further polling reports nothing.
        acq.poll(5000);
        assert_eq!(errors(&log).len(), 1);
    }

    #[test]
    fn test_event_cancels_watchdog() {
        let (mut acq, log) = subscribed(AcquisitionConfig::default());
        acq.start(0).unwrap();
        let handle = acq.listener().unwrap();
        acq.handle_event(handle, 999, event_z(9.81));
        acq.poll(1000);
        acq.poll(10_000);
        assert!(acq.is_listening());
        assert!(errors(&log).is_empty());
    }

    #[test]
    fn test_incomplete_streak_reports_once() {
        let (mut acq, log) = subscribed(AcquisitionConfig::default());
        acq.start(0).unwrap();
        let handle = acq.listener().unwrap();
        for t in 0..9 {
            acq.handle_event(handle, t, broken_event());
        }
        assert!(acq.is_listening());
        acq.handle_event(handle, 9, broken_event());
        assert!(!acq.is_listening());
        for t in 10..30 {
            acq.handle_event(handle, t, broken_event());
        }
        assert_eq!(
            errors(&log),
            vec![AcquisitionError::IncompleteDataStreak {
                count: 10,
                kind: IncompleteKind::MissingAxis
            }]
        );
    }

    #[test]
    fn test_streak_resets_on_success() {
        let (mut acq, log) = subscribed(AcquisitionConfig::default());
        acq.start(0).unwrap();
        let handle = acq.listener().unwrap();
        for t in 0..9 {
            acq.handle_event(handle, t, broken_event());
        }
        acq.handle_event(handle, 9, event_z(9.81));
        for t in 10..19 {
            acq.handle_event(handle, t, broken_event());
        }
        assert!(acq.is_listening());
        assert!(errors(&log).is_empty());
    }

    #[test]
    fn test_missing_channel_kind() {
        let (mut acq, log) = subscribed(AcquisitionConfig {
            incomplete_threshold: 2,
            ..Default::default()
        });
        acq.start(0).unwrap();
        let handle = acq.listener().unwrap();
        acq.handle_event(handle, 0, RawMotionEvent::default());
        acq.handle_event(handle, 1, RawMotionEvent::default());
        assert_eq!(
            errors(&log),
            vec![AcquisitionError::IncompleteDataStreak {
                count: 2,
                kind: IncompleteKind::NoChannel
            }]
        );
    }

    #[test]
    fn test_dedicated_error_handler_takes_precedence() {
        let (mut acq, log) = subscribed(AcquisitionConfig::default());
        let handled = Rc::new(RefCell::new(Vec::new()));
        let sink = handled.clone();
        acq.set_error_handler(Box::new(move |e| sink.borrow_mut().push(e)));
        acq.start(0).unwrap();
        acq.poll(1000);
        assert!(log.borrow().is_empty());
        assert_eq!(handled.borrow().len(), 1);
    }

    #[test]
    fn test_stale_listener_events_dropped() {
        let (mut acq, log) = subscribed(AcquisitionConfig::default());
        acq.start(0).unwrap();
        let old = acq.listener().unwrap();
        acq.stop();
        acq.start(10).unwrap();
        acq.handle_event(old, 20, event_z(9.81));
        assert!(log.borrow().is_empty());
        let current = acq.listener().unwrap();
        acq.handle_event(current, 30, event_z(9.81));
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_throttled_trailing_delivery_and_stop_drops_it() {
        let (mut acq, log) = subscribed(AcquisitionConfig {
            rate_hz: Some(10.0),
            ..Default::default()
        });
        acq.start(0).unwrap();
        let handle = acq.listener().unwrap();
        acq.handle_event(handle, 0, event_z(1.0));
        acq.handle_event(handle, 30, event_z(2.0));
        acq.handle_event(handle, 60, event_z(3.0));
        assert_eq!(acq.next_deadline(), Some(100));
        acq.poll(100);
        {
            let log = log.borrow();
            assert_eq!(log.len(), 2);
            assert_eq!(log[1].as_ref().unwrap().z, 3.0);
            assert_eq!(log[1].as_ref().unwrap().timestamp, 100);
        }

        acq.handle_event(handle, 150, event_z(4.0));
        acq.stop();
        acq.poll(300);
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_configure_while_listening_keeps_deferred_event() {
        let (mut acq, log) = subscribed(AcquisitionConfig {
            rate_hz: Some(10.0),
            ..Default::default()
        });
        acq.start(0).unwrap();
        let handle = acq.listener().unwrap();
        acq.handle_event(handle, 0, event_z(1.0));
        acq.handle_event(handle, 30, event_z(2.0));

        acq.configure(None, false);
        assert_eq!(acq.next_deadline(), Some(100));
        acq.poll(100);
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(log.borrow()[1].as_ref().unwrap().z, 2.0);

        // New rate only after a restart.
        acq.handle_event(handle, 120, event_z(3.0));
        assert_eq!(log.borrow().len(), 2);
        acq.stop();
        acq.start(200).unwrap();
        let handle = acq.listener().unwrap();
        acq.handle_event(handle, 200, event_z(4.0));
        acq.handle_event(handle, 201, event_z(5.0));
        assert_eq!(log.borrow().len(), 4);
    }

    #[test]
    fn test_set_throttle_restarts_listener() {
        let (mut acq, log) = subscribed(AcquisitionConfig::default());
        acq.start(0).unwrap();
        let first = acq.listener().unwrap();
        acq.set_throttle(50, Some(20.0)).unwrap();
        let second = acq.listener().unwrap();
        assert_ne!(first, second);
        assert_eq!(acq.config().rate_hz, Some(20.0));

        let mut delivered_at = Vec::new();
        for t in (60..1060).step_by(10) {
            acq.poll(t);
            acq.handle_event(second, t, event_z(9.81));
        }
        for d in log.borrow().iter() {
            delivered_at.push(d.as_ref().unwrap().timestamp);
        }
        let spacings: Vec<u64> = delivered_at.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(!spacings.is_empty());
        assert!(spacings.iter().all(|s| *s == 50), "{:?}", spacings);
    }

    #[test]
    fn test_set_throttle_while_stopped_stays_stopped() {
        let (mut acq, _) = subscribed(AcquisitionConfig::default());
        acq.set_throttle(0, Some(5.0)).unwrap();
        assert!(!acq.is_listening());
    }
}
