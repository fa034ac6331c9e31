//! Rolling five-second acceleration plot redrawn at a fixed frame rate.
//!
//! `RealtimeGraph` owns the window of points and the frame timer. Eviction is
//! lazy: it only happens when a frame is rendered, so a stopped graph keeps
//! its points until drawing resumes.

use crate::timing::Deadline;
use crate::types::AccelerationSeries;

pub const Y_AXIS_LABEL: &str = "Accélération (m/s)";
pub const X_AXIS_LABEL: &str = "Temps (s)";

#[derive(Clone, Debug)]
pub struct GraphConfig {
    /// Horizontal time span and retention window.
    pub span_ms: u64,
    pub frame_rate_hz: f64,
    /// Distance from every edge to the axis bars.
    pub margin: f64,
    /// Extra gap between the newest point and the right margin.
    pub trace_inset: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            span_ms: 5000,
            frame_rate_hz: 25.0,
            margin: 20.0,
            trace_inset: 4.0,
        }
    }
}

impl GraphConfig {
    pub fn frame_period_ms(&self) -> u64 {
        crate::timing::window_from_rate(Some(self.frame_rate_hz)).max(1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextAnchor {
    Left,
    Center,
    Right,
}

/// 2D target with the origin at the top-left corner.
pub trait RenderSurface {
    fn size(&self) -> (f64, f64);
    fn clear(&mut self);
    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64);
    fn text(&mut self, x: f64, y: f64, text: &str, anchor: TextAnchor);
    /// Connected polyline through `points`, in order.
    fn stroke_path(&mut self, points: &[(f64, f64)]);
}

/// Timestamped points younger than the graph span.
#[derive(Clone, Debug, Default)]
pub struct GraphWindow {
    points: AccelerationSeries,
}

impl GraphWindow {
    pub fn insert(&mut self, timestamp: u64, value: f64) {
        self.points.insert(timestamp, value);
    }

    /// Remove every point with `now − ts ≥ span_ms`.
    pub fn evict(&mut self, now: u64, span_ms: u64) {
        if let Some(oldest_kept) = (now + 1).checked_sub(span_ms) {
            self.points.drop_before(oldest_kept);
        }
    }

    /// Symmetric autoscale bound, `max(|max|, |min|) + 1`; 1 when empty.
    pub fn extremum(&self) -> f64 {
        match self.points.min_max() {
            Some((lo, hi)) => hi.abs().max(lo.abs()) + 1.0,
            None => 1.0,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.points.iter()
    }
}

/// Geometry of one rendered frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub extremum: f64,
    pub points: Vec<(f64, f64)>,
}

pub struct RealtimeGraph {
    config: GraphConfig,
    window: GraphWindow,
    frame_timer: Deadline,
    frames: u64,
}

impl RealtimeGraph {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config,
            window: GraphWindow::default(),
            frame_timer: Deadline::idle(),
            frames: 0,
        }
    }

    pub fn window(&self) -> &GraphWindow {
        &self.window
    }

    pub fn is_drawing(&self) -> bool {
        self.frame_timer.is_armed()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn add_point(&mut self, now: u64, value: f64) {
        self.window.insert(now, value);
    }

    /// Start the frame loop; the first frame is due one period from `now`.
    pub fn start_drawing(&mut self, now: u64) {
        if !self.is_drawing() {
            self.frame_timer.arm(now, self.config.frame_period_ms());
            log::debug!("[GRAPH] Drawing every {} ms", self.config.frame_period_ms());
        }
    }

    /// Stop the frame loop. Points are kept.
    pub fn stop_drawing(&mut self) {
        self.frame_timer.cancel();
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.frame_timer.at()
    }

    /// True when a frame is due. Re-arms on the fixed cadence; a late poll
    /// skips missed frames instead of bursting.
    pub fn poll(&mut self, now: u64) -> bool {
        let Some(due) = self.frame_timer.at() else {
            return false;
        };
        if !self.frame_timer.fire(now) {
            return false;
        }
        let period = self.config.frame_period_ms();
        let mut next = due + period;
        if next <= now {
            next = now + period;
        }
        self.frame_timer.arm_at(next);
        true
    }

    /// Evict, then map the remaining points for a `width` × `height` surface.
    pub fn frame(&mut self, now: u64, width: f64, height: f64) -> Frame {
        self.window.evict(now, self.config.span_ms);
        let extremum = self.window.extremum();
        let points = self
            .window
            .iter()
            .map(|(ts, v)| self.position(now, ts, v, extremum, width, height))
            .collect();
        Frame { extremum, points }
    }

    fn position(&self, now: u64, ts: u64, value: f64, extremum: f64, width: f64, height: f64) -> (f64, f64) {
        let c = &self.config;
        let age = now.saturating_sub(ts) as f64;
        let right = width - c.margin - c.trace_inset;
        let usable = width - 2.0 * c.margin - c.trace_inset;
        let x = right - age / c.span_ms as f64 * usable;

        let half_range = height / 2.0 - c.margin;
        let clamped = value.clamp(-extremum, extremum);
        let y = height / 2.0 - clamped / extremum * half_range;
        (x, y)
    }

    /// Draw axes, labels and trace for `now`.
    pub fn render<S: RenderSurface>(&mut self, now: u64, surface: &mut S) -> Frame {
        let (width, height) = surface.size();
        let frame = self.frame(now, width, height);
        let m = self.config.margin;

        surface.clear();
        surface.fill_rect(m, m, 2.0, height - 2.0 * m);
        surface.fill_rect(m, height / 2.0 - 1.0, width - 2.0 * m, 2.0);

        surface.text(3.0, 3.0, Y_AXIS_LABEL, TextAnchor::Left);
        surface.text(width - 3.0, height - 3.0, X_AXIS_LABEL, TextAnchor::Right);
        surface.text(m - 2.0, height / 2.0, "0", TextAnchor::Right);
        surface.text(m - 2.0, m + 5.0, &format!("{:.1}", frame.extremum), TextAnchor::Right);
        surface.text(m - 2.0, height - m - 5.0, &format!("-{:.1}", frame.extremum), TextAnchor::Right);
        surface.text(width - m - 5.0, height / 2.0 + 5.0, "0", TextAnchor::Center);
        let span_s = format!("{}", self.config.span_ms / 1000);
        surface.text(m + 10.0, height / 2.0 + 5.0, &span_s, TextAnchor::Center);

        if frame.points.len() >= 2 {
            surface.stroke_path(&frame.points);
        }
        self.frames += 1;
        frame
    }
}

impl Default for RealtimeGraph {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}
