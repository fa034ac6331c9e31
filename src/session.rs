//! One experiment run: acquisition, analysis, graph and display on one thread.
//!
//! `Session` is synchronous and clock-free like the components it drives;
//! `run` is the async loop that feeds it source events, user commands and
//! timer wake-ups on a current-thread runtime.

use crate::acquisition::{AcquisitionConfig, Delivery, MotionSource, SensorAcquisition, SourceEvent};
use crate::analysis::distance::parse_reference_height;
use crate::analysis::{AnalysisEvent, Analyzer, ExperimentKind};
use crate::canvas::CharCanvas;
use crate::display::DisplaySink;
use crate::error::{AcqResult, AcquisitionError};
use crate::graph::{GraphConfig, RealtimeGraph};
use crate::live_status::{current_timestamp, LiveStatus};
use crate::rerun_logger::RerunLogger;
use crate::types::Sample;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::{interval, sleep_until, Duration, Instant, MissedTickBehavior};

// ─── Commands ──────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// New run from `wait`, buffers cleared.
    Restart,
    /// Full reset after an acquisition error.
    Retry,
    /// Raw user input for the reference height.
    Calibrate(String),
    Pause,
    Resume,
    /// Zero the raw experiment counters.
    Reset,
    /// New delivery rate; `None` disables throttling.
    Rate(Option<f64>),
    /// `true` includes gravity.
    Gravity(bool),
    Quit,
}

impl Command {
    /// Parse one input line. `None` for anything unrecognised.
    pub fn parse(line: &str) -> Option<Command> {
        let mut words = line.split_whitespace();
        let name = words.next()?.to_lowercase();
        let arg = words.next();
        let command = match (name.as_str(), arg) {
            ("restart", None) => Command::Restart,
            ("retry", None) => Command::Retry,
            ("calibrate", Some(value)) => Command::Calibrate(value.to_string()),
            ("pause", None) => Command::Pause,
            ("resume", None) => Command::Resume,
            ("reset", None) => Command::Reset,
            ("rate", Some("off")) => Command::Rate(None),
            ("rate", Some(value)) => {
                let hz: f64 = value.parse().ok()?;
                if !hz.is_finite() || hz < 0.0 {
                    return None;
                }
                Command::Rate((hz > 0.0).then_some(hz))
            }
            ("gravity", Some("on")) => Command::Gravity(true),
            ("gravity", Some("off")) => Command::Gravity(false),
            ("quit" | "exit" | "q", None) => Command::Quit,
            _ => return None,
        };
        Some(command)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

// ─── Configuration ─────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub experiment: ExperimentKind,
    pub acquisition: AcquisitionConfig,
    /// Rolling graph; `None` disables it.
    pub graph: Option<GraphConfig>,
    /// Decimals for displayed acceleration.
    pub precision: usize,
}

impl SessionConfig {
    /// Defaults each experiment page shipped with.
    pub fn for_experiment(experiment: ExperimentKind) -> Self {
        let (rate_hz, exclude_gravity, graph, precision) = match experiment {
            ExperimentKind::Distance => (Some(60.0), false, None, 1),
            ExperimentKind::Vertical => (Some(25.0), true, Some(GraphConfig::default()), 2),
            ExperimentKind::Raw => (None, false, None, 3),
        };
        Self {
            experiment,
            acquisition: AcquisitionConfig {
                rate_hz,
                exclude_gravity,
                ..Default::default()
            },
            graph,
            precision,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::for_experiment(ExperimentKind::Distance)
    }
}

// ─── Session ───────────────────────────────────────────────────────────────

pub struct Session<S, D> {
    acquisition: SensorAcquisition<S>,
    inbox: UnboundedReceiver<Delivery>,
    analyzer: Analyzer,
    graph: Option<(RealtimeGraph, CharCanvas)>,
    display: D,
    recorder: Option<RerunLogger>,
    source_label: String,
    last_error: Option<AcquisitionError>,
    error_count: u32,
    last_sample: Option<Sample>,
    paused: bool,
    started_at: Option<u64>,
}

impl<S: MotionSource, D: DisplaySink> Session<S, D> {
    pub fn new(source: S, config: SessionConfig, display: D) -> Self {
        let mut acquisition = SensorAcquisition::new(source, config.acquisition.clone());
        let (tx, inbox) = mpsc::unbounded_channel();
        acquisition.subscribe(Box::new(move |delivery| {
            let _ = tx.send(delivery);
        }));

        let graph = config
            .graph
            .map(|graph_config| (RealtimeGraph::new(graph_config), CharCanvas::new(80, 20)));

        Self {
            acquisition,
            inbox,
            analyzer: Analyzer::new(config.experiment),
            graph,
            display,
            recorder: None,
            source_label: String::new(),
            last_error: None,
            error_count: 0,
            last_sample: None,
            paused: false,
            started_at: None,
        }
    }

    /// Surface the graph is drawn on. Ignored when the graph is disabled.
    pub fn set_canvas(&mut self, canvas: CharCanvas) {
        if let Some((_, current)) = self.graph.as_mut() {
            *current = canvas;
        }
    }

    pub fn set_recorder(&mut self, recorder: RerunLogger) {
        self.recorder = Some(recorder);
    }

    pub fn set_source_label(&mut self, label: &str) {
        self.source_label = label.to_string();
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn acquisition(&self) -> &SensorAcquisition<S> {
        &self.acquisition
    }

    pub fn graph(&self) -> Option<&RealtimeGraph> {
        self.graph.as_ref().map(|(graph, _)| graph)
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn last_error(&self) -> Option<&AcquisitionError> {
        self.last_error.as_ref()
    }

    /// Begin the run: acquisition listening, graph drawing.
    pub fn start(&mut self, now: u64) -> AcqResult<()> {
        self.started_at.get_or_insert(now);
        log::info!("[SESSION] Starting {:?} experiment", self.analyzer.kind());
        self.display.show_state(self.analyzer.state_label());
        self.acquisition.start(now)?;
        if let Some((graph, _)) = self.graph.as_mut() {
            graph.start_drawing(now);
        }
        self.pump(now);
        Ok(())
    }

    pub fn handle_event(&mut self, event: SourceEvent, now: u64) {
        self.acquisition.handle_event(event.listener, now, event.event);
        self.pump(now);
    }

    /// Run every timer that is due at `now`.
    pub fn poll(&mut self, now: u64) {
        self.acquisition.poll(now);
        self.pump(now);

        let events = self.analyzer.poll(now);
        self.apply(events, now);

        if let Some((graph, canvas)) = self.graph.as_mut() {
            if graph.poll(now) {
                graph.render(now, canvas);
                self.display.show_frame(canvas);
            }
        }
    }

    pub fn next_deadline(&self) -> Option<u64> {
        [
            self.acquisition.next_deadline(),
            self.analyzer.next_deadline(),
            self.graph.as_ref().and_then(|(graph, _)| graph.next_deadline()),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn command(&mut self, command: Command, now: u64) -> AcqResult<Flow> {
        log::debug!("[SESSION] Command {:?}", command);
        match command {
            Command::Restart => self.reset_run(now)?,
            Command::Retry => {
                if let Some(err) = &self.last_error {
                    log::info!("[SESSION] Retrying after: {}", err);
                }
                self.display.clear_error();
                self.reset_run(now)?;
            }
            Command::Calibrate(input) => self.calibrate(&input),
            Command::Pause => {
                self.paused = true;
                self.acquisition.stop();
                self.display.show_state("en pause");
            }
            Command::Resume => {
                if self.paused {
                    self.paused = false;
                    self.display.show_state(self.analyzer.state_label());
                    self.acquisition.start(now)?;
                }
            }
            Command::Reset => match self.analyzer.raw_monitor_mut() {
                Some(monitor) => {
                    monitor.reset();
                    let zero = Sample::new(now, 0.0, 0.0, 0.0);
                    self.display.show_raw(&zero, 0, 0);
                }
                None => log::info!("[SESSION] `reset` only applies to the raw experiment"),
            },
            Command::Rate(rate_hz) => {
                log::info!("[SESSION] Throttle rate now {:?} Hz", rate_hz);
                self.acquisition.set_throttle(now, rate_hz)?;
            }
            Command::Gravity(include) => self.acquisition.set_exclude_gravity(!include),
            Command::Quit => return Ok(Flow::Quit),
        }
        self.pump(now);
        Ok(Flow::Continue)
    }

    pub fn snapshot(&mut self, now: u64) -> LiveStatus {
        let mut status = LiveStatus::new(self.analyzer.kind());
        status.timestamp = current_timestamp();
        status.source = self.source_label.clone();
        status.state = self.analyzer.state_label().to_string();
        status.listening = self.acquisition.is_listening();
        status.paused = self.paused;
        status.exclude_gravity = self.acquisition.config().exclude_gravity;
        status.rate_hz = self.acquisition.config().rate_hz;
        status.uptime_seconds = now.saturating_sub(self.started_at.unwrap_or(now)) / 1000;
        status.samples_delivered = self.acquisition.delivered();
        status.data_rate = match self.analyzer.raw_monitor_mut() {
            Some(monitor) => monitor.rate(now),
            None => 0,
        };
        status.last_acceleration = self.last_sample.map(|s| s.z);
        status.motion_sign = self.analyzer.direction().map(|c| c.sign());
        if let Some(estimator) = self.analyzer.free_fall() {
            status.distance = estimator.report().map(|r| r.estimate);
            status.error_percentages = estimator.calibration().copied();
        }
        status.last_error = self.last_error.as_ref().map(|e| e.to_string());
        status.error_count = self.error_count;
        status
    }

    fn reset_run(&mut self, now: u64) -> AcqResult<()> {
        self.acquisition.stop();
        self.analyzer.restart();
        self.last_error = None;
        self.paused = false;
        log::info!("[SESSION] New run");
        self.display.show_state(self.analyzer.state_label());
        self.acquisition.start(now)
    }

    fn calibrate(&mut self, input: &str) {
        let Some(height) = parse_reference_height(input) else {
            log::info!("[SESSION] Ignoring calibration input {:?}", input);
            return;
        };
        match self.analyzer.calibrate(height) {
            Some(errors) => {
                if let Some(report) = self.analyzer.free_fall().and_then(|e| e.report()) {
                    self.display.show_distance(report, Some(&errors));
                }
            }
            None => log::info!("[SESSION] Nothing to calibrate yet"),
        }
    }

    fn pump(&mut self, now: u64) {
        while let Ok(delivery) = self.inbox.try_recv() {
            match delivery {
                Ok(sample) => self.on_sample(sample, now),
                Err(err) => self.on_error(err),
            }
        }
    }

    fn on_sample(&mut self, sample: Sample, now: u64) {
        self.last_sample = Some(sample);
        if let Some(recorder) = &self.recorder {
            recorder.log_sample(&sample);
        }
        if let Some((graph, _)) = self.graph.as_mut() {
            graph.add_point(sample.timestamp, sample.z);
        }

        let events = self.analyzer.feed(&sample);
        match self.analyzer.raw_monitor_mut() {
            Some(monitor) => {
                let (total, rate) = (monitor.total(), monitor.rate(now));
                self.display.show_raw(&sample, total, rate);
            }
            None => self.display.show_acceleration(sample.z),
        }
        self.apply(events, now);
    }

    fn on_error(&mut self, err: AcquisitionError) {
        log::warn!("[SESSION] Acquisition stopped: {}", err);
        self.error_count += 1;
        self.display.show_error(&err);
        self.last_error = Some(err);
    }

    fn apply(&mut self, events: Vec<AnalysisEvent>, now: u64) {
        for event in events {
            match event {
                AnalysisEvent::StateChanged(state) => self.display.show_state(state.label()),
                AnalysisEvent::DirectionChanged(sign) => {
                    if let Some(recorder) = &self.recorder {
                        recorder.log_motion_sign(now, sign);
                    }
                    self.display.show_state(sign.arrow());
                }
                AnalysisEvent::Finished(report) => {
                    self.acquisition.stop();
                    if let Some(recorder) = &self.recorder {
                        recorder.log_distance(now, &report.estimate);
                    }
                    self.display.show_distance(&report, None);
                }
            }
        }
    }
}

// ─── Async runner ──────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct RunOptions {
    pub status_file: Option<String>,
    pub status_interval_ms: u64,
    /// Stop after this long; `None` runs until `quit`.
    pub duration_ms: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            status_file: None,
            status_interval_ms: 2000,
            duration_ms: None,
        }
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Drive `session` until `quit` or the optional duration. Returns the session clock at exit.
pub async fn run<S: MotionSource, D: DisplaySink>(
    session: &mut Session<S, D>,
    mut events: mpsc::Receiver<SourceEvent>,
    mut commands: UnboundedReceiver<Command>,
    options: RunOptions,
) -> anyhow::Result<u64> {
    let origin = Instant::now();
    let now_ms = || origin.elapsed().as_millis() as u64;
    let at = |ms: u64| origin + Duration::from_millis(ms);

    session.start(now_ms())?;

    let mut status_tick = interval(Duration::from_millis(options.status_interval_ms.max(1)));
    status_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let end = options.duration_ms.map(at);
    let mut commands_open = true;

    loop {
        let wake = session.next_deadline().map(at);
        tokio::select! {
            Some(event) = events.recv() => session.handle_event(event, now_ms()),
            command = commands.recv(), if commands_open => match command {
                Some(command) => {
                    if session.command(command, now_ms())? == Flow::Quit {
                        break;
                    }
                }
                None => commands_open = false,
            },
            _ = sleep_until_opt(wake) => session.poll(now_ms()),
            _ = status_tick.tick(), if options.status_file.is_some() => {
                if let Some(path) = &options.status_file {
                    let _ = session.snapshot(now_ms()).save(path);
                }
            }
            _ = sleep_until_opt(end) => break,
        }
    }

    if let Some(path) = &options.status_file {
        let _ = session.snapshot(now_ms()).save(path);
    }
    let elapsed = now_ms();
    log::info!("[SESSION] Stopped after {} ms", elapsed);
    Ok(elapsed)
}
