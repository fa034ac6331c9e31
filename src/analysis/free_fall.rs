//! Free-fall distance experiment: wait → record → process → finish.
//!
//! A vertical sample above `gravity + trigger_margin` starts the recording and
//! (re)arms a quiet-period debounce. When the debounce expires the series is
//! processed once and the estimator parks in `Finish` until `restart`.

use super::distance::{self, DistanceReport, ErrorPercentages};
use crate::timing::Deadline;
use crate::types::{AccelerationSeries, Sample, GRAVITY};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentState {
    Wait,
    Record,
    Process,
    Finish,
}

impl ExperimentState {
    /// Label shown to the user.
    pub fn label(&self) -> &'static str {
        match self {
            ExperimentState::Wait => "en attente",
            ExperimentState::Record => "enregistrement",
            ExperimentState::Process => "traitement",
            ExperimentState::Finish => "terminé",
        }
    }
}

#[derive(Clone, Debug)]
pub struct FreeFallConfig {
    pub gravity: f64,
    /// Added to `gravity` to form the crossing threshold.
    pub trigger_margin: f64,
    /// Quiet time after the last crossing before processing.
    pub quiet_period_ms: u64,
}

impl Default for FreeFallConfig {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            trigger_margin: 4.0,
            quiet_period_ms: 2000,
        }
    }
}

impl FreeFallConfig {
    pub fn threshold(&self) -> f64 {
        self.gravity + self.trigger_margin
    }
}

/// Things the session reacts to.
#[derive(Clone, Debug, PartialEq)]
pub enum FreeFallEvent {
    StateChanged(ExperimentState),
    /// Processing done; acquisition should stop.
    Finished(DistanceReport),
}

pub struct FreeFallEstimator {
    config: FreeFallConfig,
    state: ExperimentState,
    series: AccelerationSeries,
    debounce: Deadline,
    report: Option<DistanceReport>,
    calibration: Option<ErrorPercentages>,
}

impl FreeFallEstimator {
    pub fn new(config: FreeFallConfig) -> Self {
        Self {
            config,
            state: ExperimentState::Wait,
            series: AccelerationSeries::new(),
            debounce: Deadline::idle(),
            report: None,
            calibration: None,
        }
    }

    pub fn state(&self) -> ExperimentState {
        self.state
    }

    pub fn series(&self) -> &AccelerationSeries {
        &self.series
    }

    pub fn report(&self) -> Option<&DistanceReport> {
        self.report.as_ref()
    }

    pub fn calibration(&self) -> Option<&ErrorPercentages> {
        self.calibration.as_ref()
    }

    /// Consume one sample. Due debounce expiry is handled first, so a sample
    /// arriving after the quiet period is never recorded.
    pub fn feed(&mut self, sample: &Sample) -> Vec<FreeFallEvent> {
        let mut events = self.poll(sample.timestamp);
        if matches!(self.state, ExperimentState::Process | ExperimentState::Finish) {
            return events;
        }

        if sample.z > self.config.threshold() {
            if self.state == ExperimentState::Wait {
                self.state = ExperimentState::Record;
                log::info!("[FREEFALL] Crossing at {} ms (z = {:.2}), recording", sample.timestamp, sample.z);
                events.push(FreeFallEvent::StateChanged(ExperimentState::Record));
            }
            self.debounce.arm(sample.timestamp, self.config.quiet_period_ms);
        }

        if self.state == ExperimentState::Record {
            self.series.insert(sample.timestamp, sample.z);
        }
        events
    }

    /// Fire the debounce if due: record → process → finish.
    pub fn poll(&mut self, now: u64) -> Vec<FreeFallEvent> {
        if self.state != ExperimentState::Record || !self.debounce.fire(now) {
            return Vec::new();
        }

        self.state = ExperimentState::Process;
        let recorded = self.series.len();
        let report = distance::process(&mut self.series, self.config.gravity, self.config.threshold());
        self.state = ExperimentState::Finish;
        self.report = Some(report);
        log::info!(
            "[FREEFALL] Processed {} samples ({} kept over {} ms): time {:.3} m, accel {:.3} m",
            recorded,
            report.sample_count,
            report.duration_ms,
            report.estimate.time_based_height,
            report.estimate.acceleration_based_height
        );

        vec![
            FreeFallEvent::StateChanged(ExperimentState::Process),
            FreeFallEvent::StateChanged(ExperimentState::Finish),
            FreeFallEvent::Finished(report),
        ]
    }

    pub fn next_deadline(&self) -> Option<u64> {
        match self.state {
            ExperimentState::Record => self.debounce.at(),
            _ => None,
        }
    }

    /// Compare the last estimate to a measured height. Returns `None` and keeps
    /// any previous result when there is no estimate or the height is invalid.
    pub fn calibrate(&mut self, real_height: f64) -> Option<ErrorPercentages> {
        let errors = self.report?.estimate.calibrate(real_height)?;
        self.calibration = Some(errors);
        Some(errors)
    }

    /// Back to `Wait` with an empty series and no pending debounce.
    pub fn restart(&mut self) {
        self.state = ExperimentState::Wait;
        self.series.clear();
        self.debounce.cancel();
        self.report = None;
        self.calibration = None;
    }
}

impl Default for FreeFallEstimator {
    fn default() -> Self {
        Self::new(FreeFallConfig::default())
    }
}
