//! Motion analysis run on the delivered sample stream, one experiment at a time.

pub mod direction;
pub mod distance;
pub mod free_fall;
pub mod raw_monitor;

pub use direction::{DirectionConfig, MotionSign, VerticalDirectionClassifier};
pub use distance::{DistanceEstimate, DistanceReport, ErrorPercentages};
pub use free_fall::{ExperimentState, FreeFallConfig, FreeFallEstimator, FreeFallEvent};
pub use raw_monitor::RawMonitor;

use crate::types::Sample;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentKind {
    /// Free-fall distance of a throw.
    Distance,
    /// Up / down / still classification.
    Vertical,
    /// Raw x, y, z with count and data rate.
    Raw,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnalysisEvent {
    StateChanged(ExperimentState),
    DirectionChanged(MotionSign),
    /// The experiment reached its terminal result; acquisition should stop.
    Finished(DistanceReport),
}

impl From<FreeFallEvent> for AnalysisEvent {
    fn from(event: FreeFallEvent) -> Self {
        match event {
            FreeFallEvent::StateChanged(state) => AnalysisEvent::StateChanged(state),
            FreeFallEvent::Finished(report) => AnalysisEvent::Finished(report),
        }
    }
}

pub enum Analyzer {
    FreeFall(FreeFallEstimator),
    Direction(VerticalDirectionClassifier),
    Raw(RawMonitor),
}

impl Analyzer {
    pub fn new(kind: ExperimentKind) -> Self {
        match kind {
            ExperimentKind::Distance => Analyzer::FreeFall(FreeFallEstimator::default()),
            ExperimentKind::Vertical => Analyzer::Direction(VerticalDirectionClassifier::default()),
            ExperimentKind::Raw => Analyzer::Raw(RawMonitor::new()),
        }
    }

    pub fn kind(&self) -> ExperimentKind {
        match self {
            Analyzer::FreeFall(_) => ExperimentKind::Distance,
            Analyzer::Direction(_) => ExperimentKind::Vertical,
            Analyzer::Raw(_) => ExperimentKind::Raw,
        }
    }

    pub fn feed(&mut self, sample: &Sample) -> Vec<AnalysisEvent> {
        match self {
            Analyzer::FreeFall(estimator) => estimator.feed(sample).into_iter().map(Into::into).collect(),
            Analyzer::Direction(classifier) => {
                let before = classifier.sign();
                let after = classifier.update(sample);
                if before != after {
                    vec![AnalysisEvent::DirectionChanged(after)]
                } else {
                    Vec::new()
                }
            }
            Analyzer::Raw(monitor) => {
                monitor.record(sample);
                Vec::new()
            }
        }
    }

    /// Fire time-driven transitions that are due.
    pub fn poll(&mut self, now: u64) -> Vec<AnalysisEvent> {
        match self {
            Analyzer::FreeFall(estimator) => estimator.poll(now).into_iter().map(Into::into).collect(),
            Analyzer::Direction(_) | Analyzer::Raw(_) => Vec::new(),
        }
    }

    pub fn next_deadline(&self) -> Option<u64> {
        match self {
            Analyzer::FreeFall(estimator) => estimator.next_deadline(),
            Analyzer::Direction(_) | Analyzer::Raw(_) => None,
        }
    }

    /// Fresh run: buffers cleared, state back to its initial value.
    pub fn restart(&mut self) {
        match self {
            Analyzer::FreeFall(estimator) => estimator.restart(),
            Analyzer::Direction(classifier) => classifier.reset(),
            Analyzer::Raw(monitor) => monitor.reset(),
        }
    }

    pub fn state_label(&self) -> &'static str {
        match self {
            Analyzer::FreeFall(estimator) => estimator.state().label(),
            Analyzer::Direction(classifier) => classifier.sign().arrow(),
            Analyzer::Raw(_) => "mesure",
        }
    }

    /// Only meaningful for the distance experiment.
    pub fn calibrate(&mut self, real_height: f64) -> Option<ErrorPercentages> {
        match self {
            Analyzer::FreeFall(estimator) => estimator.calibrate(real_height),
            Analyzer::Direction(_) | Analyzer::Raw(_) => None,
        }
    }

    pub fn free_fall(&self) -> Option<&FreeFallEstimator> {
        match self {
            Analyzer::FreeFall(estimator) => Some(estimator),
            _ => None,
        }
    }

    pub fn direction(&self) -> Option<&VerticalDirectionClassifier> {
        match self {
            Analyzer::Direction(classifier) => Some(classifier),
            _ => None,
        }
    }

    pub fn raw_monitor_mut(&mut self) -> Option<&mut RawMonitor> {
        match self {
            Analyzer::Raw(monitor) => Some(monitor),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_events_only_on_change() {
        let mut analyzer = Analyzer::new(ExperimentKind::Vertical);
        assert!(analyzer.feed(&Sample::new(0, 0.0, 0.0, 0.0)).is_empty());
        assert_eq!(
            analyzer.feed(&Sample::new(40, 0.0, 0.0, 3.0)),
            vec![AnalysisEvent::DirectionChanged(MotionSign::Up)]
        );
        assert!(analyzer.feed(&Sample::new(80, 0.0, 0.0, 3.0)).is_empty());
        assert_eq!(analyzer.state_label(), "⬆");
    }

    #[test]
    fn test_distance_flow_through_analyzer() {
        let mut analyzer = Analyzer::new(ExperimentKind::Distance);
        assert_eq!(
            analyzer.feed(&Sample::new(0, 0.0, 0.0, 20.0)),
            vec![AnalysisEvent::StateChanged(ExperimentState::Record)]
        );
        assert_eq!(analyzer.next_deadline(), Some(2000));
        let events = analyzer.poll(2000);
        assert!(matches!(events.last(), Some(AnalysisEvent::Finished(_))));
        assert_eq!(analyzer.free_fall().map(|e| e.state()), Some(ExperimentState::Finish));
        assert_eq!(analyzer.state_label(), "terminé");

        analyzer.restart();
        assert_ne!(analyzer.free_fall().map(|e| e.state()), Some(ExperimentState::Finish));
        assert_eq!(analyzer.state_label(), "en attente");
    }

    #[test]
    fn test_calibrate_only_for_distance() {
        let mut analyzer = Analyzer::new(ExperimentKind::Raw);
        assert!(analyzer.calibrate(1.0).is_none());
        analyzer.feed(&Sample::new(0, 0.0, 0.0, 1.0));
        assert_eq!(analyzer.raw_monitor_mut().map(|m| m.total()), Some(1));
    }
}
