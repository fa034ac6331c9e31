use crate::analysis::{DistanceEstimate, ErrorPercentages, ExperimentKind, MotionSign};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

/// Snapshot of a running experiment, written periodically for external viewers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub experiment: ExperimentKind,
    pub source: String,
    pub state: String,
    pub listening: bool,
    pub paused: bool,
    pub exclude_gravity: bool,
    pub rate_hz: Option<f64>,
    pub uptime_seconds: u64,
    // Samples
    pub samples_delivered: u64,
    pub data_rate: usize,
    pub last_acceleration: Option<f64>,
    pub motion_sign: Option<MotionSign>,
    // Distance experiment
    pub distance: Option<DistanceEstimate>,
    pub error_percentages: Option<ErrorPercentages>,
    // Acquisition errors
    pub last_error: Option<String>,
    pub error_count: u32,
}

impl LiveStatus {
    pub fn new(experiment: ExperimentKind) -> Self {
        Self {
            timestamp: current_timestamp(),
            experiment,
            source: String::new(),
            state: String::new(),
            listening: false,
            paused: false,
            exclude_gravity: false,
            rate_hz: None,
            uptime_seconds: 0,
            samples_delivered: 0,
            data_rate: 0,
            last_acceleration: None,
            motion_sign: None,
            distance: None,
            error_percentages: None,
            last_error: None,
            error_count: 0,
        }
    }

    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
