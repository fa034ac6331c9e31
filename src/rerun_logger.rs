use crate::analysis::{DistanceEstimate, MotionSign};
use crate::types::Sample;
use anyhow::Result;
use rerun::{archetypes::Scalar, RecordingStreamBuilder};

/// Rerun recording of the acceleration stream and analysis outputs.
/// Supports Rerun v0.15+ API with archetype-based logging
pub struct RerunLogger {
    rec: rerun::RecordingStream,
}

impl RerunLogger {
    /// Initialize Rerun recording to file (e.g. "sessions/throw_20251122_120000.rrd")
    pub fn new(output_path: &str) -> Result<Self> {
        let rec = RecordingStreamBuilder::new("motion_lab")
            .save(output_path)
            .map_err(|e| anyhow::anyhow!("Failed to create Rerun recording: {}", e))?;

        log::info!("[RERUN] Recording initialized to: {}", output_path);

        Ok(RerunLogger { rec })
    }

    /// Session time in ms; all subsequent logs are stamped with it.
    pub fn set_time_ms(&self, now_ms: u64) {
        self.rec.set_time_seconds("session_time", now_ms as f64 / 1000.0);
    }

    pub fn log_scalar(&self, path: &str, value: f64) {
        let _ = self.rec.log(path, &Scalar::new(value));
    }

    pub fn log_sample(&self, sample: &Sample) {
        self.set_time_ms(sample.timestamp);
        self.log_scalar("accel/x", sample.x);
        self.log_scalar("accel/y", sample.y);
        self.log_scalar("accel/z", sample.z);
    }

    pub fn log_motion_sign(&self, now_ms: u64, sign: MotionSign) {
        self.set_time_ms(now_ms);
        self.log_scalar("analysis/motion_sign", sign.as_i8() as f64);
    }

    pub fn log_distance(&self, now_ms: u64, estimate: &DistanceEstimate) {
        self.set_time_ms(now_ms);
        self.log_scalar("analysis/distance/time_based", estimate.time_based_height);
        self.log_scalar("analysis/distance/acceleration_based", estimate.acceleration_based_height);
        self.log_scalar("analysis/distance/average", estimate.average_height);
    }
}
