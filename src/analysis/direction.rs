use crate::types::Sample;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionSign {
    Up,
    Down,
    #[default]
    Neutral,
}

impl MotionSign {
    pub fn arrow(&self) -> &'static str {
        match self {
            MotionSign::Up => "⬆",
            MotionSign::Down => "⬇",
            MotionSign::Neutral => "-",
        }
    }

    /// -1, 0 or 1.
    pub fn as_i8(&self) -> i8 {
        match self {
            MotionSign::Up => 1,
            MotionSign::Down => -1,
            MotionSign::Neutral => 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DirectionConfig {
    /// `|z|` above this leaves neutral.
    pub threshold: f64,
    /// Minimum time between two entries into a non-neutral sign.
    pub guard_ms: u64,
}

impl Default for DirectionConfig {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            guard_ms: 300,
        }
    }
}

/// Three-valued vertical motion sign with a shared entry guard.
///
/// Returning to neutral is immediate; entering up or down needs the guard to
/// have elapsed since the previous entry, whichever direction that was.
#[derive(Debug, Default)]
pub struct VerticalDirectionClassifier {
    config: DirectionConfig,
    sign: MotionSign,
    last_entry: Option<u64>,
}

impl VerticalDirectionClassifier {
    pub fn new(config: DirectionConfig) -> Self {
        Self {
            config,
            sign: MotionSign::Neutral,
            last_entry: None,
        }
    }

    pub fn sign(&self) -> MotionSign {
        self.sign
    }

    pub fn last_entry(&self) -> Option<u64> {
        self.last_entry
    }

    /// Classify one sample and return the (possibly unchanged) sign.
    pub fn update(&mut self, sample: &Sample) -> MotionSign {
        let z = sample.z;
        let candidate = if z > self.config.threshold {
            MotionSign::Up
        } else if z < -self.config.threshold {
            MotionSign::Down
        } else {
            self.sign = MotionSign::Neutral;
            return self.sign;
        };

        let guard_elapsed = self
            .last_entry
            .map(|at| sample.timestamp.saturating_sub(at) >= self.config.guard_ms)
            .unwrap_or(true);
        if self.sign == MotionSign::Neutral && guard_elapsed {
            self.sign = candidate;
            self.last_entry = Some(sample.timestamp);
        }
        self.sign
    }

    pub fn reset(&mut self) {
        self.sign = MotionSign::Neutral;
        self.last_entry = None;
    }
}
