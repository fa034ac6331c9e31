use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Standard gravity used by every estimator (m/s²).
pub const GRAVITY: f64 = 9.81;

/// Clean acceleration sample. `timestamp` is milliseconds on the session's monotonic clock.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: u64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Sample {
    pub fn new(timestamp: u64, x: f64, y: f64, z: f64) -> Self {
        Self { timestamp, x, y, z }
    }
}

/// One acceleration channel as reported by the device. Any axis may be missing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisReading {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl AxisReading {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    }

    /// All three axes, or `None` if any is missing.
    pub fn complete(&self) -> Option<(f64, f64, f64)> {
        Some((self.x?, self.y?, self.z?))
    }
}

/// Raw motion event carrying both channels the platform may expose.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMotionEvent {
    #[serde(default)]
    pub acceleration: Option<AxisReading>,
    #[serde(default)]
    pub acceleration_including_gravity: Option<AxisReading>,
}

impl RawMotionEvent {
    pub fn new(acceleration: AxisReading, including_gravity: AxisReading) -> Self {
        Self {
            acceleration: Some(acceleration),
            acceleration_including_gravity: Some(including_gravity),
        }
    }

    /// Pass-through channel selection; no gravity correction is computed here.
    pub fn channel(&self, exclude_gravity: bool) -> Option<&AxisReading> {
        if exclude_gravity {
            self.acceleration.as_ref()
        } else {
            self.acceleration_including_gravity.as_ref()
        }
    }
}

/// Chronological `timestamp → acceleration` map. A repeated timestamp overwrites.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AccelerationSeries {
    values: BTreeMap<u64, f64>,
}

impl AccelerationSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, timestamp: u64, value: f64) {
        self.values.insert(timestamp, value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.values.iter().map(|(ts, v)| (*ts, *v))
    }

    pub fn first_timestamp(&self) -> Option<u64> {
        self.values.keys().next().copied()
    }

    pub fn last_timestamp(&self) -> Option<u64> {
        self.values.keys().next_back().copied()
    }

    /// Latest timestamp whose value satisfies `predicate`.
    pub fn last_timestamp_where<F>(&self, mut predicate: F) -> Option<u64>
    where
        F: FnMut(f64) -> bool,
    {
        self.values
            .iter()
            .rev()
            .find(|(_, v)| predicate(**v))
            .map(|(ts, _)| *ts)
    }

    /// Keep only entries strictly before `cutoff`.
    pub fn truncate_from(&mut self, cutoff: u64) {
        let _ = self.values.split_off(&cutoff);
    }

    /// Keep only entries at or after `cutoff`.
    pub fn drop_before(&mut self, cutoff: u64) {
        self.values = self.values.split_off(&cutoff);
    }

    pub fn min_max(&self) -> Option<(f64, f64)> {
        self.values.values().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    /// Span between first and last entry in ms, zero with fewer than two entries.
    pub fn span_ms(&self) -> u64 {
        match (self.first_timestamp(), self.last_timestamp()) {
            (Some(first), Some(last)) => last - first,
            _ => 0,
        }
    }
}

impl FromIterator<(u64, f64)> for AccelerationSeries {
    fn from_iter<I: IntoIterator<Item = (u64, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
