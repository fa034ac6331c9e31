//! Fall-distance numerics: tail trimming, time and acceleration based heights,
//! and calibration against a measured reference height.

use crate::types::AccelerationSeries;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistanceEstimate {
    pub time_based_height: f64,
    pub acceleration_based_height: f64,
    pub average_height: f64,
}

impl DistanceEstimate {
    pub fn new(time_based_height: f64, acceleration_based_height: f64) -> Self {
        Self {
            time_based_height,
            acceleration_based_height,
            average_height: (time_based_height + acceleration_based_height) / 2.0,
        }
    }

    /// Percentage error of each estimate against a measured height.
    /// `None` unless `real_height` is a positive finite number.
    pub fn calibrate(&self, real_height: f64) -> Option<ErrorPercentages> {
        if !real_height.is_finite() || real_height <= 0.0 {
            return None;
        }
        Some(ErrorPercentages {
            time_based: percentage_error(self.time_based_height, real_height),
            acceleration_based: percentage_error(self.acceleration_based_height, real_height),
            average: percentage_error(self.average_height, real_height),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorPercentages {
    pub time_based: f64,
    pub acceleration_based: f64,
    pub average: f64,
}

/// Everything computed at the end of a recording.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistanceReport {
    pub estimate: DistanceEstimate,
    /// Samples left after trimming.
    pub sample_count: usize,
    /// Span of the trimmed series.
    pub duration_ms: u64,
}

/// Drop the low-value tail: everything at or after the last sample above `threshold`.
/// With no sample above it, nothing survives.
pub fn trim_trailing_tail(series: &mut AccelerationSeries, threshold: f64) {
    match series.last_timestamp_where(|v| v > threshold) {
        Some(cutoff) => series.truncate_from(cutoff),
        None => series.clear(),
    }
}

/// `½·g·t²` with `t` half the recorded span (symmetric up/down flight).
pub fn time_based_height(series: &AccelerationSeries, gravity: f64) -> f64 {
    let apex_s = series.span_ms() as f64 / 2.0 / 1000.0;
    0.5 * gravity * apex_s * apex_s
}

/// Segment-sum double integration over the series, halved.
///
/// A running sum of accelerations is kept; each step contributes
/// `½·sum·Δt²` only while the sum is positive.
pub fn acceleration_based_height(series: &AccelerationSeries) -> f64 {
    let mut running = 0.0;
    let mut height = 0.0;
    let mut previous = series.first_timestamp().unwrap_or(0);

    for (timestamp, acceleration) in series.iter() {
        running += acceleration;
        if running > 0.0 {
            let dt = (timestamp - previous) as f64 / 1000.0;
            height += 0.5 * running * dt * dt;
        }
        previous = timestamp;
    }
    height / 2.0
}

/// Trim `series` and compute the three estimates.
pub fn process(series: &mut AccelerationSeries, gravity: f64, threshold: f64) -> DistanceReport {
    trim_trailing_tail(series, threshold);
    let estimate = DistanceEstimate::new(
        time_based_height(series, gravity),
        acceleration_based_height(series),
    );
    DistanceReport {
        estimate,
        sample_count: series.len(),
        duration_ms: series.span_ms(),
    }
}

/// `|estimate − real| / real × 100`, rounded to two decimals.
pub fn percentage_error(estimate: f64, real: f64) -> f64 {
    ((estimate - real).abs() / real * 100.0 * 100.0).round() / 100.0
}

/// Parse user calibration input. Anything but a positive finite number is `None`.
pub fn parse_reference_height(input: &str) -> Option<f64> {
    let value: f64 = input.trim().replace(',', ".").parse().ok()?;
    (value.is_finite() && value > 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn series(points: &[(u64, f64)]) -> AccelerationSeries {
        points.iter().copied().collect()
    }

    #[test]
    fn test_time_based_height() {
        let s = series(&[(0, 12.0), (100, -3.0), (200, 0.0)]);
        assert_eq!(s.span_ms(), 200);
        assert_relative_eq!(time_based_height(&s, 9.81), 0.5 * 9.81 * 0.01, epsilon = 1e-12);
        assert_relative_eq!(time_based_height(&s, 9.81), 0.049, epsilon = 1e-3);
    }

    #[test]
    fn test_acceleration_height_only_positive_running_sum() {
        // Running sums 12, 9, 0: only the 9 step contributes.
        let s = series(&[(0, 12.0), (100, -3.0), (200, -9.0)]);
        assert_relative_eq!(acceleration_based_height(&s), 0.5 * 9.0 * 0.01 / 2.0, epsilon = 1e-12);

        let s = series(&[(0, 12.0), (100, -3.0), (200, 0.0)]);
        assert_relative_eq!(acceleration_based_height(&s), 0.045, epsilon = 1e-12);
    }

    #[test]
    fn test_negative_sum_not_subtracted() {
        let s = series(&[(0, -5.0), (100, 2.0), (200, 10.0)]);
        // Sums -5, -3, 7: only the last step counts.
        assert_relative_eq!(acceleration_based_height(&s), 0.5 * 7.0 * 0.01 / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_trim_drops_last_big_and_tail() {
        let mut s = series(&[(0, 15.0), (100, 0.2), (200, 16.0), (300, 0.1), (400, 0.0)]);
        trim_trailing_tail(&mut s, 13.81);
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![(0, 15.0), (100, 0.2)]);
    }

    #[test]
    fn test_degenerate_series_is_zero() {
        let mut s = series(&[(0, 15.0), (50, 1.0)]);
        let report = process(&mut s, 9.81, 13.81);
        assert_eq!(report.sample_count, 0);
        assert_eq!(report.estimate.time_based_height, 0.0);
        assert_eq!(report.estimate.acceleration_based_height, 0.0);
        assert_eq!(report.estimate.average_height, 0.0);
    }

    #[test]
    fn test_average_and_calibration() {
        let estimate = DistanceEstimate::new(1.2, 0.8);
        assert_relative_eq!(estimate.average_height, 1.0);
        let errors = estimate.calibrate(1.5).unwrap();
        assert_eq!(errors.time_based, 20.0);
        assert_eq!(errors.acceleration_based, 46.67);
        assert_eq!(errors.average, 33.33);
        assert!(estimate.calibrate(0.0).is_none());
        assert!(estimate.calibrate(f64::NAN).is_none());
    }

    #[test]
    fn test_parse_reference_height() {
        assert_eq!(parse_reference_height(" 1.5 "), Some(1.5));
        assert_eq!(parse_reference_height("2,25"), Some(2.25));
        assert_eq!(parse_reference_height("-1"), None);
        assert_eq!(parse_reference_height("0"), None);
        assert_eq!(parse_reference_height("abc"), None);
        assert_eq!(parse_reference_height("inf"), None);
        assert_eq!(parse_reference_height(""), None);
    }
}
