use super::smoothing::shortest_arc;
use super::srp_phat::{Confidence, DoaEstimate};

const DEFAULT_MIN_POWER: f32 = 0.4;
const DEFAULT_TOLERANCE_DEG: f32 = 2.0;

/// Outcome of a calibration run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationReport {
    pub samples: usize,
    /// Median of `estimate - true`, wrapped to `[-180, 180)`.
    pub median_error_deg: f32,
    /// Standard deviation of the wrapped errors.
    pub spread_deg: f32,
    /// Amount to add to the running offset; zero when already within tolerance.
    pub correction_deg: f32,
}

/// Collects estimates for a source held at a known angle.
#[derive(Debug, Clone)]
pub struct Calibration {
    true_angle_deg: f32,
    min_power: f32,
    tolerance_deg: f32,
    errors: Vec<f32>,
}

impl Calibration {
    pub fn new(true_angle_deg: f32) -> Self {
        Self {
            true_angle_deg,
            min_power: DEFAULT_MIN_POWER,
            tolerance_deg: DEFAULT_TOLERANCE_DEG,
            errors: Vec::new(),
        }
    }

    pub fn with_min_power(mut self, min_power: f32) -> Self {
        self.min_power = min_power;
        self
    }

    pub fn with_tolerance(mut self, tolerance_deg: f32) -> Self {
        self.tolerance_deg = tolerance_deg;
        self
    }

    /// Accepts tracked estimates above the power threshold; returns whether it was kept.
    pub fn record(&mut self, estimate: &DoaEstimate) -> bool {
        if estimate.confidence != Confidence::Tracked || estimate.power < self.min_power {
            return false;
        }
        self.errors
            .push(shortest_arc(self.true_angle_deg, estimate.angle_deg));
        true
    }

    pub fn samples(&self) -> usize {
        self.errors.len()
    }

    /// `None` until at least one estimate was accepted.
    pub fn finish(&self) -> Option<CalibrationReport> {
        if self.errors.is_empty() {
            return None;
        }

        let mut sorted = self.errors.clone();
        sorted.sort_by(f32::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        let mean = sorted.iter().sum::<f32>() / sorted.len() as f32;
        let var = sorted.iter().map(|e| (e - mean).powi(2)).sum::<f32>() / sorted.len() as f32;

        let correction = if median.abs() > self.tolerance_deg {
            -median
        } else {
            0.0
        };

        Some(CalibrationReport {
            samples: sorted.len(),
            median_error_deg: median,
            spread_deg: var.sqrt(),
            correction_deg: correction,
        })
    }
}
