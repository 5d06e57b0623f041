use super::smoothing::{circular_distance, wrap_deg, AngleSmoother};
use super::steering::SteeringTable;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::fft::SpectralFrame;
use num_complex::Complex32;
use std::f32::consts::PI;
use std::ops::Range;

// Normalised powers this close count as a tie.
const TIE_EPSILON: f32 = 1e-6;

/// How much an emitted estimate can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// Fresh search result folded into the smoothed angle.
    Tracked,
    /// Search ran but the peak was too weak; previous angle kept.
    Held,
    /// Block below the silence threshold; previous estimate re-emitted.
    Silent,
}

impl Confidence {
    pub fn is_low(self) -> bool {
        !matches!(self, Confidence::Tracked)
    }
}

/// One direction estimate per processed block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoaEstimate {
    /// Smoothed, calibrated angle in `[0, 360)`.
    pub angle_deg: f32,
    /// Normalised steered response power at the peak, in `[-1, 1]`.
    pub power: f32,
    pub confidence: Confidence,
    pub index: u64,
    pub timestamp_secs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    pub freq_min_hz: f32,
    pub freq_max_hz: f32,
    pub smoothing: f32,
    pub max_step_deg: f32,
    pub silence_threshold: f32,
    pub min_confidence: f32,
    pub phat_floor: f32,
    pub calibration_offset_deg: f32,
}

impl From<&PipelineConfig> for EstimatorConfig {
    fn from(c: &PipelineConfig) -> Self {
        Self {
            freq_min_hz: c.freq_min_hz,
            freq_max_hz: c.freq_max_hz,
            smoothing: c.smoothing,
            max_step_deg: c.max_step_deg,
            silence_threshold: c.silence_threshold,
            min_confidence: c.min_confidence,
            phat_floor: c.phat_floor,
            calibration_offset_deg: c.calibration_offset_deg,
        }
    }
}

/// SRP-PHAT direction search with temporal smoothing.
pub struct DirectionEstimator {
    config: EstimatorConfig,
    smoother: AngleSmoother,
    last_power: f32,
    // Scratch reused across blocks.
    whitened: Vec<Vec<Complex32>>,
    powers: Vec<f32>,
}

impl DirectionEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            smoother: AngleSmoother::new(config.smoothing, config.max_step_deg),
            config,
            last_power: 0.0,
            whitened: Vec::new(),
            powers: Vec::new(),
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Smoothed angle before calibration.
    pub fn smoothed_angle(&self) -> f32 {
        self.smoother.angle()
    }

    pub fn calibration_offset(&self) -> f32 {
        self.config.calibration_offset_deg
    }

    /// Adds `correction_deg` to the calibration offset.
    pub fn apply_calibration(&mut self, correction_deg: f32) {
        let offset = self.config.calibration_offset_deg + correction_deg;
        self.config.calibration_offset_deg = wrap_deg(offset + 180.0) - 180.0;
        log::info!(
            "DOA calibration offset now {:.1} deg",
            self.config.calibration_offset_deg
        );
    }

    /// Powers from the most recent search, one per candidate angle.
    pub fn steered_response(&self) -> &[f32] {
        &self.powers
    }

    /// Bins inside the configured band for this frame's resolution.
    fn band(&self, frame: &SpectralFrame) -> Range<usize> {
        let bin_hz = frame.bin_hz();
        let lo = (self.config.freq_min_hz / bin_hz).ceil() as usize;
        let hi = ((self.config.freq_max_hz / bin_hz).floor() as usize + 1).min(frame.bin_count());
        lo.max(1).min(hi)..hi
    }

    pub fn estimate(
        &mut self,
        frame: &SpectralFrame,
        table: &SteeringTable,
    ) -> Result<DoaEstimate> {
        if table.angle_count() == 0 {
            return Err(Error::NotReady("steering table"));
        }
        if table.mic_count() != frame.channels() {
            return Err(Error::GeometryMismatch {
                table: table.mic_count(),
                frame: frame.channels(),
            });
        }

        let timestamp_secs = frame.index() as f64 * frame.block_size() as f64
            / frame.sample_rate() as f64;

        //
        // Silent frames keep the previous estimate untouched.
        //
        if frame.rms() < self.config.silence_threshold || !frame.rms().is_finite() {
            log::trace!("block {} silent (rms {:.2e})", frame.index(), frame.rms());
            return Ok(self.emit(
                self.last_power,
                Confidence::Silent,
                frame.index(),
                timestamp_secs,
            ));
        }

        let band = self.band(frame);
        if band.is_empty() {
            return Err(Error::Configuration(format!(
                "no bins between {} and {} Hz",
                self.config.freq_min_hz, self.config.freq_max_hz
            )));
        }

        let pairs = pairs(frame.channels());
        self.whiten(frame, &pairs, band.clone());
        self.search(frame, table, &pairs, band);

        let previous = self.smoother.angle();
        let (best, power) = pick_peak(&self.powers, |i| {
            circular_distance(table.angle_deg(i), previous)
        });

        if not_confident(power, self.config.min_confidence) {
            log::trace!("block {} held (peak power {:.3})", frame.index(), power);
            self.last_power = finite_or_zero(power);
            return Ok(self.emit(self.last_power, Confidence::Held, frame.index(), timestamp_secs));
        }

        self.smoother.update(table.angle_deg(best));
        self.last_power = power;
        Ok(self.emit(power, Confidence::Tracked, frame.index(), timestamp_secs))
    }

    fn emit(
        &self,
        power: f32,
        confidence: Confidence,
        index: u64,
        timestamp_secs: f64,
    ) -> DoaEstimate {
        DoaEstimate {
            angle_deg: wrap_deg(self.smoother.angle() + self.config.calibration_offset_deg),
            power,
            confidence,
            index,
            timestamp_secs,
        }
    }

    /// PHAT-whitened cross-spectra `X_i conj(X_j) / |X_i conj(X_j)|` over the band.
    fn whiten(&mut self, frame: &SpectralFrame, pairs: &[(usize, usize)], band: Range<usize>) {
        let floor = self.config.phat_floor;
        self.whitened.resize_with(pairs.len(), Vec::new);

        for (out, &(i, j)) in self.whitened.iter_mut().zip(pairs) {
            let xi = &frame.channel(i)[band.clone()];
            let xj = &frame.channel(j)[band.clone()];
            out.clear();
            out.extend(xi.iter().zip(xj).map(|(a, b)| {
                let cross = a * b.conj();
                cross / cross.norm().max(floor)
            }));
        }
    }

    /// Steered response power for every candidate angle.
    ///
    /// Evaluating the whitened cross-spectrum against `exp(j 2π f Δτ)` is the
    /// generalised cross-correlation at the exact fractional lag Δτ.
    fn search(
        &mut self,
        frame: &SpectralFrame,
        table: &SteeringTable,
        pairs: &[(usize, usize)],
        band: Range<usize>,
    ) {
        let norm = 1.0 / (pairs.len() * band.len()) as f32;
        let omega: Vec<f32> = band.clone().map(|k| 2.0 * PI * frame.frequency(k)).collect();

        self.powers.clear();
        for a in 0..table.angle_count() {
            let mut total = 0.0f32;
            for (g, &(i, j)) in self.whitened.iter().zip(pairs) {
                let dt = table.pair_delay(a, i, j);
                total += g
                    .iter()
                    .zip(&omega)
                    .map(|(c, &w)| {
                        let (s, co) = (w * dt).sin_cos();
                        c.re * co - c.im * s
                    })
                    .sum::<f32>();
            }
            self.powers.push(total * norm);
        }
    }
}

fn pairs(n: usize) -> Vec<(usize, usize)> {
    (0..n).flat_map(|i| (i + 1..n).map(move |j| (i, j))).collect()
}

fn finite_or_zero(x: f32) -> f32 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

fn not_confident(power: f32, min_confidence: f32) -> bool {
    !(power.is_finite() && power >= min_confidence)
}

/// Argmax; powers within `TIE_EPSILON` of the maximum go to the candidate
/// closest to the previous angle.
fn pick_peak(powers: &[f32], distance_to_previous: impl Fn(usize) -> f32) -> (usize, f32) {
    let max = powers
        .iter()
        .copied()
        .filter(|p| p.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return (0, max);
    }

    let mut best = None;
    for (i, &p) in powers.iter().enumerate() {
        if !(p.is_finite() && p >= max - TIE_EPSILON) {
            continue;
        }
        match best {
            Some((b, _)) if distance_to_previous(i) >= distance_to_previous(b) => {}
            _ => best = Some((i, p)),
        }
    }
    best.unwrap_or((0, max))
}
