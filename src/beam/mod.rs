use crate::doa::{DoaEstimate, SteeringTable};
use crate::error::{Error, Result};
use crate::fft::{SpectralFrame, SpectralTransform, WindowKind};
use num_complex::Complex32;
use num_traits::Zero;
use std::f32::consts::PI;

/// How a beamformed frame was produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BeamMode {
    /// Delay-and-sum toward `angle_deg`, using an estimate `staleness` blocks old.
    Steered { angle_deg: f32, staleness: u64 },
    /// Plain channel average. `staleness` is `None` when no estimate existed yet.
    Passthrough { staleness: Option<u64> },
}

impl BeamMode {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, BeamMode::Passthrough { .. })
    }
}

/// Single-channel time-domain output for one block.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamformedFrame {
    pub index: u64,
    pub samples: Vec<f32>,
    pub mode: BeamMode,
}

/// Frequency-domain delay-and-sum beamformer.
///
/// Works on frames from its own rectangular-window transform, so the inverse
/// transform hands back the aligned channel average without window shaping.
pub struct Beamformer {
    transform: SpectralTransform,
    staleness_bound: u64,
    sum: Vec<Complex32>,
}

impl Beamformer {
    pub fn new(block_size: usize, sample_rate: u32, staleness_bound: u64) -> Result<Self> {
        Ok(Self {
            transform: SpectralTransform::new(block_size, sample_rate, WindowKind::Rectangular)?,
            staleness_bound,
            sum: Vec::new(),
        })
    }

    /// Transform producing the frames [`beamform`](Self::beamform) expects.
    pub fn transform(&self) -> &SpectralTransform {
        &self.transform
    }

    pub fn staleness_bound(&self) -> u64 {
        self.staleness_bound
    }

    pub fn beamform(
        &mut self,
        frame: &SpectralFrame,
        estimate: Option<&DoaEstimate>,
        table: &SteeringTable,
    ) -> Result<BeamformedFrame> {
        if frame.block_size() != self.transform.block_size() {
            return Err(Error::InvalidBlockSize {
                expected_channels: frame.channels(),
                expected_samples: self.transform.block_size(),
                channels: frame.channels(),
                samples: frame.block_size(),
            });
        }
        if table.mic_count() != frame.channels() {
            return Err(Error::GeometryMismatch {
                table: table.mic_count(),
                frame: frame.channels(),
            });
        }

        let staleness = estimate.map(|e| frame.index().saturating_sub(e.index));
        let mode = match (estimate, staleness) {
            (Some(e), Some(s)) if s <= self.staleness_bound => BeamMode::Steered {
                angle_deg: e.angle_deg,
                staleness: s,
            },
            _ => BeamMode::Passthrough { staleness },
        };

        match mode {
            BeamMode::Steered { angle_deg, .. } => {
                let delays = table.delays(table.index_of(angle_deg));
                self.accumulate(frame, Some(delays));
            }
            BeamMode::Passthrough { staleness } => {
                if let Some(s) = staleness {
                    log::debug!(
                        "block {}: estimate {} blocks old, passing through",
                        frame.index(),
                        s
                    );
                }
                self.accumulate(frame, None);
            }
        }

        Ok(BeamformedFrame {
            index: frame.index(),
            samples: self.transform.synthesize(&self.sum)?,
            mode,
        })
    }

    /// Aligned, averaged spectrum behind the most recent output.
    pub fn spectrum(&self) -> &[Complex32] {
        &self.sum
    }

    /// Aligns every channel to the common arrival and averages.
    ///
    /// Channel `p` is shifted by `mean(τ) - τ_p` as the phase rotation
    /// `exp(-j 2π f (mean(τ) - τ_p))`, so a delay shared by all channels is a no-op.
    pub fn align(&mut self, frame: &SpectralFrame, delays: &[f32]) -> &[Complex32] {
        self.accumulate(frame, Some(delays));
        &self.sum
    }

    /// Gain-normalised sum; `None` skips steering entirely.
    fn accumulate(&mut self, frame: &SpectralFrame, delays: Option<&[f32]>) {
        let channels = frame.channels();
        let gain = 1.0 / channels.max(1) as f32;

        self.sum.clear();
        self.sum.resize(frame.bin_count(), Complex32::zero());

        let mean = delays.map_or(0.0, |d| d.iter().sum::<f32>() / d.len().max(1) as f32);
        for c in 0..channels {
            let x = frame.channel(c);
            let shift = delays.and_then(|d| d.get(c)).map_or(0.0, |&tau| mean - tau);
            if shift == 0.0 {
                for (acc, v) in self.sum.iter_mut().zip(x) {
                    *acc += v;
                }
                continue;
            }
            for (k, (acc, v)) in self.sum.iter_mut().zip(x).enumerate() {
                let phase = -2.0 * PI * frame.frequency(k) * shift;
                *acc += v * Complex32::from_polar(1.0, phase);
            }
        }

        for acc in &mut self.sum {
            *acc *= gain;
        }
    }
}
