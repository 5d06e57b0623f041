use super::{find_dft, DFTBase};
use crate::audio::AudioBlock;
use crate::error::{Error, Result};
use num_complex::Complex32;
use num_traits::Zero;
use std::f32::consts::PI;
use std::sync::Arc;

/// Analysis window applied to each channel before the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Hann,
    /// No shaping; the inverse transform returns the block unchanged.
    Rectangular,
}

impl WindowKind {
    fn coefficients(self, n: usize) -> Vec<f32> {
        match self {
            WindowKind::Hann => (0..n)
                .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (n - 1) as f32).cos()))
                .collect(),
            WindowKind::Rectangular => vec![1.0; n],
        }
    }
}

/// Per-channel positive-frequency bins of one block.
#[derive(Debug, Clone)]
pub struct SpectralFrame {
    index: u64,
    sample_rate: u32,
    block_size: usize,
    rms: f32,
    bins: Vec<Vec<Complex32>>,
}

impl SpectralFrame {
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// RMS of the time-domain block, before windowing.
    pub fn rms(&self) -> f32 {
        self.rms
    }

    pub fn channels(&self) -> usize {
        self.bins.len()
    }

    /// `block_size / 2 + 1`.
    pub fn bin_count(&self) -> usize {
        self.block_size / 2 + 1
    }

    /// Frequency resolution in Hz.
    pub fn bin_hz(&self) -> f32 {
        self.sample_rate as f32 / self.block_size as f32
    }

    pub fn frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.bin_hz()
    }

    pub fn channel(&self, c: usize) -> &[Complex32] {
        &self.bins[c]
    }
}

/// Windowed real-input DFT at a fixed block size.
///
/// Channels are transformed two at a time: one real channel goes into the
/// real part and the next into the imaginary part of a single complex DFT,
/// and Hermitian symmetry separates them again.
pub struct SpectralTransform {
    block_size: usize,
    sample_rate: u32,
    kind: WindowKind,
    window: Vec<f32>,
    plan: Arc<dyn DFTBase>,
    remove_mean: bool,
}

impl SpectralTransform {
    pub fn new(block_size: usize, sample_rate: u32, kind: WindowKind) -> Result<Self> {
        if block_size < 4 || block_size % 2 != 0 {
            return Err(Error::Configuration(format!(
                "transform block size must be even and at least 4, got {block_size}"
            )));
        }
        if sample_rate == 0 {
            return Err(Error::Configuration("sample rate must be positive".into()));
        }

        Ok(Self {
            block_size,
            sample_rate,
            kind,
            window: kind.coefficients(block_size),
            plan: find_dft(block_size),
            remove_mean: false,
        })
    }

    /// Subtracts each channel's mean before windowing; the frame RMS is then the AC level.
    pub fn with_mean_removal(mut self) -> Self {
        self.remove_mean = true;
        self
    }

    pub fn removes_mean(&self) -> bool {
        self.remove_mean
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn window_kind(&self) -> WindowKind {
        self.kind
    }

    pub fn bin_count(&self) -> usize {
        self.block_size / 2 + 1
    }

    pub fn transform(&self, block: &AudioBlock) -> Result<SpectralFrame> {
        if block.samples() != self.block_size || block.channel_count() == 0 {
            return Err(Error::InvalidBlockSize {
                expected_channels: block.channel_count().max(1),
                expected_samples: self.block_size,
                channels: block.channel_count(),
                samples: block.samples(),
            });
        }

        let n = self.block_size;
        let half = self.bin_count();
        let mut packed = vec![Complex32::zero(); n];
        let mut bins = Vec::with_capacity(block.channel_count());
        let means = if self.remove_mean {
            block.channel_means()
        } else {
            vec![0.0; block.channel_count()]
        };

        for (pair, mean) in block.channels().chunks(2).zip(means.chunks(2)) {
            //
            // Pack up to two windowed real channels into one complex buffer.
            //
            let second = pair.get(1).zip(mean.get(1));
            for (i, slot) in packed.iter_mut().enumerate() {
                let w = self.window[i];
                let im = second.map_or(0.0, |(c, m)| (c[i] - m) * w);
                *slot = Complex32::new((pair[0][i] - mean[0]) * w, im);
            }

            self.plan.forward(&mut packed);

            //
            // X[k] = (Z[k] + conj(Z[N-k])) / 2,  Y[k] = (Z[k] - conj(Z[N-k])) / 2i
            //
            let mut a = Vec::with_capacity(half);
            let mut b = Vec::with_capacity(half);
            for k in 0..half {
                let z = packed[k];
                let zr = packed[(n - k) % n].conj();
                a.push((z + zr) * 0.5);
                b.push((z - zr) * Complex32::new(0.0, -0.5));
            }

            bins.push(a);
            if second.is_some() {
                bins.push(b);
            }
        }

        Ok(SpectralFrame {
            index: block.index(),
            sample_rate: block.sample_rate(),
            block_size: n,
            rms: if self.remove_mean {
                block.ac_rms()
            } else {
                block.rms()
            },
            bins,
        })
    }

    /// Inverse of [`transform`](Self::transform) for one channel of bins.
    ///
    /// The imaginary parts of the DC and Nyquist bins are discarded so the
    /// reconstructed spectrum stays Hermitian.
    pub fn synthesize(&self, bins: &[Complex32]) -> Result<Vec<f32>> {
        let n = self.block_size;
        let half = self.bin_count();
        if bins.len() != half {
            return Err(Error::InvalidBlockSize {
                expected_channels: 1,
                expected_samples: half,
                channels: 1,
                samples: bins.len(),
            });
        }

        let mut full = vec![Complex32::zero(); n];
        full[0] = Complex32::new(bins[0].re, 0.0);
        full[n / 2] = Complex32::new(bins[n / 2].re, 0.0);
        for k in 1..n / 2 {
            full[k] = bins[k];
            full[n - k] = bins[k].conj();
        }

        self.plan.inverse(&mut full);

        let scale = 1.0 / n as f32;
        Ok(full.iter().map(|c| c.re * scale).collect())
    }
}
