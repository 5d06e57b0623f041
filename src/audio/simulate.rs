use super::AudioBlock;
use crate::geometry::ArrayGeometry;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

const DEFAULT_TONES: usize = 48;

/// Synthetic far-field broadband source seen by an array.
///
/// The source is a sum of in-band sinusoids with random phases, so every
/// microphone receives it with an exact fractional delay. Sensor noise is
/// uncorrelated between microphones.
pub struct SourceSimulator {
    geometry: ArrayGeometry,
    sample_rate: u32,
    block_size: usize,
    angle_deg: f32,
    level: f32,
    snr_db: Option<f32>,
    tones: Vec<(f64, f64)>,
    rng: SmallRng,
    next_index: u64,
}

impl SourceSimulator {
    pub fn new(geometry: ArrayGeometry, sample_rate: u32, block_size: usize, seed: u64) -> Self {
        let mut sim = Self {
            geometry,
            sample_rate,
            block_size,
            angle_deg: 0.0,
            level: 0.1,
            snr_db: None,
            tones: Vec::new(),
            rng: SmallRng::seed_from_u64(seed),
            next_index: 0,
        };
        sim.set_band(300.0, 3000.0, DEFAULT_TONES);
        sim
    }

    /// Re-draws the source as `count` sinusoids spread over `min_hz..max_hz`.
    pub fn set_band(&mut self, min_hz: f32, max_hz: f32, count: usize) {
        let count = count.max(1);
        let step = (max_hz - min_hz) as f64 / count as f64;
        self.tones = (0..count)
            .map(|k| {
                let freq = min_hz as f64 + (k as f64 + 0.5) * step;
                (freq, self.rng.gen_range(0.0..2.0 * PI))
            })
            .collect();
    }

    pub fn set_angle(&mut self, angle_deg: f32) {
        self.angle_deg = angle_deg.rem_euclid(360.0);
    }

    pub fn angle(&self) -> f32 {
        self.angle_deg
    }

    /// Source RMS at every microphone.
    pub fn set_level(&mut self, level: f32) {
        self.level = level;
    }

    /// Sensor noise relative to the source; `None` disables noise.
    pub fn set_snr_db(&mut self, snr_db: Option<f32>) {
        self.snr_db = snr_db;
    }

    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Advances time by `blocks` without producing them, as a capture drop would.
    pub fn skip(&mut self, blocks: u64) {
        self.next_index += blocks;
    }

    pub fn next_block(&mut self) -> AudioBlock {
        let index = self.next_index;
        self.next_index += 1;

        let sr = self.sample_rate as f64;
        let angle = (self.angle_deg as f64).to_radians();
        let (dx, dy) = (angle.cos(), angle.sin());
        let c = self.geometry.sound_speed() as f64;
        let amplitude = self.level as f64 * (2.0 / self.tones.len() as f64).sqrt();
        let noise = self
            .snr_db
            .map(|snr| 3f64.sqrt() * self.level as f64 / 10f64.powf(snr as f64 / 20.0));
        let start = index * self.block_size as u64;

        let mut channels = Vec::with_capacity(self.geometry.len());
        for &[px, py] in self.geometry.positions() {
            //
            // Plane wave: a microphone further along the arrival direction hears it earlier.
            //
            let tau = -(px as f64 * dx + py as f64 * dy) / c;
            let mut samples = Vec::with_capacity(self.block_size);
            for n in 0..self.block_size {
                let t = (start + n as u64) as f64 / sr - tau;
                let mut x: f64 = self
                    .tones
                    .iter()
                    .map(|&(f, phase)| (2.0 * PI * f * t + phase).cos())
                    .sum::<f64>()
                    * amplitude;
                if let Some(u) = noise.filter(|&u| u > 0.0) {
                    x += self.rng.gen_range(-u..u);
                }
                samples.push(x as f32);
            }
            channels.push(samples);
        }

        AudioBlock::from_channels(index, self.sample_rate, channels)
    }

    /// A block of digital silence at the next index.
    pub fn silent_block(&mut self) -> AudioBlock {
        let index = self.next_index;
        self.next_index += 1;
        let channels = vec![vec![0.0; self.block_size]; self.geometry.len()];
        AudioBlock::from_channels(index, self.sample_rate, channels)
    }
}
