use crate::audio::queue::DropPolicy;
use crate::error::{Error, Result};
use crate::geometry::ArrayGeometry;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Reference 4-mic circular array.
const DEFAULT_RADIUS: f32 = 0.0325;

/// Every value the processing core consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    /// Channels carried by each captured block.
    pub channels: usize,
    /// Block channel feeding each microphone, in microphone order.
    pub mic_channels: Vec<usize>,
    /// Microphone (x, y) positions in meters.
    pub mic_positions: Vec<[f32; 2]>,
    pub array_radius: f32,
    pub sound_speed: f32,
    /// Degrees per candidate angle; must divide 360.
    pub resolution_deg: u32,
    pub freq_min_hz: f32,
    pub freq_max_hz: f32,
    /// Weight of the new target in the exponential angle smoothing.
    pub smoothing: f32,
    pub max_step_deg: f32,
    /// RMS below which a block counts as silent.
    pub silence_threshold: f32,
    /// Normalised peak steered power needed to move the estimate.
    pub min_confidence: f32,
    pub phat_floor: f32,
    pub calibration_offset_deg: f32,
    /// Run the estimator on every n-th block.
    pub doa_interval: u64,
    /// Blocks an estimate may lag before the beamformer falls back to passthrough.
    pub staleness_bound: u64,
    pub history_secs: f32,
    pub estimate_track_len: usize,
    /// Spectrum rows kept for the reference microphone and beam waterfalls.
    pub spectrogram_rows: usize,
    pub queue_capacity: usize,
    pub drop_policy: DropPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let r = DEFAULT_RADIUS;
        Self {
            sample_rate: 16000,
            block_size: 1024,
            channels: 4,
            mic_channels: vec![0, 1, 2, 3],
            mic_positions: vec![[0.0, -r], [r, 0.0], [0.0, r], [-r, 0.0]],
            array_radius: r,
            sound_speed: 343.0,
            resolution_deg: 5,
            freq_min_hz: 300.0,
            freq_max_hz: 3000.0,
            smoothing: 0.35,
            max_step_deg: 30.0,
            silence_threshold: 0.005,
            min_confidence: 0.15,
            phat_floor: 1e-10,
            calibration_offset_deg: 0.0,
            doa_interval: 1,
            staleness_bound: 4,
            history_secs: 5.0,
            estimate_track_len: 256,
            spectrogram_rows: 128,
            queue_capacity: 4,
            drop_policy: DropPolicy::OverwriteOldest,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Verifies every value; any failure is fatal at startup.
    pub fn validate(&self) -> Result<()> {
        fn bad(msg: String) -> Result<()> {
            Err(Error::Configuration(msg))
        }

        if self.sample_rate == 0 {
            return bad("sample rate must be positive".into());
        }
        if self.block_size < 4 || self.block_size % 2 != 0 {
            return bad(format!(
                "block size must be even and at least 4, got {}",
                self.block_size
            ));
        }
        if self.resolution_deg == 0 || 360 % self.resolution_deg != 0 {
            return bad(format!(
                "angular resolution {} does not evenly divide 360",
                self.resolution_deg
            ));
        }
        if self.channels == 0 {
            return bad("channel count must be positive".into());
        }
        if self.mic_channels.len() != self.mic_positions.len() {
            return bad(format!(
                "{} channel mappings for {} microphones",
                self.mic_channels.len(),
                self.mic_positions.len()
            ));
        }
        if let Some(c) = self.mic_channels.iter().find(|&&c| c >= self.channels) {
            return bad(format!(
                "microphone channel {c} outside block with {} channels",
                self.channels
            ));
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        if !(self.freq_min_hz >= 0.0
            && self.freq_min_hz < self.freq_max_hz
            && self.freq_max_hz <= nyquist)
        {
            return bad(format!(
                "frequency band {}..{} Hz outside 0..{nyquist} Hz",
                self.freq_min_hz, self.freq_max_hz
            ));
        }
        let bin_hz = self.sample_rate as f32 / self.block_size as f32;
        if self.freq_max_hz - self.freq_min_hz < bin_hz {
            return bad("frequency band narrower than one bin".into());
        }
        if !(self.smoothing > 0.0 && self.smoothing <= 1.0) {
            return bad(format!("smoothing must be in (0, 1], got {}", self.smoothing));
        }
        if !(self.max_step_deg > 0.0) {
            return bad("maximum step must be positive".into());
        }
        if !(self.silence_threshold >= 0.0 && self.phat_floor > 0.0) {
            return bad("silence threshold must be non-negative and PHAT floor positive".into());
        }
        if !self.min_confidence.is_finite() || !self.calibration_offset_deg.is_finite() {
            return bad("confidence and calibration values must be finite".into());
        }
        if self.doa_interval == 0 {
            return bad("estimation interval must be at least one block".into());
        }
        if !(self.history_secs > 0.0 && self.history_secs.is_finite()) {
            return bad("history window must be positive".into());
        }
        if self.queue_capacity == 0 || self.estimate_track_len == 0 || self.spectrogram_rows == 0 {
            return bad("queue, estimate track and spectrograms need at least one entry".into());
        }

        self.geometry().map(|_| ())
    }

    pub fn geometry(&self) -> Result<ArrayGeometry> {
        ArrayGeometry::new(
            self.mic_positions.clone(),
            self.array_radius,
            self.sound_speed,
        )
    }

    pub fn mic_count(&self) -> usize {
        self.mic_positions.len()
    }

    /// Deadline for processing one block.
    pub fn block_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.block_size as f64 / self.sample_rate as f64)
    }
}
