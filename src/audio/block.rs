use crate::error::{Error, Result};

/// One captured block: `C` equally long channels plus a sequence index.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    index: u64,
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBlock {
    pub fn new(index: u64, sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self> {
        let samples = channels.first().map_or(0, Vec::len);
        if let Some(bad) = channels.iter().find(|c| c.len() != samples) {
            return Err(Error::InvalidBlockSize {
                expected_channels: channels.len(),
                expected_samples: samples,
                channels: channels.len(),
                samples: bad.len(),
            });
        }
        Ok(Self {
            index,
            sample_rate,
            channels,
        })
    }

    /// Caller guarantees every channel has the same length.
    pub(crate) fn from_channels(index: u64, sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        debug_assert!(channels.windows(2).all(|w| w[0].len() == w[1].len()));
        Self {
            index,
            sample_rate,
            channels,
        }
    }

    /// Splits interleaved device frames into channels.
    pub fn from_interleaved(
        index: u64,
        sample_rate: u32,
        channel_count: usize,
        data: &[f32],
    ) -> Result<Self> {
        if channel_count == 0 || data.len() % channel_count != 0 {
            return Err(Error::InvalidBlockSize {
                expected_channels: channel_count,
                expected_samples: data.len() / channel_count.max(1),
                channels: channel_count,
                samples: data.len(),
            });
        }

        let frames = data.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in data.chunks_exact(channel_count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        Ok(Self {
            index,
            sample_rate,
            channels,
        })
    }

    /// Builds a block holding only the listed channels, in that order.
    pub fn select(&self, map: &[usize]) -> Result<AudioBlock> {
        if let Some(&missing) = map.iter().find(|&&c| c >= self.channels.len()) {
            return Err(Error::InvalidBlockSize {
                expected_channels: missing + 1,
                expected_samples: self.samples(),
                channels: self.channels.len(),
                samples: self.samples(),
            });
        }
        Ok(Self {
            index: self.index,
            sample_rate: self.sample_rate,
            channels: map.iter().map(|&c| self.channels[c].clone()).collect(),
        })
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn samples(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel(&self, c: usize) -> &[f32] {
        &self.channels[c]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Root mean square over every sample of every channel.
    pub fn rms(&self) -> f32 {
        let count = self.channel_count() * self.samples();
        if count == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .channels
            .iter()
            .flatten()
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        (sum / count as f64).sqrt() as f32
    }

    /// Arithmetic mean of each channel.
    pub fn channel_means(&self) -> Vec<f32> {
        self.channels
            .iter()
            .map(|c| {
                if c.is_empty() {
                    0.0
                } else {
                    (c.iter().map(|&s| s as f64).sum::<f64>() / c.len() as f64) as f32
                }
            })
            .collect()
    }

    /// RMS with each channel's mean removed first, so a constant offset reads as silence.
    pub fn ac_rms(&self) -> f32 {
        let count = self.channel_count() * self.samples();
        if count == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .channels
            .iter()
            .zip(self.channel_means())
            .map(|(c, mean)| {
                c.iter()
                    .map(|&s| (s as f64 - mean as f64).powi(2))
                    .sum::<f64>()
            })
            .sum();
        (sum / count as f64).sqrt() as f32
    }

    /// Capture time of the first sample, measured from block 0.
    pub fn start_secs(&self) -> f64 {
        self.index as f64 * self.samples() as f64 / self.sample_rate.max(1) as f64
    }
}
