use super::stats::{Counter, PipelineStats};
use crate::audio::AudioBlock;
use crate::beam::{BeamMode, BeamformedFrame, Beamformer};
use crate::config::PipelineConfig;
use crate::doa::{
    Confidence, DirectionEstimator, DoaEstimate, EstimatorConfig, SharedSteering, SteeringTable,
};
use crate::error::{Error, Result};
use crate::fft::{SpectralTransform, WindowKind};
use crate::history::{EstimateTrack, HistoryBuffer, SpectrogramHistory, SpectrumRow};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything one block produced.
#[derive(Debug, Clone)]
pub struct BlockOutput {
    /// Estimate the beamformer steered with. On decimated blocks this is the
    /// most recent estimate, carrying its own older index.
    pub estimate: DoaEstimate,
    pub beamformed: BeamformedFrame,
    pub elapsed: Duration,
}

/// Transform, estimate, beamform and record, one block at a time.
///
/// A rejected block leaves every piece of processing state untouched.
pub struct Processor {
    config: PipelineConfig,
    analysis: SpectralTransform,
    estimator: DirectionEstimator,
    beamformer: Beamformer,
    steering: SharedSteering,
    raw: Arc<HistoryBuffer>,
    beam: Arc<HistoryBuffer>,
    estimates: Arc<EstimateTrack>,
    mic_spectrogram: Arc<SpectrogramHistory>,
    beam_spectrogram: Arc<SpectrogramHistory>,
    stats: Arc<PipelineStats>,
    deadline: Duration,
    last_index: Option<u64>,
    latest: Option<DoaEstimate>,
}

impl Processor {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let geometry = config.geometry()?;

        //
        // Steering table is built once and shared by reference.
        //
        let table = SteeringTable::build(&geometry, config.resolution_deg)?;
        log::info!(
            "Steering table: {} angles x {} mics, aperture {:.1} mm, aliasing above {:.0} Hz",
            table.angle_count(),
            table.mic_count(),
            geometry.aperture() * 1000.0,
            geometry.spatial_alias_hz()
        );

        // Offsets are removed for estimation only; the beam keeps the full signal.
        let analysis =
            SpectralTransform::new(config.block_size, config.sample_rate, WindowKind::Hann)?
                .with_mean_removal();
        let beamformer =
            Beamformer::new(config.block_size, config.sample_rate, config.staleness_bound)?;
        let mics = config.mic_count();
        let rate = config.sample_rate;
        let bin_hz = rate as f32 / config.block_size as f32;

        Ok(Self {
            analysis,
            beamformer,
            estimator: DirectionEstimator::new(EstimatorConfig::from(&config)),
            steering: SharedSteering::new(table),
            raw: Arc::new(HistoryBuffer::new(mics, rate, config.history_secs)),
            beam: Arc::new(HistoryBuffer::new(1, rate, config.history_secs)),
            estimates: Arc::new(EstimateTrack::new(config.estimate_track_len)),
            mic_spectrogram: Arc::new(SpectrogramHistory::new(config.spectrogram_rows, bin_hz)),
            beam_spectrogram: Arc::new(SpectrogramHistory::new(config.spectrogram_rows, bin_hz)),
            stats: Arc::new(PipelineStats::new()),
            deadline: config.block_period(),
            last_index: None,
            latest: None,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn estimator(&self) -> &DirectionEstimator {
        &self.estimator
    }

    pub fn estimator_mut(&mut self) -> &mut DirectionEstimator {
        &mut self.estimator
    }

    pub fn steering(&self) -> &SharedSteering {
        &self.steering
    }

    /// Per-microphone input history.
    pub fn raw_history(&self) -> &Arc<HistoryBuffer> {
        &self.raw
    }

    /// Mono beamformer output history.
    pub fn beam_history(&self) -> &Arc<HistoryBuffer> {
        &self.beam
    }

    pub fn estimates(&self) -> &Arc<EstimateTrack> {
        &self.estimates
    }

    /// Waterfall of the first microphone.
    pub fn mic_spectrogram(&self) -> &Arc<SpectrogramHistory> {
        &self.mic_spectrogram
    }

    /// Waterfall of the beamformer output.
    pub fn beam_spectrogram(&self) -> &Arc<SpectrogramHistory> {
        &self.beam_spectrogram
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    pub fn latest_estimate(&self) -> Option<DoaEstimate> {
        self.latest
    }

    /// Sequence index of the last accepted block.
    pub fn last_index(&self) -> Option<u64> {
        self.last_index
    }

    pub fn process(&mut self, block: AudioBlock) -> Result<BlockOutput> {
        let started = Instant::now();

        //
        // Validate before touching any state.
        //
        let shape = (block.channel_count(), block.samples());
        if shape != (self.config.channels, self.config.block_size) {
            self.stats.bump(Counter::Invalid);
            return Err(Error::InvalidBlockSize {
                expected_channels: self.config.channels,
                expected_samples: self.config.block_size,
                channels: block.channel_count(),
                samples: block.samples(),
            });
        }
        if block.sample_rate() != self.config.sample_rate {
            self.stats.bump(Counter::Invalid);
            return Err(Error::SampleRateMismatch {
                expected: self.config.sample_rate,
                got: block.sample_rate(),
            });
        }
        if let Some(last) = self.last_index {
            if block.index() <= last {
                self.stats.bump(Counter::OutOfOrder);
                return Err(Error::OutOfOrder {
                    last,
                    got: block.index(),
                });
            }
        }

        let table = self.steering.load()?;
        let mics = block.select(&self.config.mic_channels)?;
        if table.mic_count() != mics.channel_count() {
            return Err(Error::GeometryMismatch {
                table: table.mic_count(),
                frame: mics.channel_count(),
            });
        }

        if let Some(last) = self.last_index {
            if block.index() > last + 1 {
                self.stats.bump(Counter::Gaps);
                let missing = block.index() - last - 1;
                log::debug!("{missing} blocks missing before block {}", block.index());
            }
        }

        //
        // Direction estimate, every doa_interval blocks.
        //
        let due = self
            .latest
            .map_or(true, |e| block.index() - e.index >= self.config.doa_interval);
        let estimate = match self.latest {
            Some(latest) if !due => latest,
            _ => {
                let frame = self.analysis.transform(&mics)?;
                let estimate = self.estimator.estimate(&frame, &table)?;
                match estimate.confidence {
                    Confidence::Silent => self.stats.bump(Counter::Silent),
                    Confidence::Held => self.stats.bump(Counter::Held),
                    Confidence::Tracked => {}
                }
                self.latest = Some(estimate);
                self.estimates.push(estimate);
                estimate
            }
        };

        //
        // Beamform toward it.
        //
        let frame = self.beamformer.transform().transform(&mics)?;
        let beamformed = self.beamformer.beamform(&frame, Some(&estimate), &table)?;
        match beamformed.mode {
            BeamMode::Steered { staleness, .. } if staleness > 0 => {
                self.stats.bump(Counter::StaleTolerated)
            }
            BeamMode::Passthrough { .. } => self.stats.bump(Counter::Passthrough),
            _ => {}
        }

        //
        // Waterfall rows, both from the same rectangular frame so they compare directly.
        //
        let n = self.config.block_size;
        let at = block.start_secs();
        self.mic_spectrogram
            .push(SpectrumRow::from_bins(block.index(), at, frame.channel(0), n));
        self.beam_spectrogram
            .push(SpectrumRow::from_bins(block.index(), at, self.beamformer.spectrum(), n));

        self.last_index = Some(block.index());
        self.raw.write(mics.channels());
        self.beam.write(&[beamformed.samples.as_slice()]);
        self.stats.bump(Counter::Processed);

        let elapsed = started.elapsed();
        if elapsed > self.deadline {
            self.stats.bump(Counter::DeadlineMisses);
            log::warn!(
                "block {} took {:.2} ms, over the {:.2} ms budget",
                block.index(),
                elapsed.as_secs_f64() * 1e3,
                self.deadline.as_secs_f64() * 1e3
            );
        }

        Ok(BlockOutput {
            estimate,
            beamformed,
            elapsed,
        })
    }
}
