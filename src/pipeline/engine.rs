use super::processor::Processor;
use super::stats::{Counter, PipelineStats, StatsSnapshot};
use crate::audio::{AudioBlock, BlockQueue, PushOutcome};
use crate::config::PipelineConfig;
use crate::doa::SharedSteering;
use crate::error::{Error, Result};
use crate::geometry::ArrayGeometry;
use crate::history::{EstimateTrack, HistoryBuffer, SpectrogramHistory};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Producer-facing handle: a bounded queue in front of a processing worker.
///
/// `submit` never blocks the capture side. Histories, estimates and stats are
/// shared read-only with any number of observers.
pub struct Engine {
    config: PipelineConfig,
    queue: Arc<BlockQueue>,
    worker: Option<JoinHandle<()>>,
    steering: SharedSteering,
    raw: Arc<HistoryBuffer>,
    beam: Arc<HistoryBuffer>,
    estimates: Arc<EstimateTrack>,
    mic_spectrogram: Arc<SpectrogramHistory>,
    beam_spectrogram: Arc<SpectrogramHistory>,
    stats: Arc<PipelineStats>,
    correction: Arc<Mutex<Option<f32>>>,
}

impl Engine {
    pub fn start(config: PipelineConfig) -> Result<Self> {
        let processor = Processor::new(config.clone())?;
        let queue = Arc::new(BlockQueue::new(config.queue_capacity, config.drop_policy));
        let correction = Arc::new(Mutex::new(None));

        let steering = processor.steering().clone();
        let raw = Arc::clone(processor.raw_history());
        let beam = Arc::clone(processor.beam_history());
        let estimates = Arc::clone(processor.estimates());
        let mic_spectrogram = Arc::clone(processor.mic_spectrogram());
        let beam_spectrogram = Arc::clone(processor.beam_spectrogram());
        let stats = Arc::clone(processor.stats());

        log::info!(
            "Starting worker: {} Hz, {} samples/block, queue of {} ({:?})",
            config.sample_rate,
            config.block_size,
            queue.capacity(),
            queue.policy()
        );

        let worker = {
            let queue = Arc::clone(&queue);
            let correction = Arc::clone(&correction);
            thread::Builder::new()
                .name("doabeam-worker".into())
                .spawn(move || run_worker(processor, &queue, &correction))?
        };

        Ok(Self {
            config,
            queue,
            worker: Some(worker),
            steering,
            raw,
            beam,
            estimates,
            mic_spectrogram,
            beam_spectrogram,
            stats,
            correction,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Hands a block to the worker, counting anything the queue discards.
    pub fn submit(&self, block: AudioBlock) -> PushOutcome {
        let outcome = self.queue.push(block);
        if let Some(index) = outcome.dropped() {
            self.stats.bump(Counter::QueueDrops);
            log::debug!("queue full, block {index} dropped");
        }
        outcome
    }

    pub fn raw_history(&self) -> &Arc<HistoryBuffer> {
        &self.raw
    }

    pub fn beam_history(&self) -> &Arc<HistoryBuffer> {
        &self.beam
    }

    pub fn estimates(&self) -> &Arc<EstimateTrack> {
        &self.estimates
    }

    pub fn mic_spectrogram(&self) -> &Arc<SpectrogramHistory> {
        &self.mic_spectrogram
    }

    pub fn beam_spectrogram(&self) -> &Arc<SpectrogramHistory> {
        &self.beam_spectrogram
    }

    pub fn steering(&self) -> &SharedSteering {
        &self.steering
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Rebuilds the steering table for moved microphones and swaps it in.
    ///
    /// Blocks already in flight finish with the table they loaded.
    pub fn update_geometry(&self, geometry: &ArrayGeometry) -> Result<()> {
        if geometry.len() != self.config.mic_count() {
            return Err(Error::Configuration(format!(
                "new geometry has {} microphones, pipeline was configured for {}",
                geometry.len(),
                self.config.mic_count()
            )));
        }
        self.steering.rebuild(geometry, self.config.resolution_deg)?;
        log::info!("Steering table rebuilt for new geometry");
        Ok(())
    }

    /// Adds `correction_deg` to the estimator's calibration offset before the next block.
    pub fn apply_calibration(&self, correction_deg: f32) {
        let mut pending = self.correction.lock();
        *pending = Some(pending.unwrap_or(0.0) + correction_deg);
    }

    /// Stops intake, lets the worker drain every queued block, and joins it.
    pub fn shutdown(mut self) -> Result<StatsSnapshot> {
        self.queue.close();
        if let Some(worker) = self.worker.take() {
            worker.join().map_err(|_| Error::WorkerPanicked)?;
        }
        let stats = self.stats.snapshot();
        log::info!("Pipeline stopped: {stats}");
        Ok(stats)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.queue.close();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("processing worker panicked");
            }
        }
    }
}

fn run_worker(mut processor: Processor, queue: &BlockQueue, correction: &Mutex<Option<f32>>) {
    let config = processor.config();
    let report_every = (config.sample_rate as usize / config.block_size).max(1) as u64;

    while let Some(block) = queue.pop() {
        if let Some(delta) = correction.lock().take() {
            processor.estimator_mut().apply_calibration(delta);
        }

        match processor.process(block) {
            Ok(out) => {
                let processed = processor.stats().get(Counter::Processed);
                if processed % report_every == 0 {
                    log::info!(
                        "DOA {:.1} deg (power {:.2}, {:?}) | {}",
                        out.estimate.angle_deg,
                        out.estimate.power,
                        out.estimate.confidence,
                        processor.stats().snapshot()
                    );
                }
            }
            Err(e) if e.is_per_block() => log::warn!("Dropped block: {e}"),
            Err(e) => log::error!("Block processing failed: {e}"),
        }
    }

    log::debug!("worker drained, exiting");
}
