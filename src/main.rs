use doabeam::{write_wav, AudioBlock, Engine, PipelineConfig, SourceSimulator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

// Demo run length and source motion.
const RUN_SECS: f64 = 8.0;
const SWEEP_DEG_PER_SEC: f32 = 45.0;
const SIM_SNR_DB: f32 = 20.0;

fn main() -> doabeam::Result<()> {
    //
    // Initialize logging with default filter set to "info".
    //
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => {
            log::info!("Loading configuration from {path}");
            PipelineConfig::from_toml_file(&path)?
        }
        None => PipelineConfig::default(),
    };
    let out_dir = PathBuf::from(args.next().unwrap_or_else(|| ".".into()));

    log::info!("Starting DOA / beamforming pipeline...");

    //
    // Start the processing worker.
    //
    let engine = Engine::start(config.clone())?;
    let raw = Arc::clone(engine.raw_history());
    let beam = Arc::clone(engine.beam_history());

    //
    // Simulated source circling the array, delivered at the real block cadence.
    //
    let mut sim =
        SourceSimulator::new(config.geometry()?, config.sample_rate, config.block_size, 7);
    sim.set_snr_db(Some(SIM_SNR_DB));

    let period = config.block_period();
    let blocks = (RUN_SECS / period.as_secs_f64()).ceil() as u64;
    let blocks_per_sec = ((1.0 / period.as_secs_f64()).round() as u64).max(1);
    let started = Instant::now();
    log::info!("Feeding {blocks} blocks ({RUN_SECS:.0}s) from a sweeping source");

    for n in 0..blocks {
        let t = n as f64 * period.as_secs_f64();
        sim.set_angle(t as f32 * SWEEP_DEG_PER_SEC);
        let block = to_device_layout(sim.next_block(), &config)?;
        engine.submit(block);

        if (n + 1) % blocks_per_sec == 0 {
            if let Some(e) = engine.estimates().latest() {
                log::info!(
                    "t={:.1}s source {:.0} deg, estimate {:.0} deg ({:?})",
                    t,
                    sim.angle(),
                    e.angle_deg,
                    e.confidence
                );
            }
        }

        // Hold the producer to the capture cadence.
        let due = period * (n + 1) as u32;
        if let Some(wait) = due.checked_sub(started.elapsed()) {
            std::thread::sleep(wait);
        }
    }

    //
    // Drain, then persist both histories.
    //
    let stats = engine.shutdown()?;
    log::info!("Final stats: {stats}");

    std::fs::create_dir_all(&out_dir)?;
    write_wav(&raw.snapshot(), out_dir.join("raw.wav"))?;
    write_wav(&beam.snapshot(), out_dir.join("beamformed.wav"))?;

    Ok(())
}

/// Spreads microphone channels onto the device channels the config maps them to.
fn to_device_layout(block: AudioBlock, config: &PipelineConfig) -> doabeam::Result<AudioBlock> {
    let index = block.index();
    let samples = block.samples();
    let mut device = vec![vec![0.0; samples]; config.channels];
    for (mic, channel) in config.mic_channels.iter().zip(block.into_channels()) {
        device[*mic] = channel;
    }
    AudioBlock::new(index, config.sample_rate, device)
}
