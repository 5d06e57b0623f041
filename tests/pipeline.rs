use doabeam::doa::circular_distance;
use doabeam::{
    write_wav, ArrayGeometry, AudioBlock, BeamMode, Calibration, Confidence, DoaEstimate,
    DropPolicy, Engine, Error, PipelineConfig, Processor, SourceSimulator,
};
use hound::WavReader;

fn simulator(config: &PipelineConfig, seed: u64) -> SourceSimulator {
    SourceSimulator::new(config.geometry().unwrap(), config.sample_rate, config.block_size, seed)
}

fn run(p: &mut Processor, sim: &mut SourceSimulator, blocks: usize) -> DoaEstimate {
    let mut last = None;
    for _ in 0..blocks {
        last = Some(p.process(sim.next_block()).unwrap().estimate);
    }
    last.unwrap()
}

#[test]
fn converges_to_source_across_snr_sweep() {
    let config = PipelineConfig::default();
    for (seed, snr) in [30.0, 20.0, 10.0].into_iter().enumerate() {
        for angle in [0.0, 75.0, 180.0, 305.0] {
            let mut p = Processor::new(config.clone()).unwrap();
            let mut sim = simulator(&config, seed as u64 + 1);
            sim.set_snr_db(Some(snr));
            sim.set_angle(angle);

            let e = run(&mut p, &mut sim, 40);
            assert_eq!(e.confidence, Confidence::Tracked, "{snr} dB, {angle} deg");
            assert!(
                circular_distance(e.angle_deg, angle) <= config.resolution_deg as f32,
                "{snr} dB: expected {angle}, got {}",
                e.angle_deg
            );
        }
    }
}

#[test]
fn tracks_across_the_wrap_boundary() {
    let config = PipelineConfig::default();
    let mut p = Processor::new(config.clone()).unwrap();
    let mut sim = simulator(&config, 2);
    sim.set_angle(355.0);
    run(&mut p, &mut sim, 30);

    for i in 0..20 {
        sim.set_angle(if i % 2 == 0 { 5.0 } else { 355.0 });
        let before = p.estimator().smoothed_angle();
        let e = p.process(sim.next_block()).unwrap().estimate;
        assert!(circular_distance(before, e.angle_deg) <= config.max_step_deg + 1e-3);
        // Short arc only: never near the far side of the circle.
        assert!(circular_distance(e.angle_deg, 0.0) <= 10.0, "got {}", e.angle_deg);
    }
}

#[test]
fn silent_blocks_hold_the_angle() {
    let config = PipelineConfig::default();
    let mut p = Processor::new(config.clone()).unwrap();
    let mut sim = simulator(&config, 3);
    sim.set_angle(140.0);
    let tracked = run(&mut p, &mut sim, 30);

    for _ in 0..50 {
        let out = p.process(sim.silent_block()).unwrap();
        assert_eq!(out.estimate.confidence, Confidence::Silent);
        assert_eq!(out.estimate.angle_deg, tracked.angle_deg);
        assert!(out.estimate.power.is_finite());
        assert!(out.beamformed.samples.iter().all(|s| s.is_finite()));
    }
    assert_eq!(p.stats().snapshot().silent, 50);
}

#[test]
fn idle_inputs_with_dc_offset_count_as_silent() {
    let config = PipelineConfig::default();
    let mut p = Processor::new(config.clone()).unwrap();
    let mut sim = simulator(&config, 14);
    sim.set_angle(90.0);
    let tracked = run(&mut p, &mut sim, 30);

    for _ in 0..20 {
        let index = sim.next_index();
        sim.skip(1);
        let channels = (0..4)
            .map(|c| {
                (0..config.block_size)
                    .map(|n| 0.02 + 1e-5 * ((n * 7 + c * 3) as f32 * 0.37).sin())
                    .collect()
            })
            .collect();
        let idle = AudioBlock::new(index, config.sample_rate, channels).unwrap();
        let e = p.process(idle).unwrap().estimate;
        assert_eq!(e.confidence, Confidence::Silent);
        assert_eq!(e.angle_deg, tracked.angle_deg);
    }

    let stats = p.stats().snapshot();
    assert_eq!((stats.silent, stats.held), (20, 0));
}

#[test]
fn blocks_at_another_sample_rate_are_dropped() {
    let config = PipelineConfig::default();
    let mut p = Processor::new(config.clone()).unwrap();
    let mut sim = simulator(&config, 15);
    sim.set_angle(40.0);
    run(&mut p, &mut sim, 10);
    let estimates = p.estimates().len();

    for _ in 0..5 {
        let block = sim.next_block();
        let index = block.index();
        let relabelled = AudioBlock::new(index, 48000, block.into_channels()).unwrap();
        let err = p.process(relabelled).unwrap_err();
        assert!(matches!(err, Error::SampleRateMismatch { expected: 16000, got: 48000 }));
        assert!(err.is_per_block());
    }

    assert_eq!(p.estimates().len(), estimates);
    assert_eq!(p.last_index(), Some(9));
    assert_eq!(p.stats().snapshot().invalid, 5);

    // Back at the right rate, timestamps follow the configured clock.
    let e = run(&mut p, &mut sim, 1);
    assert_eq!(e.index, 15);
    let expected = 15.0 * config.block_size as f64 / config.sample_rate as f64;
    assert!((e.timestamp_secs - expected).abs() < 1e-9);
}

#[test]
fn waterfalls_show_the_source_band() {
    let config = PipelineConfig {
        spectrogram_rows: 8,
        ..PipelineConfig::default()
    };
    let mut p = Processor::new(config.clone()).unwrap();
    let mut sim = simulator(&config, 16);
    sim.set_angle(200.0);
    run(&mut p, &mut sim, 12);

    let mic = p.mic_spectrogram().snapshot();
    let beam = p.beam_spectrogram().snapshot();
    assert_eq!((mic.rows.len(), beam.rows.len()), (8, 8));
    let indices: Vec<u64> = beam.rows.iter().map(|r| r.index).collect();
    assert_eq!(indices, (4..12).collect::<Vec<u64>>());

    for row in mic.rows.iter().chain(&beam.rows) {
        assert_eq!(row.db.len(), config.block_size / 2 + 1);
        let peak = mic.frequency(row.peak_bin().unwrap());
        assert!((config.freq_min_hz..=config.freq_max_hz).contains(&peak), "peak at {peak} Hz");
    }
}

#[test]
fn resumes_after_dropped_blocks() {
    let config = PipelineConfig::default();
    let mut p = Processor::new(config.clone()).unwrap();
    let mut sim = simulator(&config, 4);
    sim.set_angle(100.0);
    run(&mut p, &mut sim, 20);

    sim.skip(7);
    sim.set_angle(200.0);
    let e = run(&mut p, &mut sim, 40);

    assert!(circular_distance(e.angle_deg, 200.0) <= 5.0, "got {}", e.angle_deg);
    let stats = p.stats().snapshot();
    assert_eq!(stats.gaps, 1);
    assert_eq!(stats.processed, 60);
}

#[test]
fn malformed_and_replayed_blocks_are_dropped() {
    let config = PipelineConfig::default();
    let mut p = Processor::new(config.clone()).unwrap();
    let mut sim = simulator(&config, 5);
    sim.set_angle(30.0);
    run(&mut p, &mut sim, 10);

    let n = config.block_size;
    let three = AudioBlock::new(100, config.sample_rate, vec![vec![0.1; n]; 3]).unwrap();
    let err = p.process(three).unwrap_err();
    assert!(matches!(err, Error::InvalidBlockSize { channels: 3, .. }));
    assert!(err.is_per_block());

    let replay = AudioBlock::new(9, config.sample_rate, vec![vec![0.0; n]; 4]).unwrap();
    assert!(matches!(p.process(replay), Err(Error::OutOfOrder { last: 9, got: 9 })));

    let e = run(&mut p, &mut sim, 5);
    assert!(circular_distance(e.angle_deg, 30.0) <= 5.0);
    assert_eq!(p.last_index(), Some(14));
}

#[test]
fn selects_microphones_from_wider_device_block() {
    let config = PipelineConfig {
        channels: 6,
        mic_channels: vec![1, 2, 3, 4],
        ..PipelineConfig::default()
    };
    let mut p = Processor::new(config.clone()).unwrap();
    let mut sim = simulator(&config, 6);
    sim.set_angle(220.0);

    let mut last = None;
    for _ in 0..30 {
        let block = sim.next_block();
        let mut interleaved = Vec::with_capacity(6 * config.block_size);
        for n in 0..config.block_size {
            // Channels 0 and 5 carry unrelated content.
            interleaved.push(0.3 * (n as f32 * 0.9).sin());
            interleaved.extend((0..4).map(|m| block.channel(m)[n]));
            interleaved.push(-0.2);
        }
        let device =
            AudioBlock::from_interleaved(block.index(), config.sample_rate, 6, &interleaved)
                .unwrap();
        last = Some(p.process(device).unwrap().estimate);
    }

    assert!(circular_distance(last.unwrap().angle_deg, 220.0) <= 5.0);
    assert_eq!(p.raw_history().channels(), 4);
}

#[test]
fn decimated_estimates_beyond_staleness_bound_pass_through() {
    let config = PipelineConfig {
        doa_interval: 6,
        staleness_bound: 4,
        ..PipelineConfig::default()
    };
    let mut p = Processor::new(config.clone()).unwrap();
    let mut sim = simulator(&config, 7);

    let modes: Vec<BeamMode> = (0..12)
        .map(|_| p.process(sim.next_block()).unwrap().beamformed.mode)
        .collect();
    assert_eq!(modes[5], BeamMode::Passthrough { staleness: Some(5) });
    assert!(matches!(modes[6], BeamMode::Steered { staleness: 0, .. }));
    assert!(matches!(modes[10], BeamMode::Steered { staleness: 4, .. }));

    let stats = p.stats().snapshot();
    assert_eq!(stats.passthrough, 2);
    assert_eq!(stats.stale_tolerated, 8);
}

#[test]
fn rebuilt_geometry_takes_effect_on_next_block() {
    let config = PipelineConfig::default();
    let mut p = Processor::new(config.clone()).unwrap();
    let mut sim = simulator(&config, 8);
    sim.set_angle(60.0);
    run(&mut p, &mut sim, 20);

    // Table for the same array rotated a quarter turn.
    let rotated = ArrayGeometry::circular(4, config.array_radius, config.sound_speed, 0.0).unwrap();
    let before = p.steering().load().unwrap();
    p.steering().rebuild(&rotated, config.resolution_deg).unwrap();
    let after = p.steering().load().unwrap();
    assert_ne!(before.delays(0), after.delays(0));

    let e = run(&mut p, &mut sim, 40);
    assert!(circular_distance(e.angle_deg, 150.0) <= 5.0, "got {}", e.angle_deg);
}

#[test]
fn calibration_removes_a_fixed_bias() {
    let config = PipelineConfig {
        calibration_offset_deg: 12.0,
        ..PipelineConfig::default()
    };
    let mut p = Processor::new(config.clone()).unwrap();
    let mut sim = simulator(&config, 9);
    sim.set_angle(90.0);
    run(&mut p, &mut sim, 30);

    let mut cal = Calibration::new(90.0);
    for _ in 0..20 {
        let e = p.process(sim.next_block()).unwrap().estimate;
        cal.record(&e);
    }
    let report = cal.finish().unwrap();
    assert_eq!(report.samples, 20);
    assert!((report.correction_deg + 12.0).abs() < 3.0, "{report:?}");

    p.estimator_mut().apply_calibration(report.correction_deg);
    let e = run(&mut p, &mut sim, 5);
    assert!(circular_distance(e.angle_deg, 90.0) < 3.0, "got {}", e.angle_deg);
}

#[test]
fn histories_persist_as_wav() {
    let config = PipelineConfig {
        history_secs: 0.5,
        ..PipelineConfig::default()
    };
    let mut p = Processor::new(config.clone()).unwrap();
    let mut sim = simulator(&config, 10);
    sim.set_angle(10.0);
    run(&mut p, &mut sim, 12);

    let dir = tempfile::tempdir().unwrap();
    let raw = p.raw_history().snapshot();
    let beam = p.beam_history().snapshot();
    assert_eq!(raw.len(), 8000);
    assert_eq!(raw.start_sample, 12 * 1024 - 8000);
    write_wav(&raw, dir.path().join("raw.wav")).unwrap();
    write_wav(&beam, dir.path().join("beamformed.wav")).unwrap();

    let mut reader = WavReader::open(dir.path().join("raw.wav")).unwrap();
    assert_eq!(reader.spec().channels, 4);
    assert_eq!(reader.duration(), 8000);
    let first: Vec<i16> = reader.samples::<i16>().take(4).map(|s| s.unwrap()).collect();
    for (c, &s) in first.iter().enumerate() {
        let expected = raw.channels[c][0];
        assert!((s as f32 / 32767.0 - expected).abs() < 1e-3);
    }

    let reader = WavReader::open(dir.path().join("beamformed.wav")).unwrap();
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.duration(), 8000);
}

#[test]
fn engine_drains_queued_blocks_on_shutdown() {
    let config = PipelineConfig {
        queue_capacity: 64,
        drop_policy: DropPolicy::DropNewest,
        ..PipelineConfig::default()
    };
    let engine = Engine::start(config.clone()).unwrap();
    let mut sim = simulator(&config, 11);
    sim.set_angle(270.0);
    for _ in 0..30 {
        assert!(engine.submit(sim.next_block()).dropped().is_none());
    }

    let raw = std::sync::Arc::clone(engine.raw_history());
    let estimates = std::sync::Arc::clone(engine.estimates());
    let stats = engine.shutdown().unwrap();

    assert_eq!(stats.processed, 30);
    assert_eq!(stats.queue_drops, 0);
    assert_eq!(raw.written(), 30 * config.block_size as u64);
    let latest = estimates.latest().unwrap();
    assert_eq!(latest.index, 29);
    assert!(circular_distance(latest.angle_deg, 270.0) <= 5.0);
}

#[test]
fn engine_accounts_for_every_submitted_block() {
    let config = PipelineConfig {
        queue_capacity: 1,
        drop_policy: DropPolicy::DropNewest,
        ..PipelineConfig::default()
    };
    let engine = Engine::start(config.clone()).unwrap();
    let mut sim = simulator(&config, 12);
    for _ in 0..25 {
        engine.submit(sim.next_block());
    }
    let stats = engine.shutdown().unwrap();
    assert_eq!(stats.processed + stats.queue_drops, 25);
}

#[test]
fn engine_geometry_update_checks_microphone_count() {
    let config = PipelineConfig::default();
    let engine = Engine::start(config.clone()).unwrap();

    let three = ArrayGeometry::circular(3, 0.03, 343.0, 0.0).unwrap();
    assert!(matches!(engine.update_geometry(&three), Err(Error::Configuration(_))));

    let rotated = ArrayGeometry::circular(4, config.array_radius, config.sound_speed, 0.0).unwrap();
    engine.update_geometry(&rotated).unwrap();
    let expected = doabeam::SteeringTable::build(&rotated, config.resolution_deg).unwrap();
    let table = engine.steering().load().unwrap();
    for i in 0..table.angle_count() {
        assert_eq!(table.delays(i), expected.delays(i));
    }
    engine.shutdown().unwrap();
}

#[test]
fn engine_applies_calibration_before_next_block() {
    let config = PipelineConfig {
        queue_capacity: 64,
        calibration_offset_deg: 20.0,
        ..PipelineConfig::default()
    };
    let engine = Engine::start(config.clone()).unwrap();
    engine.apply_calibration(-20.0);

    let mut sim = simulator(&config, 13);
    sim.set_angle(45.0);
    for _ in 0..30 {
        engine.submit(sim.next_block());
    }
    let estimates = std::sync::Arc::clone(engine.estimates());
    engine.shutdown().unwrap();

    let latest = estimates.latest().unwrap();
    assert!(circular_distance(latest.angle_deg, 45.0) <= 5.0, "got {}", latest.angle_deg);
}
