use super::HistorySnapshot;
use crate::error::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;

/// Writes a snapshot as 16-bit PCM, one WAV channel per snapshot channel.
pub fn write_wav(snapshot: &HistorySnapshot, path: impl AsRef<Path>) -> Result<()> {
    let spec = WavSpec {
        channels: snapshot.channels.len() as u16,
        sample_rate: snapshot.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path.as_ref(), spec)?;
    for sample in snapshot.interleaved() {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;

    log::info!(
        "Saved {:.2}s ({} ch) to {}",
        snapshot.duration_secs(),
        snapshot.channels.len(),
        path.as_ref().display()
    );
    Ok(())
}
