pub mod spectrogram;
pub mod wav;

use crate::doa::DoaEstimate;
use parking_lot::{Mutex, RwLock};
use ringbuf::{HeapRb, Rb};

pub use spectrogram::{SpectrogramHistory, SpectrogramSnapshot, SpectrumRow};
pub use wav::write_wav;

struct Rings {
    channels: Vec<HeapRb<f32>>,
    // Samples ever written per channel; the write cursor.
    written: u64,
}

/// Fixed-duration multichannel sample history.
///
/// One writer appends whole blocks; readers take snapshots. Both go through
/// the same lock, so a snapshot never sees half of a block.
pub struct HistoryBuffer {
    rings: RwLock<Rings>,
    sample_rate: u32,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(channels: usize, sample_rate: u32, window_secs: f32) -> Self {
        let capacity = ((window_secs as f64 * sample_rate as f64).round() as usize).max(1);
        Self {
            rings: RwLock::new(Rings {
                channels: (0..channels.max(1)).map(|_| HeapRb::new(capacity)).collect(),
                written: 0,
            }),
            sample_rate,
            capacity,
        }
    }

    pub fn channels(&self) -> usize {
        self.rings.read().channels.len()
    }

    /// Samples per channel the window holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Appends one block, overwriting the oldest samples once full.
    ///
    /// Extra input channels are ignored and missing ones are zero-filled, so
    /// every ring advances by the same count.
    pub fn write<S: AsRef<[f32]>>(&self, block: &[S]) {
        let len = block.iter().map(|c| c.as_ref().len()).max().unwrap_or(0);
        let mut rings = self.rings.write();

        for (c, ring) in rings.channels.iter_mut().enumerate() {
            let samples = block.get(c).map(AsRef::as_ref).unwrap_or(&[]);
            for i in 0..len {
                ring.push_overwrite(samples.get(i).copied().unwrap_or(0.0));
            }
        }
        rings.written += len as u64;
    }

    /// Total samples per channel written since creation.
    pub fn written(&self) -> u64 {
        self.rings.read().written
    }

    /// Contiguous, time-ordered copy of the current window.
    pub fn snapshot(&self) -> HistorySnapshot {
        let rings = self.rings.read();
        let channels: Vec<Vec<f32>> = rings
            .channels
            .iter()
            .map(|ring| ring.iter().copied().collect())
            .collect();
        let len = channels.first().map_or(0, Vec::len) as u64;

        HistorySnapshot {
            sample_rate: self.sample_rate,
            start_sample: rings.written - len,
            channels,
        }
    }

    pub fn clear(&self) {
        let mut rings = self.rings.write();
        for ring in &mut rings.channels {
            ring.clear();
        }
    }
}

/// Point-in-time copy of a [`HistoryBuffer`].
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySnapshot {
    pub sample_rate: u32,
    /// Absolute index of the first sample in the snapshot.
    pub start_sample: u64,
    pub channels: Vec<Vec<f32>>,
}

impl HistorySnapshot {
    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn start_secs(&self) -> f64 {
        self.start_sample as f64 / self.sample_rate as f64
    }

    pub fn end_secs(&self) -> f64 {
        (self.start_sample + self.len() as u64) as f64 / self.sample_rate as f64
    }

    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    /// Frame-interleaved samples, as audio files store them.
    pub fn interleaved(&self) -> Vec<f32> {
        let len = self.len();
        let mut out = Vec::with_capacity(len * self.channels.len());
        for i in 0..len {
            out.extend(self.channels.iter().map(|c| c[i]));
        }
        out
    }
}

/// Bounded track of recent direction estimates for visualization.
pub struct EstimateTrack {
    ring: Mutex<HeapRb<DoaEstimate>>,
}

impl EstimateTrack {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(HeapRb::new(capacity.max(1))),
        }
    }

    pub fn push(&self, estimate: DoaEstimate) {
        self.ring.lock().push_overwrite(estimate);
    }

    pub fn latest(&self) -> Option<DoaEstimate> {
        self.ring.lock().iter().last().copied()
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<DoaEstimate> {
        self.ring.lock().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doa::Confidence;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn window_never_exceeds_capacity() {
        let h = HistoryBuffer::new(2, 100, 0.5);
        assert_eq!(h.capacity(), 50);
        for b in 0..20u32 {
            let block: Vec<f32> = (0..16).map(|i| (b * 16 + i) as f32).collect();
            h.write(&[block.clone(), block]);
            assert!(h.snapshot().len() <= 50);
        }

        let snap = h.snapshot();
        assert_eq!(snap.len(), 50);
        assert_eq!(snap.start_sample, 320 - 50);
        // Oldest first and contiguous.
        let expected: Vec<f32> = (270..320).map(|v| v as f32).collect();
        assert_eq!(snap.channels[0], expected);
        assert_eq!(snap.channels[1], expected);
    }

    #[test]
    fn oldest_sample_stays_inside_window() {
        let sr = 1000;
        let window = 2.0;
        let h = HistoryBuffer::new(1, sr, window);
        for _ in 0..50 {
            h.write(&[vec![0.0; 128]]);
            let snap = h.snapshot();
            let now = h.written() as f64 / sr as f64;
            assert!(snap.start_secs() >= now - window as f64 - 1e-9);
            assert!((snap.end_secs() - now).abs() < 1e-9);
        }
    }

    #[test]
    fn missing_channels_are_zero_filled() {
        let h = HistoryBuffer::new(3, 10, 1.0);
        h.write(&[vec![1.0, 2.0]]);
        let snap = h.snapshot();
        assert_eq!(snap.channels[0], vec![1.0, 2.0]);
        assert_eq!(snap.channels[2], vec![0.0, 0.0]);
        assert_eq!(snap.interleaved(), vec![1.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn clear_empties_window_but_keeps_clock() {
        let h = HistoryBuffer::new(2, 100, 1.0);
        h.write(&[vec![1.0; 30], vec![2.0; 30]]);
        h.clear();
        let snap = h.snapshot();
        assert!(snap.is_empty());
        assert_eq!(snap.start_sample, 30);

        h.write(&[vec![3.0; 5], vec![4.0; 5]]);
        let snap = h.snapshot();
        assert_eq!(snap.start_sample, 30);
        assert_eq!(snap.channels[1], vec![4.0; 5]);
    }

    #[test]
    fn snapshots_never_tear_blocks() {
        // Every block is a constant run of its own value, so a torn read shows up
        // as a snapshot whose length is not a multiple of the block or whose
        // channels disagree.
        const BLOCK: usize = 32;
        let h = Arc::new(HistoryBuffer::new(2, 1000, 0.256));
        let writer = {
            let h = Arc::clone(&h);
            thread::spawn(move || {
                for b in 0..2000 {
                    let block = vec![b as f32; BLOCK];
                    h.write(&[block.clone(), block]);
                }
            })
        };

        for _ in 0..500 {
            let snap = h.snapshot();
            assert_eq!(snap.len() % BLOCK, 0);
            assert_eq!(snap.channels[0], snap.channels[1]);
            assert_eq!(snap.start_sample % BLOCK as u64, 0);
        }
        writer.join().unwrap();
    }

    #[test]
    fn estimate_track_keeps_most_recent() {
        let track = EstimateTrack::new(3);
        assert!(track.latest().is_none());
        for i in 0..5 {
            track.push(DoaEstimate {
                angle_deg: i as f32,
                power: 0.5,
                confidence: Confidence::Tracked,
                index: i,
                timestamp_secs: 0.0,
            });
        }
        assert_eq!(track.len(), 3);
        assert_eq!(track.latest().map(|e| e.index), Some(4));
        let indices: Vec<u64> = track.snapshot().iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![2, 3, 4]);
    }
}
