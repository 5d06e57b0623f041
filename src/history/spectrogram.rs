use num_complex::Complex32;
use parking_lot::Mutex;
use ringbuf::{HeapRb, Rb};

// Magnitudes below this read as the floor instead of -inf.
const MAG_FLOOR: f32 = 1e-9;

/// One block's magnitude spectrum in dB.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumRow {
    pub index: u64,
    pub timestamp_secs: f64,
    /// `20 log10(2|X| / N)`, so a full-scale sine on a bin reads 0 dB.
    pub db: Vec<f32>,
}

impl SpectrumRow {
    pub fn from_bins(
        index: u64,
        timestamp_secs: f64,
        bins: &[Complex32],
        block_size: usize,
    ) -> Self {
        let scale = 2.0 / block_size.max(1) as f32;
        Self {
            index,
            timestamp_secs,
            db: bins
                .iter()
                .map(|b| 20.0 * (b.norm() * scale).max(MAG_FLOOR).log10())
                .collect(),
        }
    }

    /// Bin with the highest level.
    pub fn peak_bin(&self) -> Option<usize> {
        self.db
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
    }
}

/// Scrolling waterfall of recent spectra, oldest row first.
pub struct SpectrogramHistory {
    rows: Mutex<HeapRb<SpectrumRow>>,
    bin_hz: f32,
}

impl SpectrogramHistory {
    pub fn new(rows: usize, bin_hz: f32) -> Self {
        Self {
            rows: Mutex::new(HeapRb::new(rows.max(1))),
            bin_hz,
        }
    }

    pub fn bin_hz(&self) -> f32 {
        self.bin_hz
    }

    pub fn push(&self, row: SpectrumRow) {
        self.rows.lock().push_overwrite(row);
    }

    pub fn latest(&self) -> Option<SpectrumRow> {
        self.rows.lock().iter().last().cloned()
    }

    pub fn snapshot(&self) -> SpectrogramSnapshot {
        SpectrogramSnapshot {
            bin_hz: self.bin_hz,
            rows: self.rows.lock().iter().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Point-in-time copy of a [`SpectrogramHistory`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrogramSnapshot {
    pub bin_hz: f32,
    pub rows: Vec<SpectrumRow>,
}

impl SpectrogramSnapshot {
    pub fn frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.bin_hz
    }
}
