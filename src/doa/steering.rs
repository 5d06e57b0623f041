use crate::error::{Error, Result};
use crate::geometry::ArrayGeometry;
use parking_lot::RwLock;
use std::sync::Arc;

/// Per-angle, per-microphone plane-wave arrival delays.
///
/// `delay(θ, p) = -(p · direction(θ)) / c`, relative to the array center.
/// Rows are stored angle-major so a lookup is a slice into one buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct SteeringTable {
    resolution_deg: u32,
    mic_count: usize,
    sound_speed: f32,
    delays: Vec<f32>,
}

impl SteeringTable {
    pub fn build(geometry: &ArrayGeometry, resolution_deg: u32) -> Result<Self> {
        if resolution_deg == 0 || 360 % resolution_deg != 0 {
            return Err(Error::Configuration(format!(
                "angular resolution {resolution_deg} does not evenly divide 360"
            )));
        }

        let angles = (360 / resolution_deg) as usize;
        let mic_count = geometry.len();
        let c = geometry.sound_speed() as f64;
        let mut delays = Vec::with_capacity(angles * mic_count);

        for a in 0..angles {
            let theta = ((a as u32 * resolution_deg) as f64).to_radians();
            let (dx, dy) = (theta.cos(), theta.sin());
            for &[x, y] in geometry.positions() {
                delays.push((-(x as f64 * dx + y as f64 * dy) / c) as f32);
            }
        }

        log::debug!(
            "Steering table: {} angles x {} mics at {} deg",
            angles,
            mic_count,
            resolution_deg
        );

        Ok(Self {
            resolution_deg,
            mic_count,
            sound_speed: geometry.sound_speed(),
            delays,
        })
    }

    pub fn resolution_deg(&self) -> u32 {
        self.resolution_deg
    }

    pub fn angle_count(&self) -> usize {
        (360 / self.resolution_deg) as usize
    }

    pub fn mic_count(&self) -> usize {
        self.mic_count
    }

    pub fn sound_speed(&self) -> f32 {
        self.sound_speed
    }

    pub fn angle_deg(&self, index: usize) -> f32 {
        (index as u32 * self.resolution_deg) as f32
    }

    /// Nearest candidate index for an arbitrary angle; wraps around 360.
    pub fn index_of(&self, angle_deg: f32) -> usize {
        let steps = (angle_deg.rem_euclid(360.0) / self.resolution_deg as f32).round() as usize;
        steps % self.angle_count()
    }

    /// Delays in seconds for every microphone at candidate `index`.
    pub fn delays(&self, index: usize) -> &[f32] {
        let start = index * self.mic_count;
        &self.delays[start..start + self.mic_count]
    }

    /// `delay(θ, i) - delay(θ, j)`.
    pub fn pair_delay(&self, index: usize, i: usize, j: usize) -> f32 {
        let row = self.delays(index);
        row[i] - row[j]
    }
}

/// Shared reference to the current table.
///
/// Readers clone the `Arc` once per block; a geometry change builds a new
/// table and swaps the reference, never mutating a published table.
#[derive(Clone, Default)]
pub struct SharedSteering {
    slot: Arc<RwLock<Option<Arc<SteeringTable>>>>,
}

impl SharedSteering {
    pub fn new(table: SteeringTable) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Some(Arc::new(table)))),
        }
    }

    /// An empty slot; [`load`](Self::load) fails until a table is stored.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Result<Arc<SteeringTable>> {
        self.slot
            .read()
            .clone()
            .ok_or(Error::NotReady("steering table"))
    }

    /// Publishes `table`, returning the previous one.
    pub fn swap(&self, table: SteeringTable) -> Option<Arc<SteeringTable>> {
        self.slot.write().replace(Arc::new(table))
    }

    pub fn rebuild(&self, geometry: &ArrayGeometry, resolution_deg: u32) -> Result<()> {
        let table = SteeringTable::build(geometry, resolution_deg)?;
        self.swap(table);
        Ok(())
    }

    pub fn clear(&self) {
        self.slot.write().take();
    }
}
