use crate::error::{Error, Result};

/// Static description of a planar microphone array.
///
/// Positions are in meters relative to the array center. Once built the
/// geometry is never mutated; a change of layout means building a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayGeometry {
    positions: Vec<[f32; 2]>,
    radius: f32,
    sound_speed: f32,
}

impl ArrayGeometry {
    pub fn new(positions: Vec<[f32; 2]>, radius: f32, sound_speed: f32) -> Result<Self> {
        if positions.len() < 2 {
            return Err(Error::Configuration(format!(
                "array needs at least 2 microphones, got {}",
                positions.len()
            )));
        }
        if !(sound_speed.is_finite() && sound_speed > 0.0) {
            return Err(Error::Configuration(format!(
                "sound speed must be positive, got {sound_speed}"
            )));
        }
        if !(radius.is_finite() && radius >= 0.0) {
            return Err(Error::Configuration(format!(
                "array radius must be non-negative, got {radius}"
            )));
        }
        if let Some(p) = positions.iter().find(|p| !(p[0].is_finite() && p[1].is_finite())) {
            return Err(Error::Configuration(format!(
                "microphone position {p:?} is not finite"
            )));
        }

        Ok(Self {
            positions,
            radius,
            sound_speed,
        })
    }

    /// Evenly spaced microphones on a circle, the first one at `start_deg`.
    pub fn circular(count: usize, radius: f32, sound_speed: f32, start_deg: f32) -> Result<Self> {
        let positions = (0..count)
            .map(|k| {
                let angle = (start_deg + 360.0 * k as f32 / count.max(1) as f32).to_radians();
                [radius * angle.cos(), radius * angle.sin()]
            })
            .collect();
        Self::new(positions, radius, sound_speed)
    }

    pub fn positions(&self) -> &[[f32; 2]] {
        &self.positions
    }

    pub fn position(&self, mic: usize) -> [f32; 2] {
        self.positions[mic]
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn sound_speed(&self) -> f32 {
        self.sound_speed
    }

    /// Euclidean distance between microphones `i` and `j`.
    pub fn distance(&self, i: usize, j: usize) -> f32 {
        let [xi, yi] = self.positions[i];
        let [xj, yj] = self.positions[j];
        (xi - xj).hypot(yi - yj)
    }

    /// Every unordered pair `(i, j)` with `i < j`.
    pub fn pairs(&self) -> Vec<(usize, usize)> {
        let n = self.positions.len();
        (0..n)
            .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
            .collect()
    }

    /// Pairwise distances in the same order as [`pairs`](Self::pairs).
    pub fn pairwise_distances(&self) -> Vec<f32> {
        self.pairs()
            .into_iter()
            .map(|(i, j)| self.distance(i, j))
            .collect()
    }

    /// Largest pairwise distance.
    pub fn aperture(&self) -> f32 {
        self.pairwise_distances().into_iter().fold(0.0, f32::max)
    }

    /// Frequency above which the widest pair starts to alias spatially.
    pub fn spatial_alias_hz(&self) -> f32 {
        let aperture = self.aperture();
        if aperture <= 0.0 {
            f32::INFINITY
        } else {
            self.sound_speed / (2.0 * aperture)
        }
    }
}
