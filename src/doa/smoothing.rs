/// Wraps any angle into `[0, 360)`.
pub fn wrap_deg(angle: f32) -> f32 {
    let a = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if a >= 360.0 {
        0.0
    } else {
        a
    }
}

/// Signed shortest rotation taking `from` onto `to`, in `[-180, 180)`.
pub fn shortest_arc(from: f32, to: f32) -> f32 {
    (to - from + 180.0).rem_euclid(360.0) - 180.0
}

/// Unsigned distance along the circle.
pub fn circular_distance(a: f32, b: f32) -> f32 {
    shortest_arc(a, b).abs()
}

/// Exponential angle smoothing along the shortest arc with a bounded step.
///
/// This is the estimator's only memory between blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct AngleSmoother {
    alpha: f32,
    max_step_deg: f32,
    angle: f32,
}

impl AngleSmoother {
    pub fn new(alpha: f32, max_step_deg: f32) -> Self {
        Self {
            alpha: alpha.clamp(f32::EPSILON, 1.0),
            max_step_deg: max_step_deg.max(f32::EPSILON),
            angle: 0.0,
        }
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Moves toward `target` and returns the new smoothed angle.
    pub fn update(&mut self, target: f32) -> f32 {
        let step = (self.alpha * shortest_arc(self.angle, target))
            .clamp(-self.max_step_deg, self.max_step_deg);
        self.angle = wrap_deg(self.angle + step);
        self.angle
    }

    pub fn reset(&mut self, angle: f32) {
        self.angle = wrap_deg(angle);
    }
}
