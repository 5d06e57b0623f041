pub mod spectral;

use lazy_static::lazy_static;
use num_complex::Complex32;
use parking_lot::Mutex;
use rustfft::{Fft, FftPlanner};
use std::collections::HashMap;
use std::sync::Arc;

pub use spectral::{SpectralFrame, SpectralTransform, WindowKind};

/// Base interface for complex DFT plans of a fixed size.
pub trait DFTBase: Send + Sync {
    /// Forward transform in place.
    fn forward(&self, buffer: &mut [Complex32]);

    /// Unnormalised inverse transform in place.
    fn inverse(&self, buffer: &mut [Complex32]);

    fn name(&self) -> String;
    fn size(&self) -> usize;
}

struct RustFftPlan {
    n: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl DFTBase for RustFftPlan {
    fn forward(&self, buffer: &mut [Complex32]) {
        self.forward.process(buffer);
    }

    fn inverse(&self, buffer: &mut [Complex32]) {
        self.inverse.process(buffer);
    }

    fn name(&self) -> String {
        format!("RustFFT({})", self.n)
    }

    fn size(&self) -> usize {
        self.n
    }
}

lazy_static! {
    static ref PLANNER: Mutex<FftPlanner<f32>> = Mutex::new(FftPlanner::new());
    static ref PLAN_CACHE: Mutex<HashMap<usize, Arc<dyn DFTBase>>> = Mutex::new(HashMap::new());
}

/// Returns a DFT plan for size `n`, building and caching it on first use.
pub fn find_dft(n: usize) -> Arc<dyn DFTBase> {
    // Cached plan lookup.
    {
        let cache = PLAN_CACHE.lock();
        if let Some(plan) = cache.get(&n) {
            return plan.clone();
        }
    }

    let plan: Arc<dyn DFTBase> = {
        let mut planner = PLANNER.lock();
        Arc::new(RustFftPlan {
            n,
            forward: planner.plan_fft_forward(n),
            inverse: planner.plan_fft_inverse(n),
        })
    };
    log::debug!("Planned {}", plan.name());

    // Another thread may have raced us here; keep whichever landed first.
    let mut cache = PLAN_CACHE.lock();
    cache.entry(n).or_insert(plan).clone()
}
