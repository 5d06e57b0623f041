pub mod calibration;
pub mod smoothing;
pub mod srp_phat;
pub mod steering;

pub use calibration::{Calibration, CalibrationReport};
pub use smoothing::{circular_distance, shortest_arc, wrap_deg, AngleSmoother};
pub use srp_phat::{Confidence, DirectionEstimator, DoaEstimate, EstimatorConfig};
pub use steering::{SharedSteering, SteeringTable};
