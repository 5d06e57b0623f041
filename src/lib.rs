//! Real-time direction-of-arrival estimation and delay-and-sum beamforming
//! for small microphone arrays.

pub mod audio;
pub mod beam;
pub mod config;
pub mod doa;
pub mod error;
pub mod fft;
pub mod geometry;
pub mod history;
pub mod pipeline;

pub use audio::{AudioBlock, DropPolicy, PushOutcome, SourceSimulator};
pub use beam::{BeamMode, BeamformedFrame, Beamformer};
pub use config::PipelineConfig;
pub use doa::{
    Calibration, CalibrationReport, Confidence, DirectionEstimator, DoaEstimate, SharedSteering,
    SteeringTable,
};
pub use error::{Error, Result};
pub use geometry::ArrayGeometry;
pub use history::{
    write_wav, EstimateTrack, HistoryBuffer, HistorySnapshot, SpectrogramHistory,
    SpectrogramSnapshot, SpectrumRow,
};
pub use pipeline::{BlockOutput, Engine, PipelineStats, Processor, StatsSnapshot};
