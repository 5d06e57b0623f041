pub mod engine;
pub mod processor;
pub mod stats;

pub use engine::Engine;
pub use processor::{BlockOutput, Processor};
pub use stats::{Counter, PipelineStats, StatsSnapshot};
