pub mod block;
pub mod queue;
pub mod simulate;

pub use block::AudioBlock;
pub use queue::{BlockQueue, DropPolicy, PushOutcome};
pub use simulate::SourceSimulator;
