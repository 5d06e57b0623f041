use thiserror::Error;

/// Failures surfaced by the DOA / beamforming pipeline.
///
/// Silence, low confidence and stale estimates are not errors: they are
/// reported as explicit states on the produced values.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid geometry, resolution, sample rate or other startup value.
    #[error("configuration: {0}")]
    Configuration(String),

    /// Block shape does not match the configured pipeline shape. The block is dropped.
    #[error(
        "block shape {channels}x{samples} does not match configured {expected_channels}x{expected_samples}"
    )]
    InvalidBlockSize {
        expected_channels: usize,
        expected_samples: usize,
        channels: usize,
        samples: usize,
    },

    /// Block was captured at a rate other than the configured one. The block is dropped.
    #[error("block sampled at {got} Hz, pipeline runs at {expected} Hz")]
    SampleRateMismatch { expected: u32, got: u32 },

    /// Sequence index did not advance. The block is dropped.
    #[error("block {got} arrived after block {last}")]
    OutOfOrder { last: u64, got: u64 },

    /// A required table or worker has not been built yet.
    #[error("{0} is not ready")]
    NotReady(&'static str),

    #[error("steering table covers {table} microphones, frame carries {frame} channels")]
    GeometryMismatch { table: usize, frame: usize },

    #[error("processing worker panicked")]
    WorkerPanicked,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("wav: {0}")]
    Wav(#[from] hound::Error),

    #[error("config parse: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl Error {
    /// True for failures confined to a single block; the pipeline keeps running.
    pub fn is_per_block(&self) -> bool {
        matches!(
            self,
            Error::InvalidBlockSize { .. }
                | Error::SampleRateMismatch { .. }
                | Error::OutOfOrder { .. }
                | Error::GeometryMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
