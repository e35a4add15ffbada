// THEORY:
// Every failure the engine can produce falls into one of a small number of
// categories, and each category has a different blast radius:
//
// 1.  **Configuration**: detected before any pixel is touched. Always fatal for
//     the run that supplied the configuration.
// 2.  **Decode**: a single input file could not be opened or is not a
//     two-channel image. Fatal for that file only; the batch runner logs it and
//     moves on to the next file.
// 3.  **Detection**: the spot detector rejected a tile region. Contained at the
//     tile level by the analyzer, which records a zeroed result instead of
//     aborting the whole-image sweep.
// 4.  **Cancelled**: an in-flight sweep was aborted by the caller. The partial
//     grids are discarded, never composed.
//
// A suppressed ratio (a tile failing its cutoff gate) is NOT an error. It is the
// designed output for low-count tiles and never surfaces through this type.

use thiserror::Error;

/// The error type for all fallible operations in this crate.
#[derive(Debug, Error)]
pub enum RatioVisionError {
    /// Invalid configuration, reported before any processing starts.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// An input file failed to open or decode as a two-channel image.
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// The spot detector could not process a tile region.
    #[error("spot detection failed: {0}")]
    Detection(String),

    /// The sweep was cancelled before all tiles were analyzed.
    #[error("sweep cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<tiff::TiffError> for RatioVisionError {
    fn from(err: tiff::TiffError) -> Self {
        RatioVisionError::Decode(err.to_string())
    }
}
