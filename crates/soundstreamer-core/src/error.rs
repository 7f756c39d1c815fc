//! Error types for SoundStreamer core.

use thiserror::Error;

/// Core error type for SoundStreamer operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Please select at least one source application")]
    NoSources,

    #[error("Please select at least one target microphone")]
    NoTargets,

    #[error("Please select at least one link to remove")]
    NoLinksSelected,
}

/// Result type alias for SoundStreamer core operations.
pub type Result<T> = std::result::Result<T, Error>;
