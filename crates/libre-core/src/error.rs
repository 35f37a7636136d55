//! Error types for the scan pipeline

use alloc::string::String;
use thiserror_no_std::Error;

/// Failures that abort a pipeline invocation.
///
/// The `Display` form of these errors is the human readable description
/// handed back to callers alongside an empty reading list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The calibration oracle could not be reached
    #[error("{0}")]
    Transport(String),

    /// The oracle answered with something other than the expected JSON shape.
    /// Carries the raw response text for diagnostics.
    #[error("{0}")]
    Decode(String),

    /// The oracle answered but had no slope parameters for this payload
    #[error("slope is nil")]
    MissingCalibration,

    /// The payload is too short to hold every fixed offset
    #[error("Malformed payload: expected at least {expected} bytes, got {actual}")]
    MalformedPayload {
        /// Minimum payload length
        expected: usize,
        /// Length of the payload that was supplied
        actual: usize,
    },
}

/// Failures reading or writing the calibration cache.
///
/// These are never fatal: the pipeline logs them and behaves as if the cache
/// were empty.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(String),
    #[error("Cache serialization error: {0}")]
    Serialize(String),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
