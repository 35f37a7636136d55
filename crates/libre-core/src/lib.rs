//! Platform-independent core library for decoding glucose sensor scans
//!
//! This crate contains all platform-agnostic logic for turning a raw 344-byte
//! sensor scan into a series of glucose readings: payload validation, ring
//! buffer decoding, calibration coefficient acquisition and caching, and the
//! merge pipeline that produces the final series.
//!
//! It is `#![no_std]` with `extern crate alloc`. Everything that touches the
//! outside world (the cache file, the HTTP oracle, the wall clock) is reached
//! through a trait, so the crate runs unchanged on a desktop host and in tests.
//!
//! # Architecture
//!
//! ```text
//! MeasurementPipeline
//!   ├── CalibrationCache ──── CalibrationStorage (trait)
//!   ├── RemoteCalibrationClient ── HttpTransport + Clock (traits)
//!   ├── SensorBlobDecoder
//!   └── SensorStateClassifier + CalibrationFormula + SmoothingFilter (traits)
//! ```

#![no_std]

extern crate alloc;

pub mod calibration;
pub mod collaborators;
pub mod decoder;
pub mod error;
pub mod payload;
pub mod pipeline;

pub use calibration::{
    CalibrationCache, CalibrationCoefficients, CalibrationStorage, HttpTransport,
    MemoryCalibrationStorage, OracleConfig, RemoteCalibrationClient,
};
pub use collaborators::{
    CalibrationFormula, Clock, LibreSensorState, LinearAlgorithms, RawGlucose,
    SensorStateClassifier, SmoothingFilter,
};
pub use decoder::{RawSample, SensorBlobDecoder};
pub use error::{CacheError, PipelineError};
pub use payload::ScanPayload;
pub use pipeline::{GlucoseReading, MeasurementPipeline, ScanOutcome};
