//! Desktop adapters for libre-core
//!
//! This crate plugs real I/O into the platform-independent pipeline:
//! a JSON file for the calibration cache, `reqwest` for the oracle, and the
//! system clock. The `libre-replay` binary uses them to process a captured
//! scan from disk.

pub mod config;
pub mod storage;
pub mod transport;

pub use config::{ConfigError, HostConfig};
pub use storage::FileCalibrationStorage;
pub use transport::ReqwestTransport;

use chrono::{DateTime, Utc};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use libre_core::{
    CalibrationCache, Clock, LinearAlgorithms, MeasurementPipeline, RemoteCalibrationClient,
};

/// Wall-clock time from the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Pipeline wired with the desktop adapters
pub type HostPipeline = MeasurementPipeline<
    CriticalSectionRawMutex,
    FileCalibrationStorage,
    ReqwestTransport,
    SystemClock,
    LinearAlgorithms,
>;

/// Build a pipeline from configuration
pub fn build_pipeline(config: &HostConfig) -> Result<HostPipeline, ConfigError> {
    let transport = ReqwestTransport::new(config.request_timeout())
        .map_err(|e| ConfigError::Transport(e.to_string()))?;
    let storage = FileCalibrationStorage::new(&config.cache_path);

    Ok(MeasurementPipeline::new(
        CalibrationCache::new(storage),
        RemoteCalibrationClient::new(transport, SystemClock),
        LinearAlgorithms,
    ))
}
