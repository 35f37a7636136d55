//! Calibration coefficient acquisition.
//!
//! Coefficients are resolved cache-first: [`CalibrationCache`] holds the one
//! record for the most recently calibrated sensor, and
//! [`RemoteCalibrationClient`] asks the oracle when that record belongs to a
//! different serial number (or there is none).

mod cache;
mod remote;

pub use cache::{CalibrationCache, CalibrationStorage, MemoryCalibrationStorage};
pub use remote::{HttpTransport, OracleConfig, RemoteCalibrationClient};

use alloc::string::String;
use serde::{Deserialize, Serialize};

/// Reserved multiplier, always 1.0
pub const EXTRA_SLOPE: f64 = 1.0;

/// Reserved offset, always 0.0
pub const EXTRA_OFFSET: f64 = 0.0;

/// Per-sensor coefficients for the temperature-compensated glucose formula.
///
/// The serialized form is the persisted cache record, so field names follow
/// the record format rather than Rust naming.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CalibrationCoefficients {
    #[serde(rename = "slope_slope")]
    slope_slope: f64,
    #[serde(rename = "slope_offset")]
    slope_offset: f64,
    #[serde(rename = "offset_slope")]
    offset_slope: f64,
    #[serde(rename = "offset_offset")]
    offset_offset: f64,
    #[serde(rename = "isValidForFooterWithReverseCRCs")]
    footer_crc_validity: i32,
    #[serde(rename = "extraSlope")]
    extra_slope: f64,
    #[serde(rename = "extraOffset")]
    extra_offset: f64,
    #[serde(rename = "sensorSerialNumber")]
    serial_number: String,
}

impl CalibrationCoefficients {
    /// Bind a set of oracle coefficients to a sensor serial number
    pub fn new(
        slope_slope: f64,
        slope_offset: f64,
        offset_slope: f64,
        offset_offset: f64,
        footer_crc_validity: i32,
        serial_number: impl Into<String>,
    ) -> Self {
        Self {
            slope_slope,
            slope_offset,
            offset_slope,
            offset_offset,
            footer_crc_validity,
            extra_slope: EXTRA_SLOPE,
            extra_offset: EXTRA_OFFSET,
            serial_number: serial_number.into(),
        }
    }

    pub fn slope_slope(&self) -> f64 {
        self.slope_slope
    }

    pub fn slope_offset(&self) -> f64 {
        self.slope_offset
    }

    pub fn offset_slope(&self) -> f64 {
        self.offset_slope
    }

    pub fn offset_offset(&self) -> f64 {
        self.offset_offset
    }

    /// Whether the coefficients apply to footers with reversed CRCs (1) or not (0)
    pub fn footer_crc_validity(&self) -> i32 {
        self.footer_crc_validity
    }

    pub fn extra_slope(&self) -> f64 {
        self.extra_slope
    }

    pub fn extra_offset(&self) -> f64 {
        self.extra_offset
    }

    /// Serial number of the sensor these coefficients were fetched for
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }
}
