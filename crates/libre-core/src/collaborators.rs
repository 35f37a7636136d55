//! Traits for the pieces the pipeline delegates to.
//!
//! The concentration formula, the smoothing filter and the lifecycle
//! classifier are owned elsewhere; the pipeline only fixes their signatures.
//! [`LinearAlgorithms`] is a minimal implementation of all three, good enough
//! to replay scans without the proprietary formula.

use alloc::vec::Vec;
use chrono::{DateTime, Utc};

use crate::decoder::RawSample;
use crate::pipeline::GlucoseReading;

/// Source of the current wall-clock time
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Maps the payload status byte to a lifecycle state
pub trait SensorStateClassifier {
    type State: Clone + core::fmt::Debug;

    fn classify(&self, status_byte: u8) -> Self::State;
}

/// Converts one raw sample into a glucose concentration
pub trait CalibrationFormula {
    fn glucose(&self, sample: &RawSample<'_>) -> f64;
}

/// Unsmoothed concentration at a point in time, input to [`SmoothingFilter`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawGlucose {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Smooths a most-recent-first series.
///
/// Implementations must keep the order of their input.
pub trait SmoothingFilter {
    fn smooth(&self, series: &[RawGlucose]) -> Vec<GlucoseReading>;
}

/// Lifecycle states reported in the status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibreSensorState {
    NotYetStarted,
    Starting,
    Ready,
    Expired,
    Shutdown,
    Failure,
    Unknown,
}

impl LibreSensorState {
    pub const fn from_status_byte(status: u8) -> Self {
        match status {
            0x01 => Self::NotYetStarted,
            0x02 => Self::Starting,
            0x03 => Self::Ready,
            0x04 => Self::Expired,
            0x05 => Self::Shutdown,
            0x06 => Self::Failure,
            _ => Self::Unknown,
        }
    }

    /// Get a short label for display
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotYetStarted => "not yet started",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Expired => "expired",
            Self::Shutdown => "shut down",
            Self::Failure => "failure",
            Self::Unknown => "unknown",
        }
    }
}

/// Status-byte classifier, linear raw-count formula and pass-through smoothing.
///
/// The formula is `raw_glucose * slope + offset` using the sample's scaling
/// constants; the oracle coefficients are not applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearAlgorithms;

impl SensorStateClassifier for LinearAlgorithms {
    type State = LibreSensorState;

    fn classify(&self, status_byte: u8) -> LibreSensorState {
        LibreSensorState::from_status_byte(status_byte)
    }
}

impl CalibrationFormula for LinearAlgorithms {
    fn glucose(&self, sample: &RawSample<'_>) -> f64 {
        f64::from(sample.raw_glucose()) * sample.slope + sample.offset
    }
}

impl SmoothingFilter for LinearAlgorithms {
    fn smooth(&self, series: &[RawGlucose]) -> Vec<GlucoseReading> {
        series
            .iter()
            .map(|point| GlucoseReading {
                timestamp: point.timestamp,
                raw_glucose: point.value,
                smoothed_glucose: point.value,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_byte_classification() {
        assert_eq!(LibreSensorState::from_status_byte(0x03), LibreSensorState::Ready);
        assert_eq!(LibreSensorState::from_status_byte(0x05), LibreSensorState::Shutdown);
        assert_eq!(LibreSensorState::from_status_byte(0x00), LibreSensorState::Unknown);
        assert_eq!(LibreSensorState::from_status_byte(0xFF), LibreSensorState::Unknown);
    }
}
