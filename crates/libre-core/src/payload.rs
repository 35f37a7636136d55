//! Validated view over a raw sensor scan.
//!
//! Layout of a scan (all offsets in bytes):
//! - header: 0..24 (status byte at 4)
//! - body: 24..320 (trend ring, history ring, minute counter)
//! - footer: 320..344
//!
//! Sensor age is stored little-endian in bytes 316 and 317, which sit at the
//! tail of the body region.

use crate::error::{PipelineError, PipelineResult};

/// Minimum number of bytes a scan must hold
pub const MIN_PAYLOAD_LEN: usize = 344;

/// Offset of the sensor lifecycle status byte
pub const STATUS_BYTE_OFFSET: usize = 4;

/// Start of the body region
pub const BODY_START: usize = 24;

/// End (exclusive) of the body region
pub const BODY_END: usize = 320;

/// Length of the body region
pub const BODY_LEN: usize = BODY_END - BODY_START;

/// Offset of the low byte of the sensor age, in minutes
pub const SENSOR_AGE_OFFSET: usize = 316;

/// A scan that is long enough to index every fixed offset.
///
/// Constructing one is the only length check the decoder relies on; every
/// accessor below indexes without further bounds reasoning.
#[derive(Debug, Clone, Copy)]
pub struct ScanPayload<'a> {
    bytes: &'a [u8],
}

impl<'a> ScanPayload<'a> {
    /// Validate the length of a raw scan
    pub fn parse(bytes: &'a [u8]) -> PipelineResult<Self> {
        if bytes.len() < MIN_PAYLOAD_LEN {
            return Err(PipelineError::MalformedPayload {
                expected: MIN_PAYLOAD_LEN,
                actual: bytes.len(),
            });
        }

        Ok(Self { bytes })
    }

    /// The full scan, including header and footer
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Raw lifecycle status byte, for the state classifier
    pub fn status_byte(&self) -> u8 {
        self.bytes[STATUS_BYTE_OFFSET]
    }

    /// Minutes since sensor activation as reported by the sensor
    pub fn sensor_age_minutes(&self) -> u16 {
        u16::from_le_bytes([
            self.bytes[SENSOR_AGE_OFFSET],
            self.bytes[SENSOR_AGE_OFFSET + 1],
        ])
    }

    /// The body region holding both ring buffers
    ///
    /// Always exactly [`BODY_LEN`] bytes long.
    pub fn body(&self) -> &'a [u8] {
        &self.bytes[BODY_START..BODY_END]
    }
}
