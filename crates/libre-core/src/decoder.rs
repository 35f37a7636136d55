//! Ring-buffer decoding of the scan body.
//!
//! The body holds two ring buffers of 6-byte sample blocks:
//!
//! - **Trend**: 16 blocks at body offset 4, one per minute. `body[2]` is the
//!   slot the sensor will write next.
//! - **History**: 32 blocks at body offset 100, one per 15 minutes. `body[3]`
//!   is the slot the sensor will write next.
//!
//! Neither buffer stores timestamps. Trend samples are dated by counting back
//! one minute per slot from the anchor. History samples are dated from the
//! sensor's minute counter (`body[292..294]`, little-endian), which tells how
//! far into the current 15-minute period the sensor is.

use alloc::vec::Vec;
use chrono::{DateTime, TimeDelta, Utc};
use log::debug;

use crate::calibration::CalibrationCoefficients;
use crate::payload::ScanPayload;

/// Default scaling applied to raw counts when no other slope is configured
pub const DEFAULT_SLOPE: f64 = 0.1;

/// Default offset applied to raw counts when no other offset is configured
pub const DEFAULT_OFFSET: f64 = 0.0;

/// Size of one sample block in bytes
pub const BLOCK_LEN: usize = 6;

/// Body offset of the next-trend-slot cursor
pub const TREND_CURSOR_OFFSET: usize = 2;

/// Body offset of the next-history-slot cursor
pub const HISTORY_CURSOR_OFFSET: usize = 3;

/// Body offset of the low byte of the minute counter
pub const MINUTE_COUNTER_OFFSET: usize = 292;

/// Body offset of the first trend block
pub const TREND_START: usize = 4;

/// Number of blocks in the trend ring
pub const TREND_SLOTS: usize = 16;

/// Body offset of the first history block
pub const HISTORY_START: usize = 100;

/// Number of blocks in the history ring
pub const HISTORY_SLOTS: usize = 32;

/// Minutes between consecutive history blocks
pub const HISTORY_INTERVAL_MINUTES: i32 = 15;

/// Trend samples must be this much newer than the watermark to be kept
pub const WATERMARK_GRACE: TimeDelta = TimeDelta::seconds(30);

/// Latest timestamp a kept sample may not reach: `watermark` plus the grace.
///
/// Saturates at the end of time instead of overflowing.
pub fn watermark_cutoff(watermark: DateTime<Utc>) -> DateTime<Utc> {
    watermark
        .checked_add_signed(WATERMARK_GRACE)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Physical body offset of trend slot `slot` (0 = most recent)
pub fn trend_block_offset(next_trend_block: u8, slot: usize) -> usize {
    ring_block_offset(TREND_START, TREND_SLOTS, next_trend_block, slot)
}

/// Physical body offset of history slot `slot` (0 = most recent)
pub fn history_block_offset(next_history_block: u8, slot: usize) -> usize {
    ring_block_offset(HISTORY_START, HISTORY_SLOTS, next_history_block, slot)
}

fn ring_block_offset(start: usize, slots: usize, next: u8, slot: usize) -> usize {
    // Euclidean remainder keeps garbage cursors (>= slots) inside the ring
    let index = (i64::from(next) - 1 - slot as i64).rem_euclid(slots as i64) as usize;
    start + index * BLOCK_LEN
}

/// Date and minute counter of the most recent history block.
///
/// The sensor writes a history block 3 minutes into each 15-minute period.
/// If the slot predicted from the minute counter is not the sensor's write
/// cursor, the cursor lags one period behind the prediction and the most
/// recent block is 15 minutes younger than the naive estimate.
pub fn most_recent_history(
    minutes_since_start: i32,
    next_history_block: u8,
    anchor: DateTime<Utc>,
) -> (DateTime<Utc>, i32) {
    let predicted_block = ((minutes_since_start - 3) / HISTORY_INTERVAL_MINUTES) % HISTORY_SLOTS as i32;
    let delay = (minutes_since_start - 3) % HISTORY_INTERVAL_MINUTES + 3;
    let counter = minutes_since_start - delay;

    let age_minutes = if predicted_block == i32::from(next_history_block) {
        delay
    } else {
        delay - HISTORY_INTERVAL_MINUTES
    };

    (anchor - TimeDelta::minutes(i64::from(age_minutes)), counter)
}

/// One undecoded sample block with its reconstructed position in time
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample<'c> {
    /// The six raw bytes of the block
    pub block: [u8; BLOCK_LEN],
    /// Reconstructed absolute time of the sample
    pub date: DateTime<Utc>,
    /// Sensor minute counter at the time of the sample (history only)
    pub counter: Option<i32>,
    pub slope: f64,
    pub offset: f64,
    /// Coefficients of the sensor that produced the sample
    pub coefficients: &'c CalibrationCoefficients,
}

impl RawSample<'_> {
    /// 14-bit raw glucose count
    pub fn raw_glucose(&self) -> u16 {
        (u16::from(self.block[1] & 0x1F) << 8) | u16::from(self.block[0])
    }

    /// 14-bit raw temperature count
    pub fn raw_temperature(&self) -> u16 {
        (u16::from(self.block[4] & 0x3F) << 8) | u16::from(self.block[3])
    }
}

/// Decodes the trend and history rings of a scan.
///
/// Stateless apart from the scaling constants copied into every sample.
#[derive(Debug, Clone, Copy)]
pub struct SensorBlobDecoder {
    slope: f64,
    offset: f64,
}

impl Default for SensorBlobDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorBlobDecoder {
    pub const fn new() -> Self {
        Self::with_scaling(DEFAULT_SLOPE, DEFAULT_OFFSET)
    }

    /// Use a different slope/offset for the samples this decoder produces
    pub const fn with_scaling(slope: f64, offset: f64) -> Self {
        Self { slope, offset }
    }

    /// All 16 trend samples, most recent first, dated back from `anchor`
    pub fn trend_candidates<'c>(
        &self,
        payload: &ScanPayload<'_>,
        anchor: DateTime<Utc>,
        coefficients: &'c CalibrationCoefficients,
    ) -> Vec<RawSample<'c>> {
        let body = payload.body();
        let next_trend_block = body[TREND_CURSOR_OFFSET];

        (0..TREND_SLOTS)
            .map(|slot| {
                let offset = trend_block_offset(next_trend_block, slot);
                let date = anchor - TimeDelta::minutes(slot as i64);
                self.sample(&body[offset..offset + BLOCK_LEN], date, None, coefficients)
            })
            .collect()
    }

    /// Trend samples strictly newer than `watermark` plus 30 seconds
    pub fn trend<'c>(
        &self,
        payload: &ScanPayload<'_>,
        anchor: DateTime<Utc>,
        watermark: DateTime<Utc>,
        coefficients: &'c CalibrationCoefficients,
    ) -> Vec<RawSample<'c>> {
        let cutoff = watermark_cutoff(watermark);
        let mut samples = self.trend_candidates(payload, anchor, coefficients);
        samples.retain(|sample| sample.date > cutoff);

        debug!(
            "Trend window: {} of {} samples newer than {}",
            samples.len(),
            TREND_SLOTS,
            cutoff
        );
        samples
    }

    /// All 32 history samples, most recent first, dated from the minute counter
    pub fn history<'c>(
        &self,
        payload: &ScanPayload<'_>,
        anchor: DateTime<Utc>,
        coefficients: &'c CalibrationCoefficients,
    ) -> Vec<RawSample<'c>> {
        let body = payload.body();
        let next_history_block = body[HISTORY_CURSOR_OFFSET];
        let minutes_since_start = i32::from(u16::from_le_bytes([
            body[MINUTE_COUNTER_OFFSET],
            body[MINUTE_COUNTER_OFFSET + 1],
        ]));

        let (most_recent, most_recent_counter) =
            most_recent_history(minutes_since_start, next_history_block, anchor);

        debug!(
            "History window: cursor {}, minute counter {}, newest block at {}",
            next_history_block, minutes_since_start, most_recent
        );

        (0..HISTORY_SLOTS)
            .map(|slot| {
                let offset = history_block_offset(next_history_block, slot);
                let minutes_back = HISTORY_INTERVAL_MINUTES * slot as i32;
                let date = most_recent - TimeDelta::minutes(i64::from(minutes_back));
                let counter = most_recent_counter - minutes_back;
                self.sample(
                    &body[offset..offset + BLOCK_LEN],
                    date,
                    Some(counter),
                    coefficients,
                )
            })
            .collect()
    }

    fn sample<'c>(
        &self,
        bytes: &[u8],
        date: DateTime<Utc>,
        counter: Option<i32>,
        coefficients: &'c CalibrationCoefficients,
    ) -> RawSample<'c> {
        let mut block = [0u8; BLOCK_LEN];
        block.copy_from_slice(bytes);

        RawSample {
            block,
            date,
            counter,
            slope: self.slope,
            offset: self.offset,
            coefficients,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{BODY_START, MIN_PAYLOAD_LEN};
    use alloc::vec;
    use chrono::TimeZone;

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn coefficients() -> CalibrationCoefficients {
        CalibrationCoefficients::new(0.001, 0.0, 0.01, -20.0, 1, "0M0008B8CM")
    }

    /// Scan whose every block is tagged with its ring slot in byte 0
    fn tagged_payload(next_trend: u8, next_history: u8, minutes: u16) -> Vec<u8> {
        let mut bytes = vec![0u8; MIN_PAYLOAD_LEN];
        let body = &mut bytes[BODY_START..];
        body[TREND_CURSOR_OFFSET] = next_trend;
        body[HISTORY_CURSOR_OFFSET] = next_history;
        body[MINUTE_COUNTER_OFFSET..MINUTE_COUNTER_OFFSET + 2].copy_from_slice(&minutes.to_le_bytes());
        for slot in 0..TREND_SLOTS {
            body[TREND_START + slot * BLOCK_LEN] = slot as u8;
        }
        for slot in 0..HISTORY_SLOTS {
            body[HISTORY_START + slot * BLOCK_LEN] = 0x80 | slot as u8;
        }
        bytes
    }

    #[test]
    fn test_trend_offsets_stay_in_ring() {
        for next in 0..16u8 {
            for slot in 0..TREND_SLOTS {
                let offset = trend_block_offset(next, slot);
                assert!((TREND_START..HISTORY_START).contains(&offset));
                assert!(offset + BLOCK_LEN <= HISTORY_START);
                assert_eq!((offset - TREND_START) % BLOCK_LEN, 0);
            }
        }
    }

    #[test]
    fn test_trend_offset_wraps_at_ring_boundary() {
        assert_eq!(trend_block_offset(0, 0), 4 + 15 * 6);
        assert_eq!(trend_block_offset(1, 0), 4);
        assert_eq!(trend_block_offset(1, 1), 4 + 15 * 6);
        assert_eq!(trend_block_offset(5, 15), 4 + 5 * 6);
    }

    #[test]
    fn test_garbage_cursor_stays_in_ring() {
        for slot in 0..TREND_SLOTS {
            let offset = trend_block_offset(200, slot);
            assert!((TREND_START..HISTORY_START).contains(&offset));
        }
        for slot in 0..HISTORY_SLOTS {
            let offset = history_block_offset(255, slot);
            assert!((HISTORY_START..HISTORY_START + HISTORY_SLOTS * BLOCK_LEN).contains(&offset));
        }
    }

    #[test]
    fn test_history_offsets() {
        assert_eq!(history_block_offset(0, 0), 100 + 31 * 6);
        assert_eq!(history_block_offset(1, 0), 100);
        assert_eq!(history_block_offset(10, 3), 100 + 6 * 6);
        for next in 0..32u8 {
            for slot in 0..HISTORY_SLOTS {
                let offset = history_block_offset(next, slot);
                assert!(offset + BLOCK_LEN <= 292);
            }
        }
    }

    #[test]
    fn test_history_cursor_lag_correction() {
        // 997 = 66 * 15 + 7, so the predicted slot is 66 % 32 = 2 and the delay 10
        let (in_step, counter) = most_recent_history(1000, 2, anchor());
        assert_eq!(in_step, anchor() - TimeDelta::minutes(10));
        assert_eq!(counter, 990);

        let (lagging, lagging_counter) = most_recent_history(1000, 3, anchor());
        assert_eq!(lagging, anchor() + TimeDelta::minutes(5));
        assert_eq!(lagging_counter, 990);

        assert_eq!(lagging - in_step, TimeDelta::minutes(15));
    }

    #[test]
    fn test_history_delay_bounds() {
        for minutes in 3..2000 {
            let (date, counter) = most_recent_history(minutes, 0xFF, anchor());
            let delay = minutes - counter;
            assert!((3..18).contains(&delay), "delay {} at {}", delay, minutes);
            assert_eq!(anchor() - date, TimeDelta::minutes(i64::from(delay - 15)));
        }
    }

    #[test]
    fn test_trend_candidates() {
        let bytes = tagged_payload(1, 0, 0);
        let payload = ScanPayload::parse(&bytes).unwrap();
        let coefficients = coefficients();

        let samples = SensorBlobDecoder::new().trend_candidates(&payload, anchor(), &coefficients);

        assert_eq!(samples.len(), 16);
        // Cursor 1: slot 0 is the newest, slot 15 the one before it
        assert_eq!(samples[0].block[0], 0);
        assert_eq!(samples[1].block[0], 15);
        assert_eq!(samples[15].block[0], 1);
        for (k, sample) in samples.iter().enumerate() {
            assert_eq!(sample.date, anchor() - TimeDelta::minutes(k as i64));
            assert_eq!(sample.counter, None);
            assert_eq!(sample.slope, DEFAULT_SLOPE);
            assert_eq!(sample.offset, DEFAULT_OFFSET);
            assert_eq!(sample.coefficients.serial_number(), "0M0008B8CM");
        }
    }

    #[test]
    fn test_trend_watermark_filter() {
        let bytes = tagged_payload(7, 0, 0);
        let payload = ScanPayload::parse(&bytes).unwrap();
        let coefficients = coefficients();
        let watermark = anchor() - TimeDelta::minutes(5);

        let samples = SensorBlobDecoder::new().trend(&payload, anchor(), watermark, &coefficients);

        // anchor - k min > anchor - 4:30 only for k <= 4
        assert_eq!(samples.len(), 5);
        assert!(samples.iter().all(|s| s.date > watermark + WATERMARK_GRACE));
    }

    #[test]
    fn test_trend_watermark_in_future_keeps_nothing() {
        let bytes = tagged_payload(7, 0, 0);
        let payload = ScanPayload::parse(&bytes).unwrap();
        let coefficients = coefficients();

        let samples = SensorBlobDecoder::new().trend(&payload, anchor(), anchor(), &coefficients);

        assert!(samples.is_empty());
    }

    #[test]
    fn test_watermark_at_end_of_time_keeps_nothing() {
        assert_eq!(watermark_cutoff(DateTime::<Utc>::MAX_UTC), DateTime::<Utc>::MAX_UTC);

        let bytes = tagged_payload(7, 0, 0);
        let payload = ScanPayload::parse(&bytes).unwrap();
        let coefficients = coefficients();

        let samples =
            SensorBlobDecoder::new().trend(&payload, anchor(), DateTime::<Utc>::MAX_UTC, &coefficients);

        assert!(samples.is_empty());
    }

    #[test]
    fn test_history_samples() {
        let bytes = tagged_payload(0, 2, 1000);
        let payload = ScanPayload::parse(&bytes).unwrap();
        let coefficients = coefficients();

        let samples = SensorBlobDecoder::new().history(&payload, anchor(), &coefficients);

        assert_eq!(samples.len(), 32);
        assert_eq!(samples[0].block[0], 0x80 | 1);
        assert_eq!(samples[1].block[0], 0x80);
        assert_eq!(samples[2].block[0], 0x80 | 31);
        assert_eq!(samples[0].date, anchor() - TimeDelta::minutes(10));
        assert_eq!(samples[0].counter, Some(990));
        for pair in samples.windows(2) {
            assert_eq!(pair[0].date - pair[1].date, TimeDelta::minutes(15));
            assert_eq!(pair[0].counter.unwrap() - pair[1].counter.unwrap(), 15);
        }
    }

    #[test]
    fn test_custom_scaling() {
        let bytes = tagged_payload(0, 0, 0);
        let payload = ScanPayload::parse(&bytes).unwrap();
        let coefficients = coefficients();

        let samples = SensorBlobDecoder::with_scaling(0.2, 5.0).history(&payload, anchor(), &coefficients);

        assert!(samples.iter().all(|s| s.slope == 0.2 && s.offset == 5.0));
    }

    #[test]
    fn test_raw_counts() {
        let coefficients = coefficients();
        let sample = RawSample {
            block: [0x34, 0xE2, 0x00, 0x78, 0xC6, 0x00],
            date: anchor(),
            counter: None,
            slope: DEFAULT_SLOPE,
            offset: DEFAULT_OFFSET,
            coefficients: &coefficients,
        };

        assert_eq!(sample.raw_glucose(), 0x0234);
        assert_eq!(sample.raw_temperature(), 0x0678);
    }
}
