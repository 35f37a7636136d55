//! Scan-to-readings pipeline.
//!
//! One invocation turns one scan into a de-duplicated, most-recent-first
//! glucose series:
//!
//! 1. Classify the status byte and read the sensor age
//! 2. Resolve calibration coefficients (cache, then oracle)
//! 3. Decode the trend ring, keep samples newer than the watermark
//! 4. Merge the trend readings into the result
//! 5. Decode the history ring anchored at the oldest accepted trend reading
//! 6. Merge the history readings into the result
//!
//! Only coefficient resolution can fail an invocation. When it does, the
//! outcome carries the error and no readings at all.

use alloc::vec::Vec;
use chrono::{DateTime, TimeDelta, Utc};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use log::{debug, error, info};

use crate::calibration::{
    CalibrationCache, CalibrationCoefficients, CalibrationStorage, HttpTransport, OracleConfig,
    RemoteCalibrationClient,
};
use crate::collaborators::{
    CalibrationFormula, Clock, RawGlucose, SensorStateClassifier, SmoothingFilter,
};
use crate::decoder::{RawSample, SensorBlobDecoder, watermark_cutoff};
use crate::error::{PipelineError, PipelineResult};
use crate::payload::ScanPayload;

/// Accepted readings are at least this far apart (5 minutes less 10 seconds)
pub const MIN_READING_SPACING: TimeDelta = TimeDelta::seconds(290);

/// Initial upper bound for accepted timestamps, relative to the anchor
pub const ANCHOR_LOOKAHEAD: TimeDelta = TimeDelta::minutes(5);

/// One glucose value in the output series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlucoseReading {
    pub timestamp: DateTime<Utc>,
    pub raw_glucose: f64,
    pub smoothed_glucose: f64,
}

/// Result of one pipeline invocation.
///
/// `readings` is empty whenever `error` is set.
#[derive(Debug, Clone)]
pub struct ScanOutcome<St> {
    /// Accepted readings, most recent first
    pub readings: Vec<GlucoseReading>,
    pub sensor_state: St,
    /// Minutes since the sensor was activated
    pub sensor_age_minutes: u16,
    pub error: Option<PipelineError>,
}

/// Accumulates readings under the minimum-spacing and watermark rules
struct SeriesMerger {
    cutoff: DateTime<Utc>,
    last_accepted: DateTime<Utc>,
    readings: Vec<GlucoseReading>,
}

impl SeriesMerger {
    fn new(watermark: DateTime<Utc>, upper_bound: DateTime<Utc>) -> Self {
        Self {
            cutoff: watermark_cutoff(watermark),
            last_accepted: upper_bound,
            readings: Vec::new(),
        }
    }

    /// Merge a most-recent-first series, returning how many readings were accepted.
    ///
    /// The walk ends at the first reading that is not newer than the
    /// watermark cutoff. Readings too close to the previously accepted one are
    /// skipped.
    fn absorb(&mut self, candidates: Vec<GlucoseReading>) -> usize {
        let before = self.readings.len();

        for reading in candidates {
            if reading.timestamp <= self.cutoff {
                break;
            }

            if reading.timestamp < self.last_accepted - MIN_READING_SPACING {
                self.last_accepted = reading.timestamp;
                self.readings.push(reading);
            }
        }

        self.readings.len() - before
    }
}

/// Orchestrates calibration, decoding and merging for one scan at a time.
///
/// The cache sits behind an async mutex that is held for the whole
/// load → fetch → store sequence, so concurrent invocations never fetch the
/// same coefficients twice or overwrite each other's record.
pub struct MeasurementPipeline<M, S, T, C, A>
where
    M: RawMutex,
    S: CalibrationStorage,
    T: HttpTransport,
    C: Clock,
    A: SensorStateClassifier + CalibrationFormula + SmoothingFilter,
{
    cache: Mutex<M, CalibrationCache<S>>,
    client: RemoteCalibrationClient<T, C>,
    decoder: SensorBlobDecoder,
    algorithms: A,
}

impl<M, S, T, C, A> MeasurementPipeline<M, S, T, C, A>
where
    M: RawMutex,
    S: CalibrationStorage,
    T: HttpTransport,
    C: Clock,
    A: SensorStateClassifier + CalibrationFormula + SmoothingFilter,
{
    pub fn new(
        cache: CalibrationCache<S>,
        client: RemoteCalibrationClient<T, C>,
        algorithms: A,
    ) -> Self {
        Self {
            cache: Mutex::new(cache),
            client,
            decoder: SensorBlobDecoder::new(),
            algorithms,
        }
    }

    /// Replace the default decoder (e.g. to change the sample scaling)
    pub fn with_decoder(mut self, decoder: SensorBlobDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn cache(&self) -> &Mutex<M, CalibrationCache<S>> {
        &self.cache
    }

    pub fn client(&self) -> &RemoteCalibrationClient<T, C> {
        &self.client
    }

    /// Process a scan taken just now
    pub async fn run(
        &self,
        payload: &[u8],
        watermark: DateTime<Utc>,
        serial: &str,
        oracle: &OracleConfig,
    ) -> PipelineResult<ScanOutcome<A::State>> {
        let anchor = self.client.clock().now();
        self.run_at(payload, watermark, serial, oracle, anchor).await
    }

    /// Process a scan taken at `anchor`
    ///
    /// Fails only for payloads too short to decode. Calibration failures are
    /// reported through [`ScanOutcome::error`].
    pub async fn run_at(
        &self,
        payload: &[u8],
        watermark: DateTime<Utc>,
        serial: &str,
        oracle: &OracleConfig,
        anchor: DateTime<Utc>,
    ) -> PipelineResult<ScanOutcome<A::State>> {
        let payload = ScanPayload::parse(payload)?;
        let sensor_state = self.algorithms.classify(payload.status_byte());
        let sensor_age_minutes = payload.sensor_age_minutes();

        let coefficients = match self.resolve_coefficients(&payload, serial, oracle).await {
            Ok(coefficients) => coefficients,
            Err(e) => {
                error!("No calibration for sensor {}: {}", serial, e);
                return Ok(ScanOutcome {
                    readings: Vec::new(),
                    sensor_state,
                    sensor_age_minutes,
                    error: Some(e),
                });
            }
        };

        let mut merger = SeriesMerger::new(watermark, anchor + ANCHOR_LOOKAHEAD);

        let trend = self.decoder.trend(&payload, anchor, watermark, &coefficients);
        let trend_accepted = merger.absorb(self.readings(&trend));

        let history_anchor = if trend_accepted == 0 {
            anchor + ANCHOR_LOOKAHEAD
        } else {
            merger.last_accepted
        };
        merger.last_accepted = history_anchor;

        let history = self.decoder.history(&payload, history_anchor, &coefficients);
        let history_accepted = merger.absorb(self.readings(&history));

        info!(
            "Sensor {}: {} trend + {} history readings, age {} min",
            serial, trend_accepted, history_accepted, sensor_age_minutes
        );

        Ok(ScanOutcome {
            readings: merger.readings,
            sensor_state,
            sensor_age_minutes,
            error: None,
        })
    }

    /// Cached coefficients for `serial`, fetching and caching them on a miss
    async fn resolve_coefficients(
        &self,
        payload: &ScanPayload<'_>,
        serial: &str,
        oracle: &OracleConfig,
    ) -> PipelineResult<CalibrationCoefficients> {
        let mut cache = self.cache.lock().await;

        if let Some(coefficients) = cache.load(serial).await {
            debug!("Using cached calibration for sensor {}", serial);
            return Ok(coefficients);
        }

        let coefficients = self.client.fetch(payload, serial, oracle).await?;

        // Not fatal: the next scan simply asks the oracle again
        if let Err(e) = cache.store(&coefficients).await {
            error!("Failed to cache calibration for sensor {}: {}", serial, e);
        }

        Ok(coefficients)
    }

    /// Apply the formula, then the smoothing filter
    fn readings(&self, samples: &[RawSample<'_>]) -> Vec<GlucoseReading> {
        let series: Vec<RawGlucose> = samples
            .iter()
            .map(|sample| RawGlucose {
                timestamp: sample.date,
                value: self.algorithms.glucose(sample),
            })
            .collect();

        self.algorithms.smooth(&series)
    }
}
