use alloc::string::ToString;
use alloc::vec::Vec;
use log::{debug, warn};

use super::CalibrationCoefficients;
use crate::error::CacheError;

/// Backing store for the single cached calibration record.
///
/// Implementations only move bytes; encoding and the serial-number check live
/// in [`CalibrationCache`].
pub trait CalibrationStorage {
    /// Read the persisted record
    ///
    /// Returns `Ok(None)` when nothing has been stored yet.
    fn read(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>, CacheError>>;

    /// Replace the persisted record
    fn write(&mut self, record: &[u8]) -> impl Future<Output = Result<(), CacheError>>;
}

/// Single-slot cache of calibration coefficients keyed by serial number.
///
/// At most one record exists. Storing coefficients for a new sensor replaces
/// the previous sensor's record; loading for any other serial is a miss.
pub struct CalibrationCache<S: CalibrationStorage> {
    storage: S,
}

impl<S: CalibrationStorage> CalibrationCache<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Load the cached coefficients for `serial`
    ///
    /// Missing, unreadable and mismatched records all come back as `None`.
    pub async fn load(&mut self, serial: &str) -> Option<CalibrationCoefficients> {
        let record = match self.storage.read().await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("No cached calibration record");
                return None;
            }
            Err(e) => {
                warn!("Failed to read cached calibration: {}", e);
                return None;
            }
        };

        let coefficients: CalibrationCoefficients = match serde_json::from_slice(&record) {
            Ok(coefficients) => coefficients,
            Err(e) => {
                warn!("Discarding unparseable calibration record: {}", e);
                return None;
            }
        };

        if coefficients.serial_number() != serial {
            debug!(
                "Cached calibration is for sensor {}, not {}",
                coefficients.serial_number(),
                serial
            );
            return None;
        }

        Some(coefficients)
    }

    /// Overwrite the cached record with `coefficients`
    pub async fn store(&mut self, coefficients: &CalibrationCoefficients) -> Result<(), CacheError> {
        let record = serde_json::to_vec(coefficients)
            .map_err(|e| CacheError::Serialize(e.to_string()))?;

        self.storage.write(&record).await
    }

    /// Access the storage backend
    pub fn storage(&self) -> &S {
        &self.storage
    }
}

/// In-memory storage backend.
///
/// Useful on targets without a filesystem and in tests. Writes can be made to
/// fail to exercise the non-fatal cache path.
#[derive(Debug, Default)]
pub struct MemoryCalibrationStorage {
    record: Option<Vec<u8>>,
    fail_writes: bool,
    writes: usize,
}

impl MemoryCalibrationStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an already persisted record
    pub fn with_record(record: Vec<u8>) -> Self {
        Self {
            record: Some(record),
            ..Self::default()
        }
    }

    /// Make every subsequent write fail
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// The currently persisted record
    pub fn record(&self) -> Option<&[u8]> {
        self.record.as_deref()
    }

    /// Number of successful writes
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl CalibrationStorage for MemoryCalibrationStorage {
    async fn read(&mut self) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.record.clone())
    }

    async fn write(&mut self, record: &[u8]) -> Result<(), CacheError> {
        if self.fail_writes {
            return Err(CacheError::Io("storage is read-only".to_string()));
        }

        self.record = Some(record.to_vec());
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    fn coefficients(serial: &str) -> CalibrationCoefficients {
        CalibrationCoefficients::new(0.0012, -0.16, 0.004, 18.5, 1, serial)
    }

    #[test]
    fn test_store_then_load_round_trip() {
        let mut cache = CalibrationCache::new(MemoryCalibrationStorage::new());
        let stored = coefficients("0M0008B8CM");

        block_on(cache.store(&stored)).unwrap();
        let loaded = block_on(cache.load("0M0008B8CM"));

        assert_eq!(loaded, Some(stored));
    }

    #[test]
    fn test_other_serial_is_a_miss() {
        let mut cache = CalibrationCache::new(MemoryCalibrationStorage::new());
        block_on(cache.store(&coefficients("0M0008B8CM"))).unwrap();

        assert_eq!(block_on(cache.load("0M000AAAAA")), None);
    }

    #[test]
    fn test_new_sensor_overwrites_record() {
        let mut cache = CalibrationCache::new(MemoryCalibrationStorage::new());
        block_on(cache.store(&coefficients("first"))).unwrap();
        block_on(cache.store(&coefficients("second"))).unwrap();

        assert_eq!(block_on(cache.load("first")), None);
        assert!(block_on(cache.load("second")).is_some());
        assert_eq!(cache.storage().writes(), 2);
    }

    #[test]
    fn test_empty_cache_is_a_miss() {
        let mut cache = CalibrationCache::new(MemoryCalibrationStorage::new());
        assert_eq!(block_on(cache.load("0M0008B8CM")), None);
    }

    #[test]
    fn test_garbage_record_is_a_miss() {
        let storage = MemoryCalibrationStorage::with_record(b"{not json".to_vec());
        let mut cache = CalibrationCache::new(storage);

        assert_eq!(block_on(cache.load("0M0008B8CM")), None);
    }

    #[test]
    fn test_write_failure_is_reported() {
        let mut cache = CalibrationCache::new(MemoryCalibrationStorage::new().failing_writes());
        let result = block_on(cache.store(&coefficients("0M0008B8CM")));

        assert!(matches!(result, Err(CacheError::Io(_))));
        assert_eq!(cache.storage().record(), None);
    }
}
