use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use libre_core::{CacheError, CalibrationStorage};
use log::debug;

/// Calibration record kept in a single file.
///
/// Every write replaces the file's whole content. A missing file reads as an
/// empty cache.
#[derive(Debug, Clone)]
pub struct FileCalibrationStorage {
    path: PathBuf,
}

impl FileCalibrationStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl CalibrationStorage for FileCalibrationStorage {
    async fn read(&mut self) -> Result<Option<Vec<u8>>, CacheError> {
        match tokio::fs::read(&self.path).await {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No calibration file at {}", self.path.display());
                Ok(None)
            }
            Err(e) => Err(CacheError::Io(format!("{}: {}", self.path.display(), e))),
        }
    }

    async fn write(&mut self, record: &[u8]) -> Result<(), CacheError> {
        tokio::fs::write(&self.path, record)
            .await
            .map_err(|e| CacheError::Io(format!("{}: {}", self.path.display(), e)))?;

        debug!("Wrote calibration record to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libre_core::{CalibrationCache, CalibrationCoefficients};

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("libre-host-{}-{}.json", name, std::process::id()))
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let mut storage = FileCalibrationStorage::new(scratch_path("missing"));
        assert_eq!(storage.read().await, Ok(None));
    }

    #[tokio::test]
    async fn test_cache_round_trip_through_file() {
        let path = scratch_path("round-trip");
        let coefficients = CalibrationCoefficients::new(0.0011, -0.0008, 0.0129, -21.3, 1, "0M0008B8CM");

        let mut cache = CalibrationCache::new(FileCalibrationStorage::new(&path));
        cache.store(&coefficients).await.unwrap();

        // A fresh cache over the same file sees the record
        let mut reopened = CalibrationCache::new(FileCalibrationStorage::new(&path));
        assert_eq!(reopened.load("0M0008B8CM").await, Some(coefficients));
        assert_eq!(reopened.load("0M000OTHER").await, None);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_unwritable_location_reports_io_error() {
        let path = scratch_path("no-such-dir").join("record.json");
        let mut storage = FileCalibrationStorage::new(&path);

        assert!(matches!(storage.write(b"{}").await, Err(CacheError::Io(_))));
    }
}
