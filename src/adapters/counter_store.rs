//! Retraining bookkeeping: scalar counter and timestamp files.

use crate::domain::error::ForesightError;
use crate::domain::prediction::parse_timestamp;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Tracks rows ingested since the last retrain plus the time of that
/// retrain. Missing files read as zero / never-retrained.
pub struct RetrainTracker {
    count_path: PathBuf,
    stamp_path: PathBuf,
}

impl RetrainTracker {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            count_path: data_dir.join(".rows_since_retrain"),
            stamp_path: data_dir.join(".last_retrain"),
        }
    }

    pub fn rows_since_retrain(&self) -> Result<i64, ForesightError> {
        let content = match fs::read_to_string(&self.count_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(storage_err(&self.count_path, e)),
        };
        match content.trim().parse() {
            Ok(count) => Ok(count),
            Err(e) => {
                warn!(error = %e, "row counter file is corrupt, resetting to 0");
                Ok(0)
            }
        }
    }

    /// Adds `rows` to the counter and returns the new total.
    pub fn add_rows(&self, rows: i64) -> Result<i64, ForesightError> {
        let total = self.rows_since_retrain()? + rows;
        fs::write(&self.count_path, total.to_string())
            .map_err(|e| storage_err(&self.count_path, e))?;
        Ok(total)
    }

    /// Zeroes the counter and stamps the retrain time.
    pub fn reset(&self, now: DateTime<Utc>) -> Result<(), ForesightError> {
        fs::write(&self.count_path, "0").map_err(|e| storage_err(&self.count_path, e))?;
        fs::write(&self.stamp_path, now.to_rfc3339())
            .map_err(|e| storage_err(&self.stamp_path, e))?;
        Ok(())
    }

    pub fn last_retrain(&self) -> Result<Option<DateTime<Utc>>, ForesightError> {
        let content = match fs::read_to_string(&self.stamp_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_err(&self.stamp_path, e)),
        };
        Ok(parse_timestamp(&content))
    }
}

fn storage_err(path: &Path, e: std::io::Error) -> ForesightError {
    ForesightError::Storage {
        reason: format!("{}: {e}", path.display()),
    }
}
