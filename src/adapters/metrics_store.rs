//! Metrics log CSV adapter.
//!
//! Append-only store of evaluation results. The symbol column was added
//! after the first deployments, so rows may omit it; those are kept and
//! read back with an empty symbol.

use crate::domain::error::ForesightError;
use crate::domain::metrics::MetricRecord;
use crate::domain::prediction::{parse_timestamp, Horizon, ModelType};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const HEADER: [&str; 7] = [
    "timestamp",
    "model_type",
    "horizon",
    "mae",
    "rmse",
    "mape",
    "symbol",
];

pub struct MetricsStore {
    path: PathBuf,
}

impl MetricsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one metric record, creating the file with its header schema
    /// first if absent.
    pub fn append(&self, record: &MetricRecord) -> Result<(), ForesightError> {
        if !self.path.exists() {
            let file = fs::File::create(&self.path).map_err(|e| storage_err(&self.path, e))?;
            let mut writer = csv::Writer::from_writer(file);
            writer
                .write_record(HEADER)
                .map_err(|e| ForesightError::Storage {
                    reason: format!("failed to write metrics header: {e}"),
                })?;
            writer.flush().map_err(|e| storage_err(&self.path, e))?;
        }

        let file = fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| storage_err(&self.path, e))?;
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record([
                record.timestamp.to_rfc3339(),
                record.model_type.as_str().to_string(),
                record.horizon.as_str().to_string(),
                record.mae.to_string(),
                record.rmse.to_string(),
                record.mape.map(|v| v.to_string()).unwrap_or_default(),
                record.symbol.clone(),
            ])
            .map_err(|e| ForesightError::Storage {
                reason: format!("failed to append metrics: {e}"),
            })?;
        writer.flush().map_err(|e| storage_err(&self.path, e))?;
        Ok(())
    }

    /// Loads all metric records in file order, quarantining malformed rows.
    pub fn load(&self) -> Result<Vec<MetricRecord>, ForesightError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_err(&self.path, e)),
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let mut records = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let row = result.map_err(|e| ForesightError::Storage {
                reason: format!("CSV parse error in {}: {e}", self.path.display()),
            })?;
            match parse_row(&row) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    warn!(row = index + 2, %reason, "dropping malformed metrics row");
                }
            }
        }
        Ok(records)
    }
}

fn storage_err(path: &Path, e: std::io::Error) -> ForesightError {
    ForesightError::Storage {
        reason: format!("{}: {e}", path.display()),
    }
}

fn parse_row(row: &csv::StringRecord) -> Result<MetricRecord, String> {
    let field = |i: usize, name: &str| -> Result<&str, String> {
        row.get(i).ok_or_else(|| format!("missing {name} column"))
    };

    let timestamp = parse_timestamp(field(0, "timestamp")?)
        .ok_or_else(|| format!("unparseable timestamp {:?}", row.get(0).unwrap_or("")))?;
    let model_type = ModelType::parse(field(1, "model_type")?)
        .ok_or_else(|| format!("unknown model type {:?}", row.get(1).unwrap_or("")))?;
    let horizon = Horizon::parse(field(2, "horizon")?)
        .ok_or_else(|| format!("unknown horizon {:?}", row.get(2).unwrap_or("")))?;
    let mae: f64 = field(3, "mae")?
        .parse()
        .map_err(|e| format!("invalid mae: {e}"))?;
    let rmse: f64 = field(4, "rmse")?
        .parse()
        .map_err(|e| format!("invalid rmse: {e}"))?;
    let mape = match field(5, "mape")?.trim() {
        "" => None,
        value => Some(value.parse().map_err(|e| format!("invalid mape: {e}"))?),
    };
    // Legacy rows have no symbol column at all.
    let symbol = row.get(6).unwrap_or("").to_string();

    Ok(MetricRecord {
        timestamp,
        model_type,
        horizon,
        symbol,
        mae,
        rmse,
        mape,
    })
}
