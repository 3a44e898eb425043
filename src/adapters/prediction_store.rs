//! Prediction ledger CSV adapter.
//!
//! Append-oriented log of every forecast made, with in-place resolution of
//! realized prices. Malformed rows are quarantined on read: logged and
//! skipped, never fatal. A missing file reads as an empty ledger.

use crate::domain::error::ForesightError;
use crate::domain::prediction::{parse_timestamp, Horizon, ModelType, PredictionRecord};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const HEADER: [&str; 7] = [
    "timestamp",
    "symbol",
    "horizon",
    "model_type",
    "predicted_price",
    "actual_price",
    "error",
];

pub struct PredictionStore {
    path: PathBuf,
}

impl PredictionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record, creating the file with its header schema first
    /// if it does not exist yet.
    pub fn append(&self, record: &PredictionRecord) -> Result<(), ForesightError> {
        if !self.path.exists() {
            write_rows(&self.path, &[])?;
        }
        let file = fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| storage_err(&self.path, e))?;
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(format_row(record))
            .map_err(|e| ForesightError::Storage {
                reason: format!("failed to append prediction: {e}"),
            })?;
        writer.flush().map_err(|e| storage_err(&self.path, e))?;
        Ok(())
    }

    /// Loads the full ledger in file order. Rows that fail the typed parse
    /// are logged as data-quality errors and dropped.
    pub fn load(&self) -> Result<Vec<PredictionRecord>, ForesightError> {
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
                    warn!(row = index + 2, %reason, "dropping malformed prediction row");
                }
            }
        }
        Ok(records)
    }

    /// Rewrites the whole ledger (temp file + rename).
    pub fn save(&self, records: &[PredictionRecord]) -> Result<(), ForesightError> {
        let tmp = temp_path(&self.path);
        write_rows(&tmp, records)?;
        fs::rename(&tmp, &self.path).map_err(|e| storage_err(&self.path, e))?;
        Ok(())
    }

    /// Records whose actual price is still unset and whose target time is
    /// strictly before `as_of`, in stable file order.
    pub fn fetch_unresolved(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<PredictionRecord>, ForesightError> {
        let records = self.load()?;
        Ok(records
            .into_iter()
            .filter(|r| !r.is_resolved() && r.timestamp < as_of)
            .collect())
    }

    /// Newest prediction for a (model, horizon, symbol) triple, resolved
    /// or not.
    pub fn latest_prediction(
        &self,
        model: ModelType,
        horizon: Horizon,
        symbol: &str,
    ) -> Result<Option<PredictionRecord>, ForesightError> {
        let records = self.load()?;
        Ok(records
            .into_iter()
            .filter(|r| r.model_type == model && r.horizon == horizon && r.symbol == symbol)
            .max_by_key(|r| r.timestamp))
    }

    /// Resolves every pending record whose target time and symbol match
    /// exactly. Returns the number of records updated; the file is only
    /// rewritten when that number is non-zero.
    pub fn update_with_actual(
        &self,
        timestamp: DateTime<Utc>,
        symbol: &str,
        actual: f64,
    ) -> Result<usize, ForesightError> {
        let mut records = self.load()?;
        let mut updated = 0;
        for record in records
            .iter_mut()
            .filter(|r| !r.is_resolved() && r.timestamp == timestamp && r.symbol == symbol)
        {
            record.resolve(actual);
            updated += 1;
        }
        if updated > 0 {
            self.save(&records)?;
        }
        Ok(updated)
    }
}

fn storage_err(path: &Path, e: std::io::Error) -> ForesightError {
    ForesightError::Storage {
        reason: format!("{}: {e}", path.display()),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_rows(path: &Path, records: &[PredictionRecord]) -> Result<(), ForesightError> {
    let file = fs::File::create(path).map_err(|e| storage_err(path, e))?;
    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(HEADER)
        .map_err(|e| ForesightError::Storage {
            reason: format!("failed to write header: {e}"),
        })?;
    for record in records {
        writer
            .write_record(format_row(record))
            .map_err(|e| ForesightError::Storage {
                reason: format!("failed to write prediction: {e}"),
            })?;
    }
    writer.flush().map_err(|e| storage_err(path, e))?;
    Ok(())
}

fn format_row(record: &PredictionRecord) -> [String; 7] {
    [
        record.timestamp.to_rfc3339(),
        record.symbol.clone(),
        record.horizon.as_str().to_string(),
        record.model_type.as_str().to_string(),
        record.predicted_price.to_string(),
        record.actual_price.map(|v| v.to_string()).unwrap_or_default(),
        record.error.map(|v| v.to_string()).unwrap_or_default(),
    ]
}

fn parse_row(row: &csv::StringRecord) -> Result<PredictionRecord, String> {
    let field = |i: usize, name: &str| -> Result<&str, String> {
        row.get(i).ok_or_else(|| format!("missing {name} column"))
    };

    let timestamp = parse_timestamp(field(0, "timestamp")?)
        .ok_or_else(|| format!("unparseable timestamp {:?}", row.get(0).unwrap_or("")))?;
    let symbol = field(1, "symbol")?.to_string();
    if symbol.is_empty() {
        return Err("empty symbol".into());
    }
    let horizon = Horizon::parse(field(2, "horizon")?)
        .ok_or_else(|| format!("unknown horizon {:?}", row.get(2).unwrap_or("")))?;
    let model_type = ModelType::parse(field(3, "model_type")?)
        .ok_or_else(|| format!("unknown model type {:?}", row.get(3).unwrap_or("")))?;
    let predicted_price: f64 = field(4, "predicted_price")?
        .parse()
        .map_err(|e| format!("invalid predicted_price: {e}"))?;
    let actual_price = parse_optional(field(5, "actual_price")?)
        .map_err(|e| format!("invalid actual_price: {e}"))?;
    let error = parse_optional(field(6, "error")?).map_err(|e| format!("invalid error: {e}"))?;

    Ok(PredictionRecord {
        timestamp,
        symbol,
        horizon,
        model_type,
        predicted_price,
        actual_price,
        error,
    })
}

fn parse_optional(value: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed.parse().map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn make_record(hour: u32, symbol: &str) -> PredictionRecord {
        PredictionRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap(),
            symbol: symbol.to_string(),
            horizon: Horizon::H24,
            model_type: ModelType::Arima,
            predicted_price: 50_500.0,
            actual_price: None,
            error: None,
        }
    }

    fn store_in(dir: &TempDir) -> PredictionStore {
        PredictionStore::new(dir.path().join("predictions.csv"))
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.load().unwrap().is_empty());
        assert!(store.fetch_unresolved(Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn append_initializes_schema_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.append(&make_record(12, "BTC-USD")).unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert!(content.starts_with("timestamp,symbol,horizon,model_type"));

        let records = store.load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], make_record(12, "BTC-USD"));
    }

    #[test]
    fn malformed_rows_are_dropped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            "timestamp,symbol,horizon,model_type,predicted_price,actual_price,error\n\
             not-a-date,BTC-USD,24h,arima,50000,,\n\
             2024-01-15T12:00:00+00:00,BTC-USD,24h,arima,50500,,\n\
             2024-01-15T13:00:00+00:00,BTC-USD,9h,arima,50500,,\n\
             2024-01-15T14:00:00+00:00,BTC-USD,24h,arima,abc,,\n",
        )
        .unwrap();

        let records = store.load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn fetch_unresolved_filters_on_time_and_state() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut resolved = make_record(10, "BTC-USD");
        resolved.resolve(50_000.0);
        store.append(&resolved).unwrap();
        store.append(&make_record(11, "BTC-USD")).unwrap();
        store.append(&make_record(18, "BTC-USD")).unwrap();

        let as_of = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let pending = store.fetch_unresolved(as_of).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 11, 0, 0).unwrap()
        );
    }

    #[test]
    fn update_with_actual_resolves_exact_matches_only() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append(&make_record(12, "BTC-USD")).unwrap();
        store.append(&make_record(12, "ETH-USD")).unwrap();
        store.append(&make_record(13, "BTC-USD")).unwrap();

        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let updated = store.update_with_actual(ts, "BTC-USD", 50_000.0).unwrap();
        assert_eq!(updated, 1);

        let records = store.load().unwrap();
        let hit = records
            .iter()
            .find(|r| r.timestamp == ts && r.symbol == "BTC-USD")
            .unwrap();
        assert_eq!(hit.actual_price, Some(50_000.0));
        assert_eq!(hit.error, Some(500.0));
        assert!(records
            .iter()
            .filter(|r| r.symbol == "ETH-USD" || r.timestamp != ts)
            .all(|r| !r.is_resolved()));
    }

    #[test]
    fn update_with_actual_skips_already_resolved() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let mut record = make_record(12, "BTC-USD");
        record.resolve(49_000.0);
        store.append(&record).unwrap();

        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let updated = store.update_with_actual(ts, "BTC-USD", 50_000.0).unwrap();
        assert_eq!(updated, 0);
        assert_eq!(store.load().unwrap()[0].actual_price, Some(49_000.0));
    }

    #[test]
    fn latest_prediction_picks_newest_matching() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append(&make_record(10, "BTC-USD")).unwrap();
        store.append(&make_record(14, "BTC-USD")).unwrap();
        let mut other_model = make_record(18, "BTC-USD");
        other_model.model_type = ModelType::Lstm;
        store.append(&other_model).unwrap();

        let latest = store
            .latest_prediction(ModelType::Arima, Horizon::H24, "BTC-USD")
            .unwrap()
            .unwrap();
        assert_eq!(
            latest.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
        );

        let none = store
            .latest_prediction(ModelType::Arima, Horizon::H24, "ETH-USD")
            .unwrap();
        assert!(none.is_none());
    }
}
