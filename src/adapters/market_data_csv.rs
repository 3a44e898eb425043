//! Market data CSV store.
//!
//! The local bar archive the fetch job appends to. It doubles as the
//! reconciler's local realized-price source and as an offline
//! [`MarketDataPort`] for replaying archived data.

use crate::domain::error::ForesightError;
use crate::domain::ohlcv::OhlcBar;
use crate::domain::prediction::parse_timestamp;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::price_port::PriceLookupPort;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const HEADER: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

pub struct MarketDataCsv {
    path: PathBuf,
}

impl MarketDataCsv {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one bar, creating the file with its header first if absent.
    pub fn append_bar(&self, bar: &OhlcBar) -> Result<(), ForesightError> {
        if !self.path.exists() {
            let file = fs::File::create(&self.path).map_err(|e| storage_err(&self.path, e))?;
            let mut writer = csv::Writer::from_writer(file);
            writer
                .write_record(HEADER)
                .map_err(|e| ForesightError::Storage {
                    reason: format!("failed to write market data header: {e}"),
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
                bar.timestamp.to_rfc3339(),
                bar.open.to_string(),
                bar.high.to_string(),
                bar.low.to_string(),
                bar.close.to_string(),
                bar.volume.to_string(),
            ])
            .map_err(|e| ForesightError::Storage {
                reason: format!("failed to append bar: {e}"),
            })?;
        writer.flush().map_err(|e| storage_err(&self.path, e))?;
        Ok(())
    }

    /// Loads all bars in file order, quarantining malformed rows.
    pub fn load(&self) -> Result<Vec<OhlcBar>, ForesightError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_err(&self.path, e)),
        };
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let mut bars = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let row = result.map_err(|e| ForesightError::Storage {
                reason: format!("CSV parse error in {}: {e}", self.path.display()),
            })?;
            match parse_bar(&row) {
                Ok(bar) => bars.push(bar),
                Err(reason) => {
                    warn!(row = index + 2, %reason, "dropping malformed market data row");
                }
            }
        }
        Ok(bars)
    }
}

impl MarketDataPort for MarketDataCsv {
    fn fetch_latest(&self, _symbol: &str) -> Result<Option<OhlcBar>, ForesightError> {
        Ok(self.load()?.into_iter().max_by_key(|b| b.timestamp))
    }

    fn fetch_range(
        &self,
        _symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OhlcBar>, ForesightError> {
        let mut bars: Vec<OhlcBar> = self
            .load()?
            .into_iter()
            .filter(|b| b.timestamp >= start && b.timestamp <= end)
            .collect();
        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

impl PriceLookupPort for MarketDataCsv {
    /// Exact-timestamp close lookup. Duplicate timestamps keep the last
    /// written row, matching how re-fetched bars supersede earlier ones.
    fn close_at(
        &self,
        _symbol: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<f64>, ForesightError> {
        Ok(self
            .load()?
            .iter()
            .rev()
            .find(|b| b.timestamp == timestamp)
            .map(|b| b.close))
    }
}

fn storage_err(path: &Path, e: std::io::Error) -> ForesightError {
    ForesightError::Storage {
        reason: format!("{}: {e}", path.display()),
    }
}

fn parse_bar(row: &csv::StringRecord) -> Result<OhlcBar, String> {
    let field = |i: usize, name: &str| -> Result<&str, String> {
        row.get(i).ok_or_else(|| format!("missing {name} column"))
    };
    let number = |i: usize, name: &str| -> Result<f64, String> {
        field(i, name)?
            .parse()
            .map_err(|e| format!("invalid {name}: {e}"))
    };

    let timestamp = parse_timestamp(field(0, "timestamp")?)
        .ok_or_else(|| format!("unparseable timestamp {:?}", row.get(0).unwrap_or("")))?;
    Ok(OhlcBar {
        timestamp,
        open: number(1, "open")?,
        high: number(2, "high")?,
        low: number(3, "low")?,
        close: number(4, "close")?,
        volume: number(5, "volume")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn bar(hour: u32, close: f64) -> OhlcBar {
        OhlcBar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap(),
            open: close - 10.0,
            high: close + 20.0,
            low: close - 30.0,
            close,
            volume: 1_000.0,
        }
    }

    fn store_in(dir: &TempDir) -> MarketDataCsv {
        MarketDataCsv::new(dir.path().join("market_data.csv"))
    }

    #[test]
    fn append_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append_bar(&bar(10, 50_000.0)).unwrap();
        store.append_bar(&bar(11, 50_100.0)).unwrap();

        let bars = store.load().unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0], bar(10, 50_000.0));
    }

    #[test]
    fn fetch_latest_returns_newest_bar() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append_bar(&bar(11, 50_100.0)).unwrap();
        store.append_bar(&bar(10, 50_000.0)).unwrap();

        let latest = store.fetch_latest("BTC-USD").unwrap().unwrap();
        assert_eq!(latest.close, 50_100.0);
    }

    #[test]
    fn fetch_latest_on_missing_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.fetch_latest("BTC-USD").unwrap().is_none());
    }

    #[test]
    fn fetch_range_is_inclusive_and_sorted() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append_bar(&bar(12, 50_200.0)).unwrap();
        store.append_bar(&bar(10, 50_000.0)).unwrap();
        store.append_bar(&bar(11, 50_100.0)).unwrap();

        let bars = store
            .fetch_range(
                "BTC-USD",
                Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 15, 11, 0, 0).unwrap(),
            )
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].timestamp < bars[1].timestamp);
    }

    #[test]
    fn close_at_keeps_the_last_duplicate() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append_bar(&bar(10, 50_000.0)).unwrap();
        store.append_bar(&bar(10, 50_500.0)).unwrap();

        let close = store
            .close_at(
                "BTC-USD",
                Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
            )
            .unwrap();
        assert_eq!(close, Some(50_500.0));
    }

    #[test]
    fn malformed_rows_are_dropped() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            "timestamp,open,high,low,close,volume\n\
             garbage,1,2,3,4,5\n\
             2024-01-15T10:00:00+00:00,1,2,3,4,5\n",
        )
        .unwrap();
        assert_eq!(store.load().unwrap().len(), 1);
    }
}
