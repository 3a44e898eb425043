//! Portfolio persistence: state singleton, transaction log, value history.
//!
//! A buy or sell is committed as one unit: the appended transaction log
//! and the new state are each written to a temp file and renamed into
//! place (transaction log first), so a crash leaves the previous
//! consistent pair or the new one rather than a torn write.

use crate::domain::error::ForesightError;
use crate::domain::portfolio::{
    PortfolioState, PortfolioValueSample, Transaction, TransactionSide,
};
use crate::domain::prediction::parse_timestamp;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const TRANSACTIONS_HEADER: &str = "timestamp,symbol,type,quantity,price_per_unit,total_value\n";
const HISTORY_HEADER: [&str; 2] = ["timestamp", "portfolio_value"];

pub struct PortfolioStore {
    state_path: PathBuf,
    transactions_path: PathBuf,
    history_path: PathBuf,
}

impl PortfolioStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            state_path: data_dir.join("portfolio_state.json"),
            transactions_path: data_dir.join("transactions.csv"),
            history_path: data_dir.join("portfolio_history.csv"),
        }
    }

    /// Loads the persisted state. A missing file is a cold start; a
    /// corrupt file is logged and also treated as a cold start.
    pub fn load_state(&self) -> Result<Option<PortfolioState>, ForesightError> {
        let content = match fs::read_to_string(&self.state_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_err(&self.state_path, e)),
        };
        match serde_json::from_str(&content) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(error = %e, "portfolio state file is corrupt, starting fresh");
                Ok(None)
            }
        }
    }

    /// Persists the new state together with the transaction that produced
    /// it. The transaction log is renamed into place before the state so
    /// no state change can exist without its transaction.
    pub fn commit(
        &self,
        state: &PortfolioState,
        transaction: &Transaction,
    ) -> Result<(), ForesightError> {
        let mut log = match fs::read(&self.transactions_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                TRANSACTIONS_HEADER.as_bytes().to_vec()
            }
            Err(e) => return Err(storage_err(&self.transactions_path, e)),
        };
        log.extend_from_slice(&format_transaction(transaction)?);
        replace_file(&self.transactions_path, &log)?;

        let json = serde_json::to_string_pretty(state).map_err(|e| ForesightError::Storage {
            reason: format!("failed to serialize portfolio state: {e}"),
        })?;
        replace_file(&self.state_path, json.as_bytes())?;
        Ok(())
    }

    /// Persists state alone (no accompanying order), used on cold start.
    pub fn save_state(&self, state: &PortfolioState) -> Result<(), ForesightError> {
        let json = serde_json::to_string_pretty(state).map_err(|e| ForesightError::Storage {
            reason: format!("failed to serialize portfolio state: {e}"),
        })?;
        replace_file(&self.state_path, json.as_bytes())
    }

    pub fn transactions(&self) -> Result<Vec<Transaction>, ForesightError> {
        let content = match fs::read_to_string(&self.transactions_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_err(&self.transactions_path, e)),
        };
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let mut transactions = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let row = result.map_err(|e| ForesightError::Storage {
                reason: format!("CSV parse error in {}: {e}", self.transactions_path.display()),
            })?;
            match parse_transaction(&row) {
                Ok(transaction) => transactions.push(transaction),
                Err(reason) => {
                    warn!(row = index + 2, %reason, "dropping malformed transaction row");
                }
            }
        }
        Ok(transactions)
    }

    pub fn append_value_sample(
        &self,
        sample: &PortfolioValueSample,
    ) -> Result<(), ForesightError> {
        if !self.history_path.exists() {
            let file =
                fs::File::create(&self.history_path).map_err(|e| storage_err(&self.history_path, e))?;
            let mut writer = csv::Writer::from_writer(file);
            writer
                .write_record(HISTORY_HEADER)
                .map_err(|e| ForesightError::Storage {
                    reason: format!("failed to write history header: {e}"),
                })?;
            writer.flush().map_err(|e| storage_err(&self.history_path, e))?;
        }
        let file = fs::OpenOptions::new()
            .append(true)
            .open(&self.history_path)
            .map_err(|e| storage_err(&self.history_path, e))?;
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record([
                sample.timestamp.to_rfc3339(),
                sample.portfolio_value.to_string(),
            ])
            .map_err(|e| ForesightError::Storage {
                reason: format!("failed to append value sample: {e}"),
            })?;
        writer.flush().map_err(|e| storage_err(&self.history_path, e))?;
        Ok(())
    }

    pub fn value_history(&self) -> Result<Vec<PortfolioValueSample>, ForesightError> {
        let content = match fs::read_to_string(&self.history_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_err(&self.history_path, e)),
        };
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let mut samples = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let row = result.map_err(|e| ForesightError::Storage {
                reason: format!("CSV parse error in {}: {e}", self.history_path.display()),
            })?;
            match parse_sample(&row) {
                Ok(sample) => samples.push(sample),
                Err(reason) => {
                    warn!(row = index + 2, %reason, "dropping malformed value sample");
                }
            }
        }
        Ok(samples)
    }
}

/// The portfolio state machine: owns the in-memory singleton, persists
/// after every mutation, and never lets the on-disk pair drift from what
/// it holds.
pub struct PortfolioLedger {
    state: PortfolioState,
    store: PortfolioStore,
}

impl PortfolioLedger {
    /// Loads persisted state, or creates and persists a fresh portfolio
    /// with `initial_cash` when none exists.
    pub fn open(store: PortfolioStore, initial_cash: f64) -> Result<Self, ForesightError> {
        let state = match store.load_state()? {
            Some(state) => state,
            None => {
                info!(initial_cash, "no portfolio state found, starting fresh");
                let state = PortfolioState::new(initial_cash);
                store.save_state(&state)?;
                state
            }
        };
        Ok(Self { state, store })
    }

    pub fn state(&self) -> &PortfolioState {
        &self.state
    }

    pub fn store(&self) -> &PortfolioStore {
        &self.store
    }

    /// Buys `amount` of cash worth of `symbol`. Returns Ok(false) without
    /// touching memory or disk when cash is insufficient.
    pub fn buy(
        &mut self,
        symbol: &str,
        amount: f64,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<bool, ForesightError> {
        let mut next = self.state.clone();
        if !next.apply_buy(symbol, amount, price) {
            info!(
                %symbol,
                amount,
                cash = self.state.cash,
                "buy rejected: insufficient cash"
            );
            return Ok(false);
        }
        let transaction = Transaction {
            timestamp: now,
            symbol: symbol.to_string(),
            side: TransactionSide::Buy,
            quantity: amount / price,
            price_per_unit: price,
            total_value: amount,
        };
        self.store.commit(&next, &transaction)?;
        self.state = next;
        info!(%symbol, quantity = transaction.quantity, amount, "bought");
        Ok(true)
    }

    /// Sells `quantity` of `symbol`. Returns Ok(false) without touching
    /// memory or disk when the held quantity is insufficient.
    pub fn sell(
        &mut self,
        symbol: &str,
        quantity: f64,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<bool, ForesightError> {
        let mut next = self.state.clone();
        if !next.apply_sell(symbol, quantity, price) {
            info!(
                %symbol,
                quantity,
                held = self.state.holding(symbol),
                "sell rejected: insufficient holdings"
            );
            return Ok(false);
        }
        let sale_value = quantity * price;
        let transaction = Transaction {
            timestamp: now,
            symbol: symbol.to_string(),
            side: TransactionSide::Sell,
            quantity,
            price_per_unit: price,
            total_value: sale_value,
        };
        self.store.commit(&next, &transaction)?;
        self.state = next;
        info!(%symbol, quantity, sale_value, "sold");
        Ok(true)
    }

    /// Marks the portfolio at `prices`, appends one value sample, and
    /// returns the marked value.
    pub fn record_value(
        &self,
        prices: &HashMap<String, f64>,
        now: DateTime<Utc>,
    ) -> Result<f64, ForesightError> {
        let portfolio_value = self.state.value(prices);
        self.store.append_value_sample(&PortfolioValueSample {
            timestamp: now,
            portfolio_value,
        })?;
        Ok(portfolio_value)
    }
}

fn storage_err(path: &Path, e: std::io::Error) -> ForesightError {
    ForesightError::Storage {
        reason: format!("{}: {e}", path.display()),
    }
}

fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), ForesightError> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).map_err(|e| storage_err(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| storage_err(path, e))?;
    Ok(())
}

fn format_transaction(transaction: &Transaction) -> Result<Vec<u8>, ForesightError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            transaction.timestamp.to_rfc3339(),
            transaction.symbol.clone(),
            transaction.side.as_str().to_string(),
            transaction.quantity.to_string(),
            transaction.price_per_unit.to_string(),
            transaction.total_value.to_string(),
        ])
        .map_err(|e| ForesightError::Storage {
            reason: format!("failed to format transaction: {e}"),
        })?;
    writer.into_inner().map_err(|e| ForesightError::Storage {
        reason: format!("failed to format transaction: {e}"),
    })
}

fn parse_transaction(row: &csv::StringRecord) -> Result<Transaction, String> {
    let field = |i: usize, name: &str| -> Result<&str, String> {
        row.get(i).ok_or_else(|| format!("missing {name} column"))
    };

    let timestamp = parse_timestamp(field(0, "timestamp")?)
        .ok_or_else(|| format!("unparseable timestamp {:?}", row.get(0).unwrap_or("")))?;
    let symbol = field(1, "symbol")?.to_string();
    let side = TransactionSide::parse(field(2, "type")?)
        .ok_or_else(|| format!("unknown transaction type {:?}", row.get(2).unwrap_or("")))?;
    let quantity: f64 = field(3, "quantity")?
        .parse()
        .map_err(|e| format!("invalid quantity: {e}"))?;
    let price_per_unit: f64 = field(4, "price_per_unit")?
        .parse()
        .map_err(|e| format!("invalid price_per_unit: {e}"))?;
    let total_value: f64 = field(5, "total_value")?
        .parse()
        .map_err(|e| format!("invalid total_value: {e}"))?;

    Ok(Transaction {
        timestamp,
        symbol,
        side,
        quantity,
        price_per_unit,
        total_value,
    })
}

fn parse_sample(row: &csv::StringRecord) -> Result<PortfolioValueSample, String> {
    let timestamp_field = row.get(0).ok_or("missing timestamp column")?;
    let timestamp = parse_timestamp(timestamp_field)
        .ok_or_else(|| format!("unparseable timestamp {timestamp_field:?}"))?;
    let portfolio_value: f64 = row
        .get(1)
        .ok_or("missing portfolio_value column")?
        .parse()
        .map_err(|e| format!("invalid portfolio_value: {e}"))?;
    Ok(PortfolioValueSample {
        timestamp,
        portfolio_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn cold_start_creates_and_persists_initial_state() {
        let dir = TempDir::new().unwrap();
        let ledger = PortfolioLedger::open(PortfolioStore::new(dir.path()), 10_000.0).unwrap();
        assert_relative_eq!(ledger.state().cash, 10_000.0);
        assert!(dir.path().join("portfolio_state.json").exists());
    }

    #[test]
    fn buy_commits_state_and_exactly_one_transaction() {
        let dir = TempDir::new().unwrap();
        let mut ledger =
            PortfolioLedger::open(PortfolioStore::new(dir.path()), 1_000.0).unwrap();

        assert!(ledger.buy("BTC-USD", 500.0, 50_000.0, now()).unwrap());
        assert_relative_eq!(ledger.state().cash, 500.0);
        assert_relative_eq!(ledger.state().holding("BTC-USD"), 0.01);

        let transactions = ledger.store().transactions().unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].side, TransactionSide::Buy);
        assert_relative_eq!(transactions[0].total_value, 500.0);
        assert_relative_eq!(transactions[0].quantity, 0.01);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut ledger =
                PortfolioLedger::open(PortfolioStore::new(dir.path()), 1_000.0).unwrap();
            assert!(ledger.buy("BTC-USD", 500.0, 50_000.0, now()).unwrap());
        }
        let reopened = PortfolioLedger::open(PortfolioStore::new(dir.path()), 1_000.0).unwrap();
        assert_relative_eq!(reopened.state().cash, 500.0);
        assert_relative_eq!(reopened.state().holding("BTC-USD"), 0.01);
    }

    #[test]
    fn rejected_sell_leaves_disk_untouched() {
        let dir = TempDir::new().unwrap();
        let mut ledger =
            PortfolioLedger::open(PortfolioStore::new(dir.path()), 1_000.0).unwrap();
        assert!(ledger.buy("BTC-USD", 500.0, 50_000.0, now()).unwrap());
        let state_before = fs::read_to_string(dir.path().join("portfolio_state.json")).unwrap();

        assert!(!ledger.sell("BTC-USD", 0.02, 50_000.0, now()).unwrap());

        assert_eq!(ledger.store().transactions().unwrap().len(), 1);
        let state_after = fs::read_to_string(dir.path().join("portfolio_state.json")).unwrap();
        assert_eq!(state_before, state_after);
    }

    #[test]
    fn sell_to_zero_removes_holding_and_logs_sell() {
        let dir = TempDir::new().unwrap();
        let mut ledger =
            PortfolioLedger::open(PortfolioStore::new(dir.path()), 1_000.0).unwrap();
        assert!(ledger.buy("BTC-USD", 500.0, 50_000.0, now()).unwrap());
        assert!(ledger.sell("BTC-USD", 0.01, 60_000.0, now()).unwrap());

        assert!(ledger.state().holdings.is_empty());
        assert_relative_eq!(ledger.state().cash, 1_100.0);
        let transactions = ledger.store().transactions().unwrap();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[1].side, TransactionSide::Sell);
        assert_relative_eq!(transactions[1].total_value, 600.0);
    }

    #[test]
    fn commit_leaves_no_temp_files_behind() {
        let dir = TempDir::new().unwrap();
        let mut ledger =
            PortfolioLedger::open(PortfolioStore::new(dir.path()), 1_000.0).unwrap();
        assert!(ledger.buy("BTC-USD", 500.0, 50_000.0, now()).unwrap());

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn value_samples_append_and_load() {
        let dir = TempDir::new().unwrap();
        let ledger = PortfolioLedger::open(PortfolioStore::new(dir.path()), 1_000.0).unwrap();

        let prices = HashMap::from([("BTC-USD".to_string(), 50_000.0)]);
        let value = ledger.record_value(&prices, now()).unwrap();
        assert_relative_eq!(value, 1_000.0);

        let history = ledger.store().value_history().unwrap();
        assert_eq!(history.len(), 1);
        assert_relative_eq!(history[0].portfolio_value, 1_000.0);
    }

    #[test]
    fn malformed_transaction_rows_are_dropped() {
        let dir = TempDir::new().unwrap();
        let store = PortfolioStore::new(dir.path());
        fs::write(
            dir.path().join("transactions.csv"),
            "timestamp,symbol,type,quantity,price_per_unit,total_value\n\
             garbage,BTC-USD,BUY,0.01,50000,500\n\
             2024-01-15T12:00:00+00:00,BTC-USD,HOLD,0.01,50000,500\n\
             2024-01-15T12:00:00+00:00,BTC-USD,BUY,0.01,50000,500\n",
        )
        .unwrap();

        assert_eq!(store.transactions().unwrap().len(), 1);
    }
}
