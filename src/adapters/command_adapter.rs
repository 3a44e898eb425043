//! Subprocess-backed adapters for external procedures.
//!
//! Training, inference, raw data fetch and remote price lookup all live
//! outside this process; each is driven through a configured command
//! line. Commands are parsed argv-style, never through a shell. Line
//! protocols are plain CSV on stdout.

use crate::domain::error::ForesightError;
use crate::domain::ohlcv::OhlcBar;
use crate::domain::prediction::{parse_timestamp, Horizon, ModelType};
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::model_port::{ForecastPoint, ForecastPort, ModelTrainerPort};
use crate::ports::price_port::PriceHistoryPort;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::process::Command;
use tracing::warn;

fn run_command(command_line: &str, extra_args: &[&str]) -> Result<String, String> {
    let mut parts = command_line.split_whitespace();
    let program = parts.next().ok_or("empty command line")?;
    let output = Command::new(program)
        .args(parts)
        .args(extra_args)
        .output()
        .map_err(|e| format!("failed to spawn {program}: {e}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("{program} exited with {}: {}", output.status, stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Market data via an external fetch command. Protocol: one
/// `timestamp,open,high,low,close,volume` line per bar on stdout.
/// Failures are absorbed into "absent" per the port contract.
pub struct CommandMarketData {
    command: String,
}

impl CommandMarketData {
    pub fn new(command: String) -> Self {
        Self { command }
    }

    fn fetch(&self, args: &[&str]) -> Vec<OhlcBar> {
        let stdout = match run_command(&self.command, args) {
            Ok(stdout) => stdout,
            Err(reason) => {
                warn!(%reason, "market data fetch failed, treating as absent");
                return Vec::new();
            }
        };
        stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match parse_bar_line(line) {
                Ok(bar) => Some(bar),
                Err(reason) => {
                    warn!(%reason, %line, "skipping malformed bar line");
                    None
                }
            })
            .collect()
    }
}

impl MarketDataPort for CommandMarketData {
    fn fetch_latest(&self, symbol: &str) -> Result<Option<OhlcBar>, ForesightError> {
        Ok(self
            .fetch(&[symbol])
            .into_iter()
            .max_by_key(|b| b.timestamp))
    }

    fn fetch_range(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OhlcBar>, ForesightError> {
        let start = start.to_rfc3339();
        let end = end.to_rfc3339();
        let mut bars = self.fetch(&[symbol, start.as_str(), end.as_str()]);
        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

/// Model training via per-model command lines.
pub struct CommandTrainer {
    arima_command: Option<String>,
    lstm_command: Option<String>,
}

impl CommandTrainer {
    pub fn new(arima_command: Option<String>, lstm_command: Option<String>) -> Self {
        Self {
            arima_command,
            lstm_command,
        }
    }
}

impl ModelTrainerPort for CommandTrainer {
    fn retrain(&self, model: ModelType) -> Result<(), ForesightError> {
        let command = match model {
            ModelType::Arima => self.arima_command.as_deref(),
            ModelType::Lstm => self.lstm_command.as_deref(),
        };
        let command = command.ok_or_else(|| ForesightError::Training {
            model: model.as_str().into(),
            reason: "no training command configured".into(),
        })?;
        run_command(command, &[]).map_err(|reason| ForesightError::Training {
            model: model.as_str().into(),
            reason,
        })?;
        Ok(())
    }
}

/// Model inference via a forecast command. Called with the model type and
/// horizon label as arguments; protocol: one `timestamp,value` line per
/// forecast step.
pub struct CommandForecaster {
    command: String,
}

impl CommandForecaster {
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

impl ForecastPort for CommandForecaster {
    fn forecast(
        &self,
        model: ModelType,
        horizon: Horizon,
    ) -> Result<Vec<ForecastPoint>, ForesightError> {
        let stdout = run_command(&self.command, &[model.as_str(), horizon.as_str()])
            .map_err(|reason| ForesightError::Forecast { reason })?;
        Ok(stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match parse_forecast_line(line) {
                Ok(point) => Some(point),
                Err(reason) => {
                    warn!(%reason, %line, "skipping malformed forecast line");
                    None
                }
            })
            .collect())
    }
}

/// Remote realized-price lookup via a history command. Called with the
/// symbol and the RFC 3339 span; protocol: one `timestamp,close` line per
/// known price.
pub struct CommandPriceFeed {
    command: String,
}

impl CommandPriceFeed {
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

impl PriceHistoryPort for CommandPriceFeed {
    fn fetch_closes(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BTreeMap<DateTime<Utc>, f64>, ForesightError> {
        let start = start.to_rfc3339();
        let end = end.to_rfc3339();
        let stdout = run_command(&self.command, &[symbol, start.as_str(), end.as_str()])
            .map_err(|reason| ForesightError::MarketData { reason })?;
        let mut closes = BTreeMap::new();
        for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
            match parse_close_line(line) {
                Ok((timestamp, close)) => {
                    closes.insert(timestamp, close);
                }
                Err(reason) => {
                    warn!(%reason, %line, "skipping malformed price line");
                }
            }
        }
        Ok(closes)
    }
}

fn parse_bar_line(line: &str) -> Result<OhlcBar, String> {
    let fields: Vec<&str> = line.trim().split(',').collect();
    if fields.len() != 6 {
        return Err(format!("expected 6 fields, got {}", fields.len()));
    }
    let timestamp = parse_timestamp(fields[0])
        .ok_or_else(|| format!("unparseable timestamp {:?}", fields[0]))?;
    let number = |index: usize, name: &str| -> Result<f64, String> {
        fields[index]
            .trim()
            .parse()
            .map_err(|e| format!("invalid {name}: {e}"))
    };
    Ok(OhlcBar {
        timestamp,
        open: number(1, "open")?,
        high: number(2, "high")?,
        low: number(3, "low")?,
        close: number(4, "close")?,
        volume: number(5, "volume")?,
    })
}

fn parse_forecast_line(line: &str) -> Result<ForecastPoint, String> {
    let (timestamp, value) = parse_close_line(line)?;
    Ok(ForecastPoint { timestamp, value })
}

fn parse_close_line(line: &str) -> Result<(DateTime<Utc>, f64), String> {
    let (ts, value) = line
        .trim()
        .split_once(',')
        .ok_or("expected timestamp,value")?;
    let timestamp =
        parse_timestamp(ts).ok_or_else(|| format!("unparseable timestamp {ts:?}"))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value: {e}"))?;
    Ok((timestamp, value))
}
