#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use foresight::domain::error::ForesightError;
use foresight::domain::evaluation::MetricThresholds;
use foresight::domain::ohlcv::OhlcBar;
use foresight::domain::prediction::{Horizon, ModelType, PredictionRecord};
use foresight::domain::settings::AppConfig;
use foresight::domain::strategy::TradeThresholds;
use foresight::ports::market_data_port::MarketDataPort;
use foresight::ports::model_port::{ForecastPoint, ForecastPort, ModelTrainerPort};
use foresight::ports::price_port::PriceHistoryPort;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
}

pub fn test_config(data_dir: &Path) -> AppConfig {
    AppConfig {
        data_dir: data_dir.to_path_buf(),
        symbol: "BTC-USD".to_string(),
        initial_cash: 1_000.0,
        trade_thresholds: TradeThresholds::default(),
        min_notional: 10.0,
        strategy_model: ModelType::Arima,
        lookback_days: 30,
        metric_thresholds: MetricThresholds::default(),
        retrain_row_threshold: 1_000,
        risk_free_rate: 0.02,
        fetch_interval_hours: 1,
        reconcile_interval_hours: 1,
        evaluate_interval_hours: 24,
        fetch_command: None,
        arima_train_command: None,
        lstm_train_command: None,
        forecast_command: None,
        remote_price_command: None,
    }
}

pub fn make_bar(ts: DateTime<Utc>, close: f64) -> OhlcBar {
    OhlcBar {
        timestamp: ts,
        open: close - 10.0,
        high: close + 20.0,
        low: close - 30.0,
        close,
        volume: 1_000.0,
    }
}

pub fn pending_prediction(
    ts: DateTime<Utc>,
    model: ModelType,
    horizon: Horizon,
    predicted: f64,
) -> PredictionRecord {
    PredictionRecord {
        timestamp: ts,
        symbol: "BTC-USD".to_string(),
        horizon,
        model_type: model,
        predicted_price: predicted,
        actual_price: None,
        error: None,
    }
}

pub fn resolved_prediction(
    ts: DateTime<Utc>,
    model: ModelType,
    horizon: Horizon,
    predicted: f64,
    actual: f64,
) -> PredictionRecord {
    let mut record = pending_prediction(ts, model, horizon, predicted);
    record.resolve(actual);
    record
}

/// Scripted market data source.
pub struct MockMarketData {
    pub latest: Option<OhlcBar>,
    pub range: Vec<OhlcBar>,
}

impl MockMarketData {
    pub fn new(latest: Option<OhlcBar>) -> Self {
        Self {
            latest,
            range: Vec::new(),
        }
    }
}

impl MarketDataPort for MockMarketData {
    fn fetch_latest(&self, _symbol: &str) -> Result<Option<OhlcBar>, ForesightError> {
        Ok(self.latest.clone())
    }

    fn fetch_range(
        &self,
        _symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OhlcBar>, ForesightError> {
        Ok(self
            .range
            .iter()
            .filter(|b| b.timestamp >= start && b.timestamp <= end)
            .cloned()
            .collect())
    }
}

/// Trainer that records invocations; the shared handle outlives the
/// controller that boxes it.
pub struct MockTrainer {
    pub calls: Rc<RefCell<Vec<ModelType>>>,
    pub fail: bool,
}

impl MockTrainer {
    pub fn new() -> (Self, Rc<RefCell<Vec<ModelType>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                calls: Rc::clone(&calls),
                fail: false,
            },
            calls,
        )
    }
}

impl ModelTrainerPort for MockTrainer {
    fn retrain(&self, model: ModelType) -> Result<(), ForesightError> {
        self.calls.borrow_mut().push(model);
        if self.fail {
            return Err(ForesightError::Training {
                model: model.as_str().into(),
                reason: "exit status 1".into(),
            });
        }
        Ok(())
    }
}

/// Forecaster scripted per (model, horizon) pair.
pub struct MockForecaster {
    pub points: BTreeMap<(&'static str, &'static str), Vec<ForecastPoint>>,
}

impl MockForecaster {
    pub fn empty() -> Self {
        Self {
            points: BTreeMap::new(),
        }
    }

    pub fn with(
        mut self,
        model: ModelType,
        horizon: Horizon,
        points: Vec<ForecastPoint>,
    ) -> Self {
        self.points.insert((model.as_str(), horizon.as_str()), points);
        self
    }
}

impl ForecastPort for MockForecaster {
    fn forecast(
        &self,
        model: ModelType,
        horizon: Horizon,
    ) -> Result<Vec<ForecastPoint>, ForesightError> {
        Ok(self
            .points
            .get(&(model.as_str(), horizon.as_str()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Remote price history backed by a fixed map.
pub struct MockPriceFeed {
    pub closes: BTreeMap<DateTime<Utc>, f64>,
    pub calls: Rc<RefCell<usize>>,
}

impl MockPriceFeed {
    pub fn new(closes: BTreeMap<DateTime<Utc>, f64>) -> (Self, Rc<RefCell<usize>>) {
        let calls = Rc::new(RefCell::new(0));
        (
            Self {
                closes,
                calls: Rc::clone(&calls),
            },
            calls,
        )
    }
}

impl PriceHistoryPort for MockPriceFeed {
    fn fetch_closes(
        &self,
        _symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BTreeMap<DateTime<Utc>, f64>, ForesightError> {
        *self.calls.borrow_mut() += 1;
        Ok(self
            .closes
            .range(start..=end)
            .map(|(ts, close)| (*ts, *close))
            .collect())
    }
}
