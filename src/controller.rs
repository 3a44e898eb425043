//! The closed-loop controller.
//!
//! Wires the file stores, the external-collaborator ports and the domain
//! jobs together, and runs them either once (manual CLI invocation) or
//! forever under the interval scheduler. Jobs run strictly sequentially;
//! a job failure is logged and the loop moves on.

use crate::adapters::command_adapter::{
    CommandForecaster, CommandMarketData, CommandPriceFeed, CommandTrainer,
};
use crate::adapters::counter_store::RetrainTracker;
use crate::adapters::market_data_csv::MarketDataCsv;
use crate::adapters::metrics_store::MetricsStore;
use crate::adapters::portfolio_store::{PortfolioLedger, PortfolioStore};
use crate::adapters::prediction_store::PredictionStore;
use crate::domain::backtest::{run_backtest, BacktestConfig, BacktestResult};
use crate::domain::error::ForesightError;
use crate::domain::evaluation::{evaluate_sweep, retrain_all};
use crate::domain::ohlcv::OhlcBar;
use crate::domain::performance::{compute, PerformanceMetrics};
use crate::domain::prediction::{Horizon, ModelType, PredictionRecord};
use crate::domain::reconcile::{reconcile_records, ReconcileSummary};
use crate::domain::scheduler::{JobKind, Scheduler};
use crate::domain::settings::AppConfig;
use crate::domain::strategy::{decide, size_order, Action, Order};
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::model_port::{ForecastPort, ModelTrainerPort};
use crate::ports::price_port::PriceHistoryPort;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use tracing::{error, info, warn};

pub struct Controller {
    config: AppConfig,
    predictions: PredictionStore,
    metrics: MetricsStore,
    market: MarketDataCsv,
    ledger: PortfolioLedger,
    tracker: RetrainTracker,
    market_data: Option<Box<dyn MarketDataPort>>,
    trainer: Box<dyn ModelTrainerPort>,
    forecaster: Option<Box<dyn ForecastPort>>,
    remote_prices: Option<Box<dyn PriceHistoryPort>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationOutcome {
    pub stored: usize,
    pub retrain_needed: bool,
    pub retrained: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyOutcome {
    pub action: Action,
    pub executed: bool,
    pub portfolio_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub bar: Option<OhlcBar>,
    pub resolved: usize,
    pub logged_forecasts: usize,
}

impl Controller {
    /// Wires a controller over explicit port implementations. The data
    /// directory is created if missing.
    pub fn new(
        config: AppConfig,
        market_data: Option<Box<dyn MarketDataPort>>,
        trainer: Box<dyn ModelTrainerPort>,
        forecaster: Option<Box<dyn ForecastPort>>,
        remote_prices: Option<Box<dyn PriceHistoryPort>>,
    ) -> Result<Self, ForesightError> {
        fs::create_dir_all(&config.data_dir)?;
        let predictions = PredictionStore::new(config.data_dir.join("predictions.csv"));
        let metrics = MetricsStore::new(config.data_dir.join("metrics.csv"));
        let market = MarketDataCsv::new(config.data_dir.join("market_data.csv"));
        let ledger = PortfolioLedger::open(
            PortfolioStore::new(&config.data_dir),
            config.initial_cash,
        )?;
        let tracker = RetrainTracker::new(&config.data_dir);
        Ok(Self {
            config,
            predictions,
            metrics,
            market,
            ledger,
            tracker,
            market_data,
            trainer,
            forecaster,
            remote_prices,
        })
    }

    /// Wires every external collaborator from the configured command
    /// lines.
    pub fn from_config(config: AppConfig) -> Result<Self, ForesightError> {
        let market_data: Option<Box<dyn MarketDataPort>> = config
            .fetch_command
            .clone()
            .map(|cmd| Box::new(CommandMarketData::new(cmd)) as Box<dyn MarketDataPort>);
        let trainer: Box<dyn ModelTrainerPort> = Box::new(CommandTrainer::new(
            config.arima_train_command.clone(),
            config.lstm_train_command.clone(),
        ));
        let forecaster: Option<Box<dyn ForecastPort>> = config
            .forecast_command
            .clone()
            .map(|cmd| Box::new(CommandForecaster::new(cmd)) as Box<dyn ForecastPort>);
        let remote_prices: Option<Box<dyn PriceHistoryPort>> = config
            .remote_price_command
            .clone()
            .map(|cmd| Box::new(CommandPriceFeed::new(cmd)) as Box<dyn PriceHistoryPort>);
        Self::new(config, market_data, trainer, forecaster, remote_prices)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn predictions(&self) -> &PredictionStore {
        &self.predictions
    }

    pub fn metrics_store(&self) -> &MetricsStore {
        &self.metrics
    }

    pub fn market(&self) -> &MarketDataCsv {
        &self.market
    }

    pub fn ledger(&self) -> &PortfolioLedger {
        &self.ledger
    }

    pub fn tracker(&self) -> &RetrainTracker {
        &self.tracker
    }

    /// The hourly ingest cycle: pull the newest bar, resolve predictions
    /// targeting it, archive it, log fresh forecasts, evaluate, trade,
    /// and advance the row-count retraining trigger.
    pub fn run_fetch_cycle(&mut self, now: DateTime<Utc>) -> Result<FetchOutcome, ForesightError> {
        let Some(market_data) = &self.market_data else {
            warn!("no fetch command configured, skipping fetch cycle");
            return Ok(FetchOutcome {
                bar: None,
                resolved: 0,
                logged_forecasts: 0,
            });
        };
        let Some(bar) = market_data.fetch_latest(&self.config.symbol)? else {
            info!("no new market data available");
            return Ok(FetchOutcome {
                bar: None,
                resolved: 0,
                logged_forecasts: 0,
            });
        };

        let resolved =
            self.predictions
                .update_with_actual(bar.timestamp, &self.config.symbol, bar.close)?;
        self.market.append_bar(&bar)?;
        info!(timestamp = %bar.timestamp, close = bar.close, resolved, "ingested bar");

        let logged_forecasts = self.log_forecasts()?;
        self.run_evaluation(now)?;
        self.run_strategy(Some(bar.close), now)?;

        let total = self.tracker.add_rows(1)?;
        if total >= self.config.retrain_row_threshold {
            info!(
                rows = total,
                threshold = self.config.retrain_row_threshold,
                "row-count threshold reached, triggering model retraining"
            );
            if retrain_all(self.trainer.as_ref()) {
                self.tracker.reset(now)?;
            }
        }

        Ok(FetchOutcome {
            bar: Some(bar),
            resolved,
            logged_forecasts,
        })
    }

    /// Logs one prediction per forecast step for every tracked (model,
    /// horizon) pair. Inference failures skip the pair.
    fn log_forecasts(&self) -> Result<usize, ForesightError> {
        let Some(forecaster) = &self.forecaster else {
            return Ok(0);
        };
        let mut logged = 0;
        for model in ModelType::ALL {
            for horizon in Horizon::ALL {
                let points = match forecaster.forecast(model, horizon) {
                    Ok(points) => points,
                    Err(e) => {
                        warn!(%model, %horizon, error = %e, "forecast failed, skipping");
                        continue;
                    }
                };
                for point in points {
                    self.predictions.append(&PredictionRecord {
                        timestamp: point.timestamp,
                        symbol: self.config.symbol.clone(),
                        horizon,
                        model_type: model,
                        predicted_price: point.value,
                        actual_price: None,
                        error: None,
                    })?;
                    logged += 1;
                }
            }
        }
        Ok(logged)
    }

    /// The hourly backfill pass over the whole ledger.
    pub fn run_reconcile(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ReconcileSummary, ForesightError> {
        let mut records = self.predictions.load()?;
        let summary = reconcile_records(
            &mut records,
            &self.market,
            self.remote_prices.as_deref(),
            now,
        )?;
        if summary.resolved() > 0 {
            self.predictions.save(&records)?;
        }
        Ok(summary)
    }

    /// The daily evaluation sweep plus the metric-based retraining
    /// trigger.
    pub fn run_evaluation(
        &self,
        now: DateTime<Utc>,
    ) -> Result<EvaluationOutcome, ForesightError> {
        let records = self.predictions.load()?;
        let sweep = evaluate_sweep(
            &records,
            &self.config.symbol,
            self.config.lookback_days,
            &self.config.metric_thresholds,
            now,
        );
        for record in &sweep.computed {
            self.metrics.append(record)?;
        }

        let mut retrained = false;
        if sweep.retrain_needed {
            info!("metric thresholds exceeded, triggering model retraining");
            retrained = retrain_all(self.trainer.as_ref());
            if retrained {
                self.tracker.reset(now)?;
            }
        }

        Ok(EvaluationOutcome {
            stored: sweep.computed.len(),
            retrain_needed: sweep.retrain_needed,
            retrained,
        })
    }

    /// The live strategy: read the newest 24h prediction from the
    /// configured model, decide against the live price, execute, and
    /// always record a portfolio-value sample. With no prediction it
    /// holds; it never errors for that.
    pub fn run_strategy(
        &mut self,
        price_override: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<StrategyOutcome, ForesightError> {
        let symbol = self.config.symbol.clone();
        let price = match price_override {
            Some(price) => Some(price),
            None => self.latest_close(&symbol)?,
        };
        let Some(price) = price else {
            warn!("no live price available, skipping strategy run");
            return Ok(StrategyOutcome {
                action: Action::Hold,
                executed: false,
                portfolio_value: None,
            });
        };

        let latest = self.predictions.latest_prediction(
            self.config.strategy_model,
            Horizon::H24,
            &symbol,
        )?;
        let action = match &latest {
            Some(prediction) => {
                let predicted_change_pct = (prediction.predicted_price - price) / price;
                info!(
                    predicted = prediction.predicted_price,
                    price,
                    change_pct = predicted_change_pct,
                    "evaluating live strategy"
                );
                decide(predicted_change_pct, &self.config.trade_thresholds)
            }
            None => {
                info!("no 24h prediction available, holding");
                Action::Hold
            }
        };

        let order = size_order(
            action,
            self.ledger.state().cash,
            self.ledger.state().holding(&symbol),
            self.config.min_notional,
        );
        let executed = match order {
            Order::Buy { amount } => self.ledger.buy(&symbol, amount, price, now)?,
            Order::Sell { quantity } => self.ledger.sell(&symbol, quantity, price, now)?,
            Order::None => false,
        };

        let prices = HashMap::from([(symbol, price)]);
        let portfolio_value = self.ledger.record_value(&prices, now)?;
        Ok(StrategyOutcome {
            action,
            executed,
            portfolio_value: Some(portfolio_value),
        })
    }

    fn latest_close(&self, symbol: &str) -> Result<Option<f64>, ForesightError> {
        if let Some(market_data) = &self.market_data {
            if let Some(bar) = market_data.fetch_latest(symbol)? {
                return Ok(Some(bar.close));
            }
        }
        Ok(self.market.fetch_latest(symbol)?.map(|bar| bar.close))
    }

    /// Replays logged predictions against the archived bars.
    pub fn run_backtest(&self) -> Result<BacktestResult, ForesightError> {
        let predictions = self.predictions.load()?;
        let bars = self.market.load()?;
        Ok(run_backtest(
            &predictions,
            &bars,
            &self.config.symbol,
            self.config.strategy_model,
            &BacktestConfig {
                initial_cash: self.config.initial_cash,
                thresholds: self.config.trade_thresholds,
                min_notional: self.config.min_notional,
            },
        ))
    }

    pub fn performance(&self) -> Result<PerformanceMetrics, ForesightError> {
        let samples = self.ledger.store().value_history()?;
        Ok(compute(&samples, self.config.risk_free_rate))
    }
}

/// Runs the scheduler loop forever. Job errors are logged, never fatal.
pub fn run_loop(controller: &mut Controller, scheduler: &mut Scheduler) {
    info!("controller loop started");
    loop {
        let now = Utc::now();
        for job in scheduler.due_jobs(now) {
            let result = match job {
                JobKind::Fetch => controller.run_fetch_cycle(now).map(|_| ()),
                JobKind::Reconcile => controller.run_reconcile(now).map(|_| ()),
                JobKind::Evaluate => controller.run_evaluation(now).map(|_| ()),
            };
            if let Err(e) = result {
                error!(job = ?job, error = %e, "scheduled job failed");
            }
        }
        let sleep = match scheduler.next_due() {
            Some(due) => (due - Utc::now()).to_std().unwrap_or_default(),
            None => std::time::Duration::from_secs(60),
        };
        std::thread::sleep(sleep);
    }
}
