//! Typed application configuration.
//!
//! Built from a [`ConfigPort`] with defaults matching a small single-host
//! deployment; values that would make the controller misbehave are
//! rejected up front rather than discovered mid-run.

use crate::domain::error::ForesightError;
use crate::domain::evaluation::MetricThresholds;
use crate::domain::prediction::ModelType;
use crate::domain::strategy::TradeThresholds;
use crate::ports::config_port::ConfigPort;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub symbol: String,

    pub initial_cash: f64,
    pub trade_thresholds: TradeThresholds,
    pub min_notional: f64,
    /// The model the live strategy reads its predictions from. Explicit
    /// configuration, never inferred from current metrics.
    pub strategy_model: ModelType,

    pub lookback_days: i64,
    pub metric_thresholds: MetricThresholds,
    pub retrain_row_threshold: i64,
    pub risk_free_rate: f64,

    pub fetch_interval_hours: i64,
    pub reconcile_interval_hours: i64,
    pub evaluate_interval_hours: i64,

    pub fetch_command: Option<String>,
    pub arima_train_command: Option<String>,
    pub lstm_train_command: Option<String>,
    pub forecast_command: Option<String>,
    pub remote_price_command: Option<String>,
}

pub fn build_app_config(config: &dyn ConfigPort) -> Result<AppConfig, ForesightError> {
    let data_dir = PathBuf::from(
        config
            .get_string("data", "dir")
            .unwrap_or_else(|| "data".to_string()),
    );
    let symbol = config
        .get_string("data", "symbol")
        .unwrap_or_else(|| "BTC-USD".to_string());

    let initial_cash = positive(config, "trading", "initial_cash", 10_000.0)?;
    let trade_thresholds = TradeThresholds {
        buy_pct: positive(config, "trading", "buy_threshold_pct", 0.02)?,
        sell_pct: positive(config, "trading", "sell_threshold_pct", 0.02)?,
    };
    let min_notional = positive(config, "trading", "min_notional", 10.0)?;

    let strategy_model_raw = config
        .get_string("trading", "strategy_model")
        .unwrap_or_else(|| "arima".to_string());
    let strategy_model =
        ModelType::parse(&strategy_model_raw).ok_or_else(|| ForesightError::ConfigInvalid {
            section: "trading".into(),
            key: "strategy_model".into(),
            reason: format!("unknown model type {strategy_model_raw:?}"),
        })?;

    let lookback_days = positive_int(config, "evaluation", "lookback_days", 30)?;
    let metric_thresholds = MetricThresholds {
        mape: positive(config, "evaluation", "mape_threshold", 10.0)?,
        mae: positive(config, "evaluation", "mae_threshold", 500.0)?,
        rmse: positive(config, "evaluation", "rmse_threshold", 600.0)?,
    };
    let retrain_row_threshold = positive_int(config, "retraining", "row_threshold", 1)?;
    let risk_free_rate = config.get_double("performance", "risk_free_rate", 0.02);

    let fetch_interval_hours = positive_int(config, "schedule", "fetch_interval_hours", 1)?;
    let reconcile_interval_hours =
        positive_int(config, "schedule", "reconcile_interval_hours", 1)?;
    let evaluate_interval_hours =
        positive_int(config, "schedule", "evaluate_interval_hours", 24)?;

    Ok(AppConfig {
        data_dir,
        symbol,
        initial_cash,
        trade_thresholds,
        min_notional,
        strategy_model,
        lookback_days,
        metric_thresholds,
        retrain_row_threshold,
        risk_free_rate,
        fetch_interval_hours,
        reconcile_interval_hours,
        evaluate_interval_hours,
        fetch_command: config.get_string("commands", "fetch"),
        arima_train_command: config.get_string("commands", "arima_train"),
        lstm_train_command: config.get_string("commands", "lstm_train"),
        forecast_command: config.get_string("commands", "forecast"),
        remote_price_command: config.get_string("commands", "remote_prices"),
    })
}

fn positive(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, ForesightError> {
    let value = config.get_double(section, key, default);
    if value <= 0.0 {
        return Err(ForesightError::ConfigInvalid {
            section: section.into(),
            key: key.into(),
            reason: format!("must be positive, got {value}"),
        });
    }
    Ok(value)
}

fn positive_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, ForesightError> {
    let value = config.get_int(section, key, default);
    if value <= 0 {
        return Err(ForesightError::ConfigInvalid {
            section: section.into(),
            key: key.into(),
            reason: format!("must be positive, got {value}"),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    #[test]
    fn defaults_apply_for_empty_config() {
        let adapter = FileConfigAdapter::from_string("[data]\n").unwrap();
        let config = build_app_config(&adapter).unwrap();

        assert_eq!(config.symbol, "BTC-USD");
        assert_eq!(config.initial_cash, 10_000.0);
        assert_eq!(config.strategy_model, ModelType::Arima);
        assert_eq!(config.trade_thresholds.buy_pct, 0.02);
        assert_eq!(config.lookback_days, 30);
        assert_eq!(config.metric_thresholds.mae, 500.0);
        assert_eq!(config.evaluate_interval_hours, 24);
        assert!(config.fetch_command.is_none());
    }

    #[test]
    fn explicit_values_override_defaults() {
        let adapter = FileConfigAdapter::from_string(
            "[data]\n\
             symbol = ETH-USD\n\
             [trading]\n\
             initial_cash = 5000\n\
             strategy_model = lstm\n\
             [evaluation]\n\
             mae_threshold = 250\n\
             [commands]\n\
             arima_train = python model/arima_model.py\n",
        )
        .unwrap();
        let config = build_app_config(&adapter).unwrap();

        assert_eq!(config.symbol, "ETH-USD");
        assert_eq!(config.initial_cash, 5_000.0);
        assert_eq!(config.strategy_model, ModelType::Lstm);
        assert_eq!(config.metric_thresholds.mae, 250.0);
        assert_eq!(
            config.arima_train_command.as_deref(),
            Some("python model/arima_model.py")
        );
    }

    #[test]
    fn unknown_strategy_model_is_rejected() {
        let adapter =
            FileConfigAdapter::from_string("[trading]\nstrategy_model = prophet\n").unwrap();
        assert!(matches!(
            build_app_config(&adapter),
            Err(ForesightError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn non_positive_values_are_rejected() {
        let adapter =
            FileConfigAdapter::from_string("[trading]\ninitial_cash = -100\n").unwrap();
        assert!(matches!(
            build_app_config(&adapter),
            Err(ForesightError::ConfigInvalid { .. })
        ));

        let adapter =
            FileConfigAdapter::from_string("[schedule]\nfetch_interval_hours = 0\n").unwrap();
        assert!(matches!(
            build_app_config(&adapter),
            Err(ForesightError::ConfigInvalid { .. })
        ));
    }
}
