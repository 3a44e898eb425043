//! Strategy backtest over historical predictions.
//!
//! Replays logged 24h predictions against the bar at prediction time
//! through the same pure decision function the live strategy uses, into
//! an in-memory portfolio. Nothing here touches the persisted ledgers.

use crate::domain::ohlcv::OhlcBar;
use crate::domain::portfolio::{PortfolioState, PortfolioValueSample};
use crate::domain::prediction::{Horizon, ModelType, PredictionRecord};
use crate::domain::strategy::{decide, size_order, Order, TradeThresholds};
use chrono::{DateTime, Timelike, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub initial_cash: f64,
    pub thresholds: TradeThresholds,
    pub min_notional: f64,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub final_state: PortfolioState,
    pub value_history: Vec<PortfolioValueSample>,
    pub executed_orders: usize,
    pub steps: usize,
}

/// Runs the replay for one (model, symbol) over the 24h horizon.
/// Predictions with no bar at their target hour are skipped.
pub fn run_backtest(
    predictions: &[PredictionRecord],
    bars: &[OhlcBar],
    symbol: &str,
    model: ModelType,
    config: &BacktestConfig,
) -> BacktestResult {
    let closes: HashMap<DateTime<Utc>, f64> = bars
        .iter()
        .map(|bar| (truncate_to_hour(bar.timestamp), bar.close))
        .collect();

    let mut steps: Vec<&PredictionRecord> = predictions
        .iter()
        .filter(|p| p.model_type == model && p.horizon == Horizon::H24 && p.symbol == symbol)
        .collect();
    steps.sort_by_key(|p| p.timestamp);

    let mut state = PortfolioState::new(config.initial_cash);
    let mut value_history = Vec::new();
    let mut executed_orders = 0;
    let mut replayed = 0;

    for prediction in steps {
        let Some(&price) = closes.get(&truncate_to_hour(prediction.timestamp)) else {
            continue;
        };
        replayed += 1;

        let predicted_change_pct = (prediction.predicted_price - price) / price;
        let action = decide(predicted_change_pct, &config.thresholds);
        let order = size_order(
            action,
            state.cash,
            state.holding(symbol),
            config.min_notional,
        );
        let executed = match order {
            Order::Buy { amount } => state.apply_buy(symbol, amount, price),
            Order::Sell { quantity } => state.apply_sell(symbol, quantity, price),
            Order::None => false,
        };
        if executed {
            executed_orders += 1;
        }

        let prices = HashMap::from([(symbol.to_string(), price)]);
        value_history.push(PortfolioValueSample {
            timestamp: prediction.timestamp,
            portfolio_value: state.value(&prices),
        });
    }

    BacktestResult {
        final_state: state,
        value_history,
        executed_orders,
        steps: replayed,
    }
}

fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}
