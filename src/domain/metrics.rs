//! Forecast accuracy metrics.
//!
//! MAE, RMSE and MAPE over a trailing window of resolved predictions per
//! (model, horizon, symbol) triple. An empty filtered set yields absent,
//! never zero, so callers can tell "no data yet" from "no error".

use crate::domain::prediction::{Horizon, ModelType, PredictionRecord};
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyMetrics {
    pub mae: f64,
    pub rmse: f64,
    /// Undefined when any actual price in the window is exactly 0.
    pub mape: Option<f64>,
}

/// One appended evaluation result. `symbol` may be empty in rows written
/// before the column existed; history queries treat those as matching any
/// symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub timestamp: DateTime<Utc>,
    pub model_type: ModelType,
    pub horizon: Horizon,
    pub symbol: String,
    pub mae: f64,
    pub rmse: f64,
    pub mape: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricName {
    Mae,
    Rmse,
    Mape,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::Mae => "mae",
            MetricName::Rmse => "rmse",
            MetricName::Mape => "mape",
        }
    }

    pub fn parse(s: &str) -> Option<MetricName> {
        match s.trim().to_lowercase().as_str() {
            "mae" => Some(MetricName::Mae),
            "rmse" => Some(MetricName::Rmse),
            "mape" => Some(MetricName::Mape),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Accuracy over resolved predictions matching the triple, with target
/// times inside `[now - lookback_days, now]`. Returns `None` when the
/// filtered set is empty.
pub fn calculate_metrics(
    records: &[PredictionRecord],
    model: ModelType,
    horizon: Horizon,
    symbol: &str,
    lookback_days: i64,
    now: DateTime<Utc>,
) -> Option<AccuracyMetrics> {
    let start = now - Duration::days(lookback_days);
    let window: Vec<(f64, f64)> = records
        .iter()
        .filter(|r| {
            r.model_type == model
                && r.horizon == horizon
                && r.symbol == symbol
                && r.timestamp >= start
                && r.timestamp <= now
        })
        .filter_map(|r| r.actual_price.map(|actual| (r.predicted_price, actual)))
        .collect();

    if window.is_empty() {
        return None;
    }

    let n = window.len() as f64;
    let mae = window.iter().map(|(p, a)| (p - a).abs()).sum::<f64>() / n;
    let rmse = (window.iter().map(|(p, a)| (p - a).powi(2)).sum::<f64>() / n).sqrt();
    let mape = if window.iter().any(|(_, a)| *a == 0.0) {
        None
    } else {
        Some(window.iter().map(|(p, a)| (p - a).abs() / a).sum::<f64>() / n * 100.0)
    };

    Some(AccuracyMetrics { mae, rmse, mape })
}

/// Time-filtered projection of one metric column. Rows whose symbol field
/// is empty predate the column and match any symbol. Rows where the
/// requested metric is undefined are skipped.
pub fn metric_history(
    records: &[MetricRecord],
    model: ModelType,
    horizon: Horizon,
    symbol: &str,
    metric: MetricName,
    days: i64,
    now: DateTime<Utc>,
) -> Vec<MetricPoint> {
    let start = now - Duration::days(days);
    records
        .iter()
        .filter(|r| {
            r.model_type == model
                && r.horizon == horizon
                && r.timestamp >= start
                && r.timestamp <= now
                && (r.symbol.is_empty() || r.symbol == symbol)
        })
        .filter_map(|r| {
            let value = match metric {
                MetricName::Mae => Some(r.mae),
                MetricName::Rmse => Some(r.rmse),
                MetricName::Mape => r.mape,
            };
            value.map(|value| MetricPoint {
                timestamp: r.timestamp,
                value,
            })
        })
        .collect()
}
