//! Evaluation sweep and retraining trigger.
//!
//! Every tracked (model, horizon) pair is scored against the same three
//! thresholds; one breach anywhere flags the whole run. Retraining is
//! all-or-nothing across model types, and a training failure never
//! propagates past this module.

use crate::domain::metrics::{calculate_metrics, AccuracyMetrics, MetricRecord};
use crate::domain::prediction::{Horizon, ModelType, PredictionRecord};
use crate::ports::model_port::ModelTrainerPort;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricThresholds {
    pub mape: f64,
    pub mae: f64,
    pub rmse: f64,
}

impl Default for MetricThresholds {
    fn default() -> Self {
        Self {
            mape: 10.0,
            mae: 500.0,
            rmse: 600.0,
        }
    }
}

/// OR-combined breach check. An undefined MAPE never breaches.
pub fn breaches(metrics: &AccuracyMetrics, thresholds: &MetricThresholds) -> bool {
    metrics.mape.is_some_and(|mape| mape > thresholds.mape)
        || metrics.mae > thresholds.mae
        || metrics.rmse > thresholds.rmse
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationSweep {
    pub computed: Vec<MetricRecord>,
    pub retrain_needed: bool,
}

/// Computes metrics for every tracked (model, horizon) pair for `symbol`.
/// Pairs with no resolved data in the window produce no record. Returns
/// the records to append plus whether any pair breached a threshold.
pub fn evaluate_sweep(
    records: &[PredictionRecord],
    symbol: &str,
    lookback_days: i64,
    thresholds: &MetricThresholds,
    now: DateTime<Utc>,
) -> EvaluationSweep {
    let mut computed = Vec::new();
    let mut retrain_needed = false;

    for model in ModelType::ALL {
        for horizon in Horizon::ALL {
            let Some(metrics) =
                calculate_metrics(records, model, horizon, symbol, lookback_days, now)
            else {
                continue;
            };

            if breaches(&metrics, thresholds) {
                warn!(
                    %model,
                    %horizon,
                    %symbol,
                    mae = metrics.mae,
                    rmse = metrics.rmse,
                    mape = ?metrics.mape,
                    "metrics exceed thresholds"
                );
                retrain_needed = true;
            }

            computed.push(MetricRecord {
                timestamp: now,
                model_type: model,
                horizon,
                symbol: symbol.to_string(),
                mae: metrics.mae,
                rmse: metrics.rmse,
                mape: metrics.mape,
            });
        }
    }

    EvaluationSweep {
        computed,
        retrain_needed,
    }
}

/// Retrains every tracked model type, synchronously and in order. A
/// failure is logged and the remaining models are still attempted.
/// Returns true only when every model retrained successfully.
pub fn retrain_all(trainer: &dyn ModelTrainerPort) -> bool {
    let mut all_ok = true;
    for model in ModelType::ALL {
        info!(%model, "starting model retraining");
        match trainer.retrain(model) {
            Ok(()) => info!(%model, "model retraining complete"),
            Err(e) => {
                error!(%model, error = %e, "model retraining failed");
                all_ok = false;
            }
        }
    }
    all_ok
}
