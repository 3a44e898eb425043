//! Model training and inference port traits.

use crate::domain::error::ForesightError;
use crate::domain::prediction::{Horizon, ModelType};
use chrono::{DateTime, Utc};

/// Blocking invocation of the external training procedure for one model
/// type. Success implies a new loadable model artifact exists.
pub trait ModelTrainerPort {
    fn retrain(&self, model: ModelType) -> Result<(), ForesightError>;
}

/// One forecast step produced by model inference.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Inference against the latest trained model of a type.
pub trait ForecastPort {
    fn forecast(
        &self,
        model: ModelType,
        horizon: Horizon,
    ) -> Result<Vec<ForecastPoint>, ForesightError>;
}
