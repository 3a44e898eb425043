//! Prediction ledger record types.
//!
//! A [`PredictionRecord`] is created when a forecast is logged and resolved
//! exactly once when the realized price for its target time becomes known.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Forecasting model families tracked by the evaluation sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    Arima,
    Lstm,
}

impl ModelType {
    pub const ALL: [ModelType; 2] = [ModelType::Arima, ModelType::Lstm];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Arima => "arima",
            ModelType::Lstm => "lstm",
        }
    }

    pub fn parse(s: &str) -> Option<ModelType> {
        match s.trim().to_lowercase().as_str() {
            "arima" => Some(ModelType::Arima),
            "lstm" => Some(ModelType::Lstm),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forward distance a prediction targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Horizon {
    H1,
    H3,
    H24,
    H72,
}

impl Horizon {
    pub const ALL: [Horizon; 4] = [Horizon::H1, Horizon::H3, Horizon::H24, Horizon::H72];

    pub fn as_str(&self) -> &'static str {
        match self {
            Horizon::H1 => "1h",
            Horizon::H3 => "3h",
            Horizon::H24 => "24h",
            Horizon::H72 => "72h",
        }
    }

    pub fn hours(&self) -> i64 {
        match self {
            Horizon::H1 => 1,
            Horizon::H3 => 3,
            Horizon::H24 => 24,
            Horizon::H72 => 72,
        }
    }

    pub fn parse(s: &str) -> Option<Horizon> {
        match s.trim() {
            "1h" => Some(Horizon::H1),
            "3h" => Some(Horizon::H3),
            "24h" => Some(Horizon::H24),
            "72h" => Some(Horizon::H72),
            _ => None,
        }
    }
}

impl std::fmt::Display for Horizon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged forecast. `timestamp` is the target time the prediction is
/// for, not the time it was made. `actual_price` and `error` stay unset
/// until reconciliation; `error = predicted_price - actual_price`.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub horizon: Horizon,
    pub model_type: ModelType,
    pub predicted_price: f64,
    pub actual_price: Option<f64>,
    pub error: Option<f64>,
}

impl PredictionRecord {
    pub fn is_resolved(&self) -> bool {
        self.actual_price.is_some()
    }

    /// Sets the realized price and the signed error.
    pub fn resolve(&mut self, actual: f64) {
        self.actual_price = Some(actual);
        self.error = Some(self.predicted_price - actual);
    }
}

/// Parses a ledger timestamp. Accepts RFC 3339 and the naive
/// `YYYY-MM-DD HH:MM:SS` form older files carry (read as UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let trimmed = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    None
}
