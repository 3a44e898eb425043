//! OHLC bar representation.

use chrono::{DateTime, Utc};

/// One market-data bar. Timestamps are the bar's open time in UTC.
#[derive(Debug, Clone, PartialEq)]
pub struct OhlcBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}
