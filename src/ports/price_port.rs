//! Realized-price lookup port traits.

use crate::domain::error::ForesightError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Point lookup against an already-materialized local source.
pub trait PriceLookupPort {
    /// Close price at exactly `timestamp`, or `None` when the source has
    /// no row for it.
    fn close_at(
        &self,
        symbol: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<f64>, ForesightError>;
}

/// Batched lookup against a remote source. One call covers a whole
/// timestamp span so reconciliation never issues per-row remote requests.
pub trait PriceHistoryPort {
    fn fetch_closes(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BTreeMap<DateTime<Utc>, f64>, ForesightError>;
}
