//! Market data access port trait.

use crate::domain::error::ForesightError;
use crate::domain::ohlcv::OhlcBar;
use chrono::{DateTime, Utc};

/// Source of OHLC bars. Implementations must tolerate transient upstream
/// failure by returning `None` / an empty range rather than an error.
pub trait MarketDataPort {
    fn fetch_latest(&self, symbol: &str) -> Result<Option<OhlcBar>, ForesightError>;

    fn fetch_range(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OhlcBar>, ForesightError>;
}
