//! Actual-value reconciliation.
//!
//! Matches pending predictions whose target time has passed against
//! realized prices: the local source first, then one batched remote fetch
//! covering the remaining gap. Records neither source can resolve stay
//! pending and are retried on the next pass.

use crate::domain::error::ForesightError;
use crate::domain::prediction::PredictionRecord;
use crate::ports::price_port::{PriceHistoryPort, PriceLookupPort};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub pending: usize,
    pub resolved_local: usize,
    pub resolved_remote: usize,
    pub unresolved: usize,
}

impl ReconcileSummary {
    pub fn resolved(&self) -> usize {
        self.resolved_local + self.resolved_remote
    }
}

/// Resolves in place every record with an unset actual price and a target
/// time strictly before `now`. The caller persists the slice only when
/// `summary.resolved() > 0`, which keeps a second pass with no new
/// realized prices from touching the file at all.
pub fn reconcile_records(
    records: &mut [PredictionRecord],
    local: &dyn PriceLookupPort,
    remote: Option<&dyn PriceHistoryPort>,
    now: DateTime<Utc>,
) -> Result<ReconcileSummary, ForesightError> {
    let pending_indices: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.is_resolved() && r.timestamp < now)
        .map(|(i, _)| i)
        .collect();
    let pending = pending_indices.len();
    if pending == 0 {
        return Ok(ReconcileSummary {
            pending: 0,
            resolved_local: 0,
            resolved_remote: 0,
            unresolved: 0,
        });
    }

    let mut resolved_local = 0;
    let mut remaining: Vec<usize> = Vec::new();
    for index in pending_indices {
        let record = &mut records[index];
        match local.close_at(&record.symbol, record.timestamp)? {
            Some(actual) => {
                record.resolve(actual);
                resolved_local += 1;
            }
            None => remaining.push(index),
        }
    }

    let mut resolved_remote = 0;
    if !remaining.is_empty() {
        if let Some(remote) = remote {
            resolved_remote = resolve_remote(records, &remaining, remote);
        }
    }

    let summary = ReconcileSummary {
        pending,
        resolved_local,
        resolved_remote,
        unresolved: pending - resolved_local - resolved_remote,
    };
    info!(
        pending = summary.pending,
        local = summary.resolved_local,
        remote = summary.resolved_remote,
        still_pending = summary.unresolved,
        "reconciliation pass complete"
    );
    Ok(summary)
}

/// One batched fetch per symbol, spanning the gap's min/max target time
/// padded by a day. A remote failure leaves the batch pending for the
/// next pass rather than failing the run.
fn resolve_remote(
    records: &mut [PredictionRecord],
    remaining: &[usize],
    remote: &dyn PriceHistoryPort,
) -> usize {
    let mut symbols: Vec<String> = remaining
        .iter()
        .map(|&i| records[i].symbol.clone())
        .collect();
    symbols.sort();
    symbols.dedup();

    let mut resolved = 0;
    for symbol in symbols {
        let gap: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| records[i].symbol == symbol)
            .collect();
        let start = gap.iter().map(|&i| records[i].timestamp).min();
        let end = gap.iter().map(|&i| records[i].timestamp).max();
        let (Some(start), Some(end)) = (start, end) else {
            continue;
        };

        let closes = match remote.fetch_closes(
            &symbol,
            start - Duration::days(1),
            end + Duration::days(1),
        ) {
            Ok(closes) => closes,
            Err(e) => {
                warn!(%symbol, error = %e, "remote price fetch failed, leaving batch pending");
                continue;
            }
        };

        for index in gap {
            let record = &mut records[index];
            if let Some(&actual) = closes.get(&record.timestamp) {
                record.resolve(actual);
                resolved += 1;
            }
        }
    }
    resolved
}
