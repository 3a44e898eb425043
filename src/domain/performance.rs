//! Portfolio performance metrics.
//!
//! Return and risk statistics derived from the portfolio-value time
//! series. Fewer than two samples yields the neutral all-zero result
//! rather than an error.

use crate::domain::portfolio::PortfolioValueSample;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
}

impl PerformanceMetrics {
    pub fn neutral() -> Self {
        Self {
            total_return: 0.0,
            annualized_return: 0.0,
            annualized_volatility: 0.0,
            sharpe_ratio: 0.0,
            max_drawdown: 0.0,
        }
    }
}

/// Computes performance over the value series. Samples are sorted by
/// timestamp before any calculation.
pub fn compute(samples: &[PortfolioValueSample], annual_risk_free_rate: f64) -> PerformanceMetrics {
    if samples.len() < 2 {
        return PerformanceMetrics::neutral();
    }

    let mut sorted: Vec<&PortfolioValueSample> = samples.iter().collect();
    sorted.sort_by_key(|s| s.timestamp);

    let first = sorted[0].portfolio_value;
    let last = sorted[sorted.len() - 1].portfolio_value;
    let total_return = if first > 0.0 { last / first - 1.0 } else { 0.0 };

    let elapsed_days = (sorted[sorted.len() - 1].timestamp - sorted[0].timestamp).num_days();
    let annualized_return = if elapsed_days > 0 {
        (1.0 + total_return).powf(365.0 / elapsed_days as f64) - 1.0
    } else {
        0.0
    };

    let returns: Vec<f64> = sorted
        .windows(2)
        .map(|w| {
            let prev = w[0].portfolio_value;
            if prev > 0.0 {
                w[1].portfolio_value / prev - 1.0
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    let per_year = samples_per_year(&sorted);
    let annualized_volatility = stddev * per_year.sqrt();

    let per_sample_rf = (1.0 + annual_risk_free_rate).powf(1.0 / per_year) - 1.0;
    let sharpe_ratio = if stddev > 0.0 {
        (mean - per_sample_rf) / stddev * per_year.sqrt()
    } else {
        0.0
    };

    let max_drawdown = compute_max_drawdown(&sorted);

    PerformanceMetrics {
        total_return,
        annualized_return,
        annualized_volatility,
        sharpe_ratio,
        max_drawdown,
    }
}

/// Samples per year from the observed median sampling interval, scaled
/// from 252 trading days. Hourly sampling gives 252 * 24; an unreadable
/// cadence falls back to hourly.
fn samples_per_year(sorted: &[&PortfolioValueSample]) -> f64 {
    let mut intervals: Vec<i64> = sorted
        .windows(2)
        .map(|w| (w[1].timestamp - w[0].timestamp).num_seconds())
        .filter(|&s| s > 0)
        .collect();
    let hourly = TRADING_DAYS_PER_YEAR * 24.0;
    if intervals.is_empty() {
        return hourly;
    }
    intervals.sort_unstable();
    let median = intervals[intervals.len() / 2] as f64;
    TRADING_DAYS_PER_YEAR * 24.0 * 3600.0 / median
}

/// Largest decline from a running peak, as a non-positive fraction.
fn compute_max_drawdown(sorted: &[&PortfolioValueSample]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_drawdown = 0.0_f64;
    for sample in sorted {
        if sample.portfolio_value > peak {
            peak = sample.portfolio_value;
        }
        if peak > 0.0 {
            let drawdown = sample.portfolio_value / peak - 1.0;
            if drawdown < max_drawdown {
                max_drawdown = drawdown;
            }
        }
    }
    max_drawdown
}
