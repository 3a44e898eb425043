//! Portfolio state and transaction types.
//!
//! The state singleton holds cash and per-symbol holdings. Mutations go
//! through [`PortfolioState::apply_buy`] / [`PortfolioState::apply_sell`],
//! which reject rather than overdraw: cash never goes negative and every
//! present holding stays strictly positive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub cash: f64,
    pub holdings: BTreeMap<String, f64>,
}

impl PortfolioState {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            cash: initial_cash,
            holdings: BTreeMap::new(),
        }
    }

    pub fn holding(&self, symbol: &str) -> f64 {
        self.holdings.get(symbol).copied().unwrap_or(0.0)
    }

    /// Spends `amount` of cash on `symbol` at `price`. Returns false and
    /// leaves the state untouched when cash is insufficient or the order
    /// is degenerate.
    pub fn apply_buy(&mut self, symbol: &str, amount: f64, price: f64) -> bool {
        if amount <= 0.0 || price <= 0.0 || self.cash < amount {
            return false;
        }
        let quantity = amount / price;
        self.cash -= amount;
        *self.holdings.entry(symbol.to_string()).or_insert(0.0) += quantity;
        true
    }

    /// Sells `quantity` of `symbol` at `price`. Returns false and leaves
    /// the state untouched when the held quantity is insufficient. A
    /// holding sold down to exactly zero is removed from the map.
    pub fn apply_sell(&mut self, symbol: &str, quantity: f64, price: f64) -> bool {
        if quantity <= 0.0 || price <= 0.0 {
            return false;
        }
        let held = self.holding(symbol);
        if held < quantity {
            return false;
        }
        self.cash += quantity * price;
        let remaining = held - quantity;
        if remaining == 0.0 {
            self.holdings.remove(symbol);
        } else {
            self.holdings.insert(symbol.to_string(), remaining);
        }
        true
    }

    /// Cash plus holdings marked at `prices`. Symbols missing from the
    /// price map are valued at zero.
    pub fn value(&self, prices: &HashMap<String, f64>) -> f64 {
        let holdings_value: f64 = self
            .holdings
            .iter()
            .map(|(symbol, quantity)| quantity * prices.get(symbol).copied().unwrap_or(0.0))
            .sum();
        self.cash + holdings_value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionSide {
    Buy,
    Sell,
}

impl TransactionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionSide::Buy => "BUY",
            TransactionSide::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<TransactionSide> {
        match s.trim() {
            "BUY" => Some(TransactionSide::Buy),
            "SELL" => Some(TransactionSide::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executed order, written in the same commit as the state change it
/// represents.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: TransactionSide,
    pub quantity: f64,
    pub price_per_unit: f64,
    pub total_value: f64,
}

/// One point of the portfolio-value time series.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioValueSample {
    pub timestamp: DateTime<Utc>,
    pub portfolio_value: f64,
}
