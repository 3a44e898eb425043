//! Trade decision logic.
//!
//! One pure function maps a predicted price change onto an action; the
//! live strategy and the backtest both route through it so the threshold
//! branching exists in exactly one place.

/// What to do with the position, as a fraction of the available resource:
/// cash for buys, held quantity for sells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Buy { fraction: f64 },
    Sell { fraction: f64 },
    Hold,
}

/// Symmetric decision band around the current price. A predicted move
/// inside `[-sell_pct, +buy_pct]` is a hold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeThresholds {
    pub buy_pct: f64,
    pub sell_pct: f64,
}

impl Default for TradeThresholds {
    fn default() -> Self {
        Self {
            buy_pct: 0.02,
            sell_pct: 0.02,
        }
    }
}

/// Fraction of current cash committed on a buy signal.
pub const BUY_CASH_FRACTION: f64 = 0.10;
/// Fraction of the current holding liquidated on a sell signal.
pub const SELL_HOLDING_FRACTION: f64 = 0.25;

/// Maps the predicted relative price change onto an action. The bounds
/// are strict: a change exactly at a threshold holds.
pub fn decide(predicted_change_pct: f64, thresholds: &TradeThresholds) -> Action {
    if predicted_change_pct > thresholds.buy_pct {
        Action::Buy {
            fraction: BUY_CASH_FRACTION,
        }
    } else if predicted_change_pct < -thresholds.sell_pct {
        Action::Sell {
            fraction: SELL_HOLDING_FRACTION,
        }
    } else {
        Action::Hold
    }
}

/// A sized order ready for execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Order {
    Buy { amount: f64 },
    Sell { quantity: f64 },
    None,
}

/// Turns an action into a concrete order against the current position.
/// Buys below `min_notional` and sells of an absent holding degrade to
/// no order.
pub fn size_order(action: Action, cash: f64, held_quantity: f64, min_notional: f64) -> Order {
    match action {
        Action::Buy { fraction } => {
            let amount = cash * fraction;
            if amount < min_notional {
                Order::None
            } else {
                Order::Buy { amount }
            }
        }
        Action::Sell { fraction } => {
            if held_quantity <= 0.0 {
                Order::None
            } else {
                Order::Sell {
                    quantity: held_quantity * fraction,
                }
            }
        }
        Action::Hold => Order::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_upside_buys_ten_percent_of_cash() {
        assert_eq!(
            decide(0.05, &TradeThresholds::default()),
            Action::Buy { fraction: 0.10 }
        );
    }

    #[test]
    fn strong_downside_sells_quarter_of_holding() {
        assert_eq!(
            decide(-0.05, &TradeThresholds::default()),
            Action::Sell { fraction: 0.25 }
        );
    }

    #[test]
    fn inside_band_holds() {
        let thresholds = TradeThresholds::default();
        assert_eq!(decide(0.01, &thresholds), Action::Hold);
        assert_eq!(decide(-0.01, &thresholds), Action::Hold);
        assert_eq!(decide(0.0, &thresholds), Action::Hold);
    }

    #[test]
    fn exact_threshold_is_a_hold() {
        let thresholds = TradeThresholds::default();
        assert_eq!(decide(0.02, &thresholds), Action::Hold);
        assert_eq!(decide(-0.02, &thresholds), Action::Hold);
    }

    #[test]
    fn asymmetric_thresholds_are_respected() {
        let thresholds = TradeThresholds {
            buy_pct: 0.05,
            sell_pct: 0.01,
        };
        assert_eq!(decide(0.03, &thresholds), Action::Hold);
        assert_eq!(
            decide(-0.03, &thresholds),
            Action::Sell { fraction: 0.25 }
        );
    }

    #[test]
    fn buy_order_sized_from_cash() {
        let order = size_order(Action::Buy { fraction: 0.10 }, 1_000.0, 0.0, 10.0);
        assert_eq!(order, Order::Buy { amount: 100.0 });
    }

    #[test]
    fn buy_below_min_notional_degrades_to_no_order() {
        let order = size_order(Action::Buy { fraction: 0.10 }, 50.0, 0.0, 10.0);
        assert_eq!(order, Order::None);
    }

    #[test]
    fn sell_order_sized_from_holding() {
        let order = size_order(Action::Sell { fraction: 0.25 }, 0.0, 2.0, 10.0);
        assert_eq!(order, Order::Sell { quantity: 0.5 });
    }

    #[test]
    fn sell_with_no_holding_degrades_to_no_order() {
        let order = size_order(Action::Sell { fraction: 0.25 }, 500.0, 0.0, 10.0);
        assert_eq!(order, Order::None);
    }

    #[test]
    fn hold_produces_no_order() {
        assert_eq!(size_order(Action::Hold, 1_000.0, 2.0, 10.0), Order::None);
    }
}
