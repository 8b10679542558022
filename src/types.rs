use serde::{Deserialize, Serialize};

use crate::constants::env::MIN_PRICE_SCALE;

/// Cash and BTC held by a single environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash_balance: f64,
    pub btc_held: f64,
    pub avg_buy_price: f64,
}

impl Portfolio {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            cash_balance: initial_balance,
            btc_held: 0.0,
            avg_buy_price: 0.0,
        }
    }

    /// Buys BTC worth `amount` at `price`, returns the quantity bought.
    ///
    /// The spend is capped at the available cash so the balance never goes
    /// negative. A non-positive or non-finite price buys nothing.
    pub fn buy(&mut self, amount: f64, price: f64) -> f64 {
        if !(price.is_finite() && price > 0.0) || !(amount.is_finite() && amount > 0.0) {
            return 0.0;
        }

        let amount = amount.min(self.cash_balance);
        if amount <= 0.0 {
            return 0.0;
        }

        let quantity = amount / price;
        let held_before = self.btc_held;

        self.cash_balance -= amount;
        self.btc_held += quantity;
        self.avg_buy_price = if self.btc_held > 0.0 {
            (self.avg_buy_price * held_before + amount) / self.btc_held
        } else {
            0.0
        };

        quantity
    }

    /// Total spent on the BTC currently held
    pub fn cost_basis(&self) -> f64 {
        self.avg_buy_price * self.btc_held
    }

    pub fn value_with_price(&self, price: f64) -> f64 {
        self.cash_balance + self.btc_held * price
    }

    pub fn profit(&self, price: f64, initial_balance: f64) -> f64 {
        self.value_with_price(price) - initial_balance
    }
}

/// Action values mapped back into the units the reward works in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecodedAction {
    /// Percentage (0 to 100) of the initial balance to spend this step
    pub buy_fraction_pct: f64,
    /// Forecast of the net trend to episode end, in [-1, 1]
    pub trend_prediction: f64,
    /// Forecast of the lowest close still to come
    pub min_price_prediction: f64,
}

impl DecodedAction {
    pub fn decode(action: [f64; 3]) -> Self {
        Self {
            buy_fraction_pct: (action[0] + 1.0) * 50.0,
            trend_prediction: action[1],
            min_price_prediction: ((action[2] + 1.0) / 2.0) * MIN_PRICE_SCALE,
        }
    }

    /// Inverse of `decode`, clamped into the action box
    pub fn encode(&self) -> [f64; 3] {
        [
            self.buy_fraction_pct / 50.0 - 1.0,
            self.trend_prediction,
            self.min_price_prediction / MIN_PRICE_SCALE * 2.0 - 1.0,
        ]
        .map(|value| value.clamp(-1.0, 1.0))
    }

    pub fn requested_amount(&self, initial_balance: f64) -> f64 {
        self.buy_fraction_pct / 100.0 * initial_balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_updates_weighted_average() {
        let mut portfolio = Portfolio::new(1000.0);

        let first = portfolio.buy(100.0, 50.0);
        assert_eq!(first, 2.0);
        assert_eq!(portfolio.avg_buy_price, 50.0);

        portfolio.buy(300.0, 100.0);
        assert!((portfolio.btc_held - 5.0).abs() < 1e-12);
        assert!((portfolio.avg_buy_price - 80.0).abs() < 1e-12);
        assert!((portfolio.cost_basis() - 400.0).abs() < 1e-9);
        assert!((portfolio.cash_balance - 600.0).abs() < 1e-12);
    }

    #[test]
    fn buy_never_overdraws() {
        let mut portfolio = Portfolio::new(10.0);
        portfolio.buy(25.0, 5.0);

        assert_eq!(portfolio.cash_balance, 0.0);
        assert_eq!(portfolio.btc_held, 2.0);
        assert_eq!(portfolio.cost_basis(), 10.0);
    }

    #[test]
    fn degenerate_price_buys_nothing() {
        let mut portfolio = Portfolio::new(10.0);

        assert_eq!(portfolio.buy(5.0, 0.0), 0.0);
        assert_eq!(portfolio.buy(5.0, f64::NAN), 0.0);
        assert_eq!(portfolio, Portfolio::new(10.0));
    }

    #[test]
    fn decode_maps_action_ranges() {
        let low = DecodedAction::decode([-1.0, -1.0, -1.0]);
        assert_eq!(low.buy_fraction_pct, 0.0);
        assert_eq!(low.min_price_prediction, 0.0);

        let high = DecodedAction::decode([1.0, 0.5, 1.0]);
        assert_eq!(high.buy_fraction_pct, 100.0);
        assert_eq!(high.trend_prediction, 0.5);
        assert_eq!(high.min_price_prediction, MIN_PRICE_SCALE);
        assert_eq!(high.requested_amount(1000.0), 1000.0);
    }

    #[test]
    fn encode_clamps_into_action_box() {
        let action = DecodedAction {
            buy_fraction_pct: 150.0,
            trend_prediction: 0.0,
            min_price_prediction: 250_000.0,
        };

        assert_eq!(action.encode(), [1.0, 0.0, -0.5]);
    }
}
