use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    constants::env::{MAX_SPEND_FRACTION, MIN_TRADE_AMOUNT},
    types::DecodedAction,
};

use super::env::TradingEnv;

/// What happened to the buy request of one step
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    /// Amount the action asked to spend
    pub requested: f64,
    /// Amount actually spent
    pub spent: f64,
    pub quantity: f64,
    /// Execution price, the current close
    pub price: f64,
    /// Part of the request above the per-step cap
    pub over_request: f64,
    pub executed: bool,
    /// A nonzero request that could not be executed
    pub rejected: bool,
}

impl TradingEnv {
    pub(super) fn apply_buy_request(&mut self, action: &DecodedAction) -> TradeOutcome {
        let initial_balance = self.initial_balance();
        let requested = action.requested_amount(initial_balance);
        let price = self.current_price();

        let mut outcome = TradeOutcome {
            requested,
            price,
            ..Default::default()
        };

        if requested <= 0.0 {
            return outcome;
        }

        if requested < MIN_TRADE_AMOUNT || self.portfolio().cash_balance < requested {
            outcome.rejected = true;
            return outcome;
        }

        if !(price.is_finite() && price > 0.0) {
            warn!(
                env_id = self.env_id,
                minute_index = self.current_index(),
                price,
                "degenerate price, skipping trade"
            );
            return outcome;
        }

        let cap = initial_balance * MAX_SPEND_FRACTION;
        let spend = requested.min(cap);

        outcome.over_request = (requested - cap).max(0.0);
        outcome.quantity = self.execute_trade(spend);
        outcome.spent = spend;
        outcome.executed = outcome.quantity > 0.0;
        outcome
    }

    /// Buys `amount` worth of BTC at the current close, returns the quantity bought
    pub fn execute_trade(&mut self, amount: f64) -> f64 {
        let price = self.current_price();
        self.portfolio_mut().buy(amount, price)
    }
}
