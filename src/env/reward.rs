use enum_map::{Enum, EnumMap};
use serde::{Deserialize, Serialize};

use crate::{
    constants::reward::{
        OVER_REQUEST_PENALTY, PREDICTION_WEIGHT, TIMING_WEIGHT, UNINVESTED_PENALTY,
        ZERO_PREDICTION_EPSILON,
    },
    types::{DecodedAction, Portfolio},
};

use super::{env::TradingEnv, trade::TradeOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum, Serialize, Deserialize)]
pub enum RewardComponent {
    /// Tracking of the min price forecast against the running minimum
    Prediction,
    /// Execution price against the running minimum, executed buys only
    Timing,
    /// Excess of a buy request over the per-step cap
    OverRequest,
    /// Deterrent for a buy that could not be executed
    Rejected,
    /// Average buy price against the window mean, at episode end only
    Settlement,
}

pub type RewardBreakdown = EnumMap<RewardComponent, f64>;

pub fn total(breakdown: &RewardBreakdown) -> f64 {
    breakdown.values().sum()
}

/// Running minimum, or the current price while it is undefined or degenerate
pub fn reference_min(running_min: Option<f64>, current_price: f64) -> f64 {
    match running_min {
        Some(min) if min.is_finite() && min > 0.0 => min,
        _ => current_price,
    }
}

/// |value - reference| relative to the reference, or absolute if the reference is unusable
fn relative_gap(value: f64, reference: f64) -> f64 {
    let gap = (value - reference).abs();
    if reference.is_finite() && reference > 0.0 {
        gap / reference
    } else {
        gap
    }
}

pub fn prediction_term(prediction: f64, reference: f64, progress: f64, cash: f64) -> f64 {
    let gap_pct = relative_gap(prediction, reference) * 100.0;
    let mut reward = PREDICTION_WEIGHT / (1.0 + gap_pct);

    if prediction <= ZERO_PREDICTION_EPSILON {
        reward -= progress * cash;
    }

    reward
}

pub fn timing_term(execution_price: f64, reference: f64, prediction: f64) -> f64 {
    let timing_gap = relative_gap(execution_price, reference);
    let prediction_error = relative_gap(prediction, reference);

    TIMING_WEIGHT * (1.0 - timing_gap).max(0.0) / (1.0 + prediction_error)
}

pub fn over_request_term(over_request: f64) -> f64 {
    -over_request.max(0.0) * OVER_REQUEST_PENALTY
}

pub fn rejected_term(requested: f64) -> f64 {
    -requested.max(0.0)
}

pub fn settlement_term(portfolio: &Portfolio, window_mean: f64, initial_balance: f64) -> f64 {
    let cash_fraction = if initial_balance > 0.0 {
        (portfolio.cash_balance / initial_balance).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let invested_fraction = 1.0 - cash_fraction;

    let below_mean_pct = if portfolio.btc_held > 0.0 && window_mean.is_finite() && window_mean > 0.0 {
        (window_mean - portfolio.avg_buy_price) / window_mean * 100.0
    } else {
        0.0
    };

    below_mean_pct * invested_fraction - UNINVESTED_PENALTY * cash_fraction
}

impl TradingEnv {
    /// Reward of the current step before settlement.
    ///
    /// Reads only the window position, portfolio, market tables and the
    /// arguments, so repeated calls with the same state return the same value.
    pub fn reward(&self, action: &DecodedAction, trade: &TradeOutcome) -> RewardBreakdown {
        let mut breakdown = RewardBreakdown::default();

        let price = self.current_price();
        let reference = reference_min(self.running_min(), price);

        breakdown[RewardComponent::Prediction] = prediction_term(
            action.min_price_prediction,
            reference,
            self.progress(),
            self.portfolio().cash_balance,
        );

        if trade.executed {
            breakdown[RewardComponent::Timing] =
                timing_term(trade.price, reference, action.min_price_prediction);
        }

        breakdown[RewardComponent::OverRequest] = over_request_term(trade.over_request);

        if trade.rejected {
            breakdown[RewardComponent::Rejected] = rejected_term(trade.requested);
        }

        breakdown
    }

    /// Final settlement of the episode window
    pub fn settlement(&self) -> f64 {
        settlement_term(self.portfolio(), self.window_mean(), self.initial_balance())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_falls_back_to_current_price() {
        assert_eq!(reference_min(None, 100.0), 100.0);
        assert_eq!(reference_min(Some(0.0), 100.0), 100.0);
        assert_eq!(reference_min(Some(f64::NAN), 100.0), 100.0);
        assert_eq!(reference_min(Some(90.0), 100.0), 90.0);
    }

    #[test]
    fn prediction_term_peaks_on_exact_forecast() {
        let exact = prediction_term(100.0, 100.0, 0.5, 1000.0);
        let off = prediction_term(110.0, 100.0, 0.5, 1000.0);

        assert_eq!(exact, PREDICTION_WEIGHT);
        assert!((off - PREDICTION_WEIGHT / 11.0).abs() < 1e-12);
    }

    #[test]
    fn zero_forecast_pays_progress_times_cash() {
        let reward = prediction_term(0.0, 100.0, 0.25, 400.0);
        assert!((reward - (PREDICTION_WEIGHT / 101.0 - 100.0)).abs() < 1e-9);

        // no penalty before any progress
        assert!(prediction_term(0.0, 100.0, 0.0, 400.0) > 0.0);
    }

    #[test]
    fn timing_term_is_scaled_down_by_forecast_error() {
        let accurate = timing_term(100.0, 100.0, 100.0);
        let sloppy = timing_term(100.0, 100.0, 150.0);
        let late = timing_term(150.0, 100.0, 100.0);

        assert_eq!(accurate, TIMING_WEIGHT);
        assert!(sloppy < accurate);
        assert!(late < accurate);
        assert_eq!(timing_term(250.0, 100.0, 100.0), 0.0);
    }

    #[test]
    fn settlement_rewards_buying_below_mean() {
        let mut cheap = Portfolio::new(1000.0);
        cheap.buy(1000.0, 90.0);
        let mut dear = Portfolio::new(1000.0);
        dear.buy(1000.0, 110.0);

        assert!((settlement_term(&cheap, 100.0, 1000.0) - 10.0).abs() < 1e-9);
        assert!((settlement_term(&dear, 100.0, 1000.0) + 10.0).abs() < 1e-9);
    }

    #[test]
    fn settlement_penalises_idle_cash() {
        let idle = Portfolio::new(1000.0);
        assert_eq!(settlement_term(&idle, 100.0, 1000.0), -UNINVESTED_PENALTY);
        assert_eq!(settlement_term(&idle, 0.0, 1000.0), -UNINVESTED_PENALTY);
    }

    #[test]
    fn penalties_are_negative_amounts() {
        assert_eq!(over_request_term(400.0), -400.0 * OVER_REQUEST_PENALTY);
        assert_eq!(over_request_term(0.0), 0.0);
        assert_eq!(rejected_term(0.5), -0.5);
    }
}
