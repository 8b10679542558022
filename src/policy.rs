use clap::ValueEnum;
use ndarray::ArrayView1;
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    constants::env::ACTION_COUNT,
    env::{reference_min, TradingEnv},
    types::DecodedAction,
};

/// Picks the next action for an environment
pub trait Policy: Send {
    fn name(&self) -> &'static str;

    fn act(&mut self, observation: ArrayView1<'_, f32>, env: &TradingEnv) -> [f64; ACTION_COUNT];
}

/// Never buys, forecasts the running minimum
#[derive(Debug, Default, Clone, Copy)]
pub struct Hold;

impl Policy for Hold {
    fn name(&self) -> &'static str {
        "hold"
    }

    fn act(&mut self, _observation: ArrayView1<'_, f32>, env: &TradingEnv) -> [f64; ACTION_COUNT] {
        DecodedAction {
            buy_fraction_pct: 0.0,
            trend_prediction: 0.0,
            min_price_prediction: reference_min(env.running_min(), env.current_price()),
        }
        .encode()
    }
}

/// Uniform samples from the action space
#[derive(Debug, Clone)]
pub struct Random {
    rng: StdRng,
}

impl Random {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for Random {
    fn name(&self) -> &'static str {
        "random"
    }

    fn act(&mut self, _observation: ArrayView1<'_, f32>, env: &TradingEnv) -> [f64; ACTION_COUNT] {
        let sample = env.action_space().sample(&mut self.rng);

        let mut action = [0.0; ACTION_COUNT];
        for (slot, value) in action.iter_mut().zip(sample) {
            *slot = value;
        }
        action
    }
}

/// Spends a fixed share of the initial balance each step while cash lasts
#[derive(Debug, Clone, Copy)]
pub struct Dca {
    pub buy_fraction_pct: f64,
}

impl Default for Dca {
    fn default() -> Self {
        Self {
            buy_fraction_pct: 2.0,
        }
    }
}

impl Policy for Dca {
    fn name(&self) -> &'static str {
        "dca"
    }

    fn act(&mut self, _observation: ArrayView1<'_, f32>, env: &TradingEnv) -> [f64; ACTION_COUNT] {
        let requested = self.buy_fraction_pct / 100.0 * env.initial_balance();
        let buy_fraction_pct = if env.portfolio().cash_balance >= requested {
            self.buy_fraction_pct
        } else {
            0.0
        };

        DecodedAction {
            buy_fraction_pct,
            trend_prediction: 0.0,
            min_price_prediction: reference_min(env.running_min(), env.current_price()),
        }
        .encode()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum PolicyKind {
    Hold,
    Random,
    Dca,
}

impl PolicyKind {
    pub fn build(self, seed: u64) -> Box<dyn Policy> {
        match self {
            PolicyKind::Hold => Box::new(Hold),
            PolicyKind::Random => Box::new(Random::new(seed)),
            PolicyKind::Dca => Box::new(Dca::default()),
        }
    }
}
