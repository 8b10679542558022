mod env;
mod obs;
mod reward;
mod space;
mod trade;
mod vec_env;

pub use env::{EnvConfig, EnvStatus, ResetOptions, Step, StepInfo, TradingEnv};
pub use reward::{
    over_request_term, prediction_term, reference_min, rejected_term, settlement_term,
    timing_term, total as total_reward, RewardBreakdown, RewardComponent,
};
pub use space::BoxSpace;
pub use trade::TradeOutcome;
pub use vec_env::{VecEnv, VecStep};
