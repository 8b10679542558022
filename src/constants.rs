pub mod env {
    /// Actions are (buy fraction, trend prediction, min price prediction)
    pub const ACTION_COUNT: usize = 3;
    /// cash fraction, avg buy price
    pub const PORTFOLIO_OBS: usize = 2;
    pub const PROGRESS_OBS: usize = 1;
    pub const TIME_COLUMN: &str = "Formatted_Time";
    pub const PRICE_COLUMN: &str = "BTC1m_Close";

    /// Smallest spend (in balance currency) that is executed as a trade
    pub const MIN_TRADE_AMOUNT: f64 = 1.0;
    /// A single step may spend no more than this fraction of the initial balance
    pub const MAX_SPEND_FRACTION: f64 = 0.1;
    /// Upper end of the min price forecast, reached at action[2] == 1
    pub const MIN_PRICE_SCALE: f64 = 1_000_000.0;
}

pub mod reward {
    pub const PREDICTION_WEIGHT: f64 = 1.0;
    pub const TIMING_WEIGHT: f64 = 1.0;
    /// Multiplies the excess of a buy request over the per-step cap
    pub const OVER_REQUEST_PENALTY: f64 = 1.0;
    /// Penalty per unit of the initial balance left uninvested at episode end
    pub const UNINVESTED_PENALTY: f64 = 10.0;
    /// Forecasts at or below this are treated as degenerate zero predictions
    pub const ZERO_PREDICTION_EPSILON: f64 = 1e-9;
}

pub mod files {
    pub const TABLE_CACHE_EXTENSION: &str = "bin";
    pub const MONITOR_PATH: &str = "monitor";
}

pub mod defaults {
    pub const MIN_BALANCE: f64 = 100.0;
    pub const MAX_BALANCE: f64 = 1_000_000.0;
    /// One hour
    pub const MIN_EPISODE_LENGTH: usize = 60;
    /// 30 days of minutes
    pub const MAX_EPISODE_LENGTH: usize = 43_200;
    pub const EPISODES: usize = 10;
    pub const WORKERS: usize = 4;
}
