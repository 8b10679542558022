use std::sync::Arc;
use std::time::Instant;

use colored::Colorize;
use ndarray::Array1;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    constants::{
        defaults::{MAX_BALANCE, MAX_EPISODE_LENGTH, MIN_BALANCE, MIN_EPISODE_LENGTH},
        env::{ACTION_COUNT, PORTFOLIO_OBS, PRICE_COLUMN, PROGRESS_OBS},
    },
    data::{Alignment, MarketData},
    error::EnvError,
    history::{EpisodeSummary, Monitor, MonitorRecord},
    types::{DecodedAction, Portfolio},
};

use super::{
    reward::{self, RewardBreakdown, RewardComponent},
    space::BoxSpace,
    trade::TradeOutcome,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Inclusive range the initial balance is drawn from
    pub balance_range: (f64, f64),
    /// Inclusive range, in minutes, the episode length is drawn from
    pub episode_length_range: (usize, usize),
    /// Keep a monitor table and print episode summaries
    pub testing: bool,
    /// Max-abs scale each observation block
    pub normalize: bool,
    pub price_column: String,
    pub seed: Option<u64>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            balance_range: (MIN_BALANCE, MAX_BALANCE),
            episode_length_range: (MIN_EPISODE_LENGTH, MAX_EPISODE_LENGTH),
            testing: false,
            normalize: true,
            price_column: PRICE_COLUMN.to_string(),
            seed: None,
        }
    }
}

impl EnvConfig {
    pub fn validate(&self) -> Result<(), EnvError> {
        let (min_balance, max_balance) = self.balance_range;
        if !(min_balance.is_finite() && max_balance.is_finite()) {
            return Err(EnvError::Config(format!(
                "balance range ({min_balance}, {max_balance}) must be finite"
            )));
        }
        if min_balance <= 0.0 || min_balance > max_balance {
            return Err(EnvError::Config(format!(
                "balance range ({min_balance}, {max_balance}) must be positive with min <= max"
            )));
        }

        let (min_length, max_length) = self.episode_length_range;
        if min_length == 0 || min_length > max_length {
            return Err(EnvError::Config(format!(
                "episode length range ({min_length}, {max_length}) must be positive with min <= max"
            )));
        }

        Ok(())
    }
}

/// Overrides for a single `reset`; unset fields are drawn from the config ranges
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResetOptions {
    pub initial_balance: Option<f64>,
    pub episode_length: Option<usize>,
    /// Pins the window start, must lie in `[0, len - episode_length)`
    pub start_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvStatus {
    Uninitialized,
    Ready,
    Done,
}

/// Diagnostics of one step
#[derive(Debug, Clone, PartialEq)]
pub struct StepInfo {
    /// Steps taken in this episode, including this one
    pub step: usize,
    /// Minute row the trade executed on
    pub minute_index: usize,
    pub time: String,
    pub price: f64,
    pub reference_min: f64,
    pub progress: f64,
    pub portfolio: Portfolio,
    pub action: DecodedAction,
    pub trade: TradeOutcome,
    pub rewards: RewardBreakdown,
    /// The settlement component was applied on this step
    pub settled: bool,
    pub episode_reward: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// `None` once the episode is done
    pub observation: Option<Array1<f32>>,
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
    /// Set on the step that ends the episode
    pub summary: Option<EpisodeSummary>,
}

pub struct TradingEnv {
    pub env_id: usize,
    data: Arc<MarketData>,
    config: EnvConfig,
    rng: StdRng,
    status: EnvStatus,
    observation_space: BoxSpace,
    action_space: BoxSpace,
    initial_balance: f64,
    max_steps: usize,
    start_index: usize,
    current_index: usize,
    end_index: usize,
    alignment: Alignment,
    portfolio: Portfolio,
    running_min: Option<f64>,
    window_mean: f64,
    pub episode: usize,
    episode_reward: f64,
    episode_start: Instant,
    monitor: Option<Monitor>,
}

impl TradingEnv {
    pub fn new(data: Arc<MarketData>, config: EnvConfig) -> Result<Self, EnvError> {
        config.validate()?;

        if data.minute.len() < 2 {
            return Err(EnvError::Config(format!(
                "minute table `{}` needs at least 2 rows, has {}",
                data.minute.name(),
                data.minute.len()
            )));
        }

        if data.price_column() != config.price_column {
            return Err(EnvError::Config(format!(
                "tables price column `{}` does not match configured `{}`",
                data.price_column(),
                config.price_column
            )));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let width = data.feature_count() + PORTFOLIO_OBS + PROGRESS_OBS;
        // raw market rows are unbounded
        let observation_space = if config.normalize {
            BoxSpace::unit(width)
        } else {
            BoxSpace::unbounded(width)
        };
        let monitor = config.testing.then(Monitor::default);

        Ok(Self {
            env_id: 0,
            config,
            rng,
            status: EnvStatus::Uninitialized,
            observation_space,
            action_space: BoxSpace::unit(ACTION_COUNT),
            initial_balance: 0.0,
            max_steps: 0,
            start_index: 0,
            current_index: 0,
            end_index: 0,
            alignment: Alignment {
                minute: 0,
                hour: 0,
                day: 0,
            },
            portfolio: Portfolio::default(),
            running_min: None,
            window_mean: 0.0,
            episode: 0,
            episode_reward: 0.0,
            episode_start: Instant::now(),
            monitor,
            data,
        })
    }

    pub fn reset(&mut self, options: ResetOptions) -> Result<Array1<f32>, EnvError> {
        self.status = EnvStatus::Uninitialized;

        let initial_balance = match options.initial_balance {
            Some(balance) if balance.is_finite() && balance > 0.0 => balance,
            Some(balance) => {
                return Err(EnvError::Config(format!(
                    "initial balance {balance} must be positive and finite"
                )))
            }
            None => {
                let (min, max) = self.config.balance_range;
                self.rng.gen_range(min..=max)
            }
        };

        let len = self.data.minute.len();
        let requested_length = match options.episode_length {
            Some(length) => length,
            None => {
                let (min, max) = self.config.episode_length_range;
                self.rng.gen_range(min..=max)
            }
        };
        let max_steps = requested_length.min(len - 1);
        if max_steps == 0 {
            return Err(EnvError::Config(format!(
                "episode length {requested_length} leaves no steps in a table of {len} rows"
            )));
        }

        // end = start + max_steps must stay <= len - 1
        let start_range = len - max_steps;
        let start_index = match options.start_index {
            Some(start) if start < start_range => start,
            Some(start) => {
                return Err(EnvError::Config(format!(
                    "start index {start} is outside [0, {start_range}) for {max_steps} steps"
                )))
            }
            None => self.rng.gen_range(0..start_range),
        };

        let alignment = self.data.align(start_index)?;

        self.initial_balance = initial_balance;
        self.max_steps = max_steps;
        self.start_index = start_index;
        self.current_index = start_index;
        self.end_index = start_index + max_steps;
        self.alignment = alignment;
        self.portfolio = Portfolio::new(initial_balance);
        self.running_min = None;
        self.window_mean = window_mean(&self.data.closes()[start_index..self.end_index]);
        self.episode_reward = 0.0;
        self.episode_start = Instant::now();

        if let Some(monitor) = &mut self.monitor {
            monitor.reset();
        }

        debug!(
            env_id = self.env_id,
            episode = self.episode,
            initial_balance,
            start_index,
            max_steps,
            "reset episode"
        );

        let observation = self.observation()?;
        self.status = EnvStatus::Ready;

        Ok(observation)
    }

    pub fn step(&mut self, action: &[f64]) -> Result<Step, EnvError> {
        if self.status != EnvStatus::Ready {
            return Err(EnvError::InvalidState(self.status));
        }

        let action = self.check_action(action)?;
        let decoded = DecodedAction::decode(action);

        let trade = self.apply_buy_request(&decoded);
        let price = self.current_price();
        let reference_min = reward::reference_min(self.running_min, price);
        let progress = self.progress();
        let mut rewards = self.reward(&decoded, &trade);

        self.running_min = Some(self.running_min.map_or(price, |min| min.min(price)));

        let minute_index = self.current_index;
        let step = minute_index - self.start_index + 1;

        if let Err(err) = self.advance() {
            self.status = EnvStatus::Done;
            return Err(err);
        }

        let done = self.current_index >= self.end_index;
        if done {
            rewards[RewardComponent::Settlement] = self.settlement();
        }

        if let Some((component, _)) = rewards.iter().find(|(_, value)| !value.is_finite()) {
            self.status = EnvStatus::Done;
            return Err(EnvError::NonFiniteReward {
                component: format!("{component:?}"),
            });
        }

        let reward = reward::total(&rewards);
        self.episode_reward += reward;

        let observation = if done {
            None
        } else {
            match self.observation() {
                Ok(observation) => Some(observation),
                Err(err) => {
                    self.status = EnvStatus::Done;
                    return Err(err);
                }
            }
        };

        let info = StepInfo {
            step,
            minute_index,
            time: self.data.minute.time(minute_index).to_string(),
            price,
            reference_min,
            progress,
            portfolio: self.portfolio,
            action: decoded,
            trade,
            rewards,
            settled: done,
            episode_reward: self.episode_reward,
        };

        if let Some(monitor) = &mut self.monitor {
            monitor.push(MonitorRecord::from_step(self.episode, &info, reward, self.initial_balance));
        }

        let summary = if done {
            self.status = EnvStatus::Done;
            Some(self.handle_episode_end())
        } else {
            self.status = EnvStatus::Ready;
            None
        };

        Ok(Step {
            observation,
            reward,
            done,
            info,
            summary,
        })
    }

    fn check_action(&self, action: &[f64]) -> Result<[f64; ACTION_COUNT], EnvError> {
        let Ok(action) = <[f64; ACTION_COUNT]>::try_from(action) else {
            return Err(EnvError::ActionShape {
                expected: ACTION_COUNT,
                found: action.len(),
            });
        };

        // NaN fails the bounds check too
        if let Some(index) = action
            .iter()
            .position(|value| !self.action_space.contains_value(*value))
        {
            return Err(EnvError::ActionOutOfBounds {
                index,
                value: action[index],
            });
        }

        Ok(action)
    }

    fn advance(&mut self) -> Result<(), EnvError> {
        let next = self.current_index + 1;
        let len = self.data.minute.len();
        if next >= len {
            return Err(EnvError::WindowOverrun { index: next, len });
        }

        self.current_index = next;
        self.alignment = self.data.align(next)?;
        Ok(())
    }

    fn handle_episode_end(&mut self) -> EpisodeSummary {
        let summary = self.episode_summary();

        if self.config.testing {
            let profit_str = if summary.profit >= 0.0 {
                format!("${:.2}", summary.profit).green()
            } else {
                format!("${:.2}", summary.profit).red()
            };

            let below_mean = summary.below_mean_pct();
            let below_mean_str = if below_mean > 0.0 {
                format!("{below_mean:.2}%").bright_green().bold()
            } else if below_mean < 0.0 {
                format!("{below_mean:.2}%").bright_red().bold()
            } else {
                format!("{below_mean:.2}%").yellow()
            };

            println!(
                "{} {} [{}] - Value: {} ({}) cumulative reward {:.2} | Avg buy: {} vs mean {:.2} ({}) | Cash left: {} | steps {} time {:.2}s",
                "Episode".bright_blue(),
                self.episode.to_string().bright_blue().bold(),
                format!("Env {}", self.env_id).bright_blue(),
                format!("${:.2}", summary.final_value).bright_white().bold(),
                profit_str,
                summary.reward,
                format!("{:.2}", summary.avg_buy_price).cyan(),
                summary.window_mean,
                below_mean_str,
                format!("${:.2}", summary.cash_left).yellow(),
                summary.steps,
                self.episode_start.elapsed().as_secs_f32(),
            );
        }

        self.episode += 1;
        summary
    }

    pub fn episode_summary(&self) -> EpisodeSummary {
        let price = self.current_price();

        EpisodeSummary {
            env_id: self.env_id,
            episode: self.episode,
            initial_balance: self.initial_balance,
            final_value: self.portfolio.value_with_price(price),
            profit: self.portfolio.profit(price, self.initial_balance),
            reward: self.episode_reward,
            avg_buy_price: self.portfolio.avg_buy_price,
            window_mean: self.window_mean,
            cash_left: self.portfolio.cash_balance,
            steps: self.current_index - self.start_index,
        }
    }

    /// Prints the current step, holdings and profit, returning the printed lines
    pub fn render(&self) -> Vec<String> {
        let price = self.current_price();
        let profit = self.portfolio.profit(price, self.initial_balance);
        let profit_str = if profit >= 0.0 {
            format!("{profit:.2}").green()
        } else {
            format!("{profit:.2}").red()
        };

        let lines = vec![
            format!(
                "{} {} {}",
                "Step:".bright_blue(),
                self.current_index - self.start_index,
                self.data.minute.time(self.current_index)
            ),
            format!("{} {:.2}", "Cash:".bright_blue(), self.portfolio.cash_balance),
            format!("{} {:.8}", "BTC held:".bright_blue(), self.portfolio.btc_held),
            format!("{} {:.2}", "Avg buy price:".bright_blue(), self.portfolio.avg_buy_price),
            format!("{} {:.2}", "Current price:".bright_blue(), price),
            format!("{} {}", "Profit:".bright_blue(), profit_str),
        ];

        for line in &lines {
            println!("{line}");
        }

        lines
    }

    /// Fraction of the episode window already traded, in [0, 1]
    pub fn progress(&self) -> f64 {
        let span = self.end_index.saturating_sub(self.start_index);
        if span == 0 {
            return 0.0;
        }
        ((self.current_index - self.start_index) as f64 / span as f64).clamp(0.0, 1.0)
    }

    pub fn current_price(&self) -> f64 {
        self.data.close(self.current_index)
    }

    pub fn data(&self) -> &Arc<MarketData> {
        &self.data
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn status(&self) -> EnvStatus {
        self.status
    }

    pub fn observation_space(&self) -> BoxSpace {
        self.observation_space
    }

    pub fn action_space(&self) -> BoxSpace {
        self.action_space
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn end_index(&self) -> usize {
        self.end_index
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn running_min(&self) -> Option<f64> {
        self.running_min
    }

    pub fn window_mean(&self) -> f64 {
        self.window_mean
    }

    pub fn episode_reward(&self) -> f64 {
        self.episode_reward
    }

    /// `None` outside testing mode
    pub fn monitor(&self) -> Option<&Monitor> {
        self.monitor.as_ref()
    }

    pub(super) fn portfolio_mut(&mut self) -> &mut Portfolio {
        &mut self.portfolio
    }
}

fn window_mean(closes: &[f64]) -> f64 {
    if closes.is_empty() {
        return 0.0;
    }
    closes.iter().sum::<f64>() / closes.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MarketTable;

    fn data(rows: usize) -> Arc<MarketData> {
        let times: Vec<String> = (0..rows)
            .map(|minute| format!("2024-03-01 {:02}:{:02}:00", minute / 60, minute % 60))
            .collect();
        let minute = MarketTable::new(
            "BTC1m",
            vec!["BTC1m_Open".to_string(), PRICE_COLUMN.to_string()],
            times,
            (0..rows).map(|i| vec![100.0 + i as f64, 101.0 + i as f64]).collect(),
        )
        .unwrap();

        let hours = rows.div_ceil(60);
        let hour = MarketTable::new(
            "BTC1H",
            vec!["BTC1H_Close".to_string()],
            (0..hours).map(|h| format!("2024-03-01 {h:02}:00:00")).collect(),
            (0..hours).map(|h| vec![100.0 + h as f64]).collect(),
        )
        .unwrap();
        let day = MarketTable::new(
            "BTC1D",
            vec!["BTC1D_Close".to_string()],
            vec!["2024-03-01".to_string()],
            vec![vec![100.0]],
        )
        .unwrap();

        Arc::new(MarketData::new(minute, hour, day, PRICE_COLUMN).unwrap())
    }

    fn config() -> EnvConfig {
        EnvConfig {
            balance_range: (500.0, 1500.0),
            episode_length_range: (10, 20),
            seed: Some(3),
            ..EnvConfig::default()
        }
    }

    #[test]
    fn config_validation() {
        assert!(config().validate().is_ok());

        let bad_balance = EnvConfig {
            balance_range: (0.0, 10.0),
            ..config()
        };
        assert!(bad_balance.validate().is_err());

        let inverted = EnvConfig {
            episode_length_range: (20, 10),
            ..config()
        };
        assert!(inverted.validate().is_err());

        let infinite = EnvConfig {
            balance_range: (1.0, f64::INFINITY),
            ..config()
        };
        assert!(infinite.validate().is_err());
    }

    #[test]
    fn step_before_reset_is_rejected() {
        let mut env = TradingEnv::new(data(120), config()).unwrap();

        let result = env.step(&[-1.0, 0.0, 0.0]);
        assert!(matches!(result, Err(EnvError::InvalidState(EnvStatus::Uninitialized))));
    }

    #[test]
    fn random_reset_respects_ranges() {
        let mut env = TradingEnv::new(data(120), config()).unwrap();

        for _ in 0..50 {
            env.reset(ResetOptions::default()).unwrap();
            assert!((500.0..=1500.0).contains(&env.initial_balance()));
            assert!((10..=20).contains(&env.max_steps()));
            assert!(env.end_index() <= 119);
            assert_eq!(env.current_index(), env.start_index());
        }
    }

    #[test]
    fn episode_length_is_clamped_to_table() {
        let mut env = TradingEnv::new(data(30), config()).unwrap();

        env.reset(ResetOptions {
            episode_length: Some(500),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(env.max_steps(), 29);
        assert_eq!(env.start_index(), 0);
        assert_eq!(env.end_index(), 29);
    }

    #[test]
    fn bad_reset_options_are_config_errors() {
        let mut env = TradingEnv::new(data(30), config()).unwrap();

        let zero_length = env.reset(ResetOptions {
            episode_length: Some(0),
            ..Default::default()
        });
        assert!(matches!(zero_length, Err(EnvError::Config(_))));

        let late_start = env.reset(ResetOptions {
            episode_length: Some(10),
            start_index: Some(20),
            ..Default::default()
        });
        assert!(matches!(late_start, Err(EnvError::Config(_))));
        assert_eq!(env.status(), EnvStatus::Uninitialized);

        let negative = env.reset(ResetOptions {
            initial_balance: Some(-5.0),
            ..Default::default()
        });
        assert!(matches!(negative, Err(EnvError::Config(_))));
    }

    #[test]
    fn rejects_malformed_actions() {
        let mut env = TradingEnv::new(data(120), config()).unwrap();
        env.reset(ResetOptions::default()).unwrap();

        assert!(matches!(
            env.step(&[0.0, 0.0]),
            Err(EnvError::ActionShape { expected: 3, found: 2 })
        ));
        assert!(matches!(
            env.step(&[0.0, 1.5, 0.0]),
            Err(EnvError::ActionOutOfBounds { index: 1, .. })
        ));
        assert!(matches!(
            env.step(&[0.0, 0.0, f64::NAN]),
            Err(EnvError::ActionOutOfBounds { index: 2, .. })
        ));

        // a rejected action leaves the episode usable
        assert_eq!(env.status(), EnvStatus::Ready);
        assert!(env.step(&[-1.0, 0.0, 0.0]).is_ok());
    }

    #[test]
    fn same_seed_same_episodes() {
        let mut first = TradingEnv::new(data(120), config()).unwrap();
        let mut second = TradingEnv::new(data(120), config()).unwrap();

        for _ in 0..5 {
            first.reset(ResetOptions::default()).unwrap();
            second.reset(ResetOptions::default()).unwrap();
            assert_eq!(first.start_index(), second.start_index());
            assert_eq!(first.initial_balance(), second.initial_balance());
        }
    }

    #[test]
    fn render_reports_holdings() {
        let mut env = TradingEnv::new(data(120), config()).unwrap();
        env.reset(ResetOptions {
            initial_balance: Some(1000.0),
            start_index: Some(0),
            episode_length: Some(10),
        })
        .unwrap();

        let lines = env.render();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].contains("2024-03-01 00:00:00"));
        assert!(lines[1].contains("1000.00"));
    }

    #[test]
    fn window_mean_of_closes() {
        assert_eq!(window_mean(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(window_mean(&[]), 0.0);
    }
}
