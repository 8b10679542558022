use std::sync::Arc;

use ndarray::Array2;

use super::env::{EnvConfig, ResetOptions, StepInfo, TradingEnv};
use crate::{
    data::MarketData,
    error::EnvError,
    history::{EpisodeSummary, MonitorRecord},
};

/// Results of stepping every environment once
#[derive(Debug, Clone)]
pub struct VecStep {
    /// One row per environment; a finished environment's row is its fresh episode
    pub observations: Array2<f32>,
    pub rewards: Vec<f64>,
    pub dones: Vec<bool>,
    pub infos: Vec<StepInfo>,
    pub summaries: Vec<Option<EpisodeSummary>>,
    /// Monitor table of an episode that just finished, taken before the automatic reset
    pub episode_records: Vec<Option<Arc<Vec<MonitorRecord>>>>,
}

/// Independent environments over one shared set of market tables.
///
/// Only env 0 keeps testing mode, so a single monitor is recorded.
pub struct VecEnv {
    pub envs: Vec<TradingEnv>,
    reset_options: ResetOptions,
}

impl VecEnv {
    pub fn new(data: Arc<MarketData>, config: EnvConfig, count: usize) -> Result<Self, EnvError> {
        if count == 0 {
            return Err(EnvError::Config("a VecEnv needs at least one environment".to_string()));
        }

        let mut envs = Vec::with_capacity(count);
        for env_id in 0..count {
            let env_config = EnvConfig {
                testing: config.testing && env_id == 0,
                seed: config.seed.map(|seed| seed.wrapping_add(env_id as u64)),
                ..config.clone()
            };

            let mut env = TradingEnv::new(Arc::clone(&data), env_config)?;
            env.env_id = env_id;
            envs.push(env);
        }

        Ok(Self {
            envs,
            reset_options: ResetOptions::default(),
        })
    }

    /// Options used by `reset` and by the automatic reset of finished environments
    pub fn with_reset_options(mut self, options: ResetOptions) -> Self {
        self.reset_options = options;
        self
    }

    pub fn len(&self) -> usize {
        self.envs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envs.is_empty()
    }

    fn observation_width(&self) -> usize {
        self.primary().observation_space().shape
    }

    pub fn reset(&mut self) -> Result<Array2<f32>, EnvError> {
        let mut observations = Array2::<f32>::zeros((self.envs.len(), self.observation_width()));

        for (row, env) in self.envs.iter_mut().enumerate() {
            let observation = env.reset(self.reset_options)?;
            observations.row_mut(row).assign(&observation);
        }

        Ok(observations)
    }

    pub fn step(&mut self, actions: &[Vec<f64>]) -> Result<VecStep, EnvError> {
        if actions.len() != self.envs.len() {
            return Err(EnvError::BatchSize {
                expected: self.envs.len(),
                found: actions.len(),
            });
        }

        let count = self.envs.len();
        let mut observations = Array2::<f32>::zeros((count, self.observation_width()));
        let mut rewards = Vec::with_capacity(count);
        let mut dones = Vec::with_capacity(count);
        let mut infos = Vec::with_capacity(count);
        let mut summaries = Vec::with_capacity(count);
        let mut episode_records = Vec::with_capacity(count);

        for (row, (env, action)) in self.envs.iter_mut().zip(actions).enumerate() {
            let step = env.step(action)?;

            let records = match step.done {
                true => env.monitor().map(|monitor| monitor.snapshot()),
                false => None,
            };

            let observation = match step.observation {
                Some(observation) => observation,
                None => env.reset(self.reset_options)?,
            };
            observations.row_mut(row).assign(&observation);

            rewards.push(step.reward);
            dones.push(step.done);
            infos.push(step.info);
            summaries.push(step.summary);
            episode_records.push(records);
        }

        Ok(VecStep {
            observations,
            rewards,
            dones,
            infos,
            summaries,
            episode_records,
        })
    }

    pub fn primary(&self) -> &TradingEnv {
        &self.envs[0]
    }

    pub fn primary_mut(&mut self) -> &mut TradingEnv {
        &mut self.envs[0]
    }
}
