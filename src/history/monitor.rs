use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{env::StepInfo, error::DataError};

/// One testing-mode row per step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorRecord {
    pub episode: usize,
    pub step: usize,
    pub minute_index: usize,
    pub time: String,
    pub cash_balance: f64,
    pub btc_held: f64,
    pub avg_buy_price: f64,
    pub price: f64,
    pub buy_fraction_pct: f64,
    pub trend_prediction: f64,
    pub min_price_prediction: f64,
    pub spent: f64,
    pub reward: f64,
    pub episode_reward: f64,
    /// Reward summed over every episode this monitor has seen
    pub model_reward: f64,
    pub profit: f64,
    pub progress: f64,
}

impl MonitorRecord {
    pub fn from_step(episode: usize, info: &StepInfo, reward: f64, initial_balance: f64) -> Self {
        Self {
            episode,
            step: info.step,
            minute_index: info.minute_index,
            time: info.time.clone(),
            cash_balance: info.portfolio.cash_balance,
            btc_held: info.portfolio.btc_held,
            avg_buy_price: info.portfolio.avg_buy_price,
            price: info.price,
            buy_fraction_pct: info.action.buy_fraction_pct,
            trend_prediction: info.action.trend_prediction,
            min_price_prediction: info.action.min_price_prediction,
            spent: info.trade.spent,
            reward,
            episode_reward: info.episode_reward,
            model_reward: 0.0,
            profit: info.portfolio.profit(info.price, initial_balance),
            progress: info.progress,
        }
    }
}

/// Step records of the current episode.
///
/// Records sit behind an `Arc`, so a snapshot taken by a caller stays valid
/// after the environment resets; reset only swaps in a new table.
#[derive(Debug, Clone, Default)]
pub struct Monitor {
    records: Arc<Vec<MonitorRecord>>,
    model_reward: f64,
}

impl Monitor {
    pub fn reset(&mut self) {
        if !self.records.is_empty() {
            self.records = Arc::new(Vec::new());
        }
    }

    pub fn push(&mut self, mut record: MonitorRecord) {
        self.model_reward += record.reward;
        record.model_reward = self.model_reward;
        Arc::make_mut(&mut self.records).push(record);
    }

    pub fn last(&self) -> Option<&MonitorRecord> {
        self.records.last()
    }

    pub fn records(&self) -> &[MonitorRecord] {
        &self.records
    }

    pub fn snapshot(&self) -> Arc<Vec<MonitorRecord>> {
        Arc::clone(&self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn model_reward(&self) -> f64 {
        self.model_reward
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), DataError> {
        write_records(path, &self.records)
    }
}

pub fn write_records(path: impl AsRef<Path>, records: &[MonitorRecord]) -> Result<(), DataError> {
    let path = path.as_ref();
    let csv_error = |source| DataError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    for record in records {
        writer.serialize(record).map_err(csv_error)?;
    }

    writer.flush().map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })
}
