use std::fs;
use std::path::Path;

use colored::Colorize;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// End of episode figures of one environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub env_id: usize,
    pub episode: usize,
    pub initial_balance: f64,
    pub final_value: f64,
    pub profit: f64,
    pub reward: f64,
    pub avg_buy_price: f64,
    pub window_mean: f64,
    pub cash_left: f64,
    pub steps: usize,
}

impl EpisodeSummary {
    /// How far below the window mean close the average buy was, in percent
    pub fn below_mean_pct(&self) -> f64 {
        if self.avg_buy_price <= 0.0 || self.window_mean <= 0.0 {
            return 0.0;
        }
        (self.window_mean - self.avg_buy_price) / self.window_mean * 100.0
    }

    pub fn invested_pct(&self) -> f64 {
        if self.initial_balance <= 0.0 {
            return 0.0;
        }
        (1.0 - self.cash_left / self.initial_balance) * 100.0
    }
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct MetaHistory {
    pub episodes: Vec<EpisodeSummary>,
}

impl MetaHistory {
    pub fn record(&mut self, summary: EpisodeSummary) {
        self.episodes.push(summary);
    }

    pub fn extend(&mut self, other: MetaHistory) {
        self.episodes.extend(other.episodes);
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    fn mean(&self, field: impl Fn(&EpisodeSummary) -> f64) -> f64 {
        if self.episodes.is_empty() {
            return 0.0;
        }
        self.episodes.iter().map(field).sum::<f64>() / self.episodes.len() as f64
    }

    pub fn mean_profit(&self) -> f64 {
        self.mean(|summary| summary.profit)
    }

    pub fn mean_reward(&self) -> f64 {
        self.mean(|summary| summary.reward)
    }

    pub fn mean_below_mean_pct(&self) -> f64 {
        self.mean(EpisodeSummary::below_mean_pct)
    }

    pub fn best(&self) -> Option<&EpisodeSummary> {
        self.episodes
            .iter()
            .max_by_key(|summary| OrderedFloat(summary.reward))
    }

    pub fn worst(&self) -> Option<&EpisodeSummary> {
        self.episodes
            .iter()
            .min_by_key(|summary| OrderedFloat(summary.reward))
    }

    pub fn print_summary(&self, label: &str) {
        let profit = self.mean_profit();
        let profit_str = if profit >= 0.0 {
            format!("${profit:.2}").green()
        } else {
            format!("${profit:.2}").red()
        };

        println!(
            "{} {} - episodes {} | mean profit {} | mean reward {:.2} | avg buy vs mean {}",
            "Rollout".bright_blue(),
            label.bright_blue().bold(),
            self.episodes.len(),
            profit_str,
            self.mean_reward(),
            format!("{:.2}%", self.mean_below_mean_pct()).cyan(),
        );

        if let (Some(best), Some(worst)) = (self.best(), self.worst()) {
            println!(
                "  best reward {} (env {} episode {}) | worst reward {} (env {} episode {})",
                format!("{:.2}", best.reward).bright_green(),
                best.env_id,
                best.episode,
                format!("{:.2}", worst.reward).bright_red(),
                worst.env_id,
                worst.episode,
            );
        }
    }

    pub fn write_report(&self, path: impl AsRef<Path>) -> Result<(), DataError> {
        let path = path.as_ref();
        let encoded = postcard::to_allocvec(self)?;

        fs::write(path, encoded).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn read_report(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(postcard::from_bytes(&bytes)?)
    }
}
