#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use crypto_trading_env::{
    constants::env::PRICE_COLUMN,
    data::{MarketData, MarketTable},
    env::{EnvConfig, ResetOptions, TradingEnv},
};

pub const INITIAL_BALANCE: f64 = 1000.0;

fn origin() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub fn close_at(minute: usize) -> f64 {
    60_000.0 + 500.0 * (minute as f64 / 7.0).sin() + minute as f64 * 2.0
}

fn ohlcv(close: f64) -> Vec<f64> {
    vec![close - 5.0, close + 10.0, close - 10.0, close, 3.5]
}

fn columns(prefix: &str) -> Vec<String> {
    ["Open", "High", "Low", "Close", "Volume"]
        .iter()
        .map(|column| format!("{prefix}_{column}"))
        .collect()
}

/// Minute bars from 2024-03-01 00:00 with hour and day tables covering them.
/// `skip_hour` leaves that hour out of the hour table.
pub fn market_with_gap(minutes: usize, skip_hour: Option<usize>) -> Arc<MarketData> {
    build_market(minutes, skip_hour, None)
}

/// Like `market`, with the close of minute bar `zero_minute` set to 0
pub fn market_with_zero_close(minutes: usize, zero_minute: usize) -> Arc<MarketData> {
    build_market(minutes, None, Some(zero_minute))
}

fn build_market(
    minutes: usize,
    skip_hour: Option<usize>,
    zero_close: Option<usize>,
) -> Arc<MarketData> {
    let start = origin();
    let stamps: Vec<NaiveDateTime> = (0..minutes)
        .map(|minute| start + Duration::minutes(minute as i64))
        .collect();

    let minute = MarketTable::new(
        "BTC1m",
        columns("BTC1m"),
        stamps
            .iter()
            .map(|stamp| stamp.format("%Y-%m-%d %H:%M:%S").to_string())
            .collect(),
        (0..minutes)
            .map(|minute| match zero_close {
                Some(zero) if zero == minute => ohlcv(0.0),
                _ => ohlcv(close_at(minute)),
            })
            .collect(),
    )
    .unwrap();

    let mut hour_times = Vec::new();
    let mut hour_rows = Vec::new();
    let mut day_times = Vec::new();
    let mut day_rows = Vec::new();

    for (minute, stamp) in stamps.iter().enumerate() {
        if stamp.minute() == 0 || minute == 0 {
            let hour_index = minute / 60;
            if skip_hour != Some(hour_index) {
                let hour_start = stamp.date().and_hms_opt(stamp.hour(), 0, 0).unwrap();
                hour_times.push(hour_start.format("%Y-%m-%d %H:%M:%S").to_string());
                hour_rows.push(ohlcv(close_at(minute)));
            }
        }

        let day = stamp.format("%Y-%m-%d").to_string();
        if day_times.last() != Some(&day) {
            day_times.push(day);
            day_rows.push(ohlcv(close_at(minute)));
        }
    }

    let hour = MarketTable::new("BTC1H", columns("BTC1H"), hour_times, hour_rows).unwrap();
    let day = MarketTable::new("BTC1D", columns("BTC1D"), day_times, day_rows).unwrap();

    Arc::new(MarketData::new(minute, hour, day, PRICE_COLUMN).unwrap())
}

pub fn market(minutes: usize) -> Arc<MarketData> {
    market_with_gap(minutes, None)
}

pub fn config() -> EnvConfig {
    EnvConfig {
        balance_range: (500.0, 5000.0),
        episode_length_range: (20, 60),
        seed: Some(42),
        ..EnvConfig::default()
    }
}

pub fn pinned(start_index: usize, episode_length: usize) -> ResetOptions {
    ResetOptions {
        initial_balance: Some(INITIAL_BALANCE),
        episode_length: Some(episode_length),
        start_index: Some(start_index),
    }
}

/// Env over 120 minutes reset to the window [10, 70)
pub fn fresh_env(testing: bool) -> TradingEnv {
    let mut env = TradingEnv::new(market(120), EnvConfig { testing, ..config() }).unwrap();
    env.reset(pinned(10, 60)).unwrap();
    env
}

/// Action value that decodes to `pct` percent of the initial balance
pub fn buy_pct(pct: f64) -> f64 {
    pct / 50.0 - 1.0
}

pub const HOLD: [f64; 3] = [-1.0, 0.0, 0.0];
