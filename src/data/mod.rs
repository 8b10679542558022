pub mod loader;
pub mod table;

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::error;

use crate::error::DataError;

pub use loader::load_table;
pub use table::{parse_time, MarketTable, TableRows};

/// Hour and day rows matching one minute bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    pub minute: usize,
    pub hour: usize,
    pub day: usize,
}

/// The minute, hour and day tables an environment trades over.
///
/// Immutable after construction, so one instance is shared by any number of
/// environments through an `Arc`.
#[derive(Debug, Clone)]
pub struct MarketData {
    pub minute: MarketTable,
    pub hour: MarketTable,
    pub day: MarketTable,
    price_column: usize,
    closes: Vec<f64>,
}

impl MarketData {
    pub fn new(
        minute: MarketTable,
        hour: MarketTable,
        day: MarketTable,
        price_column: &str,
    ) -> Result<Self, DataError> {
        let Some(price_index) = minute.column_index(price_column) else {
            return Err(DataError::MissingColumn {
                table: minute.name().to_string(),
                column: price_column.to_string(),
            });
        };

        let closes = minute.column(price_index).to_vec();

        Ok(Self {
            minute,
            hour,
            day,
            price_column: price_index,
            closes,
        })
    }

    /// Loads the three csv tables and wraps them for sharing
    pub fn load(
        minute: impl AsRef<Path>,
        hour: impl AsRef<Path>,
        day: impl AsRef<Path>,
        price_column: &str,
    ) -> Result<Arc<Self>, DataError> {
        let minute = load_table(minute)?;
        let hour = load_table(hour)?;
        let day = load_table(day)?;

        Ok(Arc::new(Self::new(minute, hour, day, price_column)?))
    }

    pub fn price_column(&self) -> &str {
        &self.minute.columns()[self.price_column]
    }

    /// Minute close prices
    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn close(&self, minute_index: usize) -> f64 {
        self.closes[minute_index]
    }

    /// Width of the market part of an observation
    pub fn feature_count(&self) -> usize {
        self.minute.feature_count() + self.hour.feature_count() + self.day.feature_count()
    }

    /// Finds the hour bar (minute floored to the hour) and the day bar
    /// (calendar date) for a minute row by exact formatted-time match.
    ///
    /// Depends only on `minute_index` and the tables, so repeated calls agree.
    pub fn align(&self, minute_index: usize) -> Result<Alignment, DataError> {
        let timestamp = self.minute.timestamp(minute_index);

        let hour_key = hour_key(timestamp);
        let Some(hour) = self.hour.index_of(&hour_key) else {
            return Err(self.alignment_fault("hour", &self.hour, minute_index, hour_key));
        };

        let day_key = day_key(timestamp);
        let Some(day) = self.day.index_of(&day_key) else {
            return Err(self.alignment_fault("day", &self.day, minute_index, day_key));
        };

        Ok(Alignment {
            minute: minute_index,
            hour,
            day,
        })
    }

    /// Checks every minute row has an hour and a day bar, reporting the first miss
    pub fn validate_alignment(&self) -> Result<(), DataError> {
        for minute_index in 0..self.minute.len() {
            self.align(minute_index)?;
        }
        Ok(())
    }

    fn alignment_fault(
        &self,
        timeframe: &'static str,
        table: &MarketTable,
        minute_index: usize,
        key: String,
    ) -> DataError {
        let minute_time = self.minute.time(minute_index).to_string();
        let target = parse_time(&key).unwrap_or_else(|| self.minute.timestamp(minute_index));
        let (before, after) = table.nearest(target);
        let (before, after) = (before.map(str::to_string), after.map(str::to_string));

        error!(
            timeframe,
            minute_index,
            minute_time = %minute_time,
            key = %key,
            before = ?before,
            after = ?after,
            "no matching bar for minute timestamp"
        );

        DataError::Alignment {
            timeframe,
            minute_time,
            key,
            before,
            after,
        }
    }
}

pub fn hour_key(timestamp: NaiveDateTime) -> String {
    timestamp.format("%Y-%m-%d %H:00:00").to_string()
}

pub fn day_key(timestamp: NaiveDateTime) -> String {
    timestamp.format("%Y-%m-%d").to_string()
}
