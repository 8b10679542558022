use chrono::{NaiveDate, NaiveDateTime};
use hashbrown::HashMap;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::DataError;

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Accepts `YYYY-MM-DD HH:MM:SS` and bare `YYYY-MM-DD` (midnight)
pub fn parse_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Raw table contents, the shape read from csv and stored in the binary cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRows {
    pub name: String,
    /// Feature column names, without the time column
    pub columns: Vec<String>,
    pub times: Vec<String>,
    /// Row-major, `times.len() * columns.len()` values
    pub values: Vec<f64>,
}

/// One timeframe of bars, sorted by time and immutable once built
#[derive(Debug, Clone)]
pub struct MarketTable {
    name: String,
    columns: Vec<String>,
    times: Vec<String>,
    timestamps: Vec<NaiveDateTime>,
    features: Array2<f64>,
    time_index: HashMap<String, usize>,
}

impl MarketTable {
    pub fn new(
        name: impl Into<String>,
        columns: Vec<String>,
        times: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, DataError> {
        let name = name.into();
        let width = columns.len();

        let mut values = Vec::with_capacity(rows.len() * width);
        for (row_index, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(DataError::RowWidth {
                    table: name,
                    row: row_index,
                    found: row.len(),
                    expected: width,
                });
            }
            values.extend(row);
        }

        Self::from_rows(TableRows {
            name,
            columns,
            times,
            values,
        })
    }

    pub fn from_rows(rows: TableRows) -> Result<Self, DataError> {
        let TableRows {
            name,
            columns,
            times,
            values,
        } = rows;

        if times.is_empty() {
            return Err(DataError::EmptyTable { table: name });
        }
        if columns.is_empty() {
            return Err(DataError::NoFeatures { table: name });
        }

        let width = columns.len();
        if values.len() != times.len() * width {
            return Err(DataError::RowWidth {
                table: name,
                row: values.len() / width,
                found: values.len() % width,
                expected: width,
            });
        }

        if let Some(position) = values.iter().position(|value| !value.is_finite()) {
            return Err(DataError::InvalidNumber {
                table: name,
                row: position / width,
                column: columns[position % width].clone(),
                value: values[position].to_string(),
            });
        }

        let mut timestamps = Vec::with_capacity(times.len());
        for (row, time) in times.iter().enumerate() {
            let Some(timestamp) = parse_time(time) else {
                return Err(DataError::InvalidTimestamp {
                    table: name,
                    row,
                    value: time.clone(),
                });
            };

            if let Some(previous) = timestamps.last() {
                if timestamp < *previous {
                    return Err(DataError::NonMonotonicTime {
                        table: name,
                        row,
                        time: time.clone(),
                        previous_row: row - 1,
                        previous_time: times[row - 1].clone(),
                    });
                }
            }
            timestamps.push(timestamp);
        }

        let mut time_index = HashMap::with_capacity(times.len());
        for (row, time) in times.iter().enumerate() {
            time_index.entry(time.trim().to_string()).or_insert(row);
        }

        let features = Array2::from_shape_vec((times.len(), width), values).map_err(|_| {
            DataError::RowWidth {
                table: name.clone(),
                row: 0,
                found: 0,
                expected: width,
            }
        })?;

        Ok(Self {
            name,
            columns,
            times,
            timestamps,
            features,
            time_index,
        })
    }

    pub fn to_rows(&self) -> TableRows {
        TableRows {
            name: self.name.clone(),
            columns: self.columns.clone(),
            times: self.times.clone(),
            values: self.features.iter().copied().collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of non-time columns
    pub fn feature_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }

    pub fn column(&self, index: usize) -> ArrayView1<'_, f64> {
        self.features.column(index)
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.features.row(index)
    }

    pub fn time(&self, index: usize) -> &str {
        &self.times[index]
    }

    pub fn timestamp(&self, index: usize) -> NaiveDateTime {
        self.timestamps[index]
    }

    /// Row of the first bar whose formatted time equals `key`
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.time_index.get(key).copied()
    }

    /// Formatted times of the bars directly before and at-or-after `timestamp`
    pub fn nearest(&self, timestamp: NaiveDateTime) -> (Option<&str>, Option<&str>) {
        let split = self.timestamps.partition_point(|bar| *bar < timestamp);
        let before = split
            .checked_sub(1)
            .map(|index| self.times[index].as_str());
        let after = self.times.get(split).map(|time| time.as_str());
        (before, after)
    }
}
