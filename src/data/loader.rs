use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    constants::{env::TIME_COLUMN, files::TABLE_CACHE_EXTENSION},
    data::table::{MarketTable, TableRows},
    error::DataError,
};

/// Loads a market table, preferring an up to date binary cache next to the csv.
///
/// The csv needs a `Formatted_Time` column; every other column is a numeric
/// feature. Blank or non-numeric cells are errors rather than zero-filled.
pub fn load_table(path: impl AsRef<Path>) -> Result<MarketTable, DataError> {
    let path = path.as_ref();

    if let Some(rows) = read_cache(path) {
        match MarketTable::from_rows(rows) {
            Ok(table) => return Ok(table),
            Err(err) => warn!(?path, %err, "ignoring invalid table cache"),
        }
    }

    let rows = read_csv(path)?;
    if let Err(err) = write_cache(path, &rows) {
        warn!(?path, %err, "failed to write table cache");
    }

    MarketTable::from_rows(rows)
}

pub fn cache_path(path: &Path) -> PathBuf {
    path.with_extension(TABLE_CACHE_EXTENSION)
}

fn table_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn read_csv(path: &Path) -> Result<TableRows, DataError> {
    let name = table_name(path);
    let csv_error = |source| DataError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_error)?;

    let headers = reader.headers().map_err(csv_error)?.clone();
    let Some(time_index) = headers.iter().position(|header| header == TIME_COLUMN) else {
        return Err(DataError::MissingColumn {
            table: name,
            column: TIME_COLUMN.to_string(),
        });
    };

    let columns: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != time_index)
        .map(|(_, header)| header.to_string())
        .collect();

    let mut times = Vec::new();
    let mut values = Vec::new();

    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(csv_error)?;

        for (index, field) in record.iter().enumerate() {
            if index == time_index {
                times.push(field.to_string());
                continue;
            }

            let value = field.parse::<f64>().map_err(|_| DataError::InvalidNumber {
                table: name.clone(),
                row,
                column: headers.get(index).unwrap_or_default().to_string(),
                value: field.to_string(),
            })?;
            values.push(value);
        }
    }

    debug!(table = %name, rows = times.len(), columns = columns.len(), "read csv table");

    Ok(TableRows {
        name,
        columns,
        times,
        values,
    })
}

fn read_cache(path: &Path) -> Option<TableRows> {
    let cache = cache_path(path);

    // A cache older than its csv is stale
    let cache_modified = fs::metadata(&cache).and_then(|meta| meta.modified()).ok()?;
    if let Ok(csv_modified) = fs::metadata(path).and_then(|meta| meta.modified()) {
        if csv_modified > cache_modified {
            return None;
        }
    }

    let bytes = fs::read(&cache).ok()?;
    postcard::from_bytes(&bytes).ok()
}

fn write_cache(path: &Path, rows: &TableRows) -> Result<(), DataError> {
    let cache = cache_path(path);
    let encoded = postcard::to_allocvec(rows)?;

    fs::write(&cache, encoded).map_err(|source| DataError::Io {
        path: cache,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const MINUTE_CSV: &str = "Formatted_Time,BTC1m_Open,BTC1m_Close\n\
        2024-03-01 00:00:00,100.0,101.0\n\
        2024-03-01 00:01:00,101.0,99.5\n";

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_csv_and_writes_cache() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "minute.csv", MINUTE_CSV);

        let table = load_table(&path).unwrap();
        assert_eq!(table.name(), "minute");
        assert_eq!(table.columns(), ["BTC1m_Open", "BTC1m_Close"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(1)[1], 99.5);
        assert!(cache_path(&path).exists());

        let cached = load_table(&path).unwrap();
        assert_eq!(cached.to_rows(), table.to_rows());
    }

    #[test]
    fn blank_cells_are_errors() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "minute.csv",
            "Formatted_Time,BTC1m_Close\n2024-03-01 00:00:00,\n",
        );

        let result = load_table(&path);
        assert!(matches!(result, Err(DataError::InvalidNumber { row: 0, .. })));
    }

    #[test]
    fn missing_time_column_is_an_error() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "minute.csv", "Time,BTC1m_Close\n2024-03-01,1.0\n");

        let result = load_table(&path);
        assert!(matches!(result, Err(DataError::MissingColumn { .. })));
    }
}
