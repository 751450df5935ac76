//! CSV import provider.
//!
//! Reads `{dir}/{SYMBOL}.csv` (as exported by brokers or spreadsheet tools)
//! and returns the rows inside the requested date range. Column labels are
//! described by a `ColumnMap`, so any export layout with one row per day works.

use super::canonicalize::timestamp_values;
use super::provider::{DataError, DataProvider};
use super::schema::ColumnMap;
use crate::domain::{FetchRequest, Interval};
use polars::prelude::*;
use std::path::{Path, PathBuf};

pub struct CsvProvider {
    dir: PathBuf,
    columns: ColumnMap,
}

impl CsvProvider {
    pub fn new(dir: impl Into<PathBuf>, columns: ColumnMap) -> Self {
        Self {
            dir: dir.into(),
            columns,
        }
    }

    /// File holding a symbol's bars.
    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", symbol.to_uppercase()))
    }

    fn read(path: &Path) -> Result<DataFrame, DataError> {
        let frame = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?;
        Ok(frame)
    }
}

impl DataProvider for CsvProvider {
    fn name(&self) -> &str {
        "csv_import"
    }

    fn column_map(&self) -> &ColumnMap {
        &self.columns
    }

    fn supports(&self, interval: Interval) -> bool {
        interval == Interval::OneDay
    }

    fn fetch(&self, request: &FetchRequest) -> Result<DataFrame, DataError> {
        let path = self.path_for(&request.symbol);
        if !path.is_file() {
            return Err(DataError::SymbolNotFound {
                symbol: request.symbol.clone(),
            });
        }

        let frame = Self::read(&path)?;
        if frame.height() == 0 {
            return Ok(frame);
        }

        let ts_column = frame
            .column(&self.columns.timestamp)
            .map_err(|_| DataError::MissingColumn(self.columns.timestamp.clone()))?;
        let mask: Vec<bool> = timestamp_values(ts_column, self.columns.epoch_unit)?
            .into_iter()
            .map(|ts| {
                ts.map(|t| {
                    let day = t.date_naive();
                    day >= request.start && day <= request.end
                })
                .unwrap_or(false)
            })
            .collect();

        let filtered = frame.filter(&BooleanChunked::from_slice("in_range".into(), &mask))?;
        tracing::debug!(
            path = %path.display(),
            rows = frame.height(),
            kept = filtered.height(),
            "read csv"
        );
        Ok(filtered)
    }
}
