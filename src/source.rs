//! Data-source collaborator: where tables come from
//!
//! The engine only talks to [`DataSource`]. [`CsvTableSource`] serves a
//! directory of `<table>.csv` files through Polars; [`MemorySource`] keeps
//! tables in memory.

use crate::data::Value;
use crate::error::{MiningError, MiningResult};
use polars::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// How a column is clustered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Aggregates the engine asks for on numeric columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Min,
    Max,
}

/// Rows plus per-column type classification
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Min or max of a numeric column; `None` when no number is present
    pub fn aggregate(&self, column: &str, aggregate: Aggregate) -> Option<f64> {
        let idx = self.column_index(column)?;
        let numbers = self.rows.iter().filter_map(|r| r.get(idx)).filter_map(Value::as_number);
        match aggregate {
            Aggregate::Min => numbers.reduce(f64::min),
            Aggregate::Max => numbers.reduce(f64::max),
        }
    }

    /// Sorted distinct values of a column, rendered as text
    pub fn distinct_values(&self, column: &str) -> Vec<String> {
        let Some(idx) = self.column_index(column) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|r| r.get(idx))
            .map(|v| v.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn distinct(mut self) -> Self {
        self.rows.sort();
        self.rows.dedup();
        self
    }
}

/// Everything the engine needs from the store holding the tables.
///
/// Implementations own their connection handling; failures are surfaced,
/// never retried.
pub trait DataSource: Send + Sync {
    /// Distinct rows of `table` with their column kinds.
    ///
    /// Fails with `EmptySet` when the table has no rows and with `Connection`
    /// when the store cannot be reached.
    fn load_table(&self, table: &str) -> MiningResult<Table>;

    /// Min or max of a numeric column. Fails with `NoValue` on a null result.
    fn aggregate(&self, table: &str, column: &str, aggregate: Aggregate) -> MiningResult<f64>;

    /// Sorted distinct values of a column
    fn distinct_values(&self, table: &str, column: &str) -> MiningResult<Vec<String>>;
}

/// Tables held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: HashMap<String, Table>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, table: Table) -> Self {
        self.insert(name, table);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, table: Table) {
        self.tables.insert(name.into(), table);
    }

    fn table(&self, name: &str) -> MiningResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| MiningError::DataSource(format!("table '{}' does not exist", name)))
    }
}

impl DataSource for MemorySource {
    fn load_table(&self, table: &str) -> MiningResult<Table> {
        let found = self.table(table)?;
        if found.rows().is_empty() {
            return Err(MiningError::EmptySet(table.to_string()));
        }
        Ok(found.clone().distinct())
    }

    fn aggregate(&self, table: &str, column: &str, aggregate: Aggregate) -> MiningResult<f64> {
        let found = self.table(table)?;
        if found.rows().is_empty() {
            return Err(MiningError::EmptySet(table.to_string()));
        }
        found.aggregate(column, aggregate).ok_or_else(|| MiningError::NoValue {
            table: table.to_string(),
            column: column.to_string(),
        })
    }

    fn distinct_values(&self, table: &str, column: &str) -> MiningResult<Vec<String>> {
        Ok(self.table(table)?.distinct_values(column))
    }
}

/// A directory of CSV files, one table per `<name>.csv`
#[derive(Debug, Clone)]
pub struct CsvTableSource {
    dir: PathBuf,
}

impl CsvTableSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table_path(&self, table: &str) -> MiningResult<PathBuf> {
        if !self.dir.is_dir() {
            return Err(MiningError::Connection(format!(
                "data directory {} is not reachable",
                self.dir.display()
            )));
        }
        if table.is_empty() || table.contains(['/', '\\']) || table.starts_with('.') {
            return Err(MiningError::Validation(format!("invalid table name '{}'", table)));
        }
        let path = self.dir.join(format!("{}.csv", table));
        if !path.is_file() {
            return Err(MiningError::DataSource(format!("table '{}' does not exist", table)));
        }
        Ok(path)
    }

    fn scan(&self, table: &str) -> MiningResult<LazyFrame> {
        let path = self.table_path(table)?;
        LazyCsvReader::new(&path)
            .with_has_header(true)
            .finish()
            .map_err(polars_error)
    }
}

fn polars_error(e: PolarsError) -> MiningError {
    MiningError::DataSource(e.to_string())
}

fn column_kind(dtype: &DataType) -> Option<ColumnKind> {
    if dtype.is_numeric() {
        Some(ColumnKind::Numeric)
    } else {
        match dtype {
            DataType::String | DataType::Boolean => Some(ColumnKind::Categorical),
            _ => None,
        }
    }
}

fn column_values(series: &Series, kind: ColumnKind) -> PolarsResult<Vec<Option<Value>>> {
    Ok(match kind {
        ColumnKind::Numeric => series
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.map(Value::Number))
            .collect(),
        ColumnKind::Categorical => series
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.map(|s| Value::Text(s.to_string())))
            .collect(),
    })
}

impl DataSource for CsvTableSource {
    fn load_table(&self, table: &str) -> MiningResult<Table> {
        // SELECT DISTINCT * over the admitted columns
        let df = self
            .scan(table)?
            .drop_nulls(None)
            .unique(None, UniqueKeepStrategy::First)
            .collect()
            .map_err(polars_error)?;

        if df.height() == 0 {
            return Err(MiningError::EmptySet(table.to_string()));
        }

        let mut columns = Vec::new();
        let mut cells: Vec<Vec<Option<Value>>> = Vec::new();
        for series in df.get_columns() {
            let Some(kind) = column_kind(series.dtype()) else {
                debug!(table, column = series.name(), dtype = %series.dtype(), "skipping column");
                continue;
            };
            columns.push(Column::new(series.name(), kind));
            cells.push(column_values(series, kind).map_err(polars_error)?);
        }

        let mut rows = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let row = cells
                .iter()
                .map(|column| column[i].clone())
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| MiningError::DataSource(format!("null value in row {} of '{}'", i, table)))?;
            rows.push(row);
        }

        debug!(table, rows = rows.len(), columns = columns.len(), "table loaded");
        Ok(Table::new(columns, rows).distinct())
    }

    fn aggregate(&self, table: &str, column: &str, aggregate: Aggregate) -> MiningResult<f64> {
        let expr = match aggregate {
            Aggregate::Min => col(column).min(),
            Aggregate::Max => col(column).max(),
        };
        let df = self
            .scan(table)?
            .select([expr.cast(DataType::Float64)])
            .collect()
            .map_err(polars_error)?;

        if df.height() == 0 {
            return Err(MiningError::EmptySet(table.to_string()));
        }
        let value = df
            .column(column)
            .and_then(|s| s.f64().map(|ca| ca.get(0)))
            .map_err(polars_error)?;
        value.ok_or_else(|| MiningError::NoValue {
            table: table.to_string(),
            column: column.to_string(),
        })
    }

    fn distinct_values(&self, table: &str, column: &str) -> MiningResult<Vec<String>> {
        let df = self
            .scan(table)?
            .select([col(column).cast(DataType::String)])
            .drop_nulls(None)
            .unique(None, UniqueKeepStrategy::First)
            .collect()
            .map_err(polars_error)?;

        let values = df
            .column(column)
            .and_then(|s| s.str().map(|ca| ca.into_iter().flatten().map(str::to_string).collect::<BTreeSet<_>>()))
            .map_err(polars_error)?;
        Ok(values.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("playtennis.csv"),
            "outlook,temperature,play\n\
             sunny,30.3,no\n\
             sunny,30.3,no\n\
             overcast,12.0,yes\n\
             rain,13.0,yes\n\
             rain,0.0,no\n",
        )
        .unwrap();
        fs::write(dir.path().join("empty.csv"), "outlook,temperature\n").unwrap();
        dir
    }

    #[test]
    fn test_csv_load_table_distinct_rows() {
        let dir = create_test_dir();
        let source = CsvTableSource::new(dir.path());
        let table = source.load_table("playtennis").unwrap();

        assert_eq!(table.rows().len(), 4);
        assert_eq!(
            table.columns(),
            &[
                Column::new("outlook", ColumnKind::Categorical),
                Column::new("temperature", ColumnKind::Numeric),
                Column::new("play", ColumnKind::Categorical),
            ]
        );
    }

    #[test]
    fn test_csv_aggregates() {
        let dir = create_test_dir();
        let source = CsvTableSource::new(dir.path());
        assert_eq!(source.aggregate("playtennis", "temperature", Aggregate::Min).unwrap(), 0.0);
        assert_eq!(source.aggregate("playtennis", "temperature", Aggregate::Max).unwrap(), 30.3);
        assert_eq!(
            source.distinct_values("playtennis", "outlook").unwrap(),
            vec!["overcast", "rain", "sunny"]
        );
    }

    #[test]
    fn test_csv_empty_table() {
        let dir = create_test_dir();
        let source = CsvTableSource::new(dir.path());
        assert!(matches!(source.load_table("empty"), Err(MiningError::EmptySet(_))));
    }

    #[test]
    fn test_csv_unreachable_directory() {
        let source = CsvTableSource::new("/definitely/not/a/data/dir");
        assert!(matches!(source.load_table("t"), Err(MiningError::Connection(_))));
    }

    #[test]
    fn test_csv_rejects_path_traversal() {
        let dir = create_test_dir();
        let source = CsvTableSource::new(dir.path());
        assert!(matches!(source.load_table("../etc"), Err(MiningError::Validation(_))));
        assert!(matches!(source.load_table("missing"), Err(MiningError::DataSource(_))));
    }

    #[test]
    fn test_memory_source() {
        let source = MemorySource::new().with_table(
            "t",
            Table::new(
                vec![Column::new("x", ColumnKind::Numeric)],
                vec![vec![Value::Number(3.0)], vec![Value::Number(1.0)], vec![Value::Number(3.0)]],
            ),
        );
        assert_eq!(source.load_table("t").unwrap().rows().len(), 2);
        assert_eq!(source.aggregate("t", "x", Aggregate::Max).unwrap(), 3.0);
        assert!(matches!(
            source.aggregate("t", "missing", Aggregate::Min),
            Err(MiningError::NoValue { .. })
        ));
    }
}
