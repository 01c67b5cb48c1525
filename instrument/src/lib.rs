//! Column-oriented recording for simulation output.
//!
//! Tables are append-only: rows go in through [`DynamicTable::push_row`] and
//! are never edited afterwards. Columns are created on first use and padded
//! with defaults so every column always has `row_count` entries.
//!
//! There are two ways to fill a table:
//!
//! ```ignore
//! // Explicitly, from typed rows:
//! let mut table = instrument::DynamicTable::default();
//! table.push_row([("step", Value::U64(0)), ("rate", Value::F64(0.5))])?;
//!
//! // From tracing events, one table per target:
//! tracing::subscriber::with_default(instrument::DataFrameSubscriber, || {
//!     tracing::info!(target: "extraction", step = 3u64, agent = 7u64, amount = 1.5);
//! });
//! let recorder = instrument::drain();
//! let extractions = &recorder.tables["extraction"];
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::{Event, Id, Metadata, Subscriber};

pub use polars::prelude::{DataFrame, PolarsError, PolarsResult};

// === VALUES & COLUMNS ===

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    U64(u64),
    I64(i64),
    F64(f64),
    Str(String),
}

impl Value {
    /// Numeric view of the value. Booleans map to 0.0 / 1.0.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::U64(v) => Some(*v as f64),
            Value::I64(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Str(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    fn kind(&self) -> ColumnKind {
        match self {
            Value::U64(_) => ColumnKind::U64,
            Value::I64(_) => ColumnKind::I64,
            Value::F64(_) => ColumnKind::F64,
            Value::Bool(_) => ColumnKind::Bool,
            Value::Str(_) => ColumnKind::Str,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::U64(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Str(v) => f.write_str(v),
        }
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::U64(v as u64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U64(u64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    U64,
    I64,
    F64,
    Bool,
    Str,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::U64 => "u64",
            ColumnKind::I64 => "i64",
            ColumnKind::F64 => "f64",
            ColumnKind::Bool => "bool",
            ColumnKind::Str => "str",
        };
        f.write_str(name)
    }
}

/// A column of typed values.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedColumn {
    U64(Vec<u64>),
    I64(Vec<i64>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

impl TypedColumn {
    /// An empty column of `kind`, pre-padded with `padding` default entries.
    fn padded(kind: ColumnKind, padding: usize) -> Self {
        match kind {
            ColumnKind::U64 => TypedColumn::U64(vec![0; padding]),
            ColumnKind::I64 => TypedColumn::I64(vec![0; padding]),
            ColumnKind::F64 => TypedColumn::F64(vec![0.0; padding]),
            ColumnKind::Bool => TypedColumn::Bool(vec![false; padding]),
            ColumnKind::Str => TypedColumn::Str(vec![String::new(); padding]),
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            TypedColumn::U64(_) => ColumnKind::U64,
            TypedColumn::I64(_) => ColumnKind::I64,
            TypedColumn::F64(_) => ColumnKind::F64,
            TypedColumn::Bool(_) => ColumnKind::Bool,
            TypedColumn::Str(_) => ColumnKind::Str,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TypedColumn::U64(v) => v.len(),
            TypedColumn::I64(v) => v.len(),
            TypedColumn::F64(v) => v.len(),
            TypedColumn::Bool(v) => v.len(),
            TypedColumn::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, row: usize) -> Option<Value> {
        match self {
            TypedColumn::U64(v) => v.get(row).copied().map(Value::U64),
            TypedColumn::I64(v) => v.get(row).copied().map(Value::I64),
            TypedColumn::F64(v) => v.get(row).copied().map(Value::F64),
            TypedColumn::Bool(v) => v.get(row).copied().map(Value::Bool),
            TypedColumn::Str(v) => v.get(row).cloned().map(Value::Str),
        }
    }

    /// Append a value whose kind has already been checked against the column.
    fn push(&mut self, value: Value) {
        match (self, value) {
            (TypedColumn::U64(v), Value::U64(x)) => v.push(x),
            (TypedColumn::I64(v), Value::I64(x)) => v.push(x),
            (TypedColumn::F64(v), Value::F64(x)) => v.push(x),
            (TypedColumn::Bool(v), Value::Bool(x)) => v.push(x),
            (TypedColumn::Str(v), Value::Str(x)) => v.push(x),
            _ => {}
        }
    }

    fn pad_to(&mut self, row_count: usize) {
        let current_len = self.len();
        if current_len >= row_count {
            return;
        }
        let padding = row_count - current_len;
        match self {
            TypedColumn::U64(v) => v.extend(std::iter::repeat_n(0, padding)),
            TypedColumn::I64(v) => v.extend(std::iter::repeat_n(0, padding)),
            TypedColumn::F64(v) => v.extend(std::iter::repeat_n(0.0, padding)),
            TypedColumn::Bool(v) => v.extend(std::iter::repeat_n(false, padding)),
            TypedColumn::Str(v) => v.extend(std::iter::repeat_n(String::new(), padding)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TableError {
    #[error("column `{column}` holds {expected} values, got {found}")]
    KindMismatch {
        column: String,
        expected: ColumnKind,
        found: ColumnKind,
    },

    #[error("column `{0}` appears twice in one row")]
    DuplicateColumn(String),
}

// === TABLES ===

/// A table with dynamically-typed columns, in first-seen column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicTable {
    columns: HashMap<String, TypedColumn>,
    order: Vec<String>,
    row_count: usize,
}

impl DynamicTable {
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Column names in the order they were first recorded.
    pub fn column_names(&self) -> &[String] {
        &self.order
    }

    pub fn column(&self, name: &str) -> Option<&TypedColumn> {
        self.columns.get(name)
    }

    pub fn f64_column(&self, name: &str) -> Option<&[f64]> {
        match self.columns.get(name)? {
            TypedColumn::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn u64_column(&self, name: &str) -> Option<&[u64]> {
        match self.columns.get(name)? {
            TypedColumn::U64(v) => Some(v),
            _ => None,
        }
    }

    pub fn bool_column(&self, name: &str) -> Option<&[bool]> {
        match self.columns.get(name)? {
            TypedColumn::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// One row as `(column, value)` pairs, in column order.
    pub fn row(&self, index: usize) -> Option<Vec<(&str, Value)>> {
        if index >= self.row_count {
            return None;
        }
        self.order
            .iter()
            .map(|name| {
                let value = self.columns.get(name)?.get(index)?;
                Some((name.as_str(), value))
            })
            .collect()
    }

    /// Append one row. Columns missing from the row get default values,
    /// columns new to the table are back-filled with defaults.
    ///
    /// The row is checked before anything is written, so a rejected row
    /// leaves the table untouched.
    pub fn push_row<K, I>(&mut self, row: I) -> Result<(), TableError>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let row: Vec<(K, Value)> = row.into_iter().collect();

        for (i, (name, value)) in row.iter().enumerate() {
            let name = name.as_ref();
            if row[..i].iter().any(|(other, _)| other.as_ref() == name) {
                return Err(TableError::DuplicateColumn(name.to_string()));
            }
            if let Some(existing) = self.columns.get(name) {
                if existing.kind() != value.kind() {
                    return Err(TableError::KindMismatch {
                        column: name.to_string(),
                        expected: existing.kind(),
                        found: value.kind(),
                    });
                }
            }
        }

        for (name, value) in row {
            let row_count = self.row_count;
            let column = self.column_entry(name.as_ref(), value.kind(), row_count);
            column.push(value);
        }
        self.row_count += 1;
        self.pad_columns_to_row_count();
        Ok(())
    }

    fn column_entry(&mut self, name: &str, kind: ColumnKind, row_count: usize) -> &mut TypedColumn {
        if !self.columns.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.columns
            .entry(name.to_string())
            .or_insert_with(|| TypedColumn::padded(kind, row_count))
    }

    /// Pad all columns to the current row count with default values.
    fn pad_columns_to_row_count(&mut self) {
        for col in self.columns.values_mut() {
            col.pad_to(self.row_count);
        }
    }
}

/// Collection of tables, keyed by tracing target.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub tables: HashMap<String, DynamicTable>,
}

thread_local! {
    static RECORDER: RefCell<Recorder> = RefCell::default();
}

// === TRACING CAPTURE ===

/// Visitor that extracts event fields into table columns.
struct ColumnVisitor<'a> {
    table: &'a mut DynamicTable,
    /// Current row count, used to pre-pad new columns
    row_count: usize,
}

impl ColumnVisitor<'_> {
    fn record_value(&mut self, field: &Field, value: Value) {
        let column = self
            .table
            .column_entry(field.name(), value.kind(), self.row_count);
        // A field that changes type between events keeps its first type.
        if column.kind() == value.kind() && column.len() == self.row_count {
            column.push(value);
        }
    }
}

impl Visit for ColumnVisitor<'_> {
    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, Value::U64(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, Value::I64(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record_value(field, Value::F64(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, Value::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, Value::Str(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_str(field, &format!("{:?}", value));
    }
}

/// Tracing subscriber that collects events into column-oriented tables,
/// one table per event target, in a thread-local [`Recorder`].
pub struct DataFrameSubscriber;

impl Subscriber for DataFrameSubscriber {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        // Only info-level and above events, no spans
        metadata.is_event() && *metadata.level() <= tracing::Level::INFO
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let target = event.metadata().target().to_string();

        RECORDER.with(|r| {
            let mut recorder = r.borrow_mut();
            let table = recorder.tables.entry(target).or_default();

            table.pad_columns_to_row_count();
            let row_count = table.row_count;
            event.record(&mut ColumnVisitor { table, row_count });
            table.row_count += 1;
            table.pad_columns_to_row_count();
        });
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

/// Drain all recorded data from the thread-local recorder.
pub fn drain() -> Recorder {
    RECORDER.with(|r| std::mem::take(&mut *r.borrow_mut()))
}

/// Clear all recorded data without returning it.
pub fn clear() {
    RECORDER.with(|r| *r.borrow_mut() = Recorder::default());
}

// === POLARS INTEGRATION ===

use polars::prelude::{Column, CsvWriter, ParquetWriter, SerWriter};

fn io_error(error: std::io::Error) -> PolarsError {
    PolarsError::IO {
        error: error.into(),
        msg: None,
    }
}

impl DynamicTable {
    /// Convert this table to a polars DataFrame, keeping column order.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let columns: Vec<Column> = self
            .order
            .iter()
            .filter_map(|name| self.columns.get(name).map(|col| (name, col)))
            .map(|(name, col)| match col {
                TypedColumn::U64(v) => Column::new(name.into(), v),
                TypedColumn::I64(v) => Column::new(name.into(), v),
                TypedColumn::F64(v) => Column::new(name.into(), v),
                TypedColumn::Bool(v) => Column::new(name.into(), v),
                TypedColumn::Str(v) => Column::new(name.into(), v),
            })
            .collect();

        DataFrame::new(columns)
    }

    /// Write this table as CSV with a header row.
    pub fn write_csv(&self, path: &Path) -> PolarsResult<()> {
        let mut df = self.to_dataframe()?;
        write_csv(&mut df, path)
    }
}

impl Recorder {
    /// Convert all tables to polars DataFrames.
    pub fn to_dataframes(&self) -> HashMap<String, DataFrame> {
        self.tables
            .iter()
            .filter_map(|(name, table)| table.to_dataframe().ok().map(|df| (name.clone(), df)))
            .collect()
    }
}

pub fn write_csv(df: &mut DataFrame, path: &Path) -> PolarsResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    let file = std::fs::File::create(path).map_err(io_error)?;
    CsvWriter::new(file).include_header(true).finish(df)
}

/// Save DataFrames as parquet files in the given directory.
/// Each table becomes `{dir}/{name}.parquet`.
pub fn save_parquet(dfs: &mut HashMap<String, DataFrame>, dir: &Path) -> PolarsResult<()> {
    std::fs::create_dir_all(dir).map_err(io_error)?;
    for (name, df) in dfs.iter_mut() {
        let path = dir.join(format!("{}.parquet", name));
        let file = std::fs::File::create(&path).map_err(io_error)?;
        ParquetWriter::new(file).finish(df)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_row_pads_missing_and_new_columns() {
        let mut table = DynamicTable::default();
        table
            .push_row([("tick", Value::U64(1)), ("price", Value::F64(10.0))])
            .unwrap();
        table
            .push_row([("tick", Value::U64(2)), ("qty", Value::F64(5.0))])
            .unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_names(), &["tick", "price", "qty"]);
        assert_eq!(table.u64_column("tick").unwrap(), &[1, 2]);
        assert_eq!(table.f64_column("price").unwrap(), &[10.0, 0.0]);
        assert_eq!(table.f64_column("qty").unwrap(), &[0.0, 5.0]);
    }

    #[test]
    fn test_rejected_row_leaves_table_untouched() {
        let mut table = DynamicTable::default();
        table.push_row([("rate", Value::F64(0.5))]).unwrap();
        let before = table.clone();

        let err = table
            .push_row([("step", Value::U64(1)), ("rate", Value::Bool(true))])
            .unwrap_err();

        assert_eq!(
            err,
            TableError::KindMismatch {
                column: "rate".to_string(),
                expected: ColumnKind::F64,
                found: ColumnKind::Bool,
            }
        );
        assert_eq!(table, before);

        let err = table
            .push_row([("rate", Value::F64(0.1)), ("rate", Value::F64(0.2))])
            .unwrap_err();
        assert_eq!(err, TableError::DuplicateColumn("rate".to_string()));
        assert_eq!(table, before);
    }

    #[test]
    fn test_row_returns_values_in_column_order() {
        let mut table = DynamicTable::default();
        table
            .push_row([("step", Value::from(0u64)), ("flag", Value::from(true))])
            .unwrap();
        let row = table.row(0).unwrap();
        assert_eq!(row, vec![("step", Value::U64(0)), ("flag", Value::Bool(true))]);
        assert!(table.row(1).is_none());
    }

    #[test]
    fn test_tracing_integration() {
        use tracing::subscriber::with_default;

        clear();

        with_default(DataFrameSubscriber, || {
            tracing::info!(target: "test_events", tick = 1u64, value = 10.5f64, name = "first");
            tracing::info!(target: "test_events", tick = 2u64, value = 20.5f64, name = "second");
            tracing::info!(target: "test_events", tick = 3u64, value = 30.5f64);
            tracing::debug!(target: "test_events", tick = 4u64);
        });

        let recorder = drain();
        let table = &recorder.tables["test_events"];
        assert_eq!(table.row_count(), 3, "debug events are not recorded");
        assert_eq!(table.u64_column("tick").unwrap(), &[1, 2, 3]);
        assert_eq!(table.f64_column("value").unwrap(), &[10.5, 20.5, 30.5]);

        if let Some(TypedColumn::Str(names)) = table.column("name") {
            assert_eq!(names, &["first", "second", ""]);
        } else {
            panic!("name should be Str column");
        }

        assert!(drain().tables.is_empty(), "drain empties the recorder");
    }

    #[test]
    fn test_value_serializes_untagged() {
        let values = vec![Value::F64(0.25), Value::Bool(true), Value::U64(3)];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, "[0.25,true,3]");
        let back: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn test_write_csv_includes_header() {
        let mut table = DynamicTable::default();
        table
            .push_row([("step", Value::U64(0)), ("rate", Value::F64(0.5))])
            .unwrap();
        table
            .push_row([("step", Value::U64(1)), ("rate", Value::F64(0.75))])
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.csv");
        table.write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("step,rate"));
        assert_eq!(lines.count(), 2);
    }
}
