//! Dataset persistence.
//!
//! The pipeline hands each finished table to a [`DatasetWriter`] as a
//! [`Dataset`]: its static schema plus rows of typed cells. Backends decide the
//! physical layout; the schema's `partition_by` keys decide the logical one.

pub mod memory;
pub mod parquet_store;
pub mod partition;
pub mod schema_gen;
pub mod sqlite;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::schema::{ColumnType, TableSchema};

pub use memory::MemoryWriter;
pub use parquet_store::ParquetWriter;
pub use sqlite::SqliteWriter;

/// A single typed cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn opt_text(value: Option<&str>) -> Self {
        value.map(CellValue::text).unwrap_or(CellValue::Null)
    }

    pub fn opt_real(value: Option<f64>) -> Self {
        value.map(CellValue::Real).unwrap_or(CellValue::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Real(f) => Some(*f),
            CellValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            CellValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Whether this value can be stored in a column of `col_type`
    pub fn fits(&self, col_type: ColumnType) -> bool {
        matches!(
            (self, col_type),
            (CellValue::Null, _)
                | (CellValue::Integer(_), ColumnType::Integer)
                | (CellValue::Real(_), ColumnType::Real)
                | (CellValue::Text(_), ColumnType::Text)
                | (CellValue::Timestamp(_), ColumnType::Timestamp)
        )
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "null"),
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Real(r) => write!(f, "{}", r),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

/// One row, cells in schema column order
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<CellValue>,
}

impl Row {
    pub fn new(values: Vec<CellValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, schema: &TableSchema, column: &str) -> Option<&CellValue> {
        schema.column_index(column).and_then(|i| self.values.get(i))
    }
}

/// A typed record that maps onto a table schema
pub trait TableRow: Sized {
    fn schema() -> &'static TableSchema;
    fn to_row(&self) -> Row;
    fn from_row(row: &Row) -> Result<Self>;
}

/// A complete table ready to hand to a writer
#[derive(Debug, Clone)]
pub struct Dataset {
    pub schema: &'static TableSchema,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn from_records<T: TableRow>(records: &[T]) -> Self {
        Self {
            schema: T::schema(),
            rows: records.iter().map(TableRow::to_row).collect(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.schema.name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Check every row against the schema's arity, types and nullability
    pub fn validate(&self) -> Result<()> {
        let columns = self.schema.columns;
        for (idx, row) in self.rows.iter().enumerate() {
            if row.values.len() != columns.len() {
                anyhow::bail!(
                    "{} row {}: expected {} values, got {}",
                    self.name(),
                    idx,
                    columns.len(),
                    row.values.len()
                );
            }
            for (col, value) in columns.iter().zip(&row.values) {
                if value.is_null() && !col.nullable {
                    anyhow::bail!("{} row {}: {} must not be null", self.name(), idx, col.name);
                }
                if !value.fits(col.col_type) {
                    anyhow::bail!(
                        "{} row {}: {} expects {:?}, got {:?}",
                        self.name(),
                        idx,
                        col.name,
                        col.col_type,
                        value
                    );
                }
            }
        }
        Ok(())
    }

    pub fn to_records<T: TableRow>(&self) -> Result<Vec<T>> {
        self.rows.iter().map(T::from_row).collect()
    }
}

/// Persists datasets with full-overwrite semantics.
///
/// Returns the number of rows written. A failed write must leave whatever
/// was previously stored for that dataset untouched.
pub trait DatasetWriter {
    fn write(&mut self, dataset: &Dataset) -> Result<u64>;

    /// Whether this writer should receive the given table at all
    fn wants(&self, _schema: &TableSchema) -> bool {
        true
    }
}

/// Reads a previously persisted dataset back into rows
pub trait DatasetReader {
    fn read(&self, schema: &'static TableSchema) -> Result<Dataset>;
}

impl<W: DatasetWriter + ?Sized> DatasetWriter for &mut W {
    fn write(&mut self, dataset: &Dataset) -> Result<u64> {
        (**self).write(dataset)
    }

    fn wants(&self, schema: &TableSchema) -> bool {
        (**self).wants(schema)
    }
}

impl<W: DatasetWriter + ?Sized> DatasetWriter for Box<W> {
    fn write(&mut self, dataset: &Dataset) -> Result<u64> {
        (**self).write(dataset)
    }

    fn wants(&self, schema: &TableSchema) -> bool {
        (**self).wants(schema)
    }
}

/// Pull a required column out of a row, with the table and column in the error
pub(crate) fn required<'a>(row: &'a Row, schema: &TableSchema, column: &str) -> Result<&'a CellValue> {
    match row.get(schema, column) {
        Some(CellValue::Null) | None => {
            anyhow::bail!("{}: missing value for {}", schema.name, column)
        }
        Some(value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ARTISTS;

    #[test]
    fn test_validate_rejects_null_in_required_column() {
        let dataset = Dataset {
            schema: &ARTISTS,
            rows: vec![Row::new(vec![
                CellValue::Null,
                CellValue::text("name"),
                CellValue::Null,
                CellValue::Null,
                CellValue::Null,
            ])],
        };
        let err = dataset.validate().unwrap_err();
        assert!(err.to_string().contains("artist_id must not be null"));
    }

    #[test]
    fn test_validate_rejects_wrong_type() {
        let dataset = Dataset {
            schema: &ARTISTS,
            rows: vec![Row::new(vec![
                CellValue::text("AR1"),
                CellValue::text("name"),
                CellValue::Null,
                CellValue::text("north"),
                CellValue::Null,
            ])],
        };
        assert!(dataset.validate().is_err());
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(CellValue::Integer(7).to_string(), "7");
        assert_eq!(CellValue::Null.to_string(), "null");
        let ts = DateTime::from_timestamp(0, 0).unwrap();
        assert_eq!(CellValue::Timestamp(ts).to_string(), "1970-01-01T00:00:00+00:00");
    }
}
