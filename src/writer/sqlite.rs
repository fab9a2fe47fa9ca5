use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Null, Value};
use rusqlite::Connection;
use std::path::Path;

use super::schema_gen::{generate_create_table, generate_indexes};
use super::{CellValue, Dataset, DatasetReader, DatasetWriter, Row};
use crate::schema::{ColumnType, TableSchema};

const BATCH_SIZE: usize = 1000;

/// Writes every dataset as one table of a single SQLite database.
///
/// Partitioning has no physical meaning here; partition keys become indexes.
pub struct SqliteWriter {
    conn: Connection,
}

impl SqliteWriter {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database {:?}", db_path))?;

        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;",
        )?;

        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Ok(Self { conn })
    }
}

impl DatasetWriter for SqliteWriter {
    /// Drop, recreate and fill the table inside one transaction
    fn write(&mut self, dataset: &Dataset) -> Result<u64> {
        dataset.validate()?;
        let schema = dataset.schema;

        let tx = self.conn.transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS \"{}\"", schema.name), [])
            .with_context(|| format!("Failed to drop table: {}", schema.name))?;
        tx.execute(&generate_create_table(schema), [])
            .with_context(|| format!("Failed to create table: {}", schema.name))?;
        for index_sql in generate_indexes(schema) {
            tx.execute(&index_sql, [])
                .with_context(|| format!("Failed to create index for: {}", schema.name))?;
        }

        let columns: Vec<String> = schema.columns.iter().map(|c| format!("\"{}\"", c.name)).collect();
        let placeholders: Vec<&str> = columns.iter().map(|_| "?").collect();
        let insert_sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            schema.name,
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut count: u64 = 0;
        for batch in dataset.rows.chunks(BATCH_SIZE) {
            insert_batch(&tx, &insert_sql, batch)
                .with_context(|| format!("Failed to insert into {}", schema.name))?;
            count += batch.len() as u64;
        }

        tx.commit()?;
        Ok(count)
    }
}

impl DatasetReader for SqliteWriter {
    fn read(&self, schema: &'static TableSchema) -> Result<Dataset> {
        let columns: Vec<String> = schema.columns.iter().map(|c| format!("\"{}\"", c.name)).collect();
        let sql = format!(
            "SELECT {} FROM \"{}\" ORDER BY rowid",
            columns.join(", "),
            schema.name
        );

        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("Dataset {} not found", schema.name))?;
        let mut rows = Vec::new();
        let mut query = stmt.query([])?;
        while let Some(row) = query.next()? {
            let mut values = Vec::with_capacity(schema.columns.len());
            for (idx, col) in schema.columns.iter().enumerate() {
                let raw: Value = row.get(idx)?;
                values.push(
                    from_sql(raw, col.col_type)
                        .with_context(|| format!("Bad value in {}.{}", schema.name, col.name))?,
                );
            }
            rows.push(Row::new(values));
        }

        Ok(Dataset { schema, rows })
    }
}

fn bind_to(value: &CellValue, idx: usize, stmt: &mut rusqlite::Statement) -> rusqlite::Result<()> {
    match value {
        CellValue::Null => stmt.raw_bind_parameter(idx, Null)?,
        CellValue::Integer(i) => stmt.raw_bind_parameter(idx, i)?,
        CellValue::Real(f) => stmt.raw_bind_parameter(idx, f)?,
        CellValue::Text(s) => stmt.raw_bind_parameter(idx, s.as_str())?,
        CellValue::Timestamp(t) => {
            stmt.raw_bind_parameter(idx, t.to_rfc3339_opts(SecondsFormat::Secs, true))?
        }
    }
    Ok(())
}

fn from_sql(raw: Value, col_type: ColumnType) -> Result<CellValue> {
    let value = match (raw, col_type) {
        (Value::Null, _) => CellValue::Null,
        (Value::Integer(i), ColumnType::Integer) => CellValue::Integer(i),
        (Value::Real(f), ColumnType::Real) => CellValue::Real(f),
        (Value::Integer(i), ColumnType::Real) => CellValue::Real(i as f64),
        (Value::Text(s), ColumnType::Text) => CellValue::Text(s),
        (Value::Text(s), ColumnType::Timestamp) => CellValue::Timestamp(
            DateTime::parse_from_rfc3339(&s)
                .with_context(|| format!("bad rfc3339: {}", s))?
                .with_timezone(&Utc),
        ),
        (other, col_type) => anyhow::bail!("{:?} does not fit a {:?} column", other, col_type),
    };
    Ok(value)
}

/// Insert a batch of rows into the database
fn insert_batch(tx: &rusqlite::Transaction, sql: &str, batch: &[Row]) -> Result<()> {
    let mut stmt = tx.prepare_cached(sql)?;

    for row in batch {
        for (idx, value) in row.values.iter().enumerate() {
            bind_to(value, idx + 1, &mut stmt)?;
        }
        stmt.raw_execute()?;
    }

    Ok(())
}
