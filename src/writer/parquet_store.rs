//! Partitioned Parquet storage.
//!
//! Each dataset lives in `<root>/<table>.parquet/`, one file per partition
//! directory. Partition columns are encoded in the path only. A write stages
//! the full dataset in a sibling directory and swaps it in, so readers never
//! observe a half-written table.

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, ArrayRef, Float64Array, Int64Array, StringArray, TimestampSecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::partition::{group_rows, parse_segment};
use super::{CellValue, Dataset, DatasetReader, DatasetWriter, Row};
use crate::schema::{Column, ColumnType, TableSchema};

const PART_FILE: &str = "part-00000.parquet";
const UTC: &str = "UTC";

pub struct ParquetWriter {
    root: PathBuf,
}

impl ParquetWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding a table's partitions
    pub fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(format!("{}.parquet", table))
    }

    fn staging_dir(&self, table: &str) -> PathBuf {
        self.root.join(format!(".{}.parquet.staging", table))
    }

    fn retired_dir(&self, table: &str) -> PathBuf {
        self.root.join(format!(".{}.parquet.old", table))
    }

    /// Replace the live table directory with the staged one
    fn swap_in(&self, table: &str, staging: &Path) -> Result<()> {
        let live = self.table_dir(table);
        let retired = self.retired_dir(table);

        if retired.exists() {
            fs::remove_dir_all(&retired)
                .with_context(|| format!("Failed to remove {:?}", retired))?;
        }

        let had_previous = live.exists();
        if had_previous {
            fs::rename(&live, &retired)
                .with_context(|| format!("Failed to retire {:?}", live))?;
        }

        if let Err(e) = fs::rename(staging, &live) {
            let err = anyhow::Error::new(e)
                .context(format!("Failed to move {:?} into place", staging));
            if had_previous {
                return Err(restore_previous(table, &retired, &live, err));
            }
            return Err(err);
        }

        if had_previous {
            fs::remove_dir_all(&retired)
                .with_context(|| format!("Failed to remove {:?}", retired))?;
        }
        Ok(())
    }
}

/// Move a retired table back to its live path after a failed swap.
///
/// Returns `err`, extended with the restore failure if the previous table
/// could not be put back.
fn restore_previous(table: &str, retired: &Path, live: &Path, err: anyhow::Error) -> anyhow::Error {
    match fs::rename(retired, live) {
        Ok(()) => err,
        Err(restore) => {
            warn!(
                table,
                retired = %retired.display(),
                error = %restore,
                "failed to restore previous table"
            );
            err.context(format!("Previous table left at {:?}: {}", retired, restore))
        }
    }
}

impl DatasetWriter for ParquetWriter {
    fn write(&mut self, dataset: &Dataset) -> Result<u64> {
        dataset.validate()?;

        let table = dataset.name();
        let staging = self.staging_dir(table);
        if staging.exists() {
            fs::remove_dir_all(&staging)
                .with_context(|| format!("Failed to clear stale staging dir {:?}", staging))?;
        }
        fs::create_dir_all(&staging)
            .with_context(|| format!("Failed to create {:?}", staging))?;

        let arrow_schema = arrow_schema(dataset.schema);
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(Default::default()))
            .build();

        let mut count: u64 = 0;
        for (partition, rows) in group_rows(dataset) {
            let dir = staging.join(&partition);
            fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))?;

            let batch = rows_to_batch(dataset.schema, arrow_schema.clone(), &rows)?;
            let path = dir.join(PART_FILE);
            let file = File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;

            let mut writer = ArrowWriter::try_new(file, arrow_schema.clone(), Some(props.clone()))
                .context("Failed to create Parquet writer")?;
            writer.write(&batch).context("Failed to write batch")?;
            writer.close().context("Failed to close Parquet writer")?;

            debug!(table, partition = %partition.display(), rows = rows.len(), "wrote partition");
            count += rows.len() as u64;
        }

        self.swap_in(table, &staging)?;
        Ok(count)
    }
}

impl DatasetReader for ParquetWriter {
    fn read(&self, schema: &'static TableSchema) -> Result<Dataset> {
        let dir = self.table_dir(schema.name);
        if !dir.is_dir() {
            bail!("Dataset {} not found at {:?}", schema.name, dir);
        }

        let pattern = format!(
            "{}/**/*.parquet",
            glob::Pattern::escape(&dir.to_string_lossy())
        );
        let mut files: Vec<PathBuf> = glob::glob(&pattern)
            .context("Invalid dataset glob")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to list dataset files")?;
        files.sort();

        let mut rows = Vec::new();
        for file in files {
            let relative = file
                .parent()
                .and_then(|p| p.strip_prefix(&dir).ok())
                .unwrap_or_else(|| Path::new(""));
            let partition_values = partition_values(schema, relative)?;
            read_file(schema, &file, &partition_values, &mut rows)?;
        }

        Ok(Dataset { schema, rows })
    }
}

fn arrow_type(col_type: ColumnType) -> DataType {
    match col_type {
        ColumnType::Integer => DataType::Int64,
        ColumnType::Real => DataType::Float64,
        ColumnType::Text => DataType::Utf8,
        ColumnType::Timestamp => DataType::Timestamp(TimeUnit::Second, Some(UTC.into())),
    }
}

/// Arrow schema of the data files: every column except the partition keys
fn arrow_schema(schema: &TableSchema) -> Arc<Schema> {
    let fields: Vec<Field> = schema
        .data_columns()
        .map(|(_, col)| Field::new(col.name, arrow_type(col.col_type), col.nullable))
        .collect();
    Arc::new(Schema::new(fields))
}

fn column_array(col: &Column, idx: usize, rows: &[&Row]) -> ArrayRef {
    match col.col_type {
        ColumnType::Integer => {
            let array: Int64Array = rows.iter().map(|r| r.values[idx].as_i64()).collect();
            Arc::new(array)
        }
        ColumnType::Real => {
            let array: Float64Array = rows.iter().map(|r| r.values[idx].as_f64()).collect();
            Arc::new(array)
        }
        ColumnType::Text => {
            let array: StringArray = rows.iter().map(|r| r.values[idx].as_str()).collect();
            Arc::new(array)
        }
        ColumnType::Timestamp => {
            let array: TimestampSecondArray = rows
                .iter()
                .map(|r| r.values[idx].as_timestamp().map(|t| t.timestamp()))
                .collect();
            Arc::new(array.with_timezone(UTC))
        }
    }
}

fn rows_to_batch(schema: &TableSchema, arrow_schema: Arc<Schema>, rows: &[&Row]) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = schema
        .data_columns()
        .map(|(idx, col)| column_array(col, idx, rows))
        .collect();

    RecordBatch::try_new(arrow_schema, columns)
        .with_context(|| format!("Failed to build record batch for {}", schema.name))
}

/// Partition column values encoded in a file's relative directory
fn partition_values(schema: &TableSchema, relative: &Path) -> Result<HashMap<String, CellValue>> {
    let mut values = HashMap::new();
    for component in relative.components() {
        let segment = component.as_os_str().to_string_lossy();
        let column = segment.split('=').next().unwrap_or_default();
        let col = schema
            .columns
            .iter()
            .find(|c| c.name == column && schema.is_partition_column(c.name))
            .with_context(|| format!("Unexpected partition segment {:?} in {}", segment, schema.name))?;
        let (name, value) = parse_segment(&segment, col.col_type)?;
        values.insert(name, value);
    }
    Ok(values)
}

fn cell_at(array: &ArrayRef, col: &Column, i: usize) -> Result<CellValue> {
    if array.is_null(i) {
        return Ok(CellValue::Null);
    }

    let mismatch = || format!("Column {} has unexpected type {:?}", col.name, array.data_type());
    let value = match col.col_type {
        ColumnType::Integer => {
            let a = array.as_any().downcast_ref::<Int64Array>().with_context(mismatch)?;
            CellValue::Integer(a.value(i))
        }
        ColumnType::Real => {
            let a = array.as_any().downcast_ref::<Float64Array>().with_context(mismatch)?;
            CellValue::Real(a.value(i))
        }
        ColumnType::Text => {
            let a = array.as_any().downcast_ref::<StringArray>().with_context(mismatch)?;
            CellValue::text(a.value(i))
        }
        ColumnType::Timestamp => {
            let a = array
                .as_any()
                .downcast_ref::<TimestampSecondArray>()
                .with_context(mismatch)?;
            let secs = a.value(i);
            let ts = DateTime::from_timestamp(secs, 0)
                .with_context(|| format!("Timestamp out of range in {}: {}", col.name, secs))?;
            CellValue::Timestamp(ts)
        }
    };
    Ok(value)
}

fn read_file(
    schema: &TableSchema,
    path: &Path,
    partition_values: &HashMap<String, CellValue>,
    rows: &mut Vec<Row>,
) -> Result<()> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("Failed to read Parquet metadata from {:?}", path))?
        .build()
        .context("Failed to build Parquet reader")?;

    for batch in reader {
        let batch = batch.with_context(|| format!("Failed to read batch from {:?}", path))?;

        let mut arrays = Vec::with_capacity(schema.columns.len());
        for col in schema.columns {
            if schema.is_partition_column(col.name) {
                arrays.push(None);
            } else {
                let array = batch
                    .column_by_name(col.name)
                    .with_context(|| format!("{:?} is missing column {}", path, col.name))?;
                arrays.push(Some(array.clone()));
            }
        }

        for i in 0..batch.num_rows() {
            let mut values = Vec::with_capacity(schema.columns.len());
            for (col, array) in schema.columns.iter().zip(&arrays) {
                let value = match array {
                    Some(array) => cell_at(array, col, i)?,
                    None => partition_values
                        .get(col.name)
                        .cloned()
                        .unwrap_or(CellValue::Null),
                };
                values.push(value);
            }
            rows.push(Row::new(values));
        }
    }

    Ok(())
}
