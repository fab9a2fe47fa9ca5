use std::collections::HashSet;

/// Column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    /// Absolute instant, second precision, persisted as UTC
    Timestamp,
}

/// Column definition
#[derive(Debug, Clone)]
pub struct Column {
    pub name: &'static str,
    pub col_type: ColumnType,
    pub nullable: bool,
}

impl Column {
    /// Create an optional (nullable) column
    pub const fn new(name: &'static str, col_type: ColumnType) -> Self {
        Self {
            name,
            col_type,
            nullable: true,
        }
    }

    /// Create a required (non-nullable) column
    pub const fn required(name: &'static str, col_type: ColumnType) -> Self {
        Self {
            name,
            col_type,
            nullable: false,
        }
    }
}

/// Reference from a fact or dimension column to another table.
///
/// Used for table selection and indexing only; the writers never emit
/// constraints, since each dataset is replaced independently.
#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub columns: &'static [&'static str],
    pub references_table: &'static str,
}

impl ForeignKey {
    pub const fn new(columns: &'static [&'static str], references_table: &'static str) -> Self {
        Self {
            columns,
            references_table,
        }
    }
}

/// Table schema definition
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [Column],
    /// Natural (or surrogate) key; at most one row per key value
    pub primary_key: &'static [&'static str],
    /// Columns rows are grouped by on disk, outermost first
    pub partition_by: &'static [&'static str],
    pub foreign_keys: &'static [ForeignKey],
}

impl TableSchema {
    /// Get all tables this table depends on (FK parents)
    pub fn dependencies(&self) -> HashSet<&'static str> {
        self.foreign_keys
            .iter()
            .map(|fk| fk.references_table)
            .collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn is_partition_column(&self, name: &str) -> bool {
        self.partition_by.contains(&name)
    }

    /// Columns stored inside data files, i.e. everything but the partition keys
    pub fn data_columns(&self) -> impl Iterator<Item = (usize, &'static Column)> + '_ {
        self.columns
            .iter()
            .enumerate()
            .filter(move |(_, c)| !self.is_partition_column(c.name))
    }
}
