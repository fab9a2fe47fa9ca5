use crate::schema::{DependencyResolver, TableSchema};
use crate::writer::{Dataset, DatasetWriter};
use anyhow::{anyhow, bail, Result};
use tracing::info;

/// Resolves which tables to persist based on include/exclude filters
pub fn resolve_tables(
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
) -> Result<Vec<&'static TableSchema>> {
    let resolver = DependencyResolver::new();

    match (include, exclude) {
        (Some(_), Some(_)) => {
            bail!("Cannot use both --include and --exclude at the same time");
        }
        (Some(include_list), None) => {
            let refs: Vec<&str> = include_list.iter().map(|s| s.as_str()).collect();
            let tables = resolver.resolve_includes(&refs).map_err(|e| anyhow!(e))?;
            info!(requested = ?refs, tables = ?names(&tables), "including tables");
            Ok(tables)
        }
        (None, Some(exclude_list)) => {
            let refs: Vec<&str> = exclude_list.iter().map(|s| s.as_str()).collect();
            let tables = resolver.resolve_excludes(&refs).map_err(|e| anyhow!(e))?;
            info!(excluded = ?refs, tables = ?names(&tables), "excluding tables");
            Ok(tables)
        }
        (None, None) => Ok(resolver.all_tables_ordered()),
    }
}

fn names(tables: &[&'static TableSchema]) -> Vec<&'static str> {
    tables.iter().map(|t| t.name).collect()
}

/// Writer wrapper that only accepts the selected tables
pub struct SelectedTables<W> {
    inner: W,
    tables: Vec<&'static TableSchema>,
}

impl<W> SelectedTables<W> {
    pub fn new(inner: W, tables: Vec<&'static TableSchema>) -> Self {
        Self { inner, tables }
    }
}

impl<W: DatasetWriter> DatasetWriter for SelectedTables<W> {
    fn write(&mut self, dataset: &Dataset) -> Result<u64> {
        self.inner.write(dataset)
    }

    fn wants(&self, schema: &TableSchema) -> bool {
        self.tables.iter().any(|t| t.name == schema.name) && self.inner.wants(schema)
    }
}
