use anyhow::{Context, Result};
use std::collections::BTreeMap;

use super::{Dataset, DatasetReader, DatasetWriter};
use crate::schema::TableSchema;

/// Keeps written datasets in memory; backs `--dry-run` and tests
#[derive(Debug, Default)]
pub struct MemoryWriter {
    datasets: BTreeMap<&'static str, Dataset>,
    /// Table names in the order they were written
    write_order: Vec<&'static str>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name)
    }

    pub fn write_order(&self) -> &[&'static str] {
        &self.write_order
    }
}

impl DatasetWriter for MemoryWriter {
    fn write(&mut self, dataset: &Dataset) -> Result<u64> {
        dataset.validate()?;
        self.datasets.insert(dataset.name(), dataset.clone());
        self.write_order.push(dataset.name());
        Ok(dataset.len() as u64)
    }
}

impl DatasetReader for MemoryWriter {
    fn read(&self, schema: &'static TableSchema) -> Result<Dataset> {
        self.datasets
            .get(schema.name)
            .cloned()
            .with_context(|| format!("Dataset {} has not been written", schema.name))
    }
}
