use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Failures that abort a pipeline stage.
///
/// Unmatched song titles and duplicate keys are not errors: the first resolves
/// to a row with no catalog ids, the second is settled by first-seen-wins.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The reader could not reach its source (bad pattern, no files, I/O failure)
    #[error("source unavailable: {source_desc}: {reason}")]
    SourceUnavailable { source_desc: String, reason: String },

    /// A record failed to parse against its expected schema
    #[error("schema violation at {location}: {reason}")]
    SchemaViolation { location: String, reason: String },

    /// The writer failed to persist a dataset
    #[error("failed to write dataset {dataset}")]
    Write {
        dataset: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

impl PipelineError {
    pub fn source_unavailable(source_desc: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_desc: source_desc.into(),
            reason: reason.to_string(),
        }
    }

    pub fn write(dataset: &str, source: anyhow::Error) -> Self {
        Self::Write {
            dataset: dataset.to_string(),
            source: source.into(),
        }
    }

    pub fn schema_violation(location: impl Into<String>, reason: impl ToString) -> Self {
        Self::SchemaViolation {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub fn config(reason: impl ToString) -> Self {
        Self::Config {
            reason: reason.to_string(),
        }
    }
}
