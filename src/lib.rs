pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod parser;
pub mod pipeline;
pub mod schema;
pub mod writer;

pub use cli::{Cli, Commands};
pub use config::{Format, PipelineConfig};
pub use error::{PipelineError, Result};
pub use pipeline::{process_activity, process_catalog, run_pipeline, ActivityOptions, RunSummary};
