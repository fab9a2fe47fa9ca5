use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{parse_timezone, Format, PipelineConfig};
use crate::error::Result;
use crate::parser::SchemaPolicy;

#[derive(Parser, Debug)]
#[command(name = "songplay-lake")]
#[command(version, about = "Build a songplay star schema from song metadata and activity logs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rebuild every table from song and log data
    Run {
        #[command(flatten)]
        shared: SharedArgs,

        #[command(flatten)]
        actions: ActionArgs,
    },

    /// Rebuild the songs and artists tables only
    Catalog {
        #[command(flatten)]
        shared: SharedArgs,
    },

    /// Rebuild users, time and songplays against the persisted songs table
    Activity {
        #[command(flatten)]
        shared: SharedArgs,

        #[command(flatten)]
        actions: ActionArgs,
    },

    /// List all available table names
    ListTables,
}

#[derive(Args, Debug, Default)]
pub struct SharedArgs {
    /// Config file (defaults to pipeline.toml in the user config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory containing song_data/ and log_data/
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Output directory for the tables
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<Format>,

    /// Reference time zone for calendar fields (IANA name)
    #[arg(short, long)]
    pub timezone: Option<String>,

    /// Only write these tables and the tables they reference (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub include: Option<Vec<String>>,

    /// Skip these tables and the tables referencing them (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub exclude: Option<Vec<String>>,

    /// Log and drop malformed records instead of aborting
    #[arg(long)]
    pub skip_invalid: bool,

    /// Build everything in memory without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args, Debug, Default)]
pub struct ActionArgs {
    /// Treat every event as a song play, whatever its page
    #[arg(long, conflicts_with = "page")]
    pub all_actions: bool,

    /// Page value that counts as a song play (repeatable)
    #[arg(long)]
    pub page: Vec<String>,
}

impl SharedArgs {
    /// Load the config file and apply flags on top of it
    pub fn config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::load(self.config.as_deref())?;
        if let Some(input) = &self.input {
            config.input_root = input.clone();
        }
        if let Some(output) = &self.output {
            config.output_root = output.clone();
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(zone) = &self.timezone {
            config.timezone = parse_timezone(zone)?;
        }
        if self.skip_invalid {
            config.schema_policy = SchemaPolicy::Skip;
        }
        Ok(config)
    }
}

impl ActionArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if self.all_actions {
            config.songplay_pages.clear();
        } else if !self.page.is_empty() {
            config.songplay_pages = self.page.clone();
        }
    }
}

impl Commands {
    pub fn verbose(&self) -> bool {
        match self {
            Commands::Run { shared, .. }
            | Commands::Catalog { shared }
            | Commands::Activity { shared, .. } => shared.verbose,
            Commands::ListTables => false,
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
