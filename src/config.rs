use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::parser::SchemaPolicy;
use crate::pipeline::{ActionFilter, ActivityOptions};

pub const CONFIG_FILE: &str = "pipeline.toml";

/// Storage backend for the output tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Hive-partitioned parquet directories
    #[default]
    Parquet,
    /// One SQLite database with a table per dataset
    Sqlite,
}

/// Run configuration, read from TOML and then overridden from the command line
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    /// Relative to `input_root`
    pub song_glob: String,
    /// Relative to `input_root`
    pub log_glob: String,
    pub timezone: Tz,
    pub schema_policy: SchemaPolicy,
    pub format: Format,
    /// Database file name under `output_root` for the sqlite format
    pub sqlite_file: String,
    /// Page actions that count as song plays; empty keeps every event
    pub songplay_pages: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("data"),
            output_root: PathBuf::from("output"),
            song_glob: "song_data/*/*/*/*.json".to_string(),
            log_glob: "log_data/*/*/*.json".to_string(),
            timezone: chrono_tz::America::New_York,
            schema_policy: SchemaPolicy::Abort,
            format: Format::Parquet,
            sqlite_file: "sparkify.db".to_string(),
            songplay_pages: vec!["NextSong".to_string()],
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(PipelineError::config)
    }

    /// Load from `path`, or from the per-user config directory if a file
    /// exists there, or fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => path,
                None => {
                    debug!("no config file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        debug!(path = %path.display(), "loading config");
        let text = fs::read_to_string(&path).map_err(|e| {
            PipelineError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.output_root.join(&self.sqlite_file)
    }

    pub fn action_filter(&self) -> ActionFilter {
        ActionFilter::pages(self.songplay_pages.iter().cloned())
    }

    pub fn activity_options(&self) -> ActivityOptions {
        ActivityOptions {
            zone: self.timezone,
            filter: self.action_filter(),
            policy: self.schema_policy,
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "songplay-lake").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Parse an IANA zone name such as `America/New_York`
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| PipelineError::config(format!("unknown time zone {:?}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.timezone, chrono_tz::America::New_York);
        assert_eq!(config.format, Format::Parquet);
        assert_eq!(config.action_filter(), ActionFilter::song_plays());
        assert_eq!(config.sqlite_path(), PathBuf::from("output/sparkify.db"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            input_root = "/data/udacity"
            timezone = "UTC"
            schema_policy = "skip"
            format = "sqlite"
            songplay_pages = []
            "#,
        )
        .unwrap();

        assert_eq!(config.input_root, PathBuf::from("/data/udacity"));
        assert_eq!(config.timezone, chrono_tz::UTC);
        assert_eq!(config.schema_policy, SchemaPolicy::Skip);
        assert_eq!(config.format, Format::Sqlite);
        assert!(config.action_filter().is_unfiltered());
        assert_eq!(config.song_glob, "song_data/*/*/*/*.json");
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for text in [
            "timezone = \"Mars/Olympus\"",
            "format = \"csv\"",
            "unknown_key = 1",
        ] {
            assert!(
                matches!(PipelineConfig::from_toml(text), Err(PipelineError::Config { .. })),
                "{}",
                text
            );
        }
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "output_root = \"lake\"\n").unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.output_root, PathBuf::from("lake"));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            PipelineConfig::load(Some(&missing)),
            Err(PipelineError::Config { .. })
        ));
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("Europe/Berlin").unwrap(), chrono_tz::Europe::Berlin);
        assert!(parse_timezone("Nowhere").is_err());
    }
}
