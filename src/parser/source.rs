use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::record::parse_record;
use crate::error::{PipelineError, Result};

/// What to do with a record that does not match its schema
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaPolicy {
    /// Fail the whole stage on the first bad record
    #[default]
    Abort,
    /// Log and drop bad records
    Skip,
}

/// Yields the full set of records of one source, in a stable order
pub trait RecordReader<T> {
    fn read_all(&self) -> Result<Vec<T>>;
}

impl<T: Clone> RecordReader<T> for Vec<T> {
    fn read_all(&self) -> Result<Vec<T>> {
        Ok(self.clone())
    }
}

impl<T, R: RecordReader<T> + ?Sized> RecordReader<T> for &R {
    fn read_all(&self) -> Result<Vec<T>> {
        (**self).read_all()
    }
}

/// Reads JSON Lines files matching a glob pattern under a root directory.
///
/// Files are visited in lexicographic path order and lines in file order;
/// that order is the "first seen" order every deduplication relies on.
pub struct JsonLinesReader<T> {
    root: PathBuf,
    pattern: String,
    policy: SchemaPolicy,
    _record: PhantomData<fn() -> T>,
}

impl<T> JsonLinesReader<T> {
    pub fn new(root: impl Into<PathBuf>, pattern: impl Into<String>, policy: SchemaPolicy) -> Self {
        Self {
            root: root.into(),
            pattern: pattern.into(),
            policy,
            _record: PhantomData,
        }
    }

    fn describe(&self) -> String {
        self.root.join(&self.pattern).display().to_string()
    }

    /// Resolve the pattern to a sorted list of files
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let full = format!(
            "{}/{}",
            glob::Pattern::escape(&self.root.to_string_lossy()),
            self.pattern
        );
        let entries = glob::glob(&full)
            .map_err(|e| PipelineError::source_unavailable(self.describe(), e))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| PipelineError::source_unavailable(self.describe(), e))?;
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(PipelineError::source_unavailable(
                self.describe(),
                "no files match the pattern",
            ));
        }
        Ok(files)
    }
}

impl<T: DeserializeOwned> JsonLinesReader<T> {
    fn read_file(&self, path: &Path, records: &mut Vec<T>) -> Result<usize> {
        let file = File::open(path)
            .map_err(|e| PipelineError::source_unavailable(path.display().to_string(), e))?;
        let reader = BufReader::new(file);
        let mut skipped = 0;

        for (idx, line) in reader.lines().enumerate() {
            let line =
                line.map_err(|e| PipelineError::source_unavailable(path.display().to_string(), e))?;
            if line.trim().is_empty() {
                continue;
            }

            match parse_record::<T>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    let violation = PipelineError::schema_violation(
                        format!("{}:{}", path.display(), idx + 1),
                        e,
                    );
                    match self.policy {
                        SchemaPolicy::Abort => return Err(violation),
                        SchemaPolicy::Skip => {
                            warn!("skipping record: {}", violation);
                            skipped += 1;
                        }
                    }
                }
            }
        }

        Ok(skipped)
    }
}

impl<T: DeserializeOwned> RecordReader<T> for JsonLinesReader<T> {
    fn read_all(&self) -> Result<Vec<T>> {
        let files = self.files()?;
        info!(source = %self.describe(), files = files.len(), "reading json");

        let mut records = Vec::new();
        let mut skipped = 0;
        for path in &files {
            debug!(path = %path.display(), "reading file");
            skipped += self.read_file(path, &mut records)?;
        }

        if skipped > 0 {
            warn!(source = %self.describe(), skipped, "dropped records that failed to parse");
        }
        info!(source = %self.describe(), records = records.len(), "read complete");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{LogEvent, SongRecord};
    use std::fs;
    use tempfile::TempDir;

    fn song_line(song_id: &str) -> String {
        format!(
            r#"{{"song_id":"{}","title":"T","artist_id":"A","artist_name":"N","artist_location":null,"artist_latitude":null,"artist_longitude":null,"year":2000,"duration":1.5}}"#,
            song_id
        )
    }

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_files_read_in_path_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "song_data/B/b.json", &song_line("S3"));
        write(dir.path(), "song_data/A/b.json", &song_line("S2"));
        write(
            dir.path(),
            "song_data/A/a.json",
            &format!("{}\n\n{}\n", song_line("S0"), song_line("S1")),
        );

        let reader: JsonLinesReader<SongRecord> =
            JsonLinesReader::new(dir.path(), "song_data/*/*.json", SchemaPolicy::Abort);
        let ids: Vec<_> = reader
            .read_all()
            .unwrap()
            .into_iter()
            .map(|s| s.song_id)
            .collect();
        assert_eq!(ids, vec!["S0", "S1", "S2", "S3"]);
    }

    #[test]
    fn test_no_matching_files_is_source_unavailable() {
        let dir = TempDir::new().unwrap();
        let reader: JsonLinesReader<SongRecord> =
            JsonLinesReader::new(dir.path(), "song_data/*/*.json", SchemaPolicy::Abort);
        assert!(matches!(
            reader.read_all(),
            Err(PipelineError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_invalid_pattern_is_source_unavailable() {
        let dir = TempDir::new().unwrap();
        let reader: JsonLinesReader<SongRecord> =
            JsonLinesReader::new(dir.path(), "song_data/[", SchemaPolicy::Abort);
        assert!(matches!(
            reader.read_all(),
            Err(PipelineError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_abort_policy_reports_line() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "log_data/events.json",
            "{\"ts\":1,\"userId\":\"1\",\"level\":\"free\",\"sessionId\":1,\"page\":\"Home\"}\nnot json\n",
        );
        let reader: JsonLinesReader<LogEvent> =
            JsonLinesReader::new(dir.path(), "log_data/*.json", SchemaPolicy::Abort);
        match reader.read_all() {
            Err(PipelineError::SchemaViolation { location, .. }) => {
                assert!(location.ends_with("events.json:2"), "{}", location);
            }
            other => panic!("expected schema violation, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_skip_policy_drops_bad_records() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "log_data/events.json",
            concat!(
                "{\"ts\":1,\"userId\":\"1\",\"level\":\"free\",\"sessionId\":1,\"page\":\"Home\"}\n",
                "{\"ts\":2,\"userId\":\"1\",\"level\":\"gold\",\"sessionId\":1,\"page\":\"Home\"}\n",
                "{\"ts\":3,\"userId\":\"2\",\"level\":\"paid\",\"sessionId\":2,\"page\":\"Home\"}\n",
            ),
        );
        let reader: JsonLinesReader<LogEvent> =
            JsonLinesReader::new(dir.path(), "log_data/*.json", SchemaPolicy::Skip);
        let events = reader.read_all().unwrap();
        assert_eq!(events.iter().map(|e| e.ts).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_vec_reader() {
        let records = vec![1, 2, 3];
        assert_eq!(records.read_all().unwrap(), vec![1, 2, 3]);
    }
}
