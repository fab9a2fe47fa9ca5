//! Star-schema build: extraction, derivation and resolution stages.
//!
//! Stages are pure functions over owned collections. The entry points at the
//! bottom of this module wire them to an injected [`RecordReader`] and
//! [`DatasetWriter`]; every dataset of a stage is computed before any of them
//! is written, so a failed read or a bad record never overwrites output.

pub mod activity;
pub mod catalog;
pub mod dedup;
pub mod songplays;
pub mod time;

use chrono_tz::Tz;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::parser::{LogEvent, RecordReader, SchemaPolicy, SongRecord};
use crate::schema::SONGS;
use crate::writer::{Dataset, DatasetReader, DatasetWriter};

pub use activity::{extract_activity, Activity, EnrichedEvent, UserRow};
pub use catalog::{extract_catalog, ArtistRow, Catalog, SongRow};
pub use songplays::{resolve_songplays, ActionFilter, SongplayIds, SongplayRow};
pub use time::{derive_time, TimeRow};

/// Knobs for the activity stage
#[derive(Debug, Clone)]
pub struct ActivityOptions {
    /// Reference zone for calendar fields
    pub zone: Tz,
    pub filter: ActionFilter,
    pub policy: SchemaPolicy,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            zone: chrono_tz::America::New_York,
            filter: ActionFilter::default(),
            policy: SchemaPolicy::default(),
        }
    }
}

impl Catalog {
    /// Artists before songs, matching the foreign key direction
    pub fn datasets(&self) -> Vec<Dataset> {
        vec![
            Dataset::from_records(&self.artists),
            Dataset::from_records(&self.songs),
        ]
    }
}

/// Output of the activity stage
#[derive(Debug, Clone, Default)]
pub struct ActivityTables {
    pub users: Vec<UserRow>,
    pub time: Vec<TimeRow>,
    pub songplays: Vec<SongplayRow>,
}

impl ActivityTables {
    pub fn datasets(&self) -> Vec<Dataset> {
        vec![
            Dataset::from_records(&self.users),
            Dataset::from_records(&self.time),
            Dataset::from_records(&self.songplays),
        ]
    }
}

/// Rows written per table, in write order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub tables: Vec<(&'static str, u64)>,
}

impl RunSummary {
    pub fn total(&self) -> u64 {
        self.tables.iter().map(|(_, rows)| rows).sum()
    }

}

pub fn build_catalog<R: RecordReader<SongRecord>>(reader: &R) -> Result<Catalog> {
    info!("reading song data");
    let records = reader.read_all()?;
    Ok(extract_catalog(&records))
}

pub fn build_activity<R: RecordReader<LogEvent>>(
    reader: &R,
    songs: &[SongRow],
    options: &ActivityOptions,
) -> Result<ActivityTables> {
    info!("reading log data");
    let events = reader.read_all()?;
    let activity = extract_activity(&events, options.zone, options.policy)?;
    let time = derive_time(&activity.events);
    let songplays = resolve_songplays(
        &activity.events,
        songs,
        &options.filter,
        &mut SongplayIds::new(),
    );
    Ok(ActivityTables {
        users: activity.users,
        time,
        songplays,
    })
}

/// Hand finished datasets to the writer in order, skipping tables it does not want.
///
/// Every wanted dataset is validated before the first write, so an invalid
/// table later in the list leaves all outputs untouched.
pub fn write_datasets<W: DatasetWriter>(writer: &mut W, datasets: &[Dataset]) -> Result<RunSummary> {
    let wanted: Vec<&Dataset> = datasets
        .iter()
        .filter(|dataset| {
            let wants = writer.wants(dataset.schema);
            if !wants {
                info!(table = dataset.name(), "skipping table");
            }
            wants
        })
        .collect();

    for dataset in &wanted {
        dataset
            .validate()
            .map_err(|e| PipelineError::write(dataset.name(), e))?;
    }

    let mut summary = RunSummary::default();
    for dataset in wanted {
        info!(table = dataset.name(), rows = dataset.len(), "writing table");
        let written = writer
            .write(dataset)
            .map_err(|e| PipelineError::write(dataset.name(), e))?;
        summary.tables.push((dataset.name(), written));
    }
    Ok(summary)
}

/// Build and persist the songs and artists tables.
///
/// Returns the catalog so a subsequent activity stage can resolve against it.
pub fn process_catalog<R, W>(reader: R, mut writer: W) -> Result<(Catalog, RunSummary)>
where
    R: RecordReader<SongRecord>,
    W: DatasetWriter,
{
    let catalog = build_catalog(&reader)?;
    let summary = write_datasets(&mut writer, &catalog.datasets())?;
    Ok((catalog, summary))
}

/// Build and persist the users, time and songplays tables
pub fn process_activity<R, W>(
    reader: R,
    mut writer: W,
    catalog_songs: &[SongRow],
    options: &ActivityOptions,
) -> Result<RunSummary>
where
    R: RecordReader<LogEvent>,
    W: DatasetWriter,
{
    let tables = build_activity(&reader, catalog_songs, options)?;
    write_datasets(&mut writer, &tables.datasets())
}

/// Full rebuild: both stages are computed and validated before anything is written
pub fn run_pipeline<S, L, W>(
    song_reader: S,
    log_reader: L,
    mut writer: W,
    options: &ActivityOptions,
) -> Result<RunSummary>
where
    S: RecordReader<SongRecord>,
    L: RecordReader<LogEvent>,
    W: DatasetWriter,
{
    let catalog = build_catalog(&song_reader)?;
    let activity = build_activity(&log_reader, &catalog.songs, options)?;

    let mut datasets = catalog.datasets();
    datasets.extend(activity.datasets());
    write_datasets(&mut writer, &datasets)
}

/// Load the songs table a previous catalog run persisted
pub fn load_catalog_songs<D: DatasetReader>(store: &D) -> Result<Vec<SongRow>> {
    let unavailable = |e: anyhow::Error| {
        PipelineError::source_unavailable("persisted songs dataset", format!("{:#}", e))
    };
    let songs = store.read(&SONGS).map_err(unavailable)?;
    let songs = songs.to_records::<SongRow>().map_err(unavailable)?;
    info!(songs = songs.len(), "loaded persisted catalog");
    Ok(songs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Level;
    use crate::schema::{ARTISTS, SONGPLAYS};
    use crate::writer::{CellValue, MemoryWriter, Row};

    fn song(song_id: &str, title: &str, artist_id: &str) -> SongRecord {
        SongRecord {
            song_id: song_id.to_string(),
            title: title.to_string(),
            artist_id: artist_id.to_string(),
            artist_name: format!("Artist {}", artist_id),
            artist_location: None,
            artist_latitude: None,
            artist_longitude: None,
            year: 2004,
            duration: 180.0,
        }
    }

    fn play(ts: i64, user_id: &str, title: Option<&str>, page: &str) -> LogEvent {
        LogEvent {
            ts,
            user_id: user_id.to_string(),
            first_name: Some("Lily".to_string()),
            last_name: Some("Koch".to_string()),
            gender: Some("F".to_string()),
            level: Level::Paid,
            session_id: 818,
            location: None,
            user_agent: None,
            song: title.map(str::to_string),
            page: page.to_string(),
        }
    }

    #[test]
    fn test_run_pipeline_writes_all_tables_in_order() {
        let songs = vec![song("S1", "Sehr kosmisch", "A1"), song("S2", "Other", "A2")];
        let logs = vec![
            play(1_541_121_934_796, "15", Some("Sehr kosmisch"), "NextSong"),
            play(1_541_121_944_796, "15", None, "Home"),
            play(1_541_121_954_796, "16", Some("Missing"), "NextSong"),
        ];
        let mut writer = MemoryWriter::new();
        let summary = run_pipeline(songs, logs, &mut writer, &ActivityOptions::default()).unwrap();

        assert_eq!(
            writer.write_order(),
            &["artists", "songs", "users", "time", "songplays"]
        );
        assert_eq!(
            summary.tables,
            vec![("artists", 2), ("songs", 2), ("users", 2), ("time", 3), ("songplays", 2)]
        );
        assert_eq!(summary.total(), 11);

        let plays: Vec<SongplayRow> = writer.dataset("songplays").unwrap().to_records().unwrap();
        assert_eq!(plays[0].song_id.as_deref(), Some("S1"));
        assert_eq!(plays[1].song_id, None);
    }

    #[test]
    fn test_failed_log_read_writes_nothing() {
        struct Broken;
        impl RecordReader<LogEvent> for Broken {
            fn read_all(&self) -> Result<Vec<LogEvent>> {
                Err(PipelineError::source_unavailable("log_data", "unreachable"))
            }
        }

        let mut writer = MemoryWriter::new();
        let err = run_pipeline(
            vec![song("S1", "T", "A1")],
            Broken,
            &mut writer,
            &ActivityOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
        assert!(writer.write_order().is_empty());
    }

    #[test]
    fn test_activity_stage_against_persisted_catalog() {
        let mut store = MemoryWriter::new();
        process_catalog(vec![song("S1", "Title", "A1")], &mut store).unwrap();

        let songs = load_catalog_songs(&store).unwrap();
        let logs = vec![play(1_541_121_934_796, "15", Some("Title"), "NextSong")];
        let summary =
            process_activity(logs, &mut store, &songs, &ActivityOptions::default()).unwrap();

        assert_eq!(summary.tables.len(), 3);
        let plays: Vec<SongplayRow> = store.dataset("songplays").unwrap().to_records().unwrap();
        assert_eq!(plays[0].artist_id.as_deref(), Some("A1"));
    }

    #[test]
    fn test_missing_catalog_is_source_unavailable() {
        let store = MemoryWriter::new();
        assert!(matches!(
            load_catalog_songs(&store),
            Err(PipelineError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_write_failure_names_dataset() {
        struct Failing;
        impl DatasetWriter for Failing {
            fn write(&mut self, _dataset: &Dataset) -> anyhow::Result<u64> {
                anyhow::bail!("disk full")
            }
        }

        let err = process_catalog(vec![song("S1", "T", "A1")], Failing).unwrap_err();
        match err {
            PipelineError::Write { dataset, .. } => assert_eq!(dataset, "artists"),
            other => panic!("expected write error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_later_dataset_writes_nothing() {
        let artists = Dataset {
            schema: &ARTISTS,
            rows: vec![Row::new(vec![
                CellValue::text("A1"),
                CellValue::text("Artist"),
                CellValue::Null,
                CellValue::Null,
                CellValue::Null,
            ])],
        };
        let songplays = Dataset {
            schema: &SONGPLAYS,
            rows: vec![Row::new(vec![CellValue::Integer(0)])],
        };

        let mut writer = MemoryWriter::new();
        let err = write_datasets(&mut writer, &[artists, songplays]).unwrap_err();

        match err {
            PipelineError::Write { dataset, .. } => assert_eq!(dataset, "songplays"),
            other => panic!("expected write error, got {:?}", other),
        }
        assert!(writer.write_order().is_empty());
    }

    #[test]
    fn test_unwanted_invalid_dataset_is_ignored() {
        let songplays = Dataset {
            schema: &SONGPLAYS,
            rows: vec![Row::new(vec![CellValue::Integer(0)])],
        };
        let mut writer = crate::filter::SelectedTables::new(MemoryWriter::new(), vec![&ARTISTS]);
        let summary = write_datasets(&mut writer, &[songplays]).unwrap();
        assert!(summary.tables.is_empty());
    }
}
