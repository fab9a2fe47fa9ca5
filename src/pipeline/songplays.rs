//! Songplays fact table: events resolved against the song catalog

use anyhow::Result;
use chrono::{DateTime, Datelike, Utc};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

use super::activity::EnrichedEvent;
use super::catalog::SongRow;
use crate::parser::Level;
use crate::schema::{TableSchema, SONGPLAYS};
use crate::writer::{required, CellValue, Row, TableRow};

/// Page value of an event that plays a track
pub const NEXT_SONG: &str = "NextSong";

/// Which `page` actions count as a song play.
///
/// An empty set accepts every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFilter {
    pages: BTreeSet<String>,
}

impl ActionFilter {
    /// Only `NextSong` events
    pub fn song_plays() -> Self {
        Self::pages([NEXT_SONG])
    }

    /// Every event, whatever its page
    pub fn all() -> Self {
        Self {
            pages: BTreeSet::new(),
        }
    }

    pub fn pages<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pages: pages.into_iter().map(Into::into).collect(),
        }
    }

    pub fn accepts(&self, event: &EnrichedEvent) -> bool {
        self.pages.is_empty() || self.pages.contains(&event.event.page)
    }

    pub fn is_unfiltered(&self) -> bool {
        self.pages.is_empty()
    }
}

impl Default for ActionFilter {
    fn default() -> Self {
        Self::song_plays()
    }
}

/// Surrogate id source for songplay rows
#[derive(Debug, Default)]
pub struct SongplayIds {
    next: i64,
}

impl SongplayIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> i64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongplayRow {
    pub songplay_id: i64,
    pub start_time: DateTime<Utc>,
    pub user_id: String,
    pub level: Level,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: i64,
    pub location: Option<String>,
    pub user_agent: Option<String>,
    pub year: i32,
    pub month: u32,
}

impl TableRow for SongplayRow {
    fn schema() -> &'static TableSchema {
        &SONGPLAYS
    }

    fn to_row(&self) -> Row {
        Row::new(vec![
            CellValue::Integer(self.songplay_id),
            CellValue::Timestamp(self.start_time),
            CellValue::text(&self.user_id),
            CellValue::text(self.level.as_str()),
            CellValue::opt_text(self.song_id.as_deref()),
            CellValue::opt_text(self.artist_id.as_deref()),
            CellValue::Integer(self.session_id),
            CellValue::opt_text(self.location.as_deref()),
            CellValue::opt_text(self.user_agent.as_deref()),
            CellValue::Integer(self.year.into()),
            CellValue::Integer(self.month.into()),
        ])
    }

    fn from_row(row: &Row) -> Result<Self> {
        let int = |col: &str| -> Result<i64> {
            required(row, &SONGPLAYS, col)?
                .as_i64()
                .ok_or_else(|| anyhow::anyhow!("songplays.{} is not an integer", col))
        };
        let optional = |col: &str| {
            row.get(&SONGPLAYS, col)
                .and_then(CellValue::as_str)
                .map(str::to_string)
        };
        let level = required(row, &SONGPLAYS, "level")?.to_string();

        Ok(Self {
            songplay_id: int("songplay_id")?,
            start_time: required(row, &SONGPLAYS, "start_time")?
                .as_timestamp()
                .ok_or_else(|| anyhow::anyhow!("songplays.start_time is not a timestamp"))?,
            user_id: required(row, &SONGPLAYS, "user_id")?.to_string(),
            level: Level::parse(&level)
                .ok_or_else(|| anyhow::anyhow!("songplays.level: unknown level {:?}", level))?,
            song_id: optional("song_id"),
            artist_id: optional("artist_id"),
            session_id: int("session_id")?,
            location: optional("location"),
            user_agent: optional("user_agent"),
            year: i32::try_from(int("year")?)?,
            month: u32::try_from(int("month")?)?,
        })
    }
}

/// Title -> first catalog song carrying that title
fn title_index(songs: &[SongRow]) -> HashMap<&str, &SongRow> {
    let mut index = HashMap::with_capacity(songs.len());
    for song in songs {
        index.entry(song.title.as_str()).or_insert(song);
    }
    index
}

/// Resolve every accepted event to at most one catalog song by exact title.
///
/// Each accepted event yields exactly one row. Events whose title is absent
/// or unknown keep null `song_id` and `artist_id`.
pub fn resolve_songplays(
    events: &[EnrichedEvent],
    songs: &[SongRow],
    filter: &ActionFilter,
    ids: &mut SongplayIds,
) -> Vec<SongplayRow> {
    let index = title_index(songs);
    let mut matched = 0usize;

    let rows: Vec<SongplayRow> = events
        .iter()
        .filter(|e| filter.accepts(e))
        .map(|e| {
            let song = e.event.song.as_deref().and_then(|t| index.get(t));
            if song.is_some() {
                matched += 1;
            }
            let event = &e.event;
            SongplayRow {
                songplay_id: ids.next_id(),
                start_time: e.start_time,
                user_id: event.user_id.clone(),
                level: event.level,
                song_id: song.map(|s| s.song_id.clone()),
                artist_id: song.map(|s| s.artist_id.clone()),
                session_id: event.session_id,
                location: event.location.clone(),
                user_agent: event.user_agent.clone(),
                year: e.local_start.year(),
                month: e.local_start.month(),
            }
        })
        .collect();

    debug!(titles = index.len(), "built title index");
    info!(
        events = events.len(),
        songplays = rows.len(),
        matched,
        unmatched = rows.len() - matched,
        "resolved songplays"
    );
    rows
}
