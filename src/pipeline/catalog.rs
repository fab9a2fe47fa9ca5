//! Songs and artists dimensions from song metadata records

use anyhow::Result;
use tracing::info;

use super::dedup::dedup_by_key;
use crate::parser::SongRecord;
use crate::schema::{TableSchema, ARTISTS, SONGS};
use crate::writer::{required, CellValue, Row, TableRow};

#[derive(Debug, Clone, PartialEq)]
pub struct SongRow {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub year: i64,
    pub duration: f64,
}

impl From<&SongRecord> for SongRow {
    fn from(record: &SongRecord) -> Self {
        Self {
            song_id: record.song_id.clone(),
            title: record.title.clone(),
            artist_id: record.artist_id.clone(),
            year: record.year,
            duration: record.duration,
        }
    }
}

impl TableRow for SongRow {
    fn schema() -> &'static TableSchema {
        &SONGS
    }

    fn to_row(&self) -> Row {
        Row::new(vec![
            CellValue::text(&self.song_id),
            CellValue::text(&self.title),
            CellValue::text(&self.artist_id),
            CellValue::Integer(self.year),
            CellValue::Real(self.duration),
        ])
    }

    fn from_row(row: &Row) -> Result<Self> {
        let text = |col: &str| -> Result<String> {
            Ok(required(row, &SONGS, col)?.to_string())
        };
        Ok(Self {
            song_id: text("song_id")?,
            title: text("title")?,
            artist_id: text("artist_id")?,
            year: required(row, &SONGS, "year")?
                .as_i64()
                .ok_or_else(|| anyhow::anyhow!("songs.year is not an integer"))?,
            duration: required(row, &SONGS, "duration")?
                .as_f64()
                .ok_or_else(|| anyhow::anyhow!("songs.duration is not a number"))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistRow {
    pub artist_id: String,
    pub artist_name: String,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
}

impl From<&SongRecord> for ArtistRow {
    fn from(record: &SongRecord) -> Self {
        Self {
            artist_id: record.artist_id.clone(),
            artist_name: record.artist_name.clone(),
            artist_location: record.artist_location.clone(),
            artist_latitude: record.artist_latitude,
            artist_longitude: record.artist_longitude,
        }
    }
}

impl TableRow for ArtistRow {
    fn schema() -> &'static TableSchema {
        &ARTISTS
    }

    fn to_row(&self) -> Row {
        Row::new(vec![
            CellValue::text(&self.artist_id),
            CellValue::text(&self.artist_name),
            CellValue::opt_text(self.artist_location.as_deref()),
            CellValue::opt_real(self.artist_latitude),
            CellValue::opt_real(self.artist_longitude),
        ])
    }

    fn from_row(row: &Row) -> Result<Self> {
        let cell = |col: &str| row.get(&ARTISTS, col).unwrap_or(&CellValue::Null);
        Ok(Self {
            artist_id: required(row, &ARTISTS, "artist_id")?.to_string(),
            artist_name: required(row, &ARTISTS, "artist_name")?.to_string(),
            artist_location: cell("artist_location").as_str().map(str::to_string),
            artist_latitude: cell("artist_latitude").as_f64(),
            artist_longitude: cell("artist_longitude").as_f64(),
        })
    }
}

/// The deduplicated song catalog
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub songs: Vec<SongRow>,
    pub artists: Vec<ArtistRow>,
}

/// Project song records onto the songs and artists dimensions.
///
/// A `song_id` or `artist_id` seen more than once keeps its first record.
pub fn extract_catalog(records: &[SongRecord]) -> Catalog {
    let songs = dedup_by_key(records.iter().map(SongRow::from), |s| s.song_id.clone());
    let artists = dedup_by_key(records.iter().map(ArtistRow::from), |a| a.artist_id.clone());

    info!(
        records = records.len(),
        songs = songs.len(),
        artists = artists.len(),
        "extracted catalog"
    );

    Catalog { songs, artists }
}
