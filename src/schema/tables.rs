//! Star schema table definitions

use super::types::*;

// =============================================================================
// Dimension tables
// =============================================================================

pub static ARTISTS: TableSchema = TableSchema {
    name: "artists",
    columns: &[
        Column::required("artist_id", ColumnType::Text),
        Column::required("artist_name", ColumnType::Text),
        Column::new("artist_location", ColumnType::Text),
        Column::new("artist_latitude", ColumnType::Real),
        Column::new("artist_longitude", ColumnType::Real),
    ],
    primary_key: &["artist_id"],
    partition_by: &[],
    foreign_keys: &[],
};

pub static SONGS: TableSchema = TableSchema {
    name: "songs",
    columns: &[
        Column::required("song_id", ColumnType::Text),
        Column::required("title", ColumnType::Text),
        Column::required("artist_id", ColumnType::Text),
        Column::required("year", ColumnType::Integer),
        Column::required("duration", ColumnType::Real),
    ],
    primary_key: &["song_id"],
    partition_by: &["year", "artist_id"],
    foreign_keys: &[ForeignKey::new(&["artist_id"], "artists")],
};

pub static USERS: TableSchema = TableSchema {
    name: "users",
    columns: &[
        Column::required("user_id", ColumnType::Text),
        Column::new("first_name", ColumnType::Text),
        Column::new("last_name", ColumnType::Text),
        Column::new("gender", ColumnType::Text),
        Column::required("level", ColumnType::Text),
    ],
    primary_key: &["user_id", "level"],
    partition_by: &[],
    foreign_keys: &[],
};

pub static TIME: TableSchema = TableSchema {
    name: "time",
    columns: &[
        Column::required("start_time", ColumnType::Timestamp),
        Column::required("hour", ColumnType::Integer),
        Column::required("day", ColumnType::Integer),
        Column::required("week", ColumnType::Integer),
        Column::required("month", ColumnType::Integer),
        Column::required("year", ColumnType::Integer),
        Column::required("weekday", ColumnType::Integer),
    ],
    primary_key: &["start_time"],
    partition_by: &["year", "month"],
    foreign_keys: &[],
};

// =============================================================================
// Fact table
// =============================================================================

pub static SONGPLAYS: TableSchema = TableSchema {
    name: "songplays",
    columns: &[
        Column::required("songplay_id", ColumnType::Integer),
        Column::required("start_time", ColumnType::Timestamp),
        Column::required("user_id", ColumnType::Text),
        Column::required("level", ColumnType::Text),
        Column::new("song_id", ColumnType::Text),
        Column::new("artist_id", ColumnType::Text),
        Column::required("session_id", ColumnType::Integer),
        Column::new("location", ColumnType::Text),
        Column::new("user_agent", ColumnType::Text),
        Column::required("year", ColumnType::Integer),
        Column::required("month", ColumnType::Integer),
    ],
    primary_key: &["songplay_id"],
    partition_by: &["year", "month"],
    foreign_keys: &[
        ForeignKey::new(&["start_time"], "time"),
        ForeignKey::new(&["user_id", "level"], "users"),
        ForeignKey::new(&["song_id"], "songs"),
        ForeignKey::new(&["artist_id"], "artists"),
    ],
};

/// All table schemas in dependency order (parents before children)
pub static ALL_TABLES: &[&TableSchema] = &[&ARTISTS, &SONGS, &USERS, &TIME, &SONGPLAYS];

/// Get table schema by name
pub fn get_table(name: &str) -> Option<&'static TableSchema> {
    ALL_TABLES.iter().find(|t| t.name == name).copied()
}

/// Get all table names
pub fn table_names() -> Vec<&'static str> {
    ALL_TABLES.iter().map(|t| t.name).collect()
}
