use anyhow::Result;
use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use tracing::info;

use super::activity::EnrichedEvent;
use super::dedup::dedup_by_key;
use crate::schema::{TableSchema, TIME};
use crate::writer::{required, CellValue, Row, TableRow};

/// Calendar breakdown of one start instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRow {
    pub start_time: DateTime<Utc>,
    pub hour: u32,
    pub day: u32,
    /// ISO-8601 week number
    pub week: u32,
    pub month: u32,
    pub year: i32,
    /// ISO weekday, Monday = 1
    pub weekday: u32,
}

impl TimeRow {
    pub fn from_local(start_time: DateTime<Utc>, local: &DateTime<Tz>) -> Self {
        Self {
            start_time,
            hour: local.hour(),
            day: local.day(),
            week: local.iso_week().week(),
            month: local.month(),
            year: local.year(),
            weekday: local.weekday().number_from_monday(),
        }
    }
}

impl TableRow for TimeRow {
    fn schema() -> &'static TableSchema {
        &TIME
    }

    fn to_row(&self) -> Row {
        Row::new(vec![
            CellValue::Timestamp(self.start_time),
            CellValue::Integer(self.hour.into()),
            CellValue::Integer(self.day.into()),
            CellValue::Integer(self.week.into()),
            CellValue::Integer(self.month.into()),
            CellValue::Integer(self.year.into()),
            CellValue::Integer(self.weekday.into()),
        ])
    }

    fn from_row(row: &Row) -> Result<Self> {
        let int = |col: &str| -> Result<i64> {
            required(row, &TIME, col)?
                .as_i64()
                .ok_or_else(|| anyhow::anyhow!("time.{} is not an integer", col))
        };
        let small = |col: &str| -> Result<u32> { Ok(u32::try_from(int(col)?)?) };
        Ok(Self {
            start_time: required(row, &TIME, "start_time")?
                .as_timestamp()
                .ok_or_else(|| anyhow::anyhow!("time.start_time is not a timestamp"))?,
            hour: small("hour")?,
            day: small("day")?,
            week: small("week")?,
            month: small("month")?,
            year: i32::try_from(int("year")?)?,
            weekday: small("weekday")?,
        })
    }
}

/// One row per distinct start instant, in first-seen order
pub fn derive_time(events: &[EnrichedEvent]) -> Vec<TimeRow> {
    let rows = dedup_by_key(
        events
            .iter()
            .map(|e| TimeRow::from_local(e.start_time, &e.local_start)),
        |row| row.start_time,
    );
    info!(events = events.len(), instants = rows.len(), "derived time dimension");
    rows
}
