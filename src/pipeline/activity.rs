//! Users dimension and the enriched event stream

use anyhow::Result as AnyResult;
use chrono::{DateTime, Duration, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use super::dedup::dedup_by_key;
use crate::error::{PipelineError, Result};
use crate::parser::{Level, LogEvent, SchemaPolicy};
use crate::schema::{TableSchema, USERS};
use crate::writer::{required, CellValue, Row, TableRow};

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub user_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: Level,
}

impl From<&LogEvent> for UserRow {
    fn from(event: &LogEvent) -> Self {
        Self {
            user_id: event.user_id.clone(),
            first_name: event.first_name.clone(),
            last_name: event.last_name.clone(),
            gender: event.gender.clone(),
            level: event.level,
        }
    }
}

impl TableRow for UserRow {
    fn schema() -> &'static TableSchema {
        &USERS
    }

    fn to_row(&self) -> Row {
        Row::new(vec![
            CellValue::text(&self.user_id),
            CellValue::opt_text(self.first_name.as_deref()),
            CellValue::opt_text(self.last_name.as_deref()),
            CellValue::opt_text(self.gender.as_deref()),
            CellValue::text(self.level.as_str()),
        ])
    }

    fn from_row(row: &Row) -> AnyResult<Self> {
        let optional = |col: &str| {
            row.get(&USERS, col)
                .and_then(CellValue::as_str)
                .map(str::to_string)
        };
        let level = required(row, &USERS, "level")?.to_string();
        Ok(Self {
            user_id: required(row, &USERS, "user_id")?.to_string(),
            first_name: optional("first_name"),
            last_name: optional("last_name"),
            gender: optional("gender"),
            level: Level::parse(&level)
                .ok_or_else(|| anyhow::anyhow!("users.level: unknown level {:?}", level))?,
        })
    }
}

/// A log event with its derived start instant
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedEvent {
    pub event: LogEvent,
    /// `ts` truncated to whole seconds
    pub start_time: DateTime<Utc>,
    /// `start_time` seen from the reference zone; calendar fields come from here
    pub local_start: DateTime<Tz>,
}

/// Convert epoch milliseconds to a whole-second instant and its projection into `zone`.
///
/// Returns `None` when the instant (or its local wall-clock time) is outside
/// the range chrono can represent.
pub fn start_time_from_ts(ts_ms: i64, zone: Tz) -> Option<(DateTime<Utc>, DateTime<Tz>)> {
    let start = DateTime::from_timestamp(ts_ms / 1000, 0)?;
    let offset = zone.offset_from_utc_datetime(&start.naive_utc()).fix();
    start
        .naive_utc()
        .checked_add_signed(Duration::seconds(offset.local_minus_utc().into()))?;
    Some((start, start.with_timezone(&zone)))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Activity {
    pub users: Vec<UserRow>,
    pub events: Vec<EnrichedEvent>,
}

/// Deduplicate users on `(user_id, level)` and attach a start instant to every event.
///
/// No event is filtered out here; the action filter runs at songplay resolution.
pub fn extract_activity(events: &[LogEvent], zone: Tz, policy: SchemaPolicy) -> Result<Activity> {
    let mut enriched = Vec::with_capacity(events.len());
    for (idx, event) in events.iter().enumerate() {
        match start_time_from_ts(event.ts, zone) {
            Some((start_time, local_start)) => enriched.push(EnrichedEvent {
                event: event.clone(),
                start_time,
                local_start,
            }),
            None => {
                let violation = PipelineError::schema_violation(
                    format!("log event #{}", idx + 1),
                    format!("ts {} is out of range", event.ts),
                );
                match policy {
                    SchemaPolicy::Abort => return Err(violation),
                    SchemaPolicy::Skip => warn!("skipping event: {}", violation),
                }
            }
        }
    }

    // Skipped events contribute no user
    let users = dedup_by_key(enriched.iter().map(|e| UserRow::from(&e.event)), |u| {
        (u.user_id.clone(), u.level)
    });

    info!(
        events = events.len(),
        enriched = enriched.len(),
        users = users.len(),
        zone = zone.name(),
        "extracted activity"
    );

    Ok(Activity {
        users,
        events: enriched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn event(ts: i64, user_id: &str, level: Level, first_name: &str) -> LogEvent {
        LogEvent {
            ts,
            user_id: user_id.to_string(),
            first_name: Some(first_name.to_string()),
            last_name: Some("Summers".to_string()),
            gender: Some("F".to_string()),
            level,
            session_id: 139,
            location: Some("Phoenix-Mesa-Scottsdale, AZ".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
            song: Some("You Gotta Be".to_string()),
            page: "NextSong".to_string(),
        }
    }

    #[test]
    fn test_start_time_in_new_york() {
        let (utc, local) = start_time_from_ts(1_541_121_934_796, chrono_tz::America::New_York).unwrap();
        assert_eq!(utc.timestamp(), 1_541_121_934);
        assert_eq!(local.year(), 2018);
        assert_eq!(local.month(), 11);
        assert_eq!(local.day(), 1);
        assert_eq!(local.hour(), 21);
        assert_eq!(local.weekday().number_from_monday(), 4);
    }

    #[test]
    fn test_start_time_in_utc() {
        let (_, local) = start_time_from_ts(1_541_121_934_796, chrono_tz::UTC).unwrap();
        assert_eq!(local.day(), 2);
        assert_eq!(local.hour(), 1);
        assert_eq!(local.weekday().number_from_monday(), 5);
    }

    #[test]
    fn test_millis_are_truncated() {
        let (a, _) = start_time_from_ts(1_000_999, chrono_tz::UTC).unwrap();
        let (b, _) = start_time_from_ts(1_000_000, chrono_tz::UTC).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_users_dedup_on_user_and_level() {
        let events = vec![
            event(1_000, "8", Level::Free, "Kaylee"),
            event(2_000, "8", Level::Free, "Kaylee (later)"),
            event(3_000, "8", Level::Paid, "Kaylee"),
            event(4_000, "10", Level::Free, "Sylvie"),
        ];
        let activity = extract_activity(&events, chrono_tz::UTC, SchemaPolicy::Abort).unwrap();

        let keys: Vec<_> = activity
            .users
            .iter()
            .map(|u| (u.user_id.as_str(), u.level))
            .collect();
        assert_eq!(keys, vec![("8", Level::Free), ("8", Level::Paid), ("10", Level::Free)]);
        assert_eq!(activity.users[0].first_name.as_deref(), Some("Kaylee"));
        assert_eq!(activity.events.len(), 4);
    }

    #[test]
    fn test_every_event_is_enriched() {
        let mut home = event(5_000, "8", Level::Free, "Kaylee");
        home.page = "Home".to_string();
        home.song = None;
        let activity = extract_activity(&[home.clone()], chrono_tz::UTC, SchemaPolicy::Abort).unwrap();
        assert_eq!(activity.events.len(), 1);
        assert_eq!(activity.events[0].event, home);
    }

    #[test]
    fn test_out_of_range_ts() {
        let events = vec![event(i64::MAX, "8", Level::Free, "K"), event(1_000, "9", Level::Free, "L")];

        match extract_activity(&events, chrono_tz::UTC, SchemaPolicy::Abort) {
            Err(PipelineError::SchemaViolation { location, .. }) => {
                assert_eq!(location, "log event #1")
            }
            other => panic!("expected schema violation, got {:?}", other),
        }

        let activity = extract_activity(&events, chrono_tz::UTC, SchemaPolicy::Skip).unwrap();
        assert_eq!(activity.events.len(), 1);
        assert_eq!(activity.events[0].event.user_id, "9");
        assert_eq!(activity.users.len(), 1);
        assert_eq!(activity.users[0].user_id, "9");
    }

    #[test]
    fn test_skipped_event_adds_no_user() {
        let events = vec![event(i64::MAX, "999", Level::Paid, "Gone")];
        let activity = extract_activity(&events, chrono_tz::UTC, SchemaPolicy::Skip).unwrap();
        assert!(activity.events.is_empty());
        assert!(activity.users.is_empty());
    }

    #[test]
    fn test_user_row_conversion() {
        let user = UserRow::from(&event(1_000, "8", Level::Paid, "Kaylee"));
        assert_eq!(UserRow::from_row(&user.to_row()).unwrap(), user);
    }
}
