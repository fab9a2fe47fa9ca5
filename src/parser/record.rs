use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use std::fmt;

/// One song metadata record from the song dataset
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SongRecord {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub artist_name: String,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
    /// 0 when unknown
    pub year: i64,
    /// Seconds
    pub duration: f64,
}

/// Subscription level of a user at the time of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Free,
    Paid,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Free => "free",
            Level::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Level::Free),
            "paid" => Some(Level::Paid),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user-activity event from the log dataset.
///
/// Logged-out and non-playback events carry null names and a null `song`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    /// Epoch milliseconds
    pub ts: i64,
    #[serde(deserialize_with = "string_or_integer")]
    pub user_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: Level,
    pub session_id: i64,
    pub location: Option<String>,
    pub user_agent: Option<String>,
    pub song: Option<String>,
    pub page: String,
}

/// Accept `"39"` and `39` alike for identifiers
fn string_or_integer<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Integer(i64),
    }

    match Raw::deserialize(deserializer) {
        Ok(Raw::Text(s)) => Ok(s),
        Ok(Raw::Integer(i)) => Ok(i.to_string()),
        Err(_) => Err(de::Error::custom("expected a string or integer identifier")),
    }
}

/// Parse one JSON line into a typed record
pub fn parse_record<T: DeserializeOwned>(line: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(line)
}
