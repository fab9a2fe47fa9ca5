//! Hive-style partition layout: `<column>=<value>` directory segments.
//!
//! Values are percent-escaped so that any text (including `/` or `=`) maps to
//! a single path segment and parses back unchanged. Null partition values use
//! the Hive default-partition marker.

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{CellValue, Dataset, Row};
use crate::schema::{ColumnType, TableSchema};

pub const NULL_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

fn needs_escape(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            '"' | '#' | '%' | '\'' | '*' | '/' | ':' | '=' | '?' | '\\' | '{' | '}' | '[' | ']' | '^'
                | '<' | '>' | '|'
        )
}

/// Percent-escape a partition value for use as a path segment
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if needs_escape(c) {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Reverse of [`escape_value`]
pub fn unescape_value(segment: &str) -> Result<String> {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = segment
                .get(i + 1..i + 3)
                .with_context(|| format!("Truncated escape in partition segment: {}", segment))?;
            let byte = u8::from_str_radix(hex, 16)
                .with_context(|| format!("Bad escape in partition segment: {}", segment))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).context("Partition segment is not valid UTF-8")
}

/// Render `column=value` for one partition column
pub fn segment(column: &str, value: &CellValue) -> String {
    let rendered = match value {
        CellValue::Null => NULL_PARTITION.to_string(),
        CellValue::Timestamp(t) => escape_value(&t.timestamp().to_string()),
        other => escape_value(&other.to_string()),
    };
    format!("{}={}", column, rendered)
}

/// Parse `column=value` back into a typed cell
pub fn parse_segment(segment: &str, col_type: ColumnType) -> Result<(String, CellValue)> {
    let (column, raw) = segment
        .split_once('=')
        .with_context(|| format!("Not a partition segment: {}", segment))?;

    if raw == NULL_PARTITION {
        return Ok((column.to_string(), CellValue::Null));
    }

    let text = unescape_value(raw)?;
    let value = match col_type {
        ColumnType::Text => CellValue::Text(text),
        ColumnType::Integer => CellValue::Integer(
            text.parse()
                .with_context(|| format!("Bad integer partition value: {}", segment))?,
        ),
        ColumnType::Real => CellValue::Real(
            text.parse()
                .with_context(|| format!("Bad real partition value: {}", segment))?,
        ),
        ColumnType::Timestamp => {
            let secs: i64 = text
                .parse()
                .with_context(|| format!("Bad timestamp partition value: {}", segment))?;
            match DateTime::from_timestamp(secs, 0) {
                Some(t) => CellValue::Timestamp(t),
                None => bail!("Timestamp partition value out of range: {}", segment),
            }
        }
    };

    Ok((column.to_string(), value))
}

/// Relative directory for a partition, e.g. `year=2018/month=11`
pub fn partition_dir(schema: &TableSchema, row: &Row) -> PathBuf {
    schema
        .partition_by
        .iter()
        .map(|col| {
            let value = row.get(schema, col).unwrap_or(&CellValue::Null);
            segment(col, value)
        })
        .collect()
}

/// Group a dataset's rows by partition directory.
///
/// Groups iterate in path order and keep the dataset's row order inside each
/// group. An unpartitioned dataset yields a single group under the empty path,
/// even when it has no rows.
pub fn group_rows(dataset: &Dataset) -> BTreeMap<PathBuf, Vec<&Row>> {
    let mut groups: BTreeMap<PathBuf, Vec<&Row>> = BTreeMap::new();

    if dataset.schema.partition_by.is_empty() {
        groups.insert(PathBuf::new(), dataset.rows.iter().collect());
        return groups;
    }

    for row in &dataset.rows {
        groups
            .entry(partition_dir(dataset.schema, row))
            .or_default()
            .push(row);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ARTISTS, SONGS};

    fn song_row(song_id: &str, artist_id: &str, year: i64) -> Row {
        Row::new(vec![
            CellValue::text(song_id),
            CellValue::text("title"),
            CellValue::text(artist_id),
            CellValue::Integer(year),
            CellValue::Real(200.0),
        ])
    }

    #[test]
    fn test_escape_round_trip() {
        for value in ["ARJIE2Y1187B994AB7", "a/b=c", "100%", "Los Angeles, CA", "naïve"] {
            let escaped = escape_value(value);
            assert!(!escaped.contains('/'));
            assert_eq!(unescape_value(&escaped).unwrap(), value);
        }
        assert_eq!(escape_value("a/b"), "a%2Fb");
    }

    #[test]
    fn test_segment_parse() {
        let seg = segment("artist_id", &CellValue::text("AR/1"));
        assert_eq!(seg, "artist_id=AR%2F1");
        let (col, value) = parse_segment(&seg, ColumnType::Text).unwrap();
        assert_eq!(col, "artist_id");
        assert_eq!(value, CellValue::text("AR/1"));

        let (_, year) = parse_segment("year=2018", ColumnType::Integer).unwrap();
        assert_eq!(year, CellValue::Integer(2018));

        let (_, null) = parse_segment(&segment("year", &CellValue::Null), ColumnType::Integer).unwrap();
        assert_eq!(null, CellValue::Null);

        assert!(parse_segment("year=abc", ColumnType::Integer).is_err());
        assert!(parse_segment("no-equals", ColumnType::Text).is_err());
    }

    #[test]
    fn test_group_rows_by_partition() {
        let dataset = Dataset {
            schema: &SONGS,
            rows: vec![
                song_row("S2", "AR2", 2000),
                song_row("S1", "AR1", 0),
                song_row("S3", "AR2", 2000),
            ],
        };
        let groups = group_rows(&dataset);
        let keys: Vec<_> = groups.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                PathBuf::from("year=0/artist_id=AR1"),
                PathBuf::from("year=2000/artist_id=AR2"),
            ]
        );
        let ids: Vec<_> = groups[&PathBuf::from("year=2000/artist_id=AR2")]
            .iter()
            .map(|r| r.values[0].to_string())
            .collect();
        assert_eq!(ids, vec!["S2", "S3"]);
    }

    #[test]
    fn test_unpartitioned_single_group() {
        let dataset = Dataset {
            schema: &ARTISTS,
            rows: vec![],
        };
        let groups = group_rows(&dataset);
        assert_eq!(groups.len(), 1);
        assert!(groups[&PathBuf::new()].is_empty());
    }
}
