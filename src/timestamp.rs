//! Timestamp discovery and normalization.
//!
//! A table's time axis comes from, in order of preference, a column whose
//! name contains `timestamp`, a date column joined with a time column, a
//! date column on its own, or a time column holding full date-times. Every parsed value becomes a zone-aware instant;
//! values without zone information are taken as UTC.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::table::RawTable;

/// Zone-aware instant attached to every processed row.
pub type Timestamp = DateTime<FixedOffset>;

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y/%m/%d %H:%M:%S%.f%z",
];

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.fZ",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%d.%m.%Y %H:%M:%S%.f",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Parses one timestamp string. Zone-less values are tagged as UTC.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(raw, fmt) {
            return Some(ts);
        }
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(assume_utc(naive));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0).map(assume_utc);
        }
    }
    None
}

fn assume_utc(naive: NaiveDateTime) -> Timestamp {
    Utc.from_utc_datetime(&naive).fixed_offset()
}

/// Where a table's timestamps were taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampSource {
    Column(String),
    DateAndTime { date: String, time: String },
    DateOnly(String),
}

/// Sorted, de-duplicated time axis of a table.
///
/// `rows[k]` is the source row that produced `timestamps[k]`.
#[derive(Debug, Clone)]
pub struct TimeIndex {
    pub source: TimestampSource,
    pub timestamps: Vec<Timestamp>,
    pub rows: Vec<usize>,
    /// Rows dropped because their timestamp did not parse.
    pub unparsed: usize,
    /// Rows dropped because an earlier row had the same instant.
    pub duplicates: usize,
}

impl TimeIndex {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

fn candidate_sources(headers: &[String]) -> Vec<TimestampSource> {
    let lower: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
    let mut sources = Vec::new();

    if let Some(idx) = lower.iter().position(|h| h.contains("timestamp")) {
        sources.push(TimestampSource::Column(headers[idx].clone()));
    }

    let date = lower
        .iter()
        .position(|h| h.contains("date") && !h.contains("timestamp"));
    let is_time = |h: &String| {
        h.contains("time") && !h.contains("date") && !h.contains("timestamp") && !h.contains("zone")
    };
    let time = lower
        .iter()
        .position(|h| is_time(h) && h.contains("local"))
        .or_else(|| lower.iter().position(is_time));

    if let Some(date) = date {
        if let Some(time) = time {
            sources.push(TimestampSource::DateAndTime {
                date: headers[date].clone(),
                time: headers[time].clone(),
            });
        }
        sources.push(TimestampSource::DateOnly(headers[date].clone()));
    }
    // exports such as Open-Meteo put full date-times in a column named `time`
    if let Some(time) = time {
        sources.push(TimestampSource::Column(headers[time].clone()));
    }
    sources
}

fn parse_source(table: &RawTable, source: &TimestampSource) -> Vec<Option<Timestamp>> {
    let cells = |name: &str| table.column(name).unwrap_or(&[]);
    match source {
        TimestampSource::Column(name) | TimestampSource::DateOnly(name) => {
            cells(name).iter().map(|c| parse_timestamp(c)).collect()
        }
        TimestampSource::DateAndTime { date, time } => cells(date)
            .iter()
            .zip(cells(time))
            .map(|(d, t)| parse_timestamp(&format!("{} {}", d.trim(), t.trim())))
            .collect(),
    }
}

/// Locates and parses the time axis of `table`.
///
/// The first candidate source that yields at least one valid timestamp wins.
/// Unparseable rows are dropped, the rest are sorted ascending and rows that
/// repeat an earlier instant are dropped, keeping the first occurrence.
///
/// # Errors
///
/// [`Error::MissingTimestamp`] when no candidate source produces a timestamp.
#[tracing::instrument(skip(table), fields(rows = table.len()))]
pub fn normalize_timestamps(table: &RawTable, label: &'static str) -> Result<TimeIndex> {
    for source in candidate_sources(table.headers()) {
        let parsed = parse_source(table, &source);
        let mut pairs: Vec<(Timestamp, usize)> = parsed
            .iter()
            .enumerate()
            .filter_map(|(row, ts)| ts.map(|ts| (ts, row)))
            .collect();

        if pairs.is_empty() {
            debug!(?source, "Timestamp source produced no valid values");
            continue;
        }

        let unparsed = table.len() - pairs.len();
        pairs.sort_by_key(|(ts, _)| *ts);
        let before = pairs.len();
        pairs.dedup_by_key(|(ts, _)| *ts);
        let duplicates = before - pairs.len();

        if unparsed > 0 || duplicates > 0 {
            info!(label, unparsed, duplicates, "Dropped rows while normalizing timestamps");
        }
        debug!(label, ?source, rows = pairs.len(), "Timestamps normalized");

        let (timestamps, rows) = pairs.into_iter().unzip();
        return Ok(TimeIndex {
            source,
            timestamps,
            rows,
            unparsed,
            duplicates,
        });
    }

    Err(Error::MissingTimestamp(label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        let columns = (0..headers.len())
            .map(|c| rows.iter().map(|r| r[c].to_string()).collect())
            .collect();
        RawTable::from_columns(headers.iter().map(|h| h.to_string()).collect(), columns)
    }

    #[test]
    fn test_parse_naive_is_utc() {
        let ts = parse_timestamp("2024-03-01 12:30:00").unwrap();
        assert_eq!(ts.offset().local_minus_utc(), 0);
        assert_eq!(ts.hour(), 12);
    }

    #[test]
    fn test_parse_keeps_existing_offset() {
        let ts = parse_timestamp("2024-03-01T12:30:00+05:30").unwrap();
        assert_eq!(ts.offset().local_minus_utc(), 5 * 3600 + 30 * 60);

        let ts = parse_timestamp("2024-03-01 12:30:00-0700").unwrap();
        assert_eq!(ts.offset().local_minus_utc(), -7 * 3600);
    }

    #[test]
    fn test_parse_various_layouts() {
        for raw in [
            "2024/03/01 12:30:00",
            "03/01/2024 12:30",
            "2024-03-01T12:30:00.250",
            "2024-03-01T12:30:00Z",
            "01.03.2024 12:30:00",
        ] {
            let ts = parse_timestamp(raw).unwrap_or_else(|| panic!("failed on {raw}"));
            assert_eq!(ts.minute(), 30, "{raw}");
        }
        let date_only = parse_timestamp("2024-03-01").unwrap();
        assert_eq!(date_only.hour(), 0);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("2024-13-45 99:00:00").is_none());
    }

    #[test]
    fn test_prefers_timestamp_column() {
        let t = table(
            &["date", "timestamp"],
            &[&["2020-01-01", "2024-01-01 00:00:00"]],
        );
        let index = normalize_timestamps(&t, "test").unwrap();
        assert_eq!(index.source, TimestampSource::Column("timestamp".into()));
    }

    #[test]
    fn test_combines_date_and_time_columns() {
        let t = table(
            &["dateLocal", "timeLocal", "timezoneOffset"],
            &[
                &["2022/04/12", "09:46:01", "0"],
                &["2022/04/12", "09:47:01", "0"],
            ],
        );
        let index = normalize_timestamps(&t, "test").unwrap();

        assert_eq!(
            index.source,
            TimestampSource::DateAndTime {
                date: "dateLocal".into(),
                time: "timeLocal".into()
            }
        );
        assert_eq!(index.timestamps[1].minute(), 47);
    }

    #[test]
    fn test_falls_back_to_date_only() {
        let t = table(&["date", "value"], &[&["2024-01-02", "1"]]);
        let index = normalize_timestamps(&t, "test").unwrap();
        assert_eq!(index.source, TimestampSource::DateOnly("date".into()));
    }

    #[test]
    fn test_lone_time_column_with_full_datetimes() {
        let t = table(
            &["time", "temperature_2m"],
            &[&["2024-01-15T08:00", "5.0"], &["2024-01-15T09:00", "6.0"]],
        );
        let index = normalize_timestamps(&t, "weather").unwrap();
        assert_eq!(index.source, TimestampSource::Column("time".into()));
        assert_eq!(index.timestamps[1].hour(), 9);
    }

    #[test]
    fn test_lone_time_of_day_column_is_not_enough() {
        let t = table(&["time", "v"], &[&["08:00:00", "1"]]);
        let err = normalize_timestamps(&t, "weather").unwrap_err();
        assert!(matches!(err, Error::MissingTimestamp("weather")));
    }

    #[test]
    fn test_missing_timestamp() {
        let t = table(&["a", "b"], &[&["1", "2"]]);
        let err = normalize_timestamps(&t, "weather").unwrap_err();
        assert!(matches!(err, Error::MissingTimestamp("weather")));
    }

    #[test]
    fn test_unparseable_column_falls_through() {
        let t = table(&["timestamp", "date"], &[&["garbage", "2024-01-02"]]);
        let index = normalize_timestamps(&t, "test").unwrap();
        assert_eq!(index.source, TimestampSource::DateOnly("date".into()));
    }

    #[test]
    fn test_sorts_drops_and_dedupes() {
        let t = table(
            &["timestamp", "v"],
            &[
                &["2024-01-01 00:02:00", "a"],
                &["bad", "b"],
                &["2024-01-01 00:00:00", "c"],
                &["2024-01-01 00:02:00", "d"],
                &["2024-01-01 00:01:00", "e"],
            ],
        );
        let index = normalize_timestamps(&t, "test").unwrap();

        assert_eq!(index.rows, vec![2, 4, 0]);
        assert_eq!(index.unparsed, 1);
        assert_eq!(index.duplicates, 1);
        assert!(index.timestamps.windows(2).all(|w| w[0] < w[1]));
    }
}
