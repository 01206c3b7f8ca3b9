// src/models/record.rs
use anyhow::{bail, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two collection systems being matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Source {
    One,
    Two,
}

impl Source {
    pub fn suffix(&self) -> &'static str {
        match self {
            Source::One => "1",
            Source::Two => "2",
        }
    }

    /// Column name of `base` once tagged with this source, e.g. `lat` -> `lat1`.
    pub fn column(&self, base: &str) -> String {
        format!("{}{}", base, self.suffix())
    }
}

impl FromStr for Source {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1" => Ok(Source::One),
            "2" => Ok(Source::Two),
            other => bail!(
                "Need valid dataset identifier: got '{}', expected '1' or '2'",
                other
            ),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// A stored time value. Ingested columns may hold either representation until
/// the time normalizer converts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeValue {
    Epoch(i64),
    DateTime(NaiveDateTime),
}

impl TimeValue {
    /// Whole seconds since the Unix epoch. Epoch values are returned as stored,
    /// so an unnormalized millisecond column yields milliseconds.
    pub fn epoch_seconds(&self) -> i64 {
        match self {
            TimeValue::Epoch(secs) => *secs,
            TimeValue::DateTime(dt) => dt.and_utc().timestamp(),
        }
    }

    pub fn is_epoch(&self) -> bool {
        matches!(self, TimeValue::Epoch(_))
    }
}

/// The time-bearing fields a record can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeField {
    Timestamp,
    SessionStart,
    SessionEnd,
}

impl TimeField {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeField::Timestamp => "timestamp",
            TimeField::SessionStart => "session_start",
            TimeField::SessionEnd => "session_end",
        }
    }
}

/// A record is either an instantaneous detection or a complete session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordTime {
    Instant(TimeValue),
    Session { start: TimeValue, end: TimeValue },
}

impl RecordTime {
    /// Builds a record time from optional ingested columns. A timestamp must
    /// stand alone; session start and end must come together.
    pub fn from_parts(
        timestamp: Option<TimeValue>,
        session_start: Option<TimeValue>,
        session_end: Option<TimeValue>,
    ) -> Result<Self> {
        match (timestamp, session_start, session_end) {
            (Some(ts), None, None) => Ok(RecordTime::Instant(ts)),
            (None, Some(start), Some(end)) => Ok(RecordTime::Session { start, end }),
            (Some(_), _, _) => bail!("record carries both a timestamp and session times"),
            (None, Some(_), None) | (None, None, Some(_)) => {
                bail!("partial session interval: session_start and session_end must both be present")
            }
            (None, None, None) => bail!("record has neither a timestamp nor a session"),
        }
    }

    /// Time used for range joining: the instant if present, else the session start.
    pub fn primary(&self) -> &TimeValue {
        match self {
            RecordTime::Instant(ts) => ts,
            RecordTime::Session { start, .. } => start,
        }
    }

    pub fn field(&self, field: TimeField) -> Option<&TimeValue> {
        match (self, field) {
            (RecordTime::Instant(ts), TimeField::Timestamp) => Some(ts),
            (RecordTime::Session { start, .. }, TimeField::SessionStart) => Some(start),
            (RecordTime::Session { end, .. }, TimeField::SessionEnd) => Some(end),
            _ => None,
        }
    }

    pub fn field_mut(&mut self, field: TimeField) -> Option<&mut TimeValue> {
        match (self, field) {
            (RecordTime::Instant(ts), TimeField::Timestamp) => Some(ts),
            (RecordTime::Session { start, .. }, TimeField::SessionStart) => Some(start),
            (RecordTime::Session { end, .. }, TimeField::SessionEnd) => Some(end),
            _ => None,
        }
    }

    /// Session length in seconds, `None` for instantaneous detections.
    pub fn session_duration(&self) -> Option<i64> {
        match self {
            RecordTime::Instant(_) => None,
            RecordTime::Session { start, end } => Some(end.epoch_seconds() - start.epoch_seconds()),
        }
    }

    pub fn is_session(&self) -> bool {
        matches!(self, RecordTime::Session { .. })
    }

    /// True when every stored value is integer epoch seconds.
    pub fn is_epoch(&self) -> bool {
        match self {
            RecordTime::Instant(ts) => ts.is_epoch(),
            RecordTime::Session { start, end } => start.is_epoch() && end.is_epoch(),
        }
    }
}

/// One detection or session event from a single source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub element_id: String,
    pub time: RecordTime,
    pub lat: f64,
    pub lon: f64,
    pub boardings: Option<u32>,
    pub alightings: Option<u32>,
}

impl Record {
    pub fn new(element_id: impl Into<String>, time: RecordTime, lat: f64, lon: f64) -> Self {
        Self {
            element_id: element_id.into(),
            time,
            lat,
            lon,
            boardings: None,
            alightings: None,
        }
    }

    pub fn instant(element_id: impl Into<String>, timestamp: i64, lat: f64, lon: f64) -> Self {
        Self::new(element_id, RecordTime::Instant(TimeValue::Epoch(timestamp)), lat, lon)
    }

    pub fn session(
        element_id: impl Into<String>,
        session_start: i64,
        session_end: i64,
        lat: f64,
        lon: f64,
    ) -> Self {
        Self::new(
            element_id,
            RecordTime::Session {
                start: TimeValue::Epoch(session_start),
                end: TimeValue::Epoch(session_end),
            },
            lat,
            lon,
        )
    }

    pub fn with_counts(mut self, boardings: u32, alightings: u32) -> Self {
        self.boardings = Some(boardings);
        self.alightings = Some(alightings);
        self
    }
}

/// All records read from one source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub records: Vec<Record>,
}

impl Dataset {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_sessions(&self) -> bool {
        self.records.iter().any(|r| r.time.is_session())
    }

    /// Tags every record with its source ahead of joining.
    pub fn with_source(self, source: Source) -> SuffixedDataset {
        SuffixedDataset {
            source,
            records: self.records,
        }
    }
}

impl FromIterator<Record> for Dataset {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Records whose columns carry a source suffix (`element_id1`, `lat2`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct SuffixedDataset {
    pub source: Source,
    pub records: Vec<Record>,
}

impl SuffixedDataset {
    pub fn column(&self, base: &str) -> String {
        self.source.column(base)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
