// src/matching/time.rs
//! Converts time columns between integer epoch seconds and calendar datetimes.
//!
//! Normalization is best-effort per column: each recognized column that is
//! present is converted as a whole, and a column that cannot be converted is
//! left exactly as it was while the remaining columns are still processed.

use chrono::DateTime;
use log::{debug, warn};

use crate::config::{
    EPOCH_MICROS_CUTOFF, EPOCH_MILLIS_CUTOFF, EPOCH_NANOS_CUTOFF, MICROS_PER_SECOND, MILLIS_PER_SECOND,
    NANOS_PER_SECOND,
};
use crate::models::{CandidatePair, Dataset, Source, SuffixedDataset, TimeField, TimeValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRepresentation {
    Epoch,
    DateTime,
}

/// A time column name, optionally carrying a source suffix (`timestamp1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeColumn {
    pub field: TimeField,
    pub source: Option<Source>,
}

impl TimeColumn {
    pub const fn new(field: TimeField, source: Option<Source>) -> Self {
        Self { field, source }
    }

    pub fn name(&self) -> String {
        match self.source {
            Some(source) => source.column(self.field.as_str()),
            None => self.field.as_str().to_string(),
        }
    }
}

/// Every column name the normalizer knows about.
pub const RECOGNIZED_TIME_COLUMNS: [TimeColumn; 9] = [
    TimeColumn::new(TimeField::Timestamp, None),
    TimeColumn::new(TimeField::SessionStart, None),
    TimeColumn::new(TimeField::SessionEnd, None),
    TimeColumn::new(TimeField::Timestamp, Some(Source::One)),
    TimeColumn::new(TimeField::SessionStart, Some(Source::One)),
    TimeColumn::new(TimeField::SessionEnd, Some(Source::One)),
    TimeColumn::new(TimeField::Timestamp, Some(Source::Two)),
    TimeColumn::new(TimeField::SessionStart, Some(Source::Two)),
    TimeColumn::new(TimeField::SessionEnd, Some(Source::Two)),
];

/// Tables whose time values can be addressed column by column.
pub trait TimeColumns {
    /// Every value stored under `column`, in row order. Empty when the table
    /// has no such column.
    fn time_column_mut(&mut self, column: TimeColumn) -> Vec<&mut TimeValue>;
}

impl TimeColumns for Dataset {
    fn time_column_mut(&mut self, column: TimeColumn) -> Vec<&mut TimeValue> {
        if column.source.is_some() {
            return Vec::new();
        }
        self.records
            .iter_mut()
            .filter_map(|r| r.time.field_mut(column.field))
            .collect()
    }
}

impl TimeColumns for SuffixedDataset {
    fn time_column_mut(&mut self, column: TimeColumn) -> Vec<&mut TimeValue> {
        if column.source != Some(self.source) {
            return Vec::new();
        }
        self.records
            .iter_mut()
            .filter_map(|r| r.time.field_mut(column.field))
            .collect()
    }
}

impl TimeColumns for Vec<CandidatePair> {
    fn time_column_mut(&mut self, column: TimeColumn) -> Vec<&mut TimeValue> {
        let Some(source) = column.source else {
            return Vec::new();
        };
        self.iter_mut()
            .filter_map(|pair| pair.record_mut(source).time.field_mut(column.field))
            .collect()
    }
}

/// Outcome per column of one normalization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizationReport {
    pub converted: Vec<String>,
    pub unchanged: Vec<String>,
    pub skipped: Vec<String>,
}

impl NormalizationReport {
    pub fn touched_columns(&self) -> usize {
        self.converted.len() + self.unchanged.len() + self.skipped.len()
    }
}

/// Converts every present time column to integer epoch seconds.
pub fn standardize_epoch<T: TimeColumns>(table: &mut T) -> NormalizationReport {
    normalize(table, TimeRepresentation::Epoch)
}

/// Converts every present time column to calendar datetimes.
pub fn standardize_datetime<T: TimeColumns>(table: &mut T) -> NormalizationReport {
    normalize(table, TimeRepresentation::DateTime)
}

pub fn normalize<T: TimeColumns>(table: &mut T, target: TimeRepresentation) -> NormalizationReport {
    let mut report = NormalizationReport::default();

    for column in RECOGNIZED_TIME_COLUMNS {
        let mut values = table.time_column_mut(column);
        if values.is_empty() {
            continue;
        }
        let name = column.name();

        match convert_column(&values, target) {
            Ok(None) => report.unchanged.push(name),
            Ok(Some(converted)) => {
                for (slot, value) in values.iter_mut().zip(converted) {
                    **slot = value;
                }
                debug!("Normalized column '{}' to {:?}", name, target);
                report.converted.push(name);
            }
            Err(reason) => {
                warn!("Time normalization skipped column '{}': {}", name, reason);
                report.skipped.push(name);
            }
        }
    }

    report
}

/// Converted values for one column, or `None` when it is already in the
/// target representation. Nothing is written unless every value converts.
fn convert_column(
    values: &[&mut TimeValue],
    target: TimeRepresentation,
) -> Result<Option<Vec<TimeValue>>, String> {
    match target {
        TimeRepresentation::Epoch => {
            // Magnitude, not type, decides: an integer column may hold a finer unit.
            let divisor = match *values[0] {
                TimeValue::Epoch(first) => epoch_unit_divisor(first),
                TimeValue::DateTime(_) => 1,
            };
            if divisor == 1 && values.iter().all(|v| v.is_epoch()) {
                return Ok(None);
            }
            let converted = values
                .iter()
                .map(|v| match **v {
                    TimeValue::Epoch(raw) => TimeValue::Epoch(raw.div_euclid(divisor)),
                    TimeValue::DateTime(dt) => TimeValue::Epoch(dt.and_utc().timestamp()),
                })
                .collect();
            Ok(Some(converted))
        }
        TimeRepresentation::DateTime => {
            if values.iter().all(|v| !v.is_epoch()) {
                return Ok(None);
            }
            values
                .iter()
                .map(|v| match **v {
                    TimeValue::Epoch(secs) => DateTime::from_timestamp(secs, 0)
                        .map(|dt| TimeValue::DateTime(dt.naive_utc()))
                        .ok_or_else(|| format!("epoch value {} is outside the datetime range", secs)),
                    dt => Ok(dt),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some)
        }
    }
}

/// Divisor taking an integer epoch column to seconds, judged from its first
/// value: nanoseconds above 10^16, microseconds above 10^13, milliseconds
/// above 10^10, seconds otherwise.
pub fn epoch_unit_divisor(first: i64) -> i64 {
    if first > EPOCH_NANOS_CUTOFF {
        NANOS_PER_SECOND
    } else if first > EPOCH_MICROS_CUTOFF {
        MICROS_PER_SECOND
    } else if first > EPOCH_MILLIS_CUTOFF {
        MILLIS_PER_SECOND
    } else {
        1
    }
}
