// src/ingest.rs
//! Reads a source table from PostgreSQL into a [`Dataset`], mapping the
//! caller's column names onto the canonical record fields.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{info, warn};
use std::time::Instant;
use tokio_postgres::types::Type;
use tokio_postgres::Row;

use crate::db::{quote_ident, PgPool};
use crate::models::{Dataset, Record, RecordTime, TimeValue};

/// Source column names for each canonical field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceColumns {
    pub element_id: String,
    pub timestamp: Option<String>,
    pub session_start: Option<String>,
    pub session_end: Option<String>,
    pub lat: String,
    pub lon: String,
    pub boardings: Option<String>,
    pub alightings: Option<String>,
}

/// Which time representation a validated mapping reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeMapping {
    Instant,
    Session,
}

impl SourceColumns {
    /// Mapping for an instantaneous-detection table.
    pub fn instant(element_id: &str, timestamp: &str, lat: &str, lon: &str) -> Self {
        Self {
            element_id: element_id.to_string(),
            timestamp: Some(timestamp.to_string()),
            lat: lat.to_string(),
            lon: lon.to_string(),
            ..Self::default()
        }
    }

    /// Mapping for a session table.
    pub fn session(element_id: &str, session_start: &str, session_end: &str, lat: &str, lon: &str) -> Self {
        Self {
            element_id: element_id.to_string(),
            session_start: Some(session_start.to_string()),
            session_end: Some(session_end.to_string()),
            lat: lat.to_string(),
            lon: lon.to_string(),
            ..Self::default()
        }
    }

    pub fn with_counts(mut self, boardings: &str, alightings: &str) -> Self {
        self.boardings = Some(boardings.to_string());
        self.alightings = Some(alightings.to_string());
        self
    }

    fn time_mapping(&self) -> Result<TimeMapping> {
        if self.element_id.is_empty() || self.lat.is_empty() || self.lon.is_empty() {
            bail!("Column mapping needs element_id, lat and lon columns");
        }
        match (&self.timestamp, &self.session_start, &self.session_end) {
            (Some(_), start, end) => {
                if start.is_some() || end.is_some() {
                    warn!(
                        "Column mapping names both a timestamp and session columns; reading timestamp '{}'",
                        self.timestamp.as_deref().unwrap_or_default()
                    );
                }
                Ok(TimeMapping::Instant)
            }
            (None, Some(_), Some(_)) => Ok(TimeMapping::Session),
            (None, Some(_), None) | (None, None, Some(_)) => {
                bail!("Column mapping names only one of session_start and session_end")
            }
            (None, None, None) => {
                bail!("Column mapping needs a timestamp column or a session_start/session_end pair")
            }
        }
    }

    /// Checks the mapping can produce well-formed records.
    pub fn validate(&self) -> Result<()> {
        self.time_mapping().map(|_| ())
    }

    fn select_sql(&self, table: &str) -> Result<String> {
        let mut select = vec![
            format!("{} AS element_id", quote_ident(&self.element_id)),
            format!("{} AS lat", quote_ident(&self.lat)),
            format!("{} AS lon", quote_ident(&self.lon)),
        ];
        match self.time_mapping()? {
            TimeMapping::Instant => {
                if let Some(ts) = &self.timestamp {
                    select.push(format!("{} AS timestamp", quote_ident(ts)));
                }
            }
            TimeMapping::Session => {
                if let (Some(start), Some(end)) = (&self.session_start, &self.session_end) {
                    select.push(format!("{} AS session_start", quote_ident(start)));
                    select.push(format!("{} AS session_end", quote_ident(end)));
                }
            }
        }
        if let Some(b) = &self.boardings {
            select.push(format!("{} AS boardings", quote_ident(b)));
        }
        if let Some(a) = &self.alightings {
            select.push(format!("{} AS alightings", quote_ident(a)));
        }
        Ok(format!("SELECT {} FROM {}", select.join(", "), quote_table(table)))
    }
}

/// Quotes `schema.table` part by part.
fn quote_table(table: &str) -> String {
    table
        .split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

fn column_type<'a>(row: &'a Row, name: &str) -> Result<&'a Type> {
    row.columns()
        .iter()
        .find(|c| c.name() == name)
        .map(|c| c.type_())
        .with_context(|| format!("Column '{}' missing from result", name))
}

fn read_time(row: &Row, name: &str) -> Result<Option<TimeValue>> {
    let ty = column_type(row, name)?;
    let value = if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(name)?.map(TimeValue::Epoch)
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(name)?
            .map(|v| TimeValue::Epoch(i64::from(v)))
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<NaiveDateTime>>(name)?
            .map(TimeValue::DateTime)
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<DateTime<Utc>>>(name)?
            .map(|dt| TimeValue::DateTime(dt.naive_utc()))
    } else {
        bail!("Time column '{}' has unsupported type {}", name, ty);
    };
    Ok(value)
}

fn read_coordinate(row: &Row, name: &str) -> Result<f64> {
    let ty = column_type(row, name)?;
    let value = if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(name)?
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(name)?.map(f64::from)
    } else {
        bail!("Coordinate column '{}' has unsupported type {}", name, ty);
    };
    value.with_context(|| format!("Coordinate column '{}' is NULL", name))
}

fn read_count(row: &Row, name: &str) -> Result<Option<u32>> {
    let ty = column_type(row, name)?;
    let value: Option<i64> = if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(name)?.map(i64::from)
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(name)?.map(i64::from)
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(name)?
    } else {
        bail!("Count column '{}' has unsupported type {}", name, ty);
    };
    value
        .map(|v| u32::try_from(v).with_context(|| format!("Count column '{}' holds invalid value {}", name, v)))
        .transpose()
}

fn record_from_row(row: &Row, columns: &SourceColumns, mapping: TimeMapping) -> Result<Record> {
    let element_id: String = row.try_get("element_id").context("Read element_id")?;
    let time = match mapping {
        TimeMapping::Instant => RecordTime::from_parts(read_time(row, "timestamp")?, None, None),
        TimeMapping::Session => RecordTime::from_parts(
            None,
            read_time(row, "session_start")?,
            read_time(row, "session_end")?,
        ),
    }
    .with_context(|| format!("Record for element '{}'", element_id))?;

    let mut record = Record::new(
        element_id,
        time,
        read_coordinate(row, "lat")?,
        read_coordinate(row, "lon")?,
    );
    if columns.boardings.is_some() {
        record.boardings = read_count(row, "boardings")?;
    }
    if columns.alightings.is_some() {
        record.alightings = read_count(row, "alightings")?;
    }
    Ok(record)
}

/// Loads every row of `table` as a record.
pub async fn load_dataset(pool: &PgPool, table: &str, columns: &SourceColumns) -> Result<Dataset> {
    let start_time = Instant::now();
    let mapping = columns.time_mapping()?;
    let sql = columns.select_sql(table)?;

    let conn = pool.get().await.context("Ingest: DB conn")?;
    let rows = conn
        .query(sql.as_str(), &[])
        .await
        .with_context(|| format!("Ingest: query {} failed", table))?;

    let dataset = rows
        .iter()
        .map(|row| record_from_row(row, columns, mapping))
        .collect::<Result<Vec<_>>>()
        .map(Dataset::new)
        .with_context(|| format!("Ingest: malformed row in {}", table))?;

    info!(
        "📥 Loaded {} records from {} in {:.2?}",
        dataset.len(),
        table,
        start_time.elapsed()
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_mapping() {
        assert!(SourceColumns::instant("mac", "ts", "lat", "lon").validate().is_ok());
        assert!(SourceColumns::session("mac", "start", "end", "lat", "lon").validate().is_ok());

        let mut partial = SourceColumns::session("mac", "start", "end", "lat", "lon");
        partial.session_end = None;
        assert!(partial.validate().is_err());

        let mut no_time = SourceColumns::instant("mac", "ts", "lat", "lon");
        no_time.timestamp = None;
        assert!(no_time.validate().is_err());

        let mut no_id = SourceColumns::instant("mac", "ts", "lat", "lon");
        no_id.element_id.clear();
        assert!(no_id.validate().is_err());
    }

    #[test]
    fn test_timestamp_preferred_when_both_mapped() {
        let mut both = SourceColumns::instant("mac", "ts", "lat", "lon");
        both.session_start = Some("start".to_string());
        both.session_end = Some("end".to_string());
        assert_eq!(both.time_mapping().unwrap(), TimeMapping::Instant);

        let sql = both.select_sql("detections").unwrap();
        assert!(sql.contains("\"ts\" AS timestamp"));
        assert!(!sql.contains("session_start"));
    }

    #[test]
    fn test_select_sql_quotes_identifiers() {
        let columns = SourceColumns::session("Device MAC", "first_seen", "last_seen", "GPS_LAT", "GPS_LON")
            .with_counts("ons", "offs");
        let sql = columns.select_sql("transit.apc_raw").unwrap();
        assert_eq!(
            sql,
            "SELECT \"Device MAC\" AS element_id, \"GPS_LAT\" AS lat, \"GPS_LON\" AS lon, \
             \"first_seen\" AS session_start, \"last_seen\" AS session_end, \
             \"ons\" AS boardings, \"offs\" AS alightings FROM \"transit\".\"apc_raw\""
        );
    }

    #[tokio::test]
    #[ignore = "requires POSTGRES_HOST"]
    async fn test_load_dataset_from_postgres() {
        let pool = crate::db::connect().await.unwrap();
        let table = format!("countmatch_ingest_{}", uuid::Uuid::new_v4().simple());
        let conn = pool.get().await.unwrap();
        conn.batch_execute(&format!(
            "CREATE TABLE {table} (mac TEXT, seen_at BIGINT, gps_lat DOUBLE PRECISION, gps_lon REAL, ons SMALLINT, offs INTEGER);
             INSERT INTO {table} VALUES
                ('bob1', 1519330050, 44.4999, -123.5, 3, 1),
                ('sue1', 1519330150, 43.0, -124.0, NULL, 0);"
        ))
        .await
        .unwrap();

        let columns = SourceColumns::instant("mac", "seen_at", "gps_lat", "gps_lon").with_counts("ons", "offs");
        let loaded = load_dataset(&pool, &table, &columns).await;
        conn.batch_execute(&format!("DROP TABLE {table}")).await.unwrap();

        let mut dataset = loaded.unwrap();
        dataset.records.sort_by(|a, b| a.element_id.cmp(&b.element_id));
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.records[0].element_id, "bob1");
        assert_eq!(dataset.records[0].time, RecordTime::Instant(TimeValue::Epoch(1519330050)));
        assert_eq!(dataset.records[0].boardings, Some(3));
        assert_eq!(dataset.records[1].boardings, None);
        assert_eq!(dataset.records[1].alightings, Some(0));
        assert_eq!(dataset.records[1].lon, -124.0);
    }
}
