// src/matching/range_join/postgres.rs
use anyhow::{Context, Result};
use futures::{pin_mut, TryStreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, info};
use postgres_types::ToSql;
use std::time::Instant;
use tokio_postgres::{Row, Transaction};

use super::{ensure_join_sides, RangeJoin};
use crate::config::{JoinStrategy, INSERT_BATCH_SIZE};
use crate::db::PgPool;
use crate::models::{
    CandidatePair, Record, RecordTime, Source, SuffixedDataset, TimeField, TimeValue,
};

/// Columns stored per source, before suffixing.
const RECORD_COLUMNS: [&str; 8] = [
    "element_id",
    "timestamp",
    "session_start",
    "session_end",
    "lat",
    "lon",
    "boardings",
    "alightings",
];

/// Range join executed by PostgreSQL. Both sides are loaded into temporary
/// tables that are dropped when the transaction commits, the right side's join
/// time is indexed, and the matching rows are streamed back. Memory use is
/// bounded by the result being built, not by an n·m intermediate.
#[derive(Clone)]
pub struct PostgresJoin {
    pool: PgPool,
    multi_progress: Option<MultiProgress>,
}

impl PostgresJoin {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            multi_progress: None,
        }
    }

    /// Shows a load progress bar per side under `multi_progress`.
    pub fn with_progress(mut self, multi_progress: Option<MultiProgress>) -> Self {
        self.multi_progress = multi_progress;
        self
    }

    fn load_progress_bar(&self, side: &SuffixedDataset) -> Option<ProgressBar> {
        self.multi_progress.as_ref().map(|mp| {
            let pb = mp.add(ProgressBar::new(side.len() as u64));
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {spinner:.blue} [{elapsed_precise}] {bar:30.green/blue} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▉▊▋▌▍▎▏  "),
            );
            pb.set_message(format!("Loading source {}", side.source));
            pb
        })
    }
}

fn table_name(source: Source) -> String {
    format!("countmatch_source{}", source.suffix())
}

fn create_table_sql(source: Source) -> String {
    let c = |base: &str| source.column(base);
    format!(
        "CREATE TEMP TABLE {table} (
            row_idx BIGINT NOT NULL,
            join_time BIGINT NOT NULL,
            {element_id} TEXT NOT NULL,
            {timestamp} BIGINT,
            {session_start} BIGINT,
            {session_end} BIGINT,
            {lat} DOUBLE PRECISION NOT NULL,
            {lon} DOUBLE PRECISION NOT NULL,
            {boardings} BIGINT,
            {alightings} BIGINT
        ) ON COMMIT DROP",
        table = table_name(source),
        element_id = c("element_id"),
        timestamp = c("timestamp"),
        session_start = c("session_start"),
        session_end = c("session_end"),
        lat = c("lat"),
        lon = c("lon"),
        boardings = c("boardings"),
        alightings = c("alightings"),
    )
}

fn range_join_sql(left: Source, right: Source) -> String {
    let select_list: Vec<String> = RECORD_COLUMNS
        .iter()
        .map(|base| format!("l.{}", left.column(base)))
        .chain(RECORD_COLUMNS.iter().map(|base| format!("r.{}", right.column(base))))
        .collect();
    format!(
        "SELECT {columns}
         FROM {left_table} l
         JOIN {right_table} r
           ON r.join_time BETWEEN l.join_time - $1 AND l.join_time + $1
         ORDER BY l.row_idx, r.row_idx",
        columns = select_list.join(", "),
        left_table = table_name(left),
        right_table = table_name(right),
    )
}

/// One record as laid out in a temporary table row. Times are the epoch
/// seconds the join compares; the join rejects datetimes before loading.
#[derive(Debug, Clone, PartialEq)]
struct StoredRecord {
    element_id: String,
    timestamp: Option<i64>,
    session_start: Option<i64>,
    session_end: Option<i64>,
    lat: f64,
    lon: f64,
    boardings: Option<i64>,
    alightings: Option<i64>,
}

impl StoredRecord {
    fn from_record(record: &Record) -> Self {
        let epoch_field = |field| record.time.field(field).map(TimeValue::epoch_seconds);
        Self {
            element_id: record.element_id.clone(),
            timestamp: epoch_field(TimeField::Timestamp),
            session_start: epoch_field(TimeField::SessionStart),
            session_end: epoch_field(TimeField::SessionEnd),
            lat: record.lat,
            lon: record.lon,
            boardings: record.boardings.map(i64::from),
            alightings: record.alightings.map(i64::from),
        }
    }

    /// Reads one side's columns out of a joined row.
    fn from_row(row: &Row, source: Source) -> Result<Self> {
        let get = |base: &str| source.column(base);
        Ok(Self {
            element_id: row
                .try_get(get("element_id").as_str())
                .context("Range join: read element_id")?,
            timestamp: row.try_get(get("timestamp").as_str()).context("Range join: read timestamp")?,
            session_start: row
                .try_get(get("session_start").as_str())
                .context("Range join: read session_start")?,
            session_end: row
                .try_get(get("session_end").as_str())
                .context("Range join: read session_end")?,
            lat: row.try_get(get("lat").as_str()).context("Range join: read lat")?,
            lon: row.try_get(get("lon").as_str()).context("Range join: read lon")?,
            boardings: row.try_get(get("boardings").as_str()).context("Range join: read boardings")?,
            alightings: row
                .try_get(get("alightings").as_str())
                .context("Range join: read alightings")?,
        })
    }

    fn into_record(self) -> Result<Record> {
        let count = |name: &str, value: Option<i64>| -> Result<Option<u32>> {
            value
                .map(|v| u32::try_from(v).with_context(|| format!("{} out of range: {}", name, v)))
                .transpose()
        };
        let time = RecordTime::from_parts(
            self.timestamp.map(TimeValue::Epoch),
            self.session_start.map(TimeValue::Epoch),
            self.session_end.map(TimeValue::Epoch),
        )
        .with_context(|| format!("Range join: record for element '{}'", self.element_id))?;

        Ok(Record {
            boardings: count("boardings", self.boardings)?,
            alightings: count("alightings", self.alightings)?,
            element_id: self.element_id,
            time,
            lat: self.lat,
            lon: self.lon,
        })
    }

    /// Appends the ten INSERT parameters for this row.
    fn push_params(self, row_idx: i64, join_time: i64, params: &mut Vec<Box<dyn ToSql + Sync + Send>>) {
        params.push(Box::new(row_idx));
        params.push(Box::new(join_time));
        params.push(Box::new(self.element_id));
        params.push(Box::new(self.timestamp));
        params.push(Box::new(self.session_start));
        params.push(Box::new(self.session_end));
        params.push(Box::new(self.lat));
        params.push(Box::new(self.lon));
        params.push(Box::new(self.boardings));
        params.push(Box::new(self.alightings));
    }
}

async fn load_side(
    transaction: &Transaction<'_>,
    side: &SuffixedDataset,
    progress: Option<&ProgressBar>,
) -> Result<()> {
    transaction
        .batch_execute(&create_table_sql(side.source))
        .await
        .with_context(|| format!("Range join: create temp table for source {}", side.source))?;

    let columns = std::iter::once("row_idx".to_string())
        .chain(std::iter::once("join_time".to_string()))
        .chain(RECORD_COLUMNS.iter().map(|base| side.column(base)))
        .collect::<Vec<_>>()
        .join(", ");

    for (batch_idx, batch) in side.records.chunks(INSERT_BATCH_SIZE).enumerate() {
        let mut values_clause_parts = Vec::with_capacity(batch.len());
        let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::with_capacity(batch.len() * 10);
        let mut param_idx = 1;

        for (offset, record) in batch.iter().enumerate() {
            let placeholders: Vec<String> = (param_idx..param_idx + 10).map(|i| format!("${}", i)).collect();
            values_clause_parts.push(format!("({})", placeholders.join(", ")));

            StoredRecord::from_record(record).push_params(
                (batch_idx * INSERT_BATCH_SIZE + offset) as i64,
                record.time.primary().epoch_seconds(),
                &mut params,
            );
            param_idx += 10;
        }

        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            table_name(side.source),
            columns,
            values_clause_parts.join(", ")
        );
        let params_slice: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        transaction
            .execute(insert_sql.as_str(), params_slice.as_slice())
            .await
            .with_context(|| format!("Range join: insert batch {} for source {}", batch_idx + 1, side.source))?;

        if let Some(pb) = progress {
            pb.inc(batch.len() as u64);
        }
    }

    Ok(())
}

fn slice_iter<'a>(
    s: &'a [&'a (dyn ToSql + Sync)],
) -> impl ExactSizeIterator<Item = &'a dyn ToSql> + 'a {
    s.iter().map(|s| *s as _)
}

impl RangeJoin for PostgresJoin {
    fn strategy(&self) -> JoinStrategy {
        JoinStrategy::Postgres
    }

    async fn join(
        &self,
        left: &SuffixedDataset,
        right: &SuffixedDataset,
        window: i64,
    ) -> Result<Vec<CandidatePair>> {
        ensure_join_sides(left, right, window)?;
        let start_time = Instant::now();

        let mut conn = self.pool.get().await.context("Range join: DB conn")?;
        let transaction = conn.transaction().await.context("Range join: Start TX")?;

        for side in [left, right] {
            let pb = self.load_progress_bar(side);
            load_side(&transaction, side, pb.as_ref()).await?;
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
        }
        transaction
            .batch_execute(&format!(
                "CREATE INDEX ON {} (join_time); ANALYZE {}; ANALYZE {};",
                table_name(right.source),
                table_name(left.source),
                table_name(right.source)
            ))
            .await
            .context("Range join: index temp tables")?;
        debug!(
            "Range join: loaded {} + {} rows in {:.2?}",
            left.len(),
            right.len(),
            start_time.elapsed()
        );

        let mut pairs = Vec::new();
        {
            let sql = range_join_sql(left.source, right.source);
            let params: Vec<&(dyn ToSql + Sync)> = vec![&window];
            let rows = transaction
                .query_raw(sql.as_str(), slice_iter(&params))
                .await
                .context("Range join: query failed")?;
            pin_mut!(rows);
            while let Some(row) = rows.try_next().await.context("Range join: read row")? {
                pairs.push(CandidatePair::new(
                    StoredRecord::from_row(&row, left.source)?.into_record()?,
                    StoredRecord::from_row(&row, right.source)?.into_record()?,
                ));
            }
        }

        transaction.commit().await.context("Range join: Commit TX")?;
        info!(
            "PostgreSQL range join: {} x {} -> {} pairs in {:.2?}",
            left.len(),
            right.len(),
            pairs.len(),
            start_time.elapsed()
        );
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::super::conformance::{left_fixture, pair_keys, right_fixture};
    use super::super::InMemoryJoin;
    use super::*;

    #[test]
    fn test_create_table_sql_uses_suffixed_columns() {
        let sql = create_table_sql(Source::Two);
        assert!(sql.contains("countmatch_source2"));
        assert!(sql.contains("element_id2 TEXT NOT NULL"));
        assert!(sql.contains("session_start2 BIGINT"));
        assert!(sql.contains("ON COMMIT DROP"));
    }

    #[test]
    fn test_range_join_sql() {
        let sql = range_join_sql(Source::One, Source::Two);
        assert!(sql.contains("l.element_id1"));
        assert!(sql.contains("r.alightings2"));
        assert!(sql.contains("BETWEEN l.join_time - $1 AND l.join_time + $1"));
    }

    #[test]
    fn test_stored_rows_rebuild_every_field() {
        for record in left_fixture().records.iter().chain(right_fixture().records.iter()) {
            let rebuilt = StoredRecord::from_record(record).into_record().unwrap();
            assert_eq!(&rebuilt, record);
        }
    }

    #[tokio::test]
    async fn test_stored_rows_match_in_memory_pairs() {
        // Join on the stored form the way the BETWEEN query does, then rebuild.
        let left = left_fixture();
        let right = right_fixture();
        let stored = |side: &SuffixedDataset| -> Vec<(i64, StoredRecord)> {
            side.records
                .iter()
                .map(|r| (r.time.primary().epoch_seconds(), StoredRecord::from_record(r)))
                .collect()
        };
        let (stored_left, stored_right) = (stored(&left), stored(&right));

        for window in [0, 10, 60, 110, 5000] {
            let mut rebuilt = Vec::new();
            for (lt, l) in &stored_left {
                for (rt, r) in &stored_right {
                    if (lt - window..=lt + window).contains(rt) {
                        rebuilt.push(CandidatePair::new(
                            l.clone().into_record().unwrap(),
                            r.clone().into_record().unwrap(),
                        ));
                    }
                }
            }
            let in_memory = InMemoryJoin::new().join(&left, &right, window).await.unwrap();
            assert_eq!(pair_keys(&rebuilt), pair_keys(&in_memory), "window {}", window);
        }
    }

    #[test]
    fn test_negative_counts_rejected_on_read() {
        let mut stored = StoredRecord::from_record(&left_fixture().records[3]);
        stored.boardings = Some(-1);
        assert!(stored.into_record().is_err());
    }

    #[tokio::test]
    #[ignore = "requires POSTGRES_HOST"]
    async fn test_postgres_join_keeps_all_columns() {
        let pool = crate::db::connect().await.unwrap();
        let pairs = PostgresJoin::new(pool)
            .join(&left_fixture(), &right_fixture(), 60)
            .await
            .unwrap();
        let amy = pairs
            .iter()
            .find(|p| p.identifier_pair() == ("amy1", "amy2"))
            .unwrap();
        assert_eq!(amy.record1.boardings, Some(4));
        assert_eq!(amy.record1.alightings, Some(1));
        assert_eq!(amy.record2.boardings, None);

        let bob = pairs
            .iter()
            .find(|p| p.identifier_pair() == ("bob1", "bob2"))
            .unwrap();
        assert_eq!(bob.record2.time.session_duration(), Some(30));
    }
}
