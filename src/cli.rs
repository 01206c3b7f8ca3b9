// src/cli.rs
//! Command-line arguments shared by the binaries.

use anyhow::Result;
use clap::Args;

use crate::config::{JoinStrategy, MatchingConfig};
use crate::ingest::SourceColumns;
use crate::models::Source;

/// Where each source's records live and which columns hold the canonical fields.
#[derive(Args, Debug, Clone)]
pub struct SourceTableArgs {
    /// Table holding source 1 (optionally schema-qualified)
    #[arg(long)]
    pub table1: String,

    /// Table holding source 2 (optionally schema-qualified)
    #[arg(long)]
    pub table2: String,

    #[arg(long, default_value = "element_id")]
    pub id_col1: String,
    #[arg(long, default_value = "element_id")]
    pub id_col2: String,

    /// Instant time column of source 1
    #[arg(long)]
    pub time_col1: Option<String>,
    /// Instant time column of source 2
    #[arg(long)]
    pub time_col2: Option<String>,

    /// Session start and end columns of source 1
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    pub session_cols1: Option<Vec<String>>,
    /// Session start and end columns of source 2
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    pub session_cols2: Option<Vec<String>>,

    #[arg(long, default_value = "lat")]
    pub lat_col1: String,
    #[arg(long, default_value = "lat")]
    pub lat_col2: String,
    #[arg(long, default_value = "lon")]
    pub lon_col1: String,
    #[arg(long, default_value = "lon")]
    pub lon_col2: String,

    /// Boardings and alightings columns of source 1, for passenger-count data
    #[arg(long, num_args = 2, value_names = ["BOARDINGS", "ALIGHTINGS"])]
    pub count_cols1: Option<Vec<String>>,
    /// Boardings and alightings columns of source 2, for passenger-count data
    #[arg(long, num_args = 2, value_names = ["BOARDINGS", "ALIGHTINGS"])]
    pub count_cols2: Option<Vec<String>>,
}

impl SourceTableArgs {
    pub fn table(&self, source: Source) -> &str {
        match source {
            Source::One => &self.table1,
            Source::Two => &self.table2,
        }
    }

    /// Column mapping for `source`, validated.
    pub fn source_columns(&self, source: Source) -> Result<SourceColumns> {
        let (id, time, session, lat, lon, counts) = match source {
            Source::One => (
                &self.id_col1,
                &self.time_col1,
                &self.session_cols1,
                &self.lat_col1,
                &self.lon_col1,
                &self.count_cols1,
            ),
            Source::Two => (
                &self.id_col2,
                &self.time_col2,
                &self.session_cols2,
                &self.lat_col2,
                &self.lon_col2,
                &self.count_cols2,
            ),
        };
        let pair = |cols: &Option<Vec<String>>, i: usize| cols.as_ref().and_then(|c| c.get(i).cloned());

        let columns = SourceColumns {
            element_id: id.clone(),
            timestamp: time.clone(),
            session_start: pair(session, 0),
            session_end: pair(session, 1),
            lat: lat.clone(),
            lon: lon.clone(),
            boardings: pair(counts, 0),
            alightings: pair(counts, 1),
        };
        columns.validate()?;
        Ok(columns)
    }
}

/// Overrides for the environment-derived matching configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct MatchingArgs {
    /// Longest session kept, in seconds
    #[arg(long)]
    pub session_limit: Option<i64>,

    /// Largest distance between paired detections, in meters
    #[arg(long)]
    pub detection_distance: Option<f64>,

    /// Largest time gap between paired detections, in seconds
    #[arg(long)]
    pub detection_time: Option<i64>,

    /// Minimum NPMI kept by the threshold filter
    #[arg(long)]
    pub min_npmi: Option<f64>,

    /// Score identifier pairs and filter by NPMI; `--run-npmi=false` switches
    /// off scoring enabled by RUN_NPMI
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub run_npmi: Option<bool>,

    /// Range-join algorithm: in-memory or postgres
    #[arg(long)]
    pub join_strategy: Option<String>,
}

impl MatchingArgs {
    pub fn apply(&self, mut config: MatchingConfig) -> Result<MatchingConfig> {
        if let Some(v) = self.session_limit {
            config.session_limit = v;
        }
        if let Some(v) = self.detection_distance {
            config.detection_distance = v;
        }
        if let Some(v) = self.detection_time {
            config.detection_time = v;
        }
        if let Some(v) = self.min_npmi {
            config.min_npmi = v;
        }
        if let Some(v) = self.run_npmi {
            config.run_npmi = v;
        }
        if let Some(s) = &self.join_strategy {
            config.join_strategy = s.parse::<JoinStrategy>()?;
        }
        Ok(config)
    }
}
