// src/models/stats_models.rs
use chrono::NaiveDateTime;
use serde::Serialize;

/// Row counts for one pipeline stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageStats {
    pub stage: String,
    pub rows_in: usize,
    pub rows_out: usize,
    pub seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub run_id: String,
    pub run_timestamp: NaiveDateTime,
    pub join_strategy: String,
    pub records1: usize,
    pub records2: usize,
    pub candidate_pairs: usize,
    pub scored_identifier_pairs: Option<usize>,
    pub retained_pairs: usize,
    pub stages: Vec<StageStats>,
}

impl PipelineStats {
    pub fn new(run_id: &str, run_timestamp: NaiveDateTime, join_strategy: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            run_timestamp,
            join_strategy: join_strategy.to_string(),
            records1: 0,
            records2: 0,
            candidate_pairs: 0,
            scored_identifier_pairs: None,
            retained_pairs: 0,
            stages: Vec::new(),
        }
    }

    pub fn record_stage(&mut self, stage: &str, rows_in: usize, rows_out: usize, seconds: f64) {
        self.stages.push(StageStats {
            stage: stage.to_string(),
            rows_in,
            rows_out,
            seconds,
        });
    }

    pub fn total_seconds(&self) -> f64 {
        self.stages.iter().map(|s| s.seconds).sum()
    }
}
