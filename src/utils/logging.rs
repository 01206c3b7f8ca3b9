// src/utils/logging.rs - Logging helpers for the matching stages
use log::{info, warn};
use std::time::{Duration, Instant};

use crate::config::MatchingConfig;

/// The steps of a matching run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalize,
    SessionFilter,
    RangeJoin,
    DistanceFilter,
    Npmi,
    Threshold,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Normalize => "normalize",
            Stage::SessionFilter => "session_filter",
            Stage::RangeJoin => "range_join",
            Stage::DistanceFilter => "distance_filter",
            Stage::Npmi => "npmi",
            Stage::Threshold => "npmi_threshold",
        }
    }

    fn label(&self) -> (&'static str, &'static str) {
        match self {
            Stage::Normalize => ("NORMALIZE", "🕒"),
            Stage::SessionFilter => ("SESSIONS", "⏱️"),
            Stage::RangeJoin => ("JOIN", "🔗"),
            Stage::DistanceFilter => ("DISTANCE", "📍"),
            Stage::Npmi => ("NPMI", "📈"),
            Stage::Threshold => ("THRESHOLD", "🎯"),
        }
    }
}

#[derive(Clone)]
pub struct StageLogger {
    stage_name: &'static str,
    stage_emoji: &'static str,
    start_time: Instant,
}

impl StageLogger {
    pub fn new(stage: Stage) -> Self {
        let (stage_name, stage_emoji) = stage.label();
        Self {
            stage_name,
            stage_emoji,
            start_time: Instant::now(),
        }
    }

    pub fn log_start(&self, details: &str) {
        info!(
            "[{}] {} 🚀 Starting: {}",
            self.stage_name, self.stage_emoji, details
        );
    }

    pub fn log_phase(&self, phase: &str, details: Option<&str>) {
        let elapsed = self.start_time.elapsed();
        let msg = if let Some(details) = details {
            format!(
                "[{}] {} 🔄 Phase: {} - {} [+{:.1}s]",
                self.stage_name, self.stage_emoji, phase, details, elapsed.as_secs_f32()
            )
        } else {
            format!(
                "[{}] {} 🔄 Phase: {} [+{:.1}s]",
                self.stage_name, self.stage_emoji, phase, elapsed.as_secs_f32()
            )
        };
        info!("{}", msg);
    }

    /// Row counts before and after a filtering stage.
    pub fn log_filtering_results(&self, rows_in: usize, rows_out: usize) {
        let percent_kept = if rows_in > 0 {
            (rows_out as f64 / rows_in as f64) * 100.0
        } else {
            0.0
        };
        info!(
            "[{}] {} 🎯 {} rows → {} rows ({:.1}% kept) in {:.2?}",
            self.stage_name,
            self.stage_emoji,
            rows_in,
            rows_out,
            percent_kept,
            self.start_time.elapsed()
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!("[{}] {} ⚠️  {}", self.stage_name, self.stage_emoji, message);
    }

    pub fn get_elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

pub fn log_pipeline_start(run_id: &str, config: &MatchingConfig, records1: usize, records2: usize) {
    info!("🚀 ===== CANDIDATE MATCHING PIPELINE STARTING =====");
    info!("📅 Pipeline Run ID: {}", run_id);
    info!("📊 Inputs: {} records from source 1, {} records from source 2", records1, records2);
    config.log_config();
    info!("==================================================");
}

pub fn log_pipeline_completion(run_id: &str, duration: Duration, candidate_pairs: usize, retained_pairs: usize) {
    info!("🎉 ===== CANDIDATE MATCHING PIPELINE COMPLETED =====");
    info!("📅 Pipeline Run ID: {}", run_id);
    info!("⏱️  Total Duration: {:.2?}", duration);
    info!("🔗 Candidate pairs: {}", candidate_pairs);
    info!("✅ Retained pairs: {}", retained_pairs);
    info!("===================================================");
}
