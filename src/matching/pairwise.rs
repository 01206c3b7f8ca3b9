// src/matching/pairwise.rs
use anyhow::{Context, Result};
use chrono::Utc;

use super::geospatial::filter_by_distance;
use super::range_join::RangeJoin;
use super::session::filter_sessions;
use super::time::standardize_epoch;
use crate::models::{CandidatePair, Dataset, PipelineStats, Source};
use crate::utils::logging::{Stage, StageLogger};

/// Candidate pairs between the two sources: normalize both sides to epoch
/// seconds, drop long sessions from each side, join on time within
/// `detection_time` seconds, then keep pairs at most `detection_distance`
/// meters apart.
pub async fn pairwise_filter<J: RangeJoin>(
    data1: Dataset,
    data2: Dataset,
    session_limit: i64,
    detection_distance: f64,
    detection_time: i64,
    joiner: &J,
) -> Result<Vec<CandidatePair>> {
    let mut stats = PipelineStats::new("adhoc", Utc::now().naive_utc(), joiner.strategy().as_str());
    pairwise_filter_tracked(
        data1,
        data2,
        session_limit,
        detection_distance,
        detection_time,
        joiner,
        &mut stats,
    )
    .await
}

/// As [`pairwise_filter`], recording row counts and timings per stage.
pub(crate) async fn pairwise_filter_tracked<J: RangeJoin>(
    mut data1: Dataset,
    mut data2: Dataset,
    session_limit: i64,
    detection_distance: f64,
    detection_time: i64,
    joiner: &J,
    stats: &mut PipelineStats,
) -> Result<Vec<CandidatePair>> {
    stats.records1 = data1.len();
    stats.records2 = data2.len();

    let logger = StageLogger::new(Stage::Normalize);
    let report1 = standardize_epoch(&mut data1);
    let report2 = standardize_epoch(&mut data2);
    for column in report1.skipped.iter().chain(report2.skipped.iter()) {
        logger.log_warning(&format!("column '{}' could not be converted to epoch seconds", column));
    }
    let rows = data1.len() + data2.len();
    stats.record_stage(Stage::Normalize.as_str(), rows, rows, logger.get_elapsed().as_secs_f64());

    let logger = StageLogger::new(Stage::SessionFilter);
    let data1 = filter_sessions(data1, session_limit);
    let data2 = filter_sessions(data2, session_limit);
    let kept = data1.len() + data2.len();
    logger.log_filtering_results(rows, kept);
    stats.record_stage(Stage::SessionFilter.as_str(), rows, kept, logger.get_elapsed().as_secs_f64());

    let logger = StageLogger::new(Stage::RangeJoin);
    logger.log_start(&format!(
        "{} x {} records, window ±{}s, strategy {}",
        data1.len(),
        data2.len(),
        detection_time,
        joiner.strategy()
    ));
    let left = data1.with_source(Source::One);
    let right = data2.with_source(Source::Two);
    let joined = joiner
        .join(&left, &right, detection_time)
        .await
        .context("Pairwise filter: range join failed")?;
    logger.log_phase("joined", Some(format!("{} pairs", joined.len()).as_str()));
    stats.record_stage(Stage::RangeJoin.as_str(), kept, joined.len(), logger.get_elapsed().as_secs_f64());

    let logger = StageLogger::new(Stage::DistanceFilter);
    let joined_count = joined.len();
    let pairs = filter_by_distance(joined, detection_distance);
    logger.log_filtering_results(joined_count, pairs.len());
    stats.record_stage(
        Stage::DistanceFilter.as_str(),
        joined_count,
        pairs.len(),
        logger.get_elapsed().as_secs_f64(),
    );

    stats.candidate_pairs = pairs.len();
    Ok(pairs)
}
