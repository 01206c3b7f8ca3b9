// src/matching/session.rs
use log::debug;

use crate::models::Dataset;

/// Drops session records lasting longer than `max_duration` seconds.
/// Instantaneous detections pass through, and a dataset without sessions is
/// returned as-is. Expects epoch-normalized times.
pub fn filter_sessions(dataset: Dataset, max_duration: i64) -> Dataset {
    if !dataset.has_sessions() {
        return dataset;
    }

    let before = dataset.len();
    let kept: Dataset = dataset
        .records
        .into_iter()
        .filter(|r| r.time.session_duration().map_or(true, |d| d <= max_duration))
        .collect();

    debug!(
        "Session filter: {} -> {} records (max duration {}s)",
        before,
        kept.len(),
        max_duration
    );
    kept
}
