// src/matching/range_join/in_memory.rs
use anyhow::Result;
use log::debug;
use ndarray::Array2;
use std::time::Instant;

use super::{ensure_join_sides, RangeJoin};
use crate::config::JoinStrategy;
use crate::models::{CandidatePair, SuffixedDataset};

/// Cross filter over the full `left × right` time-difference matrix. Fast for
/// small and medium inputs; memory grows with the product of the input sizes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJoin;

impl InMemoryJoin {
    pub fn new() -> Self {
        Self
    }
}

/// `diff[[i, j]] = right[j] - left[i]`.
pub fn time_difference_matrix(left: &[i64], right: &[i64]) -> Array2<i64> {
    Array2::from_shape_fn((left.len(), right.len()), |(i, j)| {
        right[j].saturating_sub(left[i])
    })
}

impl RangeJoin for InMemoryJoin {
    fn strategy(&self) -> JoinStrategy {
        JoinStrategy::InMemory
    }

    async fn join(
        &self,
        left: &SuffixedDataset,
        right: &SuffixedDataset,
        window: i64,
    ) -> Result<Vec<CandidatePair>> {
        ensure_join_sides(left, right, window)?;
        let start_time = Instant::now();

        let left_times: Vec<i64> = left
            .records
            .iter()
            .map(|r| r.time.primary().epoch_seconds())
            .collect();
        let right_times: Vec<i64> = right
            .records
            .iter()
            .map(|r| r.time.primary().epoch_seconds())
            .collect();

        let differences = time_difference_matrix(&left_times, &right_times);
        let pairs: Vec<CandidatePair> = differences
            .indexed_iter()
            .filter(|(_, diff)| (-window..=window).contains(*diff))
            .map(|((i, j), _)| {
                CandidatePair::new(left.records[i].clone(), right.records[j].clone())
            })
            .collect();

        debug!(
            "In-memory range join: {}x{} matrix -> {} pairs in {:.2?}",
            left_times.len(),
            right_times.len(),
            pairs.len(),
            start_time.elapsed()
        );
        Ok(pairs)
    }
}
