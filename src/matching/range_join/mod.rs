// src/matching/range_join/mod.rs
//! Temporal range join between the two sources.
//!
//! A pair `(l, r)` is produced for every left record `l` and right record `r`
//! with `time(r)` in `[time(l) - window, time(l) + window]`, where `time` is the
//! instant of a detection or the start of a session. Pairs keep every field of
//! both records and are never deduplicated.
//!
//! Both sides must already be normalized to integer epoch seconds; a record
//! still holding a datetime is rejected before either strategy runs.
//!
//! | Strategy | Module | Resource profile |
//! |----------|--------|------------------|
//! | `InMemoryJoin` | `in_memory` | n·m difference matrix held in memory |
//! | `PostgresJoin` | `postgres` | temporary tables, indexed BETWEEN, streamed rows |

pub mod in_memory;
pub mod postgres;

use anyhow::{bail, Result};
use indicatif::MultiProgress;

use crate::config::JoinStrategy;
use crate::db::PgPool;
use crate::models::{CandidatePair, Source, SuffixedDataset};

pub use in_memory::InMemoryJoin;
pub use postgres::PostgresJoin;

/// The contract both join algorithms satisfy. For the same inputs and window
/// they return the same multiset of pairs; row order may differ.
#[allow(async_fn_in_trait)]
pub trait RangeJoin {
    fn strategy(&self) -> JoinStrategy;

    async fn join(
        &self,
        left: &SuffixedDataset,
        right: &SuffixedDataset,
        window: i64,
    ) -> Result<Vec<CandidatePair>>;
}

/// Join algorithm chosen from configuration.
#[derive(Clone)]
pub enum JoinEngine {
    InMemory(InMemoryJoin),
    Postgres(PostgresJoin),
}

impl JoinEngine {
    /// Builds the configured engine. The PostgreSQL strategy needs a pool.
    pub fn from_strategy(strategy: JoinStrategy, pool: Option<&PgPool>) -> Result<Self> {
        match (strategy, pool) {
            (JoinStrategy::InMemory, _) => Ok(JoinEngine::InMemory(InMemoryJoin::new())),
            (JoinStrategy::Postgres, Some(pool)) => {
                Ok(JoinEngine::Postgres(PostgresJoin::new(pool.clone())))
            }
            (JoinStrategy::Postgres, None) => {
                bail!("The postgres join strategy requires a database connection")
            }
        }
    }

    pub fn with_progress(self, multi_progress: Option<MultiProgress>) -> Self {
        match self {
            JoinEngine::Postgres(join) => JoinEngine::Postgres(join.with_progress(multi_progress)),
            other => other,
        }
    }
}

impl RangeJoin for JoinEngine {
    fn strategy(&self) -> JoinStrategy {
        match self {
            JoinEngine::InMemory(join) => join.strategy(),
            JoinEngine::Postgres(join) => join.strategy(),
        }
    }

    async fn join(
        &self,
        left: &SuffixedDataset,
        right: &SuffixedDataset,
        window: i64,
    ) -> Result<Vec<CandidatePair>> {
        match self {
            JoinEngine::InMemory(join) => join.join(left, right, window).await,
            JoinEngine::Postgres(join) => join.join(left, right, window).await,
        }
    }
}

/// Left must be source 1 and right source 2 so pairs keep their provenance.
pub(crate) fn ensure_join_sides(left: &SuffixedDataset, right: &SuffixedDataset, window: i64) -> Result<()> {
    if left.source != Source::One || right.source != Source::Two {
        bail!(
            "Range join expects source 1 on the left and source 2 on the right, got {} and {}",
            left.source,
            right.source
        );
    }
    if window < 0 {
        bail!("Range join window must be non-negative, got {}", window);
    }
    for side in [left, right] {
        if let Some(record) = side.records.iter().find(|r| !r.time.is_epoch()) {
            bail!(
                "Range join expects epoch-second times; source {} element '{}' holds a datetime",
                side.source,
                record.element_id
            );
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod conformance {
    //! Shared fixtures for checking that both strategies agree.
    use super::*;
    use crate::models::{Dataset, Record};

    pub fn left_fixture() -> SuffixedDataset {
        Dataset::new(vec![
            Record::instant("bob1", 1519330050, 44.4999, -123.5001),
            Record::instant("bob1", 1519330080, 44.5001, -123.4999),
            Record::instant("sue1", 1519330150, 43.0, -124.0),
            Record::instant("amy1", 1519330100, 44.2, -123.2).with_counts(4, 1),
        ])
        .with_source(Source::One)
    }

    pub fn right_fixture() -> SuffixedDataset {
        Dataset::new(vec![
            Record::session("bob2", 1519330040, 1519330070, 44.50, -123.50),
            Record::session("jake2", 1519333150, 1519333320, 44.0, -123.0),
            Record::instant("amy2", 1519330160, 44.2, -123.2),
            Record::instant("edge2", 1519330210, 44.2, -123.2),
        ])
        .with_source(Source::Two)
    }

    /// Sortable key for comparing pair multisets regardless of row order.
    pub fn pair_keys(pairs: &[CandidatePair]) -> Vec<String> {
        let mut keys: Vec<String> = pairs
            .iter()
            .map(|p| serde_json::to_string(&p.to_row()).unwrap_or_default())
            .collect();
        keys.sort();
        keys
    }
}
