// src/pipeline.rs
use anyhow::Result;
use chrono::Utc;
use std::time::Instant;

use crate::config::MatchingConfig;
use crate::matching::npmi::{filter_by_npmi, npmi};
use crate::matching::pairwise::pairwise_filter_tracked;
use crate::matching::range_join::RangeJoin;
use crate::models::{CandidatePair, Dataset, IdentifierPairStat, PipelineStats};
use crate::utils::logging::{log_pipeline_completion, log_pipeline_start, Stage, StageLogger};

/// Everything a matching run hands back to the caller.
#[derive(Debug)]
pub struct PipelineOutput {
    pub candidate_pairs: Vec<CandidatePair>,
    /// Present only when NPMI scoring ran.
    pub npmi_scores: Option<Vec<IdentifierPairStat>>,
    pub stats: PipelineStats,
}

/// Runs the pairwise filter and, when `config.run_npmi` is set, NPMI scoring
/// followed by the threshold filter.
pub async fn process_data<J: RangeJoin>(
    data1: Dataset,
    data2: Dataset,
    config: &MatchingConfig,
    joiner: &J,
    run_id: &str,
) -> Result<PipelineOutput> {
    let start_time = Instant::now();
    let mut stats = PipelineStats::new(run_id, Utc::now().naive_utc(), joiner.strategy().as_str());
    log_pipeline_start(run_id, config, data1.len(), data2.len());

    let candidate_pairs = pairwise_filter_tracked(
        data1,
        data2,
        config.session_limit,
        config.detection_distance,
        config.detection_time,
        joiner,
        &mut stats,
    )
    .await?;

    let (candidate_pairs, npmi_scores) = if config.run_npmi {
        let logger = StageLogger::new(Stage::Npmi);
        let scores = npmi(&candidate_pairs);
        logger.log_phase(
            "scored",
            Some(format!("{} identifier pairs from {} rows", scores.len(), candidate_pairs.len()).as_str()),
        );
        stats.record_stage(
            Stage::Npmi.as_str(),
            candidate_pairs.len(),
            scores.len(),
            logger.get_elapsed().as_secs_f64(),
        );
        stats.scored_identifier_pairs = Some(scores.len());

        let logger = StageLogger::new(Stage::Threshold);
        let rows_in = candidate_pairs.len();
        let kept = filter_by_npmi(candidate_pairs, &scores, config.min_npmi);
        logger.log_filtering_results(rows_in, kept.len());
        stats.record_stage(Stage::Threshold.as_str(), rows_in, kept.len(), logger.get_elapsed().as_secs_f64());
        (kept, Some(scores))
    } else {
        (candidate_pairs, None)
    };

    stats.retained_pairs = candidate_pairs.len();
    log_pipeline_completion(run_id, start_time.elapsed(), stats.candidate_pairs, stats.retained_pairs);

    Ok(PipelineOutput {
        candidate_pairs,
        npmi_scores,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::range_join::InMemoryJoin;
    use crate::models::Record;

    fn source1() -> Dataset {
        let mut records = Vec::new();
        for i in 0..5 {
            records.push(Record::instant("bob1", 1519330000 + i * 1000, 44.5, -123.5));
            records.push(Record::instant("sue1", 1519330010 + i * 1000, 44.5, -123.5));
        }
        Dataset::new(records)
    }

    fn source2() -> Dataset {
        let mut records = Vec::new();
        for i in 0..5 {
            records.push(Record::session("bob2", 1519330005 + i * 1000, 1519330050 + i * 1000, 44.5, -123.5));
        }
        // A second device seen once, near both bob1 and sue1.
        records.push(Record::instant("ann2", 1519330015, 44.5, -123.5));
        Dataset::new(records)
    }

    #[tokio::test]
    async fn test_without_npmi_returns_unscored_pairs() {
        let config = MatchingConfig::default();
        let output = process_data(source1(), source2(), &config, &InMemoryJoin::new(), "run-a")
            .await
            .unwrap();

        assert!(output.npmi_scores.is_none());
        assert_eq!(output.stats.scored_identifier_pairs, None);
        // bob1 and sue1 each meet bob2 five times; both meet ann2 in the first round.
        assert_eq!(output.candidate_pairs.len(), 12);
        assert_eq!(output.stats.retained_pairs, 12);
        assert_eq!(output.stats.run_id, "run-a");
    }

    #[tokio::test]
    async fn test_with_npmi_scores_and_filters() {
        let config = MatchingConfig {
            run_npmi: true,
            min_npmi: 0.0,
            ..MatchingConfig::default()
        };
        let output = process_data(source1(), source2(), &config, &InMemoryJoin::new(), "run-b")
            .await
            .unwrap();

        let scores = output.npmi_scores.unwrap();
        assert_eq!(scores.len(), 4);
        assert!(scores.iter().all(|s| s.total == 12));
        assert!(scores.iter().all(|s| (-1.0..=1.0).contains(&s.npmi)));
        assert_eq!(output.stats.scored_identifier_pairs, Some(4));
        assert_eq!(output.stats.candidate_pairs, 12);
        assert!(output.stats.retained_pairs <= 12);
        assert!(output
            .candidate_pairs
            .iter()
            .all(|p| scores
                .iter()
                .any(|s| (s.element_id1.as_str(), s.element_id2.as_str()) == p.identifier_pair()
                    && s.npmi >= 0.0)));
        let stage_names: Vec<&str> = output.stats.stages.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(stage_names.last(), Some(&"npmi_threshold"));
    }

    #[tokio::test]
    async fn test_empty_result_is_not_an_error() {
        let config = MatchingConfig {
            run_npmi: true,
            ..MatchingConfig::default()
        };
        let output = process_data(Dataset::default(), Dataset::default(), &config, &InMemoryJoin::new(), "run-c")
            .await
            .unwrap();
        assert!(output.candidate_pairs.is_empty());
        assert_eq!(output.npmi_scores.map(|s| s.len()), Some(0));
    }
}
