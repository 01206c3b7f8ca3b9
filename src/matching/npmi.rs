// src/matching/npmi.rs
//! Normalized Pointwise Mutual Information over candidate identifier pairs,
//! and the threshold filter that keeps pairs whose identifiers co-occur more
//! than chance would suggest.

use log::debug;
use std::collections::HashMap;

use crate::models::{CandidatePair, IdentifierPairStat};

/// NPMI from raw counts.
///
/// `pmi = ln(p(x,y) / (p(x)·p(y)))` and `npmi = pmi / -ln(p(x,y))`. When the pair
/// accounts for every row, `p(x,y) = 1` and the normalizer is zero; that pair
/// co-occurs perfectly, so the limit value 1.0 is returned. Results are clamped
/// to `[-1, 1]`.
pub fn npmi_from_counts(ids_count: usize, id1_count: usize, id2_count: usize, total: usize) -> f64 {
    if ids_count == 0 || total == 0 {
        return -1.0;
    }
    if ids_count == total {
        return 1.0;
    }
    let total = total as f64;
    let p_xy = ids_count as f64 / total;
    let p_x = id1_count as f64 / total;
    let p_y = id2_count as f64 / total;

    let pmi = (p_xy / (p_x * p_y)).ln();
    (pmi / -p_xy.ln()).clamp(-1.0, 1.0)
}

/// One statistic per distinct `(element_id1, element_id2)`, sorted by
/// identifier pair. Pairs that never co-occur have no row.
pub fn npmi(pairs: &[CandidatePair]) -> Vec<IdentifierPairStat> {
    let total = pairs.len();
    let mut ids_counts: HashMap<(&str, &str), usize> = HashMap::new();
    let mut id1_counts: HashMap<&str, usize> = HashMap::new();
    let mut id2_counts: HashMap<&str, usize> = HashMap::new();

    for pair in pairs {
        let (id1, id2) = pair.identifier_pair();
        *ids_counts.entry((id1, id2)).or_insert(0) += 1;
        *id1_counts.entry(id1).or_insert(0) += 1;
        *id2_counts.entry(id2).or_insert(0) += 1;
    }

    let mut stats: Vec<IdentifierPairStat> = ids_counts
        .into_iter()
        .map(|((id1, id2), ids_count)| {
            let id1_count = id1_counts[id1];
            let id2_count = id2_counts[id2];
            IdentifierPairStat {
                element_id1: id1.to_string(),
                element_id2: id2.to_string(),
                ids_count,
                id1_count,
                id2_count,
                total,
                npmi: npmi_from_counts(ids_count, id1_count, id2_count, total),
            }
        })
        .collect();
    stats.sort_by(|a, b| {
        (a.element_id1.as_str(), a.element_id2.as_str())
            .cmp(&(b.element_id1.as_str(), b.element_id2.as_str()))
    });

    debug!("NPMI: {} rows -> {} identifier pairs", total, stats.len());
    stats
}

/// Keeps candidate rows whose identifier pair scored at least `min_npmi`.
/// Rows whose pair has no score are dropped.
pub fn filter_by_npmi(
    pairs: Vec<CandidatePair>,
    scores: &[IdentifierPairStat],
    min_npmi: f64,
) -> Vec<CandidatePair> {
    let passing: HashMap<(&str, &str), f64> = scores
        .iter()
        .filter(|s| s.npmi >= min_npmi)
        .map(|s| ((s.element_id1.as_str(), s.element_id2.as_str()), s.npmi))
        .collect();

    let before = pairs.len();
    let kept: Vec<CandidatePair> = pairs
        .into_iter()
        .filter(|pair| passing.contains_key(&pair.identifier_pair()))
        .collect();
    debug!(
        "NPMI threshold filter: {} -> {} rows ({} passing identifier pairs, min {})",
        before,
        kept.len(),
        passing.len(),
        min_npmi
    );
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;

    fn pair(id1: &str, id2: &str) -> CandidatePair {
        CandidatePair::new(
            Record::instant(id1, 0, 44.5, -123.5),
            Record::instant(id2, 0, 44.5, -123.5),
        )
    }

    fn stat(id1: &str, id2: &str, npmi: f64) -> IdentifierPairStat {
        IdentifierPairStat {
            element_id1: id1.to_string(),
            element_id2: id2.to_string(),
            ids_count: 1,
            id1_count: 1,
            id2_count: 1,
            total: 1,
            npmi,
        }
    }

    #[test]
    fn test_single_pair_is_perfect_cooccurrence() {
        let stats = npmi(&[pair("bob1", "bob2"), pair("bob1", "bob2")]);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].ids_count, 2);
        assert_eq!(stats[0].total, 2);
        assert_eq!(stats[0].npmi, 1.0);
    }

    #[test]
    fn test_independent_identifiers_score_zero() {
        // Every id1 meets every id2 equally often.
        let pairs = vec![
            pair("a", "x"),
            pair("a", "y"),
            pair("b", "x"),
            pair("b", "y"),
        ];
        for s in npmi(&pairs) {
            assert!(s.npmi.abs() < 1e-12, "{:?}", s);
        }
    }

    #[test]
    fn test_exclusive_pairs_score_high() {
        let mut pairs = Vec::new();
        for _ in 0..10 {
            pairs.push(pair("bob1", "bob2"));
            pairs.push(pair("sue1", "sue2"));
        }
        pairs.push(pair("bob1", "sue2"));

        let stats = npmi(&pairs);
        let score = |a: &str, b: &str| {
            stats
                .iter()
                .find(|s| s.element_id1 == a && s.element_id2 == b)
                .map(|s| s.npmi)
                .unwrap()
        };
        assert!(score("bob1", "bob2") > 0.5);
        assert!(score("sue1", "sue2") > 0.5);
        assert!(score("bob1", "sue2") < score("bob1", "bob2"));
        assert!(stats.iter().all(|s| s.element_id1 != "sue1" || s.element_id2 != "bob2"));
    }

    #[test]
    fn test_npmi_bounds() {
        let ids = ["a", "b", "c", "d"];
        let mut pairs = Vec::new();
        for (i, x) in ids.iter().enumerate() {
            for (j, y) in ids.iter().enumerate() {
                for _ in 0..((i * 3 + j * 7) % 5) {
                    pairs.push(pair(x, y));
                }
            }
        }
        let stats = npmi(&pairs);
        assert!(!stats.is_empty());
        for s in stats {
            assert!((-1.0..=1.0).contains(&s.npmi), "{:?}", s);
        }
    }

    #[test]
    fn test_npmi_from_counts_edge_cases() {
        assert_eq!(npmi_from_counts(5, 5, 5, 5), 1.0);
        assert_eq!(npmi_from_counts(0, 3, 3, 10), -1.0);
        assert_eq!(npmi_from_counts(0, 0, 0, 0), -1.0);
        // p(x,y) = p(x) = p(y): perfect association below the degenerate case.
        assert!((npmi_from_counts(2, 2, 2, 4) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_input() {
        assert!(npmi(&[]).is_empty());
    }

    #[test]
    fn test_threshold_filter_inner_join() {
        let pairs = vec![
            pair("bob1", "bob2"),
            pair("sue1", "susan1"),
            pair("bob1", "bob2"),
            pair("jake1", "jake2"),
        ];
        let scores = vec![stat("bob1", "bob2", 0.6), stat("sue1", "susan1", 0.4)];

        let kept = filter_by_npmi(pairs, &scores, 0.5);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|p| p.identifier_pair() == ("bob1", "bob2")));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let kept = filter_by_npmi(vec![pair("a", "b")], &[stat("a", "b", 0.5)], 0.5);
        assert_eq!(kept.len(), 1);
    }
}
