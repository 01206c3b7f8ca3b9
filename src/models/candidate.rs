// src/models/candidate.rs
use serde::{Deserialize, Serialize};

use super::record::{Record, Source, TimeField, TimeValue};

/// A tentative match: one record from each source that survived the time
/// join and the distance filter.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePair {
    pub record1: Record,
    pub record2: Record,
}

impl CandidatePair {
    pub fn new(record1: Record, record2: Record) -> Self {
        Self { record1, record2 }
    }

    pub fn record(&self, source: Source) -> &Record {
        match source {
            Source::One => &self.record1,
            Source::Two => &self.record2,
        }
    }

    pub fn record_mut(&mut self, source: Source) -> &mut Record {
        match source {
            Source::One => &mut self.record1,
            Source::Two => &mut self.record2,
        }
    }

    /// `(element_id1, element_id2)`, the key NPMI scores are computed over.
    pub fn identifier_pair(&self) -> (&str, &str) {
        (&self.record1.element_id, &self.record2.element_id)
    }

    /// Flattens the pair into suffixed output columns.
    pub fn to_row(&self) -> CandidateRow {
        let r1 = &self.record1;
        let r2 = &self.record2;
        CandidateRow {
            element_id1: r1.element_id.clone(),
            timestamp1: r1.time.field(TimeField::Timestamp).copied(),
            session_start1: r1.time.field(TimeField::SessionStart).copied(),
            session_end1: r1.time.field(TimeField::SessionEnd).copied(),
            lat1: r1.lat,
            lon1: r1.lon,
            boardings1: r1.boardings,
            alightings1: r1.alightings,
            element_id2: r2.element_id.clone(),
            timestamp2: r2.time.field(TimeField::Timestamp).copied(),
            session_start2: r2.time.field(TimeField::SessionStart).copied(),
            session_end2: r2.time.field(TimeField::SessionEnd).copied(),
            lat2: r2.lat,
            lon2: r2.lon,
            boardings2: r2.boardings,
            alightings2: r2.alightings,
        }
    }
}

/// Output row of the pairwise filter. Absent time or count columns are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRow {
    pub element_id1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp1: Option<TimeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_start1: Option<TimeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_end1: Option<TimeValue>,
    pub lat1: f64,
    pub lon1: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boardings1: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alightings1: Option<u32>,
    pub element_id2: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp2: Option<TimeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_start2: Option<TimeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_end2: Option<TimeValue>,
    pub lat2: f64,
    pub lon2: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boardings2: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alightings2: Option<u32>,
}

/// NPMI score for one distinct `(element_id1, element_id2)` combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierPairStat {
    pub element_id1: String,
    pub element_id2: String,
    pub ids_count: usize,
    pub id1_count: usize,
    pub id2_count: usize,
    pub total: usize,
    pub npmi: f64,
}
