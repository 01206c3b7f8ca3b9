pub mod candidate;
pub mod record;
pub mod stats_models;

pub use candidate::{CandidatePair, CandidateRow, IdentifierPairStat};
pub use record::{Dataset, Record, RecordTime, Source, SuffixedDataset, TimeField, TimeValue};
pub use stats_models::{PipelineStats, StageStats};
