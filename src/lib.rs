pub mod cli;
pub mod config;
pub mod db;
pub mod ingest;
pub mod matching;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod preprocess;
pub mod utils;

pub use config::{JoinStrategy, MatchingConfig};
pub use models::*;
pub use pipeline::{process_data, PipelineOutput};
