// src/bin/score_pairs.rs
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

use countmatch_lib::cli::{MatchingArgs, SourceTableArgs};
use countmatch_lib::config::MatchingConfig;
use countmatch_lib::db::connect;
use countmatch_lib::ingest::load_dataset;
use countmatch_lib::matching::{npmi, pairwise_filter, JoinEngine};
use countmatch_lib::models::Source;
use countmatch_lib::output::write_json_lines;
use countmatch_lib::utils::env::load_env;

/// Score co-occurring identifier pairs between two sources by NPMI.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct ScoreArgs {
    #[command(flatten)]
    tables: SourceTableArgs,

    #[command(flatten)]
    matching: MatchingArgs,

    /// Output path (JSON lines); stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Only write pairs scoring at least the configured minimum NPMI
    #[arg(long)]
    above_threshold: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    let args = ScoreArgs::parse();
    let start_time = Instant::now();
    let run_id = Uuid::new_v4().to_string();
    info!("Starting identifier pair scoring (run ID: {})", run_id);

    let config = args.matching.apply(MatchingConfig::from_env())?;
    config.log_config();
    let columns1 = args.tables.source_columns(Source::One)?;
    let columns2 = args.tables.source_columns(Source::Two)?;

    let pool = connect().await.context("Failed to connect to database")?;
    let data1 = load_dataset(&pool, args.tables.table(Source::One), &columns1)
        .await
        .context("Failed to load source 1")?;
    let data2 = load_dataset(&pool, args.tables.table(Source::Two), &columns2)
        .await
        .context("Failed to load source 2")?;

    let engine = JoinEngine::from_strategy(config.join_strategy, Some(&pool))?;
    let pairs = pairwise_filter(
        data1,
        data2,
        config.session_limit,
        config.detection_distance,
        config.detection_time,
        &engine,
    )
    .await?;

    let mut scores = npmi(&pairs);
    scores.sort_by(|a, b| b.npmi.total_cmp(&a.npmi));
    if args.above_threshold {
        scores.retain(|s| s.npmi >= config.min_npmi);
    }

    let written = write_json_lines(args.output.as_deref(), &scores)?;
    info!(
        "Scored {} candidate pairs into {} identifier pairs in {:.2?}",
        pairs.len(),
        written,
        start_time.elapsed()
    );
    Ok(())
}
