// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

use countmatch_lib::cli::{MatchingArgs, SourceTableArgs};
use countmatch_lib::config::{MatchingConfig, DEFAULT_OCCUPANCY_INTERVAL_SECS};
use countmatch_lib::db::{connect, get_pool_status};
use countmatch_lib::ingest::load_dataset;
use countmatch_lib::matching::JoinEngine;
use countmatch_lib::models::Source;
use countmatch_lib::output::write_json_lines;
use countmatch_lib::pipeline::process_data;
use countmatch_lib::preprocess::{occupancy_level, time_grouping, TimeSelection};
use countmatch_lib::utils::env::load_env;
use countmatch_lib::utils::progress_config::{main_progress_bar, ProgressConfig};

/// Match detections from two mobility sources and emit candidate pairs.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    tables: SourceTableArgs,

    #[command(flatten)]
    matching: MatchingArgs,

    /// Candidate pair output (JSON lines); stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write occupancy bins (JSON lines) to this path
    #[arg(long)]
    occupancy_output: Option<PathBuf>,

    /// Source whose location stands in for each pair: 1 or 2
    #[arg(long, default_value = "1")]
    location_source: String,

    /// Time used for binning: 1, 2 or avg
    #[arg(long, default_value = "1")]
    time_selection: String,

    /// Occupancy bin width in seconds
    #[arg(long, default_value_t = DEFAULT_OCCUPANCY_INTERVAL_SECS)]
    interval_secs: i64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Starting two-source candidate matching");
    load_env();
    let args = Args::parse();
    let start_time = Instant::now();

    let config = args.matching.apply(MatchingConfig::from_env())?;
    let columns1 = args.tables.source_columns(Source::One)?;
    let columns2 = args.tables.source_columns(Source::Two)?;
    // Validate occupancy options before any work is done.
    let occupancy = match &args.occupancy_output {
        Some(path) => Some((
            path,
            args.location_source.parse::<Source>()?,
            args.time_selection.parse::<TimeSelection>()?,
        )),
        None => None,
    };

    let progress_config = ProgressConfig::from_env();
    info!(
        "Progress tracking: enabled={}, detailed={}",
        progress_config.enabled, progress_config.detailed
    );
    let multi_progress = progress_config.create_multi_progress();
    let main_pb = main_progress_bar(multi_progress.as_ref(), 3);

    let run_id = Uuid::new_v4().to_string();
    info!("Run ID: {}", run_id);

    let pool = connect().await.context("Failed to connect to database")?;
    info!("Successfully connected to the database");

    if let Some(pb) = &main_pb {
        pb.set_message("Phase 1: Loading sources");
    }
    let data1 = load_dataset(&pool, args.tables.table(Source::One), &columns1)
        .await
        .context("Failed to load source 1")?;
    let data2 = load_dataset(&pool, args.tables.table(Source::Two), &columns2)
        .await
        .context("Failed to load source 2")?;
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Phase 2: Matching");
    }

    let detailed_progress = if progress_config.should_show_detailed() {
        multi_progress.clone()
    } else {
        None
    };
    let engine = JoinEngine::from_strategy(config.join_strategy, Some(&pool))?.with_progress(detailed_progress);
    let output = process_data(data1, data2, &config, &engine, &run_id).await?;
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Phase 3: Writing output");
    }

    let written = write_json_lines(
        args.output.as_deref(),
        output.candidate_pairs.iter().map(|pair| pair.to_row()),
    )?;
    info!("Wrote {} candidate pairs", written);

    if let Some((path, location, selection)) = occupancy {
        let records = occupancy_level(&output.candidate_pairs, location)?;
        let bins = time_grouping(&records, args.interval_secs, selection)?;
        let written = write_json_lines(Some(path.as_path()), &bins)?;
        info!("Wrote {} occupancy bins to {}", written, path.display());
    }

    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.finish_with_message("Matching complete");
    }

    let (connections, idle) = get_pool_status(&pool);
    info!("DB pool at exit: {} connections, {} idle", connections, idle);
    info!(
        "Run {} finished in {:.2?} ({:.2}s in matching stages)",
        run_id,
        start_time.elapsed(),
        output.stats.total_seconds()
    );
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&output.stats).context("Failed to serialize run summary")?
    );
    Ok(())
}
