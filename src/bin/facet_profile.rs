//! Facet profile: load a synthetic dataset progressively and time queries.
//!
//! Prints per-query timings and the engine metrics snapshot.
//!
//! Run: cargo run --release --bin facet-profile -- --rows 200000

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use facet_engine::{EngineConfig, FilterEngine, FilterState, JobStatus, Record};

#[derive(Parser, Debug)]
#[command(
    name = "facet-profile",
    about = "Profile the faceted filter engine on a synthetic dataset"
)]
struct Args {
    /// Number of synthetic rows.
    #[arg(long, default_value_t = 100_000)]
    rows: usize,

    /// Rows per progressive indexing batch (overrides the config file).
    #[arg(long)]
    batch_size: Option<usize>,

    /// Engine configuration as JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Times each query is repeated (later repeats hit the cache).
    #[arg(long, default_value_t = 3)]
    repeat: usize,
}

// ── Dataset ────────────────────────────────────────────────────────────

const REGIONS: [&str; 5] = ["north", "south", "east", "west", "central"];
const STATUSES: [&str; 3] = ["open", "closed", "pending"];

fn make_records(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            Record::new()
                .with("id", i as f64)
                .with("region", REGIONS[i % REGIONS.len()])
                .with("status", STATUSES[(i / 7) % STATUSES.len()])
                .with("category", format!("cat_{}", i % 40))
                // nearly unique: switches to bucketed options
                .with("amount", ((i * 7919) % 100_003) as f64 / 100.0)
        })
        .collect()
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            EngineConfig::from_json(&json)?
        }
        None => EngineConfig::default(),
    };
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    Ok(config)
}

// ── Main ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .ok();

    let args = Args::parse();
    let config = load_config(&args)?;
    let mut engine = FilterEngine::new(config)?;

    let records = make_records(args.rows);
    info!(rows = records.len(), "Generated synthetic dataset");

    let start = Instant::now();
    let job = engine.start_load(&records)?;
    let status = job.run(&mut engine).await?;
    anyhow::ensure!(
        matches!(status, JobStatus::Complete { .. }),
        "load did not complete: {:?}",
        status
    );
    println!(
        "load       {:>8} rows  {:>10.2?}",
        engine.row_count(),
        start.elapsed()
    );
    for column in engine.indexed_columns() {
        if let Some(index) = engine.index(column) {
            println!(
                "  {:<10} distinct {:>7}  options {:>5}  bucketed {}",
                column,
                index.distinct_count(),
                index.facet_cardinality(),
                index.is_bucketed()
            );
        }
    }

    let queries = [
        ("none", FilterState::new()),
        ("region", FilterState::new().with("region", ["north"])),
        (
            "region+status",
            FilterState::new()
                .with("region", ["north", "east"])
                .with("status", ["open"]),
        ),
        (
            "three",
            FilterState::new()
                .with("region", ["west"])
                .with("status", ["closed", "pending"])
                .with("category", ["cat_3", "cat_8", "cat_13"]),
        ),
        ("impossible", FilterState::new().with("region", ["nowhere"])),
    ];

    println!();
    for (name, state) in &queries {
        for round in 0..args.repeat.max(1) {
            let start = Instant::now();
            let count = engine.filtered_count(state);
            let page = engine.filtered_rows(state, Some(0..50)).len();
            let options = engine.all_options(state);
            let option_total: usize = options.values().map(Vec::len).sum();
            println!(
                "{:<14} round {}  matches {:>8}  page {:>3}  options {:>5}  {:>10.2?}",
                name,
                round,
                count,
                page,
                option_total,
                start.elapsed()
            );
        }
        if let Some(first) = engine.filtered_rows(state, Some(0..1)).first() {
            println!("{:<14} first row {:?}", name, first.to_record());
        }
    }

    let snapshot = engine.metrics().snapshot();
    let cache = engine.cache_stats();
    println!();
    println!(
        "queries {}  p50 {}us  p95 {}us  p99 {}us  avg {}us  slow {}",
        snapshot.query_count,
        snapshot.query_p50_us,
        snapshot.query_p95_us,
        snapshot.query_p99_us,
        snapshot.query_avg_us,
        snapshot.slow_query_count
    );
    println!(
        "cache   entries {}  hits {}  misses {}  evictions {}  hit ratio {:.2}",
        cache.entries,
        cache.hits,
        cache.misses,
        cache.evictions,
        snapshot.cache_hit_ratio()
    );
    for stat in &snapshot.op_stats {
        println!(
            "  {:<18} count {:>6}  avg {:>8}us",
            stat.operation.as_str(),
            stat.count,
            stat.avg_us
        );
    }
    Ok(())
}
