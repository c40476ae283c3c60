//! Ireland environment / population analysis - command line entry point
//!
//! Collects CSO emissions, EPA bathing water and census tables, joins them
//! by county and year, runs the statistical suite and writes an HTML
//! dashboard plus a JSON bundle.
//!
//! Usage:
//!   cargo run --release                      # live fetch, cache fallback
//!   cargo run --release -- --offline         # cache / built-in snapshot only
//!   cargo run --release -- --persist         # also save the run to PostgreSQL
//!   cargo run --release -- --rerun <RUN_ID>  # re-analyze a stored run
//!
//! Environment:
//!   RUST_LOG     - log filter (default: info)
//!   DATABASE_URL - PostgreSQL connection string, needed for --persist and --rerun

use std::env;
use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use envpop_analysis::config;
use envpop_analysis::pipeline::{self, FetchStatus, PipelineOptions};

#[derive(Parser)]
#[command(
    name = "envpop_analysis",
    about = "Correlate Irish emissions, bathing water quality and population by county"
)]
struct Cli {
    /// Configuration file (default: ./analysis.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not contact the CSO API; use cached tables or the built-in snapshot
    #[arg(long)]
    offline: bool,

    /// Save observations, integrated records and results to PostgreSQL
    #[arg(long)]
    persist: bool,

    /// Where to write dashboard.html and analysis.json
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Cache directory for fetched tables
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Re-analyze the observations stored under this run id instead of collecting
    #[arg(long, value_name = "RUN_ID", conflicts_with = "offline")]
    rerun: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let filters = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    pretty_env_logger::formatted_builder().parse_filters(&filters).init();
    let cli = Cli::parse();

    println!("🌿 Ireland Environment & Population Analysis");
    println!("============================================\n");

    let mut config = config::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = cli.cache_dir {
        config.collection.cache_dir = dir;
    }
    let options = PipelineOptions {
        offline: cli.offline,
        persist: cli.persist,
        output_dir: cli.output_dir.unwrap_or_else(|| config.output.dir.clone()),
    };

    let result = match &cli.rerun {
        Some(run_id) => {
            println!("🗄  Re-analyzing stored run {}\n", run_id);
            pipeline::rerun(&config, run_id, &options)
        }
        None => {
            if options.offline {
                println!("📦 Offline: serving every table from cache\n");
            } else {
                println!("📥 Collecting {} tables from {}\n", 2 + config.collection.census.len(), config.collection.base_url);
            }
            pipeline::run(&config, &options)
        }
    };

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("\n❌ Analysis failed: {}\n", e);
            std::process::exit(1);
        }
    };

    for outcome in &summary.collection.outcomes {
        match &outcome.status {
            FetchStatus::Live => println!("   ✓ {} - {} rows", outcome.table, outcome.rows),
            FetchStatus::Offline => println!("   ✓ {} - {} rows (cache)", outcome.table, outcome.rows),
            FetchStatus::Fallback { reason } => {
                println!("   ⚠ {} - {} rows from cache ({})", outcome.table, outcome.rows, reason)
            }
            FetchStatus::Stored { run_id } => {
                println!("   ✓ {} - {} rows (stored run {})", outcome.table, outcome.rows, run_id)
            }
        }
    }

    let bundle = &summary.bundle;
    let diagnostics = &bundle.diagnostics;
    println!("\n📊 Integrated views");
    for (view, count) in &bundle.view_counts {
        println!("   {} - {} records", view.title(), count);
    }
    println!(
        "   {} unmatched rows, {} data errors, {} forward-filled records",
        diagnostics.unmatched_rows(),
        diagnostics.data_error_rows(),
        diagnostics.forward_filled_records
    );

    let computed = bundle.results.iter().filter(|r| r.is_computed()).count();
    println!("\n🔬 {} analyses computed, {} not computed", computed, bundle.results.len() - computed);
    for insight in bundle.insights.iter().take(5) {
        println!("   • {}", insight);
    }

    println!("\n📝 Dashboard: {}", summary.html_path.display());
    println!("   Bundle:    {}", summary.json_path.display());

    if let Some(counts) = summary.persisted {
        println!(
            "\n💾 Saved run {}: {} observations, {} records, {} results",
            bundle.run.run_id, counts.observations, counts.records, counts.results
        );
    }

    Ok(())
}
