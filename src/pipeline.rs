/// One end-to-end analysis run: collect → join → analyze → report → persist.
///
/// Collection fans the configured tables out over a worker pool. Each
/// table is fetched live unless running offline; a failed live fetch falls
/// back to the cache (or built-in snapshot) and the dataset is flagged as
/// served from cache in the bundle. Everything after collection is the
/// synchronous in-memory core.
///
/// A stored run can also be re-analyzed: its observations are reloaded from
/// PostgreSQL instead of collected, then go through the same core.

use std::path::PathBuf;
use std::sync::mpsc;

use chrono::Utc;
use threadpool::ThreadPool;

use crate::analysis::analyzer::{self, AnalysisBundle, RunContext};
use crate::analysis::join::{Integration, Joiner};
use crate::config::{AnalysisConfig, ConfigError};
use crate::db::{self, DbConfigError};
use crate::ingest::DatasetSource;
use crate::ingest::cso;
use crate::model::{DatasetId, RawObservation};
use crate::report::{self, ReportError};
use crate::store::{self, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("collection worker for {table} stopped without reporting")]
    WorkerLost { table: String },

    #[error("no observations stored for run {run_id}")]
    UnknownRun { run_id: String },

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Database(#[from] DbConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Run-time switches, normally from the command line.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Skip the network and serve every table from cache.
    pub offline: bool,
    /// Save rows, records and results to PostgreSQL.
    pub persist: bool,
    pub output_dir: PathBuf,
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum FetchStatus {
    Live,
    /// Live fetch failed; rows came from the cache.
    Fallback { reason: String },
    Offline,
    /// Reloaded from the observations of a stored run.
    Stored { run_id: String },
}

#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub table: String,
    pub dataset: DatasetId,
    pub status: FetchStatus,
    pub rows: usize,
}

#[derive(Debug, Default)]
pub struct Collection {
    pub rows: Vec<RawObservation>,
    pub outcomes: Vec<SourceOutcome>,
}

impl Collection {
    /// Datasets with at least one table served from cache, sorted and unique.
    pub fn served_from_cache(&self) -> Vec<DatasetId> {
        let mut datasets: Vec<DatasetId> = self
            .outcomes
            .iter()
            .filter(|o| matches!(o.status, FetchStatus::Fallback { .. } | FetchStatus::Offline))
            .map(|o| o.dataset)
            .collect();
        datasets.sort();
        datasets.dedup();
        datasets
    }
}

/// Live first (unless offline), cache on failure.
pub fn collect_one(source: &dyn DatasetSource, offline: bool) -> (Vec<RawObservation>, SourceOutcome) {
    let (rows, status) = if offline {
        (source.fetch_cached(), FetchStatus::Offline)
    } else {
        match source.fetch_live() {
            Ok(rows) => {
                if let Err(e) = source.store_cache(&rows) {
                    log::warn!("{}: could not update cache: {}", source.name(), e);
                }
                (rows, FetchStatus::Live)
            }
            Err(e) => {
                log::warn!("{}: live fetch failed, serving from cache: {}", source.name(), e);
                (source.fetch_cached(), FetchStatus::Fallback { reason: e.to_string() })
            }
        }
    };

    let outcome = SourceOutcome {
        table: source.name().to_string(),
        dataset: source.dataset(),
        status,
        rows: rows.len(),
    };
    (rows, outcome)
}

/// Collects every source on a pool of `workers` threads. Rows are returned
/// in source order regardless of completion order.
pub fn collect(
    sources: Vec<Box<dyn DatasetSource>>,
    workers: usize,
    offline: bool,
) -> Result<Collection, PipelineError> {
    let tables: Vec<String> = sources.iter().map(|s| s.name().to_string()).collect();
    let pool = ThreadPool::new(workers.max(1));
    let (tx, rx) = mpsc::channel();

    for (idx, source) in sources.into_iter().enumerate() {
        let tx = tx.clone();
        pool.execute(move || {
            let result = collect_one(source.as_ref(), offline);
            // Receiver outlives the pool; a send error means collection was abandoned.
            let _ = tx.send((idx, result));
        });
    }
    drop(tx);

    let mut results: Vec<(usize, (Vec<RawObservation>, SourceOutcome))> = rx.iter().collect();
    results.sort_by_key(|(idx, _)| *idx);

    if results.len() < tables.len() {
        let reported: Vec<usize> = results.iter().map(|(idx, _)| *idx).collect();
        let lost = (0..tables.len())
            .find(|idx| !reported.contains(idx))
            .map(|idx| tables[idx].clone())
            .unwrap_or_default();
        return Err(PipelineError::WorkerLost { table: lost });
    }

    let mut collection = Collection::default();
    for (_, (rows, outcome)) in results {
        log::info!("{}: {} rows ({:?})", outcome.table, outcome.rows, outcome.status);
        collection.rows.extend(rows);
        collection.outcomes.push(outcome);
    }
    Ok(collection)
}

/// Wraps rows reloaded per dataset from `run_id` as a collection.
///
/// # Errors
/// `PipelineError::UnknownRun` when no dataset has any rows.
pub fn stored_collection(
    run_id: &str,
    by_dataset: Vec<(DatasetId, Vec<RawObservation>)>,
) -> Result<Collection, PipelineError> {
    let mut collection = Collection::default();
    for (dataset, rows) in by_dataset {
        collection.outcomes.push(SourceOutcome {
            table: dataset.as_str().to_string(),
            dataset,
            status: FetchStatus::Stored { run_id: run_id.to_string() },
            rows: rows.len(),
        });
        collection.rows.extend(rows);
    }
    if collection.rows.is_empty() {
        return Err(PipelineError::UnknownRun { run_id: run_id.to_string() });
    }
    Ok(collection)
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Row counts written by [`persist`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistCounts {
    pub observations: usize,
    pub records: usize,
    pub results: usize,
}

pub struct RunSummary {
    pub collection: Collection,
    pub integration: Integration,
    pub bundle: AnalysisBundle,
    pub html_path: PathBuf,
    pub json_path: PathBuf,
    pub persisted: Option<PersistCounts>,
}

/// Join and analyze already-collected rows.
pub fn analyze_rows(
    joiner: &Joiner,
    rows: &[RawObservation],
    run: RunContext,
) -> Result<(Integration, AnalysisBundle), PipelineError> {
    let integration = joiner.join(rows)?;
    let bundle = analyzer::analyze(&integration, run);
    Ok((integration, bundle))
}

/// Saves the run, its raw rows, every integrated view and the flattened results.
pub fn persist(
    rows: &[RawObservation],
    integration: &Integration,
    bundle: &AnalysisBundle,
) -> Result<PersistCounts, PipelineError> {
    let mut client = db::connect_and_verify()?;
    let run_id = bundle.run.run_id.as_str();

    store::save_run(&mut client, &bundle.run)?;
    let mut counts = PersistCounts {
        observations: store::save_observations(&mut client, run_id, rows)?,
        ..PersistCounts::default()
    };
    for records in integration.views.values() {
        counts.records += store::save_records(&mut client, run_id, records)?;
    }
    counts.results = store::save_results(&mut client, run_id, &bundle.results)?;
    Ok(counts)
}

/// Full run with the configured CSO tables.
pub fn run(config: &AnalysisConfig, options: &PipelineOptions) -> Result<RunSummary, PipelineError> {
    config.validate()?;
    let joiner = Joiner::from_config(config)?;

    let sources: Vec<Box<dyn DatasetSource>> = cso::configured_sources(&config.collection)
        .into_iter()
        .map(|s| Box::new(s) as Box<dyn DatasetSource>)
        .collect();
    let collection = collect(sources, config.collection.workers, options.offline)?;
    finish(&joiner, collection, options)
}

/// Re-analyzes the observations saved under `stored_run_id` with the
/// current configuration. Nothing is fetched; the result is a new run.
pub fn rerun(
    config: &AnalysisConfig,
    stored_run_id: &str,
    options: &PipelineOptions,
) -> Result<RunSummary, PipelineError> {
    config.validate()?;
    let joiner = Joiner::from_config(config)?;

    let mut client = db::connect_and_verify()?;
    let mut by_dataset = Vec::new();
    for dataset in DatasetId::ALL {
        by_dataset.push((dataset, store::load_observations(&mut client, dataset, stored_run_id)?));
    }
    let collection = stored_collection(stored_run_id, by_dataset)?;
    log::info!("Reloaded {} rows from run {}", collection.rows.len(), stored_run_id);

    finish(&joiner, collection, options)
}

// Shared tail of a run: analyze, write reports, optionally persist.
fn finish(
    joiner: &Joiner,
    collection: Collection,
    options: &PipelineOptions,
) -> Result<RunSummary, PipelineError> {
    let mut run = RunContext::new(Utc::now());
    run.served_from_cache = collection.served_from_cache();
    let (integration, bundle) = analyze_rows(joiner, &collection.rows, run)?;

    let (html_path, json_path) = report::write_reports(&options.output_dir, &bundle)?;

    let persisted = if options.persist {
        Some(persist(&collection.rows, &integration, &bundle)?)
    } else {
        None
    };

    Ok(RunSummary {
        collection,
        integration,
        bundle,
        html_path,
        json_path,
        persisted,
    })
}
