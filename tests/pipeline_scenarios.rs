/// End-to-end scenarios for the analysis pipeline
///
/// These tests drive the public API the way the binary does:
/// 1. Proportional allocation joined with water quality (three-county case)
/// 2. Unmatched county labels excluded from every view and counted
/// 3. Census forward-fill in view 3, never backwards
/// 4. Collection fallback from a failing live source to cache
/// 5. A full offline run over the built-in snapshot, written to disk
/// 6. Persistence round trip and re-analysis of a stored run
///    (ignored unless a database is available)
///
/// Run with: cargo test --test pipeline_scenarios
/// Database test: cargo test --test pipeline_scenarios -- --ignored

use chrono::{TimeZone, Utc};
use envpop_analysis::analysis::analyzer::{RunContext, analyze};
use envpop_analysis::analysis::join::{Integration, Joiner};
use envpop_analysis::config::{AnalysisConfig, parse_config};
use envpop_analysis::counties::CountyKey;
use envpop_analysis::ingest::{DatasetSource, FetchError};
use envpop_analysis::model::{AnalysisKind, DatasetId, IntegratedRecord, RawObservation, ViewKind};
use envpop_analysis::pipeline::{self, FetchStatus, PipelineOptions};
use envpop_analysis::report;
use std::fs;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn co2_config() -> AnalysisConfig {
    parse_config(
        r#"
        [pollution_index.weights]
        CO2 = 1.0
        "#,
    )
    .expect("valid config")
}

fn join(rows: &[RawObservation]) -> Integration {
    Joiner::from_config(&co2_config())
        .expect("joiner")
        .join(rows)
        .expect("join")
}

fn record(integration: &Integration, view: ViewKind, county: &str, year: i32) -> Option<IntegratedRecord> {
    let county = CountyKey::from_canonical(county).expect("registry county");
    integration
        .view(view)
        .iter()
        .find(|r| r.county == county && r.year == year)
        .cloned()
}

fn emissions(year: i32, value: f64) -> RawObservation {
    RawObservation::new(DatasetId::Pollution, "State", year, "Carbon dioxide (CO2)", value)
}

fn census(region: &str, year: i32, population: f64) -> RawObservation {
    RawObservation::new(DatasetId::Population, region, year, "Population", population)
}

fn bathing(region: &str, year: i32, rating: &str, sites: f64) -> RawObservation {
    RawObservation::new(DatasetId::WaterQuality, region, year, rating, sites)
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("envpop_it_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

// ---------------------------------------------------------------------------
// 1. Allocation joined with water quality
// ---------------------------------------------------------------------------

#[test]
fn test_three_county_allocation_end_to_end() {
    let rows = vec![
        emissions(2022, 1000.0),
        census("Co. Carlow", 2022, 100.0),
        census("Cavan", 2022, 300.0),
        census("County Clare", 2022, 600.0),
        bathing("Cavan County Council", 2022, "Good", 2.0),
    ];
    let integration = join(&rows);

    let estimates: Vec<Option<f64>> = ["Carlow", "Cavan", "Clare"]
        .iter()
        .map(|c| record(&integration, ViewKind::PollutionPopulation, c, 2022).and_then(|r| r.estimated_county_emissions))
        .collect();
    assert_eq!(estimates, vec![Some(100.0), Some(300.0), Some(600.0)]);

    let cavan = record(&integration, ViewKind::PollutionWater, "Cavan", 2022).expect("Cavan 2022");
    assert_eq!(cavan.water_quality_score, Some(3.0));
    assert_eq!(cavan.estimated_county_emissions, Some(300.0));
    assert_eq!(cavan.emissions_per_capita, Some(1.0));
}

// ---------------------------------------------------------------------------
// 2. Unmatched labels
// ---------------------------------------------------------------------------

#[test]
fn test_unmatched_label_is_reported_and_excluded() {
    let rows = vec![
        emissions(2022, 1000.0),
        census("Laois", 2022, 91_877.0),
        census("Co. Leix", 2022, 500.0),
        bathing("Co. Leix", 2022, "Excellent", 1.0),
    ];
    let integration = join(&rows);

    assert_eq!(integration.diagnostics.unmatched_regions.get("Co. Leix"), Some(&2));
    for view in ViewKind::ALL {
        assert!(integration.view(view).iter().all(|r| r.county.name() == "Laois"));
    }
    let laois = record(&integration, ViewKind::PollutionPopulation, "Laois", 2022).unwrap();
    assert_eq!(laois.estimated_county_emissions, Some(1000.0), "Laois holds the whole matched population");

    let bundle = analyze(&integration, RunContext::new(Utc::now()));
    let html = report::render_html(&bundle);
    assert!(html.contains("Co. Leix"));
}

// ---------------------------------------------------------------------------
// 3. Forward fill
// ---------------------------------------------------------------------------

#[test]
fn test_single_census_carries_forward_only() {
    let mut rows = vec![census("Galway", 2022, 277_737.0)];
    for year in 2021..=2024 {
        rows.push(bathing("Galway County Council", year, "Excellent", 20.0));
    }
    let integration = join(&rows);

    let y2021 = record(&integration, ViewKind::WaterPopulation, "Galway", 2021).unwrap();
    assert_eq!(y2021.population, None);
    assert!(!y2021.is_forward_filled);

    for year in [2023, 2024] {
        let r = record(&integration, ViewKind::WaterPopulation, "Galway", year).unwrap();
        assert_eq!(r.population, Some(277_737));
        assert!(r.is_forward_filled, "{} should be flagged", year);
    }

    // View 2 never forward-fills.
    let view2 = record(&integration, ViewKind::PollutionWater, "Galway", 2023).unwrap();
    assert_eq!(view2.population, None);
}

#[test]
fn test_two_censuses_fill_from_the_earlier_one() {
    let rows = vec![
        census("Donegal", 2016, 159_192.0),
        census("Donegal", 2022, 167_084.0),
        bathing("Donegal County Council", 2021, "Good", 6.0),
    ];
    let integration = join(&rows);

    let r = record(&integration, ViewKind::WaterPopulation, "Donegal", 2021).unwrap();
    assert_eq!(r.population, Some(159_192));
    assert!(r.is_forward_filled);
}

// ---------------------------------------------------------------------------
// 4. Collection fallback
// ---------------------------------------------------------------------------

struct UnreachableSource;

impl DatasetSource for UnreachableSource {
    fn dataset(&self) -> DatasetId {
        DatasetId::WaterQuality
    }

    fn name(&self) -> &str {
        "EPA02"
    }

    fn fetch_live(&self) -> Result<Vec<RawObservation>, FetchError> {
        Err(FetchError::Status { table: "EPA02".to_string(), status: 502 })
    }

    fn fetch_cached(&self) -> Vec<RawObservation> {
        vec![bathing("Sligo County Council", 2023, "Excellent", 8.0)]
    }

    fn store_cache(&self, _rows: &[RawObservation]) -> Result<(), FetchError> {
        panic!("a failed fetch must not overwrite the cache");
    }
}

#[test]
fn test_failed_live_fetch_is_served_from_cache() {
    let sources: Vec<Box<dyn DatasetSource>> = vec![Box::new(UnreachableSource)];
    let collection = pipeline::collect(sources, 2, false).unwrap();

    assert_eq!(collection.rows.len(), 1);
    assert!(matches!(collection.outcomes[0].status, FetchStatus::Fallback { .. }));
    assert_eq!(collection.served_from_cache(), vec![DatasetId::WaterQuality]);
}

// ---------------------------------------------------------------------------
// 5. Offline run over the snapshot
// ---------------------------------------------------------------------------

#[test]
fn test_offline_snapshot_run_writes_reports() {
    let cache_dir = scratch_dir("cache");
    let output_dir = scratch_dir("output");

    let mut config = AnalysisConfig::default();
    config.collection.cache_dir = cache_dir.clone();
    let options = PipelineOptions {
        offline: true,
        persist: false,
        output_dir: output_dir.clone(),
    };

    let summary = pipeline::run(&config, &options).expect("offline run");
    let bundle = &summary.bundle;

    // 26 counties x 3 censuses; 18 counties with bathing water x 4 seasons.
    assert_eq!(bundle.view_counts[&ViewKind::PollutionPopulation], 78);
    assert_eq!(bundle.view_counts[&ViewKind::PollutionWater], 72);
    assert_eq!(bundle.view_counts[&ViewKind::WaterPopulation], 72);

    let diagnostics = &bundle.diagnostics;
    assert_eq!(diagnostics.unmatched_rows(), 0);
    assert_eq!(diagnostics.data_error_rows(), 0);
    assert_eq!(diagnostics.national_rows_skipped, 3, "one State row per census");
    assert_eq!(diagnostics.forward_filled_records, 54, "2021, 2023 and 2024 carry a prior census");
    assert!(diagnostics.counties_without_data.is_empty());
    assert_eq!(diagnostics.allocation_failures.keys().copied().collect::<Vec<_>>(), vec![2024]);

    assert_eq!(bundle.pollution_index.len(), 15);
    assert!(bundle.national_pollution_trend.not_computed_reason.is_none());
    assert!(bundle.results.iter().any(|r| r.kind == AnalysisKind::Correlation && r.is_computed()));
    assert!(bundle.results.iter().any(|r| r.kind == AnalysisKind::GroupComparison));
    assert_eq!(
        bundle.run.served_from_cache,
        vec![DatasetId::Pollution, DatasetId::WaterQuality, DatasetId::Population]
    );

    assert!(summary.html_path.exists());
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&summary.json_path).unwrap()).unwrap();
    assert_eq!(json["view_counts"]["pollution_water"], 72);

    let _ = fs::remove_dir_all(&cache_dir);
    let _ = fs::remove_dir_all(&output_dir);
}

#[test]
fn test_report_is_deterministic_for_a_fixed_run() {
    let rows = envpop_analysis::ingest::snapshot::all_rows();
    let joiner = Joiner::from_config(&AnalysisConfig::default()).unwrap();
    let integration = joiner.join(&rows).unwrap();
    let at = Utc.with_ymd_and_hms(2024, 9, 1, 12, 0, 0).unwrap();

    let first = report::render_html(&analyze(&integration, RunContext::new(at)));
    let second = report::render_html(&analyze(&integration, RunContext::new(at)));
    assert_eq!(first, second);
}

// ---------------------------------------------------------------------------
// 6. Persistence
// ---------------------------------------------------------------------------

#[test]
#[ignore] // Only run when database is available
fn test_stored_run_round_trips_and_reanalyzes() {
    use envpop_analysis::{db, store};

    let mut client = db::connect_and_verify().unwrap_or_else(|e| {
        eprintln!("\n{}\n", e);
        panic!("Database setup validation failed");
    });

    let mut run = RunContext::new(Utc::now());
    run.run_id = format!("{}-test-{}", run.run_id, std::process::id());
    let rows = vec![
        census("Carlow", 2022, 61_968.0),
        census("Cavan", 2022, 81_704.0),
    ];

    store::save_run(&mut client, &run).unwrap();
    assert_eq!(store::save_observations(&mut client, &run.run_id, &rows).unwrap(), 2);
    assert_eq!(store::save_observations(&mut client, &run.run_id, &rows).unwrap(), 0, "re-save is a no-op");
    let loaded = store::load_observations(&mut client, DatasetId::Population, &run.run_id).unwrap();
    assert_eq!(loaded, rows);

    let options = PipelineOptions {
        offline: false,
        persist: false,
        output_dir: scratch_dir("rerun"),
    };
    let summary = pipeline::rerun(&AnalysisConfig::default(), &run.run_id, &options).unwrap();
    assert_eq!(summary.collection.rows, rows);
    assert!(summary.bundle.run.served_from_cache.is_empty());
    assert_eq!(summary.bundle.view_counts[&ViewKind::PollutionPopulation], 2);
    let _ = fs::remove_dir_all(&options.output_dir);

    for table in ["observations", "integrated_records", "analysis_results", "runs"] {
        let _ = client.execute(
            &format!("DELETE FROM envpop.{} WHERE run_id = $1", table),
            &[&run.run_id],
        );
    }
}
