/// envpop_analysis: Ireland emissions, bathing water quality and population,
/// joined by county and year.
///
/// # Module structure
///
/// ```text
/// envpop_analysis
/// ├── model       — shared data types (RawObservation, IntegratedRecord, AnalysisResult, …)
/// ├── config      — analysis.toml loader (index weights, CSO tables, aliases)
/// ├── counties    — county registry and name normalizer
/// ├── ingest
/// │   ├── cso      — CSO PxStat JSON-stat client and parser
/// │   ├── cache    — last successful fetch per table
/// │   ├── snapshot — built-in rows for first offline runs
/// │   └── fixtures (test only) — representative JSON-stat payloads
/// ├── analysis
/// │   ├── allocation — national emissions spread by population share
/// │   ├── metrics    — pollution index, water score, per-capita, density, growth
/// │   ├── join       — the three integrated views, with census forward-fill
/// │   ├── stats      — Pearson, OLS, Mann-Kendall, ANOVA, descriptive summaries
/// │   └── analyzer   — fixed analysis suite, correlation matrices, result bundle
/// ├── report      — HTML dashboard and JSON bundle
/// ├── db          — PostgreSQL connection and schema validation
/// ├── store       — run persistence (observations, records, results)
/// └── pipeline    — collect (or reload a stored run) → join → analyze → report → persist
/// ```

/// Public modules
pub mod analysis;
pub mod config;
pub mod counties;
pub mod db;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod store;
