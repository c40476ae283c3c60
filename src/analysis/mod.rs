/// Analysis core for the environmental / population pipeline.
///
/// Pure and synchronous: operates on already-collected rows and never
/// touches the network or the database.
///
/// Submodules:
/// - `allocation` — national emissions spread to counties by population share.
/// - `metrics`    — pollution index, water-quality score, per-capita, density, growth.
/// - `join`       — the three integrated (county, year) views.
/// - `stats`      — Pearson, OLS, Mann-Kendall, one-way ANOVA.
/// - `analyzer`   — fixed analysis suite and the report bundle.

pub mod allocation;
pub mod analyzer;
pub mod join;
pub mod metrics;
pub mod stats;
