/// Data collection from the CSO PxStat API.
///
/// - `cso`      — JSON-stat 2.0 URL construction, parsing and the live client
/// - `cache`    — last successful fetch per table, stored as JSON
/// - `snapshot` — built-in rows used when no cache exists yet
/// - `fixtures` (test only) — representative JSON-stat payloads
///
/// Fetching is an explicit two-stage interface: `fetch_live` may fail,
/// `fetch_cached` never does. Choosing between them is up to the caller.

pub mod cache;
pub mod cso;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod fixtures;

use std::path::PathBuf;

use crate::model::{DatasetId, RawObservation};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request for {table} failed: {source}")]
    Http {
        table: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{table} returned HTTP {status}")]
    Status { table: String, status: u16 },

    #[error("{table} is not valid JSON: {source}")]
    Json {
        table: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{table} has an unexpected JSON-stat shape: {reason}")]
    Shape { table: String, reason: String },

    #[error("cache file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One collectable table.
pub trait DatasetSource: Send {
    fn dataset(&self) -> DatasetId;

    /// Short name used in logs and as the cache key (the table code).
    fn name(&self) -> &str;

    /// Fetches fresh rows from the network.
    fn fetch_live(&self) -> Result<Vec<RawObservation>, FetchError>;

    /// Last cached rows, or the built-in snapshot when nothing is cached.
    fn fetch_cached(&self) -> Vec<RawObservation>;

    /// Stores rows from a successful live fetch for later `fetch_cached` calls.
    fn store_cache(&self, rows: &[RawObservation]) -> Result<(), FetchError>;
}
