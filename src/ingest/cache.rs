/// On-disk cache of collected rows, one pretty-printed JSON file per table:
///
/// ```text
/// data/cache/EAA20.json
/// data/cache/EPA02.json
/// data/cache/G0420.json
/// ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::FetchError;
use crate::model::RawObservation;

pub fn cache_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{}.json", table))
}

/// Writes rows for `table`, creating the directory if needed.
pub fn write_rows(dir: &Path, table: &str, rows: &[RawObservation]) -> Result<(), FetchError> {
    let path = cache_path(dir, table);
    fs::create_dir_all(dir).map_err(|source| FetchError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let json = serde_json::to_string_pretty(rows).map_err(|source| FetchError::Json {
        table: table.to_string(),
        source,
    })?;
    fs::write(&path, json).map_err(|source| FetchError::Io { path, source })
}

/// Reads cached rows. `Ok(None)` when nothing has been cached for `table`.
pub fn read_rows(dir: &Path, table: &str) -> Result<Option<Vec<RawObservation>>, FetchError> {
    let path = cache_path(dir, table);
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path).map_err(|source| FetchError::Io { path, source })?;
    let rows = serde_json::from_str(&contents).map_err(|source| FetchError::Json {
        table: table.to_string(),
        source,
    })?;
    Ok(Some(rows))
}
