/// CSO PxStat client: URL construction and JSON-stat 2.0 parsing.
///
/// Every table is read through the same endpoint:
///   {base}/{table}/JSON-stat/2.0/en
///
/// JSON-stat shape used here:
///   id[]                          — dimension ids, in value order
///   size[]                        — category count per dimension
///   role.time / role.geo / role.metric — which dimension plays which part
///   dimension[id].label
///   dimension[id].category.index  — array of codes, or { code: position }
///   dimension[id].category.label  — { code: label }
///   value[]                       — dense row-major cube, nulls for gaps
///                                   (a sparse { "position": value } object
///                                   is accepted too)
///
/// Each cell becomes one `RawObservation`: region from the geo dimension
/// (or the national label when there is none), year from the time dimension
/// (or the census year for single-year census tables), indicator from the
/// indicator dimension. Every other dimension is pinned to its total
/// category ("All NACE economic sectors", "Both sexes", ...), or to its
/// first category when none is marked as a total.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::config::{CensusTable, CollectionConfig};
use crate::counties::NATIONAL_LABEL;
use crate::ingest::{DatasetSource, FetchError, cache, snapshot};
use crate::model::{DatasetId, RawObservation};

// ---------------------------------------------------------------------------
// Serde structures for JSON-stat deserialization
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct JsonStatDataset {
    id: Vec<String>,
    size: Vec<usize>,
    #[serde(default)]
    role: Roles,
    dimension: HashMap<String, Dimension>,
    value: Values,
}

#[derive(Deserialize, Default)]
struct Roles {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    geo: Vec<String>,
    #[serde(default)]
    metric: Vec<String>,
}

#[derive(Deserialize)]
struct Dimension {
    #[serde(default)]
    label: Option<String>,
    category: Category,
}

#[derive(Deserialize)]
struct Category {
    #[serde(default)]
    index: Option<CategoryIndex>,
    #[serde(default)]
    label: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CategoryIndex {
    Ordered(Vec<String>),
    Positions(HashMap<String, usize>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Values {
    Dense(Vec<Option<f64>>),
    Sparse(HashMap<String, Option<f64>>),
}

impl Values {
    fn get(&self, position: usize) -> Option<f64> {
        match self {
            Values::Dense(values) => values.get(position).copied().flatten(),
            Values::Sparse(values) => values.get(&position.to_string()).copied().flatten(),
        }
    }
}

// ---------------------------------------------------------------------------
// Table description
// ---------------------------------------------------------------------------

/// How to find the indicator dimension of a table.
#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorDimension {
    /// The dimension with role `metric` (the CSO "STATISTIC" dimension).
    Metric,
    /// First non-metric dimension whose id or label contains one of these
    /// (case-insensitive).
    Keywords(Vec<String>),
}

/// What to extract from one CSO table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub table: String,
    pub dataset: DatasetId,
    /// Year for tables without a time dimension.
    pub census_year: Option<i32>,
    pub indicator: IndicatorDimension,
    /// Keep only indicator categories with this label (case-insensitive).
    pub indicator_filter: Option<String>,
}

impl TableSpec {
    pub fn pollution(table: &str) -> Self {
        Self {
            table: table.to_string(),
            dataset: DatasetId::Pollution,
            census_year: None,
            indicator: IndicatorDimension::Keywords(keywords(&["pollutant", "emission", "gas"])),
            indicator_filter: None,
        }
    }

    pub fn water(table: &str) -> Self {
        Self {
            table: table.to_string(),
            dataset: DatasetId::WaterQuality,
            census_year: None,
            indicator: IndicatorDimension::Keywords(keywords(&["classification", "quality", "rating"])),
            indicator_filter: None,
        }
    }

    pub fn census(census: &CensusTable, statistic: &str) -> Self {
        Self {
            table: census.table.clone(),
            dataset: DatasetId::Population,
            census_year: Some(census.year),
            indicator: IndicatorDimension::Metric,
            indicator_filter: Some(statistic.to_string()),
        }
    }
}

fn keywords(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// Builds the JSON-stat 2.0 (English) URL for a table.
///
/// # Example
/// ```
/// use envpop_analysis::ingest::cso::build_table_url;
///
/// let url = build_table_url(
///     "https://ws.cso.ie/public/api.restful/PxStat.Data.Cube_API.ReadDataset",
///     "EPA02",
/// );
/// assert!(url.ends_with("/EPA02/JSON-stat/2.0/en"));
/// ```
pub fn build_table_url(base_url: &str, table: &str) -> String {
    format!("{}/{}/JSON-stat/2.0/en", base_url.trim_end_matches('/'), table)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

// One dimension resolved to its ordered categories.
struct ResolvedDimension {
    id: String,
    label: String,
    /// (position, code, label) in position order.
    categories: Vec<(usize, String, String)>,
}

enum Role {
    Geo,
    Time,
    Indicator,
    Pinned,
}

fn shape(spec: &TableSpec, reason: impl Into<String>) -> FetchError {
    FetchError::Shape {
        table: spec.table.clone(),
        reason: reason.into(),
    }
}

fn is_total_label(label: &str) -> bool {
    let label = label.trim().to_lowercase();
    label == "total"
        || label.starts_with("all ")
        || label.starts_with("total ")
        || label == "both sexes"
        || label == "state"
        || label == "ireland"
}

/// Leading four-digit year of a time label ("2022", "2022 Q1", ...).
fn parse_year(label: &str) -> Option<i32> {
    let digits: String = label.trim().chars().take(4).collect();
    if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

fn resolve_dimension(spec: &TableSpec, id: &str, size: usize, dimension: &Dimension) -> Result<ResolvedDimension, FetchError> {
    let codes: Vec<(usize, String)> = match &dimension.category.index {
        Some(CategoryIndex::Ordered(codes)) => codes.iter().cloned().enumerate().collect(),
        Some(CategoryIndex::Positions(positions)) => {
            let mut codes: Vec<(usize, String)> = positions.iter().map(|(c, p)| (*p, c.clone())).collect();
            codes.sort();
            codes
        }
        // A lone category may omit the index.
        None if dimension.category.label.len() == 1 => dimension
            .category
            .label
            .keys()
            .map(|code| (0, code.clone()))
            .collect(),
        None => return Err(shape(spec, format!("dimension {} has no category index", id))),
    };

    if codes.len() != size {
        return Err(shape(
            spec,
            format!("dimension {} has {} categories but size {}", id, codes.len(), size),
        ));
    }

    let categories = codes
        .into_iter()
        .map(|(position, code)| {
            let label = dimension.category.label.get(&code).cloned().unwrap_or_else(|| code.clone());
            (position, code, label)
        })
        .collect();

    Ok(ResolvedDimension {
        id: id.to_string(),
        label: dimension.label.clone().unwrap_or_else(|| id.to_string()),
        categories,
    })
}

/// Parses a JSON-stat 2.0 dataset into raw observations.
///
/// # Errors
/// - `FetchError::Json` — not JSON, or not a JSON-stat dataset.
/// - `FetchError::Shape` — inconsistent ids/sizes, or a required dimension
///   (time, indicator) cannot be identified.
pub fn parse_table(json: &str, spec: &TableSpec) -> Result<Vec<RawObservation>, FetchError> {
    let dataset: JsonStatDataset = serde_json::from_str(json).map_err(|source| FetchError::Json {
        table: spec.table.clone(),
        source,
    })?;

    if dataset.id.len() != dataset.size.len() {
        return Err(shape(spec, "id and size have different lengths"));
    }

    let mut dimensions = Vec::with_capacity(dataset.id.len());
    for (id, &size) in dataset.id.iter().zip(&dataset.size) {
        let dimension = dataset
            .dimension
            .get(id)
            .ok_or_else(|| shape(spec, format!("dimension {} is listed in id but not described", id)))?;
        dimensions.push(resolve_dimension(spec, id, size, dimension)?);
    }

    let geo = dataset.role.geo.first();
    let time = dataset.role.time.first();
    let indicator = match &spec.indicator {
        IndicatorDimension::Metric => dataset.role.metric.first().cloned(),
        IndicatorDimension::Keywords(words) => dimensions
            .iter()
            .filter(|d| !dataset.role.metric.contains(&d.id) && Some(&d.id) != geo && Some(&d.id) != time)
            .find(|d| {
                let haystack = format!("{} {}", d.id, d.label).to_lowercase();
                words.iter().any(|w| haystack.contains(w.as_str()))
            })
            .map(|d| d.id.clone()),
    }
    .ok_or_else(|| shape(spec, "no indicator dimension found"))?;

    if time.is_none() && spec.census_year.is_none() {
        return Err(shape(spec, "no time dimension and no census year"));
    }

    // Categories kept per dimension, and each dimension's part in a row.
    let mut selections: Vec<Vec<&(usize, String, String)>> = Vec::with_capacity(dimensions.len());
    let mut roles = Vec::with_capacity(dimensions.len());
    for dimension in &dimensions {
        let role = if Some(&dimension.id) == geo {
            Role::Geo
        } else if Some(&dimension.id) == time {
            Role::Time
        } else if dimension.id == indicator {
            Role::Indicator
        } else {
            Role::Pinned
        };

        let selected: Vec<&(usize, String, String)> = match role {
            Role::Geo | Role::Time => dimension.categories.iter().collect(),
            Role::Indicator => match &spec.indicator_filter {
                Some(filter) => dimension
                    .categories
                    .iter()
                    .filter(|(_, _, label)| label.trim().eq_ignore_ascii_case(filter))
                    .collect(),
                None => dimension.categories.iter().collect(),
            },
            Role::Pinned => {
                let total = dimension.categories.iter().find(|(_, _, label)| is_total_label(label));
                if total.is_none() && dimension.categories.len() > 1 {
                    log::debug!(
                        "{}: dimension {} has no total category, keeping the first",
                        spec.table,
                        dimension.id
                    );
                }
                total.or_else(|| dimension.categories.first()).into_iter().collect()
            }
        };
        selections.push(selected);
        roles.push(role);
    }

    // Row-major strides.
    let mut strides = vec![1usize; dataset.size.len()];
    for d in (0..dataset.size.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * dataset.size[d + 1];
    }

    let mut rows = Vec::new();
    if selections.iter().any(Vec::is_empty) {
        return Ok(rows);
    }

    let mut cursor = vec![0usize; selections.len()];
    'cells: loop {
        let mut position = 0;
        let mut region = NATIONAL_LABEL.to_string();
        let mut year = spec.census_year;
        let mut indicator_label = String::new();

        for (d, selected) in selections.iter().enumerate() {
            let (pos, _, label) = selected[cursor[d]];
            position += pos * strides[d];
            match roles[d] {
                Role::Geo => region = label.clone(),
                Role::Time => year = parse_year(label),
                Role::Indicator => indicator_label = label.clone(),
                Role::Pinned => {}
            }
        }

        match (year, dataset.value.get(position)) {
            (Some(year), Some(value)) => {
                rows.push(RawObservation::new(spec.dataset, region, year, indicator_label, value));
            }
            (None, Some(_)) => log::debug!("{}: skipping cell with unparseable year", spec.table),
            _ => {}
        }

        // Advance the odometer, last dimension fastest.
        let mut d = cursor.len();
        loop {
            if d == 0 {
                break 'cells;
            }
            d -= 1;
            cursor[d] += 1;
            if cursor[d] < selections[d].len() {
                break;
            }
            cursor[d] = 0;
        }
    }

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Live source
// ---------------------------------------------------------------------------

/// One CSO table, fetched live with a cache and snapshot behind it.
#[derive(Debug, Clone)]
pub struct CsoSource {
    spec: TableSpec,
    base_url: String,
    timeout: Duration,
    cache_dir: PathBuf,
}

impl CsoSource {
    pub fn new(spec: TableSpec, config: &CollectionConfig) -> Self {
        Self {
            spec,
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            cache_dir: config.cache_dir.clone(),
        }
    }

    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    pub fn url(&self) -> String {
        build_table_url(&self.base_url, &self.spec.table)
    }

    fn http_error(&self, source: reqwest::Error) -> FetchError {
        FetchError::Http {
            table: self.spec.table.clone(),
            source,
        }
    }
}

/// Sources for every configured table: emissions, water quality, then
/// one per census.
pub fn configured_sources(config: &CollectionConfig) -> Vec<CsoSource> {
    let mut sources = vec![
        CsoSource::new(TableSpec::pollution(&config.pollution_table), config),
        CsoSource::new(TableSpec::water(&config.water_table), config),
    ];
    for census in &config.census {
        sources.push(CsoSource::new(
            TableSpec::census(census, &config.population_statistic),
            config,
        ));
    }
    sources
}

impl DatasetSource for CsoSource {
    fn dataset(&self) -> DatasetId {
        self.spec.dataset
    }

    fn name(&self) -> &str {
        &self.spec.table
    }

    fn fetch_live(&self) -> Result<Vec<RawObservation>, FetchError> {
        let url = self.url();
        log::info!("Fetching {}", url);

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| self.http_error(e))?;
        let response = client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| self.http_error(e))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                table: self.spec.table.clone(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().map_err(|e| self.http_error(e))?;
        let rows = parse_table(&body, &self.spec)?;
        if rows.is_empty() {
            return Err(shape(&self.spec, "no observations after filtering"));
        }
        Ok(rows)
    }

    fn fetch_cached(&self) -> Vec<RawObservation> {
        match cache::read_rows(&self.cache_dir, &self.spec.table) {
            Ok(Some(rows)) => return rows,
            Ok(None) => log::info!("{}: no cache yet, using built-in snapshot", self.spec.table),
            Err(e) => log::warn!("{}: unreadable cache ({}), using built-in snapshot", self.spec.table, e),
        }
        snapshot::rows(self.spec.dataset, self.spec.census_year)
    }

    fn store_cache(&self, rows: &[RawObservation]) -> Result<(), FetchError> {
        cache::write_rows(&self.cache_dir, &self.spec.table, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::{
        fixture_emissions_json, fixture_population_json, fixture_water_quality_json,
    };

    fn find<'a>(rows: &'a [RawObservation], region: &str, year: i32, indicator: &str) -> Option<&'a RawObservation> {
        rows.iter()
            .find(|r| r.region == region && r.year == year && r.indicator == indicator)
    }

    #[test]
    fn test_build_table_url() {
        let url = build_table_url("https://ws.cso.ie/public/api.restful/PxStat.Data.Cube_API.ReadDataset/", "EAA20");
        assert_eq!(
            url,
            "https://ws.cso.ie/public/api.restful/PxStat.Data.Cube_API.ReadDataset/EAA20/JSON-stat/2.0/en"
        );
    }

    #[test]
    fn test_parse_water_quality_table() {
        let rows = parse_table(fixture_water_quality_json(), &TableSpec::water("EPA02")).unwrap();

        // 2 authorities × 2 years × 3 ratings, one null cell.
        assert_eq!(rows.len(), 11);
        assert!(rows.iter().all(|r| r.dataset_id == DatasetId::WaterQuality));

        let kerry = find(&rows, "Kerry County Council", 2022, "Excellent").unwrap();
        assert_eq!(kerry.value, 40.0);
        let fingal = find(&rows, "Fingal County Council", 2023, "Poor").unwrap();
        assert_eq!(fingal.value, 1.0);
        assert!(find(&rows, "Fingal County Council", 2022, "Poor").is_none(), "null cell skipped");
    }

    #[test]
    fn test_parse_census_table_uses_census_year_and_totals() {
        let census = CensusTable { year: 2022, table: "G0420".to_string() };
        let rows = parse_table(fixture_population_json(), &TableSpec::census(&census, "Population")).unwrap();

        // Three regions, population statistic only, both sexes only.
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.year == 2022 && r.indicator == "Population"));
        assert_eq!(find(&rows, "Carlow", 2022, "Population").unwrap().value, 61_968.0);
        assert_eq!(find(&rows, "State", 2022, "Population").unwrap().value, 5_149_139.0);
    }

    #[test]
    fn test_parse_emissions_table_is_national_and_sector_total() {
        let rows = parse_table(fixture_emissions_json(), &TableSpec::pollution("EAA20")).unwrap();

        // 2 pollutants × 2 years, total sector only.
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.region == NATIONAL_LABEL));
        assert_eq!(find(&rows, NATIONAL_LABEL, 2021, "Carbon dioxide (CO2)").unwrap().value, 38_000.0);
        assert_eq!(find(&rows, NATIONAL_LABEL, 2022, "Nitrogen oxides (NOx)").unwrap().value, 85.0);
    }

    #[test]
    fn test_invalid_json_is_json_error() {
        let err = parse_table("<html>maintenance</html>", &TableSpec::water("EPA02")).unwrap_err();
        assert!(matches!(err, FetchError::Json { .. }));
    }

    #[test]
    fn test_size_mismatch_is_shape_error() {
        let json = r#"{
            "id": ["A"], "size": [2],
            "dimension": { "A": { "category": { "index": ["x"], "label": { "x": "X" } } } },
            "value": [1, 2]
        }"#;
        let err = parse_table(json, &TableSpec::water("EPA02")).unwrap_err();
        assert!(matches!(err, FetchError::Shape { .. }));
    }

    #[test]
    fn test_missing_indicator_dimension_is_shape_error() {
        let json = r#"{
            "id": ["TLIST(A1)"], "size": [1],
            "role": { "time": ["TLIST(A1)"] },
            "dimension": { "TLIST(A1)": { "category": { "index": ["2022"], "label": { "2022": "2022" } } } },
            "value": [1]
        }"#;
        let err = parse_table(json, &TableSpec::water("EPA02")).unwrap_err();
        assert!(matches!(err, FetchError::Shape { ref reason, .. } if reason.contains("indicator")));
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year("2022"), Some(2022));
        assert_eq!(parse_year(" 2021 Q3"), Some(2021));
        assert_eq!(parse_year("Census"), None);
        assert_eq!(parse_year("20"), None);
    }

    #[test]
    fn test_total_labels() {
        assert!(is_total_label("All NACE economic sectors"));
        assert!(is_total_label("Both sexes"));
        assert!(is_total_label("Total"));
        assert!(!is_total_label("Male"));
    }

    #[test]
    fn test_configured_sources_cover_every_table() {
        let sources = configured_sources(&CollectionConfig::default());
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["EAA20", "EPA02", "E2011", "E2016", "G0420"]);
        assert_eq!(sources[4].spec().census_year, Some(2022));
        assert_eq!(sources[0].dataset(), DatasetId::Pollution);
    }
}
