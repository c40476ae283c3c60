/// Shared data types for the environmental / population pipeline.
///
/// Everything that crosses a module boundary lives here: the raw rows handed
/// over by the collector, the integrated per-(county, year) records built by
/// the joiner, the flattened analysis results handed to persistence, and the
/// coverage diagnostics that every stage contributes to.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::counties::CountyKey;

// ---------------------------------------------------------------------------
// Datasets and raw rows
// ---------------------------------------------------------------------------

/// The three public datasets joined by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetId {
    /// CSO air emission accounts (EAA20), national level only.
    Pollution,
    /// EPA bathing water quality (EPA02), per local authority.
    WaterQuality,
    /// CSO census population by county (2011, 2016, 2022).
    Population,
}

impl DatasetId {
    pub const ALL: [DatasetId; 3] = [
        DatasetId::Pollution,
        DatasetId::WaterQuality,
        DatasetId::Population,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetId::Pollution => "pollution",
            DatasetId::WaterQuality => "water_quality",
            DatasetId::Population => "population",
        }
    }

    /// Inverse of [`DatasetId::as_str`], used when reading rows back from storage.
    pub fn parse(s: &str) -> Option<Self> {
        DatasetId::ALL.into_iter().find(|d| d.as_str() == s)
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One collected row, exactly as the source reported it.
///
/// `region` is the raw region label (county, local authority or the national
/// aggregate) and is only resolved to a [`CountyKey`] by the joiner.
/// For water quality, `indicator` is the rating category and `value` the
/// number of bathing sites holding that rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub dataset_id: DatasetId,
    pub region: String,
    pub year: i32,
    pub indicator: String,
    pub value: f64,
}

impl RawObservation {
    pub fn new(
        dataset_id: DatasetId,
        region: impl Into<String>,
        year: i32,
        indicator: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            dataset_id,
            region: region.into(),
            year,
            indicator: indicator.into(),
            value,
        }
    }
}

// ---------------------------------------------------------------------------
// Integrated views
// ---------------------------------------------------------------------------

/// The three integrated views produced by the joiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    /// Census years only, allocation joined to exact census population.
    PollutionPopulation,
    /// Water-quality years, allocation joined to county water scores.
    PollutionWater,
    /// Water-quality years with census population carried forward.
    WaterPopulation,
}

impl ViewKind {
    pub const ALL: [ViewKind; 3] = [
        ViewKind::PollutionPopulation,
        ViewKind::PollutionWater,
        ViewKind::WaterPopulation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::PollutionPopulation => "pollution_population",
            ViewKind::PollutionWater => "pollution_water",
            ViewKind::WaterPopulation => "water_population",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ViewKind::PollutionPopulation => "Pollution vs Population (census years)",
            ViewKind::PollutionWater => "Pollution vs Water Quality",
            ViewKind::WaterPopulation => "Water Quality vs Population (census carried forward)",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (county, year) row of an integrated view.
///
/// Every metric is optional because no dataset covers every (county, year).
/// `is_forward_filled` is only ever set in [`ViewKind::WaterPopulation`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegratedRecord {
    pub view: ViewKind,
    pub county: CountyKey,
    pub year: i32,
    pub pollution_index: Option<f64>,
    pub water_quality_score: Option<f64>,
    pub population: Option<u64>,
    pub is_forward_filled: bool,
    pub emissions_per_capita: Option<f64>,
    pub estimated_county_emissions: Option<f64>,
    pub population_density: Option<f64>,
    pub percent_excellent: Option<f64>,
    pub percent_good_or_better: Option<f64>,
    pub bathing_sites: Option<u32>,
}

impl IntegratedRecord {
    pub fn new(view: ViewKind, county: CountyKey, year: i32) -> Self {
        Self {
            view,
            county,
            year,
            pollution_index: None,
            water_quality_score: None,
            population: None,
            is_forward_filled: false,
            emissions_per_capita: None,
            estimated_county_emissions: None,
            population_density: None,
            percent_excellent: None,
            percent_good_or_better: None,
            bathing_sites: None,
        }
    }

    /// A record is only worth emitting if at least one source metric is present.
    pub fn has_source_metric(&self) -> bool {
        self.pollution_index.is_some()
            || self.water_quality_score.is_some()
            || self.population.is_some()
    }
}

/// Numeric columns of an [`IntegratedRecord`] that the analyzer can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    PollutionIndex,
    WaterQualityScore,
    Population,
    EmissionsPerCapita,
    EstimatedCountyEmissions,
    PopulationDensity,
    PercentExcellent,
    PercentGoodOrBetter,
}

/// Which side of the analysis a metric describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFamily {
    Pollution,
    Water,
    Population,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::PollutionIndex => "pollution_index",
            Metric::WaterQualityScore => "water_quality_score",
            Metric::Population => "population",
            Metric::EmissionsPerCapita => "emissions_per_capita",
            Metric::EstimatedCountyEmissions => "estimated_county_emissions",
            Metric::PopulationDensity => "population_density",
            Metric::PercentExcellent => "percent_excellent",
            Metric::PercentGoodOrBetter => "percent_good_or_better",
        }
    }

    pub fn value(&self, record: &IntegratedRecord) -> Option<f64> {
        match self {
            Metric::PollutionIndex => record.pollution_index,
            Metric::WaterQualityScore => record.water_quality_score,
            Metric::Population => record.population.map(|p| p as f64),
            Metric::EmissionsPerCapita => record.emissions_per_capita,
            Metric::EstimatedCountyEmissions => record.estimated_county_emissions,
            Metric::PopulationDensity => record.population_density,
            Metric::PercentExcellent => record.percent_excellent,
            Metric::PercentGoodOrBetter => record.percent_good_or_better,
        }
    }

    pub fn family(&self) -> MetricFamily {
        match self {
            Metric::PollutionIndex | Metric::EmissionsPerCapita | Metric::EstimatedCountyEmissions => {
                MetricFamily::Pollution
            }
            Metric::WaterQualityScore | Metric::PercentExcellent | Metric::PercentGoodOrBetter => {
                MetricFamily::Water
            }
            Metric::Population | Metric::PopulationDensity => MetricFamily::Population,
        }
    }

    /// Ranking direction: pollution and emissions rank best when low,
    /// water quality best when high.
    pub fn lower_is_better(&self) -> bool {
        matches!(
            self,
            Metric::PollutionIndex | Metric::EmissionsPerCapita | Metric::EstimatedCountyEmissions
        )
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Analysis results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Correlation,
    Trend,
    GroupComparison,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Correlation => "correlation",
            AnalysisKind::Trend => "trend",
            AnalysisKind::GroupComparison => "group_comparison",
        }
    }
}

/// Flattened, read-only form of one analysis, as persisted and exported.
///
/// `subject` names the scope (`"national"`, a county, or `"counties"`).
/// `view` is `None` for the full-length national pollution index series,
/// which is not tied to an integrated view. Either the numeric fields or
/// `not_computed_reason` are populated, never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub kind: AnalysisKind,
    pub view: Option<ViewKind>,
    pub subject: String,
    pub metric_pair: String,
    pub correlation_coefficient: Option<f64>,
    pub p_value: Option<f64>,
    pub sample_size: usize,
    pub trend_slope: Option<f64>,
    /// Mann-Kendall Z for trends.
    pub trend_test_statistic: Option<f64>,
    /// F for group comparisons.
    pub f_statistic: Option<f64>,
    pub not_computed_reason: Option<String>,
}

impl AnalysisResult {
    pub fn is_computed(&self) -> bool {
        self.not_computed_reason.is_none()
    }
}

// ---------------------------------------------------------------------------
// Errors and diagnostics
// ---------------------------------------------------------------------------

/// A raw region label with no canonical county mapping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized county '{raw}'")]
pub struct UnmatchedCountyError {
    pub raw: String,
}

/// Row-level data problems. The row is excluded and counted; the run goes on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataError {
    #[error("unrecognized water-quality rating '{rating}' for {region} in {year}")]
    UnknownRating {
        rating: String,
        region: String,
        year: i32,
    },

    #[error("malformed {dataset} value {value} for {region} in {year}")]
    MalformedValue {
        dataset: DatasetId,
        region: String,
        year: i32,
        value: f64,
    },

    #[error("pollution row for '{region}' in {year} is not national; emissions are national only")]
    UnexpectedCountyRow { region: String, year: i32 },

    #[error("pollutant '{pollutant}' missing in {year}; no pollution index for that year")]
    MissingPollutant { pollutant: String, year: i32 },
}

impl DataError {
    pub fn kind(&self) -> &'static str {
        match self {
            DataError::UnknownRating { .. } => "unknown_rating",
            DataError::MalformedValue { .. } => "malformed_value",
            DataError::UnexpectedCountyRow { .. } => "unexpected_county_row",
            DataError::MissingPollutant { .. } => "missing_pollutant",
        }
    }
}

/// Maximum number of data error messages kept verbatim for the report.
const MAX_ERROR_SAMPLES: usize = 20;

/// Coverage counters surfaced in the final report so partial failures are
/// never silent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoverageDiagnostics {
    /// Raw region label → number of rows dropped because it did not match.
    pub unmatched_regions: BTreeMap<String, usize>,
    /// Data error kind → number of rows excluded.
    pub data_errors: BTreeMap<String, usize>,
    pub data_error_samples: Vec<String>,
    /// National aggregate rows in county-level datasets.
    pub national_rows_skipped: usize,
    /// Year → counties requested but absent from that year's census mapping.
    pub allocation_exclusions: BTreeMap<i32, Vec<CountyKey>>,
    /// Year → reason no allocation was possible.
    pub allocation_failures: BTreeMap<i32, String>,
    /// Registry counties with no data in any dataset.
    pub counties_without_data: Vec<CountyKey>,
    pub forward_filled_records: usize,
    pub records_without_metrics: usize,
    pub not_computed_results: usize,
}

impl CoverageDiagnostics {
    pub fn record_unmatched(&mut self, err: &UnmatchedCountyError) {
        *self.unmatched_regions.entry(err.raw.clone()).or_insert(0) += 1;
    }

    pub fn record_data_error(&mut self, err: &DataError) {
        *self.data_errors.entry(err.kind().to_string()).or_insert(0) += 1;
        if self.data_error_samples.len() < MAX_ERROR_SAMPLES {
            self.data_error_samples.push(err.to_string());
        }
    }

    pub fn unmatched_rows(&self) -> usize {
        self.unmatched_regions.values().sum()
    }

    pub fn data_error_rows(&self) -> usize {
        self.data_errors.values().sum()
    }

    pub fn excluded_allocations(&self) -> usize {
        self.allocation_exclusions.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_id_round_trips_through_str() {
        for dataset in DatasetId::ALL {
            assert_eq!(DatasetId::parse(dataset.as_str()), Some(dataset));
        }
        assert_eq!(DatasetId::parse("rainfall"), None);
    }

    #[test]
    fn test_record_without_metrics_is_not_emittable() {
        let county = CountyKey::from_canonical("Cork").unwrap();
        let mut record = IntegratedRecord::new(ViewKind::PollutionWater, county, 2022);
        assert!(!record.has_source_metric());

        // Derived fields alone do not count as a source metric.
        record.estimated_county_emissions = Some(10.0);
        assert!(!record.has_source_metric());

        record.water_quality_score = Some(3.0);
        assert!(record.has_source_metric());
    }

    #[test]
    fn test_metric_value_reads_population_as_float() {
        let county = CountyKey::from_canonical("Sligo").unwrap();
        let mut record = IntegratedRecord::new(ViewKind::WaterPopulation, county, 2022);
        record.population = Some(70_198);
        assert_eq!(Metric::Population.value(&record), Some(70_198.0));
        assert_eq!(Metric::EmissionsPerCapita.value(&record), None);
    }

    #[test]
    fn test_diagnostics_keep_bounded_error_samples() {
        let mut diagnostics = CoverageDiagnostics::default();
        for year in 0..30 {
            diagnostics.record_data_error(&DataError::UnknownRating {
                rating: "Fair".into(),
                region: "Cork".into(),
                year,
            });
        }
        assert_eq!(diagnostics.data_error_rows(), 30);
        assert_eq!(diagnostics.data_error_samples.len(), MAX_ERROR_SAMPLES);
        assert_eq!(diagnostics.data_errors["unknown_rating"], 30);
    }

    #[test]
    fn test_unmatched_counts_accumulate_per_label() {
        let mut diagnostics = CoverageDiagnostics::default();
        let err = UnmatchedCountyError { raw: "Co. Leix".into() };
        diagnostics.record_unmatched(&err);
        diagnostics.record_unmatched(&err);
        assert_eq!(diagnostics.unmatched_regions["Co. Leix"], 2);
        assert_eq!(diagnostics.unmatched_rows(), 2);
    }
}
