/// Dataset joiner: three raw datasets in, three integrated views out.
///
/// The datasets disagree on granularity and time coverage:
///
/// ```text
/// pollution      national only     2009-2023 (yearly)
/// water quality  local authority   2021-2024 (yearly)
/// population     county            2011, 2016, 2022 (census)
/// ```
///
/// Rows are first resolved to counties and bucketed per dataset by
/// (county, year). National emissions are then allocated to counties by
/// census population share, and three views are assembled:
///
/// 1. `PollutionPopulation` - census years, exact population.
/// 2. `PollutionWater` - water-quality years, population only in a census year.
/// 3. `WaterPopulation` - water-quality years, population carried forward
///    from the most recent prior census and flagged. Never carried backward.
///
/// Nothing is dropped silently: unmatched labels, bad rows, allocation gaps
/// and empty records all land in [`CoverageDiagnostics`].

use std::collections::{BTreeMap, BTreeSet};

use crate::analysis::allocation::{Allocation, allocate, census_year_for};
use crate::analysis::metrics::{
    CountyGrowth, WaterRating, census_growth, emissions_per_capita, pollutant_key,
    pollution_index_by_year, population_density, summarize_ratings,
};
use crate::config::{AnalysisConfig, ConfigError, PollutionIndexConfig};
use crate::counties::{CountyKey, NameNormalizer, Region};
use crate::model::{
    CoverageDiagnostics, DataError, DatasetId, IntegratedRecord, RawObservation, ViewKind,
};

/// Everything the joiner produces for one run.
#[derive(Debug, Clone, Default)]
pub struct Integration {
    pub views: BTreeMap<ViewKind, Vec<IntegratedRecord>>,
    pub diagnostics: CoverageDiagnostics,
    /// National pollution index per year.
    pub pollution_index: BTreeMap<i32, f64>,
    /// National emissions total allocated per year.
    pub national_totals: BTreeMap<i32, f64>,
    pub census_years: Vec<i32>,
    pub growth: Vec<CountyGrowth>,
}

impl Integration {
    pub fn view(&self, kind: ViewKind) -> &[IntegratedRecord] {
        self.views.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn record_count(&self) -> usize {
        self.views.values().map(Vec::len).sum()
    }
}

// Rows bucketed per dataset after name resolution and validation.
#[derive(Default)]
struct Buckets {
    /// year → pollutant → national value
    national: BTreeMap<i32, BTreeMap<String, f64>>,
    /// (county, year) → rating → site count
    water: BTreeMap<(CountyKey, i32), BTreeMap<WaterRating, f64>>,
    /// county → census year → population
    population: BTreeMap<CountyKey, BTreeMap<i32, u64>>,
}

impl Buckets {
    /// census year → county → population
    fn by_census(&self) -> BTreeMap<i32, BTreeMap<CountyKey, u64>> {
        let mut by_census: BTreeMap<i32, BTreeMap<CountyKey, u64>> = BTreeMap::new();
        for (&county, by_year) in &self.population {
            for (&year, &population) in by_year {
                by_census.entry(year).or_default().insert(county, population);
            }
        }
        by_census
    }

    /// Counties with water-quality or population data anywhere in the window.
    fn observed_counties(&self) -> BTreeSet<CountyKey> {
        self.water
            .keys()
            .map(|(county, _)| *county)
            .chain(self.population.keys().copied())
            .collect()
    }
}

/// Joins raw observations into integrated views.
#[derive(Debug, Clone)]
pub struct Joiner {
    normalizer: NameNormalizer,
    index_config: PollutionIndexConfig,
    allocated_pollutant: Option<String>,
}

impl Joiner {
    pub fn new(normalizer: NameNormalizer, config: &AnalysisConfig) -> Self {
        Self {
            normalizer,
            index_config: config.pollution_index.clone(),
            allocated_pollutant: config.emissions.allocated_pollutant.clone(),
        }
    }

    /// Builds the normalizer from the configured alias table.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, ConfigError> {
        let aliases = config.alias_table()?;
        log::debug!("County alias table: {} entries ({} configured)", aliases.len(), config.aliases.len());
        Ok(Self::new(NameNormalizer::new(aliases), config))
    }

    /// Runs the full join.
    ///
    /// # Errors
    /// Only configuration problems (pollution index weights) abort the join.
    /// Row-level and allocation problems are counted in the diagnostics.
    pub fn join(&self, rows: &[RawObservation]) -> Result<Integration, ConfigError> {
        let mut diagnostics = CoverageDiagnostics::default();
        let buckets = self.bucket_rows(rows, &mut diagnostics);

        let index = pollution_index_by_year(&self.index_config, &buckets.national)?;
        for err in &index.errors {
            diagnostics.record_data_error(err);
        }

        let national_totals = self.national_totals(&buckets.national);
        let by_census = buckets.by_census();
        let census_years: Vec<i32> = by_census.keys().copied().collect();
        let observed = buckets.observed_counties();

        let target_years: BTreeSet<i32> = census_years
            .iter()
            .copied()
            .chain(buckets.water.keys().map(|(_, year)| *year))
            .collect();
        let allocations = allocate_years(
            &target_years,
            &national_totals,
            &by_census,
            &observed,
            &mut diagnostics,
        );

        let ctx = ViewContext {
            buckets: &buckets,
            by_census: &by_census,
            pollution_index: &index.by_year,
            allocations: &allocations,
        };

        let mut views = BTreeMap::new();
        for kind in ViewKind::ALL {
            let candidates = match kind {
                ViewKind::PollutionPopulation => ctx.pollution_population(),
                ViewKind::PollutionWater => ctx.pollution_water(),
                ViewKind::WaterPopulation => ctx.water_population(),
            };
            let total = candidates.len();
            let records: Vec<IntegratedRecord> =
                candidates.into_iter().filter(IntegratedRecord::has_source_metric).collect();
            diagnostics.records_without_metrics += total - records.len();
            diagnostics.forward_filled_records +=
                records.iter().filter(|r| r.is_forward_filled).count();
            log::debug!("View {}: {} records", kind, records.len());
            views.insert(kind, records);
        }

        diagnostics.counties_without_data = CountyKey::all()
            .filter(|county| !observed.contains(county))
            .collect();

        if diagnostics.unmatched_rows() > 0 {
            log::warn!(
                "{} rows with unrecognized regions excluded: {:?}",
                diagnostics.unmatched_rows(),
                diagnostics.unmatched_regions.keys().collect::<Vec<_>>()
            );
        }

        Ok(Integration {
            views,
            diagnostics,
            pollution_index: index.by_year,
            national_totals,
            census_years,
            growth: census_growth(&buckets.population),
        })
    }

    fn bucket_rows(&self, rows: &[RawObservation], diagnostics: &mut CoverageDiagnostics) -> Buckets {
        let mut buckets = Buckets::default();

        for row in rows {
            if !row.value.is_finite() || row.value < 0.0 {
                diagnostics.record_data_error(&DataError::MalformedValue {
                    dataset: row.dataset_id,
                    region: row.region.clone(),
                    year: row.year,
                    value: row.value,
                });
                continue;
            }

            let region = match self.normalizer.normalize(&row.region) {
                Ok(region) => region,
                Err(err) => {
                    diagnostics.record_unmatched(&err);
                    continue;
                }
            };

            match (row.dataset_id, region) {
                (DatasetId::Pollution, Region::National) => {
                    *buckets
                        .national
                        .entry(row.year)
                        .or_default()
                        .entry(row.indicator.clone())
                        .or_insert(0.0) += row.value;
                }
                (DatasetId::Pollution, Region::County(_)) => {
                    diagnostics.record_data_error(&DataError::UnexpectedCountyRow {
                        region: row.region.clone(),
                        year: row.year,
                    });
                }
                (DatasetId::WaterQuality | DatasetId::Population, Region::National) => {
                    diagnostics.national_rows_skipped += 1;
                }
                (DatasetId::WaterQuality, Region::County(county)) => {
                    let Some(rating) = WaterRating::parse(&row.indicator) else {
                        diagnostics.record_data_error(&DataError::UnknownRating {
                            rating: row.indicator.clone(),
                            region: row.region.clone(),
                            year: row.year,
                        });
                        continue;
                    };
                    *buckets
                        .water
                        .entry((county, row.year))
                        .or_default()
                        .entry(rating)
                        .or_insert(0.0) += row.value;
                }
                (DatasetId::Population, Region::County(county)) => {
                    // City and county authorities fold into one county; sum them.
                    *buckets
                        .population
                        .entry(county)
                        .or_default()
                        .entry(row.year)
                        .or_insert(0) += row.value.round() as u64;
                }
            }
        }

        buckets
    }

    /// The national figure to allocate per year: one configured pollutant,
    /// or the sum over all pollutants.
    fn national_totals(&self, national: &BTreeMap<i32, BTreeMap<String, f64>>) -> BTreeMap<i32, f64> {
        national
            .iter()
            .filter_map(|(&year, values)| {
                let total = match &self.allocated_pollutant {
                    Some(pollutant) => values
                        .iter()
                        .find(|(label, _)| pollutant_key(label) == pollutant_key(pollutant))
                        .map(|(_, value)| *value)?,
                    None => values.values().sum(),
                };
                Some((year, total))
            })
            .collect()
    }
}

/// Allocates each target year's national total using the carried-forward
/// census mapping. Gaps are recorded, not fatal.
fn allocate_years(
    target_years: &BTreeSet<i32>,
    national_totals: &BTreeMap<i32, f64>,
    by_census: &BTreeMap<i32, BTreeMap<CountyKey, u64>>,
    requested: &BTreeSet<CountyKey>,
    diagnostics: &mut CoverageDiagnostics,
) -> BTreeMap<i32, Allocation<CountyKey>> {
    let mut allocations = BTreeMap::new();

    for &year in target_years {
        let Some(&total) = national_totals.get(&year) else {
            diagnostics
                .allocation_failures
                .insert(year, format!("no national emissions total for {year}"));
            continue;
        };
        let Some(census) = census_year_for(year, by_census.keys().copied()) else {
            diagnostics
                .allocation_failures
                .insert(year, format!("no census at or before {year}"));
            continue;
        };
        let Some(populations) = by_census.get(&census) else {
            continue;
        };

        match allocate(total, populations, requested.iter().copied()) {
            Ok(allocation) => {
                if !allocation.excluded.is_empty() {
                    diagnostics
                        .allocation_exclusions
                        .insert(year, allocation.excluded.clone());
                }
                allocations.insert(year, allocation);
            }
            Err(err) => {
                log::warn!("Allocation for {} failed: {}", year, err);
                diagnostics.allocation_failures.insert(year, err.to_string());
            }
        }
    }

    allocations
}

// ---------------------------------------------------------------------------
// View assembly
// ---------------------------------------------------------------------------

struct ViewContext<'a> {
    buckets: &'a Buckets,
    by_census: &'a BTreeMap<i32, BTreeMap<CountyKey, u64>>,
    pollution_index: &'a BTreeMap<i32, f64>,
    allocations: &'a BTreeMap<i32, Allocation<CountyKey>>,
}

impl ViewContext<'_> {
    fn estimate(&self, county: CountyKey, year: i32) -> Option<f64> {
        self.allocations.get(&year).and_then(|a| a.estimate(&county))
    }

    fn attach_population(&self, record: &mut IntegratedRecord, population: Option<u64>) {
        record.population = population;
        record.population_density = population_density(population, record.county);
        record.emissions_per_capita =
            emissions_per_capita(record.estimated_county_emissions, population);
    }

    fn attach_water(&self, record: &mut IntegratedRecord, counts: &BTreeMap<WaterRating, f64>) {
        if let Some(summary) = summarize_ratings(counts) {
            record.water_quality_score = Some(summary.score);
            record.bathing_sites = Some(summary.sites);
            record.percent_excellent = Some(summary.percent_excellent);
            record.percent_good_or_better = Some(summary.percent_good_or_better);
        }
    }

    fn pollution_population(&self) -> Vec<IntegratedRecord> {
        let mut records = Vec::new();
        for (&county, by_year) in &self.buckets.population {
            for (&year, &population) in by_year {
                let mut record = IntegratedRecord::new(ViewKind::PollutionPopulation, county, year);
                record.pollution_index = self.pollution_index.get(&year).copied();
                record.estimated_county_emissions = self.estimate(county, year);
                self.attach_population(&mut record, Some(population));
                records.push(record);
            }
        }
        records
    }

    fn pollution_water(&self) -> Vec<IntegratedRecord> {
        let mut records = Vec::new();
        for (&(county, year), counts) in &self.buckets.water {
            let mut record = IntegratedRecord::new(ViewKind::PollutionWater, county, year);
            self.attach_water(&mut record, counts);
            record.pollution_index = self.pollution_index.get(&year).copied();
            record.estimated_county_emissions = self.estimate(county, year);
            let exact = self
                .by_census
                .get(&year)
                .and_then(|populations| populations.get(&county))
                .copied();
            self.attach_population(&mut record, exact);
            records.push(record);
        }
        records
    }

    fn water_population(&self) -> Vec<IntegratedRecord> {
        let mut records = Vec::new();
        for (&(county, year), counts) in &self.buckets.water {
            let mut record = IntegratedRecord::new(ViewKind::WaterPopulation, county, year);
            self.attach_water(&mut record, counts);
            record.estimated_county_emissions = self.estimate(county, year);

            let prior = self
                .buckets
                .population
                .get(&county)
                .and_then(|by_year| by_year.range(..=year).next_back());
            match prior {
                Some((&census, &population)) => {
                    record.is_forward_filled = census != year;
                    self.attach_population(&mut record, Some(population));
                }
                None => self.attach_population(&mut record, None),
            }
            records.push(record);
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> CountyKey {
        CountyKey::from_canonical(name).expect("registry county")
    }

    fn co2_only() -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.pollution_index.weights = [("CO2".to_string(), 1.0)].into_iter().collect();
        config
    }

    fn join(rows: &[RawObservation]) -> Integration {
        Joiner::from_config(&co2_only())
            .expect("valid config")
            .join(rows)
            .expect("join should succeed")
    }

    fn find(integration: &Integration, view: ViewKind, county: &str, year: i32) -> Option<IntegratedRecord> {
        integration
            .view(view)
            .iter()
            .find(|r| r.county == key(county) && r.year == year)
            .cloned()
    }

    fn pollution(year: i32, pollutant: &str, value: f64) -> RawObservation {
        RawObservation::new(DatasetId::Pollution, "State", year, pollutant, value)
    }

    fn water(region: &str, year: i32, rating: &str, sites: f64) -> RawObservation {
        RawObservation::new(DatasetId::WaterQuality, region, year, rating, sites)
    }

    fn census(region: &str, year: i32, population: f64) -> RawObservation {
        RawObservation::new(DatasetId::Population, region, year, "Population", population)
    }

    #[test]
    fn test_allocation_joins_with_water_score() {
        let rows = vec![
            pollution(2022, "CO2", 1000.0),
            census("Carlow", 2022, 100.0),
            census("Cavan", 2022, 300.0),
            census("Clare", 2022, 600.0),
            water("Cavan", 2022, "Good", 1.0),
        ];
        let integration = join(&rows);

        let record = find(&integration, ViewKind::PollutionWater, "Cavan", 2022).expect("record");
        assert_eq!(record.water_quality_score, Some(3.0));
        assert_eq!(record.estimated_county_emissions, Some(300.0));
        assert_eq!(record.emissions_per_capita, Some(1.0));
        assert_eq!(record.population, Some(300));
        assert_eq!(record.pollution_index, Some(100.0));

        let carlow = find(&integration, ViewKind::PollutionPopulation, "Carlow", 2022).unwrap();
        assert_eq!(carlow.estimated_county_emissions, Some(100.0));
    }

    #[test]
    fn test_view_two_only_attaches_population_in_census_years() {
        let rows = vec![
            pollution(2021, "CO2", 500.0),
            census("Cork", 2016, 500_000.0),
            water("Cork", 2021, "Excellent", 4.0),
        ];
        let integration = join(&rows);

        let record = find(&integration, ViewKind::PollutionWater, "Cork", 2021).unwrap();
        assert_eq!(record.population, None);
        assert_eq!(record.emissions_per_capita, None);
        assert_eq!(record.estimated_county_emissions, Some(500.0), "allocation uses carried census");
        assert!(!record.is_forward_filled);
    }

    #[test]
    fn test_forward_fill_never_borrows_a_later_census() {
        let mut rows = vec![census("Cork", 2022, 584_156.0)];
        for year in 2021..=2024 {
            rows.push(water("Cork", year, "Good", 2.0));
        }
        let integration = join(&rows);

        let y2021 = find(&integration, ViewKind::WaterPopulation, "Cork", 2021).unwrap();
        assert_eq!(y2021.population, None, "2022 census must not be back-filled");
        assert!(!y2021.is_forward_filled);

        let y2022 = find(&integration, ViewKind::WaterPopulation, "Cork", 2022).unwrap();
        assert_eq!(y2022.population, Some(584_156));
        assert!(!y2022.is_forward_filled);

        for year in [2023, 2024] {
            let record = find(&integration, ViewKind::WaterPopulation, "Cork", year).unwrap();
            assert_eq!(record.population, Some(584_156));
            assert!(record.is_forward_filled);
        }
        assert_eq!(integration.diagnostics.forward_filled_records, 2);
    }

    #[test]
    fn test_forward_fill_carries_most_recent_prior_census() {
        let rows = vec![
            census("Kerry", 2011, 145_502.0),
            census("Kerry", 2016, 147_707.0),
            census("Kerry", 2022, 156_458.0),
            water("Kerry", 2021, "Excellent", 10.0),
        ];
        let integration = join(&rows);

        let record = find(&integration, ViewKind::WaterPopulation, "Kerry", 2021).unwrap();
        assert_eq!(record.population, Some(147_707));
        assert!(record.is_forward_filled);
    }

    #[test]
    fn test_unmatched_region_is_excluded_everywhere_and_counted() {
        let rows = vec![
            census("Laois", 2022, 91_657.0),
            census("Co. Leix", 2022, 1_000.0),
            water("Co. Leix", 2022, "Good", 1.0),
        ];
        let integration = join(&rows);

        assert_eq!(integration.diagnostics.unmatched_regions["Co. Leix"], 2);
        for view in ViewKind::ALL {
            assert!(integration.view(view).iter().all(|r| r.county == key("Laois")));
        }
        let laois = find(&integration, ViewKind::PollutionPopulation, "Laois", 2022).unwrap();
        assert_eq!(laois.population, Some(91_657), "unmatched rows must not leak into sums");
    }

    #[test]
    fn test_local_authorities_fold_into_county() {
        let rows = vec![
            census("Dublin City", 2022, 592_713.0),
            census("Fingal", 2022, 330_506.0),
            census("South Dublin", 2022, 301_075.0),
            census("Dún Laoghaire-Rathdown", 2022, 233_860.0),
            water("Fingal County Council", 2022, "Excellent", 3.0),
            water("Dublin City Council", 2022, "Poor", 1.0),
        ];
        let integration = join(&rows);

        let record = find(&integration, ViewKind::WaterPopulation, "Dublin", 2022).unwrap();
        assert_eq!(record.population, Some(1_458_154));
        assert_eq!(record.bathing_sites, Some(4));
        assert_eq!(record.water_quality_score, Some(3.25));
    }

    #[test]
    fn test_row_errors_are_counted_not_fatal() {
        let rows = vec![
            water("Cork", 2022, "Fair", 1.0),
            water("Cork", 2022, "Good", f64::NAN),
            census("Cork", 2022, -5.0),
            RawObservation::new(DatasetId::Pollution, "Cork", 2022, "CO2", 10.0),
            water("Cork", 2022, "Good", 1.0),
        ];
        let integration = join(&rows);

        let diagnostics = &integration.diagnostics;
        assert_eq!(diagnostics.data_errors["unknown_rating"], 1);
        assert_eq!(diagnostics.data_errors["malformed_value"], 2);
        assert_eq!(diagnostics.data_errors["unexpected_county_row"], 1);
        let record = find(&integration, ViewKind::PollutionWater, "Cork", 2022).unwrap();
        assert_eq!(record.water_quality_score, Some(3.0));
    }

    #[test]
    fn test_national_rows_in_county_datasets_are_skipped() {
        let rows = vec![census("State", 2022, 5_149_139.0), water("Ireland", 2022, "Good", 140.0)];
        let integration = join(&rows);
        assert_eq!(integration.diagnostics.national_rows_skipped, 2);
        assert_eq!(integration.record_count(), 0);
    }

    #[test]
    fn test_counties_without_any_data_are_reported() {
        let rows = vec![census("Sligo", 2022, 70_198.0)];
        let integration = join(&rows);
        let missing = &integration.diagnostics.counties_without_data;
        assert_eq!(missing.len(), 25);
        assert!(!missing.contains(&key("Sligo")));
    }

    #[test]
    fn test_water_county_missing_from_census_is_excluded_from_allocation() {
        let rows = vec![
            pollution(2022, "CO2", 1000.0),
            census("Carlow", 2022, 100.0),
            water("Wexford", 2022, "Good", 1.0),
        ];
        let integration = join(&rows);

        assert_eq!(integration.diagnostics.allocation_exclusions[&2022], vec![key("Wexford")]);
        let record = find(&integration, ViewKind::PollutionWater, "Wexford", 2022).unwrap();
        assert_eq!(record.estimated_county_emissions, None);
    }

    #[test]
    fn test_years_without_census_or_totals_record_allocation_failures() {
        let rows = vec![
            pollution(2010, "CO2", 900.0),
            census("Carlow", 2011, 100.0),
            water("Carlow", 2010, "Good", 1.0),
            water("Carlow", 2024, "Good", 1.0),
        ];
        let integration = join(&rows);

        let failures = &integration.diagnostics.allocation_failures;
        assert!(failures[&2010].contains("no census"));
        assert!(failures[&2024].contains("no national emissions total"));
    }

    #[test]
    fn test_allocated_pollutant_selects_single_series() {
        let mut config = co2_only();
        config.emissions.allocated_pollutant = Some("nox".to_string());
        let rows = vec![
            pollution(2022, "CO2", 1000.0),
            pollution(2022, "NOx", 50.0),
            census("Carlow", 2022, 100.0),
        ];
        let integration = Joiner::from_config(&config).unwrap().join(&rows).unwrap();
        assert_eq!(integration.national_totals[&2022], 50.0);

        let summed = join(&rows);
        assert_eq!(summed.national_totals[&2022], 1050.0);
    }

    #[test]
    fn test_bad_weights_abort_join() {
        let mut config = AnalysisConfig::default();
        config.pollution_index.weights = [("CO2".to_string(), 2.0)].into_iter().collect();
        let joiner = Joiner::new(NameNormalizer::default(), &config);
        assert!(matches!(joiner.join(&[]), Err(ConfigError::WeightSum { .. })));
    }

    #[test]
    fn test_growth_is_computed_from_census_rows() {
        let rows = vec![census("Meath", 2016, 195_044.0), census("Meath", 2022, 220_826.0)];
        let integration = join(&rows);
        assert_eq!(integration.growth.len(), 1);
        assert_eq!(integration.growth[0].county, key("Meath"));
    }
}
