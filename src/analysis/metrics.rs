/// Derived metrics computed from the normalized datasets.
///
/// - `pollution_index_by_year` — weighted composite of pollutants, each
///   scaled 0-100 against its own maximum over the observed years.
/// - `WaterRating` / `summarize_ratings` — ordinal bathing-water scores
///   (Poor=1 … Excellent=4) aggregated per county-year by site count.
/// - `emissions_per_capita` — allocated emissions over population; missing,
///   never zero or infinite, when population is absent or zero.
/// - `population_density`, `census_growth` — supplementary county metrics.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{ConfigError, PollutionIndexConfig};
use crate::counties::CountyKey;
use crate::model::DataError;

// ---------------------------------------------------------------------------
// Pollution index
// ---------------------------------------------------------------------------

/// National pollution index per year, plus the years that could not be
/// scored because a weighted pollutant was missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollutionIndex {
    pub by_year: BTreeMap<i32, f64>,
    pub errors: Vec<DataError>,
}

/// Comparison key for a pollutant label: the code in trailing parentheses
/// when present ("Carbon dioxide (CO2)" → "co2"), else the whole label,
/// lowercased.
pub fn pollutant_key(label: &str) -> String {
    let label = label.trim();
    let code = label
        .strip_suffix(')')
        .and_then(|rest| rest.rsplit_once('('))
        .map(|(_, code)| code.trim())
        .filter(|code| !code.is_empty())
        .unwrap_or(label);
    code.to_lowercase()
}

/// Computes the composite index from national pollutant values
/// (`year → pollutant → value`).
///
/// Pollutant labels are matched through [`pollutant_key`], so a weight for
/// "CO2" picks up "Carbon dioxide (CO2)". A pollutant whose maximum is zero
/// contributes zero.
///
/// # Errors
/// `ConfigError` when the weights are malformed; this aborts the index
/// computation entirely.
pub fn pollution_index_by_year(
    config: &PollutionIndexConfig,
    national: &BTreeMap<i32, BTreeMap<String, f64>>,
) -> Result<PollutionIndex, ConfigError> {
    config.validate()?;

    let by_label: BTreeMap<i32, BTreeMap<String, f64>> = national
        .iter()
        .map(|(year, values)| {
            let lowered = values.iter().map(|(p, v)| (pollutant_key(p), *v)).collect();
            (*year, lowered)
        })
        .collect();

    let mut maxima: BTreeMap<String, f64> = BTreeMap::new();
    for values in by_label.values() {
        for (pollutant, &value) in values {
            let max = maxima.entry(pollutant.clone()).or_insert(0.0);
            if value > *max {
                *max = value;
            }
        }
    }

    let mut index = PollutionIndex::default();
    'years: for (&year, values) in &by_label {
        let mut score = 0.0;
        for (pollutant, &weight) in &config.weights {
            let key = pollutant_key(pollutant);
            let Some(&value) = values.get(&key) else {
                index.errors.push(DataError::MissingPollutant {
                    pollutant: pollutant.clone(),
                    year,
                });
                continue 'years;
            };
            let max = maxima.get(&key).copied().unwrap_or(0.0);
            if max > 0.0 {
                score += weight * value / max * 100.0;
            }
        }
        index.by_year.insert(year, score);
    }

    Ok(index)
}

// ---------------------------------------------------------------------------
// Water quality
// ---------------------------------------------------------------------------

/// EU Bathing Water Directive classifications, ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum WaterRating {
    Poor,
    Sufficient,
    Good,
    Excellent,
}

impl WaterRating {
    /// Case-insensitive parse of a classification label.
    ///
    /// Unknown labels return `None`; callers turn that into a
    /// [`DataError::UnknownRating`] rather than guessing a score.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "poor" => Some(WaterRating::Poor),
            "sufficient" => Some(WaterRating::Sufficient),
            "good" => Some(WaterRating::Good),
            "excellent" => Some(WaterRating::Excellent),
            _ => None,
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            WaterRating::Poor => 1.0,
            WaterRating::Sufficient => 2.0,
            WaterRating::Good => 3.0,
            WaterRating::Excellent => 4.0,
        }
    }
}

/// Per county-year water quality aggregate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaterSummary {
    /// Site-weighted mean score on the 1-4 scale.
    pub score: f64,
    pub sites: u32,
    pub percent_excellent: f64,
    pub percent_good_or_better: f64,
}

/// Aggregates site counts per rating. Returns `None` when no sites are
/// counted at all.
pub fn summarize_ratings(counts: &BTreeMap<WaterRating, f64>) -> Option<WaterSummary> {
    let sites: f64 = counts.values().sum();
    if sites <= 0.0 {
        return None;
    }
    let weighted: f64 = counts.iter().map(|(r, n)| r.score() * n).sum();
    let excellent = counts.get(&WaterRating::Excellent).copied().unwrap_or(0.0);
    let good_or_better = excellent + counts.get(&WaterRating::Good).copied().unwrap_or(0.0);

    Some(WaterSummary {
        score: weighted / sites,
        sites: sites.round() as u32,
        percent_excellent: excellent / sites * 100.0,
        percent_good_or_better: good_or_better / sites * 100.0,
    })
}

// ---------------------------------------------------------------------------
// Population-derived metrics
// ---------------------------------------------------------------------------

/// Allocated emissions per resident. `None` when either input is missing or
/// population is zero.
pub fn emissions_per_capita(estimated_emissions: Option<f64>, population: Option<u64>) -> Option<f64> {
    let emissions = estimated_emissions?;
    let population = population.filter(|&p| p > 0)?;
    let per_capita = emissions / population as f64;
    per_capita.is_finite().then_some(per_capita)
}

/// Residents per km² of county land area.
pub fn population_density(population: Option<u64>, county: CountyKey) -> Option<f64> {
    let population = population?;
    Some(population as f64 / county.info().area_km2)
}

/// Population change between two consecutive censuses for one county.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountyGrowth {
    pub county: CountyKey,
    pub from_year: i32,
    pub to_year: i32,
    pub from_population: u64,
    pub to_population: u64,
    pub percent_change: f64,
}

/// Growth between each pair of consecutive censuses, per county.
/// Pairs starting from a zero population are skipped.
pub fn census_growth(populations: &BTreeMap<CountyKey, BTreeMap<i32, u64>>) -> Vec<CountyGrowth> {
    let mut growth = Vec::new();
    for (&county, by_year) in populations {
        let censuses: Vec<(i32, u64)> = by_year.iter().map(|(y, p)| (*y, *p)).collect();
        for pair in censuses.windows(2) {
            let (from_year, from_population) = pair[0];
            let (to_year, to_population) = pair[1];
            if from_population == 0 {
                continue;
            }
            let percent_change =
                (to_population as f64 - from_population as f64) / from_population as f64 * 100.0;
            growth.push(CountyGrowth {
                county,
                from_year,
                to_year,
                from_population,
                to_population,
                percent_change,
            });
        }
    }
    growth
}
