/// Proportional allocation of national emission totals to counties.
///
/// Emissions are only published nationally, so county figures are
/// estimated by population share:
///
/// ```text
/// estimate[c] = national_total * population[c] / sum(population)
/// ```
///
/// This is an approximation, not a measurement. Any correlation computed on
/// allocated emissions inherits the assumption that emissions scale with
/// head count.
///
/// Census selection is carry-forward: a target year uses the most recent
/// census at or before it, never a later one.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AllocationError {
    #[error("population mapping is empty; no allocation possible")]
    EmptyPopulation,

    #[error("population mapping sums to zero; no allocation possible")]
    ZeroPopulation,

    #[error("national total {0} is not a finite number")]
    InvalidNationalTotal(f64),
}

/// Result of one allocation call.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation<K> {
    pub national_total: f64,
    pub population_total: u64,
    /// Requested keys present in the population mapping.
    pub estimates: BTreeMap<K, f64>,
    /// Requested keys absent from the mapping. They get no estimate at all
    /// (not zero) so coverage reporting stays honest.
    pub excluded: Vec<K>,
}

impl<K: Ord> Allocation<K> {
    pub fn estimate(&self, key: &K) -> Option<f64> {
        self.estimates.get(key).copied()
    }
}

/// Spreads `national_total` over the `requested` keys by population share.
///
/// Shares are taken over the whole mapping, so requesting a subset never
/// inflates the estimates of the counties that are present.
///
/// # Errors
/// - `AllocationError::EmptyPopulation` — the mapping has no entries.
/// - `AllocationError::ZeroPopulation` — the mapping sums to zero.
/// - `AllocationError::InvalidNationalTotal` — NaN or infinite total.
pub fn allocate<K, I>(
    national_total: f64,
    populations: &BTreeMap<K, u64>,
    requested: I,
) -> Result<Allocation<K>, AllocationError>
where
    K: Ord + Clone,
    I: IntoIterator<Item = K>,
{
    if !national_total.is_finite() {
        return Err(AllocationError::InvalidNationalTotal(national_total));
    }
    if populations.is_empty() {
        return Err(AllocationError::EmptyPopulation);
    }
    let population_total: u64 = populations.values().sum();
    if population_total == 0 {
        return Err(AllocationError::ZeroPopulation);
    }

    let mut estimates = BTreeMap::new();
    let mut excluded = Vec::new();
    for key in requested {
        if estimates.contains_key(&key) || excluded.contains(&key) {
            continue;
        }
        match populations.get(&key) {
            Some(&population) => {
                let estimate = national_total * population as f64 / population_total as f64;
                estimates.insert(key, estimate);
            }
            None => excluded.push(key),
        }
    }

    Ok(Allocation {
        national_total,
        population_total,
        estimates,
        excluded,
    })
}

/// The most recent census year at or before `year`.
///
/// Returns `None` for years before the first census: population is never
/// carried backwards.
pub fn census_year_for<I>(year: i32, census_years: I) -> Option<i32>
where
    I: IntoIterator<Item = i32>,
{
    census_years.into_iter().filter(|&c| c <= year).max()
}
