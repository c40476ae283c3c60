/// Pass-through persistence for one analysis run.
///
/// Every row is keyed by the run id, so re-running is harmless: inserts use
/// `ON CONFLICT DO NOTHING` and a run's rows are never rewritten. Measured
/// values go to NUMERIC columns via `rust_decimal`; statistics stay `f64`.
/// Schema: `sql/001_initial_schema.sql`.

use postgres::Client;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::analysis::analyzer::RunContext;
use crate::model::{AnalysisResult, DatasetId, IntegratedRecord, RawObservation};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Postgres(#[from] postgres::Error),

    #[error("{field} value {value} cannot be stored as NUMERIC")]
    Unrepresentable { field: &'static str, value: f64 },

    #[error("stored {field} {value} does not fit in memory type")]
    OutOfRange { field: &'static str, value: String },
}

fn to_numeric(field: &'static str, value: f64) -> Result<Decimal, StoreError> {
    Decimal::from_f64_retain(value).ok_or(StoreError::Unrepresentable { field, value })
}

fn to_numeric_opt(field: &'static str, value: Option<f64>) -> Result<Option<Decimal>, StoreError> {
    value.map(|v| to_numeric(field, v)).transpose()
}

fn to_i32(field: &'static str, value: usize) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::OutOfRange {
        field,
        value: value.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

pub fn save_run(client: &mut Client, run: &RunContext) -> Result<(), StoreError> {
    let served: Vec<String> = run.served_from_cache.iter().map(|d| d.as_str().to_string()).collect();
    client.execute(
        "INSERT INTO envpop.runs (run_id, generated_at, served_from_cache)
         VALUES ($1, $2, $3)
         ON CONFLICT (run_id) DO NOTHING",
        &[&run.run_id, &run.generated_at, &served],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

/// Stores collected rows for `run_id`. Returns the number inserted.
pub fn save_observations(
    client: &mut Client,
    run_id: &str,
    rows: &[RawObservation],
) -> Result<usize, StoreError> {
    let mut tx = client.transaction()?;
    let stmt = tx.prepare(
        "INSERT INTO envpop.observations (run_id, dataset_id, seq, region, year, indicator, value)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (run_id, dataset_id, seq) DO NOTHING",
    )?;

    let mut inserted = 0;
    for (seq, row) in rows.iter().enumerate() {
        let value = to_numeric("observation", row.value)?;
        inserted += tx.execute(
            &stmt,
            &[
                &run_id,
                &row.dataset_id.as_str(),
                &to_i32("seq", seq)?,
                &row.region,
                &row.year,
                &row.indicator,
                &value,
            ],
        )? as usize;
    }
    tx.commit()?;
    Ok(inserted)
}

/// Rows of one dataset stored for `run_id`, in collection order.
pub fn load_observations(
    client: &mut Client,
    dataset: DatasetId,
    run_id: &str,
) -> Result<Vec<RawObservation>, StoreError> {
    let rows = client.query(
        "SELECT region, year, indicator, value
         FROM envpop.observations
         WHERE dataset_id = $1 AND run_id = $2
         ORDER BY seq",
        &[&dataset.as_str(), &run_id],
    )?;

    rows.iter()
        .map(|row| -> Result<RawObservation, StoreError> {
            let value: Decimal = row.get(3);
            let value = value.to_f64().ok_or_else(|| StoreError::OutOfRange {
                field: "observation",
                value: value.to_string(),
            })?;
            Ok(RawObservation::new(dataset, row.get::<_, String>(0), row.get(1), row.get::<_, String>(2), value))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Integrated records and results
// ---------------------------------------------------------------------------

pub fn save_records(
    client: &mut Client,
    run_id: &str,
    records: &[IntegratedRecord],
) -> Result<usize, StoreError> {
    let mut tx = client.transaction()?;
    let stmt = tx.prepare(
        "INSERT INTO envpop.integrated_records (
            run_id, view, county, year, pollution_index, water_quality_score,
            population, is_forward_filled, emissions_per_capita,
            estimated_county_emissions, population_density, percent_excellent,
            percent_good_or_better, bathing_sites
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
         ON CONFLICT (run_id, view, county, year) DO NOTHING",
    )?;

    let mut inserted = 0;
    for record in records {
        let population = record
            .population
            .map(|p| {
                i64::try_from(p).map_err(|_| StoreError::OutOfRange {
                    field: "population",
                    value: p.to_string(),
                })
            })
            .transpose()?;
        let sites = record
            .bathing_sites
            .map(|s| to_i32("bathing_sites", s as usize))
            .transpose()?;

        inserted += tx.execute(
            &stmt,
            &[
                &run_id,
                &record.view.as_str(),
                &record.county.name(),
                &record.year,
                &to_numeric_opt("pollution_index", record.pollution_index)?,
                &to_numeric_opt("water_quality_score", record.water_quality_score)?,
                &population,
                &record.is_forward_filled,
                &to_numeric_opt("emissions_per_capita", record.emissions_per_capita)?,
                &to_numeric_opt("estimated_county_emissions", record.estimated_county_emissions)?,
                &to_numeric_opt("population_density", record.population_density)?,
                &to_numeric_opt("percent_excellent", record.percent_excellent)?,
                &to_numeric_opt("percent_good_or_better", record.percent_good_or_better)?,
                &sites,
            ],
        )? as usize;
    }
    tx.commit()?;
    Ok(inserted)
}

pub fn save_results(
    client: &mut Client,
    run_id: &str,
    results: &[AnalysisResult],
) -> Result<usize, StoreError> {
    let mut tx = client.transaction()?;
    let stmt = tx.prepare(
        "INSERT INTO envpop.analysis_results (
            run_id, seq, kind, view, subject, metric_pair, correlation_coefficient,
            p_value, sample_size, trend_slope, trend_test_statistic, f_statistic,
            not_computed_reason
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
         ON CONFLICT (run_id, seq) DO NOTHING",
    )?;

    let mut inserted = 0;
    for (seq, result) in results.iter().enumerate() {
        inserted += tx.execute(
            &stmt,
            &[
                &run_id,
                &to_i32("seq", seq)?,
                &result.kind.as_str(),
                &result.view.map(|v| v.as_str()),
                &result.subject,
                &result.metric_pair,
                &result.correlation_coefficient,
                &result.p_value,
                &to_i32("sample_size", result.sample_size)?,
                &result.trend_slope,
                &result.trend_test_statistic,
                &result.f_statistic,
                &result.not_computed_reason,
            ],
        )? as usize;
    }
    tx.commit()?;
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_conversion_keeps_value() {
        let value = to_numeric("observation", 61968.0).unwrap();
        assert_eq!(value.to_f64(), Some(61968.0));
        assert_eq!(to_numeric_opt("pollution_index", None).unwrap(), None);
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        assert!(matches!(
            to_numeric("observation", f64::NAN),
            Err(StoreError::Unrepresentable { field: "observation", .. })
        ));
        assert!(to_numeric_opt("water_quality_score", Some(f64::INFINITY)).is_err());
    }

    #[test]
    fn test_sequence_overflow_is_reported() {
        assert_eq!(to_i32("seq", 12).unwrap(), 12);
        assert!(matches!(to_i32("seq", usize::MAX), Err(StoreError::OutOfRange { .. })));
    }
}
