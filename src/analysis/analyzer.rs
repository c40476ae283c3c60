/// Statistical analyzer: runs the fixed analysis suite over the integrated
/// views and assembles the bundle handed to persistence and the report.
///
/// Per view:
/// - correlations between fixed metric pairs (records missing either value
///   are skipped)
/// - trends, nationally (per-year mean across counties) and per county,
///   each as an OLS fit plus a Mann-Kendall test with an agreement flag
/// - one-way ANOVA of a metric across counties
/// - descriptive statistics of every metric the view carries
/// - a pairwise correlation matrix over those metrics
///
/// Plus national period growth, rankings, an emissions × water median-split quadrant table, census
/// growth, and plain-language insights. Anything that could not be computed
/// is kept in the bundle with its reason.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::join::Integration;
use crate::analysis::metrics::CountyGrowth;
use crate::analysis::stats::{
    self, ALPHA, Descriptive, InsufficientDataError, MannKendall, Regression, Strength,
    TrendDirection,
};
use crate::counties::CountyKey;
use crate::model::{
    AnalysisKind, AnalysisResult, CoverageDiagnostics, DatasetId, IntegratedRecord, Metric,
    MetricFamily, ViewKind,
};

// ---------------------------------------------------------------------------
// Fixed analysis suite
// ---------------------------------------------------------------------------

fn correlation_pairs(view: ViewKind) -> &'static [(Metric, Metric)] {
    match view {
        ViewKind::PollutionPopulation => &[
            (Metric::Population, Metric::EstimatedCountyEmissions),
            (Metric::PopulationDensity, Metric::EmissionsPerCapita),
            (Metric::PollutionIndex, Metric::Population),
        ],
        ViewKind::PollutionWater => &[
            (Metric::PollutionIndex, Metric::WaterQualityScore),
            (Metric::EstimatedCountyEmissions, Metric::WaterQualityScore),
            (Metric::EstimatedCountyEmissions, Metric::PercentExcellent),
        ],
        ViewKind::WaterPopulation => &[
            (Metric::Population, Metric::WaterQualityScore),
            (Metric::PopulationDensity, Metric::WaterQualityScore),
            (Metric::EmissionsPerCapita, Metric::WaterQualityScore),
        ],
    }
}

/// (metric, also per county). The pollution index is national, so a
/// per-county trend would only repeat the national one.
fn trend_metrics(view: ViewKind) -> &'static [(Metric, bool)] {
    match view {
        ViewKind::PollutionPopulation => &[(Metric::Population, true)],
        ViewKind::PollutionWater => &[(Metric::PollutionIndex, false), (Metric::WaterQualityScore, true)],
        ViewKind::WaterPopulation => &[(Metric::PercentExcellent, true)],
    }
}

fn group_metric(view: ViewKind) -> Metric {
    match view {
        ViewKind::PollutionPopulation => Metric::Population,
        ViewKind::PollutionWater => Metric::WaterQualityScore,
        ViewKind::WaterPopulation => Metric::PercentExcellent,
    }
}

/// Metrics a view carries, in matrix order.
fn view_metrics(view: ViewKind) -> &'static [Metric] {
    match view {
        ViewKind::PollutionPopulation => &[
            Metric::PollutionIndex,
            Metric::EstimatedCountyEmissions,
            Metric::EmissionsPerCapita,
            Metric::Population,
            Metric::PopulationDensity,
        ],
        ViewKind::PollutionWater => &[
            Metric::PollutionIndex,
            Metric::EstimatedCountyEmissions,
            Metric::WaterQualityScore,
            Metric::PercentExcellent,
            Metric::PercentGoodOrBetter,
            Metric::Population,
        ],
        ViewKind::WaterPopulation => &[
            Metric::EstimatedCountyEmissions,
            Metric::EmissionsPerCapita,
            Metric::WaterQualityScore,
            Metric::PercentExcellent,
            Metric::PercentGoodOrBetter,
            Metric::Population,
            Metric::PopulationDensity,
        ],
    }
}

// (view, metric) pairs ranked for the most recent year of the view.
const RANKINGS: &[(ViewKind, Metric)] = &[
    (ViewKind::PollutionWater, Metric::WaterQualityScore),
    (ViewKind::WaterPopulation, Metric::PercentExcellent),
    (ViewKind::PollutionPopulation, Metric::EstimatedCountyEmissions),
    (ViewKind::PollutionPopulation, Metric::PopulationDensity),
];

const LIMITATIONS: &[&str] = &[
    "County emissions are estimated by population share of a national total; no county measurement exists.",
    "No correction for multiple comparisons is applied; p-values are reported unrounded.",
    "Population outside census years is carried forward from the most recent prior census and flagged.",
    "The pollution index is national and identical for every county within a year.",
];

// ---------------------------------------------------------------------------
// Bundle types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationEntry {
    pub view: ViewKind,
    pub x: Metric,
    pub y: Metric,
    pub n: usize,
    pub r: Option<f64>,
    pub p_value: Option<f64>,
    pub significant: bool,
    pub strength: Option<Strength>,
    pub not_computed_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendEntry {
    pub view: Option<ViewKind>,
    pub metric: Metric,
    /// `"national"` or a county name.
    pub subject: String,
    pub n: usize,
    pub regression: Option<Regression>,
    pub mann_kendall: Option<MannKendall>,
    pub direction: Option<TrendDirection>,
    /// Whether regression and Mann-Kendall reach the same verdict at α.
    pub agreement: Option<bool>,
    pub not_computed_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupComparisonEntry {
    pub view: ViewKind,
    pub metric: Metric,
    pub groups_offered: usize,
    pub anova: Option<stats::Anova>,
    pub significant: bool,
    pub not_computed_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCounty {
    pub rank: usize,
    pub county: CountyKey,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ranking {
    pub view: ViewKind,
    pub metric: Metric,
    pub year: i32,
    pub lower_is_better: bool,
    pub counties: Vec<RankedCounty>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quadrant {
    HighEmissionsGoodWater,
    HighEmissionsPoorWater,
    LowEmissionsGoodWater,
    LowEmissionsPoorWater,
}

impl Quadrant {
    pub fn label(&self) -> &'static str {
        match self {
            Quadrant::HighEmissionsGoodWater => "High emissions, good water",
            Quadrant::HighEmissionsPoorWater => "High emissions, poor water",
            Quadrant::LowEmissionsGoodWater => "Low emissions, good water",
            Quadrant::LowEmissionsPoorWater => "Low emissions, poor water",
        }
    }

    /// Values at or above the median count as high / good.
    fn classify(emissions: f64, water: f64, emissions_median: f64, water_median: f64) -> Self {
        match (emissions >= emissions_median, water >= water_median) {
            (true, true) => Quadrant::HighEmissionsGoodWater,
            (true, false) => Quadrant::HighEmissionsPoorWater,
            (false, true) => Quadrant::LowEmissionsGoodWater,
            (false, false) => Quadrant::LowEmissionsPoorWater,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuadrantSummary {
    pub year: i32,
    pub emissions_median: f64,
    pub water_median: f64,
    pub assignments: Vec<(CountyKey, Quadrant)>,
    pub counts: BTreeMap<Quadrant, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DescriptiveSummary {
    pub view: ViewKind,
    pub metric: Metric,
    pub stats: Option<Descriptive>,
    pub not_computed_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatrixCell {
    pub x: Metric,
    pub y: Metric,
    pub n: usize,
    pub r: Option<f64>,
    pub p_value: Option<f64>,
    pub not_computed_reason: Option<String>,
}

/// Pairwise-complete Pearson correlations between the metrics of one view.
/// Holds one cell per unordered pair; the diagonal is implicit.
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationMatrix {
    pub view: ViewKind,
    pub metrics: Vec<Metric>,
    pub cells: Vec<MatrixCell>,
}

impl CorrelationMatrix {
    pub fn cell(&self, a: Metric, b: Metric) -> Option<&MatrixCell> {
        self.cells
            .iter()
            .find(|c| (c.x == a && c.y == b) || (c.x == b && c.y == a))
    }

    /// Cells pairing a metric of `family` with a metric of any of `others`.
    pub fn cross(&self, family: MetricFamily, others: &[MetricFamily]) -> Vec<&MatrixCell> {
        let pairs = |a: Metric, b: Metric| a.family() == family && others.contains(&b.family());
        self.cells
            .iter()
            .filter(|c| pairs(c.x, c.y) || pairs(c.y, c.x))
            .collect()
    }
}

/// Change between the first and last census years that also carry a
/// national emissions total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NationalGrowth {
    pub from_year: i32,
    pub to_year: i32,
    /// Sum over matched counties.
    pub population_from: u64,
    pub population_to: u64,
    pub population_change_pct: Option<f64>,
    pub emissions_from: f64,
    pub emissions_to: f64,
    pub emissions_change_pct: Option<f64>,
}

/// Identity of one analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    /// Datasets whose live fetch failed and that were served from cache.
    pub served_from_cache: Vec<DatasetId>,
}

impl RunContext {
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Self {
            run_id: generated_at.format("run-%Y%m%dT%H%M%SZ").to_string(),
            generated_at,
            served_from_cache: Vec::new(),
        }
    }
}

/// Everything the report renderer and the store need.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisBundle {
    pub run: RunContext,
    pub view_counts: BTreeMap<ViewKind, usize>,
    pub pollution_index: BTreeMap<i32, f64>,
    pub national_pollution_trend: TrendEntry,
    pub correlations: Vec<CorrelationEntry>,
    pub trends: Vec<TrendEntry>,
    pub group_comparisons: Vec<GroupComparisonEntry>,
    pub descriptives: Vec<DescriptiveSummary>,
    pub correlation_matrices: Vec<CorrelationMatrix>,
    pub national_growth: Option<NationalGrowth>,
    pub rankings: Vec<Ranking>,
    pub quadrants: Option<QuadrantSummary>,
    pub growth: Vec<CountyGrowth>,
    pub insights: Vec<String>,
    pub limitations: Vec<String>,
    pub results: Vec<AnalysisResult>,
    pub diagnostics: CoverageDiagnostics,
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Runs the full suite. Never fails: tests that cannot run are reported as
/// not computed.
pub fn analyze(integration: &Integration, run: RunContext) -> AnalysisBundle {
    let mut correlations = Vec::new();
    let mut trends = Vec::new();
    let mut group_comparisons = Vec::new();
    let mut descriptives = Vec::new();
    let mut correlation_matrices = Vec::new();

    for view in ViewKind::ALL {
        let records = integration.view(view);
        for &(x, y) in correlation_pairs(view) {
            correlations.push(correlate(view, records, x, y));
        }
        for &(metric, per_county) in trend_metrics(view) {
            trends.push(trend_entry(Some(view), metric, "national".to_string(), &national_series(records, metric)));
            if per_county {
                for (county, points) in county_series(records, metric) {
                    trends.push(trend_entry(Some(view), metric, county.name().to_string(), &points));
                }
            }
        }
        group_comparisons.push(compare_groups(view, records, group_metric(view)));
        descriptives.extend(view_metrics(view).iter().map(|&metric| describe_metric(view, records, metric)));
        correlation_matrices.push(correlation_matrix(view, records));
    }
    let national_growth = national_growth(integration);

    let national_points: Vec<(i32, f64)> =
        integration.pollution_index.iter().map(|(y, v)| (*y, *v)).collect();
    let national_pollution_trend =
        trend_entry(None, Metric::PollutionIndex, "national".to_string(), &national_points);

    let rankings: Vec<Ranking> = RANKINGS
        .iter()
        .filter_map(|&(view, metric)| rank_latest(view, integration.view(view), metric))
        .collect();
    let quadrants = quadrant_summary(integration.view(ViewKind::PollutionWater));

    let mut results = Vec::new();
    results.push(flatten_trend(&national_pollution_trend));
    results.extend(correlations.iter().map(flatten_correlation));
    results.extend(trends.iter().map(flatten_trend));
    results.extend(group_comparisons.iter().map(flatten_group));

    let mut diagnostics = integration.diagnostics.clone();
    diagnostics.not_computed_results = results.iter().filter(|r| !r.is_computed()).count();

    let view_counts = ViewKind::ALL
        .into_iter()
        .map(|view| (view, integration.view(view).len()))
        .collect();

    let insights = insights(
        &correlations,
        &national_pollution_trend,
        &trends,
        national_growth.as_ref(),
        &rankings,
        &integration.growth,
        &diagnostics,
    );

    log::info!(
        "Analysis complete: {} results, {} not computed",
        results.len(),
        diagnostics.not_computed_results
    );

    AnalysisBundle {
        run,
        view_counts,
        pollution_index: integration.pollution_index.clone(),
        national_pollution_trend,
        correlations,
        trends,
        group_comparisons,
        descriptives,
        correlation_matrices,
        national_growth,
        rankings,
        quadrants,
        growth: integration.growth.clone(),
        insights,
        limitations: LIMITATIONS.iter().map(|s| s.to_string()).collect(),
        results,
        diagnostics,
    }
}

fn correlate(view: ViewKind, records: &[IntegratedRecord], x: Metric, y: Metric) -> CorrelationEntry {
    let pairs: Vec<(f64, f64)> = records
        .iter()
        .filter_map(|r| Some((x.value(r)?, y.value(r)?)))
        .collect();

    let mut entry = CorrelationEntry {
        view,
        x,
        y,
        n: pairs.len(),
        r: None,
        p_value: None,
        significant: false,
        strength: None,
        not_computed_reason: None,
    };
    match stats::pearson(&pairs) {
        Ok(c) => {
            entry.r = Some(c.r);
            entry.p_value = Some(c.p_value);
            entry.significant = c.significant();
            entry.strength = Some(c.strength());
        }
        Err(err) => entry.not_computed_reason = Some(err.to_string()),
    }
    entry
}

/// Per-year mean of a metric across counties.
fn national_series(records: &[IntegratedRecord], metric: Metric) -> Vec<(i32, f64)> {
    let mut by_year: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for record in records {
        if let Some(value) = metric.value(record) {
            by_year.entry(record.year).or_default().push(value);
        }
    }
    by_year.into_iter().map(|(year, values)| (year, stats::mean(&values))).collect()
}

fn county_series(records: &[IntegratedRecord], metric: Metric) -> BTreeMap<CountyKey, Vec<(i32, f64)>> {
    let mut by_county: BTreeMap<CountyKey, Vec<(i32, f64)>> = BTreeMap::new();
    for record in records {
        if let Some(value) = metric.value(record) {
            by_county.entry(record.county).or_default().push((record.year, value));
        }
    }
    for points in by_county.values_mut() {
        points.sort_by_key(|(year, _)| *year);
    }
    by_county
}

fn trend_entry(view: Option<ViewKind>, metric: Metric, subject: String, points: &[(i32, f64)]) -> TrendEntry {
    let mut entry = TrendEntry {
        view,
        metric,
        subject,
        n: points.len(),
        regression: None,
        mann_kendall: None,
        direction: None,
        agreement: None,
        not_computed_reason: None,
    };

    let xy: Vec<(f64, f64)> = points.iter().map(|(y, v)| (*y as f64, *v)).collect();
    let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
    let outcome: Result<(Regression, MannKendall), InsufficientDataError> =
        stats::linear_regression(&xy).and_then(|reg| Ok((reg, stats::mann_kendall(&values)?)));

    match outcome {
        Ok((regression, mk)) => {
            entry.direction = Some(mk.direction());
            entry.agreement = Some(methods_agree(&regression, &mk));
            entry.regression = Some(regression);
            entry.mann_kendall = Some(mk);
        }
        Err(err) => entry.not_computed_reason = Some(err.to_string()),
    }
    entry
}

/// Same significance verdict, and the same sign when both are significant.
fn methods_agree(regression: &Regression, mk: &MannKendall) -> bool {
    let reg_significant = regression.p_value < ALPHA;
    let mk_significant = mk.p_value < ALPHA;
    if reg_significant != mk_significant {
        return false;
    }
    !reg_significant || (regression.slope > 0.0) == (mk.s > 0)
}

fn compare_groups(view: ViewKind, records: &[IntegratedRecord], metric: Metric) -> GroupComparisonEntry {
    let groups: Vec<Vec<f64>> = county_series(records, metric)
        .into_values()
        .map(|points| points.into_iter().map(|(_, v)| v).collect())
        .collect();

    let mut entry = GroupComparisonEntry {
        view,
        metric,
        groups_offered: groups.len(),
        anova: None,
        significant: false,
        not_computed_reason: None,
    };
    match stats::one_way_anova(&groups) {
        Ok(anova) => {
            entry.significant = anova.p_value < ALPHA;
            entry.anova = Some(anova);
        }
        Err(err) => entry.not_computed_reason = Some(err.to_string()),
    }
    entry
}

fn describe_metric(view: ViewKind, records: &[IntegratedRecord], metric: Metric) -> DescriptiveSummary {
    let values: Vec<f64> = records.iter().filter_map(|r| metric.value(r)).collect();
    let (stats, not_computed_reason) = match stats::describe(&values) {
        Ok(d) => (Some(d), None),
        Err(err) => (None, Some(err.to_string())),
    };
    DescriptiveSummary {
        view,
        metric,
        stats,
        not_computed_reason,
    }
}

fn correlation_matrix(view: ViewKind, records: &[IntegratedRecord]) -> CorrelationMatrix {
    let metrics = view_metrics(view);
    let mut cells = Vec::new();
    for (i, &x) in metrics.iter().enumerate() {
        for &y in &metrics[i + 1..] {
            let entry = correlate(view, records, x, y);
            cells.push(MatrixCell {
                x,
                y,
                n: entry.n,
                r: entry.r,
                p_value: entry.p_value,
                not_computed_reason: entry.not_computed_reason,
            });
        }
    }
    CorrelationMatrix {
        view,
        metrics: metrics.to_vec(),
        cells,
    }
}

fn national_growth(integration: &Integration) -> Option<NationalGrowth> {
    let mut population: BTreeMap<i32, u64> = BTreeMap::new();
    for record in integration.view(ViewKind::PollutionPopulation) {
        if let Some(p) = record.population {
            *population.entry(record.year).or_insert(0) += p;
        }
    }
    let years: Vec<i32> = population
        .keys()
        .copied()
        .filter(|year| integration.national_totals.contains_key(year))
        .collect();
    let (&from_year, &to_year) = (years.first()?, years.last()?);
    if from_year == to_year {
        return None;
    }

    let population_from = population[&from_year];
    let population_to = population[&to_year];
    let emissions_from = integration.national_totals[&from_year];
    let emissions_to = integration.national_totals[&to_year];

    Some(NationalGrowth {
        from_year,
        to_year,
        population_from,
        population_to,
        population_change_pct: percent_change(population_from as f64, population_to as f64),
        emissions_from,
        emissions_to,
        emissions_change_pct: percent_change(emissions_from, emissions_to),
    })
}

fn percent_change(from: f64, to: f64) -> Option<f64> {
    (from != 0.0).then(|| (to - from) / from * 100.0)
}

fn rank_latest(view: ViewKind, records: &[IntegratedRecord], metric: Metric) -> Option<Ranking> {
    let year = records
        .iter()
        .filter(|r| metric.value(r).is_some())
        .map(|r| r.year)
        .max()?;

    let mut values: Vec<(CountyKey, f64)> = records
        .iter()
        .filter(|r| r.year == year)
        .filter_map(|r| Some((r.county, metric.value(r)?)))
        .collect();

    let lower_is_better = metric.lower_is_better();
    values.sort_by(|(ca, a), (cb, b)| {
        let ordering = if lower_is_better { a.total_cmp(b) } else { b.total_cmp(a) };
        ordering.then(ca.cmp(cb))
    });

    Some(Ranking {
        view,
        metric,
        year,
        lower_is_better,
        counties: values
            .into_iter()
            .enumerate()
            .map(|(i, (county, value))| RankedCounty { rank: i + 1, county, value })
            .collect(),
    })
}

/// Median split of estimated emissions against water score, for the most
/// recent year with at least two counties carrying both.
fn quadrant_summary(records: &[IntegratedRecord]) -> Option<QuadrantSummary> {
    let mut by_year: BTreeMap<i32, Vec<(CountyKey, f64, f64)>> = BTreeMap::new();
    for record in records {
        if let (Some(emissions), Some(water)) =
            (record.estimated_county_emissions, record.water_quality_score)
        {
            by_year.entry(record.year).or_default().push((record.county, emissions, water));
        }
    }
    let (&year, rows) = by_year.iter().rev().find(|(_, rows)| rows.len() >= 2)?;

    let emissions: Vec<f64> = rows.iter().map(|(_, e, _)| *e).collect();
    let water: Vec<f64> = rows.iter().map(|(_, _, w)| *w).collect();
    let emissions_median = stats::median(&emissions)?;
    let water_median = stats::median(&water)?;

    let assignments: Vec<(CountyKey, Quadrant)> = rows
        .iter()
        .map(|&(county, e, w)| (county, Quadrant::classify(e, w, emissions_median, water_median)))
        .collect();
    let mut counts = BTreeMap::new();
    for (_, quadrant) in &assignments {
        *counts.entry(*quadrant).or_insert(0) += 1;
    }

    Some(QuadrantSummary {
        year,
        emissions_median,
        water_median,
        assignments,
        counts,
    })
}

// ---------------------------------------------------------------------------
// Flattening
// ---------------------------------------------------------------------------

fn flatten_correlation(entry: &CorrelationEntry) -> AnalysisResult {
    AnalysisResult {
        kind: AnalysisKind::Correlation,
        view: Some(entry.view),
        subject: "counties".to_string(),
        metric_pair: format!("{}~{}", entry.x, entry.y),
        correlation_coefficient: entry.r,
        p_value: entry.p_value,
        sample_size: entry.n,
        trend_slope: None,
        trend_test_statistic: None,
        f_statistic: None,
        not_computed_reason: entry.not_computed_reason.clone(),
    }
}

fn flatten_trend(entry: &TrendEntry) -> AnalysisResult {
    AnalysisResult {
        kind: AnalysisKind::Trend,
        view: entry.view,
        subject: entry.subject.clone(),
        metric_pair: format!("year~{}", entry.metric),
        correlation_coefficient: None,
        p_value: entry.regression.map(|r| r.p_value),
        sample_size: entry.n,
        trend_slope: entry.regression.map(|r| r.slope),
        trend_test_statistic: entry.mann_kendall.map(|mk| mk.z),
        f_statistic: None,
        not_computed_reason: entry.not_computed_reason.clone(),
    }
}

fn flatten_group(entry: &GroupComparisonEntry) -> AnalysisResult {
    AnalysisResult {
        kind: AnalysisKind::GroupComparison,
        view: Some(entry.view),
        subject: "counties".to_string(),
        metric_pair: format!("county~{}", entry.metric),
        correlation_coefficient: None,
        p_value: entry.anova.map(|a| a.p_value),
        sample_size: entry.anova.map(|a| a.n).unwrap_or(0),
        trend_slope: None,
        trend_test_statistic: None,
        f_statistic: entry.anova.map(|a| a.f_statistic),
        not_computed_reason: entry.not_computed_reason.clone(),
    }
}

// ---------------------------------------------------------------------------
// Insights
// ---------------------------------------------------------------------------

fn insights(
    correlations: &[CorrelationEntry],
    pollution_trend: &TrendEntry,
    trends: &[TrendEntry],
    national_growth: Option<&NationalGrowth>,
    rankings: &[Ranking],
    growth: &[CountyGrowth],
    diagnostics: &CoverageDiagnostics,
) -> Vec<String> {
    let mut lines = Vec::new();

    if let (Some(reg), Some(mk)) = (pollution_trend.regression, pollution_trend.mann_kendall) {
        let verdict = match mk.direction() {
            TrendDirection::Increasing => "rising",
            TrendDirection::Decreasing => "falling",
            TrendDirection::NoTrend => "without a significant monotonic trend",
        };
        lines.push(format!(
            "The national pollution index is {} over {} years (slope {:+.3} per year, Mann-Kendall p = {:.4}).",
            verdict, pollution_trend.n, reg.slope, mk.p_value
        ));
    }

    if let Some(g) = national_growth {
        if let (Some(pop), Some(emissions)) = (g.population_change_pct, g.emissions_change_pct) {
            lines.push(format!(
                "Between {} and {} county population changed by {:+.1}% and national emissions by {:+.1}%.",
                g.from_year, g.to_year, pop, emissions
            ));
        }
    }

    let significant: Vec<&CorrelationEntry> = correlations.iter().filter(|c| c.significant).collect();
    if significant.is_empty() {
        lines.push(format!("No correlation reached significance at α = {}.", ALPHA));
    }
    for c in significant {
        if let (Some(r), Some(p), Some(strength)) = (c.r, c.p_value, c.strength) {
            let sign = if r > 0.0 { "positive" } else { "negative" };
            lines.push(format!(
                "{} {} correlation between {} and {} ({}): r = {:.3}, p = {:.4}, n = {}.",
                capitalize(strength.as_str()),
                sign,
                c.x,
                c.y,
                c.view.title(),
                r,
                p,
                c.n
            ));
        }
    }

    let disagreements = trends.iter().filter(|t| t.agreement == Some(false)).count();
    if disagreements > 0 {
        lines.push(format!(
            "Regression and Mann-Kendall disagree on {} trend series; treat those trends as borderline.",
            disagreements
        ));
    }

    if let Some(ranking) = rankings.iter().find(|r| r.metric == Metric::WaterQualityScore) {
        if let (Some(best), Some(worst)) = (ranking.counties.first(), ranking.counties.last()) {
            if ranking.counties.len() > 1 {
                lines.push(format!(
                    "Best bathing water in {}: {} (score {:.2}); lowest: {} (score {:.2}).",
                    ranking.year, best.county, best.value, worst.county, worst.value
                ));
            }
        }
    }

    if let Some(fastest) = growth
        .iter()
        .max_by(|a, b| a.percent_change.total_cmp(&b.percent_change))
    {
        lines.push(format!(
            "Fastest population growth: {} ({:+.1}% between {} and {}).",
            fastest.county, fastest.percent_change, fastest.from_year, fastest.to_year
        ));
    }

    let unmatched = diagnostics.unmatched_rows();
    if unmatched > 0 {
        lines.push(format!(
            "{} rows with unrecognized region names were excluded from every view.",
            unmatched
        ));
    }

    lines
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
