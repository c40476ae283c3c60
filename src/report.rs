/// Report rendering: a self-contained HTML dashboard (tables and text, no
/// charts) and the machine-readable JSON bundle.
///
/// Every diagnostic counter in the bundle is shown, so a run that lost rows
/// to unmatched labels or malformed values says so on the page.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::analyzer::{
    AnalysisBundle, CorrelationEntry, CorrelationMatrix, MatrixCell, Ranking, TrendEntry,
};
use crate::model::MetricFamily;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize analysis bundle: {0}")]
    Json(#[from] serde_json::Error),
}

/// File names written into the output directory.
pub const HTML_FILE: &str = "dashboard.html";
pub const JSON_FILE: &str = "analysis.json";

/// Escape HTML special characters
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn styles() -> &'static str {
    r#"
        body { font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; margin: 24px; background: #f6f7f5; color: #222; }
        h1 { color: #14532d; }
        h2 { color: #1f3b2d; border-bottom: 2px solid #7fb28a; padding-bottom: 4px; margin-top: 32px; }
        table { border-collapse: collapse; width: 100%; background: white; margin-bottom: 16px; box-shadow: 0 1px 3px rgba(0,0,0,0.1); }
        th, td { border: 1px solid #ddd; padding: 6px 8px; text-align: left; }
        th { background: #2f6b45; color: white; }
        tr:nth-child(even) { background: #f9f9f9; }
        td.num { font-family: monospace; text-align: right; }
        .significant { color: #14532d; font-weight: bold; }
        .not-computed { color: #8a6d3b; font-style: italic; }
        .warning { background: #fff4e5; border-left: 4px solid #e69500; padding: 8px 12px; }
        .footer { margin-top: 24px; font-size: 0.8em; color: #888; }
    "#
}

fn num(value: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, value)
}

fn opt_num(value: Option<f64>, decimals: usize) -> String {
    value.map(|v| num(v, decimals)).unwrap_or_else(|| "n/a".to_string())
}

/// p-values are printed unrounded.
fn p_value(value: Option<f64>) -> String {
    value.map(|p| p.to_string()).unwrap_or_else(|| "n/a".to_string())
}

fn table(html: &mut String, headers: &[&str], rows: &[Vec<String>]) {
    html.push_str("<table>\n<tr>");
    for header in headers {
        let _ = write!(html, "<th>{}</th>", escape_html(header));
    }
    html.push_str("</tr>\n");
    for row in rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str(cell);
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>\n");
}

fn td(text: &str) -> String {
    format!("<td>{}</td>", escape_html(text))
}

fn td_num(text: String) -> String {
    format!(r#"<td class="num">{}</td>"#, escape_html(&text))
}

fn td_reason(reason: &str) -> String {
    format!(r#"<td class="not-computed">not computed: {}</td>"#, escape_html(reason))
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

fn render_run(html: &mut String, bundle: &AnalysisBundle) {
    let _ = writeln!(
        html,
        "<p>Run <code>{}</code>, generated {}</p>",
        escape_html(&bundle.run.run_id),
        bundle.run.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    if !bundle.run.served_from_cache.is_empty() {
        let names: Vec<&str> = bundle.run.served_from_cache.iter().map(|d| d.as_str()).collect();
        let _ = writeln!(
            html,
            r#"<p class="warning">Live fetch failed; served from cache: {}</p>"#,
            escape_html(&names.join(", "))
        );
    }
}

fn render_coverage(html: &mut String, bundle: &AnalysisBundle) {
    let d = &bundle.diagnostics;
    html.push_str("<h2>Data coverage</h2>\n");

    let view_rows: Vec<Vec<String>> = bundle
        .view_counts
        .iter()
        .map(|(view, count)| vec![td(view.title()), td_num(count.to_string())])
        .collect();
    table(html, &["View", "Records"], &view_rows);

    let counters = [
        ("Rows with unmatched region labels", d.unmatched_rows()),
        ("Rows excluded by data errors", d.data_error_rows()),
        ("National rows skipped in county datasets", d.national_rows_skipped),
        ("County-years excluded from allocation", d.excluded_allocations()),
        ("Years with no allocation possible", d.allocation_failures.len()),
        ("Counties with no data in any dataset", d.counties_without_data.len()),
        ("Records with population carried forward", d.forward_filled_records),
        ("Candidate records dropped with no metric", d.records_without_metrics),
        ("Analyses not computed", d.not_computed_results),
    ];
    let counter_rows: Vec<Vec<String>> = counters
        .iter()
        .map(|(label, count)| vec![td(label), td_num(count.to_string())])
        .collect();
    table(html, &["Diagnostic", "Count"], &counter_rows);

    if !d.unmatched_regions.is_empty() {
        let rows: Vec<Vec<String>> = d
            .unmatched_regions
            .iter()
            .map(|(label, count)| vec![td(label), td_num(count.to_string())])
            .collect();
        table(html, &["Unmatched label", "Rows"], &rows);
    }
    if !d.allocation_failures.is_empty() {
        let rows: Vec<Vec<String>> = d
            .allocation_failures
            .iter()
            .map(|(year, reason)| vec![td_num(year.to_string()), td(reason)])
            .collect();
        table(html, &["Year", "Allocation not possible"], &rows);
    }
    if !d.allocation_exclusions.is_empty() {
        let rows: Vec<Vec<String>> = d
            .allocation_exclusions
            .iter()
            .map(|(year, counties)| {
                let names: Vec<&str> = counties.iter().map(|c| c.name()).collect();
                vec![td_num(year.to_string()), td(&names.join(", "))]
            })
            .collect();
        table(html, &["Year", "Counties excluded from allocation"], &rows);
    }
    if !d.counties_without_data.is_empty() {
        let names: Vec<&str> = d.counties_without_data.iter().map(|c| c.name()).collect();
        let _ = writeln!(html, "<p>No data at all for: {}</p>", escape_html(&names.join(", ")));
    }
    if !d.data_error_samples.is_empty() {
        html.push_str("<ul>\n");
        for sample in &d.data_error_samples {
            let _ = writeln!(html, "<li>{}</li>", escape_html(sample));
        }
        html.push_str("</ul>\n");
    }
}

fn render_insights(html: &mut String, bundle: &AnalysisBundle) {
    html.push_str("<h2>Key findings</h2>\n<ul>\n");
    for insight in &bundle.insights {
        let _ = writeln!(html, "<li>{}</li>", escape_html(insight));
    }
    html.push_str("</ul>\n");
}

fn render_pollution_index(html: &mut String, bundle: &AnalysisBundle) {
    html.push_str("<h2>National pollution index</h2>\n");
    let rows: Vec<Vec<String>> = bundle
        .pollution_index
        .iter()
        .map(|(year, index)| vec![td_num(year.to_string()), td_num(num(*index, 2))])
        .collect();
    table(html, &["Year", "Index (0-100)"], &rows);
    render_trends(html, std::slice::from_ref(&bundle.national_pollution_trend));
}

fn correlation_row(entry: &CorrelationEntry) -> Vec<String> {
    let mut row = vec![
        td(entry.view.title()),
        td(entry.x.as_str()),
        td(entry.y.as_str()),
        td_num(entry.n.to_string()),
    ];
    match &entry.not_computed_reason {
        Some(reason) => row.push(td_reason(reason)),
        None => {
            row.push(td_num(opt_num(entry.r, 3)));
            row.push(td_num(p_value(entry.p_value)));
            let verdict = match entry.strength {
                Some(strength) if entry.significant => {
                    format!(r#"<td class="significant">{}, significant</td>"#, strength.as_str())
                }
                Some(strength) => td(strength.as_str()),
                None => td("n/a"),
            };
            row.push(verdict);
        }
    }
    row
}

fn render_correlations(html: &mut String, bundle: &AnalysisBundle) {
    html.push_str("<h2>Correlations</h2>\n");
    let rows: Vec<Vec<String>> = bundle.correlations.iter().map(correlation_row).collect();
    table(html, &["View", "X", "Y", "n", "r", "p", "Strength"], &rows);
}

fn render_descriptives(html: &mut String, bundle: &AnalysisBundle) {
    html.push_str("<h2>Descriptive statistics</h2>\n");
    let rows: Vec<Vec<String>> = bundle
        .descriptives
        .iter()
        .map(|entry| {
            let mut row = vec![td(entry.view.title()), td(entry.metric.as_str())];
            match (&entry.stats, &entry.not_computed_reason) {
                (Some(d), _) => {
                    row.push(td_num(d.count.to_string()));
                    row.push(td_num(num(d.mean, 3)));
                    row.push(td_num(opt_num(d.std_dev, 3)));
                    for value in [d.min, d.q1, d.median, d.q3, d.max] {
                        row.push(td_num(num(value, 3)));
                    }
                }
                (None, reason) => row.push(td_reason(reason.as_deref().unwrap_or("no values"))),
            }
            row
        })
        .collect();
    table(
        html,
        &["View", "Metric", "Count", "Mean", "Std", "Min", "25%", "50%", "75%", "Max"],
        &rows,
    );
}

fn matrix_grid(html: &mut String, matrix: &CorrelationMatrix) {
    let mut headers = vec![""];
    headers.extend(matrix.metrics.iter().map(|m| m.as_str()));
    let rows: Vec<Vec<String>> = matrix
        .metrics
        .iter()
        .map(|&row_metric| {
            let mut row = vec![td(row_metric.as_str())];
            for &col_metric in &matrix.metrics {
                let cell = if row_metric == col_metric {
                    num(1.0, 3)
                } else {
                    opt_num(matrix.cell(row_metric, col_metric).and_then(|c| c.r), 3)
                };
                row.push(td_num(cell));
            }
            row
        })
        .collect();
    table(html, &headers, &rows);
}

fn cell_row(cell: &MatrixCell) -> Vec<String> {
    let mut row = vec![td(cell.x.as_str()), td(cell.y.as_str()), td_num(cell.n.to_string())];
    match &cell.not_computed_reason {
        Some(reason) => row.push(td_reason(reason)),
        None => {
            row.push(td_num(opt_num(cell.r, 3)));
            row.push(td_num(p_value(cell.p_value)));
        }
    }
    row
}

fn render_matrices(html: &mut String, bundle: &AnalysisBundle) {
    html.push_str("<h2>Correlation matrices</h2>\n");
    for matrix in &bundle.correlation_matrices {
        let _ = writeln!(html, "<h3>{}</h3>", escape_html(matrix.view.title()));
        matrix_grid(html, matrix);

        let blocks = [
            ("Pollution × water", matrix.cross(MetricFamily::Pollution, &[MetricFamily::Water])),
            (
                "Population × environment",
                matrix.cross(MetricFamily::Population, &[MetricFamily::Pollution, MetricFamily::Water]),
            ),
        ];
        for (title, cells) in blocks {
            if cells.is_empty() {
                continue;
            }
            let _ = writeln!(html, "<h4>{}</h4>", escape_html(title));
            let rows: Vec<Vec<String>> = cells.into_iter().map(cell_row).collect();
            table(html, &["X", "Y", "n", "r", "p"], &rows);
        }
    }
}

fn trend_row(entry: &TrendEntry) -> Vec<String> {
    let view = entry.view.map(|v| v.title()).unwrap_or("Full national series");
    let mut row = vec![
        td(view),
        td(&entry.subject),
        td(entry.metric.as_str()),
        td_num(entry.n.to_string()),
    ];
    match &entry.not_computed_reason {
        Some(reason) => row.push(td_reason(reason)),
        None => {
            row.push(td_num(opt_num(entry.regression.map(|r| r.slope), 4)));
            row.push(td_num(p_value(entry.regression.map(|r| r.p_value))));
            row.push(td_num(opt_num(entry.mann_kendall.map(|m| m.z), 3)));
            row.push(td_num(p_value(entry.mann_kendall.map(|m| m.p_value))));
            row.push(td(entry.direction.map(|d| d.as_str()).unwrap_or("n/a")));
            row.push(td(match entry.agreement {
                Some(true) => "yes",
                Some(false) => "no",
                None => "n/a",
            }));
        }
    }
    row
}

fn render_trends(html: &mut String, trends: &[TrendEntry]) {
    let rows: Vec<Vec<String>> = trends.iter().map(trend_row).collect();
    table(
        html,
        &["View", "Subject", "Metric", "n", "OLS slope", "OLS p", "MK Z", "MK p", "Direction", "Methods agree"],
        &rows,
    );
}

fn render_group_comparisons(html: &mut String, bundle: &AnalysisBundle) {
    html.push_str("<h2>County comparisons (one-way ANOVA)</h2>\n");
    let rows: Vec<Vec<String>> = bundle
        .group_comparisons
        .iter()
        .map(|entry| {
            let mut row = vec![
                td(entry.view.title()),
                td(entry.metric.as_str()),
                td_num(entry.groups_offered.to_string()),
            ];
            match (&entry.anova, &entry.not_computed_reason) {
                (Some(anova), None) => {
                    row.push(td_num(format!("{}/{}", anova.groups, anova.groups_set_aside)));
                    row.push(td_num(num(anova.f_statistic, 3)));
                    row.push(td_num(format!("{}, {}", anova.df_between, anova.df_within)));
                    row.push(td_num(p_value(Some(anova.p_value))));
                }
                (_, reason) => row.push(td_reason(reason.as_deref().unwrap_or("unknown"))),
            }
            row
        })
        .collect();
    table(
        html,
        &["View", "Metric", "Counties", "Used / set aside", "F", "df", "p"],
        &rows,
    );
}

fn render_ranking(html: &mut String, ranking: &Ranking) {
    let direction = if ranking.lower_is_better { "lowest first" } else { "highest first" };
    let _ = writeln!(
        html,
        "<h3>{} {} ({})</h3>",
        escape_html(ranking.metric.as_str()),
        ranking.year,
        direction
    );
    let rows: Vec<Vec<String>> = ranking
        .counties
        .iter()
        .map(|c| vec![td_num(c.rank.to_string()), td(c.county.name()), td_num(num(c.value, 3))])
        .collect();
    table(html, &["Rank", "County", "Value"], &rows);
}

fn render_rankings_and_quadrants(html: &mut String, bundle: &AnalysisBundle) {
    html.push_str("<h2>County rankings</h2>\n");
    for ranking in &bundle.rankings {
        render_ranking(html, ranking);
    }

    if let Some(q) = &bundle.quadrants {
        let _ = writeln!(
            html,
            "<h2>Emissions vs water quality, {}</h2>\n<p>Medians: estimated emissions {}, water score {}</p>",
            q.year,
            num(q.emissions_median, 1),
            num(q.water_median, 2)
        );
        let rows: Vec<Vec<String>> = q
            .counts
            .iter()
            .map(|(quadrant, count)| {
                let members: Vec<&str> = q
                    .assignments
                    .iter()
                    .filter(|(_, assigned)| assigned == quadrant)
                    .map(|(county, _)| county.name())
                    .collect();
                vec![td(quadrant.label()), td_num(count.to_string()), td(&members.join(", "))]
            })
            .collect();
        table(html, &["Quadrant", "Counties", "Members"], &rows);
    }
}

fn render_growth(html: &mut String, bundle: &AnalysisBundle) {
    if let Some(g) = &bundle.national_growth {
        let _ = writeln!(
            html,
            "<h2>National change {}-{}</h2>",
            g.from_year, g.to_year
        );
        let pct = |v: Option<f64>| v.map(|p| format!("{:+.1}%", p)).unwrap_or_else(|| "n/a".to_string());
        let rows = vec![
            vec![
                td("Population (matched counties)"),
                td_num(g.population_from.to_string()),
                td_num(g.population_to.to_string()),
                td_num(pct(g.population_change_pct)),
            ],
            vec![
                td("National emissions"),
                td_num(num(g.emissions_from, 1)),
                td_num(num(g.emissions_to, 1)),
                td_num(pct(g.emissions_change_pct)),
            ],
        ];
        table(html, &["Series", "From", "To", "Change"], &rows);
    }

    if bundle.growth.is_empty() {
        return;
    }
    html.push_str("<h2>Population growth between censuses</h2>\n");
    let rows: Vec<Vec<String>> = bundle
        .growth
        .iter()
        .map(|g| {
            vec![
                td(g.county.name()),
                td_num(format!("{}-{}", g.from_year, g.to_year)),
                td_num(g.from_population.to_string()),
                td_num(g.to_population.to_string()),
                td_num(format!("{:+.1}%", g.percent_change)),
            ]
        })
        .collect();
    table(html, &["County", "Censuses", "From", "To", "Change"], &rows);
}

fn render_limitations(html: &mut String, bundle: &AnalysisBundle) {
    html.push_str("<h2>Limitations</h2>\n<ul>\n");
    for limitation in &bundle.limitations {
        let _ = writeln!(html, "<li>{}</li>", escape_html(limitation));
    }
    html.push_str("</ul>\n");
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Renders the full dashboard as one HTML document.
pub fn render_html(bundle: &AnalysisBundle) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"UTF-8\">\n");
    html.push_str("<title>Ireland Environment and Population Analysis</title>\n");
    html.push_str("<style>");
    html.push_str(styles());
    html.push_str("</style>\n</head>\n<body>\n");
    html.push_str("<h1>Ireland: Emissions, Bathing Water and Population</h1>\n");

    render_run(&mut html, bundle);
    render_insights(&mut html, bundle);
    render_coverage(&mut html, bundle);
    render_pollution_index(&mut html, bundle);
    render_descriptives(&mut html, bundle);
    render_correlations(&mut html, bundle);
    render_matrices(&mut html, bundle);
    html.push_str("<h2>Trends</h2>\n");
    render_trends(&mut html, &bundle.trends);
    render_group_comparisons(&mut html, bundle);
    render_rankings_and_quadrants(&mut html, bundle);
    render_growth(&mut html, bundle);
    render_limitations(&mut html, bundle);

    html.push_str(r#"<p class="footer">Sources: CSO air emission accounts, EPA bathing water quality, CSO census of population.</p>"#);
    html.push_str("\n</body>\n</html>\n");
    html
}

fn write_file(path: &Path, contents: &str) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ReportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, contents).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_html(path: &Path, bundle: &AnalysisBundle) -> Result<(), ReportError> {
    write_file(path, &render_html(bundle))
}

/// Writes the bundle as pretty-printed JSON.
pub fn write_bundle_json(path: &Path, bundle: &AnalysisBundle) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(bundle)?;
    write_file(path, &json)
}

/// Writes both outputs into `dir`, returning their paths.
pub fn write_reports(dir: &Path, bundle: &AnalysisBundle) -> Result<(PathBuf, PathBuf), ReportError> {
    let html_path = dir.join(HTML_FILE);
    let json_path = dir.join(JSON_FILE);
    write_html(&html_path, bundle)?;
    write_bundle_json(&json_path, bundle)?;
    Ok((html_path, json_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::{NationalGrowth, RunContext, analyze};
    use crate::analysis::join::Joiner;
    use crate::config::AnalysisConfig;
    use crate::ingest::snapshot;
    use crate::model::{DatasetId, RawObservation};
    use chrono::{TimeZone, Utc};

    fn snapshot_bundle(extra: Vec<RawObservation>) -> AnalysisBundle {
        let mut rows = snapshot::all_rows();
        rows.extend(extra);
        let joiner = Joiner::from_config(&AnalysisConfig::default()).unwrap();
        let integration = joiner.join(&rows).unwrap();
        let run = RunContext::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap());
        analyze(&integration, run)
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>\"A&B\"</b>"), "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt;");
        assert_eq!(escape_html("Dún Laoghaire"), "Dún Laoghaire");
        assert_eq!(escape_html("O'Brien"), "O&#39;Brien");
    }

    #[test]
    fn test_dashboard_has_every_section() {
        let html = render_html(&snapshot_bundle(Vec::new()));
        assert!(html.starts_with("<!DOCTYPE html>"));
        for heading in [
            "Key findings",
            "Data coverage",
            "National pollution index",
            "Descriptive statistics",
            "Correlations",
            "Correlation matrices",
            "Pollution × water",
            "Population × environment",
            "Trends",
            "County comparisons",
            "County rankings",
            "Limitations",
        ] {
            assert!(html.contains(heading), "missing section: {}", heading);
        }
        assert!(html.contains("run-20240601T093000Z"));
        assert!(html.ends_with("</html>\n"));
    }

    #[test]
    fn test_unmatched_label_is_escaped_in_report() {
        let extra = vec![RawObservation::new(
            DatasetId::Population,
            "<script>Leix</script>",
            2022,
            "Population",
            100.0,
        )];
        let html = render_html(&snapshot_bundle(extra));
        assert!(html.contains("&lt;script&gt;Leix&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_national_change_is_rendered() {
        let mut bundle = snapshot_bundle(Vec::new());
        bundle.national_growth = Some(NationalGrowth {
            from_year: 2011,
            to_year: 2022,
            population_from: 4_000_000,
            population_to: 4_400_000,
            population_change_pct: Some(10.0),
            emissions_from: 60_000.0,
            emissions_to: 57_000.0,
            emissions_change_pct: Some(-5.0),
        });
        let html = render_html(&bundle);
        assert!(html.contains("National change 2011-2022"));
        assert!(html.contains("+10.0%"));
        assert!(html.contains("-5.0%"));
    }

    #[test]
    fn test_matrix_grid_marks_uncomputed_cells() {
        let bundle = analyze(
            &crate::analysis::join::Integration::default(),
            RunContext::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap()),
        );
        let mut html = String::new();
        matrix_grid(&mut html, &bundle.correlation_matrices[0]);
        assert!(html.contains("1.000"));
        assert!(html.contains("n/a"));
    }

    #[test]
    fn test_cache_warning_lists_datasets() {
        let mut bundle = snapshot_bundle(Vec::new());
        bundle.run.served_from_cache = vec![DatasetId::WaterQuality];
        let html = render_html(&bundle);
        assert!(html.contains("served from cache: water_quality"));
    }

    #[test]
    fn test_reports_are_written_to_output_dir() {
        let dir = std::env::temp_dir().join(format!("envpop_report_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let bundle = snapshot_bundle(Vec::new());
        let (html_path, json_path) = write_reports(&dir, &bundle).unwrap();

        assert!(fs::read_to_string(&html_path).unwrap().contains("<table>"));
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json["run"]["run_id"], "run-20240601T093000Z");
        assert!(json["results"].as_array().is_some_and(|r| !r.is_empty()));
        let _ = fs::remove_dir_all(&dir);
    }
}
