// 📈 Chart Renderer - per-hospital financial charts
//
// For every linked hospital, four Plotly pages are written under the
// facility's directory:
//   - patient mix (stacked area of payer shares), full + small
//   - operating income (waterfall of per-payer results), full + small
//
// Series are computed first (pure), then turned into Plotly JSON figures.

use crate::financial::{records_for, FinancialRecord, PayerCategory};
use crate::linker::{LinkEntry, LinkTable};
use crate::output::{
    escape_html, hospital_dir, script_json, write_atomic, OPERATING_INCOME_FILE,
    OPERATING_INCOME_SMALL_FILE, PATIENT_MIX_FILE, PATIENT_MIX_SMALL_FILE,
};
use anyhow::{bail, Result};
use chrono::{Duration, NaiveDate};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

pub const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

/// Legend labels are cut to this many characters
const MAX_LABEL_CHARS: usize = 20;

/// Width of one payer segment in the waterfall
const SEGMENT_DAYS: i64 = 30;

// ============================================================================
// LABELS
// ============================================================================

fn truncate_label(label: &str) -> String {
    label.chars().take(MAX_LABEL_CHARS).collect()
}

pub fn patient_mix_label(category: PayerCategory) -> String {
    truncate_label(&category.payer_mix_column().replace(" Payer Mix", ""))
}

pub fn operating_label(category: PayerCategory) -> String {
    truncate_label(
        &category
            .operating_column()
            .replace(" Hospital Operating Profit (Loss)", ""),
    )
}

// ============================================================================
// PATIENT MIX SERIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackedLayer {
    pub category: PayerCategory,
    pub label: String,

    /// Sum of this and all earlier categories, one value per fiscal year
    pub cumulative: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientMixSeries {
    pub dates: Vec<NaiveDate>,
    pub layers: Vec<StackedLayer>,
}

pub fn patient_mix_series(rows: &[&FinancialRecord]) -> PatientMixSeries {
    let dates: Vec<NaiveDate> = rows.iter().map(|r| r.fiscal_year_ending).collect();
    let mut running = vec![0.0; rows.len()];

    let layers = PayerCategory::ALL
        .iter()
        .map(|&category| {
            for (total, row) in running.iter_mut().zip(rows) {
                *total += row.payer_mix_for(category);
            }
            StackedLayer {
                category,
                label: patient_mix_label(category),
                cumulative: running.clone(),
            }
        })
        .collect();

    PatientMixSeries { dates, layers }
}

// ============================================================================
// OPERATING INCOME SERIES
// ============================================================================

/// One payer's step in one fiscal year's waterfall
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallSegment {
    pub category: PayerCategory,
    pub year_index: usize,
    pub start: NaiveDate,
    pub end: NaiveDate,

    /// Running income before and after this payer
    pub before: f64,
    pub after: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingIncomeSeries {
    pub dates: Vec<NaiveDate>,

    /// Category-major: all years of Charity, then all years of Uninsured, ...
    pub segments: Vec<WaterfallSegment>,

    /// Net operating income per fiscal year
    pub totals: Vec<f64>,
}

/// Build the waterfall.
///
/// Within each fiscal year the seven payers occupy consecutive 30-day slots
/// ending on the fiscal-year date. Charity and uninsured costs step the
/// running income down; the other payers step it by their profit (loss).
pub fn operating_income_series(rows: &[&FinancialRecord]) -> OperatingIncomeSeries {
    let dates: Vec<NaiveDate> = rows.iter().map(|r| r.fiscal_year_ending).collect();
    let mut running = vec![0.0; rows.len()];
    let mut segments = Vec::with_capacity(rows.len() * PayerCategory::ALL.len());
    let slots = PayerCategory::ALL.len() as i64;

    for (slot, &category) in PayerCategory::ALL.iter().enumerate() {
        let slot = slot as i64;
        for (year_index, row) in rows.iter().enumerate() {
            let date = row.fiscal_year_ending;
            let start = date - Duration::days((slots - slot) * SEGMENT_DAYS);
            let end = date - Duration::days((slots - slot - 1) * SEGMENT_DAYS);

            let before = running[year_index];
            let value = row.operating_for(category);
            if category.subtracts_from_income() {
                running[year_index] -= value;
            } else {
                running[year_index] += value;
            }

            segments.push(WaterfallSegment {
                category,
                year_index,
                start,
                end,
                before,
                after: running[year_index],
            });
        }
    }

    OperatingIncomeSeries {
        dates,
        segments,
        totals: running,
    }
}

// ============================================================================
// PLOTLY FIGURES
// ============================================================================

fn date_strings(dates: &[NaiveDate]) -> Vec<String> {
    dates.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect()
}

fn full_layout(title: &str, y_title: &str) -> Value {
    json!({
        "title": {
            "text": title,
            "font": { "size": 18, "color": "darkslategray", "family": "Times New Roman" }
        },
        "xaxis": { "title": { "text": "Year" } },
        "yaxis": { "title": { "text": y_title } }
    })
}

fn small_layout(title: &str, y_title: &str) -> Value {
    json!({
        "title": { "text": title },
        "xaxis": { "title": { "text": "Year" } },
        "yaxis": { "title": { "text": y_title } }
    })
}

pub fn patient_mix_figure(series: &PatientMixSeries, colors: &[String], title: &str, small: bool) -> Value {
    let x = date_strings(&series.dates);

    let data: Vec<Value> = series
        .layers
        .iter()
        .enumerate()
        .map(|(i, layer)| {
            let color = &colors[layer.category.index()];
            let fill = if i == 0 { "tozeroy" } else { "tonexty" };
            let mut trace = json!({
                "type": "scatter",
                "x": x,
                "y": layer.cumulative,
                "name": layer.label,
                "fill": fill,
                "mode": "lines",
                "fillcolor": color,
            });
            if !small {
                trace["line"] = json!({ "color": color, "width": 0.5 });
            }
            trace
        })
        .collect();

    let layout = if small {
        small_layout(title, "Patient Mix (%)")
    } else {
        let mut layout = full_layout(title, "Patient Mix (%)");
        layout["yaxis"]["range"] = json!([0, 1]);
        layout
    };

    json!({ "data": data, "layout": layout })
}

pub fn operating_income_figure(
    series: &OperatingIncomeSeries,
    colors: &[String],
    title: &str,
    small: bool,
) -> Value {
    let mut data = Vec::new();

    if !small {
        for segment in &series.segments {
            let color = &colors[segment.category.index()];
            let x = date_strings(&[segment.start, segment.end]);
            let label = operating_label(segment.category);

            // Baseline for the fill below
            data.push(json!({
                "type": "scatter",
                "x": x,
                "y": [segment.before, segment.before],
                "name": label,
                "mode": "lines",
                "line": { "color": color, "width": 0.5 },
                "showlegend": false,
            }));
            data.push(json!({
                "type": "scatter",
                "x": x,
                "y": [segment.after, segment.after],
                "name": label,
                "fill": "tonexty",
                "mode": "lines",
                "fillcolor": color,
                "line": { "color": color, "width": 0.5 },
                "showlegend": segment.year_index == 0,
            }));
        }
    }

    let mut total = json!({
        "type": "scatter",
        "x": date_strings(&series.dates),
        "y": series.totals,
        "name": "Total Operating Income",
        "mode": "lines",
        "showlegend": !small,
    });
    if !small {
        total["line"] = json!({ "color": "black", "width": 3.5 });
    }
    data.push(total);

    let layout = if small {
        small_layout(title, "Operating Income ($)")
    } else {
        full_layout(title, "Operating Income ($)")
    };

    json!({ "data": data, "layout": layout })
}

/// Standalone page drawing `figure` with plotly.js from the CDN
pub fn render_html(figure: &Value, page_title: &str) -> Result<String> {
    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8" />
<title>{title}</title>
<script src="{cdn}"></script>
</head>
<body style="margin:0">
<div id="chart" style="height:100vh;width:100%;"></div>
<script>
var figure = {figure};
Plotly.newPlot("chart", figure.data, figure.layout, {{ responsive: true }});
</script>
</body>
</html>
"#,
        title = escape_html(page_title),
        cdn = PLOTLY_CDN,
        figure = script_json(figure)?,
    ))
}

// ============================================================================
// CHART RENDERER
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartSummary {
    /// Geospatial names whose four charts were written
    pub rendered: Vec<String>,

    /// `(geospatial_name, reason)` for hospitals that could not be rendered
    pub skipped: Vec<(String, String)>,
}

impl ChartSummary {
    pub fn summary(&self) -> String {
        format!(
            "Rendered charts for {} hospitals ({} skipped)",
            self.rendered.len(),
            self.skipped.len()
        )
    }
}

pub struct ChartRenderer {
    figures_dir: PathBuf,
    colors: Vec<String>,
}

impl ChartRenderer {
    pub fn new(figures_dir: &Path, colors: &[String]) -> Result<Self> {
        if colors.len() < PayerCategory::ALL.len() {
            bail!(
                "need {} chart colors, got {}",
                PayerCategory::ALL.len(),
                colors.len()
            );
        }
        Ok(ChartRenderer {
            figures_dir: figures_dir.to_path_buf(),
            colors: colors.to_vec(),
        })
    }

    pub fn figures_dir(&self) -> &Path {
        &self.figures_dir
    }

    /// Write the four charts of one linked hospital; returns its directory
    pub fn render_hospital(&self, entry: &LinkEntry, rows: &[&FinancialRecord]) -> Result<PathBuf> {
        let dir = hospital_dir(&self.figures_dir, &entry.geospatial_name)?;
        let full_title = format!("{} ({})", entry.financial_name, entry.geospatial_name);
        let small_title = entry.geospatial_name.as_str();

        let mix = patient_mix_series(rows);
        let income = operating_income_series(rows);

        let pages = [
            (PATIENT_MIX_FILE, patient_mix_figure(&mix, &self.colors, &full_title, false)),
            (PATIENT_MIX_SMALL_FILE, patient_mix_figure(&mix, &self.colors, small_title, true)),
            (
                OPERATING_INCOME_FILE,
                operating_income_figure(&income, &self.colors, &full_title, false),
            ),
            (
                OPERATING_INCOME_SMALL_FILE,
                operating_income_figure(&income, &self.colors, small_title, true),
            ),
        ];

        for (file_name, figure) in &pages {
            let html = render_html(figure, &entry.geospatial_name)?;
            write_atomic(&dir.join(file_name), html.as_bytes())?;
        }

        debug!(
            "Wrote {} charts for {:?} ({} fiscal years)",
            pages.len(),
            entry.geospatial_name,
            rows.len()
        );
        Ok(dir)
    }

    /// Render every linked hospital, in link-table order.
    ///
    /// A hospital whose name cannot be a directory is skipped with a warning;
    /// I/O failures abort.
    pub fn render_all(&self, table: &LinkTable, records: &[FinancialRecord]) -> Result<ChartSummary> {
        let mut summary = ChartSummary::default();

        for entry in table.entries() {
            let rows = records_for(records, &entry.financial_name);

            if let Err(e) = hospital_dir(&self.figures_dir, &entry.geospatial_name) {
                warn!("Skipping charts for {:?}: {}", entry.geospatial_name, e);
                summary
                    .skipped
                    .push((entry.geospatial_name.clone(), e.to_string()));
                continue;
            }

            self.render_hospital(entry, &rows)?;
            summary.rendered.push(entry.geospatial_name.clone());
        }

        info!("{}", summary.summary());
        Ok(summary)
    }
}

// ============================================================================
// TESTS
// ============================================================================
