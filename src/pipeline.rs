// 🏥 Report Pipeline - load, link, chart, map
//
// Stages run in order and share nothing but their outputs:
//   1. financial CSV -> state filter -> name set
//   2. facilities CSV
//   3. name linkage -> bridge CSV
//   4. per-hospital charts
//   5. facility map (probes the charts from step 4)

use crate::charts::{ChartRenderer, ChartSummary};
use crate::config::ReportConfig;
use crate::facility::load_facilities_csv;
use crate::financial::{filter_state, load_financial_csv, FinancialNameSet};
use crate::linker::LinkReport;
use crate::map::{MapRenderer, MapSummary};
use crate::output::write_bridge_csv;
use anyhow::{Context, Result};
use log::{info, warn};

#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub financial_rows: usize,
    pub state_rows: usize,
    pub financial_names: usize,
    pub facilities: usize,
    pub link: LinkReport,
    pub charts: ChartSummary,
    pub map: MapSummary,
}

impl PipelineSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} of {} financial rows in state, {} distinct names, {} facilities\n{}\n{}\n{}",
            self.state_rows,
            self.financial_rows,
            self.financial_names,
            self.facilities,
            self.link.summary(),
            self.charts.summary(),
            self.map.summary()
        )
    }
}

/// Run the whole report for `config`
pub fn run(config: &ReportConfig) -> Result<PipelineSummary> {
    config.validate()?;

    let all_records = load_financial_csv(&config.financial_csv)
        .context("Failed to load financial disclosures")?;
    let records = filter_state(&all_records, &config.state);
    if records.is_empty() {
        warn!("No financial rows for state {:?}", config.state);
    }
    let names = FinancialNameSet::from_records(&records);
    info!(
        "{} financial rows for {} ({} distinct hospital names)",
        records.len(),
        config.state,
        names.len()
    );

    let facilities = load_facilities_csv(&config.facilities_csv)
        .context("Failed to load facility records")?;

    let linker = config.linker()?;
    let link = linker.link(&names, &facilities);
    write_bridge_csv(&link.table, &config.bridge_output)?;

    let charts = ChartRenderer::new(&config.figures_dir, &config.chart_colors)?
        .render_all(&link.table, &records)?;

    let map = MapRenderer::new(&config.figures_dir, &config.map)
        .write(&facilities, &config.map_output)?;

    Ok(PipelineSummary {
        financial_rows: all_records.len(),
        state_rows: records.len(),
        financial_names: names.len(),
        facilities: facilities.len(),
        link,
        charts,
        map,
    })
}
