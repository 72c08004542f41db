// 💾 Output layout + atomic writes
//
// Layout shared by the chart and map renderers:
//   {figures_dir}/{geospatial_name}/patient_mix.html
//   {figures_dir}/{geospatial_name}/patient_mix_small.html
//   {figures_dir}/{geospatial_name}/operating_income.html
//   {figures_dir}/{geospatial_name}/operating_income_small.html

use crate::linker::LinkTable;
use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const PATIENT_MIX_FILE: &str = "patient_mix.html";
pub const PATIENT_MIX_SMALL_FILE: &str = "patient_mix_small.html";
pub const OPERATING_INCOME_FILE: &str = "operating_income.html";
pub const OPERATING_INCOME_SMALL_FILE: &str = "operating_income_small.html";

/// Directory holding one hospital's charts.
///
/// The geospatial name is used verbatim; names that would escape
/// `figures_dir` or create nested directories are rejected.
pub fn hospital_dir(figures_dir: &Path, geospatial_name: &str) -> Result<PathBuf> {
    if geospatial_name.is_empty()
        || geospatial_name == "."
        || geospatial_name == ".."
        || geospatial_name.contains('/')
        || geospatial_name.contains('\\')
    {
        bail!(
            "facility name {:?} cannot be used as a directory name",
            geospatial_name
        );
    }
    Ok(figures_dir.join(geospatial_name))
}

/// Path of the chart the map embeds as a popup
pub fn popup_chart_path(figures_dir: &Path, geospatial_name: &str) -> Result<PathBuf> {
    Ok(hospital_dir(figures_dir, geospatial_name)?.join(OPERATING_INCOME_SMALL_FILE))
}

/// Write `contents` to `path` via a temp file in the same directory.
///
/// Readers never see a half-written file. Parent directories are created.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent_dir)
        .with_context(|| format!("Failed to create directory: {}", parent_dir.display()))?;

    let mut temp_file = NamedTempFile::new_in(parent_dir)
        .with_context(|| format!("Failed to create temp file in {}", parent_dir.display()))?;
    temp_file
        .write_all(contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    temp_file
        .persist(path)
        .with_context(|| format!("Failed to move output into place: {}", path.display()))?;
    Ok(())
}

/// Escape text for HTML element content and double-quoted attributes
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Serialize JSON for embedding inside a `<script>` element
pub fn script_json<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value).context("Failed to serialize JSON")?;
    Ok(json.replace("</", "<\\/"))
}

#[derive(Debug, Serialize)]
struct BridgeRow<'a> {
    financial_name: &'a str,
    geospatial_name: &'a str,
    method: &'a str,
    score: f64,
}

/// Export the link table as CSV, in table order
pub fn write_bridge_csv(table: &LinkTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for entry in table.entries() {
        writer.serialize(BridgeRow {
            financial_name: &entry.financial_name,
            geospatial_name: &entry.geospatial_name,
            method: entry.method.as_str(),
            score: entry.score,
        })?;
    }
    // An empty table still gets a header row
    if table.is_empty() {
        writer.write_record(["financial_name", "geospatial_name", "method", "score"])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush bridge table: {}", e))?;

    write_atomic(path, &bytes)?;
    log::info!("Wrote {} bridge entries to {}", table.len(), path.display());
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
