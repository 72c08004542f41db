// ⚙️ Report configuration
//
// Every field has a default, so an empty JSON object (or no file at all)
// reproduces the North Carolina report.

use crate::linker::{ConflictPolicy, NameLinker, DEFAULT_MAX_CANDIDATES, DEFAULT_SIMILARITY_CUTOFF};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One color per payer category, in `PayerCategory::ALL` order
pub const DEFAULT_CHART_COLORS: [&str; 7] = [
    "sienna",
    "maroon",
    "palevioletred",
    "beige",
    "goldenrod",
    "olive",
    "cornflowerblue",
];

// ============================================================================
// MAP SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapSettings {
    /// `[latitude, longitude]` of the initial view
    pub center: [f64; 2],
    pub zoom: u8,
    pub tiles_url: String,
    pub attribution: String,
}

impl Default for MapSettings {
    fn default() -> Self {
        MapSettings {
            center: [35.5, -78.8],
            zoom: 8,
            tiles_url: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            attribution: "&copy; OpenStreetMap contributors".to_string(),
        }
    }
}

// ============================================================================
// REPORT CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Two-letter state code the financial rows are filtered to
    pub state: String,

    pub financial_csv: PathBuf,
    pub facilities_csv: PathBuf,

    /// Root of the per-hospital chart directories
    pub figures_dir: PathBuf,
    pub map_output: PathBuf,
    pub bridge_output: PathBuf,

    pub similarity_cutoff: f64,
    pub max_candidates: usize,
    pub conflict_policy: ConflictPolicy,

    pub chart_colors: Vec<String>,
    pub map: MapSettings,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            state: "NC".to_string(),
            financial_csv: PathBuf::from("NASHP 2011-2023 HCT Data 2024 Dec.csv"),
            facilities_csv: PathBuf::from("Medical_Facilities/Medical_Facilities.csv"),
            figures_dir: PathBuf::from("FinancialFigures"),
            map_output: PathBuf::from("healthcare_facilities.html"),
            bridge_output: PathBuf::from("key_bridge.csv"),
            similarity_cutoff: DEFAULT_SIMILARITY_CUTOFF,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            conflict_policy: ConflictPolicy::default(),
            chart_colors: DEFAULT_CHART_COLORS.iter().map(|c| c.to_string()).collect(),
            map: MapSettings::default(),
        }
    }
}

impl ReportConfig {
    /// Read a JSON config file; missing keys take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: ReportConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// `load` when a path is given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let config = ReportConfig::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.state.trim().is_empty() {
            bail!("state must not be empty");
        }
        if !(0.0..=1.0).contains(&self.similarity_cutoff) {
            bail!(
                "similarity_cutoff must be in [0.0, 1.0], got {}",
                self.similarity_cutoff
            );
        }
        if self.max_candidates == 0 {
            bail!("max_candidates must be at least 1");
        }
        if self.chart_colors.len() < DEFAULT_CHART_COLORS.len() {
            bail!(
                "chart_colors needs {} entries, got {}",
                DEFAULT_CHART_COLORS.len(),
                self.chart_colors.len()
            );
        }
        Ok(())
    }

    pub fn linker(&self) -> Result<NameLinker> {
        NameLinker::with_settings(
            self.similarity_cutoff,
            self.max_candidates,
            self.conflict_policy,
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
