// 🗺️ Map Renderer - facility map with financial popups
//
// One toggleable layer per facility category; only hospitals are shown at
// load. Hospital markers embed the small operating-income chart when one was
// generated for that facility name, otherwise they turn gray with a
// plain-text popup.

use crate::config::MapSettings;
use crate::facility::{categories, FacilityRecord, HOSPITAL_CATEGORY};
use crate::output::{popup_chart_path, script_json, write_atomic};
use anyhow::Result;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";
const AWESOME_MARKERS_CSS: &str =
    "https://cdnjs.cloudflare.com/ajax/libs/Leaflet.awesome-markers/2.0.2/leaflet.awesome-markers.css";
const AWESOME_MARKERS_JS: &str =
    "https://cdnjs.cloudflare.com/ajax/libs/Leaflet.awesome-markers/2.0.2/leaflet.awesome-markers.js";
const FONT_AWESOME_CSS: &str =
    "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.2.0/css/all.min.css";

const PAGE_TITLE: &str = "Healthcare Facilities";

pub const POPUP_WIDTH: u32 = 600;
pub const POPUP_HEIGHT: u32 = 300;
pub const POPUP_MAX_WIDTH: u32 = 1000;

// ============================================================================
// MARKERS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerColor {
    /// Hospital with financial data
    Red,
    /// Hospital without financial data
    Gray,
    /// Any other facility
    Blue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "lowercase")]
pub enum Popup {
    /// Full chart page shown in an iframe
    Chart(String),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMarker {
    pub name: String,
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
    /// Font Awesome icon name
    pub icon: String,
    pub color: MarkerColor,
    pub popup: Popup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapLayer {
    pub name: String,
    pub visible: bool,
    pub markers: Vec<MapMarker>,
}

/// Read the popup chart generated for `facility_name`.
///
/// Any failure (no chart, unreadable file, unusable name) means the facility
/// has no financial data; it is never an error.
pub fn probe_popup(figures_dir: &Path, facility_name: &str) -> Option<String> {
    let path = match popup_chart_path(figures_dir, facility_name) {
        Ok(p) => p,
        Err(e) => {
            debug!("No popup for {:?}: {}", facility_name, e);
            return None;
        }
    };

    match fs::read_to_string(&path) {
        Ok(html) => Some(html),
        Err(e) => {
            debug!("No popup for {:?} at {}: {}", facility_name, path.display(), e);
            None
        }
    }
}

pub fn build_marker(facility: &FacilityRecord, figures_dir: &Path) -> MapMarker {
    let (icon, color, popup) = if facility.is_hospital() {
        match probe_popup(figures_dir, &facility.name) {
            Some(html) => ("hospital", MarkerColor::Red, Popup::Chart(html)),
            None => (
                "hospital",
                MarkerColor::Gray,
                Popup::Text(facility.name.clone()),
            ),
        }
    } else {
        (
            "user-doctor",
            MarkerColor::Blue,
            Popup::Text(facility.name.clone()),
        )
    };

    MapMarker {
        name: facility.name.clone(),
        latitude: facility.latitude,
        longitude: facility.longitude,
        icon: icon.to_string(),
        color,
        popup,
    }
}

/// Layers in first-occurrence category order, markers in input order
pub fn build_layers(facilities: &[FacilityRecord], figures_dir: &Path) -> Vec<MapLayer> {
    categories(facilities)
        .into_iter()
        .map(|category| MapLayer {
            visible: category == HOSPITAL_CATEGORY,
            markers: facilities
                .iter()
                .filter(|f| f.category == category)
                .map(|f| build_marker(f, figures_dir))
                .collect(),
            name: category,
        })
        .collect()
}

// ============================================================================
// MAP SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapSummary {
    pub layers: usize,
    pub hospitals_with_data: usize,
    pub hospitals_without_data: usize,
    pub other_facilities: usize,
}

impl MapSummary {
    pub fn from_layers(layers: &[MapLayer]) -> Self {
        let mut summary = MapSummary {
            layers: layers.len(),
            ..MapSummary::default()
        };
        for marker in layers.iter().flat_map(|l| &l.markers) {
            match marker.color {
                MarkerColor::Red => summary.hospitals_with_data += 1,
                MarkerColor::Gray => summary.hospitals_without_data += 1,
                MarkerColor::Blue => summary.other_facilities += 1,
            }
        }
        summary
    }

    pub fn summary(&self) -> String {
        format!(
            "Map: {} layers, {} hospitals with financial data, {} without, {} other facilities",
            self.layers, self.hospitals_with_data, self.hospitals_without_data, self.other_facilities
        )
    }
}

// ============================================================================
// MAP RENDERER
// ============================================================================

pub struct MapRenderer {
    figures_dir: PathBuf,
    settings: MapSettings,
}

impl MapRenderer {
    pub fn new(figures_dir: &Path, settings: &MapSettings) -> Self {
        MapRenderer {
            figures_dir: figures_dir.to_path_buf(),
            settings: settings.clone(),
        }
    }

    /// Build the full HTML page for `facilities`
    pub fn render(&self, facilities: &[FacilityRecord]) -> Result<(String, MapSummary)> {
        let layers = build_layers(facilities, &self.figures_dir);
        let summary = MapSummary::from_layers(&layers);

        let view = json!({
            "center": self.settings.center,
            "zoom": self.settings.zoom,
            "tiles_url": self.settings.tiles_url,
            "attribution": self.settings.attribution,
            "popup": {
                "width": POPUP_WIDTH,
                "height": POPUP_HEIGHT,
                "max_width": POPUP_MAX_WIDTH,
            },
        });

        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8" />
<title>{title}</title>
<link rel="stylesheet" href="{leaflet_css}" />
<link rel="stylesheet" href="{markers_css}" />
<link rel="stylesheet" href="{fa_css}" />
<script src="{leaflet_js}"></script>
<script src="{markers_js}"></script>
<style>html, body, #map {{ height: 100%; width: 100%; margin: 0; padding: 0; }}</style>
</head>
<body>
<div id="map"></div>
<script>
var view = {view};
var layers = {layers};
var map = L.map("map").setView(view.center, view.zoom);
L.tileLayer(view.tiles_url, {{ attribution: view.attribution }}).addTo(map);
var overlays = {{}};
layers.forEach(function (layer) {{
  var group = L.featureGroup();
  layer.markers.forEach(function (m) {{
    var icon = L.AwesomeMarkers.icon({{ icon: m.icon, prefix: "fa", markerColor: m.color }});
    var content;
    if (m.popup.kind === "chart") {{
      content = document.createElement("iframe");
      content.srcdoc = m.popup.content;
      content.width = view.popup.width;
      content.height = view.popup.height;
      content.style.border = "none";
    }} else {{
      content = document.createElement("div");
      content.textContent = m.popup.content;
    }}
    L.marker([m.lat, m.lon], {{ icon: icon }})
      .bindPopup(L.popup({{ maxWidth: view.popup.max_width }}).setContent(content))
      .addTo(group);
  }});
  if (layer.visible) {{
    group.addTo(map);
  }}
  overlays[layer.name] = group;
}});
L.control.layers(null, overlays).addTo(map);
</script>
</body>
</html>
"#,
            title = PAGE_TITLE,
            leaflet_css = LEAFLET_CSS,
            markers_css = AWESOME_MARKERS_CSS,
            fa_css = FONT_AWESOME_CSS,
            leaflet_js = LEAFLET_JS,
            markers_js = AWESOME_MARKERS_JS,
            view = script_json(&view)?,
            layers = script_json(&layers)?,
        );

        Ok((html, summary))
    }

    /// Render and write the map page to `output`
    pub fn write(&self, facilities: &[FacilityRecord], output: &Path) -> Result<MapSummary> {
        let (html, summary) = self.render(facilities)?;
        write_atomic(output, html.as_bytes())?;
        info!("{} -> {}", summary.summary(), output.display());
        Ok(summary)
    }
}

// ============================================================================
// TESTS
// ============================================================================
