// 🏥 Facility records - geospatial side of the linkage
//
// Input is a CSV export of the facility layer, already reprojected to WGS84
// (EPSG:4326). Only `facility`, `stype`, `latitude` and `longitude` are read.

use crate::schema::ColumnIndex;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const COL_FACILITY: &str = "facility";
pub const COL_STYPE: &str = "stype";
pub const COL_LATITUDE: &str = "latitude";
pub const COL_LONGITUDE: &str = "longitude";

/// Category value that makes a facility eligible for linkage
pub const HOSPITAL_CATEGORY: &str = "Hospital";

// ============================================================================
// FACILITY RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityRecord {
    pub name: String,
    pub category: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl FacilityRecord {
    pub fn new(name: &str, category: &str, latitude: f64, longitude: f64) -> Self {
        FacilityRecord {
            name: name.to_string(),
            category: category.to_string(),
            latitude,
            longitude,
        }
    }

    /// Exact, case-sensitive category check
    pub fn is_hospital(&self) -> bool {
        self.category == HOSPITAL_CATEGORY
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Load facility records from CSV, in file order.
///
/// Fails on missing columns, unparseable coordinates, or coordinates outside
/// WGS84 bounds (usually a sign the layer was not reprojected).
pub fn load_facilities_csv(csv_path: &Path) -> Result<Vec<FacilityRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open facilities file: {}", csv_path.display()))?;

    let source = csv_path.display().to_string();
    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", source))?
        .clone();
    let index = ColumnIndex::resolve(
        &source,
        &headers,
        &[COL_FACILITY, COL_STYPE, COL_LATITUDE, COL_LONGITUDE],
    )?;

    let mut facilities = Vec::new();
    for (row_num, result) in reader.records().enumerate() {
        let line = row_num + 2; // 1-indexed + header row
        let record =
            result.with_context(|| format!("Failed to parse CSV line {} in {}", line, source))?;

        let latitude = parse_coordinate(index.get(&record, COL_LATITUDE), COL_LATITUDE, line)?;
        let longitude = parse_coordinate(index.get(&record, COL_LONGITUDE), COL_LONGITUDE, line)?;

        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            bail!(
                "Line {} in {}: coordinates ({}, {}) are outside WGS84 bounds",
                line,
                source,
                latitude,
                longitude
            );
        }

        facilities.push(FacilityRecord {
            name: index.get(&record, COL_FACILITY).to_string(),
            category: index.get(&record, COL_STYPE).to_string(),
            latitude,
            longitude,
        });
    }

    log::info!("Loaded {} facilities from {}", facilities.len(), source);
    Ok(facilities)
}

fn parse_coordinate(raw: &str, column: &str, line: usize) -> Result<f64> {
    raw.parse::<f64>()
        .with_context(|| format!("Line {}: invalid {} value {:?}", line, column, raw))
}

/// Distinct categories in first-occurrence order
pub fn categories(facilities: &[FacilityRecord]) -> Vec<String> {
    let mut seen = Vec::new();
    for facility in facilities {
        if !seen.contains(&facility.category) {
            seen.push(facility.category.clone());
        }
    }
    seen
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_is_hospital_is_exact() {
        assert!(FacilityRecord::new("A", "Hospital", 0.0, 0.0).is_hospital());
        assert!(!FacilityRecord::new("A", "hospital", 0.0, 0.0).is_hospital());
        assert!(!FacilityRecord::new("A", "Nursing Home", 0.0, 0.0).is_hospital());
    }

    #[test]
    fn test_load_facilities_csv() {
        let file = write_csv(
            "OBJECTID,facility,stype,latitude,longitude\n\
             1,Duke University Hospital,Hospital,36.007,-78.937\n\
             2,Durham Dialysis,Dialysis,35.99,-78.90\n",
        );

        let facilities = load_facilities_csv(file.path()).unwrap();
        assert_eq!(facilities.len(), 2);
        assert_eq!(facilities[0].name, "Duke University Hospital");
        assert!(facilities[0].is_hospital());
        assert_eq!(facilities[1].category, "Dialysis");
        assert_eq!(facilities[1].longitude, -78.90);
    }

    #[test]
    fn test_load_facilities_missing_column_is_schema_error() {
        let file = write_csv("facility,latitude,longitude\nA,35.0,-78.0\n");

        let err = load_facilities_csv(file.path()).unwrap_err();
        let schema_err = err.downcast_ref::<SchemaError>().unwrap();
        assert_eq!(schema_err.missing_columns, vec!["stype"]);
    }

    #[test]
    fn test_load_facilities_rejects_projected_coordinates() {
        // State-plane feet, not degrees
        let file = write_csv("facility,stype,latitude,longitude\nA,Hospital,812345.0,2034567.0\n");
        assert!(load_facilities_csv(file.path()).is_err());
    }

    #[test]
    fn test_load_facilities_rejects_bad_number() {
        let file = write_csv("facility,stype,latitude,longitude\nA,Hospital,north,-78.0\n");
        let err = load_facilities_csv(file.path()).unwrap_err();
        assert!(err.to_string().contains("latitude"));
    }

    #[test]
    fn test_categories_first_occurrence_order() {
        let facilities = vec![
            FacilityRecord::new("A", "Hospital", 0.0, 0.0),
            FacilityRecord::new("B", "Dialysis", 0.0, 0.0),
            FacilityRecord::new("C", "Hospital", 0.0, 0.0),
        ];
        assert_eq!(categories(&facilities), vec!["Hospital", "Dialysis"]);
    }
}
