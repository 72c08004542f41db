// 📐 Shape Layer - Input schema validation
// Fails fast on missing columns before any record is processed

use csv::StringRecord;
use std::collections::HashMap;

// ============================================================================
// SCHEMA ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaError {
    /// Which input the header came from (file name or dataset label)
    pub source: String,
    pub missing_columns: Vec<String>,
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] missing required column(s): {}",
            self.source,
            self.missing_columns.join(", ")
        )
    }
}

impl std::error::Error for SchemaError {}

// ============================================================================
// COLUMN INDEX
// ============================================================================

/// Resolved positions of required columns within a CSV header
#[derive(Debug, Clone)]
pub struct ColumnIndex {
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    /// Check `headers` for every name in `required`.
    ///
    /// Header cells are compared after trimming surrounding whitespace.
    /// Every missing column is reported at once.
    pub fn resolve(
        source: &str,
        headers: &StringRecord,
        required: &[&str],
    ) -> Result<Self, SchemaError> {
        let mut positions = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            // First occurrence wins for duplicated headers
            positions.entry(header.trim().to_string()).or_insert(idx);
        }

        let missing_columns: Vec<String> = required
            .iter()
            .filter(|name| !positions.contains_key(**name))
            .map(|name| name.to_string())
            .collect();

        if !missing_columns.is_empty() {
            return Err(SchemaError {
                source: source.to_string(),
                missing_columns,
            });
        }

        Ok(ColumnIndex { positions })
    }

    /// Cell of `record` under column `name`, trimmed. Short rows read as empty.
    pub fn get<'r>(&self, record: &'r StringRecord, name: &str) -> &'r str {
        self.positions
            .get(name)
            .and_then(|&idx| record.get(idx))
            .map(str::trim)
            .unwrap_or("")
    }
}

// ============================================================================
// TESTS
// ============================================================================
