// Hospital Linkage - Core Library
// Exposes all modules for use in the report binary and tests

pub mod similarity;  // difflib-compatible string similarity
pub mod schema;      // Column validation at the CSV boundary
pub mod facility;    // Geospatial facility records
pub mod financial;   // Financial disclosure records + name set
pub mod linker;      // Facility name -> financial name linkage
pub mod config;
pub mod output;      // Output layout + atomic writes
pub mod charts;      // Per-hospital Plotly charts
pub mod map;         // Leaflet facility map
pub mod pipeline;

// Re-export commonly used types
pub use similarity::{get_close_matches, ratio, CloseMatch, SequenceMatcher};
pub use schema::{ColumnIndex, SchemaError};
pub use facility::{categories, load_facilities_csv, FacilityRecord, HOSPITAL_CATEGORY};
pub use financial::{
    filter_state, load_financial_csv, records_for,
    FinancialNameSet, FinancialRecord, PayerCategory,
};
pub use linker::{
    link, ConflictPolicy, LinkConflict, LinkEntry, LinkReport, LinkTable,
    MatchMethod, NameLinker, RecordDecision, RecordOutcome,
};
pub use config::{MapSettings, ReportConfig};
pub use charts::{ChartRenderer, ChartSummary};
pub use map::{probe_popup, MapRenderer, MapSummary, MarkerColor, Popup};
pub use pipeline::{run, PipelineSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
