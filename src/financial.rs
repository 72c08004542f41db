// 💵 Financial disclosures - hospital cost/payer data
//
// One row per hospital per fiscal year. Seven payer categories, each with a
// payer-mix share and an operating profit (loss) / cost column.

use crate::schema::ColumnIndex;
use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const COL_STATE: &str = "State";
pub const COL_HOSPITAL_NAME: &str = "Hospital Name";
pub const COL_FISCAL_YEAR_ENDING: &str = "Fiscal Year Ending";

// ============================================================================
// PAYER CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayerCategory {
    Charity,
    Uninsured,
    Medicaid,
    Schip,
    Medicare,
    MedicareAdvantage,
    Commercial,
}

impl PayerCategory {
    /// Stacking order used by every chart
    pub const ALL: [PayerCategory; 7] = [
        PayerCategory::Charity,
        PayerCategory::Uninsured,
        PayerCategory::Medicaid,
        PayerCategory::Schip,
        PayerCategory::Medicare,
        PayerCategory::MedicareAdvantage,
        PayerCategory::Commercial,
    ];

    pub fn index(&self) -> usize {
        match self {
            PayerCategory::Charity => 0,
            PayerCategory::Uninsured => 1,
            PayerCategory::Medicaid => 2,
            PayerCategory::Schip => 3,
            PayerCategory::Medicare => 4,
            PayerCategory::MedicareAdvantage => 5,
            PayerCategory::Commercial => 6,
        }
    }

    /// Column holding this payer's share of patients (0.0 - 1.0)
    pub fn payer_mix_column(&self) -> &'static str {
        match self {
            PayerCategory::Charity => "Charity Care Payer Mix",
            PayerCategory::Uninsured => "Uninsured and Bad Debt Payer Mix",
            PayerCategory::Medicaid => "Medicaid Payer Mix",
            PayerCategory::Schip => "SCHIP and Low Income Gov't Program Payer Mix",
            PayerCategory::Medicare => "Medicare Payer Mix",
            PayerCategory::MedicareAdvantage => "Medicare Adv Payer Mix",
            PayerCategory::Commercial => "Commercial Payer Mix",
        }
    }

    /// Column holding this payer's operating result in dollars
    pub fn operating_column(&self) -> &'static str {
        match self {
            PayerCategory::Charity => "Net Charity Care Cost",
            PayerCategory::Uninsured => "Uninsured and Bad Debt Cost",
            PayerCategory::Medicaid => "Medicaid Hospital Operating Profit (Loss)",
            PayerCategory::Schip => {
                "SCHIP and Low Income Gov't Program Hospital Operating Profit (Loss)"
            }
            PayerCategory::Medicare => "Medicare Hospital Operating Profit (Loss)",
            PayerCategory::MedicareAdvantage => {
                "Medicare Advantage Hospital Operating Profit (Loss)"
            }
            PayerCategory::Commercial => "Commercial Hospital Operating Profit (Loss)",
        }
    }

    /// Charity and uninsured columns report costs, not profits
    pub fn subtracts_from_income(&self) -> bool {
        matches!(self, PayerCategory::Charity | PayerCategory::Uninsured)
    }

    /// Every column a financial file must carry
    pub fn required_columns() -> Vec<&'static str> {
        let mut columns = vec![COL_STATE, COL_HOSPITAL_NAME, COL_FISCAL_YEAR_ENDING];
        columns.extend(PayerCategory::ALL.iter().map(|c| c.payer_mix_column()));
        columns.extend(PayerCategory::ALL.iter().map(|c| c.operating_column()));
        columns
    }
}

// ============================================================================
// FINANCIAL RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialRecord {
    pub state: String,
    pub hospital_name: String,
    pub fiscal_year_ending: NaiveDate,

    /// Indexed by `PayerCategory::index()`
    pub payer_mix: [f64; 7],

    /// Indexed by `PayerCategory::index()`
    pub operating: [f64; 7],
}

impl FinancialRecord {
    pub fn payer_mix_for(&self, category: PayerCategory) -> f64 {
        self.payer_mix[category.index()]
    }

    pub fn operating_for(&self, category: PayerCategory) -> f64 {
        self.operating[category.index()]
    }

    /// Net operating income: profits minus charity and uninsured costs
    pub fn net_operating_income(&self) -> f64 {
        PayerCategory::ALL
            .iter()
            .map(|c| {
                let value = self.operating_for(*c);
                if c.subtracts_from_income() {
                    -value
                } else {
                    value
                }
            })
            .sum()
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Load every row of the financial CSV export.
///
/// Header is validated before any row is read.
pub fn load_financial_csv(csv_path: &Path) -> Result<Vec<FinancialRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open financial file: {}", csv_path.display()))?;

    let source = csv_path.display().to_string();
    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", source))?
        .clone();
    let index = ColumnIndex::resolve(&source, &headers, &PayerCategory::required_columns())?;

    let mut records = Vec::new();
    for (row_num, result) in reader.records().enumerate() {
        let line = row_num + 2;
        let row =
            result.with_context(|| format!("Failed to parse CSV line {} in {}", line, source))?;

        let fiscal_raw = index.get(&row, COL_FISCAL_YEAR_ENDING);
        let fiscal_year_ending = parse_fiscal_date(fiscal_raw).ok_or_else(|| {
            anyhow!(
                "Line {} in {}: invalid {} value {:?}",
                line,
                source,
                COL_FISCAL_YEAR_ENDING,
                fiscal_raw
            )
        })?;

        let mut payer_mix = [0.0; 7];
        let mut operating = [0.0; 7];
        for category in PayerCategory::ALL {
            let mix_col = category.payer_mix_column();
            payer_mix[category.index()] = parse_amount(index.get(&row, mix_col))
                .with_context(|| format!("Line {} in {}: column {:?}", line, source, mix_col))?;

            let op_col = category.operating_column();
            operating[category.index()] = parse_amount(index.get(&row, op_col))
                .with_context(|| format!("Line {} in {}: column {:?}", line, source, op_col))?;
        }

        records.push(FinancialRecord {
            state: index.get(&row, COL_STATE).to_string(),
            hospital_name: index.get(&row, COL_HOSPITAL_NAME).to_string(),
            fiscal_year_ending,
            payer_mix,
            operating,
        });
    }

    log::info!("Loaded {} financial rows from {}", records.len(), source);
    Ok(records)
}

/// Parse a numeric cell.
///
/// "." and empty cells are missing data and read as 0.0. Dollar signs,
/// thousands separators and accounting parentheses are accepted.
pub fn parse_amount(raw: &str) -> Result<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "." {
        return Ok(0.0);
    }

    let (negative, body) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };
    let cleaned: String = body.chars().filter(|c| *c != '$' && *c != ',').collect();

    let value: f64 = cleaned
        .parse()
        .with_context(|| format!("invalid numeric value {:?}", raw))?;
    Ok(if negative { -value } else { value })
}

/// Parse date from string (supports YYYY-MM-DD, MM/DD/YYYY and spreadsheet timestamps)
pub fn parse_fiscal_date(date_str: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
        return Some(date);
    }

    if let Ok(date) = NaiveDate::parse_from_str(date_str, "%m/%d/%Y") {
        return Some(date);
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(date_str, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }

    None
}

// ============================================================================
// SELECTION
// ============================================================================

/// Rows for one state (exact match on the state code)
pub fn filter_state(records: &[FinancialRecord], state: &str) -> Vec<FinancialRecord> {
    records
        .iter()
        .filter(|r| r.state == state)
        .cloned()
        .collect()
}

/// Rows for one hospital, in file order
pub fn records_for<'a>(records: &'a [FinancialRecord], hospital_name: &str) -> Vec<&'a FinancialRecord> {
    records
        .iter()
        .filter(|r| r.hospital_name == hospital_name)
        .collect()
}

// ============================================================================
// FINANCIAL NAME SET
// ============================================================================

/// Distinct hospital names, first-occurrence order, case-sensitive identity.
///
/// This is the matching target of the linker. Its iteration order decides
/// exact-pass tie-breaks, so it is kept stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinancialNameSet {
    names: Vec<String>,
}

impl FinancialNameSet {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = FinancialNameSet::default();
        for name in names {
            let name = name.into();
            if !set.names.contains(&name) {
                set.names.push(name);
            }
        }
        set
    }

    pub fn from_records(records: &[FinancialRecord]) -> Self {
        Self::from_names(records.iter().map(|r| r.hospital_name.clone()))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.names.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
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

    fn header_line() -> String {
        PayerCategory::required_columns()
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn data_line(state: &str, name: &str, date: &str, mix: &str, op: &str) -> String {
        let mut cells = vec![state.to_string(), format!("\"{}\"", name), date.to_string()];
        cells.extend(std::iter::repeat(mix.to_string()).take(7));
        cells.extend(std::iter::repeat(format!("\"{}\"", op)).take(7));
        cells.join(",")
    }

    fn write_csv(lines: &[String]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(lines.join("\n").as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_required_columns() {
        let columns = PayerCategory::required_columns();
        assert_eq!(columns.len(), 17);
        assert!(columns.contains(&"Medicare Adv Payer Mix"));
        assert!(columns.contains(&"Net Charity Care Cost"));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(".").unwrap(), 0.0);
        assert_eq!(parse_amount("").unwrap(), 0.0);
        assert_eq!(parse_amount(" 0.25 ").unwrap(), 0.25);
        assert_eq!(parse_amount("$1,234,567").unwrap(), 1_234_567.0);
        assert_eq!(parse_amount("-500").unwrap(), -500.0);
        assert_eq!(parse_amount("(2,000)").unwrap(), -2000.0);
        assert!(parse_amount("n/a").is_err());
    }

    #[test]
    fn test_parse_fiscal_date() {
        let expected = NaiveDate::from_ymd_opt(2022, 9, 30).unwrap();
        assert_eq!(parse_fiscal_date("2022-09-30"), Some(expected));
        assert_eq!(parse_fiscal_date("09/30/2022"), Some(expected));
        assert_eq!(parse_fiscal_date("2022-09-30 00:00:00"), Some(expected));
        assert_eq!(parse_fiscal_date("Sept 2022"), None);
    }

    #[test]
    fn test_load_financial_csv() {
        let file = write_csv(&[
            header_line(),
            data_line("NC", "DUKE UNIVERSITY HOSPITAL", "2021-06-30", "0.1", "1,000"),
            data_line("NC", "DUKE UNIVERSITY HOSPITAL", "2022-06-30", ".", "."),
            data_line("SC", "MUSC", "2022-06-30", "0.2", "5"),
        ]);

        let records = load_financial_csv(file.path()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].payer_mix_for(PayerCategory::Commercial), 0.1);
        assert_eq!(records[0].operating_for(PayerCategory::Charity), 1000.0);
        assert_eq!(records[1].payer_mix, [0.0; 7]);
        assert_eq!(records[2].state, "SC");
    }

    #[test]
    fn test_load_financial_missing_columns() {
        let file = write_csv(&[
            "State,Hospital Name,Fiscal Year Ending".to_string(),
            "NC,A,2022-06-30".to_string(),
        ]);

        let err = load_financial_csv(file.path()).unwrap_err();
        let schema_err = err.downcast_ref::<SchemaError>().unwrap();
        assert_eq!(schema_err.missing_columns.len(), 14);
    }

    #[test]
    fn test_load_financial_bad_cell_names_column() {
        let file = write_csv(&[
            header_line(),
            data_line("NC", "A", "2022-06-30", "lots", "1"),
        ]);

        let err = load_financial_csv(file.path()).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Line 2"));
        assert!(message.contains("Charity Care Payer Mix"));
    }

    #[test]
    fn test_net_operating_income() {
        let record = FinancialRecord {
            state: "NC".to_string(),
            hospital_name: "A".to_string(),
            fiscal_year_ending: NaiveDate::from_ymd_opt(2022, 6, 30).unwrap(),
            payer_mix: [0.0; 7],
            operating: [10.0, 5.0, 1.0, 1.0, 1.0, 1.0, 100.0],
        };
        // -10 - 5 + 1 + 1 + 1 + 1 + 100
        assert_eq!(record.net_operating_income(), 89.0);
    }

    #[test]
    fn test_filter_state_and_name_set() {
        let file = write_csv(&[
            header_line(),
            data_line("NC", "WAKEMED", "2021-09-30", "0.1", "1"),
            data_line("SC", "MUSC", "2021-09-30", "0.1", "1"),
            data_line("NC", "DUKE UNIVERSITY HOSPITAL", "2021-06-30", "0.1", "1"),
            data_line("NC", "WAKEMED", "2022-09-30", "0.1", "1"),
        ]);
        let records = load_financial_csv(file.path()).unwrap();

        let nc = filter_state(&records, "NC");
        assert_eq!(nc.len(), 3);

        let names = FinancialNameSet::from_records(&nc);
        assert_eq!(names.names(), &["WAKEMED", "DUKE UNIVERSITY HOSPITAL"]);
        assert!(!names.contains("MUSC"));

        assert_eq!(records_for(&nc, "WAKEMED").len(), 2);
    }

    #[test]
    fn test_name_set_is_case_sensitive() {
        let names = FinancialNameSet::from_names(vec!["Mission", "MISSION", "Mission"]);
        assert_eq!(names.len(), 2);
    }
}
