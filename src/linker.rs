// 🔗 Name Linker - Bridge financial hospital names to geospatial facilities
//
// Two passes per hospital facility, in input order:
//   1. Exact:  case-insensitive identity against every financial name
//   2. Fuzzy:  difflib close matches of the UPPERCASED facility name,
//              ratio >= cutoff (default 0.85), best candidate wins
//
// The result is a LinkTable keyed by financial name. Facility names are kept
// verbatim because they also name the per-hospital output directories.

use crate::facility::FacilityRecord;
use crate::financial::FinancialNameSet;
use crate::similarity::{rank_close_matches, CloseMatch};
use anyhow::{bail, Result};
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SIMILARITY_CUTOFF: f64 = 0.85;
pub const DEFAULT_MAX_CANDIDATES: usize = 3;

// ============================================================================
// CONFLICT POLICY
// ============================================================================

/// What happens when a second facility resolves to an already-bound
/// financial name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Later facility replaces the earlier binding (historical behaviour)
    #[default]
    LastWriteWins,

    /// First binding is kept, later ones are rejected
    KeepFirst,
}

// ============================================================================
// LINK ENTRY / LINK TABLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMethod {
    Exact,
    Fuzzy,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Exact => "exact",
            MatchMethod::Fuzzy => "fuzzy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkEntry {
    pub financial_name: String,
    pub geospatial_name: String,
    pub method: MatchMethod,

    /// 1.0 for exact matches, similarity ratio for fuzzy ones
    pub score: f64,
}

/// financial name → geospatial name, at most one entry per financial name.
///
/// Iterates in order of first binding. Only the linker can add entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkTable {
    entries: IndexMap<String, LinkEntry>,
}

impl LinkTable {
    pub fn geospatial_name(&self, financial_name: &str) -> Option<&str> {
        self.entries
            .get(financial_name)
            .map(|e| e.geospatial_name.as_str())
    }

    pub fn entry(&self, financial_name: &str) -> Option<&LinkEntry> {
        self.entries.get(financial_name)
    }

    pub fn entries(&self) -> impl Iterator<Item = &LinkEntry> {
        self.entries.values()
    }

    /// `(financial_name, geospatial_name)` pairs
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|e| (e.financial_name.as_str(), e.geospatial_name.as_str()))
    }

    pub fn is_linked_facility(&self, geospatial_name: &str) -> bool {
        self.entries
            .values()
            .any(|e| e.geospatial_name == geospatial_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// PER-RECORD AUDIT TRAIL
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordOutcome {
    /// Not a hospital, never considered
    Skipped,

    ExactMatched {
        financial_name: String,
    },

    FuzzyMatched {
        financial_name: String,
        score: f64,
        /// Other candidates above the cutoff, best first
        runners_up: Vec<CloseMatch>,
    },

    Unmatched,
}

impl RecordOutcome {
    pub fn financial_name(&self) -> Option<&str> {
        match self {
            RecordOutcome::ExactMatched { financial_name }
            | RecordOutcome::FuzzyMatched { financial_name, .. } => Some(financial_name),
            RecordOutcome::Skipped | RecordOutcome::Unmatched => None,
        }
    }

    /// True when the best fuzzy score is shared with another candidate
    pub fn is_ambiguous(&self) -> bool {
        match self {
            RecordOutcome::FuzzyMatched {
                score, runners_up, ..
            } => runners_up.iter().any(|c| c.score == *score),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDecision {
    /// Position in the facility input
    pub record_index: usize,
    pub facility_name: String,
    pub outcome: RecordOutcome,

    /// False when the conflict policy rejected the binding
    pub bound: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConflict {
    pub financial_name: String,
    pub kept: String,
    pub discarded: String,
    pub policy: ConflictPolicy,
}

// ============================================================================
// LINK REPORT
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkReport {
    pub table: LinkTable,
    pub decisions: Vec<RecordDecision>,
    pub conflicts: Vec<LinkConflict>,
}

impl LinkReport {
    pub fn hospital_count(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| d.outcome != RecordOutcome::Skipped)
            .count()
    }

    pub fn exact_count(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| matches!(d.outcome, RecordOutcome::ExactMatched { .. }))
            .count()
    }

    pub fn fuzzy_count(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| matches!(d.outcome, RecordOutcome::FuzzyMatched { .. }))
            .count()
    }

    pub fn unmatched_count(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| d.outcome == RecordOutcome::Unmatched)
            .count()
    }

    pub fn summary(&self) -> String {
        format!(
            "Linked {} financial names from {} hospital facilities ({} exact, {} fuzzy, {} unmatched, {} conflicts)",
            self.table.len(),
            self.hospital_count(),
            self.exact_count(),
            self.fuzzy_count(),
            self.unmatched_count(),
            self.conflicts.len()
        )
    }

    /// Fold step: record one decision and apply its binding
    fn record(mut self, mut decision: RecordDecision, policy: ConflictPolicy) -> Self {
        let entry = match &decision.outcome {
            RecordOutcome::ExactMatched { financial_name } => Some(LinkEntry {
                financial_name: financial_name.clone(),
                geospatial_name: decision.facility_name.clone(),
                method: MatchMethod::Exact,
                score: 1.0,
            }),
            RecordOutcome::FuzzyMatched {
                financial_name,
                score,
                ..
            } => Some(LinkEntry {
                financial_name: financial_name.clone(),
                geospatial_name: decision.facility_name.clone(),
                method: MatchMethod::Fuzzy,
                score: *score,
            }),
            RecordOutcome::Skipped | RecordOutcome::Unmatched => None,
        };

        if let Some(entry) = entry {
            decision.bound = self.bind(entry, policy);
        }

        self.decisions.push(decision);
        self
    }

    /// Returns whether `entry` is now the table's binding for its name
    fn bind(&mut self, entry: LinkEntry, policy: ConflictPolicy) -> bool {
        let Some(existing) = self
            .table
            .entries
            .get(&entry.financial_name)
            .map(|e| e.geospatial_name.clone())
        else {
            self.table.entries.insert(entry.financial_name.clone(), entry);
            return true;
        };

        if existing == entry.geospatial_name {
            debug!(
                "Duplicate facility {:?} re-resolved to {:?}; keeping first entry",
                entry.geospatial_name, entry.financial_name
            );
            return false;
        }

        warn!(
            "Financial name {:?} matched by both {:?} and {:?} ({:?})",
            entry.financial_name, existing, entry.geospatial_name, policy
        );

        let (kept, discarded, replaced) = match policy {
            ConflictPolicy::LastWriteWins => (entry.geospatial_name.clone(), existing, true),
            ConflictPolicy::KeepFirst => (existing, entry.geospatial_name.clone(), false),
        };

        self.conflicts.push(LinkConflict {
            financial_name: entry.financial_name.clone(),
            kept,
            discarded,
            policy,
        });

        if replaced {
            // IndexMap::insert keeps the original position of the key
            self.table.entries.insert(entry.financial_name.clone(), entry);
        }
        replaced
    }
}

// ============================================================================
// NAME LINKER
// ============================================================================

#[derive(Debug, Clone)]
pub struct NameLinker {
    similarity_cutoff: f64,
    max_candidates: usize,
    conflict_policy: ConflictPolicy,
}

impl NameLinker {
    /// Linker with the historical settings: cutoff 0.85, 3 candidates,
    /// last-write-wins
    pub fn new() -> Self {
        NameLinker {
            similarity_cutoff: DEFAULT_SIMILARITY_CUTOFF,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            conflict_policy: ConflictPolicy::default(),
        }
    }

    pub fn with_settings(
        similarity_cutoff: f64,
        max_candidates: usize,
        conflict_policy: ConflictPolicy,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&similarity_cutoff) {
            bail!("similarity cutoff must be in [0.0, 1.0], got {}", similarity_cutoff);
        }
        if max_candidates == 0 {
            bail!("max_candidates must be at least 1");
        }

        Ok(NameLinker {
            similarity_cutoff,
            max_candidates,
            conflict_policy,
        })
    }

    pub fn with_policy(mut self, conflict_policy: ConflictPolicy) -> Self {
        self.conflict_policy = conflict_policy;
        self
    }

    pub fn similarity_cutoff(&self) -> f64 {
        self.similarity_cutoff
    }

    pub fn conflict_policy(&self) -> ConflictPolicy {
        self.conflict_policy
    }

    /// Link every hospital facility to at most one financial name.
    ///
    /// Pure: same inputs in the same order give the same report.
    pub fn link(&self, names: &FinancialNameSet, facilities: &[FacilityRecord]) -> LinkReport {
        let report = facilities.iter().enumerate().fold(
            LinkReport::default(),
            |report, (record_index, facility)| {
                let outcome = if facility.is_hospital() {
                    self.match_name(names, &facility.name)
                } else {
                    RecordOutcome::Skipped
                };
                let decision = RecordDecision {
                    record_index,
                    facility_name: facility.name.clone(),
                    outcome,
                    bound: false,
                };
                report.record(decision, self.conflict_policy)
            },
        );

        info!("{}", report.summary());
        report
    }

    /// Decide which financial name, if any, `facility_name` refers to
    pub fn match_name(&self, names: &FinancialNameSet, facility_name: &str) -> RecordOutcome {
        if let Some(financial_name) = exact_match(names, facility_name) {
            debug!("Exact: {:?} -> {:?}", facility_name, financial_name);
            return RecordOutcome::ExactMatched {
                financial_name: financial_name.to_string(),
            };
        }

        let upper = facility_name.to_uppercase();
        let mut candidates = rank_close_matches(
            &upper,
            names.names(),
            self.max_candidates,
            self.similarity_cutoff,
        );

        if candidates.is_empty() {
            debug!("Unmatched: {:?}", facility_name);
            return RecordOutcome::Unmatched;
        }

        let best = candidates.remove(0);
        let outcome = RecordOutcome::FuzzyMatched {
            financial_name: best.candidate,
            score: best.score,
            runners_up: candidates,
        };

        if outcome.is_ambiguous() {
            info!(
                "Ambiguous: {:?} ties at {:.3}; chose {:?} over {:?}",
                facility_name,
                best.score,
                outcome.financial_name().unwrap_or_default(),
                tied_candidates(&outcome)
            );
        } else {
            debug!(
                "Fuzzy: {:?} -> {:?} ({:.3})",
                facility_name,
                outcome.financial_name().unwrap_or_default(),
                best.score
            );
        }

        outcome
    }
}

impl Default for NameLinker {
    fn default() -> Self {
        Self::new()
    }
}

/// First financial name, in set order, equal to `facility_name` ignoring case
fn exact_match<'a>(names: &'a FinancialNameSet, facility_name: &str) -> Option<&'a str> {
    let folded = facility_name.to_lowercase();
    names
        .iter()
        .find(|name| name.to_lowercase() == folded)
        .map(String::as_str)
}

fn tied_candidates(outcome: &RecordOutcome) -> Vec<&str> {
    match outcome {
        RecordOutcome::FuzzyMatched {
            score, runners_up, ..
        } => runners_up
            .iter()
            .filter(|c| c.score == *score)
            .map(|c| c.candidate.as_str())
            .collect(),
        _ => Vec::new(),
    }
}

/// Link with default settings, returning only the table
pub fn link(financial_names: &FinancialNameSet, facility_records: &[FacilityRecord]) -> LinkTable {
    NameLinker::new().link(financial_names, facility_records).table
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn hospital(name: &str) -> FacilityRecord {
        FacilityRecord::new(name, "Hospital", 35.8, -78.6)
    }

    fn names(list: &[&str]) -> FinancialNameSet {
        FinancialNameSet::from_names(list.iter().copied())
    }

    #[test]
    fn test_duke_and_wakemed_linkage() {
        let financial = names(&["DUKE UNIVERSITY HOSPITAL", "WAKEMED"]);
        let facilities = vec![
            hospital("Duke University Hospital"),
            hospital("WakeMed Cary Hospital"),
        ];

        let table = link(&financial, &facilities);

        assert_eq!(table.len(), 1);
        assert_eq!(
            table.geospatial_name("DUKE UNIVERSITY HOSPITAL"),
            Some("Duke University Hospital")
        );
        assert_eq!(table.entry("DUKE UNIVERSITY HOSPITAL").unwrap().method, MatchMethod::Exact);
        assert!(!table.is_linked_facility("WakeMed Cary Hospital"));
    }

    #[test]
    fn test_exact_match_takes_precedence_over_closer_fuzzy_candidates() {
        // "MISSION HOSPITALS" would also clear the cutoff against the uppercased name
        let financial = names(&["MISSION HOSPITALS", "Mission Hospital"]);
        let linker = NameLinker::new();

        let outcome = linker.match_name(&financial, "MISSION HOSPITAL");
        assert_eq!(
            outcome,
            RecordOutcome::ExactMatched {
                financial_name: "Mission Hospital".to_string()
            }
        );
    }

    #[test]
    fn test_exact_match_first_in_set_order_wins() {
        let financial = names(&["Mission", "MISSION"]);
        let linker = NameLinker::new();

        let outcome = linker.match_name(&financial, "mission");
        assert_eq!(outcome.financial_name(), Some("Mission"));
    }

    #[test]
    fn test_similarity_floor() {
        let linker = NameLinker::new();

        // ratio 0.84: rejected
        let below = names(&["ABCDEFGHIJKLMNOPQRSTUVWXY"]);
        assert_eq!(
            linker.match_name(&below, "ABCD1FGHI2KLMN3PQRS4UVWXY"),
            RecordOutcome::Unmatched
        );

        // ratio 0.90 after uppercasing: accepted
        let above = names(&["ABCDEFGHIJ"]);
        match linker.match_name(&above, "abcd1fghij") {
            RecordOutcome::FuzzyMatched {
                financial_name,
                score,
                runners_up,
            } => {
                assert_eq!(financial_name, "ABCDEFGHIJ");
                assert_eq!(score, 0.9);
                assert!(runners_up.is_empty());
            }
            other => panic!("expected fuzzy match, got {:?}", other),
        }
    }

    #[test]
    fn test_fuzzy_compares_uppercased_name_case_sensitively() {
        // Mixed-case financial names never fuzzy-match an uppercased facility name
        let financial = names(&["Rex Hospital Inc"]);
        let table = link(&financial, &[hospital("Rex Hospital")]);
        assert!(table.is_empty());

        let financial = names(&["REX HOSPITAL INC"]);
        let table = link(&financial, &[hospital("Rex Hospital")]);
        assert_eq!(table.geospatial_name("REX HOSPITAL INC"), Some("Rex Hospital"));
        assert_eq!(table.entry("REX HOSPITAL INC").unwrap().method, MatchMethod::Fuzzy);
    }

    #[test]
    fn test_no_match_below_floor_leaves_no_entry() {
        let financial = names(&["WAKEMED", "DUKE UNIVERSITY HOSPITAL"]);
        let report = NameLinker::new().link(&financial, &[hospital("Cape Fear Valley Medical Center")]);

        assert!(report.table.is_empty());
        assert!(!report.table.is_linked_facility("Cape Fear Valley Medical Center"));
        assert_eq!(report.unmatched_count(), 1);
        assert!(!report.decisions[0].bound);
    }

    #[test]
    fn test_non_hospitals_are_excluded() {
        let financial = names(&["DUKE UNIVERSITY HOSPITAL"]);
        let facilities = vec![
            FacilityRecord::new("Duke University Hospital", "Ambulatory Surgical Facility", 36.0, -78.9),
            FacilityRecord::new("Duke University Hospital", "hospital", 36.0, -78.9),
        ];

        let report = NameLinker::new().link(&financial, &facilities);
        assert!(report.table.is_empty());
        assert_eq!(report.hospital_count(), 0);
        assert!(report
            .decisions
            .iter()
            .all(|d| d.outcome == RecordOutcome::Skipped));
    }

    #[test]
    fn test_determinism() {
        let financial = names(&[
            "WAKEMED RALEIGH CAMPUS",
            "DUKE UNIVERSITY HOSPITAL",
            "REX HOSPITAL INC",
        ]);
        let facilities = vec![
            hospital("Rex Hospital"),
            hospital("WakeMed Raleigh Campus East"),
            FacilityRecord::new("Durham Dialysis", "Dialysis", 36.0, -78.9),
            hospital("Duke University Hospital"),
            hospital("WakeMed Raleigh Campus"),
        ];

        let first: Vec<LinkEntry> = link(&financial, &facilities).entries().cloned().collect();
        let second: Vec<LinkEntry> = link(&financial, &facilities).entries().cloned().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_last_write_wins_keeps_position() {
        let financial = names(&["WAKEMED RALEIGH CAMPUS", "DUKE UNIVERSITY HOSPITAL"]);
        let facilities = vec![
            hospital("WakeMed Raleigh Campus"),
            hospital("Duke University Hospital"),
            // ratio ~0.898 against "WAKEMED RALEIGH CAMPUS"
            hospital("WakeMed Raleigh Campus East"),
        ];

        let report = NameLinker::new().link(&financial, &facilities);

        assert_eq!(
            report.table.geospatial_name("WAKEMED RALEIGH CAMPUS"),
            Some("WakeMed Raleigh Campus East")
        );
        let order: Vec<&str> = report.table.pairs().map(|(f, _)| f).collect();
        assert_eq!(order, vec!["WAKEMED RALEIGH CAMPUS", "DUKE UNIVERSITY HOSPITAL"]);

        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].kept, "WakeMed Raleigh Campus East");
        assert_eq!(report.conflicts[0].discarded, "WakeMed Raleigh Campus");
        assert!(report.decisions[2].bound);
    }

    #[test]
    fn test_keep_first_rejects_later_binding() {
        let financial = names(&["WAKEMED RALEIGH CAMPUS"]);
        let facilities = vec![
            hospital("WakeMed Raleigh Campus"),
            hospital("WakeMed Raleigh Campus East"),
        ];

        let report = NameLinker::new()
            .with_policy(ConflictPolicy::KeepFirst)
            .link(&financial, &facilities);

        assert_eq!(
            report.table.geospatial_name("WAKEMED RALEIGH CAMPUS"),
            Some("WakeMed Raleigh Campus")
        );
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].discarded, "WakeMed Raleigh Campus East");
        assert!(!report.decisions[1].bound);
    }

    #[test]
    fn test_duplicate_facility_is_not_a_conflict() {
        let financial = names(&["WAKEMED RALEIGH CAMPUS"]);
        let facilities = vec![
            hospital("WakeMed Raleigh Campus"),
            hospital("WakeMed Raleigh Campus"),
        ];

        let report = NameLinker::new().link(&financial, &facilities);
        assert_eq!(report.table.len(), 1);
        assert!(report.conflicts.is_empty());
    }

    #[test]
    fn test_ambiguous_tie_is_resolved_deterministically() {
        let financial = names(&["ABCDEFGHIJX", "ABCDEFGHIJY"]);
        let outcome = NameLinker::new().match_name(&financial, "abcdefghijz");

        assert!(outcome.is_ambiguous());
        assert_eq!(outcome.financial_name(), Some("ABCDEFGHIJY"));
    }

    #[test]
    fn test_with_settings_validation() {
        assert!(NameLinker::with_settings(1.2, 3, ConflictPolicy::KeepFirst).is_err());
        assert!(NameLinker::with_settings(0.85, 0, ConflictPolicy::KeepFirst).is_err());

        let linker = NameLinker::with_settings(0.6, 1, ConflictPolicy::KeepFirst).unwrap();
        assert_eq!(linker.similarity_cutoff(), 0.6);
        assert_eq!(linker.conflict_policy(), ConflictPolicy::KeepFirst);
    }

    #[test]
    fn test_report_summary() {
        let financial = names(&["DUKE UNIVERSITY HOSPITAL", "WAKEMED"]);
        let facilities = vec![
            hospital("Duke University Hospital"),
            hospital("WakeMed Cary Hospital"),
            FacilityRecord::new("Durham Dialysis", "Dialysis", 36.0, -78.9),
        ];

        let report = NameLinker::new().link(&financial, &facilities);
        assert_eq!(
            report.summary(),
            "Linked 1 financial names from 2 hospital facilities (1 exact, 0 fuzzy, 1 unmatched, 0 conflicts)"
        );
    }
}
