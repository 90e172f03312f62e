// 🔍 Identity Matcher - Is this incoming student someone already on the roster?
// Exact student code lookup, optionally corroborated by name and birth date

use crate::student::{RosterEntry, StudentRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// ROSTER INDEX
// ============================================================================

/// Read-only view of the roster taken at the start of a run
///
/// Mutations made later in the same run are never reflected here.
#[derive(Debug, Clone, Default)]
pub struct RosterIndex {
    entries: Vec<RosterEntry>,
    by_code: HashMap<String, usize>,
}

impl RosterIndex {
    pub fn new(entries: Vec<RosterEntry>) -> Self {
        let mut by_code: HashMap<String, usize> = HashMap::new();

        for (i, entry) in entries.iter().enumerate() {
            // A live entry wins over a deleted one with the same code
            match by_code.get(&entry.student_code) {
                Some(&j) if !entries[j].deleted || entry.deleted => {}
                _ => {
                    by_code.insert(entry.student_code.clone(), i);
                }
            }
        }

        RosterIndex { entries, by_code }
    }

    pub fn get(&self, student_code: &str) -> Option<&RosterEntry> {
        self.by_code.get(student_code).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn max_roster_id(&self) -> Option<i64> {
        self.entries.iter().map(|entry| entry.roster_id).max()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// MATCH RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchStrategy {
    /// Student code matched, corroboration disabled
    StudentCode,

    /// Student code matched and enough identity fields agreed
    Corroborated { agreements: u8 },
}

/// The identity fields shown side by side when a match is ambiguous
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySummary {
    pub student_code: String,
    pub first_name: String,
    pub surname: String,
    pub birth_date: Option<NaiveDate>,
}

impl IdentitySummary {
    pub fn of_entry(entry: &RosterEntry) -> Self {
        IdentitySummary {
            student_code: entry.student_code.clone(),
            first_name: entry.first_name.clone(),
            surname: entry.surname.clone(),
            birth_date: entry.birth_date,
        }
    }

    pub fn of_record(record: &StudentRecord) -> Self {
        IdentitySummary {
            student_code: record.student_code.clone(),
            first_name: record.first_name.clone(),
            surname: record.surname.clone(),
            birth_date: Some(record.birth_date),
        }
    }
}

impl std::fmt::Display for IdentitySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dob = self
            .birth_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{} {} {} born {}",
            self.student_code, self.first_name, self.surname, dob
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome<'a> {
    /// Nothing on the roster carries this student code
    NoMatch,

    Match {
        entry: &'a RosterEntry,
        strategy: MatchStrategy,
    },

    /// Code matched but the people look different - never merged
    Ambiguous {
        entry: &'a RosterEntry,
        agreements: u8,
        reason: String,
    },
}

// ============================================================================
// IDENTITY MATCHER
// ============================================================================

pub struct IdentityMatcher {
    /// Corroborate code matches against name and birth date (default: on)
    pub extended_check: bool,

    /// Agreements out of {first name, surname, birth date} needed (default: 2)
    pub required_agreements: u8,
}

impl IdentityMatcher {
    pub fn new() -> Self {
        IdentityMatcher {
            extended_check: true,
            required_agreements: 2,
        }
    }

    pub fn with_extended_check(extended_check: bool) -> Self {
        IdentityMatcher {
            extended_check,
            ..Self::new()
        }
    }

    /// Resolve an incoming record against the roster snapshot
    ///
    /// Deleted entries match too; the diff engine turns that into an undelete.
    pub fn find<'a>(&self, record: &StudentRecord, roster: &'a RosterIndex) -> MatchOutcome<'a> {
        let entry = match roster.get(&record.student_code) {
            Some(entry) => entry,
            None => return MatchOutcome::NoMatch,
        };

        if !self.extended_check {
            return MatchOutcome::Match {
                entry,
                strategy: MatchStrategy::StudentCode,
            };
        }

        let agreements = Self::count_agreements(record, entry);
        if agreements >= self.required_agreements {
            MatchOutcome::Match {
                entry,
                strategy: MatchStrategy::Corroborated { agreements },
            }
        } else {
            MatchOutcome::Ambiguous {
                entry,
                agreements,
                reason: format!(
                    "Only {} of first name, surname, birth date agree (need {})",
                    agreements, self.required_agreements
                ),
            }
        }
    }

    /// How many of {first name, surname, birth date} agree
    ///
    /// Names compare ignoring ASCII case, dates compare exactly.
    pub fn count_agreements(record: &StudentRecord, entry: &RosterEntry) -> u8 {
        let first = record.first_name.eq_ignore_ascii_case(&entry.first_name);
        let last = record.surname.eq_ignore_ascii_case(&entry.surname);
        let dob = entry.birth_date == Some(record.birth_date);

        [first, last, dob].iter().filter(|&&agrees| agrees).count() as u8
    }
}

impl Default for IdentityMatcher {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
