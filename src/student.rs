// 🎓 Student Model - Raw rows, canonical records, persisted roster entries
// Raw and canonical forms are separate types: normalization never mutates a row

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// RAW RECORD (one CSV row, untouched)
// ============================================================================

/// One row of the upstream extract, exactly as it was read
///
/// Every field is text; empty optional fields arrive as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RawStudentRecord {
    pub student_code: String,
    pub first_name: String,
    pub middle_name: String,
    pub surname: String,
    pub gender: String,
    pub date_of_birth: String,

    #[serde(rename = "LBOTE")]
    pub lbote: String,

    #[serde(rename = "ATSI")]
    pub atsi: String,

    pub disability_status: String,

    #[serde(rename = "EMA")]
    pub ema: String,

    #[serde(rename = "ESL")]
    pub esl: String,

    pub home_group: String,
    pub year_level: String,

    /// 1-based line in the source file (header is line 1), 0 when unknown
    #[serde(skip)]
    pub line_number: u64,
}

impl RawStudentRecord {
    /// Compact one-line rendering used in rejection reports
    pub fn describe(&self) -> String {
        format!(
            "{} | {} {} {} | {} | {} | year {} | group {}",
            self.student_code,
            self.first_name,
            self.middle_name,
            self.surname,
            self.gender,
            self.date_of_birth,
            self.year_level,
            self.home_group
        )
    }
}

// ============================================================================
// CANONICAL ENCODINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Encoding the roster store expects
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "MALE",
            Gender::Female => "FEMAL",
        }
    }

    /// Parse a stored canonical value
    pub fn from_canonical(value: &str) -> Option<Gender> {
        match value {
            "MALE" => Some(Gender::Male),
            "FEMAL" => Some(Gender::Female),
            _ => None,
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five equity/support flags carried on every student
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentFlags {
    pub lbote: bool,
    pub atsi: bool,
    pub disability: bool,
    pub ema: bool,
    pub esl: bool,
}

/// Canonical "0"/"1" text for a flag
pub fn flag_label(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

// ============================================================================
// CANONICAL RECORD (normalizer output)
// ============================================================================

/// A validated, normalized incoming student
///
/// Optional text fields hold an empty string when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub student_code: String,
    pub first_name: String,
    pub middle_name: String,
    pub surname: String,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    pub flags: StudentFlags,
    pub home_group: String,
    /// Canonical year label, e.g. "01", "F", "UG"
    pub year_level: String,
    pub line_number: u64,
}

// ============================================================================
// ROSTER (persisted side)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct School {
    pub id: i64,
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearLevel {
    pub id: i64,
    pub label: String,
}

/// A student row as persisted by the roster store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Internal sequential identity - immutable, never reused
    pub roster_id: i64,
    pub school_id: i64,
    pub year_level_id: i64,
    /// Joined canonical label for `year_level_id` (empty if the id is dangling)
    pub year_level: String,
    pub student_code: String,
    pub external_code: String,
    pub first_name: String,
    pub middle_name: String,
    pub surname: String,
    /// None when the stored value is not a recognised canonical gender
    pub gender: Option<Gender>,
    pub birth_date: Option<NaiveDate>,
    pub flags: StudentFlags,
    pub home_group: String,
    pub deleted: bool,
    pub update_sequence: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub updated_by: String,
}

/// Label → id lookup for year levels, loaded once per run
#[derive(Debug, Clone, Default)]
pub struct YearLevelReference {
    ids: HashMap<String, i64>,
}

impl YearLevelReference {
    pub fn from_levels(levels: &[YearLevel]) -> Self {
        YearLevelReference {
            ids: levels
                .iter()
                .map(|level| (level.label.clone(), level.id))
                .collect(),
        }
    }

    pub fn resolve(&self, label: &str) -> Option<i64> {
        self.ids.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
