// 🧮 Diff Engine - Minimal change detection for matched students
// Field-exact comparison of canonical forms; every change becomes an audit line

use crate::student::{flag_label, RosterEntry, StudentRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// CHANGE SET
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old: String,
    pub new: String,
}

impl std::fmt::Display for FieldChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: '{}' -> '{}'", self.field, self.old, self.new)
    }
}

/// Ordered field changes between a roster entry and its incoming record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    changes: Vec<FieldChange>,
}

impl ChangeSet {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn changes(&self) -> &[FieldChange] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<FieldChange> {
        self.changes
    }

    pub fn contains(&self, field: &str) -> bool {
        self.changes.iter().any(|change| change.field == field)
    }

    /// Human-readable lines, one per changed field
    pub fn change_log(&self) -> Vec<String> {
        self.changes.iter().map(ToString::to_string).collect()
    }

    fn compare(&mut self, field: &str, old: &str, new: &str) {
        if old != new {
            self.changes.push(FieldChange {
                field: field.to_string(),
                old: old.to_string(),
                new: new.to_string(),
            });
        }
    }
}

fn date_label(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

// ============================================================================
// DIFF ENGINE
// ============================================================================

pub struct DiffEngine;

impl DiffEngine {
    pub fn new() -> Self {
        DiffEngine
    }

    /// Compare every mutable field of a matched pair
    ///
    /// A deleted entry always yields a `deleted: '1' -> '0'` change, so
    /// reappearing students are restored even when nothing else differs.
    pub fn diff(&self, existing: &RosterEntry, incoming: &StudentRecord) -> ChangeSet {
        let mut set = ChangeSet::default();

        set.compare("year_level", &existing.year_level, &incoming.year_level);
        set.compare("first_name", &existing.first_name, &incoming.first_name);
        set.compare("middle_name", &existing.middle_name, &incoming.middle_name);
        set.compare("surname", &existing.surname, &incoming.surname);
        set.compare(
            "gender",
            existing.gender.map(|g| g.as_str()).unwrap_or(""),
            incoming.gender.as_str(),
        );
        set.compare(
            "birth_date",
            &date_label(existing.birth_date),
            &date_label(Some(incoming.birth_date)),
        );

        let (old, new) = (&existing.flags, &incoming.flags);
        set.compare("lbote", flag_label(old.lbote), flag_label(new.lbote));
        set.compare("atsi", flag_label(old.atsi), flag_label(new.atsi));
        set.compare("disability", flag_label(old.disability), flag_label(new.disability));
        set.compare("ema", flag_label(old.ema), flag_label(new.ema));
        set.compare("esl", flag_label(old.esl), flag_label(new.esl));

        set.compare("home_group", &existing.home_group, &incoming.home_group);

        if existing.deleted {
            set.compare("deleted", flag_label(true), flag_label(false));
        }

        set
    }
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::student::{Gender, StudentFlags};

    fn create_test_entry() -> RosterEntry {
        RosterEntry {
            roster_id: 100001,
            school_id: 1,
            year_level_id: 4,
            year_level: "03".to_string(),
            student_code: "S001".to_string(),
            external_code: "S001".to_string(),
            first_name: "Ada".to_string(),
            middle_name: String::new(),
            surname: "Lovelace".to_string(),
            gender: Some(Gender::Female),
            birth_date: NaiveDate::from_ymd_opt(2015, 12, 10),
            flags: StudentFlags { esl: true, ..StudentFlags::default() },
            home_group: "3A".to_string(),
            deleted: false,
            update_sequence: 3,
            created_at: None,
            updated_at: None,
            created_by: "test".to_string(),
            updated_by: "test".to_string(),
        }
    }

    fn create_matching_record() -> StudentRecord {
        StudentRecord {
            student_code: "S001".to_string(),
            first_name: "Ada".to_string(),
            middle_name: String::new(),
            surname: "Lovelace".to_string(),
            gender: Gender::Female,
            birth_date: NaiveDate::from_ymd_opt(2015, 12, 10).unwrap(),
            flags: StudentFlags { esl: true, ..StudentFlags::default() },
            home_group: "3A".to_string(),
            year_level: "03".to_string(),
            line_number: 2,
        }
    }

    #[test]
    fn test_identical_record_yields_empty_change_set() {
        let engine = DiffEngine::new();
        let changes = engine.diff(&create_test_entry(), &create_matching_record());

        assert!(changes.is_empty());
        assert!(!changes.has_changes());
        assert!(changes.change_log().is_empty());
    }

    #[test]
    fn test_changed_fields_in_order() {
        let engine = DiffEngine::new();
        let mut record = create_matching_record();
        record.year_level = "04".to_string();
        record.home_group = "4B".to_string();
        record.flags.atsi = true;

        let changes = engine.diff(&create_test_entry(), &record);

        assert_eq!(changes.len(), 3);
        assert_eq!(
            changes.change_log(),
            vec![
                "year_level: '03' -> '04'",
                "atsi: '0' -> '1'",
                "home_group: '3A' -> '4B'",
            ]
        );
    }

    #[test]
    fn test_comparison_is_exact() {
        let engine = DiffEngine::new();
        let mut record = create_matching_record();
        record.first_name = "ADA".to_string();

        let changes = engine.diff(&create_test_entry(), &record);
        assert!(changes.contains("first_name"));
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_deleted_entry_is_undeleted() {
        let engine = DiffEngine::new();
        let mut entry = create_test_entry();
        entry.deleted = true;

        let changes = engine.diff(&entry, &create_matching_record());

        assert_eq!(changes.len(), 1);
        assert_eq!(changes.changes()[0].to_string(), "deleted: '1' -> '0'");
    }

    #[test]
    fn test_missing_stored_values_are_changes() {
        let engine = DiffEngine::new();
        let mut entry = create_test_entry();
        entry.birth_date = None;
        entry.gender = None;

        let changes = engine.diff(&entry, &create_matching_record());

        assert!(changes.contains("birth_date"));
        assert!(changes.contains("gender"));
        assert_eq!(changes.changes()[0].new, "FEMAL");
    }
}
