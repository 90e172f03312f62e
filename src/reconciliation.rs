// ⚖️ Reconciliation Engine - Bring the roster in line with the upstream extract
//
// Per record:
//   validate → normalize → resolve year level → match →
//     { Match: diff → update | no-op ; Ambiguous: reject ; NoMatch: allocate → insert }
// then, with soft delete on, sweep the school's entries missing from the batch.
//
// Every mutation commits on its own; a failed record never stops the batch.

use crate::allocator::IdAllocator;
use crate::config::SyncConfig;
use crate::db::{NewStudent, RosterStore, StudentUpdate};
use crate::diff::{DiffEngine, FieldChange};
use crate::error::{BootstrapError, RecordError, StoreOperation};
use crate::matcher::{IdentityMatcher, IdentitySummary, MatchOutcome, MatchStrategy, RosterIndex};
use crate::normalize::normalize_record;
use crate::schema::FieldValidator;
use crate::source::RecordSource;
use crate::student::{RawStudentRecord, RosterEntry, School, StudentRecord, YearLevelReference};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

// ============================================================================
// OUTCOMES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome {
    Inserted { roster_id: i64 },

    Updated {
        roster_id: i64,
        changes: Vec<FieldChange>,
    },

    /// Matched and identical, nothing written
    Unchanged { roster_id: i64 },

    /// Swept: on the roster but absent from the batch
    Deleted { roster_id: i64 },

    Rejected {
        error: RecordError,
        /// The offending record as it was read
        content: String,
    },
}

impl RecordOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, RecordOutcome::Rejected { .. })
    }

    pub fn roster_id(&self) -> Option<i64> {
        match self {
            RecordOutcome::Inserted { roster_id }
            | RecordOutcome::Updated { roster_id, .. }
            | RecordOutcome::Unchanged { roster_id }
            | RecordOutcome::Deleted { roster_id } => Some(*roster_id),
            RecordOutcome::Rejected { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeEntry {
    /// Source line, 0 for sweep outcomes
    pub line_number: u64,
    pub student_code: String,
    pub outcome: RecordOutcome,
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub run_id: String,
    pub school_id: i64,
    pub source: String,
    pub source_digest: Option<String>,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub errored: usize,
    pub outcomes: Vec<OutcomeEntry>,
}

impl ReconciliationReport {
    fn start(school_id: i64, source: String, source_digest: Option<String>, dry_run: bool) -> Self {
        let now = Utc::now();
        ReconciliationReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            school_id,
            source,
            source_digest,
            dry_run,
            started_at: now,
            finished_at: now,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            deleted: 0,
            errored: 0,
            outcomes: Vec::new(),
        }
    }

    fn record(&mut self, line_number: u64, student_code: &str, outcome: RecordOutcome) {
        match &outcome {
            RecordOutcome::Inserted { .. } => self.inserted += 1,
            RecordOutcome::Updated { .. } => self.updated += 1,
            RecordOutcome::Unchanged { .. } => self.unchanged += 1,
            RecordOutcome::Deleted { .. } => self.deleted += 1,
            RecordOutcome::Rejected { .. } => self.errored += 1,
        }
        self.outcomes.push(OutcomeEntry {
            line_number,
            student_code: student_code.to_string(),
            outcome,
        });
    }

    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    pub fn rejections(&self) -> impl Iterator<Item = &OutcomeEntry> {
        self.outcomes.iter().filter(|entry| entry.outcome.is_rejected())
    }

    pub fn summary(&self) -> String {
        format!(
            "{}School {} from {}: {} inserted, {} updated, {} unchanged, {} deleted, {} errored",
            if self.dry_run { "[dry run] " } else { "" },
            self.school_id,
            self.source,
            self.inserted,
            self.updated,
            self.unchanged,
            self.deleted,
            self.errored
        )
    }
}

// ============================================================================
// SCHOOL SELECTION
// ============================================================================

/// Pick the school a run applies to
///
/// An explicit id must exist. Without one, exactly one school must exist.
pub fn select_school(schools: &[School], requested: Option<i64>) -> Result<&School, BootstrapError> {
    if let Some(id) = requested {
        return schools
            .iter()
            .find(|school| school.id == id)
            .ok_or(BootstrapError::UnknownSchool(id));
    }

    match schools {
        [] => Err(BootstrapError::NoSchools),
        [only] => Ok(only),
        _ => Err(BootstrapError::AmbiguousSchool {
            count: schools.len(),
            choices: schools
                .iter()
                .map(|school| format!("{} ({})", school.id, school.name))
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

/// First validated occurrence of a student code in the batch
struct SeenCode {
    index: usize,
    line: u64,
    rejected: bool,
}

/// Mutable state for one run: allocator plus every code seen so far
struct BatchState<'a> {
    school_id: i64,
    year_levels: &'a YearLevelReference,
    roster: &'a RosterIndex,
    allocator: IdAllocator,
    seen: HashMap<String, SeenCode>,
}

pub struct Reconciler {
    config: SyncConfig,
    validator: FieldValidator,
    matcher: IdentityMatcher,
    diff: DiffEngine,
}

impl Reconciler {
    pub fn new(config: SyncConfig) -> Self {
        let matcher = IdentityMatcher::with_extended_check(config.extended_identity_check);
        Reconciler {
            config,
            validator: FieldValidator::new(),
            matcher,
            diff: DiffEngine::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Reconcile one batch against the store
    ///
    /// Bootstrap (school, year levels, roster snapshot, source) either fully
    /// succeeds or the run aborts before touching any record. After that,
    /// per-record failures only show up in the report.
    pub fn run<S, R>(&self, store: &S, source: &R) -> Result<ReconciliationReport, BootstrapError>
    where
        S: RosterStore + ?Sized,
        R: RecordSource + ?Sized,
    {
        let schools = store.list_schools().map_err(BootstrapError::store)?;
        let school = select_school(&schools, self.config.school_id)?;

        let levels = store.list_year_levels().map_err(BootstrapError::store)?;
        if levels.is_empty() {
            return Err(BootstrapError::NoYearLevels);
        }
        let year_levels = YearLevelReference::from_levels(&levels);

        let roster = RosterIndex::new(store.list_students().map_err(BootstrapError::store)?);
        let records = source.read_records().map_err(BootstrapError::source)?;

        debug!(
            school_id = school.id,
            school = %school.name,
            year_levels = year_levels.len(),
            roster_size = roster.len(),
            batch_size = records.len(),
            "bootstrap complete"
        );

        let mut report = ReconciliationReport::start(
            school.id,
            source.describe(),
            source.digest(),
            self.config.dry_run,
        );

        let mut state = BatchState {
            school_id: school.id,
            year_levels: &year_levels,
            roster: &roster,
            allocator: IdAllocator::seeded(roster.max_roster_id(), self.config.base_for(school.id)),
            seen: HashMap::new(),
        };
        debug!(next_roster_id = state.allocator.peek(), "allocator seeded");

        for (index, raw) in records.iter().enumerate() {
            let outcome = self.process_record(store, &mut state, index, raw);
            if let RecordOutcome::Rejected { error, content } = &outcome {
                warn!(
                    line = raw.line_number,
                    kind = error.kind(),
                    record = %content,
                    "rejected: {}",
                    error
                );
                if let Some(seen) = state.seen.get_mut(raw.student_code.trim()) {
                    if seen.index == index {
                        seen.rejected = true;
                    }
                }
            }
            report.record(raw.line_number, raw.student_code.trim(), outcome);
        }

        if self.config.soft_delete {
            self.sweep(store, &state, &mut report);
        }

        report.finished_at = Utc::now();
        debug!(ids_issued = state.allocator.issued(), "batch complete");
        info!(run_id = %report.run_id, "{}", report.summary());

        Ok(report)
    }

    fn process_record<S: RosterStore + ?Sized>(
        &self,
        store: &S,
        state: &mut BatchState<'_>,
        index: usize,
        raw: &RawStudentRecord,
    ) -> RecordOutcome {
        let reject = |error: RecordError| RecordOutcome::Rejected {
            error,
            content: raw.describe(),
        };

        if let Err(violations) = self.validator.validate(raw) {
            return reject(RecordError::Validation { violations });
        }

        let record = match normalize_record(raw) {
            Ok(record) => record,
            Err(violations) => return reject(RecordError::Validation { violations }),
        };

        if let Some(first) = state.seen.get(&record.student_code) {
            return reject(RecordError::DuplicateInBatch {
                student_code: record.student_code,
                first_line: first.line,
                first_rejected: first.rejected,
            });
        }
        state.seen.insert(
            record.student_code.clone(),
            SeenCode {
                index,
                line: record.line_number,
                rejected: false,
            },
        );

        let year_level_id = match state.year_levels.resolve(&record.year_level) {
            Some(id) => id,
            None => {
                return reject(RecordError::YearLevelResolution {
                    label: record.year_level,
                })
            }
        };

        // student_code is unique across the roster; another school's entry is never touched
        if let Some(entry) = state.roster.get(&record.student_code) {
            if entry.school_id != state.school_id {
                return reject(RecordError::SchoolConflict {
                    student_code: record.student_code,
                    roster_id: entry.roster_id,
                    owner_school_id: entry.school_id,
                });
            }
        }

        match self.matcher.find(&record, state.roster) {
            MatchOutcome::Ambiguous {
                entry, agreements, ..
            } => reject(RecordError::IdentityAmbiguity {
                student_code: record.student_code.clone(),
                roster_id: entry.roster_id,
                agreements,
                existing: IdentitySummary::of_entry(entry),
                incoming: IdentitySummary::of_record(&record),
            }),
            MatchOutcome::Match { entry, strategy } => {
                match strategy {
                    MatchStrategy::StudentCode => {
                        debug!(roster_id = entry.roster_id, "matched on student code")
                    }
                    MatchStrategy::Corroborated { agreements } => {
                        debug!(roster_id = entry.roster_id, agreements, "matched and corroborated")
                    }
                }
                self.apply_update(store, entry, &record, year_level_id)
                    .unwrap_or_else(reject)
            }
            MatchOutcome::NoMatch => self
                .apply_insert(store, state, &record, year_level_id)
                .unwrap_or_else(reject),
        }
    }

    fn apply_update<S: RosterStore + ?Sized>(
        &self,
        store: &S,
        entry: &RosterEntry,
        record: &StudentRecord,
        year_level_id: i64,
    ) -> Result<RecordOutcome, RecordError> {
        let changes = self.diff.diff(entry, record);
        if changes.is_empty() {
            debug!(roster_id = entry.roster_id, code = %record.student_code, "unchanged");
            return Ok(RecordOutcome::Unchanged {
                roster_id: entry.roster_id,
            });
        }

        let update = StudentUpdate {
            roster_id: entry.roster_id,
            year_level_id,
            first_name: record.first_name.clone(),
            middle_name: record.middle_name.clone(),
            surname: record.surname.clone(),
            gender: record.gender,
            birth_date: record.birth_date,
            flags: record.flags,
            home_group: record.home_group.clone(),
            update_sequence: entry.update_sequence + 1,
            updated_at: Utc::now(),
            actor: self.config.actor.clone(),
        };

        if !self.config.dry_run {
            store
                .update_student(&update)
                .map_err(|e| RecordError::store(StoreOperation::Update, &e))?;
        }

        info!(
            roster_id = entry.roster_id,
            code = %record.student_code,
            restored = entry.deleted,
            "updated"
        );
        for line in changes.change_log() {
            info!(roster_id = entry.roster_id, "  {}", line);
        }

        Ok(RecordOutcome::Updated {
            roster_id: entry.roster_id,
            changes: changes.into_changes(),
        })
    }

    fn apply_insert<S: RosterStore + ?Sized>(
        &self,
        store: &S,
        state: &mut BatchState<'_>,
        record: &StudentRecord,
        year_level_id: i64,
    ) -> Result<RecordOutcome, RecordError> {
        let school_id = state.school_id;
        let (roster_id, _) = state
            .allocator
            .allocate_with(|roster_id| {
                let now = Utc::now();
                let student = NewStudent {
                    roster_id,
                    year_level_id,
                    school_id,
                    student_code: record.student_code.clone(),
                    external_code: record.student_code.clone(),
                    first_name: record.first_name.clone(),
                    middle_name: record.middle_name.clone(),
                    surname: record.surname.clone(),
                    gender: record.gender,
                    birth_date: record.birth_date,
                    flags: record.flags,
                    home_group: record.home_group.clone(),
                    created_at: now,
                    updated_at: now,
                    actor: self.config.actor.clone(),
                };

                if self.config.dry_run {
                    Ok(())
                } else {
                    store.insert_student(&student)
                }
            })
            .map_err(|e| RecordError::store(StoreOperation::Insert, &e))?;

        info!(roster_id, code = %record.student_code, "inserted");

        Ok(RecordOutcome::Inserted { roster_id })
    }

    /// Mark live entries of the school whose code never appeared in the batch
    fn sweep<S: RosterStore + ?Sized>(
        &self,
        store: &S,
        state: &BatchState<'_>,
        report: &mut ReconciliationReport,
    ) {
        let missing = state.roster.entries().iter().filter(|entry| {
            entry.school_id == state.school_id
                && !entry.deleted
                && !state.seen.contains_key(&entry.student_code)
        });

        for entry in missing {
            let outcome = if self.config.dry_run {
                RecordOutcome::Deleted {
                    roster_id: entry.roster_id,
                }
            } else {
                match store.mark_deleted(entry.roster_id) {
                    Ok(()) => RecordOutcome::Deleted {
                        roster_id: entry.roster_id,
                    },
                    Err(e) => RecordOutcome::Rejected {
                        error: RecordError::store(StoreOperation::MarkDeleted, &e),
                        content: IdentitySummary::of_entry(entry).to_string(),
                    },
                }
            };

            match &outcome {
                RecordOutcome::Rejected { error, .. } => {
                    warn!(roster_id = entry.roster_id, "sweep failed: {}", error)
                }
                _ => info!(roster_id = entry.roster_id, code = %entry.student_code, "deleted"),
            }

            report.record(0, &entry.student_code, outcome);
        }
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
