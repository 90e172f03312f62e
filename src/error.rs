// ⚠️ Error Taxonomy
// Record-level errors are local to one row; bootstrap errors end the run

use crate::matcher::IdentitySummary;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// FIELD VIOLATION
// ============================================================================

/// One violated field rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), Vec<ValidationError>>;

fn join_violations(violations: &[ValidationError]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn rejected_note(first_rejected: &bool) -> &'static str {
    if *first_rejected {
        " (that occurrence was itself rejected)"
    } else {
        ""
    }
}

// ============================================================================
// RECORD ERRORS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StoreOperation {
    Insert,
    Update,
    MarkDeleted,
}

impl std::fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StoreOperation::Insert => "insert_student",
            StoreOperation::Update => "update_student",
            StoreOperation::MarkDeleted => "mark_deleted",
        })
    }
}

/// Why a single record was not applied
///
/// None of these stop the batch: the record is skipped, counted as an
/// error, and processing moves to the next row.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordError {
    #[error("validation failed: {}", join_violations(.violations))]
    Validation { violations: Vec<ValidationError> },

    #[error(
        "student code {student_code} matches roster entry {roster_id} but only \
         {agreements} of 3 identity fields agree (existing: {existing}; incoming: {incoming})"
    )]
    IdentityAmbiguity {
        student_code: String,
        roster_id: i64,
        agreements: u8,
        existing: IdentitySummary,
        incoming: IdentitySummary,
    },

    #[error("'{label}' is not a valid year level")]
    YearLevelResolution { label: String },

    #[error(
        "student code {student_code} already appeared on line {first_line} of this batch{}",
        rejected_note(.first_rejected)
    )]
    DuplicateInBatch {
        student_code: String,
        first_line: u64,
        first_rejected: bool,
    },

    #[error(
        "student code {student_code} belongs to roster entry {roster_id} of school {owner_school_id}"
    )]
    SchoolConflict {
        student_code: String,
        roster_id: i64,
        owner_school_id: i64,
    },

    #[error("{operation} failed: {message}")]
    Store {
        operation: StoreOperation,
        message: String,
    },
}

impl RecordError {
    /// Short stable tag for logs and summaries
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::Validation { .. } => "validation",
            RecordError::IdentityAmbiguity { .. } => "identity_ambiguity",
            RecordError::YearLevelResolution { .. } => "year_level_resolution",
            RecordError::DuplicateInBatch { .. } => "duplicate_in_batch",
            RecordError::SchoolConflict { .. } => "school_conflict",
            RecordError::Store { .. } => "store",
        }
    }

    pub fn store(operation: StoreOperation, err: &anyhow::Error) -> Self {
        RecordError::Store {
            operation,
            message: format!("{:#}", err),
        }
    }
}

// ============================================================================
// BOOTSTRAP ERRORS
// ============================================================================

/// Failures that abort the run before any record is processed
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("roster store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("record source unreadable: {0}")]
    SourceUnreadable(String),

    #[error("no schools exist in the roster store")]
    NoSchools,

    #[error("{count} schools exist ({choices}); pass --school to choose one")]
    AmbiguousSchool { count: usize, choices: String },

    #[error("school {0} does not exist in the roster store")]
    UnknownSchool(i64),

    #[error("the roster store has no year levels")]
    NoYearLevels,
}

impl BootstrapError {
    pub fn store(err: anyhow::Error) -> Self {
        BootstrapError::StoreUnavailable(format!("{:#}", err))
    }

    pub fn source(err: anyhow::Error) -> Self {
        BootstrapError::SourceUnreadable(format!("{:#}", err))
    }
}
