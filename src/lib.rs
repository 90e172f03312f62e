// Roster Sync - Core Library
// Reconciles an upstream student extract against a school's roster store

pub mod allocator; // Sequential roster ids
pub mod config;
pub mod db; // Roster store trait + SQLite implementation
pub mod diff; // Field-level change detection
pub mod error;
pub mod fields; // Field registry (rules as data)
pub mod logging;
pub mod matcher; // Identity matching
pub mod normalize;
pub mod reconciliation; // The per-record pipeline and sweep
pub mod schema; // Field validation
pub mod source; // Record sources (CSV)
pub mod student;

// Re-export commonly used types
pub use allocator::IdAllocator;
pub use config::SyncConfig;
pub use db::{
    get_events_for_entity, insert_event, setup_database, Event, NewStudent, RosterStore,
    SqliteRosterStore, StudentUpdate, STANDARD_YEAR_LEVELS,
};
pub use diff::{ChangeSet, DiffEngine, FieldChange};
pub use error::{BootstrapError, RecordError, StoreOperation, ValidationError, ValidationResult};
pub use fields::{Field, FieldDefinition, FieldRegistry, FieldRule, TokenSet};
pub use matcher::{IdentityMatcher, IdentitySummary, MatchOutcome, MatchStrategy, RosterIndex};
pub use normalize::{
    normalize_flag, normalize_gender, normalize_record, normalize_year_level, parse_date,
};
pub use reconciliation::{
    select_school, OutcomeEntry, ReconciliationReport, Reconciler, RecordOutcome,
};
pub use schema::FieldValidator;
pub use source::{CsvRecordSource, RecordSource};
pub use student::{
    Gender, RawStudentRecord, RosterEntry, School, StudentFlags, StudentRecord, YearLevel,
    YearLevelReference,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
