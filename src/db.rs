// 🗄️ Roster Store - SQLite persistence for schools, year levels and students
// Every write is parameterized; every mutation leaves an audit event

use crate::reconciliation::ReconciliationReport;
use crate::student::{Gender, RosterEntry, School, StudentFlags, YearLevel};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Canonical labels seeded into a fresh database
pub const STANDARD_YEAR_LEVELS: [&str; 14] = [
    "F", "01", "02", "03", "04", "05", "06", "07", "08", "09", "10", "11", "12", "UG",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// WRITE PAYLOADS
// ============================================================================

/// Everything `insert_student` persists for a brand-new roster entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewStudent {
    pub roster_id: i64,
    pub year_level_id: i64,
    pub school_id: i64,
    pub student_code: String,
    pub external_code: String,
    pub first_name: String,
    pub middle_name: String,
    pub surname: String,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    pub flags: StudentFlags,
    pub home_group: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub actor: String,
}

/// Full rewrite of a matched entry's mutable fields (also clears `deleted`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentUpdate {
    pub roster_id: i64,
    pub year_level_id: i64,
    pub first_name: String,
    pub middle_name: String,
    pub surname: String,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    pub flags: StudentFlags,
    pub home_group: String,
    pub update_sequence: i64,
    pub updated_at: DateTime<Utc>,
    pub actor: String,
}

// ============================================================================
// ROSTER STORE
// ============================================================================

/// The persistence boundary the reconciler talks to
pub trait RosterStore {
    fn list_schools(&self) -> Result<Vec<School>>;

    fn list_year_levels(&self) -> Result<Vec<YearLevel>>;

    fn list_students(&self) -> Result<Vec<RosterEntry>>;

    fn insert_student(&self, student: &NewStudent) -> Result<()>;

    fn update_student(&self, update: &StudentUpdate) -> Result<()>;

    fn mark_deleted(&self, roster_id: i64) -> Result<()>;
}

/// Empty optional text is stored as NULL
fn null_if_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// Audit trail entry, one per roster mutation
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery between hourly runs
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schools (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            location TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS year_levels (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT UNIQUE NOT NULL
        )",
        [],
    )?;

    // roster_id is assigned by the allocator, never by SQLite
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students (
            roster_id INTEGER PRIMARY KEY,
            year_level_id INTEGER NOT NULL,
            school_id INTEGER NOT NULL REFERENCES schools(id),
            student_code TEXT UNIQUE NOT NULL,
            external_code TEXT NOT NULL,
            first_name TEXT NOT NULL,
            middle_name TEXT,
            surname TEXT NOT NULL,
            gender TEXT NOT NULL,
            birth_date TEXT,
            lbote INTEGER NOT NULL DEFAULT 0,
            atsi INTEGER NOT NULL DEFAULT 0,
            disability INTEGER NOT NULL DEFAULT 0,
            ema INTEGER NOT NULL DEFAULT 0,
            esl INTEGER NOT NULL DEFAULT 0,
            home_group TEXT,
            deleted INTEGER NOT NULL DEFAULT 0,
            update_sequence INTEGER NOT NULL DEFAULT 1,
            created_at TEXT,
            updated_at TEXT,
            created_by TEXT NOT NULL DEFAULT '',
            updated_by TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sync_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sync_runs (
            run_id TEXT PRIMARY KEY,
            school_id INTEGER NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            source_digest TEXT,
            dry_run INTEGER NOT NULL,
            inserted INTEGER NOT NULL,
            updated INTEGER NOT NULL,
            unchanged INTEGER NOT NULL,
            deleted INTEGER NOT NULL,
            errored INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_school ON students(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON sync_events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO sync_events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM sync_events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC",
    )?;

    let rows = stmt
        .query_map(params![entity_type, entity_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(event_id, timestamp, event_type, entity_type, entity_id, data, actor)| {
                Ok(Event {
                    event_id,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp)
                        .with_context(|| format!("Bad event timestamp: {}", timestamp))?
                        .with_timezone(&Utc),
                    event_type,
                    entity_type,
                    entity_id,
                    data: serde_json::from_str(&data).context("Bad event payload")?,
                    actor,
                })
            },
        )
        .collect()
}

// ============================================================================
// SQLITE ROSTER STORE
// ============================================================================

pub struct SqliteRosterStore {
    conn: Connection,
    actor: String,
}

impl SqliteRosterStore {
    /// Open (and migrate) the roster database at `path`
    pub fn open(path: &Path, actor: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open roster database {:?}", path))?;
        Self::from_connection(conn, actor)
    }

    pub fn open_in_memory(actor: &str) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, actor)
    }

    pub fn from_connection(conn: Connection, actor: &str) -> Result<Self> {
        setup_database(&conn).context("Failed to set up roster schema")?;
        Ok(SqliteRosterStore {
            conn,
            actor: actor.to_string(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn add_school(&self, name: &str, location: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO schools (name, location) VALUES (?1, ?2)",
            params![name, location],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert any standard year labels that are missing; returns how many were added
    pub fn seed_year_levels(&self) -> Result<usize> {
        let mut added = 0;
        for label in STANDARD_YEAR_LEVELS {
            added += self.conn.execute(
                "INSERT OR IGNORE INTO year_levels (label) VALUES (?1)",
                params![label],
            )?;
        }
        Ok(added)
    }

    pub fn count_students(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM students", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn get_student(&self, roster_id: i64) -> Result<Option<RosterEntry>> {
        self.query_students("WHERE s.roster_id = ?1", params![roster_id])
            .map(|mut rows| rows.pop())
    }

    /// Persist the summary row for a completed run
    pub fn record_run(&self, report: &ReconciliationReport) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_runs (
                run_id, school_id, started_at, finished_at, source_digest, dry_run,
                inserted, updated, unchanged, deleted, errored
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                report.run_id,
                report.school_id,
                report.started_at.to_rfc3339(),
                report.finished_at.to_rfc3339(),
                report.source_digest,
                report.dry_run,
                report.inserted as i64,
                report.updated as i64,
                report.unchanged as i64,
                report.deleted as i64,
                report.errored as i64,
            ],
        )?;
        Ok(())
    }

    /// Digest of the most recent recorded run for a school
    pub fn last_run_digest(&self, school_id: i64) -> Result<Option<String>> {
        let digest = self
            .conn
            .query_row(
                "SELECT source_digest FROM sync_runs
                 WHERE school_id = ?1
                 ORDER BY finished_at DESC
                 LIMIT 1",
                params![school_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(digest.flatten())
    }

    fn log_event(&self, event_type: &str, roster_id: i64, data: serde_json::Value) {
        let event = Event::new(event_type, "student", &roster_id.to_string(), data, &self.actor);
        if let Err(e) = insert_event(&self.conn, &event) {
            tracing::warn!(roster_id, event_type, error = %e, "failed to write audit event");
        }
    }

    fn query_students(&self, filter: &str, args: impl rusqlite::Params) -> Result<Vec<RosterEntry>> {
        let sql = format!(
            "SELECT s.roster_id, s.school_id, s.year_level_id, COALESCE(y.label, ''),
                    s.student_code, s.external_code, s.first_name, s.middle_name,
                    s.surname, s.gender, s.birth_date,
                    s.lbote, s.atsi, s.disability, s.ema, s.esl,
                    s.home_group, s.deleted, s.update_sequence,
                    s.created_at, s.updated_at, s.created_by, s.updated_by
             FROM students s
             LEFT JOIN year_levels y ON y.id = s.year_level_id
             {}
             ORDER BY s.roster_id",
            filter
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let students = stmt
            .query_map(args, |row| {
                let gender: String = row.get(9)?;
                let birth_date: Option<String> = row.get(10)?;

                Ok(RosterEntry {
                    roster_id: row.get(0)?,
                    school_id: row.get(1)?,
                    year_level_id: row.get(2)?,
                    year_level: row.get(3)?,
                    student_code: row.get(4)?,
                    external_code: row.get(5)?,
                    first_name: row.get(6)?,
                    middle_name: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                    surname: row.get(8)?,
                    gender: Gender::from_canonical(&gender),
                    birth_date: birth_date
                        .and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()),
                    flags: StudentFlags {
                        lbote: row.get(11)?,
                        atsi: row.get(12)?,
                        disability: row.get(13)?,
                        ema: row.get(14)?,
                        esl: row.get(15)?,
                    },
                    home_group: row.get::<_, Option<String>>(16)?.unwrap_or_default(),
                    deleted: row.get(17)?,
                    update_sequence: row.get(18)?,
                    created_at: parse_timestamp(row.get(19)?),
                    updated_at: parse_timestamp(row.get(20)?),
                    created_by: row.get(21)?,
                    updated_by: row.get(22)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(students)
    }
}

impl RosterStore for SqliteRosterStore {
    fn list_schools(&self) -> Result<Vec<School>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, location FROM schools ORDER BY id")?;

        let schools = stmt
            .query_map([], |row| {
                Ok(School {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    location: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(schools)
    }

    fn list_year_levels(&self) -> Result<Vec<YearLevel>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, label FROM year_levels ORDER BY id")?;

        let levels = stmt
            .query_map([], |row| {
                Ok(YearLevel {
                    id: row.get(0)?,
                    label: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(levels)
    }

    fn list_students(&self) -> Result<Vec<RosterEntry>> {
        self.query_students("", [])
    }

    fn insert_student(&self, student: &NewStudent) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO students (
                    roster_id, year_level_id, school_id, student_code, external_code,
                    first_name, middle_name, surname, gender, birth_date,
                    lbote, atsi, disability, ema, esl, home_group,
                    deleted, update_sequence, created_at, updated_at, created_by, updated_by
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                          0, 1, ?17, ?18, ?19, ?19)",
                params![
                    student.roster_id,
                    student.year_level_id,
                    student.school_id,
                    student.student_code,
                    student.external_code,
                    student.first_name,
                    null_if_empty(&student.middle_name),
                    student.surname,
                    student.gender.as_str(),
                    student.birth_date.format(DATE_FORMAT).to_string(),
                    student.flags.lbote,
                    student.flags.atsi,
                    student.flags.disability,
                    student.flags.ema,
                    student.flags.esl,
                    null_if_empty(&student.home_group),
                    student.created_at.to_rfc3339(),
                    student.updated_at.to_rfc3339(),
                    student.actor,
                ],
            )
            .with_context(|| format!("Failed to insert student {}", student.student_code))?;

        self.log_event(
            "student_inserted",
            student.roster_id,
            serde_json::json!({
                "student_code": student.student_code,
                "school_id": student.school_id,
            }),
        );

        Ok(())
    }

    fn update_student(&self, update: &StudentUpdate) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE students
                 SET year_level_id = ?2, first_name = ?3, middle_name = ?4, surname = ?5,
                     gender = ?6, birth_date = ?7,
                     lbote = ?8, atsi = ?9, disability = ?10, ema = ?11, esl = ?12,
                     home_group = ?13, update_sequence = ?14, deleted = 0,
                     updated_at = ?15, updated_by = ?16
                 WHERE roster_id = ?1",
                params![
                    update.roster_id,
                    update.year_level_id,
                    update.first_name,
                    null_if_empty(&update.middle_name),
                    update.surname,
                    update.gender.as_str(),
                    update.birth_date.format(DATE_FORMAT).to_string(),
                    update.flags.lbote,
                    update.flags.atsi,
                    update.flags.disability,
                    update.flags.ema,
                    update.flags.esl,
                    null_if_empty(&update.home_group),
                    update.update_sequence,
                    update.updated_at.to_rfc3339(),
                    update.actor,
                ],
            )
            .with_context(|| format!("Failed to update student {}", update.roster_id))?;

        if changed == 0 {
            bail!("No student with roster_id {}", update.roster_id);
        }

        self.log_event(
            "student_updated",
            update.roster_id,
            serde_json::json!({ "update_sequence": update.update_sequence }),
        );

        Ok(())
    }

    fn mark_deleted(&self, roster_id: i64) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE students
                 SET deleted = 1, update_sequence = update_sequence + 1,
                     updated_at = ?2, updated_by = ?3
                 WHERE roster_id = ?1",
                params![roster_id, Utc::now().to_rfc3339(), self.actor],
            )
            .with_context(|| format!("Failed to mark student {} deleted", roster_id))?;

        if changed == 0 {
            bail!("No student with roster_id {}", roster_id);
        }

        self.log_event("student_deleted", roster_id, serde_json::json!({}));

        Ok(())
    }
}
