// End-to-end: CSV file on disk → SQLite roster on disk, across several runs

use roster_sync::{
    get_events_for_entity, BootstrapError, CsvRecordSource, Reconciler, RecordError,
    RecordOutcome, RosterStore, SqliteRosterStore, SyncConfig,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const HEADER: &str = "student_code,first_name,middle_name,surname,gender,date_of_birth,LBOTE,ATSI,disability_status,EMA,ESL,home_group,year_level";

fn write_csv(dir: &Path, name: &str, rows: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let mut content = String::from(HEADER);
    for row in rows {
        content.push('\n');
        content.push_str(row);
    }
    content.push('\n');
    fs::write(&path, content).unwrap();
    path
}

fn create_test_roster(dir: &Path) -> PathBuf {
    let db = dir.join("roster.db");
    let store = SqliteRosterStore::open(&db, "setup").unwrap();
    store.seed_year_levels().unwrap();
    store.add_school("Test Primary", "Hobart").unwrap();
    db
}

fn sync(db: &Path, csv: &Path, config: SyncConfig) -> roster_sync::ReconciliationReport {
    let store = SqliteRosterStore::open(db, &config.actor).unwrap();
    let source = CsvRecordSource::from_path(csv).unwrap();
    let report = Reconciler::new(config).run(&store, &source).unwrap();
    store.record_run(&report).unwrap();
    report
}

#[test]
fn test_full_lifecycle() {
    let dir = TempDir::new().unwrap();
    let db = create_test_roster(dir.path());
    let config = SyncConfig {
        soft_delete: true,
        ..SyncConfig::default()
    };

    // Day 1: three students, one with a broken gender
    let day1 = write_csv(
        dir.path(),
        "day1.csv",
        &[
            "S001,Ada,,Lovelace,F,10/12/2015,N,N,N,Y,N,3A,3",
            "S002,Grace,Brewster,Hopper,FEMALE,Dec  9 2014,0,1,0,0,0,4B,4",
            "S003,Alan,,Turing,X,23/06/2013,N,N,N,N,N,,5",
        ],
    );
    let report = sync(&db, &day1, config.clone());
    assert_eq!(report.inserted, 2);
    assert_eq!(report.errored, 1);
    assert_eq!(report.rejections().next().unwrap().line_number, 4);

    // Same file again: nothing to do
    let report = sync(&db, &day1, config.clone());
    assert_eq!((report.inserted, report.updated, report.deleted), (0, 0, 0));
    assert_eq!(report.unchanged, 2);

    // Day 2: Ada moves up a year, Grace leaves, Alan is fixed
    let day2 = write_csv(
        dir.path(),
        "day2.csv",
        &[
            "S001,Ada,,Lovelace,F,10/12/2015,N,N,N,Y,N,4A,4",
            "S003,Alan,,Turing,M,23/06/2013,N,N,N,N,N,,5",
        ],
    );
    let report = sync(&db, &day2, config.clone());
    assert_eq!(report.updated, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(report.deleted, 1);

    let store = SqliteRosterStore::open(&db, "check").unwrap();
    let students = store.list_students().unwrap();
    let codes: Vec<(&str, i64, bool)> = students
        .iter()
        .map(|s| (s.student_code.as_str(), s.roster_id, s.deleted))
        .collect();
    assert_eq!(
        codes,
        vec![("S001", 100_001, false), ("S002", 100_002, true), ("S003", 100_003, false)]
    );
    assert_eq!(students[0].year_level, "04");
    assert_eq!(students[0].home_group, "4A");
    assert_eq!(students[2].updated_by, "roster-sync");

    let events = get_events_for_entity(store.connection(), "student", "100002").unwrap();
    assert_eq!(events[0].event_type, "student_deleted");

    let runs: i64 = store
        .connection()
        .query_row("SELECT COUNT(*) FROM sync_runs", [], |row| row.get(0))
        .unwrap();
    assert_eq!(runs, 3);
    assert!(store.last_run_digest(1).unwrap().is_some());
}

#[test]
fn test_identity_conflict_is_reported_not_merged() {
    let dir = TempDir::new().unwrap();
    let db = create_test_roster(dir.path());

    let first = write_csv(
        dir.path(),
        "first.csv",
        &["S001,Ada,,Lovelace,F,10/12/2015,N,N,N,Y,N,3A,3"],
    );
    sync(&db, &first, SyncConfig::default());

    let reused = write_csv(
        dir.path(),
        "reused.csv",
        &["S001,Charles,,Babbage,M,26/12/2012,N,N,N,N,N,6C,6"],
    );
    let report = sync(&db, &reused, SyncConfig::default());

    assert_eq!(report.errored, 1);
    match &report.outcomes[0].outcome {
        RecordOutcome::Rejected {
            error: RecordError::IdentityAmbiguity { existing, incoming, .. },
            ..
        } => {
            assert_eq!(existing.surname, "Lovelace");
            assert_eq!(incoming.surname, "Babbage");
        }
        other => panic!("expected identity conflict, got {:?}", other),
    }

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcomes"][0]["outcome"]["status"], "rejected");
    assert_eq!(json["outcomes"][0]["outcome"]["error"]["kind"], "identity_ambiguity");
}

#[test]
fn test_missing_column_aborts_before_any_record() {
    let dir = TempDir::new().unwrap();
    let db = create_test_roster(dir.path());
    let path = dir.path().join("broken.csv");
    fs::write(&path, "student_code,first_name\nS001,Ada\n").unwrap();

    let store = SqliteRosterStore::open(&db, "test").unwrap();
    let source = CsvRecordSource::from_path(&path).unwrap();
    let err = Reconciler::default().run(&store, &source).unwrap_err();

    assert!(matches!(err, BootstrapError::SourceUnreadable(_)));
    assert!(store.list_students().unwrap().is_empty());
}
