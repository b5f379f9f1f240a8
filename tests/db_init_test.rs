use memsift::db;
use memsift::db::migrations::{get_schema_version, CURRENT_SCHEMA_VERSION};
use tempfile::TempDir;

#[test]
fn open_creates_new_db_at_nonexistent_path() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("subdir").join("new.db");
    assert!(!db_path.exists());

    let conn = db::open_database(&db_path, 8).unwrap();

    assert!(db_path.exists());
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn wal_and_busy_timeout_are_set() {
    let tmp = TempDir::new().unwrap();
    let conn = db::open_database(tmp.path().join("test.db"), 8).unwrap();

    let mode: String = conn
        .pragma_query_value(None, "journal_mode", |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
    let timeout: i64 = conn
        .pragma_query_value(None, "busy_timeout", |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 5000);
}

#[test]
fn reopen_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("test.db");
    drop(db::open_database(&path, 8).unwrap());
    let conn = db::open_database(&path, 8).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn reopen_with_other_width_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("test.db");
    drop(db::open_database(&path, 8).unwrap());

    let err = db::open_database(&path, 16).unwrap_err();
    assert!(err.to_string().contains("8-dimensional"));
}

#[test]
fn v1_database_is_migrated_on_open() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("old.db");
    {
        let conn = db::open_database(&path, 8).unwrap();
        conn.execute_batch(
            "DROP INDEX idx_memories_owner_model;
             UPDATE schema_meta SET value = '1' WHERE key = 'schema_version';",
        )
        .unwrap();
    }

    let conn = db::open_database(&path, 8).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), 2);
    let has_index: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE name = 'idx_memories_owner_model'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!(has_index);
}

#[test]
fn health_check_reports_counts() {
    let mut conn = db::open_in_memory(4).unwrap();
    for (owner, model) in [("u1", "a"), ("u1", "b"), ("u2", "a")] {
        memsift::memory::store::add_memory(
            &mut conn,
            owner,
            "some text",
            &Default::default(),
            &[1.0, 0.0, 0.0, 0.0],
            model,
            chrono::Utc::now(),
        )
        .unwrap();
    }

    let report = db::check_database_health(&conn).unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.schema_version, CURRENT_SCHEMA_VERSION);
    assert!(!report.sqlite_vec_version.is_empty());
    assert_eq!(report.embedding_dimensions, Some(4));
    assert_eq!(report.memory_count, 3);
    assert_eq!(report.owner_count, 2);
    assert_eq!(
        report.model_counts,
        vec![("a".to_string(), 2), ("b".to_string(), 1)]
    );
}
