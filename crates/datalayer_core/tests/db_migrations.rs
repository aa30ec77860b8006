use datalayer_core::db::migrations::latest_version;
use datalayer_core::db::{open_db, open_db_in_memory, open_store, DbError};
use datalayer_core::{Member, StoreConfig, Team, UnitOfWork};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "team");
    assert_table_exists(&conn, "member");
    assert_table_exists(&conn, "item");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("datalayer.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "member");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn open_store_uses_configured_path_and_persists_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::at_path(dir.path().join("store.db"));

    let conn = open_store(&config).unwrap();
    let uow = UnitOfWork::begin_with(&conn, &config).unwrap();
    uow.repository::<Member>().save(Member::new("kept")).unwrap();
    uow.commit().unwrap();
    drop(conn);

    let reopened = open_store(&config).unwrap();
    let uow = UnitOfWork::begin_with(&reopened, &config).unwrap();
    assert_eq!(uow.repository::<Member>().count().unwrap(), 1);
}

#[test]
fn foreign_keys_are_enforced_by_default() {
    let conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&conn).unwrap();
    let phantom = Team {
        id: Some(999),
        name: "phantom".to_string(),
    };

    let err = uow
        .repository::<Member>()
        .save(Member::with_team("orphan", 10, &phantom))
        .unwrap_err();
    assert!(err.is_storage_failure());
}

#[test]
fn foreign_keys_can_be_disabled() {
    let config = StoreConfig {
        foreign_keys: false,
        ..StoreConfig::in_memory()
    };
    let conn = open_store(&config).unwrap();
    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 0);
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
