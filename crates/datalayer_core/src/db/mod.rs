//! SQLite storage bootstrap, schema migrations and row decoding.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the data-access layer.
//! - Apply schema migrations in deterministic order.
//! - Decode result rows into entities through [`RowReader`].
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Repositories must not read/write application data before migrations succeed.

pub mod migrations;
mod open;
mod row;

pub use open::{open_db, open_db_in_memory, open_store};
pub use row::RowReader;

pub type DbResult<T> = Result<T, DbError>;

/// Storage-level failure: the backing store rejected or could not run a statement.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}
