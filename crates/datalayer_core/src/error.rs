//! Error taxonomy shared by predicates, executor and repositories.
//!
//! # Invariants
//! - Storage failures are wrapped, never swallowed or retried.
//! - A missed identifier lookup is `Ok(None)`; `NotFound` is reserved for
//!   strict lookups that promise a row.

use crate::db::DbError;
use crate::model::entity::ValidationError;

pub type RepoResult<T> = Result<T, RepoError>;

/// Data-access error returned by every repository and executor operation.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// The backing store rejected or could not run a statement.
    #[error(transparent)]
    Db(#[from] DbError),
    /// A predicate, sort, fetch or projection path does not exist.
    #[error("invalid path `{path}` on {entity}: {reason}")]
    InvalidPredicate {
        entity: &'static str,
        path: String,
        reason: String,
    },
    #[error("invalid pagination: {0}")]
    InvalidPagination(String),
    #[error("invalid bulk update on {entity}: {reason}")]
    InvalidUpdate { entity: &'static str, reason: String },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    /// A lazy relation was resolved outside the unit of work that loaded it.
    #[error("{entity} {id} belongs to a unit of work that has ended")]
    StaleAccess { entity: &'static str, id: String },
    #[error("{entity}.{relation} references an entity that was never saved")]
    TransientReference {
        entity: &'static str,
        relation: &'static str,
    },
    #[error("query on {entity} returned {count} rows, expected at most one")]
    NonUniqueResult { entity: &'static str, count: usize },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl RepoError {
    /// Whether this error came from the backing store.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Db(_))
    }
}
