//! Typed data-access layer for the Member/Team domain on SQLite.
//!
//! Entities are read and written through repositories borrowed from a
//! [`UnitOfWork`], which owns the transaction and the identity map.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;

pub use config::StoreConfig;
pub use db::{open_db, open_db_in_memory, open_store, DbError};
pub use error::{RepoError, RepoResult};
pub use logging::{default_log_level, init_logging, logging_status, LogConfig, LoggingError};
pub use model::audit::Audit;
pub use model::entity::{Entity, EntityId, EntityMeta, ValidationError};
pub use model::item::Item;
pub use model::member::{Member, MemberId};
pub use model::reference::{Ref, SessionHandle};
pub use model::team::{Team, TeamId};
pub use query::example::{Example, ExampleMatcher};
pub use query::page::{Page, PageRequest, Slice};
pub use query::predicate::{CompareOp, Predicate};
pub use query::sort::{Direction, Sort};
pub use query::Query;
pub use repo::bulk::{BulkOptions, Update};
pub use repo::executor::{QueryExecutor, QueryStats, StatementCounts};
pub use repo::member_repo::MemberRepository;
pub use repo::member_spec::MemberSpec;
pub use repo::projection::{
    MemberDto, MemberProjection, NestedClosedProjection, Projection, TeamNameOnly, UsernameOnly,
};
pub use repo::repository::Repository;
pub use repo::session::UnitOfWork;

/// Returns the crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
