//! Statement execution against one SQLite connection.
//!
//! # Responsibility
//! - Run compiled selects, counts and writes with bound parameters.
//! - Decode rows into entities and projections.
//! - Count executed statements per kind.
//!
//! # Invariants
//! - Every statement is parameterized; no value is spliced into SQL.
//! - Each statement is logged once at `debug` with its duration.

use crate::db::RowReader;
use crate::error::{RepoError, RepoResult};
use crate::logging::single_line;
use crate::model::entity::{Entity, EntityId};
use crate::model::reference::SessionHandle;
use crate::query::page::Window;
use crate::query::predicate::Predicate;
use crate::query::sort::Sort;
use crate::query::sql::{
    compile_count, compile_count_with, compile_projection, compile_select, CompiledSql,
};
use crate::query::Query;
use crate::repo::projection::Projection;
use log::{debug, error};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use std::cell::Cell;
use std::time::Instant;

const MAX_LOGGED_SQL_CHARS: usize = 240;

/// Per-kind statement counters.
#[derive(Debug, Default)]
pub struct QueryStats {
    selects: Cell<u64>,
    counts: Cell<u64>,
    writes: Cell<u64>,
}

/// Snapshot of [`QueryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatementCounts {
    pub selects: u64,
    pub counts: u64,
    pub writes: u64,
}

impl QueryStats {
    pub fn snapshot(&self) -> StatementCounts {
        StatementCounts {
            selects: self.selects.get(),
            counts: self.counts.get(),
            writes: self.writes.get(),
        }
    }

    fn bump(counter: &Cell<u64>) {
        counter.set(counter.get() + 1);
    }
}

#[derive(Debug, Clone, Copy)]
enum StatementKind {
    Select,
    Count,
    Write,
}

impl StatementKind {
    fn label(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Count => "count",
            Self::Write => "write",
        }
    }
}

/// Runs statements for one connection.
///
/// Lazy references decoded by this executor are bound to its session
/// handle; a detached executor yields references that never resolve.
pub struct QueryExecutor<'a> {
    conn: &'a Connection,
    stats: &'a QueryStats,
    session: SessionHandle,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(conn: &'a Connection, stats: &'a QueryStats) -> Self {
        Self::bound(conn, stats, SessionHandle::detached())
    }

    pub(crate) fn bound(conn: &'a Connection, stats: &'a QueryStats, session: SessionHandle) -> Self {
        Self {
            conn,
            stats,
            session,
        }
    }

    /// Entities matching `query`, ordered, optionally windowed.
    pub fn find<E: Entity>(&self, query: &Query<E>, window: Option<Window>) -> RepoResult<Vec<E>> {
        let compiled = compile_select(query, window)?;
        self.select_rows(E::meta().name, &compiled, E::from_row)
    }

    /// The entity with identifier `id`, if any.
    pub fn find_one<E: Entity>(&self, id: &E::Id) -> RepoResult<Option<E>> {
        let query = Query::<E>::filter(Predicate::by_field("id", id.to_value())?);
        let mut rows = self.find(&query, None)?;
        Ok(rows.pop())
    }

    pub fn count<E: Entity>(&self, predicate: &Predicate<E>) -> RepoResult<u64> {
        self.count_sql(E::meta().name, &compile_count(predicate))
    }

    /// Number of rows [`Self::project`] returns for `predicate` with no window.
    pub fn count_projection<E: Entity, P: Projection<E>>(
        &self,
        predicate: &Predicate<E>,
    ) -> RepoResult<u64> {
        let compiled = compile_count_with(predicate, P::required_relations())?;
        self.count_sql(E::meta().name, &compiled)
    }

    /// Rows matching `predicate` decoded into projection `P`.
    pub fn project<E: Entity, P: Projection<E>>(
        &self,
        predicate: &Predicate<E>,
        sort: &Sort,
        window: Option<Window>,
    ) -> RepoResult<Vec<P>> {
        let compiled = compile_projection(
            predicate,
            sort,
            P::columns(),
            P::required_relations(),
            window,
        )?;
        self.select_rows(E::meta().name, &compiled, P::from_row)
    }

    /// Caller-written SQL decoded as entities. Root columns must carry
    /// their column names.
    pub fn native<E: Entity>(&self, sql: &str, binds: &[Value]) -> RepoResult<Vec<E>> {
        let compiled = CompiledSql {
            sql: sql.to_string(),
            binds: binds.to_vec(),
        };
        self.select_rows(E::meta().name, &compiled, E::from_row)
    }

    /// Caller-written SQL decoded as projection `P`. Columns must be
    /// aliased by projection path (`"team.name"`).
    pub fn native_project<E: Entity, P: Projection<E>>(
        &self,
        sql: &str,
        binds: &[Value],
    ) -> RepoResult<Vec<P>> {
        let compiled = CompiledSql {
            sql: sql.to_string(),
            binds: binds.to_vec(),
        };
        self.select_rows(E::meta().name, &compiled, P::from_row)
    }

    /// Caller-written `COUNT` statement returning one integer.
    pub fn native_count(&self, entity: &'static str, sql: &str, binds: &[Value]) -> RepoResult<u64> {
        let compiled = CompiledSql {
            sql: sql.to_string(),
            binds: binds.to_vec(),
        };
        self.count_sql(entity, &compiled)
    }

    /// Inserts one row and returns its identifier.
    ///
    /// An entity that already carries an identifier is inserted with it;
    /// otherwise the store generates one.
    pub(crate) fn insert<E: Entity>(&self, entity: &E) -> RepoResult<E::Id> {
        let meta = E::meta();
        let mut columns = Vec::new();
        let mut values = Vec::new();
        if let Some(id) = entity.id() {
            columns.push(meta.id_column);
            values.push(id.to_value());
        }
        columns.extend(meta.write_columns());
        values.extend(entity_values(entity)?);

        let marks = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({marks})",
            meta.table,
            columns.join(", ")
        );
        self.execute(
            meta.name,
            &CompiledSql {
                sql,
                binds: values,
            },
        )?;

        match entity.id() {
            Some(id) => Ok(id),
            None => E::Id::from_generated(self.conn.last_insert_rowid()).ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "{} requires a caller-assigned identifier",
                    meta.name
                ))
            }),
        }
    }

    /// Writes every column of a persisted entity.
    ///
    /// # Errors
    /// - `NotFound` when the row no longer exists.
    pub(crate) fn update<E: Entity>(&self, entity: &E) -> RepoResult<()> {
        let meta = E::meta();
        let id = entity.id().ok_or_else(|| RepoError::NotFound {
            entity: meta.name,
            id: "<unassigned>".to_string(),
        })?;
        let assignments = meta
            .write_columns()
            .iter()
            .map(|column| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut binds = entity_values(entity)?;
        binds.push(id.to_value());

        let changed = self.execute(
            meta.name,
            &CompiledSql {
                sql: format!(
                    "UPDATE {} SET {assignments} WHERE {} = ?",
                    meta.table, meta.id_column
                ),
                binds,
            },
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: meta.name,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn delete<E: Entity>(&self, id: &E::Id) -> RepoResult<usize> {
        let meta = E::meta();
        self.execute(
            meta.name,
            &CompiledSql {
                sql: format!("DELETE FROM {} WHERE {} = ?", meta.table, meta.id_column),
                binds: vec![id.to_value()],
            },
        )
    }

    pub(crate) fn delete_all<E: Entity>(&self) -> RepoResult<usize> {
        let meta = E::meta();
        self.execute(
            meta.name,
            &CompiledSql {
                sql: format!("DELETE FROM {}", meta.table),
                binds: Vec::new(),
            },
        )
    }

    pub(crate) fn execute(&self, entity: &'static str, compiled: &CompiledSql) -> RepoResult<usize> {
        let started_at = Instant::now();
        let result = self
            .conn
            .execute(&compiled.sql, params_from_iter(compiled.binds.iter()));
        let changed = self.finish(StatementKind::Write, entity, compiled, started_at, result)?;
        Ok(changed)
    }

    fn select_rows<T>(
        &self,
        entity: &'static str,
        compiled: &CompiledSql,
        decode: impl Fn(&RowReader<'_, '_>) -> RepoResult<T>,
    ) -> RepoResult<Vec<T>> {
        let started_at = Instant::now();
        let result = self.collect_rows(compiled, decode);
        let rows = match result {
            Ok(rows) => rows,
            Err(err) => {
                self.log_failure(StatementKind::Select, entity, compiled, started_at, &err);
                return Err(err);
            }
        };
        QueryStats::bump(&self.stats.selects);
        self.log_success(StatementKind::Select, entity, compiled, started_at, rows.len());
        Ok(rows)
    }

    fn collect_rows<T>(
        &self,
        compiled: &CompiledSql,
        decode: impl Fn(&RowReader<'_, '_>) -> RepoResult<T>,
    ) -> RepoResult<Vec<T>> {
        let mut stmt = self.conn.prepare(&compiled.sql)?;
        let mut rows = stmt.query(params_from_iter(compiled.binds.iter()))?;
        let mut decoded = Vec::new();
        while let Some(row) = rows.next()? {
            let reader = RowReader::new(row, self.session.clone());
            decoded.push(decode(&reader)?);
        }
        Ok(decoded)
    }

    fn count_sql(&self, entity: &'static str, compiled: &CompiledSql) -> RepoResult<u64> {
        let started_at = Instant::now();
        let result = self.conn.query_row(
            &compiled.sql,
            params_from_iter(compiled.binds.iter()),
            |row| row.get::<_, i64>(0),
        );
        let total = self.finish(StatementKind::Count, entity, compiled, started_at, result)?;
        u64::try_from(total)
            .map_err(|_| RepoError::InvalidData(format!("negative row count {total}")))
    }

    fn finish<T: Copy + TryInto<usize>>(
        &self,
        kind: StatementKind,
        entity: &'static str,
        compiled: &CompiledSql,
        started_at: Instant,
        result: rusqlite::Result<T>,
    ) -> RepoResult<T> {
        match result {
            Ok(value) => {
                match kind {
                    StatementKind::Select => QueryStats::bump(&self.stats.selects),
                    StatementKind::Count => QueryStats::bump(&self.stats.counts),
                    StatementKind::Write => QueryStats::bump(&self.stats.writes),
                }
                let rows = value.try_into().unwrap_or(usize::MAX);
                self.log_success(kind, entity, compiled, started_at, rows);
                Ok(value)
            }
            Err(err) => {
                let err = RepoError::from(err);
                self.log_failure(kind, entity, compiled, started_at, &err);
                Err(err)
            }
        }
    }

    fn log_success(
        &self,
        kind: StatementKind,
        entity: &'static str,
        compiled: &CompiledSql,
        started_at: Instant,
        rows: usize,
    ) {
        debug!(
            "event=sql_exec module=repo status=ok kind={} entity={} rows={} duration_ms={} sql={}",
            kind.label(),
            entity,
            rows,
            started_at.elapsed().as_millis(),
            single_line(&compiled.sql, MAX_LOGGED_SQL_CHARS)
        );
    }

    fn log_failure(
        &self,
        kind: StatementKind,
        entity: &'static str,
        compiled: &CompiledSql,
        started_at: Instant,
        err: &RepoError,
    ) {
        error!(
            "event=sql_exec module=repo status=error kind={} entity={} duration_ms={} sql={} error={}",
            kind.label(),
            entity,
            started_at.elapsed().as_millis(),
            single_line(&compiled.sql, MAX_LOGGED_SQL_CHARS),
            err
        );
    }
}

/// Write values followed by audit columns for audited entities.
fn entity_values<E: Entity>(entity: &E) -> RepoResult<Vec<Value>> {
    let mut values = entity.write_values()?;
    if E::meta().audited {
        let audit = entity.audit().cloned().unwrap_or_default();
        values.extend(audit.values());
    }
    Ok(values)
}
