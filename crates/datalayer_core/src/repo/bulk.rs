//! Set-based updates that bypass the unit-of-work working set.
//!
//! # Responsibility
//! - Build validated column assignments for one entity type.
//! - Apply them to every row a predicate matches in one statement.
//!
//! # Invariants
//! - An update names at least one assignment.
//! - The identifier column is never assigned.
//! - Managed instances are never patched in memory; callers either clear
//!   the working set or accept stale copies.

use crate::error::{RepoError, RepoResult};
use crate::model::entity::Entity;
use crate::query::predicate::Predicate;
use crate::query::sql::{compile_matching_ids, CompiledSql};
use crate::repo::executor::QueryExecutor;
use rusqlite::types::Value;
use std::marker::PhantomData;

#[derive(Debug, Clone, PartialEq)]
enum Assignment {
    Set { column: &'static str, value: Value },
    Increment { column: &'static str, by: i64 },
}

/// Column assignments for a bulk update on `E`.
#[derive(Debug, Clone, PartialEq)]
pub struct Update<E> {
    assignments: Vec<Assignment>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Default for Update<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Update<E> {
    pub fn new() -> Self {
        Self {
            assignments: Vec::new(),
            _entity: PhantomData,
        }
    }

    /// `field = value`.
    pub fn set(mut self, field: &str, value: impl Into<Value>) -> RepoResult<Self> {
        let column = scalar_column::<E>(field)?;
        self.assignments.push(Assignment::Set {
            column,
            value: value.into(),
        });
        Ok(self)
    }

    /// `field = field + by`.
    pub fn increment(mut self, field: &str, by: i64) -> RepoResult<Self> {
        let column = scalar_column::<E>(field)?;
        self.assignments.push(Assignment::Increment { column, by });
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

fn scalar_column<E: Entity>(field: &str) -> RepoResult<&'static str> {
    let meta = E::meta();
    meta.field(field)
        .map(|found| found.column)
        .ok_or_else(|| RepoError::InvalidUpdate {
            entity: meta.name,
            reason: format!("`{field}` is not an updatable field"),
        })
}

/// What happens to the working set after a bulk update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOptions {
    pub clear_automatically: bool,
}

impl BulkOptions {
    /// Clears every managed instance once the statement has run.
    pub fn clearing() -> Self {
        Self {
            clear_automatically: true,
        }
    }
}

pub(crate) fn compile_bulk_update<E: Entity>(
    predicate: &Predicate<E>,
    update: &Update<E>,
) -> RepoResult<CompiledSql> {
    let meta = E::meta();
    if update.is_empty() {
        return Err(RepoError::InvalidUpdate {
            entity: meta.name,
            reason: "no assignments".to_string(),
        });
    }

    let mut binds = Vec::new();
    let assignments = update
        .assignments
        .iter()
        .map(|assignment| match assignment {
            Assignment::Set { column, value } => {
                binds.push(value.clone());
                format!("{column} = ?")
            }
            Assignment::Increment { column, by } => {
                binds.push(Value::Integer(*by));
                format!("{column} = {column} + ?")
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("UPDATE {} SET {assignments}", meta.table);
    if !predicate.is_vacuous() {
        let matching = compile_matching_ids(predicate);
        sql.push_str(&format!(" WHERE {} IN ({})", meta.id_column, matching.sql));
        binds.extend(matching.binds);
    }
    Ok(CompiledSql { sql, binds })
}

impl QueryExecutor<'_> {
    /// Applies `update` to every row matching `predicate`.
    ///
    /// Returns the number of rows matched, including rows whose values did
    /// not change. Audit columns are left untouched.
    pub fn bulk_update<E: Entity>(
        &self,
        predicate: &Predicate<E>,
        update: &Update<E>,
    ) -> RepoResult<usize> {
        let compiled = compile_bulk_update(predicate, update)?;
        self.execute(E::meta().name, &compiled)
    }
}
