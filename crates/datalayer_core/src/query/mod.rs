//! Query building: predicates, sorting, paging shapes and SQL translation.
//!
//! # Responsibility
//! - Describe what to read independently of how it is executed.
//! - Translate descriptions into parameterized SQLite statements.
//!
//! # Invariants
//! - Every path is validated against entity metadata before SQL exists.
//! - Values always travel as binds, never as SQL text.

pub mod example;
pub mod page;
pub mod predicate;
pub mod sort;
pub mod sql;

use crate::error::RepoResult;
use crate::model::entity::{Entity, RelationMeta};
use predicate::{resolve_relation_path, Predicate};
use sort::Sort;

/// Row query: filter, ordering, relations to load eagerly, and whether the
/// loaded entities are tracked for changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Query<E: Entity> {
    predicate: Predicate<E>,
    sort: Sort,
    fetch: Vec<Vec<&'static RelationMeta>>,
    read_only: bool,
}

impl<E: Entity> Default for Query<E> {
    fn default() -> Self {
        Self::all()
    }
}

impl<E: Entity> Query<E> {
    pub fn all() -> Self {
        Self::filter(Predicate::all())
    }

    pub fn filter(predicate: Predicate<E>) -> Self {
        Self {
            predicate,
            sort: Sort::unsorted(),
            fetch: Vec::new(),
            read_only: false,
        }
    }

    pub fn sorted(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    /// Loads the relation at `path` in the same statement (LEFT join).
    ///
    /// # Errors
    /// - `InvalidPredicate` when `path` names no relation.
    pub fn fetch(mut self, path: &str) -> RepoResult<Self> {
        let relations = resolve_relation_path(E::meta(), path)?;
        if !self.fetch.contains(&relations) {
            self.fetch.push(relations);
        }
        Ok(self)
    }

    /// Loaded entities are not snapshotted, so changes to them are never
    /// flushed.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn predicate(&self) -> &Predicate<E> {
        &self.predicate
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn fetch_paths(&self) -> &[Vec<&'static RelationMeta>] {
        &self.fetch
    }
}
