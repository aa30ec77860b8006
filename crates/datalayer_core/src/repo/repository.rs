//! Generic repository facade over a unit of work.
//!
//! # Responsibility
//! - Offer the CRUD, query, paging, projection and bulk operations every
//!   entity type shares.
//! - Route each call through the owning unit of work so the identity map
//!   and auto flush apply uniformly.
//!
//! # Invariants
//! - `save` inserts when `Entity::is_new` holds and reconciles otherwise.
//! - `find_by_id` reports a missing row as `Ok(None)`; only `get_by_id`
//!   turns it into `NotFound`.

use crate::error::{RepoError, RepoResult};
use crate::model::entity::{Entity, EntityId};
use crate::query::example::Example;
use crate::query::page::{Page, PageRequest, Slice};
use crate::query::predicate::Predicate;
use crate::query::sort::Sort;
use crate::query::Query;
use crate::repo::bulk::{BulkOptions, Update};
use crate::repo::pagination::{paginate, paginate_slice};
use crate::repo::projection::Projection;
use crate::repo::session::{not_found, UnitOfWork};
use std::marker::PhantomData;

/// Repository for entity type `E`, borrowed from a [`UnitOfWork`].
pub struct Repository<'a, 'conn, E: Entity> {
    uow: &'a UnitOfWork<'conn>,
    _entity: PhantomData<fn() -> E>,
}

impl<'a, 'conn, E: Entity> Repository<'a, 'conn, E> {
    pub(crate) fn new(uow: &'a UnitOfWork<'conn>) -> Self {
        Self {
            uow,
            _entity: PhantomData,
        }
    }

    pub fn unit_of_work(&self) -> &'a UnitOfWork<'conn> {
        self.uow
    }

    /// Inserts a new entity or reconciles an existing one.
    pub fn save(&self, entity: E) -> RepoResult<E> {
        if entity.is_new() {
            self.uow.persist(entity)
        } else {
            self.uow.merge(entity)
        }
    }

    pub fn save_all(&self, entities: impl IntoIterator<Item = E>) -> RepoResult<Vec<E>> {
        entities.into_iter().map(|entity| self.save(entity)).collect()
    }

    pub fn find_by_id(&self, id: &E::Id) -> RepoResult<Option<E>> {
        self.uow.find(id)
    }

    /// # Errors
    /// - `NotFound` when no row has identifier `id`.
    pub fn get_by_id(&self, id: &E::Id) -> RepoResult<E> {
        self.find_by_id(id)?.ok_or_else(|| not_found::<E>(id))
    }

    pub fn exists_by_id(&self, id: &E::Id) -> RepoResult<bool> {
        if self.uow.is_managed::<E>(id) {
            return Ok(true);
        }
        let predicate = Predicate::<E>::by_field("id", id.to_value())?;
        Ok(self.uow.count(&predicate)? > 0)
    }

    pub fn find_all(&self) -> RepoResult<Vec<E>> {
        self.uow.query(&Query::all())
    }

    pub fn find_all_sorted(&self, sort: Sort) -> RepoResult<Vec<E>> {
        self.uow.query(&Query::all().sorted(sort))
    }

    pub fn find_by(&self, query: &Query<E>) -> RepoResult<Vec<E>> {
        self.uow.query(query)
    }

    pub fn find_all_by(&self, predicate: Predicate<E>) -> RepoResult<Vec<E>> {
        self.uow.query(&Query::filter(predicate))
    }

    /// # Errors
    /// - `NonUniqueResult` when more than one row matches.
    pub fn find_one_by(&self, predicate: Predicate<E>) -> RepoResult<Option<E>> {
        single(self.find_all_by(predicate)?)
    }

    pub fn find_all_by_example(&self, example: &Example<E>) -> RepoResult<Vec<E>> {
        self.find_all_by(example.to_predicate()?)
    }

    /// One page of `query`. The request's sort keys follow the query's own.
    pub fn find_page(&self, query: &Query<E>, request: &PageRequest) -> RepoResult<Page<E>> {
        let query = with_request_sort(query, request);
        paginate(
            request,
            |window| self.uow.query_window(&query, Some(window)),
            || self.uow.count(query.predicate()),
        )
    }

    pub fn find_slice(&self, query: &Query<E>, request: &PageRequest) -> RepoResult<Slice<E>> {
        let query = with_request_sort(query, request);
        paginate_slice(request, |window| self.uow.query_window(&query, Some(window)))
    }

    pub fn count(&self) -> RepoResult<u64> {
        self.uow.count(&Predicate::<E>::all())
    }

    pub fn count_by(&self, predicate: &Predicate<E>) -> RepoResult<u64> {
        self.uow.count(predicate)
    }

    /// Returns whether a row was deleted.
    pub fn delete_by_id(&self, id: &E::Id) -> RepoResult<bool> {
        self.uow.remove::<E>(id)
    }

    /// Deletes a persisted entity. An entity without identifier is ignored.
    pub fn delete(&self, entity: &E) -> RepoResult<bool> {
        match entity.id() {
            Some(id) => self.delete_by_id(&id),
            None => Ok(false),
        }
    }

    pub fn delete_all(&self) -> RepoResult<usize> {
        self.uow.remove_all::<E>()
    }

    pub fn bulk_update(
        &self,
        predicate: &Predicate<E>,
        update: &Update<E>,
        options: BulkOptions,
    ) -> RepoResult<usize> {
        self.uow.bulk_update(predicate, update, options)
    }

    pub fn project<P: Projection<E>>(
        &self,
        predicate: &Predicate<E>,
        sort: &Sort,
    ) -> RepoResult<Vec<P>> {
        self.uow.project(predicate, sort, None)
    }

    /// A page of projections. The total counts the rows the projection
    /// can return, so relations it requires are joined in the count too.
    pub fn project_page<P: Projection<E>>(
        &self,
        predicate: &Predicate<E>,
        request: &PageRequest,
    ) -> RepoResult<Page<P>> {
        paginate(
            request,
            |window| self.uow.project(predicate, request.sort(), Some(window)),
            || self.uow.count_projection::<E, P>(predicate),
        )
    }
}

fn with_request_sort<E: Entity>(query: &Query<E>, request: &PageRequest) -> Query<E> {
    let sort = query.sort().clone().and(request.sort().clone());
    query.clone().sorted(sort)
}

pub(crate) fn single<E: Entity>(mut rows: Vec<E>) -> RepoResult<Option<E>> {
    if rows.len() > 1 {
        return Err(RepoError::NonUniqueResult {
            entity: E::meta().name,
            count: rows.len(),
        });
    }
    Ok(rows.pop())
}
