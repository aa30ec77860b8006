//! Unit of work: one transaction plus an identity map of managed entities.
//!
//! # Responsibility
//! - Own the transaction that every repository call in a scope runs in.
//! - Track loaded and saved entities by type and identifier, keeping a
//!   snapshot of each so that changes can be written back on flush.
//! - Flush pending changes before any statement that reads or bulk-writes.
//!
//! # Invariants
//! - At most one managed instance per `(entity type, id)`.
//! - Inserts and deletes run immediately; updates run at flush.
//! - Read-only loads carry no snapshot and are never written back.
//! - Once ended (commit, rollback or drop) the session handle is closed and
//!   every lazy reference bound to it reports `StaleAccess`.

use crate::config::StoreConfig;
use crate::error::{RepoError, RepoResult};
use crate::model::audit::AuditStamp;
use crate::model::entity::Entity;
use crate::model::reference::{SessionHandle, SessionState};
use crate::query::page::Window;
use crate::query::predicate::Predicate;
use crate::query::sort::Sort;
use crate::query::Query;
use crate::repo::bulk::{BulkOptions, Update};
use crate::repo::executor::{QueryExecutor, QueryStats, StatementCounts};
use crate::repo::projection::Projection;
use crate::repo::repository::Repository;
use log::{debug, info, warn};
use rusqlite::types::Value;
use rusqlite::{Connection, Transaction};
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use uuid::Uuid;

#[derive(Debug)]
struct Managed<E> {
    /// Last state known to be stored. `None` for read-only loads.
    snapshot: Option<E>,
    current: E,
}

impl<E: Entity> Managed<E> {
    fn is_dirty(&self) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|snapshot| snapshot != &self.current)
    }
}

trait ManagedTable {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn len(&self) -> usize;
    fn flush(&mut self, executor: &QueryExecutor<'_>, stamp: &AuditStamp) -> RepoResult<usize>;
}

struct EntityTable<E: Entity> {
    entries: BTreeMap<E::Id, Managed<E>>,
}

impl<E: Entity> ManagedTable for EntityTable<E> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn flush(&mut self, executor: &QueryExecutor<'_>, stamp: &AuditStamp) -> RepoResult<usize> {
        let mut written = 0;
        for managed in self.entries.values_mut().filter(|managed| managed.is_dirty()) {
            managed.current.validate()?;
            if let Some(audit) = managed.current.audit_mut() {
                audit.stamp_modified(stamp);
            }
            executor.update(&managed.current)?;
            managed.snapshot = Some(managed.current.clone());
            written += 1;
        }
        Ok(written)
    }
}

#[derive(Default)]
struct IdentityMap {
    tables: BTreeMap<TypeId, Box<dyn ManagedTable>>,
}

impl IdentityMap {
    fn table<E: Entity>(&self) -> Option<&EntityTable<E>> {
        self.tables
            .get(&TypeId::of::<E>())
            .and_then(|table| table.as_any().downcast_ref::<EntityTable<E>>())
    }

    fn table_mut<E: Entity>(&mut self) -> RepoResult<&mut EntityTable<E>> {
        self.tables
            .entry(TypeId::of::<E>())
            .or_insert_with(|| -> Box<dyn ManagedTable> {
                Box::new(EntityTable::<E> {
                    entries: BTreeMap::new(),
                })
            })
            .as_any_mut()
            .downcast_mut::<EntityTable<E>>()
            .ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "identity map holds a foreign table for {}",
                    E::meta().name
                ))
            })
    }

    fn get<E: Entity>(&self, id: &E::Id) -> Option<&Managed<E>> {
        self.table::<E>().and_then(|table| table.entries.get(id))
    }

    fn len<E: Entity>(&self) -> usize {
        self.table::<E>().map_or(0, |table| table.entries.len())
    }

    fn total(&self) -> usize {
        self.tables.values().map(|table| table.len()).sum()
    }
}

/// Transaction-scoped working set.
///
/// Repositories borrowed from a unit of work share its transaction and its
/// identity map. Dropping an unfinished unit of work rolls back.
pub struct UnitOfWork<'conn> {
    conn: &'conn Connection,
    tx: Option<Transaction<'conn>>,
    state: Rc<SessionState>,
    managed: RefCell<IdentityMap>,
    stats: QueryStats,
    auditor: String,
}

impl<'conn> UnitOfWork<'conn> {
    /// Begins a unit of work with default configuration.
    pub fn begin(conn: &'conn Connection) -> RepoResult<Self> {
        Self::begin_with(conn, &StoreConfig::default())
    }

    pub fn begin_with(conn: &'conn Connection, config: &StoreConfig) -> RepoResult<Self> {
        let tx = conn.unchecked_transaction()?;
        let state = Rc::new(SessionState::open());
        let auditor = config
            .auditor
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info!(
            "event=uow_begin module=repo status=ok session={}",
            state.id()
        );
        Ok(Self {
            conn,
            tx: Some(tx),
            state,
            managed: RefCell::new(IdentityMap::default()),
            stats: QueryStats::default(),
            auditor,
        })
    }

    /// Executor bound to this unit of work's session. Runs statements as
    /// given: it does not flush or consult the identity map.
    pub fn executor(&self) -> QueryExecutor<'_> {
        QueryExecutor::bound(self.conn, &self.stats, self.session())
    }

    pub fn repository<E: Entity>(&self) -> Repository<'_, 'conn, E> {
        Repository::new(self)
    }

    pub fn session(&self) -> SessionHandle {
        SessionHandle::bound(&self.state)
    }

    /// Whether lazy references bound to `handle` resolve through this
    /// unit of work.
    pub fn owns(&self, handle: &SessionHandle) -> bool {
        handle.belongs_to(&self.state)
    }

    pub fn stats(&self) -> StatementCounts {
        self.stats.snapshot()
    }

    pub fn auditor(&self) -> &str {
        &self.auditor
    }

    fn stamp(&self) -> AuditStamp {
        AuditStamp::now(self.auditor.clone())
    }

    /// Inserts a new entity and starts managing it.
    ///
    /// Returns the entity with its identifier and audit columns filled.
    pub fn persist<E: Entity>(&self, mut entity: E) -> RepoResult<E> {
        entity.validate()?;
        if let Some(audit) = entity.audit_mut() {
            audit.stamp_created(&self.stamp());
        }
        let id = self.executor().insert(&entity)?;
        entity.set_id(id.clone());
        self.register(id, Some(entity.clone()), entity.clone())?;
        Ok(entity)
    }

    /// Replaces the managed state of an already persisted entity.
    ///
    /// The write happens at the next flush, unless the managed instance was
    /// loaded read-only. An entity whose row does not exist is inserted with
    /// its own identifier.
    pub fn merge<E: Entity>(&self, mut entity: E) -> RepoResult<E> {
        let Some(id) = entity.id() else {
            return self.persist(entity);
        };
        entity.validate()?;

        {
            let mut map = self.managed.borrow_mut();
            if let Some(managed) = map.table_mut::<E>()?.entries.get_mut(&id) {
                if let (Some(stored), Some(audit)) =
                    (managed.current.audit().cloned(), entity.audit_mut())
                {
                    audit.carry_created_from(&stored);
                }
                if managed.snapshot.is_none() {
                    debug!(
                        "event=merge module=repo status=skipped entity={} id={} reason=read_only",
                        E::meta().name,
                        id
                    );
                }
                managed.current = entity.clone();
                return Ok(entity);
            }
        }

        match self.executor().find_one::<E>(&id)? {
            Some(stored) => {
                if let (Some(stored_audit), Some(audit)) = (stored.audit(), entity.audit_mut()) {
                    audit.carry_created_from(stored_audit);
                }
                self.register(id, Some(stored), entity.clone())?;
                Ok(entity)
            }
            None => self.persist(entity),
        }
    }

    /// The managed instance with `id`, loading it when not yet managed.
    pub fn find<E: Entity>(&self, id: &E::Id) -> RepoResult<Option<E>> {
        if let Some(managed) = self.managed.borrow().get::<E>(id) {
            return Ok(Some(managed.current.clone()));
        }
        match self.executor().find_one::<E>(id)? {
            Some(loaded) => self.adopt(loaded, false, false).map(Some),
            None => Ok(None),
        }
    }

    pub fn query<E: Entity>(&self, query: &Query<E>) -> RepoResult<Vec<E>> {
        self.query_window(query, None)
    }

    /// Runs `query` after flushing. Rows already managed come back as their
    /// managed instance, not as the freshly read row, with any relation the
    /// query fetched filled in.
    pub fn query_window<E: Entity>(
        &self,
        query: &Query<E>,
        window: Option<Window>,
    ) -> RepoResult<Vec<E>> {
        self.flush()?;
        let rows = self.executor().find(query, window)?;
        let fetched = !query.fetch_paths().is_empty();
        rows.into_iter()
            .map(|row| self.adopt(row, query.is_read_only(), fetched))
            .collect()
    }

    pub fn count<E: Entity>(&self, predicate: &Predicate<E>) -> RepoResult<u64> {
        self.flush()?;
        self.executor().count(predicate)
    }

    pub fn project<E: Entity, P: Projection<E>>(
        &self,
        predicate: &Predicate<E>,
        sort: &Sort,
        window: Option<Window>,
    ) -> RepoResult<Vec<P>> {
        self.flush()?;
        self.executor().project(predicate, sort, window)
    }

    pub fn count_projection<E: Entity, P: Projection<E>>(
        &self,
        predicate: &Predicate<E>,
    ) -> RepoResult<u64> {
        self.flush()?;
        self.executor().count_projection::<E, P>(predicate)
    }

    /// Runs caller-written SQL and manages the decoded entities.
    pub fn native_query<E: Entity>(&self, sql: &str, binds: &[Value]) -> RepoResult<Vec<E>> {
        self.flush()?;
        let rows = self.executor().native::<E>(sql, binds)?;
        rows.into_iter().map(|row| self.adopt(row, false, false)).collect()
    }

    pub fn native_project<E: Entity, P: Projection<E>>(
        &self,
        sql: &str,
        binds: &[Value],
    ) -> RepoResult<Vec<P>> {
        self.flush()?;
        self.executor().native_project::<E, P>(sql, binds)
    }

    pub fn native_count(&self, entity: &'static str, sql: &str, binds: &[Value]) -> RepoResult<u64> {
        self.flush()?;
        self.executor().native_count(entity, sql, binds)
    }

    /// Deletes the row with `id` and stops managing it. Returns whether a
    /// row was deleted.
    pub fn remove<E: Entity>(&self, id: &E::Id) -> RepoResult<bool> {
        self.flush()?;
        let deleted = self.executor().delete::<E>(id)?;
        self.evict::<E>(id);
        Ok(deleted > 0)
    }

    /// Deletes every row of `E` and stops managing its instances.
    pub fn remove_all<E: Entity>(&self) -> RepoResult<usize> {
        self.flush()?;
        let deleted = self.executor().delete_all::<E>()?;
        self.managed
            .borrow_mut()
            .tables
            .remove(&TypeId::of::<E>());
        Ok(deleted)
    }

    /// Flushes, runs one set-based update, then clears the working set or
    /// warns about managed instances the update made stale.
    pub fn bulk_update<E: Entity>(
        &self,
        predicate: &Predicate<E>,
        update: &Update<E>,
        options: BulkOptions,
    ) -> RepoResult<usize> {
        self.flush()?;
        let affected = self.executor().bulk_update(predicate, update)?;
        if options.clear_automatically {
            self.clear();
        } else {
            let stale = self.managed.borrow().len::<E>();
            if stale > 0 {
                warn!(
                    "event=bulk_update module=repo status=stale entity={} affected={} managed={}",
                    E::meta().name,
                    affected,
                    stale
                );
            }
        }
        Ok(affected)
    }

    /// Writes every changed managed instance. Returns the number written.
    pub fn flush(&self) -> RepoResult<usize> {
        let stamp = self.stamp();
        let executor = self.executor();
        let mut map = self.managed.borrow_mut();
        let mut written = 0;
        for table in map.tables.values_mut() {
            written += table.flush(&executor, &stamp)?;
        }
        Ok(written)
    }

    /// Stops managing one instance without writing its pending changes.
    pub fn evict<E: Entity>(&self, id: &E::Id) {
        if let Some(table) = self
            .managed
            .borrow_mut()
            .tables
            .get_mut(&TypeId::of::<E>())
            .and_then(|table| table.as_any_mut().downcast_mut::<EntityTable<E>>())
        {
            table.entries.remove(id);
        }
    }

    /// Stops managing every instance without writing pending changes.
    pub fn clear(&self) {
        self.managed.borrow_mut().tables.clear();
    }

    pub fn is_managed<E: Entity>(&self, id: &E::Id) -> bool {
        self.managed.borrow().get::<E>(id).is_some()
    }

    pub fn managed_count(&self) -> usize {
        self.managed.borrow().total()
    }

    /// Flushes and commits.
    pub fn commit(mut self) -> RepoResult<()> {
        self.flush()?;
        if let Some(tx) = self.tx.take() {
            tx.commit()?;
        }
        info!(
            "event=uow_commit module=repo status=ok session={} statements={:?}",
            self.state.id(),
            self.stats.snapshot()
        );
        Ok(())
    }

    /// Discards every change made in this unit of work.
    pub fn rollback(mut self) -> RepoResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback()?;
        }
        info!(
            "event=uow_rollback module=repo status=ok session={}",
            self.state.id()
        );
        Ok(())
    }

    fn register<E: Entity>(&self, id: E::Id, snapshot: Option<E>, current: E) -> RepoResult<()> {
        self.managed
            .borrow_mut()
            .table_mut::<E>()?
            .entries
            .insert(id, Managed { snapshot, current });
        Ok(())
    }

    /// Returns the managed instance for a freshly read row, managing the
    /// row itself when no instance exists yet. With `fetched`, relations the
    /// row carries loaded replace lazy ones on the managed instance.
    fn adopt<E: Entity>(&self, row: E, read_only: bool, fetched: bool) -> RepoResult<E> {
        let Some(id) = row.id() else {
            return Ok(row);
        };
        let mut map = self.managed.borrow_mut();
        let table = map.table_mut::<E>()?;
        if let Some(managed) = table.entries.get_mut(&id) {
            if fetched {
                managed.current.absorb_loaded_relations(&row);
                if let Some(snapshot) = managed.snapshot.as_mut() {
                    snapshot.absorb_loaded_relations(&row);
                }
            }
            return Ok(managed.current.clone());
        }
        let snapshot = (!read_only).then(|| row.clone());
        table.entries.insert(
            id,
            Managed {
                snapshot,
                current: row.clone(),
            },
        );
        Ok(row)
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        self.state.close();
        if self.tx.is_some() {
            info!(
                "event=uow_rollback module=repo status=ok session={} reason=dropped",
                self.state.id()
            );
        }
    }
}

impl std::fmt::Debug for UnitOfWork<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("session", &self.state.id())
            .field("managed", &self.managed_count())
            .field("auditor", &self.auditor)
            .finish()
    }
}

/// Builds a `NotFound` error for a strict lookup.
pub(crate) fn not_found<E: Entity>(id: &E::Id) -> RepoError {
    RepoError::NotFound {
        entity: E::meta().name,
        id: id.to_string(),
    }
}
