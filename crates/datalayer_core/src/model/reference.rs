//! To-one relation references and the session binding of lazy loads.
//!
//! # Invariants
//! - A lazy reference resolves only through the unit of work that decoded it,
//!   and only while that unit of work is open.
//! - Resolving outside that window is `StaleAccess`, never a silent re-query.

use crate::error::{RepoError, RepoResult};
use crate::model::entity::Entity;
use crate::repo::session::UnitOfWork;
use std::cell::Cell;
use std::rc::{Rc, Weak};
use uuid::Uuid;

#[derive(Debug)]
pub(crate) struct SessionState {
    id: Uuid,
    open: Cell<bool>,
}

impl SessionState {
    pub(crate) fn open() -> Self {
        Self {
            id: Uuid::new_v4(),
            open: Cell::new(true),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn close(&self) {
        self.open.set(false);
    }
}

/// Weak link from decoded rows back to the unit of work that loaded them.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    state: Weak<SessionState>,
}

impl SessionHandle {
    pub(crate) fn bound(state: &Rc<SessionState>) -> Self {
        Self {
            state: Rc::downgrade(state),
        }
    }

    /// Handle for rows read outside any unit of work.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.state
            .upgrade()
            .is_some_and(|state| state.open.get())
    }

    pub(crate) fn belongs_to(&self, state: &Rc<SessionState>) -> bool {
        self.state
            .upgrade()
            .is_some_and(|own| Rc::ptr_eq(&own, state) && own.open.get())
    }
}

/// Reference from an owning entity to a related entity.
#[derive(Debug, Clone)]
pub enum Ref<T: Entity> {
    /// Related entity loaded with the owner (fetch join or assignment).
    Loaded(Box<T>),
    /// Only the identifier is known; resolved on demand.
    Lazy { id: T::Id, session: SessionHandle },
}

impl<T: Entity> Ref<T> {
    pub fn loaded(value: T) -> Self {
        Self::Loaded(Box::new(value))
    }

    pub(crate) fn lazy(id: T::Id, session: SessionHandle) -> Self {
        Self::Lazy { id, session }
    }

    pub fn id(&self) -> Option<T::Id> {
        match self {
            Self::Loaded(value) => value.id(),
            Self::Lazy { id, .. } => Some(id.clone()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    /// The related entity when already loaded.
    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Loaded(value) => Some(value),
            Self::Lazy { .. } => None,
        }
    }

    /// Returns the related entity, loading it through `uow` when lazy.
    ///
    /// # Errors
    /// - `StaleAccess` when this reference was decoded by another unit of
    ///   work, or by one that has ended.
    /// - `NotFound` when the referenced row no longer exists.
    pub fn resolve(&self, uow: &UnitOfWork<'_>) -> RepoResult<T> {
        match self {
            Self::Loaded(value) => Ok((**value).clone()),
            Self::Lazy { id, session } => {
                if !uow.owns(session) {
                    return Err(RepoError::StaleAccess {
                        entity: T::meta().name,
                        id: id.to_string(),
                    });
                }
                uow.find::<T>(id)?.ok_or_else(|| RepoError::NotFound {
                    entity: T::meta().name,
                    id: id.to_string(),
                })
            }
        }
    }
}

/// References are equal when they point at the same row.
impl<T: Entity> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self.id(), other.id()) {
            (Some(left), Some(right)) => left == right,
            (None, None) => self.get() == other.get(),
            _ => false,
        }
    }
}
