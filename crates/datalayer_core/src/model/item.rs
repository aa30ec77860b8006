//! Item entity with a caller-assigned identifier.
//!
//! # Invariants
//! - `id` is chosen by the caller, so "has an id" cannot mean "was saved";
//!   an item is new until its creation date has been stamped.

use crate::db::RowReader;
use crate::error::RepoResult;
use crate::model::audit::Audit;
use crate::model::entity::{Entity, EntityMeta};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub static ITEM_META: EntityMeta = EntityMeta {
    name: "Item",
    table: "item",
    id_column: "item_id",
    fields: &[],
    relations: &[],
    audited: true,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub audit: Audit,
}

impl Item {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            audit: Audit::default(),
        }
    }
}

impl Entity for Item {
    type Id = Uuid;

    fn meta() -> &'static EntityMeta {
        &ITEM_META
    }

    fn id(&self) -> Option<Uuid> {
        Some(self.id)
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    fn is_new(&self) -> bool {
        self.audit.created_date.is_none()
    }

    fn field_values(&self) -> Vec<Value> {
        Vec::new()
    }

    fn from_row(row: &RowReader<'_, '_>) -> RepoResult<Self> {
        Ok(Self {
            id: row.id("item_id")?,
            audit: Audit::from_row(row)?,
        })
    }

    fn audit(&self) -> Option<&Audit> {
        Some(&self.audit)
    }

    fn audit_mut(&mut self) -> Option<&mut Audit> {
        Some(&mut self.audit)
    }
}
