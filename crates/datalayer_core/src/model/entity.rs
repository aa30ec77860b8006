//! Entity contract and static table metadata.
//!
//! # Responsibility
//! - Describe how an entity type maps onto one table (id, scalar fields,
//!   to-one relations, audit columns).
//! - Convert entities to bind values and back from rows.
//!
//! # Invariants
//! - `write_values()` yields one value per scalar field followed by one per
//!   relation join column, in `EntityMeta` declaration order.
//! - An entity with an identifier has been persisted exactly once.

use crate::db::RowReader;
use crate::error::{RepoError, RepoResult};
use crate::model::audit::{Audit, AUDIT_COLUMNS};
use rusqlite::types::Value;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use uuid::Uuid;

/// Field-level validity error raised before any write reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{entity}.{field} must not be blank")]
    Blank {
        entity: &'static str,
        field: &'static str,
    },
}

/// Identifier type of an entity.
pub trait EntityId: Clone + Eq + Ord + Hash + Debug + Display + 'static {
    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> RepoResult<Self>;
    /// Converts a store-generated rowid. `None` for caller-assigned id kinds.
    fn from_generated(rowid: i64) -> Option<Self>;
}

impl EntityId for i64 {
    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> RepoResult<Self> {
        match value {
            Value::Integer(id) => Ok(id),
            other => Err(RepoError::InvalidData(format!(
                "expected integer identifier, got {other:?}"
            ))),
        }
    }

    fn from_generated(rowid: i64) -> Option<Self> {
        Some(rowid)
    }
}

impl EntityId for Uuid {
    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }

    fn from_value(value: Value) -> RepoResult<Self> {
        match value {
            Value::Text(text) => Uuid::parse_str(&text).map_err(|_| {
                RepoError::InvalidData(format!("invalid uuid identifier `{text}`"))
            }),
            other => Err(RepoError::InvalidData(format!(
                "expected uuid identifier, got {other:?}"
            ))),
        }
    }

    fn from_generated(_rowid: i64) -> Option<Self> {
        None
    }
}

/// Scalar field mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMeta {
    pub name: &'static str,
    pub column: &'static str,
}

/// To-one relation mapping through a join column on the owning table.
#[derive(Debug)]
pub struct RelationMeta {
    pub name: &'static str,
    pub join_column: &'static str,
    pub target: &'static EntityMeta,
}

impl PartialEq for RelationMeta {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.join_column == other.join_column
            && self.target.table == other.target.table
    }
}

/// Static mapping of one entity type onto its table.
#[derive(Debug)]
pub struct EntityMeta {
    pub name: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
    pub fields: &'static [FieldMeta],
    pub relations: &'static [RelationMeta],
    pub audited: bool,
}

impl EntityMeta {
    pub fn field(&self, name: &str) -> Option<&'static FieldMeta> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&'static RelationMeta> {
        self.relations.iter().find(|relation| relation.name == name)
    }

    /// Columns written on insert/update, excluding the identifier.
    pub fn write_columns(&self) -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = self.fields.iter().map(|field| field.column).collect();
        columns.extend(self.relations.iter().map(|relation| relation.join_column));
        if self.audited {
            columns.extend(AUDIT_COLUMNS);
        }
        columns
    }

    /// Every column a full entity read needs, identifier first.
    pub fn read_columns(&self) -> Vec<&'static str> {
        let mut columns = vec![self.id_column];
        columns.extend(self.write_columns());
        columns
    }
}

/// Known values of a related entity: its identifier when saved, and its
/// scalar fields when loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationProbe {
    pub id: Option<Value>,
    pub fields: Option<Vec<Value>>,
}

/// A record type persisted in one table.
pub trait Entity: Clone + PartialEq + Debug + 'static {
    type Id: EntityId;

    fn meta() -> &'static EntityMeta;

    fn id(&self) -> Option<Self::Id>;

    fn set_id(&mut self, id: Self::Id);

    /// Whether `save` must insert this instance.
    fn is_new(&self) -> bool {
        self.id().is_none()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Scalar field values in `EntityMeta::fields` order.
    fn field_values(&self) -> Vec<Value>;

    /// Join column values in `EntityMeta::relations` order.
    fn relation_values(&self) -> RepoResult<Vec<Value>> {
        Ok(Vec::new())
    }

    /// Bind values for scalar fields then relation join columns.
    fn write_values(&self) -> RepoResult<Vec<Value>> {
        let mut values = self.field_values();
        values.extend(self.relation_values()?);
        Ok(values)
    }

    fn from_row(row: &RowReader<'_, '_>) -> RepoResult<Self>;

    fn audit(&self) -> Option<&Audit> {
        None
    }

    fn audit_mut(&mut self) -> Option<&mut Audit> {
        None
    }

    /// Takes loaded relations from `fetched`, a fresh read of the same row,
    /// where `self` only holds them lazily for the same target.
    fn absorb_loaded_relations(&mut self, _fetched: &Self) {}

    /// What is known about a related entity, used by query-by-example.
    fn relation_probe(&self, _relation: &str) -> Option<RelationProbe> {
        None
    }
}

pub(crate) fn require_not_blank(
    entity: &'static str,
    field: &'static str,
    value: &str,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Blank { entity, field });
    }
    Ok(())
}
