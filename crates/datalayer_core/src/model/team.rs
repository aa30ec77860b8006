//! Team entity.

use crate::db::RowReader;
use crate::error::RepoResult;
use crate::model::entity::{require_not_blank, Entity, EntityMeta, FieldMeta, ValidationError};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

pub type TeamId = i64;

pub static TEAM_META: EntityMeta = EntityMeta {
    name: "Team",
    table: "team",
    id_column: "team_id",
    fields: &[FieldMeta {
        name: "name",
        column: "name",
    }],
    relations: &[],
    audited: false,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: Option<TeamId>,
    pub name: String,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

impl Entity for Team {
    type Id = TeamId;

    fn meta() -> &'static EntityMeta {
        &TEAM_META
    }

    fn id(&self) -> Option<TeamId> {
        self.id
    }

    fn set_id(&mut self, id: TeamId) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_not_blank(TEAM_META.name, "name", &self.name)
    }

    fn field_values(&self) -> Vec<Value> {
        vec![Value::Text(self.name.clone())]
    }

    fn from_row(row: &RowReader<'_, '_>) -> RepoResult<Self> {
        Ok(Self {
            id: Some(row.get("team_id")?),
            name: row.get("name")?,
        })
    }
}
