//! Member entity.
//!
//! # Invariants
//! - `username` must not be blank.
//! - `team` must reference a saved team before the member is written.

use crate::db::RowReader;
use crate::error::{RepoError, RepoResult};
use crate::model::audit::Audit;
use crate::model::entity::{
    require_not_blank, Entity, EntityId, EntityMeta, FieldMeta, RelationMeta, RelationProbe,
    ValidationError,
};
use crate::model::reference::Ref;
use crate::model::team::{Team, TeamId, TEAM_META};
use rusqlite::types::Value;

pub type MemberId = i64;

pub static MEMBER_META: EntityMeta = EntityMeta {
    name: "Member",
    table: "member",
    id_column: "member_id",
    fields: &[
        FieldMeta {
            name: "username",
            column: "username",
        },
        FieldMeta {
            name: "age",
            column: "age",
        },
    ],
    relations: &[RelationMeta {
        name: "team",
        join_column: "team_id",
        target: &TEAM_META,
    }],
    audited: true,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: Option<MemberId>,
    pub username: String,
    pub age: u32,
    pub team: Option<Ref<Team>>,
    pub audit: Audit,
}

impl Member {
    pub fn new(username: impl Into<String>) -> Self {
        Self::with_age(username, 0)
    }

    pub fn with_age(username: impl Into<String>, age: u32) -> Self {
        Self {
            id: None,
            username: username.into(),
            age,
            team: None,
            audit: Audit::default(),
        }
    }

    pub fn with_team(username: impl Into<String>, age: u32, team: &Team) -> Self {
        let mut member = Self::with_age(username, age);
        member.change_team(team);
        member
    }

    pub fn change_team(&mut self, team: &Team) {
        self.team = Some(Ref::loaded(team.clone()));
    }

    pub fn team_id(&self) -> Option<TeamId> {
        self.team.as_ref().and_then(Ref::id)
    }
}

impl Entity for Member {
    type Id = MemberId;

    fn meta() -> &'static EntityMeta {
        &MEMBER_META
    }

    fn id(&self) -> Option<MemberId> {
        self.id
    }

    fn set_id(&mut self, id: MemberId) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_not_blank(MEMBER_META.name, "username", &self.username)
    }

    fn field_values(&self) -> Vec<Value> {
        vec![Value::Text(self.username.clone()), Value::from(self.age)]
    }

    fn relation_values(&self) -> RepoResult<Vec<Value>> {
        let team_id = match &self.team {
            None => Value::Null,
            Some(team) => team
                .id()
                .map(|id| id.to_value())
                .ok_or(RepoError::TransientReference {
                    entity: MEMBER_META.name,
                    relation: "team",
                })?,
        };
        Ok(vec![team_id])
    }

    fn from_row(row: &RowReader<'_, '_>) -> RepoResult<Self> {
        let team = match row.nested("team", &TEAM_META)? {
            Some(team_row) => Some(Ref::loaded(Team::from_row(&team_row)?)),
            None => row
                .get::<Option<TeamId>>("team_id")?
                .map(|id| Ref::lazy(id, row.session().clone())),
        };
        Ok(Self {
            id: Some(row.get("member_id")?),
            username: row.get("username")?,
            age: row.get("age")?,
            team,
            audit: Audit::from_row(row)?,
        })
    }

    fn audit(&self) -> Option<&Audit> {
        Some(&self.audit)
    }

    fn audit_mut(&mut self) -> Option<&mut Audit> {
        Some(&mut self.audit)
    }

    fn absorb_loaded_relations(&mut self, fetched: &Self) {
        let upgrade = match (&self.team, &fetched.team) {
            (Some(Ref::Lazy { id, .. }), Some(loaded @ Ref::Loaded(_))) => {
                loaded.id() == Some(*id)
            }
            _ => false,
        };
        if upgrade {
            self.team = fetched.team.clone();
        }
    }

    fn relation_probe(&self, relation: &str) -> Option<RelationProbe> {
        match (relation, &self.team) {
            ("team", Some(team)) => Some(RelationProbe {
                id: team.id().map(|id| id.to_value()),
                fields: team.get().map(|loaded| loaded.field_values()),
            }),
            _ => None,
        }
    }
}
