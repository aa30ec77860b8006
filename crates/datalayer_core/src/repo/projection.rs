//! Read-only shapes selected as a subset of entity columns.
//!
//! # Invariants
//! - Result columns are aliased by their path (`username`, `team.name`).
//! - Relations a projection reads are left joined unless it lists them in
//!   `required_relations`.

use crate::db::RowReader;
use crate::error::RepoResult;
use crate::model::entity::Entity;
use crate::model::member::{Member, MemberId};
use crate::model::team::TeamId;
use serde::Serialize;

/// A row shape read from entity `E`.
pub trait Projection<E: Entity>: Sized {
    /// Paths selected, each becoming a result column of the same name.
    fn columns() -> &'static [&'static str];

    /// Relations that must exist for a row to be returned (inner join).
    fn required_relations() -> &'static [&'static str] {
        &[]
    }

    fn from_row(row: &RowReader<'_, '_>) -> RepoResult<Self>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsernameOnly {
    pub username: String,
}

impl Projection<Member> for UsernameOnly {
    fn columns() -> &'static [&'static str] {
        &["username"]
    }

    fn from_row(row: &RowReader<'_, '_>) -> RepoResult<Self> {
        Ok(Self {
            username: row.get("username")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamNameOnly {
    pub name: String,
}

/// Member username with its team's name nested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedClosedProjection {
    pub username: String,
    pub team: Option<TeamNameOnly>,
}

impl Projection<Member> for NestedClosedProjection {
    fn columns() -> &'static [&'static str] {
        &["username", "team.id", "team.name"]
    }

    fn from_row(row: &RowReader<'_, '_>) -> RepoResult<Self> {
        let team = match row.get::<Option<TeamId>>("team.id")? {
            Some(_) => Some(TeamNameOnly {
                name: row.get("team.name")?,
            }),
            None => None,
        };
        Ok(Self {
            username: row.get("username")?,
            team,
        })
    }
}

/// Flat member view; `team_name` is absent for members without a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberProjection {
    pub id: MemberId,
    pub username: String,
    pub team_name: Option<String>,
}

impl Projection<Member> for MemberProjection {
    fn columns() -> &'static [&'static str] {
        &["id", "username", "team.name"]
    }

    fn from_row(row: &RowReader<'_, '_>) -> RepoResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            team_name: row.get("team.name")?,
        })
    }
}

/// Member transfer object. Selected only for members that have a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDto {
    pub id: Option<MemberId>,
    pub username: String,
    pub team_name: Option<String>,
}

impl Projection<Member> for MemberDto {
    fn columns() -> &'static [&'static str] {
        &["id", "username", "team.name"]
    }

    fn required_relations() -> &'static [&'static str] {
        &["team"]
    }

    fn from_row(row: &RowReader<'_, '_>) -> RepoResult<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            username: row.get("username")?,
            team_name: Some(row.get("team.name")?),
        })
    }
}

/// Team name is filled only when the team was loaded with the member.
impl From<&Member> for MemberDto {
    fn from(member: &Member) -> Self {
        Self {
            id: member.id,
            username: member.username.clone(),
            team_name: member
                .team
                .as_ref()
                .and_then(|team| team.get())
                .map(|team| team.name.clone()),
        }
    }
}
