//! Reusable member predicates.

use crate::error::RepoResult;
use crate::model::member::Member;
use crate::query::predicate::{CompareOp, Predicate};

pub struct MemberSpec;

impl MemberSpec {
    /// `username = name`.
    pub fn username(name: &str) -> RepoResult<Predicate<Member>> {
        Predicate::by_field("username", name.to_string())
    }

    /// Members of the team named `name`; vacuous when `name` is absent or
    /// empty, in which case no team join is added.
    pub fn team_name(name: Option<&str>) -> RepoResult<Predicate<Member>> {
        Predicate::relation_when_present("team", "name", name)
    }

    pub fn age_at_least(age: u32) -> RepoResult<Predicate<Member>> {
        Predicate::compare("age", CompareOp::Ge, age)
    }
}
