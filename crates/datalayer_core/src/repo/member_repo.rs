//! Member-specific finders on top of the generic repository.
//!
//! # Responsibility
//! - Name the member queries callers use, each expressed through the
//!   generic predicate, paging, projection or native-query paths.
//!
//! # Invariants
//! - Single-result finders fail with `NonUniqueResult` on duplicates.
//! - `bulk_age_plus` clears the working set after it runs.

use crate::error::RepoResult;
use crate::model::member::Member;
use crate::query::page::{Page, PageRequest, Slice};
use crate::query::predicate::{CompareOp, Predicate};
use crate::query::sort::Sort;
use crate::query::Query;
use crate::repo::bulk::{BulkOptions, Update};
use crate::repo::member_spec::MemberSpec;
use crate::repo::pagination::paginate;
use crate::repo::projection::{MemberDto, MemberProjection, Projection, UsernameOnly};
use crate::repo::repository::{single, Repository};
use rusqlite::types::Value;

const MEMBER_BY_USERNAME_SQL: &str = "SELECT * FROM member WHERE username = ?";

const MEMBER_CUSTOM_SQL: &str = "SELECT m.* FROM member m ORDER BY m.member_id";

const MEMBER_PROJECTION_SQL: &str = "SELECT
    m.member_id AS \"id\",
    m.username AS \"username\",
    t.name AS \"team.name\"
FROM member m
LEFT JOIN team t ON t.team_id = m.team_id
ORDER BY m.member_id
LIMIT ? OFFSET ?";

const MEMBER_COUNT_SQL: &str = "SELECT COUNT(*) FROM member";

/// Named member queries.
pub trait MemberRepository {
    fn find_by_username_and_age_greater_than(
        &self,
        username: &str,
        age: u32,
    ) -> RepoResult<Vec<Member>>;

    fn find_by_username(&self, username: &str) -> RepoResult<Vec<Member>>;

    /// Members with exactly this username and age.
    fn find_user(&self, username: &str, age: u32) -> RepoResult<Vec<Member>>;

    fn find_username_list(&self) -> RepoResult<Vec<String>>;

    /// Members that have a team, with the team's name.
    fn find_member_dto(&self) -> RepoResult<Vec<MemberDto>>;

    fn find_by_names(&self, names: &[&str]) -> RepoResult<Vec<Member>>;

    fn find_list_by_username(&self, username: &str) -> RepoResult<Vec<Member>>;

    fn find_member_by_username(&self, username: &str) -> RepoResult<Option<Member>>;

    fn find_by_age(&self, age: u32, request: &PageRequest) -> RepoResult<Page<Member>>;

    fn find_slice_by_age(&self, age: u32, request: &PageRequest) -> RepoResult<Slice<Member>>;

    /// Every member with its team fetched; the total is counted without
    /// joining teams.
    fn find_member_all_count_by(&self, request: &PageRequest) -> RepoResult<Page<Member>>;

    /// Adds one to the age of every member at least `age` years old.
    fn bulk_age_plus(&self, age: u32) -> RepoResult<usize>;

    fn find_member_fetch_join(&self) -> RepoResult<Vec<Member>>;

    /// Loads without a snapshot, so changes are never written back.
    fn find_read_only_by_username(&self, username: &str) -> RepoResult<Option<Member>>;

    fn find_projections_by_username<P: Projection<Member>>(
        &self,
        username: &str,
    ) -> RepoResult<Vec<P>>;

    fn find_by_native_query(&self, username: &str) -> RepoResult<Option<Member>>;

    fn find_by_native_projection(
        &self,
        request: &PageRequest,
    ) -> RepoResult<Page<MemberProjection>>;

    fn find_member_custom(&self) -> RepoResult<Vec<Member>>;
}

impl MemberRepository for Repository<'_, '_, Member> {
    fn find_by_username_and_age_greater_than(
        &self,
        username: &str,
        age: u32,
    ) -> RepoResult<Vec<Member>> {
        let predicate =
            MemberSpec::username(username)?.and(Predicate::compare("age", CompareOp::Gt, age)?);
        self.find_all_by(predicate)
    }

    fn find_by_username(&self, username: &str) -> RepoResult<Vec<Member>> {
        self.find_all_by(MemberSpec::username(username)?)
    }

    fn find_user(&self, username: &str, age: u32) -> RepoResult<Vec<Member>> {
        let predicate = MemberSpec::username(username)?.and(Predicate::by_field("age", age)?);
        self.find_all_by(predicate)
    }

    fn find_username_list(&self) -> RepoResult<Vec<String>> {
        let rows: Vec<UsernameOnly> = self.project(&Predicate::all(), &Sort::unsorted())?;
        Ok(rows.into_iter().map(|row| row.username).collect())
    }

    fn find_member_dto(&self) -> RepoResult<Vec<MemberDto>> {
        self.project(&Predicate::all(), &Sort::unsorted())
    }

    fn find_by_names(&self, names: &[&str]) -> RepoResult<Vec<Member>> {
        let values = names.iter().map(|name| name.to_string());
        self.find_all_by(Predicate::in_values("username", values)?)
    }

    fn find_list_by_username(&self, username: &str) -> RepoResult<Vec<Member>> {
        self.find_by_username(username)
    }

    fn find_member_by_username(&self, username: &str) -> RepoResult<Option<Member>> {
        self.find_one_by(MemberSpec::username(username)?)
    }

    fn find_by_age(&self, age: u32, request: &PageRequest) -> RepoResult<Page<Member>> {
        self.find_page(&Query::filter(Predicate::by_field("age", age)?), request)
    }

    fn find_slice_by_age(&self, age: u32, request: &PageRequest) -> RepoResult<Slice<Member>> {
        self.find_slice(&Query::filter(Predicate::by_field("age", age)?), request)
    }

    fn find_member_all_count_by(&self, request: &PageRequest) -> RepoResult<Page<Member>> {
        self.find_page(&Query::all().fetch("team")?, request)
    }

    fn bulk_age_plus(&self, age: u32) -> RepoResult<usize> {
        self.bulk_update(
            &MemberSpec::age_at_least(age)?,
            &Update::new().increment("age", 1)?,
            BulkOptions::clearing(),
        )
    }

    fn find_member_fetch_join(&self) -> RepoResult<Vec<Member>> {
        self.find_by(&Query::all().fetch("team")?)
    }

    fn find_read_only_by_username(&self, username: &str) -> RepoResult<Option<Member>> {
        let query = Query::filter(MemberSpec::username(username)?).read_only();
        single(self.find_by(&query)?)
    }

    fn find_projections_by_username<P: Projection<Member>>(
        &self,
        username: &str,
    ) -> RepoResult<Vec<P>> {
        self.project(&MemberSpec::username(username)?, &Sort::unsorted())
    }

    fn find_by_native_query(&self, username: &str) -> RepoResult<Option<Member>> {
        let rows = self
            .unit_of_work()
            .native_query(MEMBER_BY_USERNAME_SQL, &[Value::Text(username.to_string())])?;
        single(rows)
    }

    fn find_by_native_projection(
        &self,
        request: &PageRequest,
    ) -> RepoResult<Page<MemberProjection>> {
        let uow = self.unit_of_work();
        paginate(
            request,
            |window| {
                let binds = [
                    Value::Integer(i64::try_from(window.limit).unwrap_or(i64::MAX)),
                    Value::Integer(i64::try_from(window.offset).unwrap_or(i64::MAX)),
                ];
                uow.native_project::<Member, MemberProjection>(MEMBER_PROJECTION_SQL, &binds)
            },
            || uow.native_count("Member", MEMBER_COUNT_SQL, &[]),
        )
    }

    fn find_member_custom(&self) -> RepoResult<Vec<Member>> {
        self.unit_of_work().native_query(MEMBER_CUSTOM_SQL, &[])
    }
}
