//! Query-by-example: a probe entity becomes an equality predicate.
//!
//! # Invariants
//! - Null probe values and ignored paths contribute no criterion.
//! - A probed relation is inner joined, like any relation predicate.

use crate::error::RepoResult;
use crate::model::entity::{Entity, EntityId};
use crate::query::predicate::{CompareOp, Predicate};
use rusqlite::types::Value;

/// Which probe paths take part in matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExampleMatcher {
    ignored_paths: Vec<String>,
}

impl ExampleMatcher {
    /// Matches every non-null probe value.
    pub fn matching() -> Self {
        Self::default()
    }

    /// Excludes paths such as `age` or `team.name` from matching.
    pub fn with_ignore_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        self.ignored_paths.iter().any(|ignored| ignored == path)
    }
}

/// Probe entity paired with its matcher.
#[derive(Debug, Clone)]
pub struct Example<E: Entity> {
    probe: E,
    matcher: ExampleMatcher,
}

impl<E: Entity> Example<E> {
    pub fn of(probe: E, matcher: ExampleMatcher) -> Self {
        Self { probe, matcher }
    }

    pub fn probe(&self) -> &E {
        &self.probe
    }

    /// Builds the AND of one equality per matched probe value.
    pub fn to_predicate(&self) -> RepoResult<Predicate<E>> {
        let meta = E::meta();
        let mut predicate = Predicate::all();

        if let Some(id) = self.probe.id() {
            if !self.probe.is_new() && !self.matcher.is_ignored("id") {
                predicate = predicate.and(Predicate::by_field("id", id.to_value())?);
            }
        }

        for (field, value) in meta.fields.iter().zip(self.probe.field_values()) {
            predicate = predicate.and(self.criterion(field.name, value)?);
        }

        for relation in meta.relations {
            let Some(probe) = self.probe.relation_probe(relation.name) else {
                continue;
            };
            if let Some(id) = probe.id {
                let path = format!("{}.id", relation.name);
                predicate = predicate.and(self.criterion(&path, id)?);
            }
            let fields = probe.fields.unwrap_or_default();
            for (field, value) in relation.target.fields.iter().zip(fields) {
                let path = format!("{}.{}", relation.name, field.name);
                predicate = predicate.and(self.criterion(&path, value)?);
            }
        }
        Ok(predicate)
    }

    fn criterion(&self, path: &str, value: Value) -> RepoResult<Predicate<E>> {
        if value == Value::Null || self.matcher.is_ignored(path) {
            return Ok(Predicate::all());
        }
        Predicate::compare(path, CompareOp::Eq, value)
    }
}

#[cfg(test)]
mod tests {
    use super::{Example, ExampleMatcher};
    use crate::model::member::Member;
    use crate::model::team::Team;
    use crate::query::predicate::Predicate;

    #[test]
    fn ignored_and_null_paths_contribute_nothing() {
        let probe = Member::with_team("member1", 0, &Team::new("teamA"));
        let example = Example::of(probe, ExampleMatcher::matching().with_ignore_paths(["age"]));

        let expected = Predicate::<Member>::by_field("username", "member1".to_string())
            .unwrap()
            .and(Predicate::by_relation_field("team", "name", "teamA".to_string()).unwrap());
        assert_eq!(example.to_predicate().unwrap(), expected);
    }

    #[test]
    fn unignored_scalar_fields_are_matched() {
        let example = Example::of(Member::with_age("m", 7), ExampleMatcher::matching());
        let expected = Predicate::<Member>::by_field("username", "m".to_string())
            .unwrap()
            .and(Predicate::by_field("age", 7).unwrap());
        assert_eq!(example.to_predicate().unwrap(), expected);
    }
}
