//! Composable filter predicates over one entity type.
//!
//! # Responsibility
//! - Build an immutable expression tree whose paths are resolved against
//!   `EntityMeta` at construction time.
//! - Keep vacuous criteria out of composed trees.
//!
//! # Invariants
//! - `Predicate::all().and(p) == p` for every `p`.
//! - A predicate never holds an unresolved path: unknown fields and
//!   relations fail with `InvalidPredicate` before any statement is built.

use crate::error::{RepoError, RepoResult};
use crate::model::entity::{Entity, EntityMeta, RelationMeta};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use std::marker::PhantomData;

static PATH_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("path segment pattern is valid")
});

/// Comparison operator of a single-field criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
}

impl CompareOp {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Like => "LIKE",
        }
    }
}

/// A field resolved against entity metadata, possibly across relations.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPath {
    pub(crate) relations: Vec<&'static RelationMeta>,
    pub(crate) name: &'static str,
    pub(crate) column: &'static str,
}

impl FieldPath {
    /// Resolves a dotted path such as `username` or `team.name`.
    pub fn resolve(meta: &'static EntityMeta, path: &str) -> RepoResult<Self> {
        let invalid = |reason: String| RepoError::InvalidPredicate {
            entity: meta.name,
            path: path.to_string(),
            reason,
        };

        let segments: Vec<&str> = path.split('.').collect();
        if let Some(bad) = segments
            .iter()
            .find(|segment| !PATH_SEGMENT.is_match(segment))
        {
            return Err(invalid(format!("`{bad}` is not a valid path segment")));
        }

        let (field, relation_segments) = match segments.split_last() {
            Some(split) => split,
            None => return Err(invalid("path is empty".to_string())),
        };
        let relations = resolve_relations(meta, relation_segments).map_err(invalid)?;
        let owner = relations.last().map_or(meta, |relation| relation.target);

        if *field == "id" || *field == owner.id_column {
            return Ok(Self {
                relations,
                name: "id",
                column: owner.id_column,
            });
        }
        if let Some(found) = owner.field(field) {
            return Ok(Self {
                relations,
                name: found.name,
                column: found.column,
            });
        }
        if owner.relation(field).is_some() {
            return Err(invalid(format!(
                "`{field}` is a relation of {}; name one of its fields",
                owner.name
            )));
        }
        Err(invalid(format!("{} has no field `{field}`", owner.name)))
    }

    /// Join-cache key: the dotted relation path, empty for root fields.
    pub fn relation_key(&self) -> String {
        relation_key(&self.relations)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Resolves a dotted relation path such as `team`.
pub(crate) fn resolve_relation_path(
    meta: &'static EntityMeta,
    path: &str,
) -> RepoResult<Vec<&'static RelationMeta>> {
    let segments: Vec<&str> = path.split('.').collect();
    let invalid = |reason: String| RepoError::InvalidPredicate {
        entity: meta.name,
        path: path.to_string(),
        reason,
    };
    if let Some(bad) = segments
        .iter()
        .find(|segment| !PATH_SEGMENT.is_match(segment))
    {
        return Err(invalid(format!("`{bad}` is not a valid path segment")));
    }
    resolve_relations(meta, &segments).map_err(invalid)
}

pub(crate) fn relation_key(relations: &[&'static RelationMeta]) -> String {
    relations
        .iter()
        .map(|relation| relation.name)
        .collect::<Vec<_>>()
        .join(".")
}

fn resolve_relations(
    meta: &'static EntityMeta,
    segments: &[&str],
) -> Result<Vec<&'static RelationMeta>, String> {
    let mut owner = meta;
    let mut relations = Vec::with_capacity(segments.len());
    for segment in segments {
        let relation = owner
            .relation(segment)
            .ok_or_else(|| format!("{} has no relation `{segment}`", owner.name))?;
        relations.push(relation);
        owner = relation.target;
    }
    Ok(relations)
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    /// Matches every row.
    All,
    Compare {
        path: FieldPath,
        op: CompareOp,
        value: Value,
    },
    In {
        path: FieldPath,
        values: Vec<Value>,
    },
    Null {
        path: FieldPath,
        negated: bool,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

/// Boolean filter over rows of `E`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate<E> {
    expr: Expr,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Default for Predicate<E> {
    fn default() -> Self {
        Self::all()
    }
}

impl<E: Entity> Predicate<E> {
    fn from_expr(expr: Expr) -> Self {
        Self {
            expr,
            _entity: PhantomData,
        }
    }

    /// The vacuous predicate.
    pub fn all() -> Self {
        Self::from_expr(Expr::All)
    }

    pub fn is_vacuous(&self) -> bool {
        self.expr == Expr::All
    }

    /// `field = value` on the root entity.
    pub fn by_field(field: &str, value: impl Into<Value>) -> RepoResult<Self> {
        Self::compare(field, CompareOp::Eq, value)
    }

    /// `path <op> value`; `path` may cross relations (`team.name`).
    pub fn compare(path: &str, op: CompareOp, value: impl Into<Value>) -> RepoResult<Self> {
        let path = FieldPath::resolve(E::meta(), path)?;
        Ok(Self::from_expr(Expr::Compare {
            path,
            op,
            value: value.into(),
        }))
    }

    /// `relation.field = value`, inner joining the relation.
    pub fn by_relation_field(
        relation_path: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> RepoResult<Self> {
        Self::compare_relation(relation_path, field, CompareOp::Eq, value)
    }

    pub fn compare_relation(
        relation_path: &str,
        field: &str,
        op: CompareOp,
        value: impl Into<Value>,
    ) -> RepoResult<Self> {
        if relation_path.is_empty() {
            return Err(RepoError::InvalidPredicate {
                entity: E::meta().name,
                path: field.to_string(),
                reason: "relation path is empty".to_string(),
            });
        }
        Self::compare(&format!("{relation_path}.{field}"), op, value)
    }

    /// `path IN (values...)`. An empty list matches nothing.
    pub fn in_values<I, V>(path: &str, values: I) -> RepoResult<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let path = FieldPath::resolve(E::meta(), path)?;
        Ok(Self::from_expr(Expr::In {
            path,
            values: values.into_iter().map(Into::into).collect(),
        }))
    }

    pub fn is_null(path: &str) -> RepoResult<Self> {
        let path = FieldPath::resolve(E::meta(), path)?;
        Ok(Self::from_expr(Expr::Null {
            path,
            negated: false,
        }))
    }

    pub fn is_not_null(path: &str) -> RepoResult<Self> {
        let path = FieldPath::resolve(E::meta(), path)?;
        Ok(Self::from_expr(Expr::Null {
            path,
            negated: true,
        }))
    }

    /// `field = criterion`, or vacuous when the criterion is absent or empty.
    ///
    /// The path is validated either way.
    pub fn when_present(field: &str, criterion: Option<&str>) -> RepoResult<Self> {
        let path = FieldPath::resolve(E::meta(), field)?;
        Ok(match criterion {
            Some(text) if !text.is_empty() => Self::from_expr(Expr::Compare {
                path,
                op: CompareOp::Eq,
                value: Value::Text(text.to_string()),
            }),
            _ => Self::all(),
        })
    }

    /// `relation.field = criterion`, or vacuous when the criterion is absent
    /// or empty. A vacuous result never joins the relation.
    pub fn relation_when_present(
        relation_path: &str,
        field: &str,
        criterion: Option<&str>,
    ) -> RepoResult<Self> {
        if relation_path.is_empty() {
            return Err(RepoError::InvalidPredicate {
                entity: E::meta().name,
                path: field.to_string(),
                reason: "relation path is empty".to_string(),
            });
        }
        Self::when_present(&format!("{relation_path}.{field}"), criterion)
    }

    /// Conjunction. A vacuous operand yields the other operand unchanged.
    pub fn and(self, other: Self) -> Self {
        match (self.expr, other.expr) {
            (Expr::All, expr) | (expr, Expr::All) => Self::from_expr(expr),
            (Expr::And(mut left), Expr::And(right)) => {
                left.extend(right);
                Self::from_expr(Expr::And(left))
            }
            (Expr::And(mut left), expr) => {
                left.push(expr);
                Self::from_expr(Expr::And(left))
            }
            (expr, Expr::And(mut right)) => {
                right.insert(0, expr);
                Self::from_expr(Expr::And(right))
            }
            (left, right) => Self::from_expr(Expr::And(vec![left, right])),
        }
    }

    /// Disjunction. A vacuous operand makes the whole disjunction vacuous.
    pub fn or(self, other: Self) -> Self {
        match (self.expr, other.expr) {
            (Expr::All, _) | (_, Expr::All) => Self::all(),
            (Expr::Or(mut left), Expr::Or(right)) => {
                left.extend(right);
                Self::from_expr(Expr::Or(left))
            }
            (Expr::Or(mut left), expr) => {
                left.push(expr);
                Self::from_expr(Expr::Or(left))
            }
            (expr, Expr::Or(mut right)) => {
                right.insert(0, expr);
                Self::from_expr(Expr::Or(right))
            }
            (left, right) => Self::from_expr(Expr::Or(vec![left, right])),
        }
    }

    pub(crate) fn expr(&self) -> &Expr {
        &self.expr
    }
}
