//! Translation of queries into parameterized SQLite statements.
//!
//! # Responsibility
//! - Render predicate trees, sorts, fetch joins and windows into one
//!   statement with positional binds.
//!
//! # Invariants
//! - One join per relation path per statement. A join first requested as
//!   LEFT (sort, fetch, projection) is upgraded to INNER when a predicate
//!   needs the relation, never duplicated.
//! - Relations referenced only under OR, or by `IS NULL`, stay LEFT joined.
//! - Row selects always end with the root identifier as final sort key
//!   unless the caller already sorts by it.
//! - Count statements mirror the predicate, plus the inner joins of the
//!   projection they count for; sorts and fetch joins never reach them.

use crate::error::RepoResult;
use crate::model::entity::{Entity, EntityMeta, RelationMeta};
use crate::query::page::Window;
use crate::query::predicate::{relation_key, resolve_relation_path, Expr, FieldPath, Predicate};
use crate::query::sort::{Direction, Sort};
use crate::query::Query;
use rusqlite::types::Value;

pub(crate) const ROOT_ALIAS: &str = "e";

/// Statement text plus its positional bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSql {
    pub sql: String,
    pub binds: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug)]
struct Join {
    key: String,
    alias: String,
    kind: JoinKind,
    parent_alias: String,
    relation: &'static RelationMeta,
}

/// Per-statement join cache keyed by relation path.
#[derive(Debug, Default)]
struct JoinSet {
    joins: Vec<Join>,
}

impl JoinSet {
    fn alias_for(&mut self, relations: &[&'static RelationMeta], kind: JoinKind) -> String {
        let mut parent = ROOT_ALIAS.to_string();
        for depth in 1..=relations.len() {
            let key = relation_key(&relations[..depth]);
            let alias = match self.joins.iter_mut().find(|join| join.key == key) {
                Some(join) => {
                    if kind == JoinKind::Inner {
                        join.kind = JoinKind::Inner;
                    }
                    join.alias.clone()
                }
                None => {
                    let alias = format!("j{}", self.joins.len() + 1);
                    self.joins.push(Join {
                        key,
                        alias: alias.clone(),
                        kind,
                        parent_alias: parent.clone(),
                        relation: relations[depth - 1],
                    });
                    alias
                }
            };
            parent = alias;
        }
        parent
    }

    /// Qualified column for a path. A relation's identifier is read from the
    /// owner's join column, so it never needs a join.
    fn column(&mut self, path: &FieldPath, kind: JoinKind) -> String {
        if path.name == "id" {
            if let Some((last, owners)) = path.relations.split_last() {
                let alias = self.alias_for(owners, kind);
                return format!("{alias}.{}", last.join_column);
            }
        }
        let alias = self.alias_for(&path.relations, kind);
        format!("{alias}.{}", path.column)
    }

    fn render(&self) -> String {
        self.joins
            .iter()
            .map(|join| {
                let keyword = match join.kind {
                    JoinKind::Inner => "INNER JOIN",
                    JoinKind::Left => "LEFT JOIN",
                };
                let target = join.relation.target;
                format!(
                    " {keyword} {} {alias} ON {alias}.{} = {}.{}",
                    target.table,
                    target.id_column,
                    join.parent_alias,
                    join.relation.join_column,
                    alias = join.alias,
                )
            })
            .collect()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.joins.len()
    }
}

/// Renders one predicate node. `kind` is the join a relation reference
/// needs here: INNER at conjunction level, LEFT under a disjunction so that
/// rows without the relation can still match another branch.
fn render_expr(
    expr: &Expr,
    kind: JoinKind,
    joins: &mut JoinSet,
    binds: &mut Vec<Value>,
) -> String {
    match expr {
        Expr::All => "1 = 1".to_string(),
        Expr::Compare { path, op, value } => {
            let column = joins.column(path, kind);
            binds.push(value.clone());
            format!("{column} {} ?", op.sql())
        }
        Expr::In { path, values } => {
            let column = joins.column(path, kind);
            if values.is_empty() {
                return "0 = 1".to_string();
            }
            binds.extend(values.iter().cloned());
            let marks = vec!["?"; values.len()].join(", ");
            format!("{column} IN ({marks})")
        }
        Expr::Null {
            path,
            negated: false,
        } => format!("{} IS NULL", joins.column(path, JoinKind::Left)),
        Expr::Null {
            path,
            negated: true,
        } => format!("{} IS NOT NULL", joins.column(path, kind)),
        Expr::And(parts) => render_joined(parts, " AND ", kind, joins, binds),
        Expr::Or(parts) => render_joined(parts, " OR ", JoinKind::Left, joins, binds),
    }
}

fn render_joined(
    parts: &[Expr],
    separator: &str,
    kind: JoinKind,
    joins: &mut JoinSet,
    binds: &mut Vec<Value>,
) -> String {
    parts
        .iter()
        .map(|part| match part {
            Expr::And(_) | Expr::Or(_) => {
                format!("({})", render_expr(part, kind, joins, binds))
            }
            _ => render_expr(part, kind, joins, binds),
        })
        .collect::<Vec<_>>()
        .join(separator)
}

fn where_clause(expr: &Expr, joins: &mut JoinSet, binds: &mut Vec<Value>) -> String {
    match expr {
        Expr::All => String::new(),
        _ => format!(" WHERE {}", render_expr(expr, JoinKind::Inner, joins, binds)),
    }
}

fn order_clause(
    meta: &'static EntityMeta,
    sort: &Sort,
    joins: &mut JoinSet,
) -> RepoResult<String> {
    let mut keys = Vec::with_capacity(sort.orders().len() + 1);
    let mut ordered_by_id = false;
    for order in sort.orders() {
        let path = FieldPath::resolve(meta, &order.property)?;
        ordered_by_id |= path.relations.is_empty() && path.name == "id";
        let column = joins.column(&path, JoinKind::Left);
        keys.push(format!("{column} {}", order.direction.sql()));
    }
    if !ordered_by_id {
        keys.push(format!(
            "{ROOT_ALIAS}.{} {}",
            meta.id_column,
            Direction::Asc.sql()
        ));
    }
    Ok(format!(" ORDER BY {}", keys.join(", ")))
}

fn window_clause(window: Option<Window>, binds: &mut Vec<Value>) -> String {
    match window {
        None => String::new(),
        Some(window) => {
            binds.push(Value::Integer(i64::try_from(window.limit).unwrap_or(i64::MAX)));
            binds.push(Value::Integer(i64::try_from(window.offset).unwrap_or(i64::MAX)));
            " LIMIT ? OFFSET ?".to_string()
        }
    }
}

/// Full-entity select with fetch joins, sort and optional window.
pub fn compile_select<E: Entity>(query: &Query<E>, window: Option<Window>) -> RepoResult<CompiledSql> {
    let meta = E::meta();
    let mut joins = JoinSet::default();
    let mut binds = Vec::new();

    let filter = where_clause(query.predicate().expr(), &mut joins, &mut binds);

    let mut columns: Vec<String> = meta
        .read_columns()
        .into_iter()
        .map(|column| format!("{ROOT_ALIAS}.{column} AS \"{column}\""))
        .collect();
    let mut fetched: Vec<String> = Vec::new();
    for path in query.fetch_paths() {
        for depth in 1..=path.len() {
            let key = relation_key(&path[..depth]);
            if fetched.contains(&key) {
                continue;
            }
            let alias = joins.alias_for(&path[..depth], JoinKind::Left);
            columns.extend(
                path[depth - 1]
                    .target
                    .read_columns()
                    .into_iter()
                    .map(|column| format!("{alias}.{column} AS \"{key}.{column}\"")),
            );
            fetched.push(key);
        }
    }

    let order = order_clause(meta, query.sort(), &mut joins)?;
    let mut sql = format!(
        "SELECT {} FROM {} {ROOT_ALIAS}{}{filter}{order}",
        columns.join(", "),
        meta.table,
        joins.render(),
    );
    sql.push_str(&window_clause(window, &mut binds));
    Ok(CompiledSql { sql, binds })
}

/// `COUNT(*)` over the predicate alone.
pub fn compile_count<E: Entity>(predicate: &Predicate<E>) -> CompiledSql {
    let mut joins = JoinSet::default();
    let mut binds = Vec::new();
    let filter = where_clause(predicate.expr(), &mut joins, &mut binds);
    render_count(E::meta(), &joins, &filter, binds)
}

/// `COUNT(*)` over the predicate with `required` relations inner joined,
/// matching the rows [`compile_projection`] returns for the same inputs.
pub fn compile_count_with<E: Entity>(
    predicate: &Predicate<E>,
    required: &[&str],
) -> RepoResult<CompiledSql> {
    let meta = E::meta();
    let mut joins = JoinSet::default();
    let mut binds = Vec::new();
    let filter = where_clause(predicate.expr(), &mut joins, &mut binds);
    for relation in required {
        let path = resolve_relation_path(meta, relation)?;
        joins.alias_for(&path, JoinKind::Inner);
    }
    Ok(render_count(meta, &joins, &filter, binds))
}

fn render_count(
    meta: &'static EntityMeta,
    joins: &JoinSet,
    filter: &str,
    binds: Vec<Value>,
) -> CompiledSql {
    CompiledSql {
        sql: format!(
            "SELECT COUNT(*) FROM {} {ROOT_ALIAS}{}{filter}",
            meta.table,
            joins.render()
        ),
        binds,
    }
}

/// Identifiers of the rows matching the predicate, for use as a subquery.
pub fn compile_matching_ids<E: Entity>(predicate: &Predicate<E>) -> CompiledSql {
    let meta = E::meta();
    let mut joins = JoinSet::default();
    let mut binds = Vec::new();
    let filter = where_clause(predicate.expr(), &mut joins, &mut binds);
    CompiledSql {
        sql: format!(
            "SELECT {ROOT_ALIAS}.{} FROM {} {ROOT_ALIAS}{}{filter}",
            meta.id_column,
            meta.table,
            joins.render()
        ),
        binds,
    }
}

/// Select of named paths, each aliased by its path (`"team.name"`).
///
/// Relations in `required` are inner joined; other relations reached by a
/// column are left joined.
pub fn compile_projection<E: Entity>(
    predicate: &Predicate<E>,
    sort: &Sort,
    columns: &[&str],
    required: &[&str],
    window: Option<Window>,
) -> RepoResult<CompiledSql> {
    let meta = E::meta();
    let mut joins = JoinSet::default();
    let mut binds = Vec::new();

    let filter = where_clause(predicate.expr(), &mut joins, &mut binds);
    for relation in required {
        let path = resolve_relation_path(meta, relation)?;
        joins.alias_for(&path, JoinKind::Inner);
    }
    let selected = columns
        .iter()
        .map(|name| {
            let path = FieldPath::resolve(meta, name)?;
            Ok(format!("{} AS \"{name}\"", joins.column(&path, JoinKind::Left)))
        })
        .collect::<RepoResult<Vec<_>>>()?;

    let order = order_clause(meta, sort, &mut joins)?;
    let mut sql = format!(
        "SELECT {} FROM {} {ROOT_ALIAS}{}{filter}{order}",
        selected.join(", "),
        meta.table,
        joins.render(),
    );
    sql.push_str(&window_clause(window, &mut binds));
    Ok(CompiledSql { sql, binds })
}

#[cfg(test)]
mod tests {
    use super::{
        compile_count, compile_count_with, compile_projection, compile_select, JoinKind, JoinSet,
    };
    use crate::model::member::{Member, MEMBER_META};
    use crate::query::page::Window;
    use crate::query::predicate::{resolve_relation_path, CompareOp, Predicate};
    use crate::query::sort::Sort;
    use crate::query::Query;
    use rusqlite::types::Value;

    fn team_name(name: &str) -> Predicate<Member> {
        Predicate::by_relation_field("team", "name", name.to_string()).unwrap()
    }

    #[test]
    fn join_cache_reuses_and_upgrades_one_join() {
        let path = resolve_relation_path(&MEMBER_META, "team").unwrap();
        let mut joins = JoinSet::default();
        assert_eq!(joins.alias_for(&path, JoinKind::Left), "j1");
        assert_eq!(joins.alias_for(&path, JoinKind::Inner), "j1");
        assert_eq!(joins.alias_for(&path, JoinKind::Left), "j1");
        assert_eq!(joins.len(), 1);
        assert_eq!(
            joins.render(),
            " INNER JOIN team j1 ON j1.team_id = e.team_id"
        );
    }

    #[test]
    fn predicate_sort_and_fetch_share_one_inner_join() {
        let query = Query::filter(team_name("teamA"))
            .sorted(Sort::desc("team.name"))
            .fetch("team")
            .unwrap();
        let compiled = compile_select(&query, None).unwrap();
        assert_eq!(compiled.sql.matches("JOIN team").count(), 1);
        assert!(compiled.sql.contains(" INNER JOIN team j1 ON j1.team_id = e.team_id"));
        assert!(compiled.sql.contains("j1.name AS \"team.name\""));
        assert!(compiled
            .sql
            .ends_with(" WHERE j1.name = ? ORDER BY j1.name DESC, e.member_id ASC"));
        assert_eq!(compiled.binds, vec![Value::Text("teamA".to_string())]);
    }

    #[test]
    fn sort_only_relation_is_left_joined() {
        let query = Query::<Member>::all().sorted(Sort::asc("team.name"));
        let compiled = compile_select(&query, None).unwrap();
        assert!(compiled.sql.contains(" LEFT JOIN team j1"));
        assert!(!compiled.sql.contains("WHERE"));
    }

    #[test]
    fn identifier_tiebreak_is_not_repeated() {
        let query = Query::<Member>::all().sorted(Sort::desc("id"));
        let compiled = compile_select(&query, Some(Window { offset: 3, limit: 3 })).unwrap();
        assert!(compiled.sql.ends_with(" ORDER BY e.member_id DESC LIMIT ? OFFSET ?"));
        assert_eq!(compiled.binds, vec![Value::Integer(3), Value::Integer(3)]);
    }

    #[test]
    fn count_ignores_sort_and_fetch_joins() {
        let vacuous = compile_count(&Predicate::<Member>::all());
        assert_eq!(vacuous.sql, "SELECT COUNT(*) FROM member e");

        let filtered = compile_count(&team_name("teamA"));
        assert_eq!(
            filtered.sql,
            "SELECT COUNT(*) FROM member e INNER JOIN team j1 ON j1.team_id = e.team_id WHERE j1.name = ?"
        );
    }

    #[test]
    fn nested_boolean_groups_are_parenthesized() {
        let predicate = Predicate::<Member>::compare("age", CompareOp::Ge, 20)
            .unwrap()
            .and(
                Predicate::by_field("username", "a".to_string())
                    .unwrap()
                    .or(Predicate::by_field("username", "b".to_string()).unwrap()),
            );
        let compiled = compile_count(&predicate);
        assert!(compiled
            .sql
            .ends_with(" WHERE e.age >= ? AND (e.username = ? OR e.username = ?)"));
        assert_eq!(compiled.binds.len(), 3);
    }

    #[test]
    fn relation_under_disjunction_is_left_joined() {
        let predicate = team_name("teamB").or(Predicate::compare("age", CompareOp::Gt, 20).unwrap());
        assert_eq!(
            compile_count(&predicate).sql,
            "SELECT COUNT(*) FROM member e LEFT JOIN team j1 ON j1.team_id = e.team_id \
             WHERE j1.name = ? OR e.age > ?"
        );

        let required = team_name("teamA").and(predicate);
        assert!(compile_count(&required).sql.contains(" INNER JOIN team j1"));
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let predicate = Predicate::<Member>::in_values("username", Vec::<String>::new()).unwrap();
        assert!(compile_count(&predicate).sql.ends_with(" WHERE 0 = 1"));
    }

    #[test]
    fn relation_identifier_reads_the_join_column() {
        let predicate = Predicate::<Member>::is_null("team.id").unwrap();
        assert_eq!(
            compile_count(&predicate).sql,
            "SELECT COUNT(*) FROM member e WHERE e.team_id IS NULL"
        );
    }

    #[test]
    fn projection_required_relation_is_inner_joined() {
        let compiled = compile_projection(
            &Predicate::<Member>::all(),
            &Sort::unsorted(),
            &["id", "username", "team.name"],
            &["team"],
            None,
        )
        .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT e.member_id AS \"id\", e.username AS \"username\", j1.name AS \"team.name\" \
             FROM member e INNER JOIN team j1 ON j1.team_id = e.team_id ORDER BY e.member_id ASC"
        );
    }

    #[test]
    fn projection_count_keeps_required_inner_joins() {
        let all = Predicate::<Member>::all();
        assert_eq!(
            compile_count_with(&all, &["team"]).unwrap().sql,
            "SELECT COUNT(*) FROM member e INNER JOIN team j1 ON j1.team_id = e.team_id"
        );
        assert_eq!(compile_count_with(&all, &[]).unwrap(), compile_count(&all));

        let filtered = compile_count_with(&team_name("teamA"), &["team"]).unwrap();
        assert_eq!(filtered.sql.matches("JOIN team").count(), 1);
        assert!(compile_count_with(&all, &["club"]).is_err());
    }

    #[test]
    fn unknown_sort_property_is_rejected() {
        let query = Query::<Member>::all().sorted(Sort::asc("nickname"));
        assert!(compile_select(&query, None).is_err());
    }
}
