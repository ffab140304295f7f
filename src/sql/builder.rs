//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE from a planned query.

use crate::config::{ColumnInfo, RelationKind, RelationSpec, ResolvedEntity, ResolvedModel};
use crate::query::ComparisonOp;
use crate::store::{count_key, parse_direction, selects_all, PlannedQuery, QueryCall, MAX_ROWS};
use serde_json::{Map, Value};

const MAIN_ALIAS: &str = "main";

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn qualified_table(entity: &ResolvedEntity) -> String {
    format!("{}.{}", quoted(&entity.schema_name), quoted(&entity.table_name))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// `$n::type` when the column type is declared, plain `$n` otherwise.
    fn placeholder(&mut self, entity: &ResolvedEntity, column: &str, v: Value) -> String {
        let n = self.push_param(v);
        match entity.column(column) {
            Some(c) => format!("${}::{}", n, c.pg_type),
            None => format!("${}", n),
        }
    }
}

/// Left-hand side of a comparison. Undeclared columns compare as text.
fn column_ref(entity: &ResolvedEntity, alias: &str, column: &str) -> String {
    match entity.column(column) {
        Some(_) => format!("{}.{}", alias, quoted(column)),
        None => format!("{}.{}::text", alias, quoted(column)),
    }
}

/// Custom enum (schema.typename) and numeric come back as text so the row decoder sees a String.
fn select_expr(alias: &str, name: &str, info: Option<&ColumnInfo>) -> String {
    let q = quoted(name);
    let pg_type = info.map(|c| c.pg_type.as_str()).unwrap_or("");
    if pg_type.contains('.') || pg_type == "numeric" {
        format!("{}.{}::text AS {}", alias, q, q)
    } else {
        format!("{}.{} AS {}", alias, q, q)
    }
}

fn projection(entity: &ResolvedEntity, alias: &str, columns: &[&str]) -> Vec<String> {
    if !selects_all(columns) {
        return columns.iter().map(|c| select_expr(alias, c, entity.column(c))).collect();
    }
    if entity.columns.is_empty() {
        return vec![format!("{}.*", alias)];
    }
    entity
        .columns
        .iter()
        .map(|c| select_expr(alias, &c.name, Some(c)))
        .collect()
}

fn where_clause(q: &mut QueryBuf, entity: &ResolvedEntity, alias: &str, query: &PlannedQuery) -> String {
    let mut parts = Vec::new();
    for call in query.filters() {
        match call {
            QueryCall::Where { column, op, value } if value.is_null() && *op == ComparisonOp::Eq => {
                parts.push(format!("{}.{} IS NULL", alias, quoted(column)));
            }
            QueryCall::Where { column, op, value } if value.is_null() && *op == ComparisonOp::NotEq => {
                parts.push(format!("{}.{} IS NOT NULL", alias, quoted(column)));
            }
            QueryCall::Where {
                column,
                op: ComparisonOp::Like,
                value,
            } => {
                let n = q.push_param(value.clone());
                parts.push(format!("{}.{}::text LIKE ${}", alias, quoted(column), n));
            }
            QueryCall::Where { column, op, value } => {
                let lhs = column_ref(entity, alias, column);
                let ph = q.placeholder(entity, column, value.clone());
                parts.push(format!("{} {} {}", lhs, op.as_sql(), ph));
            }
            QueryCall::WhereIn { values, negated, .. } if values.is_empty() => {
                parts.push(if *negated { "TRUE".into() } else { "FALSE".into() });
            }
            QueryCall::WhereIn {
                column,
                values,
                negated,
            } => {
                let lhs = column_ref(entity, alias, column);
                let phs: Vec<String> = values
                    .iter()
                    .map(|v| q.placeholder(entity, column, v.clone()))
                    .collect();
                let not = if *negated { "NOT " } else { "" };
                parts.push(format!("{} {}IN ({})", lhs, not, phs.join(", ")));
            }
            QueryCall::WhereNull { column, is_null } => {
                let not = if *is_null { "" } else { "NOT " };
                parts.push(format!("{}.{} IS {}NULL", alias, quoted(column), not));
            }
            _ => {}
        }
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// Valid directions only; falls back to primary key order so pages are stable.
fn order_clause(entity: &ResolvedEntity, alias: &str, query: &PlannedQuery) -> String {
    let mut parts: Vec<String> = query
        .orders()
        .filter_map(|(column, direction)| {
            parse_direction(direction).map(|desc| {
                format!("{}.{} {}", alias, quoted(column), if desc { "DESC" } else { "ASC" })
            })
        })
        .collect();
    if parts.is_empty() {
        parts.push(format!("{}.{}", alias, quoted(&entity.primary_key)));
    }
    format!(" ORDER BY {}", parts.join(", "))
}

struct RelationNode<'a> {
    relation: &'a RelationSpec,
    target: &'a ResolvedEntity,
    children: Vec<RelationNode<'a>>,
}

/// Merge dotted paths into a tree so `comments` and `comments.user` share one subquery.
fn relation_tree<'a>(model: &'a ResolvedModel, entity: &'a ResolvedEntity, paths: &[&str]) -> Vec<RelationNode<'a>> {
    let mut roots: Vec<RelationNode<'a>> = Vec::new();
    for path in paths {
        let Some(chain) = model.relation_chain(entity, path) else {
            tracing::warn!(entity = %entity.id, relation = %path, "unknown relation, not loaded");
            continue;
        };
        let mut level = &mut roots;
        for (relation, target) in chain {
            let idx = match level.iter().position(|n| n.relation.name == relation.name) {
                Some(i) => i,
                None => {
                    level.push(RelationNode {
                        relation,
                        target,
                        children: Vec::new(),
                    });
                    level.len() - 1
                }
            };
            level = &mut level[idx].children;
        }
    }
    roots
}

/// Scalar subquery: row_to_json for to_one, json_agg for to_many. Sensitive columns are left out.
fn relation_subquery(node: &RelationNode<'_>, parent_alias: &str, counter: &mut usize) -> String {
    *counter += 1;
    let alias = format!("r{}", counter);
    let target = node.target;
    let mut cols: Vec<String> = if target.columns.is_empty() {
        vec![format!("{}.*", alias)]
    } else {
        target
            .columns
            .iter()
            .filter(|c| !target.sensitive_columns.contains(&c.name))
            .map(|c| select_expr(&alias, &c.name, Some(c)))
            .collect()
    };
    for child in &node.children {
        let sub = relation_subquery(child, &alias, counter);
        cols.push(format!("{} AS {}", sub, quoted(&child.relation.name)));
    }
    let from = format!(
        "{} {} WHERE {}.{} = {}.{}",
        qualified_table(target),
        alias,
        alias,
        quoted(&node.relation.foreign_key),
        parent_alias,
        quoted(&node.relation.local_key)
    );
    match node.relation.kind {
        RelationKind::ToOne => format!(
            "(SELECT row_to_json(sub) FROM (SELECT {} FROM {} LIMIT 1) sub)",
            cols.join(", "),
            from
        ),
        RelationKind::ToMany => format!(
            "(SELECT COALESCE(json_agg(row_to_json(sub)), '[]'::json) FROM (SELECT {} FROM {} ORDER BY {}.{}) sub)",
            cols.join(", "),
            from,
            alias,
            quoted(&target.primary_key)
        ),
    }
}

fn count_subquery(model: &ResolvedModel, entity: &ResolvedEntity, name: &str, counter: &mut usize) -> Option<String> {
    let relation = entity.relation(name)?;
    let target = model.entity(&relation.target)?;
    *counter += 1;
    let alias = format!("c{}", counter);
    Some(format!(
        "(SELECT COUNT(*) FROM {} {} WHERE {}.{} = {}.{}) AS {}",
        qualified_table(target),
        alias,
        alias,
        quoted(&relation.foreign_key),
        MAIN_ALIAS,
        quoted(&relation.local_key),
        quoted(&count_key(name))
    ))
}

/// SELECT for a planned query. `page` is `(limit, offset)` and overrides the query's own limit.
pub fn select(model: &ResolvedModel, query: &PlannedQuery, columns: &[&str], page: Option<(u64, u64)>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let entity = query.entity.as_ref();

    let mut select_parts = projection(entity, MAIN_ALIAS, columns);
    let mut counter = 0usize;
    for node in relation_tree(model, entity, &query.relations()) {
        let sub = relation_subquery(&node, MAIN_ALIAS, &mut counter);
        select_parts.push(format!("{} AS {}", sub, quoted(&node.relation.name)));
    }
    for name in query.counts() {
        match count_subquery(model, entity, name, &mut counter) {
            Some(sub) => select_parts.push(sub),
            None => tracing::warn!(entity = %entity.id, aggregate = %name, "unknown aggregate, not counted"),
        }
    }

    let where_part = where_clause(&mut q, entity, MAIN_ALIAS, query);
    let order_part = order_clause(entity, MAIN_ALIAS, query);
    let (limit, offset) = match page {
        Some((limit, offset)) => (Some(limit), Some(offset)),
        None => (query.limit(), None),
    };
    let limit_part = limit.map(|n| format!(" LIMIT {}", n.min(MAX_ROWS))).unwrap_or_default();
    let offset_part = offset
        .filter(|n| *n > 0)
        .map(|n| format!(" OFFSET {}", n.min(MAX_ROWS)))
        .unwrap_or_default();

    q.sql = format!(
        "SELECT {} FROM {} {}{}{}{}{}",
        select_parts.join(", "),
        qualified_table(entity),
        MAIN_ALIAS,
        where_part,
        order_part,
        limit_part,
        offset_part
    );
    q
}

/// COUNT(*) over the query's filters. Sorts, loads and limit do not apply.
pub fn count(query: &PlannedQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let entity = query.entity.as_ref();
    let where_part = where_clause(&mut q, entity, MAIN_ALIAS, query);
    q.sql = format!(
        "SELECT COUNT(*) AS \"count\" FROM {} {}{}",
        qualified_table(entity),
        MAIN_ALIAS,
        where_part
    );
    q
}

/// DELETE matching rows. A limit goes through a primary key subquery since DELETE has no LIMIT.
pub fn delete(query: &PlannedQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let entity = query.entity.as_ref();
    let table = qualified_table(entity);
    let where_part = where_clause(&mut q, entity, MAIN_ALIAS, query);
    q.sql = match query.limit() {
        Some(limit) => {
            let pk = quoted(&entity.primary_key);
            let order_part = order_clause(entity, MAIN_ALIAS, query);
            format!(
                "DELETE FROM {} WHERE {} IN (SELECT {}.{} FROM {} {}{}{} LIMIT {})",
                table,
                pk,
                MAIN_ALIAS,
                pk,
                table,
                MAIN_ALIAS,
                where_part,
                order_part,
                limit.min(MAX_ROWS)
            )
        }
        None => format!("DELETE FROM {} AS {}{}", table, MAIN_ALIAS, where_part),
    };
    q
}

/// Columns written from `data`: declared columns only, or every key when none are declared.
fn writable<'d>(entity: &ResolvedEntity, data: &'d Map<String, Value>) -> Vec<(&'d String, &'d Value)> {
    data.iter()
        .filter(|(k, _)| entity.columns.is_empty() || entity.column(k).is_some())
        .collect()
}

/// INSERT one row. Absent columns take their database default; timestamps are set to NOW().
pub fn insert(entity: &ResolvedEntity, data: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(entity);
    let mut cols = Vec::new();
    let mut values = Vec::new();
    for (name, value) in writable(entity, data) {
        values.push(q.placeholder(entity, name, value.clone()));
        cols.push(quoted(name));
    }
    for ts in [&entity.created_at, &entity.updated_at] {
        if entity.column(ts).is_some() && !data.contains_key(ts.as_str()) {
            cols.push(quoted(ts));
            values.push("NOW()".into());
        }
    }
    let returning = projection(entity, MAIN_ALIAS, &[]).join(", ");
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} AS {} DEFAULT VALUES RETURNING {}", table, MAIN_ALIAS, returning)
    } else {
        format!(
            "INSERT INTO {} AS {} ({}) VALUES ({}) RETURNING {}",
            table,
            MAIN_ALIAS,
            cols.join(", "),
            values.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by primary key. `touch` sets the update timestamp to NOW() unless `data` carries it.
/// With nothing to set this degrades to a SELECT of the row.
pub fn update(entity: &ResolvedEntity, id: &Value, data: &Map<String, Value>, touch: bool) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(entity);
    let pk = &entity.primary_key;
    let mut sets = Vec::new();
    for (name, value) in writable(entity, data) {
        if name == pk {
            continue;
        }
        let rhs = q.placeholder(entity, name, value.clone());
        sets.push(format!("{} = {}", quoted(name), rhs));
    }
    if touch && entity.column(&entity.updated_at).is_some() && !data.contains_key(entity.updated_at.as_str()) {
        sets.push(format!("{} = NOW()", quoted(&entity.updated_at)));
    }
    let returning = projection(entity, MAIN_ALIAS, &[]).join(", ");
    let id_ph = q.placeholder(entity, pk, id.clone());
    q.sql = if sets.is_empty() {
        format!(
            "SELECT {} FROM {} {} WHERE {}.{} = {}",
            returning,
            table,
            MAIN_ALIAS,
            MAIN_ALIAS,
            quoted(pk),
            id_ph
        )
    } else {
        format!(
            "UPDATE {} AS {} SET {} WHERE {}.{} = {} RETURNING {}",
            table,
            MAIN_ALIAS,
            sets.join(", "),
            MAIN_ALIAS,
            quoted(pk),
            id_ph,
            returning
        )
    };
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_config, resolve};
    use crate::query::QueryHandle;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    const ENTITIES: &str = r#"[
        {"id": "users", "table": "users", "path_segment": "users",
         "columns": [{"name": "id", "type": "bigserial"}, {"name": "name", "type": "text"},
                     {"name": "password", "type": "text"}],
         "sensitive_columns": ["password"]},
        {"id": "posts", "schema": "blog", "table": "posts", "path_segment": "posts",
         "columns": [{"name": "id", "type": "bigserial"}, {"name": "title", "type": "text"},
                     {"name": "status", "type": "text"}, {"name": "created_by", "type": "bigint"},
                     {"name": "score", "type": "numeric"}],
         "aggregates": ["comments"]},
        {"id": "comments", "table": "comments", "path_segment": "comments",
         "columns": [{"name": "id", "type": "bigserial"}, {"name": "post_id", "type": "bigint"},
                     {"name": "user_id", "type": "bigint"}]}
    ]"#;

    const RELATIONS: &str = r#"[
        {"id": "r1", "name": "createdByUser", "from_entity_id": "posts", "to_entity_id": "users",
         "kind": "to_one", "local_key": "created_by", "foreign_key": "id"},
        {"id": "r2", "name": "comments", "from_entity_id": "posts", "to_entity_id": "comments",
         "kind": "to_many", "local_key": "id", "foreign_key": "post_id"},
        {"id": "r3", "name": "user", "from_entity_id": "comments", "to_entity_id": "users",
         "kind": "to_one", "local_key": "user_id", "foreign_key": "id"}
    ]"#;

    fn model() -> ResolvedModel {
        resolve(&parse_config(ENTITIES, RELATIONS).unwrap()).unwrap()
    }

    fn posts(model: &ResolvedModel) -> PlannedQuery {
        PlannedQuery::new(Arc::clone(model.entity("posts").unwrap()))
    }

    #[test]
    fn test_select_filters_cast_to_declared_types() {
        let model = model();
        let query = posts(&model)
            .order_by("id", "desc")
            .where_op("status", ComparisonOp::NotEq, json!("draft"))
            .where_op("title", ComparisonOp::Like, json!("%Jo%"))
            .where_in("created_by", vec![json!("1"), json!("2")]);
        let q = select(&model, &query, &["id", "title"], None);
        assert_eq!(
            q.sql,
            "SELECT main.\"id\" AS \"id\", main.\"title\" AS \"title\" FROM \"blog\".\"posts\" main \
             WHERE main.\"status\" != $1::text AND main.\"title\"::text LIKE $2 \
             AND main.\"created_by\" IN ($3::bigint, $4::bigint) ORDER BY main.\"id\" DESC"
        );
        assert_eq!(q.params, vec![json!("draft"), json!("%Jo%"), json!("1"), json!("2")]);
    }

    #[test]
    fn test_select_skips_bad_direction_and_falls_back_to_pk() {
        let model = model();
        let query = posts(&model).order_by("title", "sideways");
        let q = select(&model, &query, &["id"], Some((25, 50)));
        assert!(q.sql.ends_with("ORDER BY main.\"id\" LIMIT 25 OFFSET 50"), "{}", q.sql);
    }

    #[test]
    fn test_select_caps_limit_and_offset_at_bigint() {
        let model = model();
        let q = select(&model, &posts(&model), &["id"], Some((u64::MAX, u64::MAX)));
        assert!(
            q.sql.ends_with(&format!("LIMIT {} OFFSET {}", i64::MAX, i64::MAX)),
            "{}",
            q.sql
        );
        let q = select(&model, &posts(&model).take(u64::MAX), &["id"], None);
        assert!(q.sql.ends_with(&format!("LIMIT {}", i64::MAX)), "{}", q.sql);
    }

    #[test]
    fn test_empty_in_lists() {
        let model = model();
        let query = posts(&model).where_in("id", vec![]).where_not_in("status", vec![]);
        let q = count(&query);
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) AS \"count\" FROM \"blog\".\"posts\" main WHERE FALSE AND TRUE"
        );
    }

    #[test]
    fn test_numeric_selected_as_text() {
        let model = model();
        let q = select(&model, &posts(&model), &["score"], None);
        assert!(q.sql.starts_with("SELECT main.\"score\"::text AS \"score\" FROM"), "{}", q.sql);
    }

    #[test]
    fn test_nested_relations_share_subquery() {
        let model = model();
        let query = posts(&model)
            .with("comments")
            .with("comments.user")
            .with("createdByUser")
            .with("ghost")
            .with_count("comments");
        let q = select(&model, &query, &["id"], None);
        assert_eq!(q.sql.matches("AS \"comments\"").count(), 1);
        assert!(q.sql.contains("json_agg(row_to_json(sub))"));
        assert!(q.sql.contains("AS \"user\""));
        assert!(q.sql.contains("AS \"createdByUser\""));
        assert!(!q.sql.contains("ghost"));
        assert!(!q.sql.contains("\"password\""));
        assert!(q.sql.contains("AS \"comments_count\""));
    }

    #[test]
    fn test_delete_with_limit_uses_pk_subquery() {
        let model = model();
        let query = posts(&model).where_op("status", ComparisonOp::Eq, json!("draft")).take(2);
        let q = delete(&query);
        assert_eq!(
            q.sql,
            "DELETE FROM \"blog\".\"posts\" WHERE \"id\" IN (SELECT main.\"id\" FROM \"blog\".\"posts\" main \
             WHERE main.\"status\" = $1::text ORDER BY main.\"id\" LIMIT 2)"
        );
    }

    #[test]
    fn test_where_null_value_renders_is_null() {
        let model = model();
        let query = posts(&model).where_op("status", ComparisonOp::Eq, Value::Null);
        let q = delete(&query);
        assert_eq!(q.sql, "DELETE FROM \"blog\".\"posts\" AS main WHERE main.\"status\" IS NULL");
        assert!(q.params.is_empty());
    }

    #[test]
    fn test_insert_ignores_unknown_keys_and_sets_timestamps() {
        let model = model();
        let entity = model.entity("posts").unwrap();
        let data = json!({"title": "Hello", "bogus": 1}).as_object().cloned().unwrap();
        let q = insert(entity, &data);
        assert!(
            q.sql.starts_with(
                "INSERT INTO \"blog\".\"posts\" AS main (\"title\", \"created_at\", \"updated_at\") \
                 VALUES ($1::text, NOW(), NOW()) RETURNING"
            ),
            "{}",
            q.sql
        );
        assert_eq!(q.params, vec![json!("Hello")]);
    }

    #[test]
    fn test_update_touch_and_pk_param() {
        let model = model();
        let entity = model.entity("posts").unwrap();
        let data = json!({"id": 9, "title": "New"}).as_object().cloned().unwrap();
        let q = update(entity, &json!(5), &data, true);
        assert!(
            q.sql.starts_with(
                "UPDATE \"blog\".\"posts\" AS main SET \"title\" = $1::text, \"updated_at\" = NOW() \
                 WHERE main.\"id\" = $2::bigint RETURNING"
            ),
            "{}",
            q.sql
        );
        let q = update(entity, &json!(5), &Map::new(), false);
        assert!(q.sql.starts_with("SELECT "));
        assert_eq!(q.params, vec![json!(5)]);
    }
}
