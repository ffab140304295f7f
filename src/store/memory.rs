//! In-process backend. Evaluates planned queries over JSON rows; used for running without a
//! database and, built with `MemoryStorage::recording`, by tests that assert executed plans.

use crate::config::{RelationKind, ResolvedEntity, ResolvedModel};
use crate::error::AppError;
use crate::query::ComparisonOp;
use crate::store::{count_key, parse_direction, selects_all, Page, PlannedQuery, QueryCall, Storage};
use async_trait::async_trait;
use indexmap::IndexMap;
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Row = Map<String, Value>;

/// One terminal execution: which entity, which terminal and the calls made on the handle.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutedQuery {
    pub entity: String,
    pub terminal: &'static str,
    pub calls: Vec<QueryCall>,
}

#[derive(Default)]
struct Tables {
    rows: HashMap<String, Vec<Row>>,
    next_id: HashMap<String, i64>,
    executed: Vec<ExecutedQuery>,
}

#[derive(Clone)]
pub struct MemoryStorage {
    model: Arc<ResolvedModel>,
    tables: Arc<Mutex<Tables>>,
    record: bool,
}

impl MemoryStorage {
    /// Storage that keeps no history of executed plans.
    pub fn new(model: Arc<ResolvedModel>) -> Self {
        MemoryStorage {
            model,
            tables: Arc::new(Mutex::new(Tables::default())),
            record: false,
        }
    }

    /// Storage that records every executed plan, readable through `executed`.
    pub fn recording(model: Arc<ResolvedModel>) -> Self {
        MemoryStorage {
            record: true,
            ..Self::new(model)
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert rows as given (every key kept). Missing primary keys are generated.
    pub fn seed(&self, entity_id: &str, rows: impl IntoIterator<Item = Value>) -> Result<(), AppError> {
        let entity = self.entity(entity_id)?;
        let mut tables = self.lock();
        for row in rows {
            let Value::Object(mut row) = row else {
                return Err(AppError::BadRequest(format!("seed rows for {} must be objects", entity_id)));
            };
            assign_key(&mut tables, &entity, &mut row);
            tables.rows.entry(entity.id.clone()).or_default().push(row);
        }
        Ok(())
    }

    /// Current rows of an entity, in insertion order.
    pub fn rows(&self, entity_id: &str) -> Vec<Value> {
        self.lock()
            .rows
            .get(entity_id)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// Every plan executed so far, oldest first. Always empty unless built with `recording`.
    pub fn executed(&self) -> Vec<ExecutedQuery> {
        self.lock().executed.clone()
    }

    pub fn last_executed(&self) -> Option<ExecutedQuery> {
        self.lock().executed.last().cloned()
    }

    fn entity(&self, entity_id: &str) -> Result<Arc<ResolvedEntity>, AppError> {
        self.model
            .entity(entity_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("entity {}", entity_id)))
    }

    /// Filtered and sorted rows; limit not applied.
    fn matching(&self, tables: &mut Tables, terminal: &'static str, query: &PlannedQuery) -> Vec<Row> {
        if self.record {
            tables.executed.push(ExecutedQuery {
                entity: query.entity.id.clone(),
                terminal,
                calls: query.calls.clone(),
            });
        }
        let mut rows: Vec<Row> = tables
            .rows
            .get(&query.entity.id)
            .map(|rows| rows.iter().filter(|r| query.filters().all(|c| row_matches(r, c))).cloned().collect())
            .unwrap_or_default();
        sort_rows(&mut rows, &query.entity, query);
        rows
    }

    /// Project a row and attach eager loads and counts.
    fn render(&self, tables: &Tables, query: &PlannedQuery, row: &Row, columns: &[&str]) -> Value {
        let entity = query.entity.as_ref();
        let mut out = if selects_all(columns) {
            row.clone()
        } else {
            columns
                .iter()
                .map(|c| (c.to_string(), row.get(*c).cloned().unwrap_or(Value::Null)))
                .collect()
        };
        let paths: Vec<&str> = query
            .relations()
            .into_iter()
            .filter(|path| {
                let known = self.model.relation_chain(entity, path).is_some();
                if !known {
                    tracing::warn!(entity = %entity.id, relation = %path, "unknown relation, not loaded");
                }
                known
            })
            .collect();
        out.extend(self.related_values(tables, entity, row, &paths));
        for name in query.counts() {
            match self.related_rows(tables, entity, row, name) {
                Some(related) => {
                    out.insert(count_key(name), Value::from(related.len() as u64));
                }
                None => tracing::warn!(entity = %entity.id, aggregate = %name, "unknown aggregate, not counted"),
            }
        }
        Value::Object(out)
    }

    fn related_rows(&self, tables: &Tables, entity: &ResolvedEntity, row: &Row, name: &str) -> Option<Vec<Row>> {
        let relation = entity.relation(name)?;
        let target = self.model.entity(&relation.target)?;
        let key = row.get(&relation.local_key).cloned().unwrap_or(Value::Null);
        Some(load_related(tables, target, &relation.foreign_key, &key))
    }

    fn related_values(&self, tables: &Tables, entity: &ResolvedEntity, row: &Row, paths: &[&str]) -> Vec<(String, Value)> {
        let mut heads: IndexMap<&str, Vec<&str>> = IndexMap::new();
        for path in paths {
            let (head, rest) = match path.split_once('.') {
                Some((head, rest)) => (head, Some(rest)),
                None => (*path, None),
            };
            let nested = heads.entry(head).or_default();
            if let Some(rest) = rest {
                nested.push(rest);
            }
        }

        let mut out = Vec::new();
        for (head, nested) in heads {
            let (Some(relation), Some(mut related)) =
                (entity.relation(head), self.related_rows(tables, entity, row, head))
            else {
                continue;
            };
            let Some(target) = self.model.entity(&relation.target) else { continue };
            for r in related.iter_mut() {
                let children = self.related_values(tables, target, r, &nested);
                r.retain(|k, _| !target.sensitive_columns.contains(k));
                r.extend(children);
            }
            let value = match relation.kind {
                RelationKind::ToOne => related.into_iter().next().map(Value::Object).unwrap_or(Value::Null),
                RelationKind::ToMany => Value::Array(related.into_iter().map(Value::Object).collect()),
            };
            out.push((head.to_string(), value));
        }
        out
    }
}

/// Rows of `target` whose `foreign_key` equals `key`, in primary key order.
fn load_related(tables: &Tables, target: &ResolvedEntity, foreign_key: &str, key: &Value) -> Vec<Row> {
    let mut related: Vec<Row> = tables
        .rows
        .get(&target.id)
        .map(|rows| {
            rows.iter()
                .filter(|r| loose_eq(r.get(foreign_key), key))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    related.sort_by(|a, b| sort_cmp(field(a, &target.primary_key), field(b, &target.primary_key)));
    related
}

static NULL: Value = Value::Null;

fn field<'r>(row: &'r Row, column: &str) -> &'r Value {
    row.get(column).unwrap_or(&NULL)
}

/// Generate a primary key when missing; keep the counter ahead of explicit numeric keys.
fn assign_key(tables: &mut Tables, entity: &ResolvedEntity, row: &mut Row) {
    let pk = &entity.primary_key;
    let next = tables.next_id.entry(entity.id.clone()).or_insert(0);
    match row.get(pk) {
        Some(Value::Null) | None => {
            let key = match entity.pk_type {
                crate::config::PkType::Uuid => Value::String(uuid::Uuid::new_v4().to_string()),
                _ => {
                    *next += 1;
                    Value::from(*next)
                }
            };
            row.insert(pk.clone(), key);
        }
        Some(existing) => {
            if let Some(n) = as_f64(existing) {
                *next = (*next).max(n as i64);
            }
        }
    }
}

/// Defaults written as SQL calls (`now()`, `gen_random_uuid()`) belong to the database.
fn literal_default(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) if s.trim_end().ends_with(')') => None,
        other => Some(other.clone()),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// SQL-style comparison: NULL compares to nothing, numbers compare numerically, the rest as text.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => Some(text(a).cmp(&text(b))),
    }
}

fn loose_eq(a: Option<&Value>, b: &Value) -> bool {
    a.and_then(|a| compare(a, b)) == Some(Ordering::Equal)
}

/// NULLs sort last ascending, first descending.
fn sort_cmp(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => compare(a, b).unwrap_or(Ordering::Equal),
    }
}

fn like(value: &Value, pattern: &Value) -> bool {
    if value.is_null() {
        return false;
    }
    let mut re = String::from("(?s)^");
    for ch in text(pattern).chars() {
        match ch {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map(|re| re.is_match(&text(value))).unwrap_or(false)
}

fn row_matches(row: &Row, call: &QueryCall) -> bool {
    match call {
        QueryCall::Where { column, op, value } => {
            let cell = field(row, column);
            match op {
                ComparisonOp::Eq if value.is_null() => cell.is_null(),
                ComparisonOp::NotEq if value.is_null() => !cell.is_null(),
                ComparisonOp::Like => like(cell, value),
                ComparisonOp::Eq => compare(cell, value) == Some(Ordering::Equal),
                ComparisonOp::NotEq => matches!(compare(cell, value), Some(o) if o != Ordering::Equal),
                ComparisonOp::Gt => compare(cell, value) == Some(Ordering::Greater),
                ComparisonOp::Lt => compare(cell, value) == Some(Ordering::Less),
                ComparisonOp::Gte => matches!(compare(cell, value), Some(Ordering::Greater | Ordering::Equal)),
                ComparisonOp::Lte => matches!(compare(cell, value), Some(Ordering::Less | Ordering::Equal)),
            }
        }
        QueryCall::WhereIn { column, values, negated } => {
            let cell = field(row, column);
            if values.is_empty() {
                return *negated;
            }
            if cell.is_null() {
                return false;
            }
            values.iter().any(|v| loose_eq(Some(cell), v)) != *negated
        }
        QueryCall::WhereNull { column, is_null } => field(row, column).is_null() == *is_null,
        _ => true,
    }
}

fn sort_rows(rows: &mut [Row], entity: &ResolvedEntity, query: &PlannedQuery) {
    let mut orders: Vec<(&str, bool)> = query
        .orders()
        .filter_map(|(column, direction)| parse_direction(direction).map(|desc| (column, desc)))
        .collect();
    if orders.is_empty() {
        orders.push((entity.primary_key.as_str(), false));
    }
    rows.sort_by(|a, b| {
        orders
            .iter()
            .map(|(column, desc)| {
                let o = sort_cmp(field(a, column), field(b, column));
                if *desc {
                    o.reverse()
                } else {
                    o
                }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, query: PlannedQuery, columns: &[&str]) -> Result<Vec<Value>, AppError> {
        let mut tables = self.lock();
        let mut rows = self.matching(&mut tables, "get", &query);
        if let Some(limit) = query.limit() {
            rows.truncate(limit as usize);
        }
        Ok(rows.iter().map(|r| self.render(&tables, &query, r, columns)).collect())
    }

    async fn paginate(
        &self,
        query: PlannedQuery,
        columns: &[&str],
        per_page: u64,
        page: u64,
    ) -> Result<Page<Value>, AppError> {
        let mut tables = self.lock();
        let rows = self.matching(&mut tables, "paginate", &query);
        let total = rows.len() as u64;
        let data = rows
            .iter()
            .skip(Page::<Value>::offset(per_page, page) as usize)
            .take(per_page.max(1) as usize)
            .map(|r| self.render(&tables, &query, r, columns))
            .collect();
        Ok(Page::new(data, total, per_page, page.max(1)))
    }

    async fn count(&self, query: PlannedQuery) -> Result<u64, AppError> {
        let mut tables = self.lock();
        Ok(self.matching(&mut tables, "count", &query).len() as u64)
    }

    async fn delete(&self, query: PlannedQuery) -> Result<u64, AppError> {
        let mut tables = self.lock();
        let mut doomed = self.matching(&mut tables, "delete", &query);
        if let Some(limit) = query.limit() {
            doomed.truncate(limit as usize);
        }
        let pk = &query.entity.primary_key;
        let keys: Vec<Value> = doomed.iter().map(|r| field(r, pk).clone()).collect();
        if let Some(rows) = tables.rows.get_mut(&query.entity.id) {
            rows.retain(|r| !keys.iter().any(|k| loose_eq(r.get(pk), k)));
        }
        Ok(keys.len() as u64)
    }

    async fn insert(&self, entity: &ResolvedEntity, data: &Map<String, Value>) -> Result<Value, AppError> {
        let mut row = Row::new();
        for c in &entity.columns {
            if c.name == entity.primary_key {
                continue;
            }
            let default = c.default.as_ref().and_then(literal_default).unwrap_or(Value::Null);
            row.insert(c.name.clone(), default);
        }
        for (k, v) in data {
            if entity.columns.is_empty() || entity.column(k).is_some() {
                row.insert(k.clone(), v.clone());
            }
        }
        let now = chrono::Utc::now().to_rfc3339();
        for ts in [&entity.created_at, &entity.updated_at] {
            if entity.column(ts).is_some() && !data.contains_key(ts.as_str()) {
                row.insert(ts.clone(), Value::String(now.clone()));
            }
        }

        let mut tables = self.lock();
        assign_key(&mut tables, entity, &mut row);
        tables.rows.entry(entity.id.clone()).or_default().push(row.clone());
        Ok(Value::Object(row))
    }

    async fn update_by_key(
        &self,
        entity: &ResolvedEntity,
        id: &Value,
        data: &Map<String, Value>,
        touch: bool,
    ) -> Result<Option<Value>, AppError> {
        let mut tables = self.lock();
        let Some(rows) = tables.rows.get_mut(&entity.id) else {
            return Ok(None);
        };
        let pk = &entity.primary_key;
        let Some(row) = rows.iter_mut().find(|r| loose_eq(r.get(pk), id)) else {
            return Ok(None);
        };
        for (k, v) in data {
            if k != pk && (entity.columns.is_empty() || entity.column(k).is_some()) {
                row.insert(k.clone(), v.clone());
            }
        }
        if touch && entity.column(&entity.updated_at).is_some() && !data.contains_key(entity.updated_at.as_str()) {
            row.insert(entity.updated_at.clone(), Value::String(chrono::Utc::now().to_rfc3339()));
        }
        Ok(Some(Value::Object(row.clone())))
    }
}
