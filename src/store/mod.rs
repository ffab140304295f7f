//! Storage backends. A query handle records the calls made on it; backends execute the
//! recorded plan at a terminal call.

pub mod memory;
pub mod postgres;

use crate::config::ResolvedEntity;
use crate::error::AppError;
use crate::query::{ComparisonOp, QueryHandle};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

/// One builder call on a query handle, in the order it was made.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryCall {
    Where { column: String, op: ComparisonOp, value: Value },
    WhereIn { column: String, values: Vec<Value>, negated: bool },
    WhereNull { column: String, is_null: bool },
    OrderBy { column: String, direction: String },
    With(String),
    WithCount(String),
    Take(u64),
}

/// Fresh query handle for one entity.
#[derive(Clone, Debug)]
pub struct PlannedQuery {
    pub entity: Arc<ResolvedEntity>,
    pub calls: Vec<QueryCall>,
}

impl PlannedQuery {
    pub fn new(entity: Arc<ResolvedEntity>) -> Self {
        PlannedQuery {
            entity,
            calls: Vec::new(),
        }
    }

    pub fn filters(&self) -> impl Iterator<Item = &QueryCall> {
        self.calls.iter().filter(|c| {
            matches!(
                c,
                QueryCall::Where { .. } | QueryCall::WhereIn { .. } | QueryCall::WhereNull { .. }
            )
        })
    }

    pub fn orders(&self) -> impl Iterator<Item = (&str, &str)> {
        self.calls.iter().filter_map(|c| match c {
            QueryCall::OrderBy { column, direction } => Some((column.as_str(), direction.as_str())),
            _ => None,
        })
    }

    /// Eager-load paths, deduplicated.
    pub fn relations(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for c in &self.calls {
            if let QueryCall::With(path) = c {
                if !out.contains(&path.as_str()) {
                    out.push(path);
                }
            }
        }
        out
    }

    pub fn counts(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for c in &self.calls {
            if let QueryCall::WithCount(name) = c {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
        }
        out
    }

    /// Last `take` wins.
    pub fn limit(&self) -> Option<u64> {
        self.calls.iter().rev().find_map(|c| match c {
            QueryCall::Take(n) => Some(*n),
            _ => None,
        })
    }
}

impl QueryHandle for PlannedQuery {
    fn where_op(mut self, column: &str, op: ComparisonOp, value: Value) -> Self {
        self.calls.push(QueryCall::Where {
            column: column.to_string(),
            op,
            value,
        });
        self
    }

    fn where_in(mut self, column: &str, values: Vec<Value>) -> Self {
        self.calls.push(QueryCall::WhereIn {
            column: column.to_string(),
            values,
            negated: false,
        });
        self
    }

    fn where_not_in(mut self, column: &str, values: Vec<Value>) -> Self {
        self.calls.push(QueryCall::WhereIn {
            column: column.to_string(),
            values,
            negated: true,
        });
        self
    }

    fn where_null(mut self, column: &str) -> Self {
        self.calls.push(QueryCall::WhereNull {
            column: column.to_string(),
            is_null: true,
        });
        self
    }

    fn where_not_null(mut self, column: &str) -> Self {
        self.calls.push(QueryCall::WhereNull {
            column: column.to_string(),
            is_null: false,
        });
        self
    }

    fn order_by(mut self, column: &str, direction: &str) -> Self {
        self.calls.push(QueryCall::OrderBy {
            column: column.to_string(),
            direction: direction.to_string(),
        });
        self
    }

    fn with(mut self, relation: &str) -> Self {
        self.calls.push(QueryCall::With(relation.to_string()));
        self
    }

    fn with_count(mut self, relation: &str) -> Self {
        self.calls.push(QueryCall::WithCount(relation.to_string()));
        self
    }

    fn take(mut self, limit: u64) -> Self {
        self.calls.push(QueryCall::Take(limit));
        self
    }
}

/// Sort direction understood by the backends. Anything else is ignored with a warning.
pub(crate) fn parse_direction(direction: &str) -> Option<bool> {
    match direction.trim().to_lowercase().as_str() {
        "asc" => Some(false),
        "desc" => Some(true),
        other => {
            tracing::warn!(direction = %other, "unsupported sort direction, ignoring");
            None
        }
    }
}

/// `<snake_name>_count`, the key an aggregate count is returned under.
pub fn count_key(aggregate: &str) -> String {
    format!("{}_count", crate::case::to_snake_case(aggregate))
}

/// Largest row count or offset PostgreSQL accepts (`bigint`).
pub const MAX_ROWS: u64 = i64::MAX as u64;

/// One page of rows plus totals.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub last_page: u64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, per_page: u64, current_page: u64) -> Self {
        let per_page = per_page.max(1);
        Page {
            data,
            total,
            per_page,
            current_page,
            last_page: total.div_ceil(per_page).max(1),
        }
    }

    /// Offset of the first row of `page` (1-indexed), capped at `MAX_ROWS`.
    pub fn offset(per_page: u64, page: u64) -> u64 {
        page.saturating_sub(1).saturating_mul(per_page.max(1)).min(MAX_ROWS)
    }
}

/// Terminal execution of planned queries plus writes.
///
/// `columns` is a projection; empty or `["*"]` selects every column.
#[async_trait]
pub trait Storage: Clone + Send + Sync + 'static {
    fn query(&self, entity: &Arc<ResolvedEntity>) -> PlannedQuery {
        PlannedQuery::new(entity.clone())
    }

    async fn get(&self, query: PlannedQuery, columns: &[&str]) -> Result<Vec<Value>, AppError>;

    async fn first(&self, query: PlannedQuery, columns: &[&str]) -> Result<Option<Value>, AppError> {
        let rows = self.get(query.take(1), columns).await?;
        Ok(rows.into_iter().next())
    }

    async fn paginate(
        &self,
        query: PlannedQuery,
        columns: &[&str],
        per_page: u64,
        page: u64,
    ) -> Result<Page<Value>, AppError>;

    async fn count(&self, query: PlannedQuery) -> Result<u64, AppError>;

    async fn delete(&self, query: PlannedQuery) -> Result<u64, AppError>;

    async fn insert(&self, entity: &ResolvedEntity, data: &Map<String, Value>) -> Result<Value, AppError>;

    /// Update the row with primary key `id`. `touch` also sets the update timestamp.
    async fn update_by_key(
        &self,
        entity: &ResolvedEntity,
        id: &Value,
        data: &Map<String, Value>,
        touch: bool,
    ) -> Result<Option<Value>, AppError>;

    /// Readiness probe.
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// True when the projection selects every column.
pub(crate) fn selects_all(columns: &[&str]) -> bool {
    columns.is_empty() || columns.iter().any(|c| *c == "*")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_math() {
        let page: Page<u8> = Page::new(vec![], 51, 25, 3);
        assert_eq!(page.last_page, 3);
        assert_eq!(Page::<u8>::new(vec![], 0, 25, 1).last_page, 1);
        assert_eq!(Page::<u8>::offset(25, 3), 50);
        assert_eq!(Page::<u8>::offset(25, 0), 0);
        assert_eq!(Page::<u8>::offset(2, u64::MAX), MAX_ROWS);
        assert_eq!(Page::<u8>::offset(u64::MAX, 2), MAX_ROWS);
    }

    #[test]
    fn test_count_key() {
        assert_eq!(count_key("createdByUser"), "created_by_user_count");
        assert_eq!(count_key("comments"), "comments_count");
    }

    #[test]
    fn test_parse_direction() {
        assert_eq!(parse_direction("ASC"), Some(false));
        assert_eq!(parse_direction(" desc "), Some(true));
        assert_eq!(parse_direction("sideways"), None);
    }
}
