//! Generic entity repository: CRUD and search over one entity, driven by request parameters.
//!
//! Build one per request. Fluent calls consume and return the repository; terminal calls
//! drain the pending state first, so it is clear afterwards on every path, errors included.

use crate::config::{ResolvedEntity, ResolvedModel};
use crate::error::AppError;
use crate::query::{
    compose, resolve_filters, resolve_inclusion, resolve_sorts, Clause, ComparisonOp, InclusionRequest,
    RepositoryState, RequestParams, SortInstruction,
};
use crate::service::{RequestValidator, ValidationMode};
use crate::store::{Page, PlannedQuery, Storage};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Request key holding the page size for `search`.
pub const LIMIT_PARAM: &str = "limit";
/// Default request key holding the page number.
pub const PAGE_PARAM: &str = "page";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Set the update timestamp alongside the changed fields.
    pub touch: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        UpdateOptions { touch: true }
    }
}

pub struct Repository<S: Storage> {
    storage: S,
    model: Arc<ResolvedModel>,
    entity: Arc<ResolvedEntity>,
    params: RequestParams,
    state: RepositoryState,
}

impl<S: Storage> Repository<S> {
    pub fn new(storage: S, model: Arc<ResolvedModel>, entity: Arc<ResolvedEntity>) -> Self {
        let state = RepositoryState::new(entity.active_flag.as_ref());
        Repository {
            storage,
            model,
            entity,
            params: RequestParams::new(),
            state,
        }
    }

    /// Repository for the entity with config id `entity_id`.
    pub fn for_entity(storage: S, model: Arc<ResolvedModel>, entity_id: &str) -> Result<Self, AppError> {
        let entity = model
            .entity(entity_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("entity {}", entity_id)))?;
        Ok(Self::new(storage, model, entity))
    }

    /// Attach the request context read by `all` and `search`.
    pub fn with_params(mut self, params: RequestParams) -> Self {
        self.params = params;
        self
    }

    pub fn entity(&self) -> &ResolvedEntity {
        &self.entity
    }

    pub fn params(&self) -> &RequestParams {
        &self.params
    }

    pub fn state(&self) -> &RepositoryState {
        &self.state
    }

    pub fn filter(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter_op(column, ComparisonOp::Eq, value)
    }

    pub fn filter_op(mut self, column: &str, op: ComparisonOp, value: impl Into<Value>) -> Self {
        let column = column.to_string();
        let value = value.into();
        self.state.push_clause(match op {
            ComparisonOp::Eq => Clause::Equality { column, value },
            op => Clause::Comparison { column, op, value },
        });
        self
    }

    pub fn filter_in(mut self, column: &str, values: Vec<Value>) -> Self {
        self.state.push_clause(Clause::Set {
            column: column.to_string(),
            values,
            negated: false,
        });
        self
    }

    pub fn filter_not_in(mut self, column: &str, values: Vec<Value>) -> Self {
        self.state.push_clause(Clause::Set {
            column: column.to_string(),
            values,
            negated: true,
        });
        self
    }

    pub fn filter_null(mut self, column: &str, is_null: bool) -> Self {
        self.state.push_clause(Clause::Null {
            column: column.to_string(),
            is_null,
        });
        self
    }

    pub fn order_by(mut self, column: &str, direction: &str) -> Self {
        self.state.push_sort(SortInstruction::new(column, direction));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.state.set_limit(limit);
        self
    }

    /// Replace the pending eager loads.
    pub fn with<I, T>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.state.set_relations(relations.into_iter().map(Into::into).collect());
        self
    }

    /// Pending eager loads from the request's `contain`/`include` directive, for terminals
    /// such as `find` that do not read the request context themselves.
    pub fn with_requested_relations(self) -> Self {
        let (inclusion, _, _) = self.request_pieces();
        if inclusion.relations.is_empty() {
            return self;
        }
        self.with(inclusion.relations)
    }

    fn query(&self) -> PlannedQuery {
        self.storage.query(&self.entity)
    }

    /// Inclusion, sorts and filters read from the request context.
    fn request_pieces(&self) -> (InclusionRequest, Vec<SortInstruction>, Vec<Clause>) {
        let known = self.model.known_relations(&self.entity);
        let inclusion = resolve_inclusion(
            self.params.first_of(&["contain", "include"]),
            self.params.first_of(&["count", "with_count"]),
            &known,
        );
        let sorts = resolve_sorts(self.params.get("sort"), &self.entity.default_sort);
        let clauses = resolve_filters(&self.params, &self.entity.filterable);
        (inclusion, sorts, clauses)
    }

    /// Query with only the drained state applied.
    fn state_query(&mut self) -> PlannedQuery {
        let state = self.state.take();
        compose(self.query(), state, InclusionRequest::default(), Vec::new(), Vec::new())
    }

    /// Query matching one primary key, with the gate and pending eager loads.
    fn key_query(&mut self, column: &str, value: Value) -> PlannedQuery {
        let mut state = self.state.take_eager_loads();
        state.push_clause(Clause::Equality {
            column: column.to_string(),
            value,
        });
        compose(self.query(), state, InclusionRequest::default(), Vec::new(), Vec::new())
    }

    fn reset(&mut self) {
        self.state.take();
    }

    /// Every row, shaped by the request's inclusion, sort and filters plus pending eager loads.
    /// Other pending clauses, sorts and the limit are discarded.
    pub async fn all(&mut self, columns: &[&str]) -> Result<Vec<Value>, AppError> {
        let state = self.state.take_eager_loads();
        let (inclusion, sorts, clauses) = self.request_pieces();
        let query = compose(self.query(), state, inclusion, sorts, clauses);
        self.storage.get(query, columns).await
    }

    /// Rows matching the pending clauses, sorts and limit.
    pub async fn get(&mut self, columns: &[&str]) -> Result<Vec<Value>, AppError> {
        let query = self.state_query();
        self.storage.get(query, columns).await
    }

    pub async fn first(&mut self, columns: &[&str]) -> Result<Value, AppError> {
        let query = self.state_query();
        self.storage
            .first(query, columns)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no {} matches", self.entity.id)))
    }

    pub async fn find(&mut self, id: &Value, columns: &[&str]) -> Result<Value, AppError> {
        let pk = self.entity.primary_key.clone();
        let query = self.key_query(&pk, id.clone());
        self.storage
            .first(query, columns)
            .await?
            .ok_or_else(|| AppError::not_found(&self.entity.id, id))
    }

    /// First row whose `column` equals `value`; `None` when absent.
    pub async fn get_by_column(&mut self, value: &Value, column: &str, columns: &[&str]) -> Result<Option<Value>, AppError> {
        let query = self.key_query(column, value.clone());
        self.storage.first(query, columns).await
    }

    pub async fn create(&mut self, data: &Map<String, Value>) -> Result<Value, AppError> {
        self.reset();
        RequestValidator::validate(&self.entity, data, ValidationMode::Create)?;
        self.storage.insert(&self.entity, data).await
    }

    /// Inserts one at a time; the first failure is returned and earlier rows stay.
    pub async fn create_multiple(&mut self, items: &[Map<String, Value>]) -> Result<Vec<Value>, AppError> {
        let mut created = Vec::with_capacity(items.len());
        for data in items {
            created.push(self.create(data).await?);
        }
        Ok(created)
    }

    pub async fn update_by_id(&mut self, id: &Value, data: &Map<String, Value>, options: UpdateOptions) -> Result<Value, AppError> {
        self.reset();
        self.find(id, &[]).await?;
        RequestValidator::validate(&self.entity, data, ValidationMode::Update)?;
        self.storage
            .update_by_key(&self.entity, id, data, options.touch)
            .await?
            .ok_or_else(|| AppError::not_found(&self.entity.id, id))
    }

    pub async fn delete_by_id(&mut self, id: &Value) -> Result<bool, AppError> {
        self.reset();
        self.find(id, &[]).await?;
        let pk = self.entity.primary_key.clone();
        let query = self.key_query(&pk, id.clone());
        Ok(self.storage.delete(query).await? > 0)
    }

    /// Deleted row count. Ids that do not exist are skipped.
    pub async fn delete_multiple_by_id(&mut self, ids: &[Value]) -> Result<u64, AppError> {
        self.reset();
        if ids.is_empty() {
            return Ok(0);
        }
        let mut state = RepositoryState::new(self.entity.active_flag.as_ref());
        state.push_clause(Clause::Set {
            column: self.entity.primary_key.clone(),
            values: ids.to_vec(),
            negated: false,
        });
        let query = compose(self.query(), state, InclusionRequest::default(), Vec::new(), Vec::new());
        self.storage.delete(query).await
    }

    /// One page over the pending state. `limit` defaults to the entity page size and `page`
    /// to the request's `page_param` value, then 1.
    pub async fn paginate(
        &mut self,
        limit: Option<u64>,
        columns: &[&str],
        page_param: &str,
        page: Option<u64>,
    ) -> Result<Page<Value>, AppError> {
        let query = self.state_query();
        let per_page = limit.filter(|n| *n > 0).unwrap_or(self.entity.page_size);
        let page = page.or_else(|| self.param_u64(page_param)).unwrap_or(1).max(1);
        self.storage.paginate(query, columns, per_page, page).await
    }

    /// Request filters, sort and inclusion over the pending state, paginated by the request's
    /// `limit` and `page`.
    pub async fn search(&mut self) -> Result<Page<Value>, AppError> {
        let state = self.state.take();
        let (inclusion, sorts, clauses) = self.request_pieces();
        let query = compose(self.query(), state, inclusion, sorts, clauses);
        let per_page = self.param_u64(LIMIT_PARAM).filter(|n| *n > 0).unwrap_or(self.entity.page_size);
        let page = self.param_u64(PAGE_PARAM).unwrap_or(1).max(1);
        self.storage.paginate(query, &[], per_page, page).await
    }

    pub async fn count(&mut self) -> Result<u64, AppError> {
        let query = self.state_query();
        self.storage.count(query).await
    }

    /// Delete every row matching the pending state. Returns the deleted count.
    pub async fn delete(&mut self) -> Result<u64, AppError> {
        let query = self.state_query();
        self.storage.delete(query).await
    }

    fn param_u64(&self, key: &str) -> Option<u64> {
        let raw = self.params.get(key)?;
        match raw.trim().parse() {
            Ok(n) => Some(n),
            Err(_) => {
                tracing::debug!(key = %key, value = %raw, "ignoring non-numeric parameter");
                None
            }
        }
    }
}
