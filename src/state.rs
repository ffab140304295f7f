//! Shared application state for all routes.

use crate::config::{ResolvedEntity, ResolvedModel};
use crate::error::AppError;
use crate::query::RequestParams;
use crate::repository::Repository;
use crate::store::Storage;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState<S: Storage> {
    pub storage: S,
    pub model: Arc<ResolvedModel>,
}

impl<S: Storage> AppState<S> {
    pub fn new(storage: S, model: Arc<ResolvedModel>) -> Self {
        AppState { storage, model }
    }

    pub fn entity_by_path(&self, path_segment: &str) -> Result<Arc<ResolvedEntity>, AppError> {
        self.model
            .entity_by_path(path_segment)
            .cloned()
            .ok_or_else(|| AppError::NotFound(path_segment.to_string()))
    }

    /// Fresh repository for one request.
    pub fn repository(&self, entity: Arc<ResolvedEntity>, params: RequestParams) -> Repository<S> {
        Repository::new(self.storage.clone(), self.model.clone(), entity).with_params(params)
    }
}
