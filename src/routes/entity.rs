//! Entity routes. Paths are parameterized; handlers resolve the entity by path segment.

use crate::handlers::entity::{bulk_create, create, delete, delete_many, list, read, update};
use crate::state::AppState;
use crate::store::Storage;
use axum::{routing::get, routing::post, Router};
use tower_http::limit::RequestBodyLimitLayer;

/// Request body cap for entity writes.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

pub fn entity_routes<S: Storage>(state: AppState<S>) -> Router {
    Router::new()
        .route(
            "/:path_segment",
            get(list::<S>).post(create::<S>).delete(delete_many::<S>),
        )
        .route("/:path_segment/bulk", post(bulk_create::<S>))
        .route(
            "/:path_segment/:id",
            get(read::<S>).patch(update::<S>).delete(delete::<S>),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
