//! Example server: loads entity config from CONFIG_PATH, serves it over PostgreSQL when
//! DATABASE_URL is set and over in-memory storage otherwise.

use axum::Router;
use repokit::{
    common_routes_with_ready, entity_routes, load_from_dir, resolve, AppState, MemoryStorage, PgStorage,
    ResolvedModel, Storage,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("repokit=info".parse()?))
        .init();

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "demos/config".into());
    let config = load_from_dir(&config_path).await?;
    let model = Arc::new(resolve(&config)?);
    tracing::info!(entities = model.entities.len(), path = %config_path, "config loaded");

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await?;
            serve(PgStorage::new(pool, model.clone()), model, &bind_addr).await
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, serving from in-memory storage");
            serve(MemoryStorage::new(model.clone()), model, &bind_addr).await
        }
    }
}

async fn serve<S: Storage>(storage: S, model: Arc<ResolvedModel>, bind_addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(storage, model);
    let app = Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .nest("/api/v1", entity_routes(state));

    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
