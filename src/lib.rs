//! Repokit: configuration-driven entity repositories with a request-driven query grammar
//! (suffix filters, sorting, eager loading, counts) over PostgreSQL or in-memory storage.

pub mod case;
pub mod config;
pub mod error;
pub mod handlers;
pub mod query;
pub mod repository;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{load_from_dir, parse_config, resolve, FullConfig, ResolvedEntity, ResolvedModel};
pub use error::{AppError, ConfigError};
pub use query::{RepositoryState, RequestParams};
pub use repository::{Repository, UpdateOptions};
pub use routes::{common_routes, common_routes_with_ready, entity_routes};
pub use state::AppState;
pub use store::{MemoryStorage, Page, PgStorage, Storage};
