//! Bootcamp directory REST backend: shaped listings, generic resource CRUD and radius search.

pub mod auth;
pub mod config;
pub mod error;
pub mod extractors;
pub mod geo;
pub mod handlers;
pub mod model;
pub mod query;
pub mod response;
pub mod routes;
pub mod server;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::AppConfig;
pub use error::{AppError, ConfigError, StoreError};
pub use query::{shape, QueryShaper, QuerySpec, ShapedQuery};
pub use routes::{api_routes, common_routes, router};
pub use server::{build_app, shutdown_signal, watch_store, Exit, FatalHandle, Supervisor};
pub use service::CrudService;
pub use state::AppState;
pub use store::{ensure_tables, MemoryStore, PgStore, ResourceStore};
