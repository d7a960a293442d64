//! Router assembly.

mod api;
mod common;

pub use api::api_routes;
pub use common::common_routes;

use crate::state::AppState;
use axum::Router;

pub const API_PREFIX: &str = "/api/v1";

/// Common routes at the root, resources under [`API_PREFIX`].
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .nest(API_PREFIX, api_routes(state))
}
