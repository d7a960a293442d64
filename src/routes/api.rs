//! Resource routes mounted under `/api/v1`.

use crate::handlers::bootcamp::{create_course, list_courses, within_radius};
use crate::handlers::resource::{create, delete, list, read, update};
use crate::model::{Bootcamps, Courses};
use crate::state::AppState;
use axum::{routing::get, Router};

/// Sibling routes share the `:id` parameter name at the same position.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/bootcamps", get(list::<Bootcamps>).post(create::<Bootcamps>))
        .route(
            "/bootcamps/:id",
            get(read::<Bootcamps>).put(update::<Bootcamps>).delete(delete::<Bootcamps>),
        )
        .route("/bootcamps/radius/:zipcode/:distance", get(within_radius))
        .route("/bootcamps/:id/courses", get(list_courses).post(create_course))
        .route("/courses", get(list::<Courses>))
        .route(
            "/courses/:id",
            get(read::<Courses>).put(update::<Courses>).delete(delete::<Courses>),
        )
        .with_state(state)
}
