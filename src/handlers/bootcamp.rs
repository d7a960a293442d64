//! Bootcamp-specific routes: radius search and the courses nested under a bootcamp.

use super::resource::json_body;
use crate::error::AppError;
use crate::extractors::AuthUser;
use crate::model::{BOOTCAMPS, COURSES};
use crate::query::Filter;
use crate::response::{success_envelope, success_many, success_one};
use crate::service::CrudService;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::Value;

const COURSE_LINK: &str = "bootcamp";

pub async fn within_radius(
    State(state): State<AppState>,
    Path((zipcode, distance)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let records = CrudService::within_radius(
        state.store.as_ref(),
        state.geocoder.as_ref(),
        &BOOTCAMPS,
        &zipcode,
        &distance,
    )
    .await?;
    Ok(success_many(records))
}

pub async fn list_courses(
    State(state): State<AppState>,
    Path(bootcamp_id): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    let scope = Filter::new().eq(COURSE_LINK, bootcamp_id);
    let envelope = CrudService::list(state.store.as_ref(), &COURSES, &params, scope).await?;
    Ok(success_envelope(envelope))
}

pub async fn create_course(
    State(state): State<AppState>,
    user: AuthUser,
    Path(bootcamp_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let body = json_body(body)?;
    let record = CrudService::create_nested(
        state.store.as_ref(),
        state.geocoder.as_ref(),
        &BOOTCAMPS,
        &bootcamp_id,
        &COURSES,
        COURSE_LINK,
        &user,
        body,
    )
    .await?;
    Ok(success_one(record))
}
