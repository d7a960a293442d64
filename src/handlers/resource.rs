//! Generic resource handlers, instantiated per resource type: `get(list::<Bootcamps>)`.

use crate::error::AppError;
use crate::extractors::AuthUser;
use crate::model::Resource;
use crate::query::Filter;
use crate::response::{success_empty, success_envelope, success_one, success_one_ok};
use crate::service::CrudService;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::Value;

/// JSON body, with malformed payloads reported through the standard error body.
pub(crate) fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    body.map(|Json(v)| v).map_err(|rejection| {
        tracing::debug!(error = %rejection, "rejected request body");
        AppError::BadRequest(rejection.body_text())
    })
}

pub async fn list<R: Resource>(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    let envelope = CrudService::list(state.store.as_ref(), R::def(), &params, Filter::new()).await?;
    Ok(success_envelope(envelope))
}

pub async fn read<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record = CrudService::read(state.store.as_ref(), R::def(), &id).await?;
    Ok(success_one_ok(record))
}

pub async fn create<R: Resource>(
    State(state): State<AppState>,
    user: AuthUser,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let body = json_body(body)?;
    let record = CrudService::create(state.store.as_ref(), state.geocoder.as_ref(), R::def(), &user, body).await?;
    Ok(success_one(record))
}

pub async fn update<R: Resource>(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let body = json_body(body)?;
    let record =
        CrudService::update(state.store.as_ref(), state.geocoder.as_ref(), R::def(), &user, &id, body).await?;
    Ok(success_one_ok(record))
}

pub async fn delete<R: Resource>(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    CrudService::delete(state.store.as_ref(), R::def(), &user, &id).await?;
    Ok(success_empty())
}
