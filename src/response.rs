//! Standard response envelope helpers.

use crate::model::Record;
use crate::query::Pagination;
use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SuccessOne<T> {
    pub success: bool,
    pub data: T,
}

/// Shaped listing: one page of records with its navigation links.
#[derive(Debug, Serialize)]
pub struct ResultEnvelope {
    pub success: bool,
    /// Records in this page.
    pub count: usize,
    pub pagination: Pagination,
    pub data: Vec<Record>,
}

impl ResultEnvelope {
    pub fn new(data: Vec<Record>, pagination: Pagination) -> Self {
        ResultEnvelope {
            success: true,
            count: data.len(),
            pagination,
            data,
        }
    }
}

/// Unpaginated listing, used by radius search.
#[derive(Debug, Serialize)]
pub struct SuccessMany<T> {
    pub success: bool,
    pub count: usize,
    pub data: Vec<T>,
}

pub fn success_one<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::CREATED, Json(SuccessOne { success: true, data }))
}

pub fn success_one_ok<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::OK, Json(SuccessOne { success: true, data }))
}

pub fn success_many<T: Serialize>(data: Vec<T>) -> (StatusCode, Json<SuccessMany<T>>) {
    (
        StatusCode::OK,
        Json(SuccessMany {
            success: true,
            count: data.len(),
            data,
        }),
    )
}

pub fn success_envelope(envelope: ResultEnvelope) -> (StatusCode, Json<ResultEnvelope>) {
    (StatusCode::OK, Json(envelope))
}

/// `{ "success": true, "data": {} }` after a delete.
pub fn success_empty() -> (StatusCode, Json<SuccessOne<Record>>) {
    success_one_ok(Record::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_counts_page_records() {
        let mut r = Record::new();
        r.insert("name".into(), json!("a"));
        let env = ResultEnvelope::new(vec![r.clone(), r], Pagination::compute(2, 2, 5));
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["success"], json!(true));
        assert_eq!(v["count"], json!(2));
        assert_eq!(v["pagination"]["next"], json!({ "page": 3, "limit": 2 }));
        assert_eq!(v["pagination"]["prev"], json!({ "page": 1, "limit": 2 }));
    }

    #[test]
    fn empty_delete_body() {
        let (status, Json(body)) = success_empty();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::to_value(body).unwrap(), json!({ "success": true, "data": {} }));
    }
}
