//! Typed errors and HTTP mapping. `AppError` is the only type that reaches clients; store and
//! geocoder failures are translated into it here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Failures in the shape the backing store reports them.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),
    #[error("Resource id: {0} was not found")]
    MalformedId(String),
    #[error("{}", .0.join(", "))]
    ValidationFailed(Vec<String>),
    #[error("Duplicate field value(s) entered")]
    DuplicateKey,
    #[error("{0}")]
    UpstreamFailure(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    BadRequest(String),
    /// Detail is logged, never sent.
    #[error("unhandled: {0}")]
    Unhandled(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::MalformedId(_) => StatusCode::NOT_FOUND,
            AppError::ValidationFailed(_) | AppError::DuplicateKey | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::UpstreamFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unhandled(_) | AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client.
    pub fn message(&self) -> String {
        match self {
            AppError::Unhandled(_) | AppError::Config(_) => "Server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn not_found(label: &str, id: &str) -> Self {
        AppError::NotFound(format!("{} not found with id of {}", label, id))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(_) => AppError::DuplicateKey,
            StoreError::Unavailable(detail) => {
                tracing::warn!(%detail, "store unavailable");
                AppError::UpstreamFailure("Data store unavailable".into())
            }
            StoreError::Db(e) => e.into(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::DuplicateKey,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                tracing::warn!(error = %err, "database unreachable");
                AppError::UpstreamFailure("Data store unavailable".into())
            }
            _ => AppError::Unhandled(err.to_string()),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        let body = ErrorBody {
            success: false,
            error: self.message(),
        };
        (status, Json(body)).into_response()
    }
}
