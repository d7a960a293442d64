//! Extract the authenticated caller from the `Authorization: Bearer` header.

use crate::auth::{Role, NOT_AUTHORIZED};
use crate::error::AppError;
use crate::model::ResourceDef;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Role check for write operations on a resource.
    pub fn authorize(&self, def: &ResourceDef) -> Result<(), AppError> {
        if def.is_writer(self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "User role {} is not authorized to access this route",
                self.role
            )))
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized(NOT_AUTHORIZED.into()))?;
        let claims = state.jwt.verify(token)?;
        Ok(AuthUser {
            id: claims.sub,
            role: claims.role,
        })
    }
}
