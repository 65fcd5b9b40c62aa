//! Request extractors: caller identity, tenant engine, and JSON/query/path
//! wrappers whose rejections render as [`ApiError`].

use std::sync::Arc;

use axum::extract::{FromRequest, FromRequestParts};
use axum::http::request::Parts;

use super::error::ApiError;
use super::AppState;
use crate::engine::Engine;
use crate::limits::MAX_EMAIL_LEN;
use crate::tenant::DEFAULT_TENANT;

pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const TENANT_HEADER: &str = "x-tenant";

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct QueryParams<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct PathParam<T>(pub T);

/// Email of the authenticated caller, as forwarded by the gateway.
#[derive(Debug, Clone)]
pub struct Caller(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let email = parts
            .headers
            .get(USER_EMAIL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::Unauthenticated)?;
        if email.len() > MAX_EMAIL_LEN {
            return Err(ApiError::Validation("caller email too long".into()));
        }
        Ok(Caller(email.to_string()))
    }
}

/// Engine of the tenant named by `X-Tenant`, or the default tenant.
pub struct TenantEngine(pub Arc<Engine>);

impl FromRequestParts<AppState> for TenantEngine {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let tenant = match parts.headers.get(TENANT_HEADER) {
            None => DEFAULT_TENANT,
            Some(v) => v
                .to_str()
                .map_err(|_| ApiError::Validation("X-Tenant must be ASCII".into()))?,
        };
        Ok(TenantEngine(state.tenants.get_or_create(tenant)?))
    }
}
