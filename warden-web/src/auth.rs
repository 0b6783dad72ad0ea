//! Authentication and authorization for the HTTP layer

pub mod database;
pub mod gate;
pub mod handlers;
pub mod jwt;
pub mod reset;
pub mod resolver;
pub mod session;
pub mod tokens;
pub mod users;


use crate::error::ApiError;
use axum::{
    extract::FromRequestParts,
    http::{header::ACCEPT, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
};
use warden_auth::{Permission, PermissionSet, SessionPrincipal};
use warden_core::{UserId, WardenError};

/// Where an authenticated identity came from
#[derive(Debug, Clone)]
pub enum PrincipalSource {
    Session {
        session_id: String,
        principal: SessionPrincipal,
    },
    Bearer {
        token_id: String,
    },
}

/// The identity a request runs as, after resolution
#[derive(Debug, Clone)]
pub struct ResolvedPrincipal {
    /// Identity used for authorization (the assumed user when impersonating)
    pub user_id: UserId,
    /// Account whose credentials were verified
    pub actor_id: UserId,
    pub source: PrincipalSource,
}

impl ResolvedPrincipal {
    pub fn is_assumed(&self) -> bool {
        self.user_id != self.actor_id
    }

    pub fn session_id(&self) -> Option<&str> {
        match &self.source {
            PrincipalSource::Session { session_id, .. } => Some(session_id),
            PrincipalSource::Bearer { .. } => None,
        }
    }
}

/// Principal plus the permissions loaded for this request by the permission gate
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal: ResolvedPrincipal,
    pub permissions: PermissionSet,
}

/// Authentication redirect for browser requests
#[derive(Debug)]
pub struct AuthRedirect;

impl IntoResponse for AuthRedirect {
    fn into_response(self) -> Response {
        Redirect::temporary("/login").into_response()
    }
}

/// Permission denied error with detailed message
#[derive(Debug)]
pub struct PermissionDenied {
    pub required_permission: Permission,
    pub user_id: Option<UserId>,
}

impl PermissionDenied {
    pub fn new(required_permission: Permission, user_id: Option<UserId>) -> Self {
        Self {
            required_permission,
            user_id,
        }
    }
}

impl IntoResponse for PermissionDenied {
    fn into_response(self) -> Response {
        let message = if let Some(user_id) = &self.user_id {
            format!(
                "User '{}' does not have required permission: {}",
                user_id, self.required_permission
            )
        } else {
            format!("Required permission: {}", self.required_permission)
        };

        (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "error": "permission_denied",
                "message": message,
                "required_permission": self.required_permission,
                "user_id": self.user_id
            })),
        )
            .into_response()
    }
}

/// Browsers get a redirect to the login page, API clients a 401.
pub fn unauthenticated_response(headers: &HeaderMap) -> Response {
    let wants_html = headers
        .get(ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false);

    if wants_html {
        AuthRedirect.into_response()
    } else {
        ApiError(WardenError::authentication("no valid credential", "gate")).into_response()
    }
}

/// Available on routes behind `requires_login` or `requires_minimum_permission`
impl<S> FromRequestParts<S> for ResolvedPrincipal
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ResolvedPrincipal>()
            .cloned()
            .or_else(|| {
                parts
                    .extensions
                    .get::<AuthContext>()
                    .map(|ctx| ctx.principal.clone())
            })
            .ok_or_else(|| unauthenticated_response(&parts.headers))
    }
}

/// Available on routes behind `requires_minimum_permission`
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| unauthenticated_response(&parts.headers))
    }
}
