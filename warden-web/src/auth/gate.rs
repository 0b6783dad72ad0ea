//! Authorization gate middleware
//!
//! `requires_login` only needs a resolved principal. `requires_minimum_permission`
//! additionally loads the principal's role-derived permissions (fresh on every
//! request) and checks them against the precomputed sufficient set.

use super::jwt::parse_permissions;
use super::resolver::ResolveError;
use super::{unauthenticated_response, AuthContext, PermissionDenied};
use crate::{error::ApiError, AppState};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};
use warden_auth::Permission;

pub async fn requires_login(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match state.resolver.resolve_headers(request.headers()).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(ResolveError::Unavailable(err)) => ApiError(err).into_response(),
        Err(ResolveError::Unauthenticated(reason)) => {
            if state.dev_login_bypass() {
                warn!(
                    path = %request.uri().path(),
                    reason,
                    "Login requirement bypassed in development mode"
                );
                return next.run(request).await;
            }
            debug!(path = %request.uri().path(), reason, "Rejected unauthenticated request");
            unauthenticated_response(request.headers())
        }
    }
}

/// State for [`requires_minimum_permission`]: the app plus the permission a route needs
#[derive(Clone)]
pub struct PermissionGate {
    pub state: AppState,
    pub required: Permission,
}

impl PermissionGate {
    pub fn new(state: AppState, required: Permission) -> Self {
        Self { state, required }
    }
}

pub async fn requires_minimum_permission(
    State(gate): State<PermissionGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let principal = match gate.state.resolver.resolve_headers(request.headers()).await {
        Ok(principal) => principal,
        Err(ResolveError::Unavailable(err)) => return ApiError(err).into_response(),
        Err(ResolveError::Unauthenticated(reason)) => {
            debug!(path = %request.uri().path(), reason, "Rejected unauthenticated request");
            return unauthenticated_response(request.headers());
        }
    };

    let names = match gate.state.directory.permission_names(principal.user_id).await {
        Ok(names) => names,
        Err(err) => return ApiError(err).into_response(),
    };
    let held = parse_permissions(&names);

    if !gate.state.engine.is_satisfied_by(gate.required, &held) {
        warn!(
            user_id = %principal.user_id,
            actor_id = %principal.actor_id,
            required = %gate.required,
            "Permission denied"
        );
        return PermissionDenied::new(gate.required, Some(principal.user_id)).into_response();
    }

    request.extensions_mut().insert(AuthContext {
        principal,
        permissions: held,
    });
    next.run(request).await
}
