//! Route definitions for the Warden web server
//!
//! Every route sits in exactly one of three groups: public, login-only, or
//! gated on a minimum permission. Gates are attached with `route_layer` so
//! unknown paths still fall through to 404.

use crate::auth::gate::{requires_login, requires_minimum_permission, PermissionGate};
use crate::auth::handlers as auth;
use crate::{handlers, AppState};
use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use warden_auth::Permission;

/// Create API routes
pub fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(public_routes())
        .merge(login_routes(state))
        .merge(gated(
            state,
            Permission::SuperUser,
            Router::new().route("/auth/assume/{user_id}", post(auth::assume)),
        ))
        .merge(gated(
            state,
            Permission::AuthAdmin,
            Router::new().route("/admin/permissions", get(auth::list_permissions)),
        ))
        .merge(gated(
            state,
            Permission::AuthTokenAdmin,
            Router::new().route("/admin/tokens/sweep", post(auth::sweep_tokens)),
        ))
        .merge(gated(
            state,
            Permission::AuthUserAdmin,
            Router::new()
                .route("/admin/users/{user_id}/enabled", post(auth::set_user_enabled))
                .route("/admin/users/{user_id}", delete(auth::delete_user)),
        ))
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/password-reset", post(auth::request_password_reset))
        .route(
            "/auth/password-reset/confirm",
            post(auth::confirm_password_reset),
        )
}

fn login_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/release", post(auth::release))
        .route("/tokens", get(auth::list_tokens).post(auth::create_token))
        .route("/tokens/{token_id}", delete(auth::delete_token))
        .route_layer(from_fn_with_state(state.clone(), requires_login))
}

/// Put `routes` behind a minimum permission check
pub fn gated(
    state: &AppState,
    required: Permission,
    routes: Router<AppState>,
) -> Router<AppState> {
    routes.route_layer(from_fn_with_state(
        PermissionGate::new(state.clone(), required),
        requires_minimum_permission,
    ))
}
