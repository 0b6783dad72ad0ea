//! Warden Web Server
//!
//! HTTP surface of the identity provider: sign-up and login, sessions with
//! user impersonation, bearer tokens, and permission-gated administration.

pub mod auth;
pub mod database;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;

// Re-export main types
pub use error::{ApiError, ApiResult};
pub use server::{WardenServer, WardenServerBuilder};
pub use state::{AppState, SweepReport};

use axum::{extract::DefaultBodyLimit, Router};
use tower_http::trace::TraceLayer;

/// Request bodies are small JSON documents
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Create the main application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .nest("/api", routes::api_routes(&state))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
