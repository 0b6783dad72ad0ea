//! HTTP mapping of [`WardenError`]

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use warden_core::WardenError;

/// Error returned by handlers and middleware
#[derive(Debug)]
pub struct ApiError(pub WardenError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<WardenError> for ApiError {
    fn from(err: WardenError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            WardenError::Validation { .. } => StatusCode::BAD_REQUEST,
            WardenError::NotFound { .. } => StatusCode::NOT_FOUND,
            WardenError::Conflict { .. } => StatusCode::CONFLICT,
            WardenError::Authentication { .. } => StatusCode::UNAUTHORIZED,
            WardenError::Authorization { .. } => StatusCode::FORBIDDEN,
            WardenError::Infrastructure { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.0.log();

        let status = self.status();
        let error_id = self.0.context().map(|c| c.error_id.clone());

        (
            status,
            Json(json!({
                "error": self.0.code(),
                "message": self.0.public_message(),
                "error_id": error_id,
            })),
        )
            .into_response()
    }
}
