//! Error types for the store and the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

/// Errors raised by a [`ProjectStore`](crate::store::ProjectStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("project {0} not found")]
    ProjectNotFound(Uuid),

    #[error("endpoint {0} not found")]
    EndpointNotFound(Uuid),

    #[error("resource {0:?} not found")]
    ResourceNotFound(String),

    #[error("invalid definition: {0}")]
    Invalid(String),
}

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request did not name a usable project.
    #[error("Please specify an api id.")]
    MissingProjectContext,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingProjectContext | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ProjectNotFound(_) => ApiError::NotFound("No projects found.".to_string()),
            StoreError::EndpointNotFound(_) => {
                ApiError::NotFound("No projects or endpoints found.".to_string())
            }
            StoreError::ResourceNotFound(_) => {
                ApiError::NotFound("Resource not found or already deleted".to_string())
            }
            StoreError::Invalid(msg) => ApiError::BadRequest(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({ "status": "error", "message": message });
        (status, Json(body)).into_response()
    }
}
