//! JSON API
//!
//! Handlers only enqueue work and read queue state; every search and show
//! change runs through the queues.

pub mod health;
pub mod notifications;
pub mod queue;
pub mod shows;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::AppState;
use crate::queue::QueueError;

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        let status = match e {
            QueueError::NotFound(_) => StatusCode::NOT_FOUND,
            QueueError::AlreadyQueued(_) | QueueError::ShowBusy(_) | QueueError::AlreadyExists(_) => {
                StatusCode::CONFLICT
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        tracing::error!(error = %e, "Request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Body for endpoints that only start something
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ActionResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }
}

/// Every API route, mounted under `/api`
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(queue::router())
        .merge(shows::router())
        .merge(notifications::router())
}
