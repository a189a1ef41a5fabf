use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fleetgrid_dispatch::DispatchError;
use fleetgrid_scaler::ScaleError;
use thiserror::Error;

/// Errors surfaced by the control API, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::InvalidInput(msg) => ApiError::BadRequest(msg),
            DispatchError::NoCapacity => {
                ApiError::Unavailable("No available containers to process the task.".to_string())
            }
            other @ (DispatchError::QueueFull | DispatchError::PoolClosed) => {
                ApiError::Unavailable(other.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ScaleError> for ApiError {
    fn from(e: ScaleError) -> Self {
        match e {
            ScaleError::InvalidInput(msg) => ApiError::BadRequest(msg),
            other @ ScaleError::RuntimeUnavailable(_) => ApiError::Internal(other.to_string()),
        }
    }
}
