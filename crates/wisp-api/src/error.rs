//! HTTP error mapping for the node API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use wisp_store::StoreError;

/// Errors returned by node API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// An error from the metric store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Internal server error outside the store.
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Store(e) => match e {
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                StoreError::Validation(_) => StatusCode::BAD_REQUEST,
                // "Come back later", not a failure.
                StoreError::CacheBuilding => StatusCode::ACCEPTED,
                StoreError::Corrupt { .. } | StoreError::Io(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
