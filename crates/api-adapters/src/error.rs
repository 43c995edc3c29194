//! `FeedError` → HTTP response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domains::FeedError;
use serde_json::json;

/// Wrapper that lets handlers return `FeedError` with `?`.
#[derive(Debug)]
pub struct ApiError(pub FeedError);

impl From<FeedError> for ApiError {
    fn from(err: FeedError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &FeedError) -> StatusCode {
    match err {
        FeedError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
        FeedError::NotFound(..) => StatusCode::NOT_FOUND,
        FeedError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        FeedError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
        FeedError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = match &self.0 {
            FeedError::InvalidParameter(msg) | FeedError::Unauthorized(msg) => msg.clone(),
            FeedError::NotFound(..) => self.0.to_string(),
            FeedError::DeadlineExceeded(_) => "request timed out".to_string(),
            // Cause was logged where it happened; never leak it to clients.
            FeedError::Internal(_) => "internal server error".to_string(),
        };

        let body = Json(json!({
            "success": false,
            "message": message,
        }));
        (status, body).into_response()
    }
}
