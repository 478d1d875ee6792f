//! Unified API error handling
//!
//! Maps service failures to the documented error response shapes.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};

/// Unified API error type
///
/// Handlers return `Result<T, ApiError>` for consistent error handling.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Bad request / validation error (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        tracing::error!(
            status = status.as_u16(),
            message = %self,
            "API error"
        );

        match self {
            ApiError::BadRequest(message) => HttpResponse::build(status).json(serde_json::json!({
                "error": message,
            })),
            // Analysis failures keep the submission response shape so
            // callers can handle both uniformly.
            ApiError::Internal(message) => HttpResponse::build(status).json(serde_json::json!({
                "success": false,
                "error": message,
                "report": null,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_shape() {
        let response = ApiError::BadRequest("Idea is required".to_string()).error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_is_500() {
        let response = ApiError::Internal("boom".to_string()).error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
