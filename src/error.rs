use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error response type
#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Response type for the health check endpoint
#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub routes: usize,
}

/// Custom error type for API endpoints
///
/// This error type provides consistent error handling across all proxied
/// routes, mapping each failure to an HTTP status code and a JSON body.
/// Validation failures are resolved locally before any outbound call is
/// attempted; upstream-reported errors are relayed verbatim by the
/// forwarder and never pass through this type.
#[derive(Debug)]
pub enum ApiError {
    /// A required parameter was not supplied
    MissingParameter(String),
    /// A supplied parameter could not be coerced to its declared type
    InvalidParameter { name: String, reason: String },
    /// No Moodle token in the Authorization header or wstoken query param
    MissingToken,
    /// Neither a fixed nor a per-request Moodle base URL is available
    BackendUnresolved,
    /// The resolved Moodle base URL does not parse as a URL
    InvalidBackendUrl(String),
    /// Network failure or timeout reaching the Moodle backend
    UpstreamUnreachable { url: String, detail: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::MissingParameter(name) => (
                StatusCode::BAD_REQUEST,
                format!("Missing required parameter '{}'", name),
            ),
            ApiError::InvalidParameter { name, reason } => (
                StatusCode::BAD_REQUEST,
                format!("Invalid value for parameter '{}': {}", name, reason),
            ),
            ApiError::MissingToken => (
                StatusCode::BAD_REQUEST,
                "Moodle token not provided. Pass an 'Authorization: Bearer <token>' header or a 'wstoken' query parameter.".to_string(),
            ),
            ApiError::BackendUnresolved => (
                StatusCode::BAD_REQUEST,
                "Moodle URL not provided. Set MOODLE_URL env var or pass moodle_url as query param.".to_string(),
            ),
            ApiError::InvalidBackendUrl(url) => (
                StatusCode::BAD_REQUEST,
                format!("Invalid Moodle base URL: '{}'", url),
            ),
            ApiError::UpstreamUnreachable { url, detail } => (
                StatusCode::BAD_GATEWAY,
                format!("Error contacting Moodle at {}: {}", url, detail),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}
