//! Error handling for Camsentry

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Device could not be located on any candidate subnet
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Camera transport failed (stream ended, marker desync, timeout)
    #[error("Stream error: {0}")]
    Stream(String),

    /// Baseline calibration failed
    #[error("Calibration error: {0}")]
    Calibration(String),

    /// Frame decode/encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Error::DeviceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "DEVICE_UNAVAILABLE",
                msg.clone(),
            ),
            Error::Stream(msg) => (
                StatusCode::BAD_GATEWAY,
                "STREAM_ERROR",
                msg.clone(),
            ),
            Error::Calibration(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CALIBRATION_ERROR",
                msg.clone(),
            ),
            Error::Image(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IMAGE_ERROR",
                e.to_string(),
            ),
            Error::Http(e) => (
                StatusCode::BAD_GATEWAY,
                "HTTP_ERROR",
                e.to_string(),
            ),
            Error::Parse(msg) => (
                StatusCode::BAD_REQUEST,
                "PARSE_ERROR",
                msg.clone(),
            ),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
