//! HTTP error response mapping.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use garage_core::Error;
use serde::Serialize;

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Error returned by handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Failure reported by the controller.
    Controller(Error),
    /// Malformed request.
    BadRequest(String),
    /// Missing or invalid credentials.
    Unauthorized(&'static str),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Controller(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Unauthorized(message) => {
                let mut response =
                    (StatusCode::UNAUTHORIZED, Json(ErrorBody { error: message.to_string() }))
                        .into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                return response;
            }
            ApiError::Controller(err) => match err {
                Error::InvalidDoorId(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                Error::DoorBusy(_) => (StatusCode::CONFLICT, err.to_string()),
                Error::ShutDown => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
                Error::Configuration(_) | Error::Io(_) | Error::Observer { .. } => {
                    tracing::error!(error = %err, "controller error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal server error".to_string(),
                    )
                }
            },
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
