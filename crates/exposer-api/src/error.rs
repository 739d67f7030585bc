//! HTTP error mapping
//!
//! Every error body has the shape `{errorCode, message, details?}`.
//! Denials and bad jobs are 400; infrastructure failures are 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use exposer_admission::{AdmissionError, ErrorResponse};
use exposer_workload::CompilationError;
use tracing::{error, warn};

/// Code for requests that could not be parsed or compiled
pub const ERR_BAD_REQUEST: &str = "ERR_BAD_REQUEST";
/// Code for infrastructure failures
pub const ERR_INTERNAL: &str = "ERR_INTERNAL";
/// Code for missing resources
pub const ERR_NOT_FOUND: &str = "ERR_NOT_FOUND";

/// Error type for HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Admission denied the launch
    #[error("{}", .0.message)]
    Denied(ErrorResponse),

    /// The request body was not a usable job
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Admission could not reach a decision
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// The job could not be compiled
    #[error(transparent)]
    Compilation(#[from] CompilationError),

    /// Cluster, database or messaging failure
    #[error(transparent)]
    Infrastructure(#[from] exposer_common::Error),

    /// Requested resource does not exist
    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    /// Status code and response body for this error
    pub fn to_parts(&self) -> (StatusCode, ErrorResponse) {
        match self {
            ApiError::Denied(resp) => (StatusCode::BAD_REQUEST, resp.clone()),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(ERR_BAD_REQUEST, msg.clone()),
            ),
            ApiError::Admission(err) => (
                StatusCode::from_u16(err.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                ErrorResponse::new(err.error_code(), err.to_string()),
            ),
            ApiError::Compilation(err) => match err {
                CompilationError::MalformedJob { .. } | CompilationError::ConfigDerivation { .. } => (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::new(ERR_BAD_REQUEST, err.to_string()),
                ),
                CompilationError::Serialization { .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new(ERR_INTERNAL, err.to_string()),
                ),
            },
            ApiError::Infrastructure(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(ERR_INTERNAL, err.to_string()),
            ),
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new(ERR_NOT_FOUND, msg.clone()),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.to_parts();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), code = %body.error_code, error = %self, "request rejected");
        }
        (status, Json(body)).into_response()
    }
}
