//! Conversion of failures into JSON error responses.

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use protocol::{ErrorCode, ErrorResponse};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::files::FileError;

/// Error returned by every handler.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    File(#[from] FileError),

    /// The request could not be parsed.
    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::File(e) => e.code(),
            ApiError::BadRequest(_) => ErrorCode::InvalidRequest,
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.code() {
            ErrorCode::PathTraversal => warn!(error = %self, "Rejected path"),
            ErrorCode::InternalError => error!(error = %self, "Request failed"),
            _ => debug!(error = %self, "Request failed"),
        }

        (self.status(), Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}
