//! Mapping of engine errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tabulookup_core::LookupError;
use tracing::error;

/// JSON body of every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// An error returned by a handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

/// HTTP status for an engine error.
pub fn status_for(err: &LookupError) -> StatusCode {
    match err {
        LookupError::InvalidInput(_)
        | LookupError::SheetDisabled(_)
        | LookupError::ColumnNotFound { .. }
        | LookupError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
        LookupError::DatasetNotFound(_)
        | LookupError::DatasetInactive(_)
        | LookupError::SheetNotFound(_) => StatusCode::NOT_FOUND,
        LookupError::ConfigurationConflict { .. } | LookupError::DuplicateName(_) => {
            StatusCode::CONFLICT
        }
        LookupError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        LookupError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        LookupError::SourceUnreadable { .. }
        | LookupError::Persistence(_)
        | LookupError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<LookupError> for ApiError {
    fn from(err: LookupError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!(error = %err, "request failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}
