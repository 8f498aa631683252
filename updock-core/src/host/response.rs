//! Mapping of host errors to HTTP responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::HostError;
use crate::protocol::ErrorResponse;

impl HostError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HostError::CatalogRead { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            HostError::VersionNotFound { .. } => StatusCode::NOT_FOUND,
            HostError::PathTraversal { .. } => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for HostError {
    fn into_response(self) -> Response {
        self.log_if_security_relevant();

        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
