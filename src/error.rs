//! Error kinds surfaced at the HTTP boundary

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of the clustering and prediction operations.
///
/// Each variant maps to its own status code; the message is returned verbatim
/// in the `detail` field of the response body.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServiceError {
    /// The request was well-formed JSON but carried unusable values
    #[error("{0}")]
    Validation(String),

    /// The referenced user has no location history
    #[error("{0}")]
    NotFound(String),

    /// Clustering or model inference failed on valid input
    #[error("{0}")]
    Inference(String),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Inference(_) => "inference",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON body returned for every failed request
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub kind: String,
    pub detail: String,
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            kind: err.kind().to_string(),
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "request failed: {}", self);
        } else {
            tracing::warn!(kind = self.kind(), "request rejected: {}", self);
        }
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_distinct() {
        let errors = [
            ServiceError::Validation("bad".into()),
            ServiceError::NotFound("missing".into()),
            ServiceError::Inference("broken".into()),
        ];
        let codes: Vec<StatusCode> = errors.iter().map(|e| e.status_code()).collect();

        assert_eq!(codes[0], StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(codes[1], StatusCode::NOT_FOUND);
        assert_eq!(codes[2], StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_body_carries_message() {
        let err = ServiceError::NotFound("user 999 not found".into());
        let body = ErrorResponse::from(&err);

        assert_eq!(body.status, "error");
        assert_eq!(body.kind, "not_found");
        assert_eq!(body.detail, "user 999 not found");
    }
}
