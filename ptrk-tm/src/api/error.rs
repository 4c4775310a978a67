//! Engine error to HTTP response mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ptrk_common::Error;
use serde_json::json;
use tracing::{error, warn};

/// Handler error wrapping the engine taxonomy
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Permission(_) => StatusCode::FORBIDDEN,
            Error::ConcurrencyConflict(_) => StatusCode::CONFLICT,
            Error::TransactionFailure { .. } | Error::Cancelled(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Database(_) if self.0.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let err = self.0;

        if status.is_server_error() {
            error!(kind = err.kind(), "Request failed: {}", err);
        } else {
            warn!(kind = err.kind(), "Request rejected: {}", err);
        }

        let mut body = json!({
            "error": err.kind(),
            "message": err.to_string(),
            "retryable": err.is_retryable(),
        });

        // The administration UI highlights the offending fields
        match &err {
            Error::Validation(violation) => {
                body["actual_sum"] = json!(violation.actual_sum);
                body["problems"] = json!(violation.problems);
            }
            Error::TransactionFailure { processed, .. } => {
                body["processed"] = json!(processed);
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}
