//! Mapping of analysis errors onto HTTP responses.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::analysis::AnalysisError;

#[derive(Debug)]
pub struct ApiError(pub AnalysisError);

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    violations: Vec<String>,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            AnalysisError::InvalidRequest(_) | AnalysisError::UnknownTool(_) => {
                StatusCode::BAD_REQUEST
            }
            AnalysisError::InvalidParameters(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AnalysisError::NotFound(_) => StatusCode::NOT_FOUND,
            AnalysisError::ExecutionFailure(_)
            | AnalysisError::Timeout { .. }
            | AnalysisError::ParseFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        ApiError(err)
    }
}

/// Unreadable or malformed bodies are invalid requests, whatever axum thinks.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(AnalysisError::InvalidRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.to_string(),
            violations: self.0.violations().to_vec(),
        };
        (status, Json(body)).into_response()
    }
}
