use std::sync::LazyLock;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde_json::json;
use thiserror::Error;

use crate::models::work_plan::ErrorResponse;
use crate::workflow::formatter::ErrorCode;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
/// Every variant renders as an `ErrorResponse` body.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error in '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("Work plan generation failed: {}", .0.error_code)]
    Generation(ErrorResponse),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let reason = rejection.body_text();
        let field = missing_or_invalid_field(&reason).unwrap_or_else(|| "body".to_string());
        AppError::Validation { field, reason }
    }
}

static FIELD_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"field `([^`]+)`").ok());

/// Pulls the field name out of serde messages such as
/// "missing field `activity`" or "invalid type: ... for field `theme`".
fn missing_or_invalid_field(message: &str) -> Option<String> {
    FIELD_NAME
        .as_ref()?
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation { field, reason } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: "Nieprawidłowe dane wejściowe".to_string(),
                    error_code: "VALIDATION_ERROR".to_string(),
                    details: Some(json!({ "field": field, "reason": reason })),
                },
            ),
            AppError::Generation(response) => {
                let status = if response.error_code == ErrorCode::InvalidInput.as_str() {
                    StatusCode::BAD_REQUEST
                } else {
                    tracing::error!("Work plan generation failed: {}", response.error_code);
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (status, response)
            }
        };

        (status, Json(body)).into_response()
    }
}
