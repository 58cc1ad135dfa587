//! Error handling utilities for route handlers

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error response: HTTP status plus a machine-readable JSON body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub detail: Option<serde_json::Value>,
    pub resume_at: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resume_at: Option<&'a str>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> ApiError {
        ApiError {
            status,
            code,
            message: message.into(),
            detail: None,
            resume_at: None,
        }
    }

    pub fn bad_request(code: &'static str) -> ApiError {
        ApiError::new(StatusCode::BAD_REQUEST, code, "Bad request")
    }

    /// 400 INVALID_PAYLOAD with per-field validation detail
    pub fn invalid_payload(detail: serde_json::Value) -> ApiError {
        let mut error = ApiError::bad_request("INVALID_PAYLOAD");
        error.detail = Some(detail);
        error
    }

    pub fn unauthorized() -> ApiError {
        ApiError::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "Missing or invalid member headers",
        )
    }

    pub fn forbidden(code: &'static str) -> ApiError {
        ApiError::new(StatusCode::FORBIDDEN, code, "Forbidden")
    }

    pub fn not_found(code: &'static str) -> ApiError {
        ApiError::new(StatusCode::NOT_FOUND, code, "Not found")
    }

    pub fn conflict(code: &'static str) -> ApiError {
        ApiError::new(StatusCode::CONFLICT, code, "Conflict")
    }

    pub fn too_many_requests() -> ApiError {
        ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "TOO_MANY_REQUESTS",
            "Too many create/join requests for today",
        )
    }

    /// 503 returned while the daily write quota is exhausted
    pub fn service_paused(resume_at: String) -> ApiError {
        let mut error = ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_PAUSED_DAILY_QUOTA",
            "Daily write quota reached",
        );
        error.resume_at = Some(resume_at);
        error
    }

    pub fn internal() -> ApiError {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Internal server error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            code: self.code,
            message: &self.message,
            detail: self.detail.as_ref(),
            resume_at: self.resume_at.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Extension trait for logging errors and converting to ApiError
pub trait LogErr<T> {
    /// Log error with context and return a generic internal error
    fn or_internal(self, context: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> LogErr<T> for Result<T, E> {
    fn or_internal(self, context: &str) -> Result<T, ApiError> {
        self.map_err(|e| {
            eprintln!("{}: {}", context, e);
            ApiError::internal()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paused_error_serializes_resume_at() {
        let error = ApiError::service_paused("2024-01-01T15:00:00.000Z".to_string());
        let body = ApiErrorBody {
            code: error.code,
            message: &error.message,
            detail: error.detail.as_ref(),
            resume_at: error.resume_at.as_deref(),
        };
        let json = serde_json::to_string(&body).expect("serialize error body");
        assert!(json.contains("\"code\":\"SERVICE_PAUSED_DAILY_QUOTA\""));
        assert!(json.contains("\"resumeAt\":\"2024-01-01T15:00:00.000Z\""));
        assert!(!json.contains("detail"));
    }

    #[test]
    fn plain_errors_omit_optional_fields() {
        let error = ApiError::not_found("GROUP_NOT_FOUND");
        let body = ApiErrorBody {
            code: error.code,
            message: &error.message,
            detail: error.detail.as_ref(),
            resume_at: error.resume_at.as_deref(),
        };
        let json = serde_json::to_string(&body).expect("serialize error body");
        assert_eq!(json, "{\"code\":\"GROUP_NOT_FOUND\",\"message\":\"Not found\"}");
    }
}
