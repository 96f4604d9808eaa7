//! # API Error Types
//!
//! [`AppError`] implements `IntoResponse` and renders the failure envelope
//! `{"success": false, "error": "...", "code": "..."}`. Domain errors from
//! `klk-core` and `klk-ledger`, database errors and multipart errors convert
//! into it with `?`. Internal details are logged and never returned.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Failure envelope.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Always `false`.
    pub success: bool,
    /// Human-readable message.
    pub error: String,
    /// Machine-readable code, e.g. `NOT_FOUND`.
    pub code: String,
}

/// Application-level error.
#[derive(Error, Debug)]
pub enum AppError {
    /// Entity not found (404).
    #[error("{0}")]
    NotFound(String),

    /// Missing or malformed field (400).
    #[error("{0}")]
    BadRequest(String),

    /// Missing, invalid or expired credentials (401).
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but lacking a capability, or account disabled (403).
    #[error("{0}")]
    Forbidden(String),

    /// Duplicate unique key or illegal state transition (409).
    #[error("{0}")]
    Conflict(String),

    /// Route exists but not for this method (405).
    #[error("method not allowed")]
    MethodNotAllowed,

    /// Anything else (500). Logged, not returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status and machine-readable code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Shorthand for a 404 naming the missing entity.
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            success: false,
            error: message,
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<klk_core::ValidationError> for AppError {
    fn from(err: klk_core::ValidationError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<klk_ledger::LedgerError> for AppError {
    fn from(err: klk_ledger::LedgerError) -> Self {
        Self::Conflict(err.to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self::BadRequest(err.body_text())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if crate::db::is_unique_violation(&err) {
            return Self::Conflict("a record with these details already exists".into());
        }
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("record not found".into()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<crate::auth::TokenError> for AppError {
    fn from(err: crate::auth::TokenError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("background task: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(format!("file storage: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn response_parts(err: AppError) -> (StatusCode, ErrorBody) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        (status, body)
    }

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT),
            (AppError::MethodNotAllowed, StatusCode::METHOD_NOT_ALLOWED),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_and_code().0, status, "{err:?}");
        }
    }

    #[tokio::test]
    async fn envelope_shape() {
        let (status, body) = response_parts(AppError::not_found("Payment")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!body.success);
        assert_eq!(body.error, "Payment not found");
        assert_eq!(body.code, "NOT_FOUND");
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let (status, body) =
            response_parts(AppError::Internal("disk I/O error at page 7".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "An internal error occurred");
        assert!(!body.error.contains("page 7"));
    }

    #[test]
    fn validation_error_is_bad_request() {
        let err = AppError::from(klk_core::ValidationError::NonPositiveAmount);
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn ledger_error_is_conflict() {
        let err = AppError::from(klk_ledger::LedgerError::NotPending {
            payment_id: 3,
            status: klk_core::PaymentStatus::Verified,
        });
        assert_eq!(err.status_and_code().0, StatusCode::CONFLICT);
        assert!(err.to_string().contains("payment 3"));
    }

    #[test]
    fn row_not_found_is_404() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status_and_code().0, StatusCode::NOT_FOUND);
    }
}
