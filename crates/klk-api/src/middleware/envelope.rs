//! Rewrites framework-generated error responses into the failure envelope.
//!
//! Handlers already answer with `{"success": false, ...}` through
//! [`AppError`]. Responses produced by axum itself (405 for a known path,
//! 413 from the body limit, plain-text extractor rejections) carry a bare
//! body; this layer replaces them so every error looks the same on the wire.
//! Client errors outside 400/401/403/404/409 are answered as 400, with the
//! original condition kept in `code`.

use axum::body::to_bytes;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::{AppError, ErrorBody};

const MAX_REJECTION_BODY: usize = 4 * 1024;

/// `map_response` hook. JSON and successful responses pass through.
pub async fn wrap_errors(response: Response) -> Response {
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) || is_json(&response) {
        return response;
    }
    if status == StatusCode::METHOD_NOT_ALLOWED {
        return AppError::MethodNotAllowed.into_response();
    }

    let (parts, body) = response.into_parts();
    let text = match to_bytes(body, MAX_REJECTION_BODY).await {
        Ok(bytes) if !bytes.is_empty() => String::from_utf8_lossy(&bytes).trim().to_string(),
        _ => status.canonical_reason().unwrap_or("Request failed").to_string(),
    };
    let (answered, code) = classify(status);
    tracing::debug!(
        status = status.as_u16(),
        answered = answered.as_u16(),
        error = %text,
        "wrapped framework rejection"
    );

    let mut wrapped = (
        answered,
        Json(ErrorBody {
            success: false,
            error: text,
            code: code.to_string(),
        }),
    )
        .into_response();
    for name in [header::WWW_AUTHENTICATE, header::ALLOW] {
        if let Some(value) = parts.headers.get(&name) {
            wrapped.headers_mut().insert(name, value.clone());
        }
    }
    wrapped
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

/// Status sent to the client and the error code for a framework status.
fn classify(status: StatusCode) -> (StatusCode, &'static str) {
    match status {
        StatusCode::BAD_REQUEST => (status, "BAD_REQUEST"),
        StatusCode::UNAUTHORIZED => (status, "UNAUTHORIZED"),
        StatusCode::FORBIDDEN => (status, "FORBIDDEN"),
        StatusCode::NOT_FOUND => (status, "NOT_FOUND"),
        StatusCode::CONFLICT => (status, "CONFLICT"),
        StatusCode::PAYLOAD_TOO_LARGE => (StatusCode::BAD_REQUEST, "PAYLOAD_TOO_LARGE"),
        StatusCode::UNSUPPORTED_MEDIA_TYPE => (StatusCode::BAD_REQUEST, "UNSUPPORTED_MEDIA_TYPE"),
        StatusCode::UNPROCESSABLE_ENTITY => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        s if s.is_server_error() => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        _ => (StatusCode::BAD_REQUEST, "REQUEST_FAILED"),
    }
}
