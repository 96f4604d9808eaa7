//! # klk-api: Axum API Service for Kids League Kenya
//!
//! HTTP surface of the sponsorship platform. Beneficiaries upload documents,
//! fee statements and payment receipts and read their academic progress;
//! administrators review and verify, record marks, manage education levels
//! and watch the dashboards.
//!
//! ## API Surface
//!
//! | Prefix                              | Module                        |
//! |-------------------------------------|-------------------------------|
//! | `/api/auth/*`                       | [`routes::auth`]              |
//! | `/api/profile`                      | [`routes::profile`]           |
//! | `/api/documents/*`                  | [`routes::documents`]         |
//! | `/api/fee-statements/*`             | [`routes::fee_statements`]    |
//! | `/api/payments/*`                   | [`routes::payments`]          |
//! | `/api/academics/*`                  | [`routes::academics`]         |
//! | `/api/messages/*`                   | [`routes::messages`]          |
//! | `/api/portal/dashboard`, `/api/admin/dashboard` | [`routes::dashboard`] |
//! | `/api/admin/beneficiaries/*`        | [`routes::beneficiaries`]     |
//! | `/api/admin/education-levels/*`     | [`routes::education`]         |
//! | `/api/admin/calendar/*`             | [`routes::calendar`]          |
//! | `/api/admin/notifications`, `audit-logs` | [`routes::admin`]        |
//!
//! ## Middleware Stack (outermost first)
//!
//! ```text
//! TraceLayer → error envelope → body limit → AuthMiddleware (matched routes) → Handler
//! ```
//!
//! Signup, login, `/openapi.json` and the `/health/*` checks are reachable
//! without a token.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod media;
pub mod middleware;
pub mod openapi;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
mod testing;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::{from_fn_with_state, map_response};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

pub use config::AppConfig;
pub use error::AppError;
pub use state::AppState;

/// Room for multipart framing and text fields on top of the largest file.
const MULTIPART_OVERHEAD: usize = 256 * 1024;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let protected = Router::new()
        .merge(routes::auth::router())
        .merge(routes::profile::router())
        .merge(routes::documents::router())
        .merge(routes::fee_statements::router())
        .merge(routes::payments::router())
        .merge(routes::academics::router())
        .merge(routes::messages::router())
        .merge(routes::education::router())
        .merge(routes::beneficiaries::router())
        .merge(routes::dashboard::router())
        .merge(routes::admin::router())
        .merge(routes::calendar::router())
        .route_layer(from_fn_with_state(state.clone(), auth::auth_middleware));

    let public = Router::new()
        .merge(routes::auth::public_router())
        .merge(openapi::router())
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));

    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .merge(public)
        .merge(protected)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(map_response(middleware::envelope::wrap_errors))
        .layer(middleware::tracing_layer::layer())
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::NotFound("Route not found".into())
}

/// Liveness check: the process is up.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness check: the database answers.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => (StatusCode::OK, "ready").into_response(),
        Err(e) => {
            tracing::warn!("database health check failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response()
        }
    }
}
