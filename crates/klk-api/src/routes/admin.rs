//! # Admin Notifications & Audit Log
//!
//! - **GET `/api/admin/notifications`**: `?unread_only=true&limit=`
//! - **POST `/api/admin/notifications/:id/read`**
//! - **GET `/api/admin/audit-logs`**: paginated, `?action=&model=`
//! - **GET `/api/admin/audit-logs/integrity`**: walk the hash chain

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use klk_core::AuditAction;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{Caller, Capability};
use crate::db::audit::{self, AuditEntry, AuditFilter, ChainIntegrityResult};
use crate::db::notifications::{self, Notification};
use crate::error::AppError;
use crate::extractors::{PageInfo, Pagination};
use crate::response::{ok, Envelope};
use crate::routes::auth::MessageResponse;
use crate::routes::parse_filter;
use crate::state::AppState;

const DEFAULT_NOTIFICATION_LIMIT: i64 = 20;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AuditQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub action: Option<String>,
    /// Model name, e.g. `Payment`.
    pub model: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogList {
    pub logs: Vec<AuditEntry>,
    pub pagination: PageInfo,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/notifications", get(list_notifications))
        .route("/api/admin/notifications/:id/read", post(read_notification))
        .route("/api/admin/audit-logs", get(audit_logs))
        .route("/api/admin/audit-logs/integrity", get(audit_integrity))
}

#[utoipa::path(
    get,
    path = "/api/admin/notifications",
    params(NotificationQuery),
    responses((status = 200, description = "Caller's notifications", body = NotificationList)),
    tag = "admin"
)]
async fn list_notifications(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Envelope<NotificationList>>, AppError> {
    caller.require(Capability::ViewAdminDashboard)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_NOTIFICATION_LIMIT)
        .clamp(1, Pagination::MAX_PAGE_SIZE);
    let mut conn = state.pool.acquire().await?;
    Ok(ok(NotificationList {
        notifications: notifications::list_for(&mut conn, caller.user_id, query.unread_only, limit)
            .await?,
        unread_count: notifications::unread_count(&mut conn, caller.user_id).await?,
    }))
}

#[utoipa::path(
    post,
    path = "/api/admin/notifications/{id}/read",
    params(("id" = i64, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Marked read", body = MessageResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn read_notification(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<MessageResponse>>, AppError> {
    caller.require(Capability::ViewAdminDashboard)?;
    let mut conn = state.pool.acquire().await?;
    if !notifications::mark_read(&mut conn, id, caller.user_id).await? {
        return Err(AppError::not_found("Notification"));
    }
    Ok(ok(MessageResponse::new("Notification marked as read")))
}

#[utoipa::path(
    get,
    path = "/api/admin/audit-logs",
    params(AuditQuery),
    responses(
        (status = 200, description = "Audit entries, newest first", body = AuditLogList),
        (status = 400, description = "Unknown action", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn audit_logs(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Envelope<AuditLogList>>, AppError> {
    caller.require(Capability::ViewAuditLog)?;
    let filter = AuditFilter {
        action: parse_filter::<AuditAction>(query.action.as_deref())?,
        model_name: query.model.filter(|m| !m.trim().is_empty()),
    };
    let page = Pagination {
        page: query.page,
        page_size: query.page_size,
    };
    let mut conn = state.pool.acquire().await?;
    let (logs, total) = audit::list(&mut conn, &filter, &page).await?;
    Ok(ok(AuditLogList {
        logs,
        pagination: page.info(total),
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/audit-logs/integrity",
    responses((status = 200, description = "Hash chain check", body = ChainIntegrityResult)),
    tag = "admin"
)]
async fn audit_integrity(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Envelope<ChainIntegrityResult>>, AppError> {
    caller.require(Capability::ViewAuditLog)?;
    let mut conn = state.pool.acquire().await?;
    let result = audit::verify_chain_integrity(&mut conn).await?;
    if !result.chain_valid {
        tracing::error!(
            broken_links = result.broken_links,
            tampered_entries = result.tampered_entries,
            first_bad_id = ?result.first_bad_id,
            "audit chain integrity check failed"
        );
    }
    Ok(ok(result))
}

#[cfg(test)]
mod tests {
    use crate::testing::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn audit_log_filters_and_chain() {
        let t = TestApp::new().await;
        t.put(
            &format!("/api/admin/beneficiaries/{}", t.user_id),
            &t.admin_token,
            json!({"school": "Kenya High"}),
        )
        .await;
        t.post(
            "/api/admin/education-levels",
            &t.admin_token,
            json!({"level_key": "primary", "title": "Primary"}),
        )
        .await;

        let (status, body) = t.get("/api/admin/audit-logs", &t.admin_token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["total"], 2);
        assert_eq!(body["logs"][0]["model_name"], "EducationLevel");
        assert_eq!(body["logs"][0]["username"], "admin");

        let (_, body) = t.get("/api/admin/audit-logs?action=update", &t.admin_token).await;
        assert_eq!(body["pagination"]["total"], 1);
        let (status, _) = t.get("/api/admin/audit-logs?action=explode", &t.admin_token).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = t.get("/api/admin/audit-logs/integrity", &t.admin_token).await;
        assert_eq!(body["chain_valid"], true);
        assert_eq!(body["total_entries"], 2);

        let (status, _) = t.get("/api/admin/audit-logs", &t.user_token).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn notifications_are_per_recipient() {
        let t = TestApp::new().await;
        t.multipart(
            "/api/documents",
            &t.user_token,
            &[("name", "Report card"), ("document_type", "report_card")],
            Some(("card.pdf", b"%PDF")),
        )
        .await;
        let (_, body) = t.get("/api/admin/notifications?unread_only=true", &t.admin_token).await;
        assert_eq!(body["unread_count"], 1);
        let id = body["notifications"][0]["id"].as_i64().unwrap();

        let (status, _) = t
            .post(&format!("/api/admin/notifications/{id}/read"), &t.admin_token, json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = t
            .post(&format!("/api/admin/notifications/{}/read", id + 100), &t.admin_token, json!({}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, body) = t.get("/api/admin/notifications", &t.admin_token).await;
        assert_eq!(body["unread_count"], 0);
    }
}
