//! # Dashboards
//!
//! - **GET `/api/admin/dashboard`**: programme-wide counts, aid disbursed,
//!   level distribution, recent activity, upcoming due dates, top counties.
//! - **GET `/api/portal/dashboard`**: the caller's own overview.
//!
//! Level distribution reads the cached level aggregates; everything else is
//! queried live.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use klk_core::{DocumentStatus, Money};
use klk_stats::CountyCount;
use serde::Serialize;
use sqlx::SqliteConnection;
use utoipa::ToSchema;

use crate::auth::{Caller, Capability};
use crate::db::academics::{self, AcademicSummary};
use crate::db::audit::{self, AuditEntry};
use crate::db::payments::{self, PaymentSummary};
use crate::db::profiles::{self, BeneficiaryCounts, Scope};
use crate::db::statements::{self, DueSoon, StatementSummary};
use crate::db::{documents, education, messages, notifications};
use crate::error::AppError;
use crate::response::{ok, Envelope};
use crate::routes::profile::{load_view, ProfileView};
use crate::state::AppState;

const RECENT_ACTIVITY: i64 = 10;
const DUE_WITHIN_DAYS: i64 = 30;
const DUE_LIMIT: i64 = 5;
const TOP_COUNTIES: usize = 5;

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct DocumentCounts {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub requires_action: i64,
}

impl DocumentCounts {
    fn from_rows(rows: Vec<(String, i64)>) -> Self {
        let mut counts = Self::default();
        for (status, n) in rows {
            counts.total += n;
            match status.parse::<DocumentStatus>() {
                Ok(DocumentStatus::Pending) => counts.pending += n,
                Ok(DocumentStatus::Approved) => counts.approved += n,
                Ok(DocumentStatus::Rejected) => counts.rejected += n,
                Ok(DocumentStatus::RequiresAction) => counts.requires_action += n,
                Err(_) => tracing::warn!(%status, "unknown document status in counts"),
            }
        }
        counts
    }
}

async fn document_counts(
    conn: &mut SqliteConnection,
    user_id: Option<i64>,
) -> Result<DocumentCounts, sqlx::Error> {
    Ok(DocumentCounts::from_rows(
        documents::counts_by_status(conn, user_id).await?,
    ))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AidDisbursed {
    #[schema(value_type = String)]
    pub total: Money,
    #[schema(value_type = String)]
    pub this_month: Money,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LevelShare {
    pub level_key: String,
    pub title: String,
    pub total_students: i64,
    pub average_performance: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminDashboard {
    pub beneficiaries: BeneficiaryCounts,
    pub aid_disbursed: AidDisbursed,
    pub documents: DocumentCounts,
    pub payments: PaymentSummary,
    pub level_distribution: Vec<LevelShare>,
    pub recent_activity: Vec<AuditEntry>,
    pub upcoming_due: Vec<DueSoon>,
    #[schema(value_type = Vec<Object>)]
    pub top_counties: Vec<CountyCount>,
    pub unread_notifications: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PortalDashboard {
    pub profile: ProfileView,
    pub documents: DocumentCounts,
    pub year: i32,
    pub fees: StatementSummary,
    #[schema(value_type = String)]
    pub total_verified_payments: Money,
    pub pending_payments: i64,
    pub latest_academic_summary: Option<AcademicSummary>,
    pub unread_messages: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/dashboard", get(admin_dashboard))
        .route("/api/portal/dashboard", get(portal_dashboard))
}

fn month_start(today: NaiveDate) -> NaiveDate {
    today.with_day(1).unwrap_or(today)
}

#[utoipa::path(
    get,
    path = "/api/admin/dashboard",
    responses(
        (status = 200, description = "Programme overview", body = AdminDashboard),
        (status = 403, description = "Not an administrator", body = crate::error::ErrorBody),
    ),
    tag = "dashboard"
)]
async fn admin_dashboard(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Envelope<AdminDashboard>>, AppError> {
    caller.require(Capability::ViewAdminDashboard)?;
    let today = Utc::now().date_naive();
    let first = month_start(today);
    let mut conn = state.pool.acquire().await?;

    let mut level_distribution = Vec::new();
    for level in education::list_levels(&mut conn, true).await? {
        let stats = education::level_stats(&mut conn, level.id).await?;
        level_distribution.push(LevelShare {
            level_key: level.level_key,
            title: level.title,
            total_students: stats.total_students,
            average_performance: stats.average_performance,
        });
    }
    let everyone = profiles::snapshots(&mut conn, Scope::All).await?;

    Ok(ok(AdminDashboard {
        beneficiaries: profiles::beneficiary_counts(&mut conn, first).await?,
        aid_disbursed: AidDisbursed {
            total: payments::verified_total_since(&mut conn, None).await?,
            this_month: payments::verified_total_since(&mut conn, Some(first)).await?,
        },
        documents: document_counts(&mut conn, None).await?,
        payments: payments::summary(&mut conn, None, None).await?,
        level_distribution,
        recent_activity: audit::recent(&mut conn, RECENT_ACTIVITY).await?,
        upcoming_due: statements::upcoming_due(
            &mut conn,
            today,
            today + Duration::days(DUE_WITHIN_DAYS),
            DUE_LIMIT,
        )
        .await?,
        top_counties: klk_stats::county_distribution(&everyone, TOP_COUNTIES),
        unread_notifications: notifications::unread_count(&mut conn, caller.user_id).await?,
    }))
}

#[utoipa::path(
    get,
    path = "/api/portal/dashboard",
    responses((status = 200, description = "Caller's overview", body = PortalDashboard)),
    tag = "dashboard"
)]
async fn portal_dashboard(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Envelope<PortalDashboard>>, AppError> {
    caller.require(Capability::UsePortal)?;
    let year = Utc::now().year();
    let mut conn = state.pool.acquire().await?;
    let paid = payments::summary(&mut conn, Some(caller.user_id), None).await?;
    Ok(ok(PortalDashboard {
        profile: load_view(&mut conn, caller.user_id).await?,
        documents: document_counts(&mut conn, Some(caller.user_id)).await?,
        year,
        fees: statements::summary(&mut conn, Some(caller.user_id), Some(year)).await?,
        total_verified_payments: paid.total_verified,
        pending_payments: paid.pending_count,
        latest_academic_summary: academics::summaries_for_user(&mut conn, caller.user_id)
            .await?
            .into_iter()
            .next(),
        unread_messages: messages::unread_count(&mut conn, caller.user_id).await?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn document_counts_fold_statuses() {
        let counts = DocumentCounts::from_rows(vec![
            ("approved".into(), 3),
            ("pending".into(), 2),
            ("requires_action".into(), 1),
        ]);
        assert_eq!(counts.total, 6);
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.rejected, 0);
    }

    #[tokio::test]
    async fn admin_dashboard_counts() {
        let t = TestApp::new().await;
        t.put("/api/profile", &t.user_token, json!({"county": "Kisumu"})).await;
        let (status, body) = t.get("/api/admin/dashboard", &t.admin_token).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["beneficiaries"]["total"], 1);
        assert_eq!(body["aid_disbursed"]["total"], "0.00");
        assert_eq!(body["top_counties"][0]["county"], "Kisumu");

        let (status, _) = t.get("/api/admin/dashboard", &t.user_token).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn portal_dashboard_for_new_user() {
        let t = TestApp::new().await;
        let (status, body) = t.get("/api/portal/dashboard", &t.user_token).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["profile"]["full_name"], "Amani Otieno");
        assert_eq!(body["documents"]["total"], 0);
        assert_eq!(body["fees"]["total_fees"], "0.00");
        assert_eq!(body["latest_academic_summary"], serde_json::Value::Null);
        assert_eq!(body["unread_messages"], 0);
    }
}
