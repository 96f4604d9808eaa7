//! # OpenAPI Specification Assembly
//!
//! Collects every `#[utoipa::path]` handler and response schema into one
//! document, served at `/openapi.json` without authentication.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the bearer token security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("HS256")
                        .description(Some("Token returned by /api/auth/login or /api/auth/signup."))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Kids League Kenya Portal API",
        version = "0.3.0",
        description = "Sponsorship backend: beneficiary profiles, supporting documents, fee statements, payment receipts and their reconciliation, academic performance, messaging, the school calendar and per-level statistics.\n\nAll `/api/*` endpoints except signup and login require `Authorization: Bearer <token>`. Health checks (`/health/*`) are unauthenticated.",
        license(name = "BUSL-1.1")
    ),
    servers((url = "http://localhost:8080", description = "Local development server")),
    security(("bearer_auth" = [])),
    paths(
        // academics
        crate::routes::academics::overview,
        crate::routes::academics::subject,
        crate::routes::academics::grade_guide,
        crate::routes::academics::record_marks,
        crate::routes::academics::record_summary,
        // admin
        crate::routes::admin::list_notifications,
        crate::routes::admin::read_notification,
        crate::routes::admin::audit_logs,
        crate::routes::admin::audit_integrity,
        // auth
        crate::routes::auth::signup,
        crate::routes::auth::login,
        crate::routes::auth::logout,
        crate::routes::auth::validate,
        crate::routes::auth::change_password,
        // beneficiaries
        crate::routes::beneficiaries::list,
        crate::routes::beneficiaries::create,
        crate::routes::beneficiaries::detail,
        crate::routes::beneficiaries::update,
        // calendar
        crate::routes::calendar::list_events,
        crate::routes::calendar::create_event,
        crate::routes::calendar::update_event,
        crate::routes::calendar::stats,
        crate::routes::calendar::list_terms,
        crate::routes::calendar::create_term,
        crate::routes::calendar::update_term,
        // dashboard
        crate::routes::dashboard::admin_dashboard,
        crate::routes::dashboard::portal_dashboard,
        // documents
        crate::routes::documents::upload_document,
        crate::routes::documents::list_documents,
        crate::routes::documents::delete_document,
        crate::routes::documents::download_document,
        crate::routes::documents::document_types,
        crate::routes::documents::pending_documents,
        crate::routes::documents::review_document,
        // education
        crate::routes::education::list_levels,
        crate::routes::education::create_level,
        crate::routes::education::level_detail,
        crate::routes::education::update_level,
        crate::routes::education::recompute_level,
        crate::routes::education::create_grade,
        crate::routes::education::grade_students,
        crate::routes::education::assign_level,
        crate::routes::education::dashboard,
        // fee_statements
        crate::routes::fee_statements::list_own,
        crate::routes::fee_statements::summary_own,
        crate::routes::fee_statements::years_own,
        crate::routes::fee_statements::upload_statement,
        crate::routes::fee_statements::download_own,
        crate::routes::fee_statements::list_all,
        crate::routes::fee_statements::summary_all,
        crate::routes::fee_statements::years_all,
        crate::routes::fee_statements::get_statement,
        crate::routes::fee_statements::update_statement,
        crate::routes::fee_statements::download_any,
        // messages
        crate::routes::messages::mailbox,
        crate::routes::messages::send_to_office,
        crate::routes::messages::send_as_admin,
        crate::routes::messages::mark_read,
        crate::routes::messages::remove,
        // payments
        crate::routes::payments::upload_receipt,
        crate::routes::payments::list_own,
        crate::routes::payments::summary_own,
        crate::routes::payments::methods,
        crate::routes::payments::download_own,
        crate::routes::payments::list_all,
        crate::routes::payments::verify_payment,
        crate::routes::payments::link_payment,
        crate::routes::payments::download_any,
        // profile
        crate::routes::profile::get_profile,
        crate::routes::profile::update_profile,
    ),
    components(schemas(
        // academics
        crate::routes::academics::AcademicOverview,
        crate::routes::academics::Band,
        crate::routes::academics::GradeGuide,
        crate::routes::academics::RecordRequest,
        crate::routes::academics::RecordSaved,
        crate::routes::academics::SubjectHistory,
        crate::routes::academics::SummaryRequest,
        crate::routes::academics::SummarySaved,
        // admin
        crate::routes::admin::AuditLogList,
        crate::routes::admin::NotificationList,
        // auth
        crate::routes::auth::AuthResponse,
        crate::routes::auth::ChangePasswordRequest,
        crate::routes::auth::LoginRequest,
        crate::routes::auth::MessageResponse,
        crate::routes::auth::SignupRequest,
        crate::routes::auth::ValidateResponse,
        // beneficiaries
        crate::routes::beneficiaries::BeneficiaryDetail,
        crate::routes::beneficiaries::BeneficiaryList,
        crate::routes::beneficiaries::BeneficiarySaved,
        crate::routes::beneficiaries::CreateBeneficiaryRequest,
        crate::routes::beneficiaries::UpdateBeneficiaryRequest,
        // calendar
        crate::routes::calendar::EventList,
        crate::routes::calendar::EventSaved,
        crate::routes::calendar::TermList,
        crate::routes::calendar::TermSaved,
        crate::routes::calendar::TermView,
        // dashboard
        crate::routes::dashboard::AdminDashboard,
        crate::routes::dashboard::AidDisbursed,
        crate::routes::dashboard::DocumentCounts,
        crate::routes::dashboard::LevelShare,
        crate::routes::dashboard::PortalDashboard,
        // documents
        crate::routes::documents::Choice,
        crate::routes::documents::Deleted,
        crate::routes::documents::DocumentList,
        crate::routes::documents::DocumentReviewed,
        crate::routes::documents::DocumentTypes,
        crate::routes::documents::DocumentUploaded,
        crate::routes::documents::PendingList,
        crate::routes::documents::ReviewRequest,
        // education
        crate::routes::education::AssignLevelRequest,
        crate::routes::education::CreateGradeRequest,
        crate::routes::education::CreateLevelRequest,
        crate::routes::education::EducationDashboard,
        crate::routes::education::GradeEntry,
        crate::routes::education::GradeRoster,
        crate::routes::education::GradeSaved,
        crate::routes::education::LevelDetail,
        crate::routes::education::LevelEntry,
        crate::routes::education::LevelList,
        crate::routes::education::LevelSaved,
        crate::routes::education::PlacementChanged,
        crate::routes::education::Recomputed,
        crate::routes::education::TopGrade,
        // fee_statements
        crate::routes::fee_statements::Outstanding,
        crate::routes::fee_statements::StatementList,
        crate::routes::fee_statements::StatementSaved,
        crate::routes::fee_statements::StatementSummaryResponse,
        crate::routes::fee_statements::StatementView,
        crate::routes::fee_statements::SummaryStats,
        crate::routes::fee_statements::UpdateStatementRequest,
        crate::routes::fee_statements::YearsResponse,
        // messages
        crate::routes::messages::AdminSendRequest,
        crate::routes::messages::Mailbox,
        crate::routes::messages::MessageSent,
        crate::routes::messages::SendRequest,
        // payments
        crate::routes::payments::LinkRequest,
        crate::routes::payments::LinkResponse,
        crate::routes::payments::MethodsResponse,
        crate::routes::payments::PaymentList,
        crate::routes::payments::PaymentSubmitted,
        crate::routes::payments::PaymentView,
        crate::routes::payments::SummaryResponse,
        crate::routes::payments::VerifyRequest,
        crate::routes::payments::VerifyResponse,
        // profile
        crate::routes::profile::ProfileResponse,
        crate::routes::profile::ProfileUpdated,
        crate::routes::profile::ProfileView,
        crate::routes::profile::UpdateProfileRequest,
        // academics
        crate::db::academics::AcademicRecord,
        crate::db::academics::AcademicSummary,
        // audit
        crate::db::audit::AuditEntry,
        crate::db::audit::ChainIntegrityResult,
        // calendar
        crate::db::calendar::CalendarEvent,
        crate::db::calendar::CalendarStats,
        crate::db::calendar::EventFields,
        crate::db::calendar::TermFields,
        // documents
        crate::db::documents::Document,
        crate::db::documents::PendingDocument,
        // education
        crate::db::education::Grade,
        crate::db::education::Level,
        crate::db::education::LevelFields,
        // messages
        crate::db::messages::Message,
        // notifications
        crate::db::notifications::Notification,
        // payments
        crate::db::payments::PaymentRecord,
        crate::db::payments::PaymentSummary,
        // profiles
        crate::db::profiles::BeneficiaryCounts,
        crate::db::profiles::BeneficiaryRow,
        crate::db::profiles::Profile,
        crate::db::profiles::ProfileFields,
        // statements
        crate::db::statements::DueSoon,
        crate::db::statements::StatementRecord,
        crate::db::statements::StatementSummary,
        // error
        crate::error::ErrorBody,
        // extractors
        crate::extractors::PageInfo,
        // reconciliation
        crate::services::reconciliation::Decision,
        crate::services::reconciliation::ReviewReport,
        // stats
        crate::services::stats::Refreshed,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Signup, login and token validation"),
        (name = "profile", description = "The caller's own profile"),
        (name = "documents", description = "Supporting documents and their review"),
        (name = "fee-statements", description = "Fee statements per term"),
        (name = "payments", description = "Payment receipts and verification against fee statements"),
        (name = "academics", description = "Marks, term summaries and the grading scale"),
        (name = "messages", description = "Messages between beneficiaries and the office"),
        (name = "education", description = "Education levels, grade classes and their statistics"),
        (name = "beneficiaries", description = "Administrative beneficiary management"),
        (name = "dashboard", description = "Admin and portal dashboards"),
        (name = "admin", description = "Notifications and the audit log"),
        (name = "calendar", description = "Calendar events and academic terms"),
    )
)]
pub struct ApiDoc;

/// Serves the document at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_generates_with_paths() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Kids League Kenya Portal API");
        assert!(!spec.paths.paths.is_empty());
    }

    #[test]
    fn reconciliation_paths_are_documented() {
        let spec = ApiDoc::openapi();
        for path in [
            "/api/payments",
            "/api/admin/payments/{id}/verify",
            "/api/admin/payments/{id}/link",
            "/api/admin/education-levels/{key}/recompute",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
