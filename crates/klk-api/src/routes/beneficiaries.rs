//! # Beneficiary Management
//!
//! Administrator view of every sponsored student: search, onboarding with
//! level and grade placement, the full per-student record, and edits that
//! refresh the student's level and grade aggregates.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use klk_core::validation::{validate_email, validate_password};
use klk_core::{AuditAction, Role, SponsorshipStatus};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{hash_password_blocking, Caller, Capability};
use crate::db::academics::{self, AcademicSummary};
use crate::db::audit::{self, AuditEvent};
use crate::db::documents::{self, Document};
use crate::db::payments::{self, PaymentRecord};
use crate::db::profiles::{self, BeneficiaryFilter, BeneficiaryRow, ProfileFields};
use crate::db::statements;
use crate::db::users;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, ClientMeta, PageInfo, Pagination, Validate};
use crate::response::{ok, Envelope};
use crate::routes::education::resolve_placement;
use crate::routes::fee_statements::StatementView;
use crate::routes::parse_filter;
use crate::routes::profile::{load_view, ProfileView};
use crate::services::stats::{self, Refreshed};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct BeneficiaryList {
    pub beneficiaries: Vec<BeneficiaryRow>,
    pub pagination: PageInfo,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBeneficiaryRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub education_level_id: Option<i64>,
    pub grade_class_id: Option<i64>,
    #[serde(flatten)]
    pub profile: ProfileFields,
}

impl Validate for CreateBeneficiaryRequest {
    fn validate(&self) -> Result<(), String> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err("First and last name are required".into());
        }
        validate_email(&self.email).map_err(|e| e.to_string())?;
        validate_password(&self.password).map_err(|e| e.to_string())?;
        self.profile.check().map_err(|e| e.to_string())
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateBeneficiaryRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
    #[serde(flatten)]
    pub profile: ProfileFields,
}

impl Validate for UpdateBeneficiaryRequest {
    fn validate(&self) -> Result<(), String> {
        for name in [&self.first_name, &self.last_name].into_iter().flatten() {
            if name.trim().is_empty() {
                return Err("Names cannot be blank".into());
            }
        }
        if let Some(email) = &self.email {
            validate_email(email).map_err(|e| e.to_string())?;
        }
        self.profile.check().map_err(|e| e.to_string())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BeneficiarySaved {
    pub message: String,
    pub beneficiary: ProfileView,
    pub stats: Refreshed,
}

/// Everything on file for one beneficiary.
#[derive(Debug, Serialize, ToSchema)]
pub struct BeneficiaryDetail {
    pub beneficiary: ProfileView,
    pub fee_statements: Vec<StatementView>,
    pub payments: Vec<PaymentRecord>,
    pub documents: Vec<Document>,
    pub academic_summaries: Vec<AcademicSummary>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/beneficiaries", get(list).post(create))
        .route("/api/admin/beneficiaries/:id", get(detail).put(update))
}

async fn load_beneficiary(
    conn: &mut sqlx::SqliteConnection,
    user_id: i64,
) -> Result<ProfileView, AppError> {
    let view = load_view(conn, user_id).await?;
    if view.profile.role != Role::Beneficiary {
        return Err(AppError::not_found("Beneficiary"));
    }
    Ok(view)
}

#[utoipa::path(
    get,
    path = "/api/admin/beneficiaries",
    params(Pagination, BeneficiaryFilter),
    responses((status = 200, description = "Beneficiaries", body = BeneficiaryList)),
    tag = "beneficiaries"
)]
async fn list(
    State(state): State<AppState>,
    caller: Caller,
    Query(page): Query<Pagination>,
    Query(filter): Query<BeneficiaryFilter>,
) -> Result<Json<Envelope<BeneficiaryList>>, AppError> {
    caller.require(Capability::ManageBeneficiaries)?;
    parse_filter::<SponsorshipStatus>(filter.status.as_deref())?;
    let mut conn = state.pool.acquire().await?;
    let (beneficiaries, total) = profiles::list_beneficiaries(&mut conn, &filter, &page).await?;
    Ok(ok(BeneficiaryList {
        beneficiaries,
        pagination: page.info(total),
    }))
}

#[utoipa::path(
    post,
    path = "/api/admin/beneficiaries",
    request_body = CreateBeneficiaryRequest,
    responses(
        (status = 200, description = "Beneficiary created", body = BeneficiarySaved),
        (status = 400, description = "Invalid input or placement", body = crate::error::ErrorBody),
        (status = 409, description = "Email already registered", body = crate::error::ErrorBody),
    ),
    tag = "beneficiaries"
)]
async fn create(
    State(state): State<AppState>,
    caller: Caller,
    client: ClientMeta,
    body: Result<Json<CreateBeneficiaryRequest>, JsonRejection>,
) -> Result<Json<Envelope<BeneficiarySaved>>, AppError> {
    caller.require(Capability::ManageBeneficiaries)?;
    let req = extract_validated_json(body)?;
    let email = validate_email(&req.email)?;
    let hash = hash_password_blocking(req.password.clone(), state.config.password_iterations).await?;
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    if users::email_exists(&mut tx, &email).await? {
        return Err(AppError::Conflict("Email already registered".into()));
    }
    let (level_id, grade_id) =
        resolve_placement(&mut tx, req.education_level_id, req.grade_class_id).await?;
    let base = email.split('@').next().unwrap_or("student");
    let username = users::unique_username(&mut tx, base).await?;
    let user_id = users::insert_user(
        &mut tx,
        &users::NewUser {
            username: &username,
            email: &email,
            password_hash: &hash,
            first_name: req.first_name.trim(),
            last_name: req.last_name.trim(),
            is_staff: false,
            is_superuser: false,
        },
        now,
    )
    .await?;
    profiles::insert(&mut tx, user_id, Role::Beneficiary, &req.profile, now).await?;
    profiles::set_placement(&mut tx, user_id, level_id, grade_id, now).await?;
    audit::append(
        &mut tx,
        AuditEvent {
            user_id: Some(caller.user_id),
            action: AuditAction::Create,
            model_name: "BeneficiaryProfile",
            object_id: user_id,
            description: format!(
                "Created beneficiary {} {} <{email}>",
                req.first_name.trim(),
                req.last_name.trim()
            ),
            client: &client,
        },
        now,
    )
    .await?;
    let refreshed = stats::refresh_placement(&mut tx, level_id, grade_id, now).await?;
    let beneficiary = load_view(&mut tx, user_id).await?;
    tx.commit().await?;

    tracing::info!(user_id, created_by = caller.user_id, "beneficiary created");
    Ok(ok(BeneficiarySaved {
        message: "Beneficiary created successfully".into(),
        beneficiary,
        stats: refreshed,
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/beneficiaries/{id}",
    params(("id" = i64, Path, description = "Beneficiary user id")),
    responses(
        (status = 200, description = "Full record", body = BeneficiaryDetail),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "beneficiaries"
)]
async fn detail(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<i64>,
) -> Result<Json<Envelope<BeneficiaryDetail>>, AppError> {
    caller.require(Capability::ManageBeneficiaries)?;
    let mut conn = state.pool.acquire().await?;
    let beneficiary = load_beneficiary(&mut conn, user_id).await?;
    Ok(ok(BeneficiaryDetail {
        beneficiary,
        fee_statements: statements::for_user(&mut conn, user_id)
            .await?
            .into_iter()
            .map(StatementView::from)
            .collect(),
        payments: payments::for_user(&mut conn, user_id).await?,
        documents: documents::list_for_user(&mut conn, user_id, None, None).await?,
        academic_summaries: academics::summaries_for_user(&mut conn, user_id).await?,
    }))
}

#[utoipa::path(
    put,
    path = "/api/admin/beneficiaries/{id}",
    params(("id" = i64, Path, description = "Beneficiary user id")),
    request_body = UpdateBeneficiaryRequest,
    responses(
        (status = 200, description = "Beneficiary updated", body = BeneficiarySaved),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Email already registered", body = crate::error::ErrorBody),
    ),
    tag = "beneficiaries"
)]
async fn update(
    State(state): State<AppState>,
    caller: Caller,
    client: ClientMeta,
    Path(user_id): Path<i64>,
    body: Result<Json<UpdateBeneficiaryRequest>, JsonRejection>,
) -> Result<Json<Envelope<BeneficiarySaved>>, AppError> {
    caller.require(Capability::ManageBeneficiaries)?;
    let req = extract_validated_json(body)?;
    let email = req.email.as_deref().map(validate_email).transpose()?;
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    let current = load_beneficiary(&mut tx, user_id).await?;
    if let Some(email) = &email {
        if *email != current.email && users::email_exists(&mut tx, email).await? {
            return Err(AppError::Conflict("Email already registered".into()));
        }
    }
    users::update_identity(
        &mut tx,
        user_id,
        req.first_name.as_deref().map(str::trim),
        req.last_name.as_deref().map(str::trim),
        email.as_deref(),
        req.is_active,
    )
    .await?;
    profiles::update(&mut tx, user_id, &req.profile, now).await?;
    audit::append(
        &mut tx,
        AuditEvent {
            user_id: Some(caller.user_id),
            action: AuditAction::Update,
            model_name: "BeneficiaryProfile",
            object_id: user_id,
            description: format!("Updated beneficiary {}", current.full_name),
            client: &client,
        },
        now,
    )
    .await?;
    let refreshed = stats::refresh_for_user(&mut tx, user_id, now).await?;
    let beneficiary = load_view(&mut tx, user_id).await?;
    tx.commit().await?;

    Ok(ok(BeneficiarySaved {
        message: "Beneficiary updated successfully".into(),
        beneficiary,
        stats: refreshed,
    }))
}
