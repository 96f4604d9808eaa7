//! # Academics
//!
//! Report-card data entered by administrators and read back by the
//! beneficiary. Subject marks are graded on the KCSE scale when the caller
//! does not supply a grade. Saving a term summary refreshes the cached
//! statistics of the beneficiary's level and grade.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use klk_core::validation::SUBJECTS;
use klk_core::{grade_for_marks, points_for_grade, AuditAction, Role, GRADE_SCALE, PASS_MARK};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{Caller, Capability};
use crate::db::academics::{self, AcademicRecord, AcademicSummary, NewRecord, NewSummary};
use crate::db::audit::{self, AuditEvent};
use crate::db::profiles;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, ClientMeta, Validate};
use crate::response::{ok, Envelope};
use crate::services::stats::{self, Refreshed};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

fn check_percent(field: &str, value: f64) -> Result<(), String> {
    if !(0.0..=100.0).contains(&value) {
        return Err(format!("{field} must be between 0 and 100"));
    }
    Ok(())
}

fn check_period(term: &str, year: i32) -> Result<(), String> {
    if term.trim().is_empty() {
        return Err("term is required".into());
    }
    if !(2000..=2100).contains(&year) {
        return Err("year is out of range".into());
    }
    Ok(())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordRequest {
    pub subject: String,
    pub term: String,
    pub year: i32,
    pub marks: f64,
    /// Derived from `marks` when absent.
    pub grade: Option<String>,
    /// Derived from the grade when absent.
    pub points: Option<i64>,
    pub teacher_comment: Option<String>,
}

impl Validate for RecordRequest {
    fn validate(&self) -> Result<(), String> {
        if !SUBJECTS.contains(&self.subject.trim().to_lowercase().as_str()) {
            return Err(format!("Unknown subject: {}", self.subject));
        }
        check_period(&self.term, self.year)?;
        check_percent("marks", self.marks)?;
        if let Some(grade) = &self.grade {
            if !GRADE_SCALE.iter().any(|b| b.grade == grade.trim()) {
                return Err(format!("Unknown grade: {grade}"));
            }
        }
        if matches!(self.points, Some(p) if !(1..=12).contains(&p)) {
            return Err("points must be between 1 and 12".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SummaryRequest {
    pub term: String,
    pub year: i32,
    pub average_score: f64,
    pub total_points: Option<i64>,
    /// Derived from `average_score` when absent.
    pub mean_grade: Option<String>,
    pub class_position: Option<i64>,
    pub class_size: Option<i64>,
    pub attendance_percentage: Option<f64>,
    pub remarks: Option<String>,
}

impl Validate for SummaryRequest {
    fn validate(&self) -> Result<(), String> {
        check_period(&self.term, self.year)?;
        check_percent("average_score", self.average_score)?;
        if let Some(attendance) = self.attendance_percentage {
            check_percent("attendance_percentage", attendance)?;
        }
        if let (Some(position), Some(size)) = (self.class_position, self.class_size) {
            if position < 1 || position > size {
                return Err("class_position must be between 1 and class_size".into());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecordSaved {
    pub message: String,
    pub record: AcademicRecord,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SummarySaved {
    pub message: String,
    pub summary: AcademicSummary,
    pub stats: Refreshed,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AcademicOverview {
    pub latest: Option<AcademicSummary>,
    pub is_passing: Option<bool>,
    pub history: Vec<AcademicSummary>,
    /// Subject marks for the term of `latest`.
    pub current_term_records: Vec<AcademicRecord>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubjectHistory {
    pub subject: String,
    pub records: Vec<AcademicRecord>,
    pub average_marks: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Band {
    pub grade: String,
    pub min: f64,
    pub max: f64,
    pub points: u8,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GradeGuide {
    pub pass_mark: f64,
    pub bands: Vec<Band>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/academics/summary", get(overview))
        .route("/api/academics/subjects/:subject", get(subject))
        .route("/api/academics/grade-guide", get(grade_guide))
        .route("/api/admin/beneficiaries/:id/academic-records", post(record_marks))
        .route("/api/admin/beneficiaries/:id/academic-summaries", post(record_summary))
}

/// 404 unless `user_id` has a beneficiary profile.
async fn require_beneficiary(
    conn: &mut sqlx::SqliteConnection,
    user_id: i64,
) -> Result<(), AppError> {
    match profiles::find(conn, user_id).await? {
        Some(p) if p.role == Role::Beneficiary => Ok(()),
        _ => Err(AppError::not_found("Beneficiary")),
    }
}

// ---------------------------------------------------------------------------
// Beneficiary handlers
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/academics/summary",
    responses((status = 200, description = "Latest summary and history", body = AcademicOverview)),
    tag = "academics"
)]
async fn overview(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Envelope<AcademicOverview>>, AppError> {
    caller.require(Capability::UsePortal)?;
    let mut conn = state.pool.acquire().await?;
    let history = academics::summaries_for_user(&mut conn, caller.user_id).await?;
    let latest = history.first().cloned();
    let current_term_records = match &latest {
        Some(s) => academics::records_for_term(&mut conn, caller.user_id, &s.term, s.year).await?,
        None => Vec::new(),
    };
    Ok(ok(AcademicOverview {
        is_passing: latest.as_ref().map(|s| s.average_score >= PASS_MARK),
        latest,
        history,
        current_term_records,
    }))
}

#[utoipa::path(
    get,
    path = "/api/academics/subjects/{subject}",
    params(("subject" = String, Path, description = "Subject key, e.g. mathematics")),
    responses(
        (status = 200, description = "Subject history", body = SubjectHistory),
        (status = 400, description = "Unknown subject", body = crate::error::ErrorBody),
    ),
    tag = "academics"
)]
async fn subject(
    State(state): State<AppState>,
    caller: Caller,
    Path(subject): Path<String>,
) -> Result<Json<Envelope<SubjectHistory>>, AppError> {
    caller.require(Capability::UsePortal)?;
    let subject = subject.to_lowercase();
    if !SUBJECTS.contains(&subject.as_str()) {
        return Err(AppError::BadRequest(format!("Unknown subject: {subject}")));
    }
    let mut conn = state.pool.acquire().await?;
    let records = academics::subject_history(&mut conn, caller.user_id, &subject).await?;
    let average_marks = if records.is_empty() {
        0.0
    } else {
        klk_stats::round2(records.iter().map(|r| r.marks).sum::<f64>() / records.len() as f64)
    };
    Ok(ok(SubjectHistory {
        subject,
        records,
        average_marks,
    }))
}

#[utoipa::path(
    get,
    path = "/api/academics/grade-guide",
    responses((status = 200, description = "KCSE grading scale", body = GradeGuide)),
    tag = "academics"
)]
async fn grade_guide(caller: Caller) -> Result<Json<Envelope<GradeGuide>>, AppError> {
    caller.require(Capability::UsePortal)?;
    Ok(ok(GradeGuide {
        pass_mark: PASS_MARK,
        bands: GRADE_SCALE
            .iter()
            .map(|b| Band {
                grade: b.grade.to_string(),
                min: b.min,
                max: b.max,
                points: b.points,
            })
            .collect(),
    }))
}

// ---------------------------------------------------------------------------
// Admin handlers
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/admin/beneficiaries/{id}/academic-records",
    params(("id" = i64, Path, description = "Beneficiary user id")),
    request_body = RecordRequest,
    responses(
        (status = 200, description = "Record saved", body = RecordSaved),
        (status = 400, description = "Invalid marks", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown beneficiary", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn record_marks(
    State(state): State<AppState>,
    caller: Caller,
    client: ClientMeta,
    Path(user_id): Path<i64>,
    body: Result<Json<RecordRequest>, JsonRejection>,
) -> Result<Json<Envelope<RecordSaved>>, AppError> {
    caller.require(Capability::RecordAcademics)?;
    let req = extract_validated_json(body)?;
    let subject = req.subject.trim().to_lowercase();
    let grade = req
        .grade
        .as_deref()
        .map(str::trim)
        .unwrap_or_else(|| grade_for_marks(req.marks))
        .to_string();
    let points = req.points.unwrap_or_else(|| i64::from(points_for_grade(&grade)));
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    require_beneficiary(&mut tx, user_id).await?;
    let id = academics::upsert_record(
        &mut tx,
        &NewRecord {
            user_id,
            subject: &subject,
            term: req.term.trim(),
            year: req.year,
            marks: req.marks,
            grade: &grade,
            points,
            teacher_comment: req.teacher_comment.as_deref(),
        },
        now,
    )
    .await?;
    audit::append(
        &mut tx,
        AuditEvent {
            user_id: Some(caller.user_id),
            action: AuditAction::Create,
            model_name: "AcademicRecord",
            object_id: id,
            description: format!("Recorded {subject} {} for user {user_id}", req.marks),
            client: &client,
        },
        now,
    )
    .await?;
    let record = academics::records_for_term(&mut tx, user_id, req.term.trim(), req.year)
        .await?
        .into_iter()
        .find(|r| r.id == id)
        .ok_or_else(|| AppError::Internal("academic record vanished after upsert".into()))?;
    tx.commit().await?;

    Ok(ok(RecordSaved {
        message: "Academic record saved".into(),
        record,
    }))
}

#[utoipa::path(
    post,
    path = "/api/admin/beneficiaries/{id}/academic-summaries",
    params(("id" = i64, Path, description = "Beneficiary user id")),
    request_body = SummaryRequest,
    responses(
        (status = 200, description = "Summary saved and stats refreshed", body = SummarySaved),
        (status = 400, description = "Invalid summary", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown beneficiary", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn record_summary(
    State(state): State<AppState>,
    caller: Caller,
    client: ClientMeta,
    Path(user_id): Path<i64>,
    body: Result<Json<SummaryRequest>, JsonRejection>,
) -> Result<Json<Envelope<SummarySaved>>, AppError> {
    caller.require(Capability::RecordAcademics)?;
    let req = extract_validated_json(body)?;
    let mean_grade = req
        .mean_grade
        .as_deref()
        .map(str::trim)
        .unwrap_or_else(|| grade_for_marks(req.average_score))
        .to_string();
    let term = req.term.trim();
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    require_beneficiary(&mut tx, user_id).await?;
    let id = academics::upsert_summary(
        &mut tx,
        &NewSummary {
            user_id,
            term,
            year: req.year,
            average_score: req.average_score,
            total_points: req.total_points,
            mean_grade: &mean_grade,
            class_position: req.class_position,
            class_size: req.class_size,
            attendance_percentage: req.attendance_percentage,
            remarks: req.remarks.as_deref(),
        },
        now,
    )
    .await?;
    audit::append(
        &mut tx,
        AuditEvent {
            user_id: Some(caller.user_id),
            action: AuditAction::Create,
            model_name: "AcademicSummary",
            object_id: id,
            description: format!(
                "Recorded {term} {} summary ({}) for user {user_id}",
                req.year, req.average_score
            ),
            client: &client,
        },
        now,
    )
    .await?;
    let refreshed = stats::refresh_for_user(&mut tx, user_id, now).await?;
    let summary = academics::summaries_for_user(&mut tx, user_id)
        .await?
        .into_iter()
        .find(|s| s.id == id)
        .ok_or_else(|| AppError::Internal("academic summary vanished after upsert".into()))?;
    tx.commit().await?;

    tracing::info!(user_id, summary_id = id, average = req.average_score, "academic summary saved");
    Ok(ok(SummarySaved {
        message: "Academic summary saved".into(),
        summary,
        stats: refreshed,
    }))
}
