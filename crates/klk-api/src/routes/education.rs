//! # Education Structure
//!
//! Levels (pre-school through vocational), the grades inside them, student
//! placement, and the cached level/grade statistics.
//!
//! Placement changes recompute both the scope the student left and the one
//! they joined. `POST /api/admin/education-levels/:key/recompute` forces a
//! full recompute of one level and its grades.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use klk_core::AuditAction;
use klk_stats::{CountyCount, GradeStats, LevelStats, TermAverage};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{Caller, Capability};
use crate::db::audit::{self, AuditEvent};
use crate::db::education::{self, Grade, Level, LevelFields};
use crate::db::profiles::{self, BeneficiaryFilter, BeneficiaryRow, Scope};
use crate::db::is_unique_violation;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, ClientMeta, Pagination, Validate};
use crate::response::{ok, Envelope};
use crate::services::stats::{self, Refreshed};
use crate::state::AppState;

const TREND_TERMS: usize = 3;
const TOP_COUNTIES: usize = 5;
const TOP_GRADES: usize = 5;
const RECENT_STUDENTS: i64 = 5;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct GradeEntry {
    #[serde(flatten)]
    pub grade: Grade,
    #[schema(value_type = Object)]
    pub stats: GradeStats,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LevelEntry {
    #[serde(flatten)]
    pub level: Level,
    #[schema(value_type = Object)]
    pub stats: LevelStats,
    pub grades: Vec<GradeEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LevelList {
    pub levels: Vec<LevelEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LevelDetail {
    #[serde(flatten)]
    pub entry: LevelEntry,
    pub recent_students: Vec<BeneficiaryRow>,
    #[schema(value_type = Vec<Object>)]
    pub performance_trend: Vec<TermAverage>,
    #[schema(value_type = Vec<Object>)]
    pub county_distribution: Vec<CountyCount>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLevelRequest {
    pub level_key: String,
    pub title: String,
    pub description: Option<String>,
    pub icon_name: Option<String>,
    pub color_gradient: Option<String>,
    pub display_order: Option<i64>,
}

impl Validate for CreateLevelRequest {
    fn validate(&self) -> Result<(), String> {
        let key = self.level_key.trim();
        if key.is_empty() || self.title.trim().is_empty() {
            return Err("level_key and title are required".into());
        }
        if !key.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
            return Err("level_key may contain only lowercase letters, digits and underscores".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateGradeRequest {
    pub education_level_id: i64,
    pub name: String,
    pub short_code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub display_order: i64,
}

impl Validate for CreateGradeRequest {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() || self.short_code.trim().is_empty() {
            return Err("name and short_code are required".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignLevelRequest {
    pub education_level_id: Option<i64>,
    pub grade_class_id: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LevelSaved {
    pub message: String,
    pub level: Level,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GradeSaved {
    pub message: String,
    pub grade: Grade,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GradeRoster {
    pub grade: Grade,
    pub students: Vec<BeneficiaryRow>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Recomputed {
    pub level_key: String,
    #[schema(value_type = Object)]
    pub stats: LevelStats,
    pub grades_recomputed: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlacementChanged {
    pub message: String,
    pub previous: Refreshed,
    pub current: Refreshed,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopGrade {
    pub grade_class_id: i64,
    pub name: String,
    pub level: String,
    #[schema(value_type = Object)]
    pub stats: GradeStats,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EducationDashboard {
    pub total_levels: usize,
    pub total_grades: usize,
    pub total_students: i64,
    pub levels: Vec<LevelEntry>,
    pub top_grades: Vec<TopGrade>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/education-levels", get(list_levels).post(create_level))
        .route("/api/admin/education-levels/:key", get(level_detail).put(update_level))
        .route("/api/admin/education-levels/:key/recompute", post(recompute_level))
        .route("/api/admin/grades", post(create_grade))
        .route("/api/admin/grades/:id/students", get(grade_students))
        .route("/api/admin/students/:id/assign-level", post(assign_level))
        .route("/api/admin/education-dashboard", get(dashboard))
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

async fn level_entry(conn: &mut sqlx::SqliteConnection, level: Level) -> Result<LevelEntry, sqlx::Error> {
    let stats = education::level_stats(conn, level.id).await?;
    let mut grades = Vec::new();
    for grade in education::list_grades(conn, level.id).await? {
        let stats = education::grade_stats(conn, grade.id).await?;
        grades.push(GradeEntry { grade, stats });
    }
    Ok(LevelEntry { level, stats, grades })
}

async fn level_by_key(conn: &mut sqlx::SqliteConnection, key: &str) -> Result<Level, AppError> {
    education::find_level_by_key(conn, key)
        .await?
        .ok_or_else(|| AppError::not_found("Education level"))
}

/// Check a requested level/grade pair. A grade without a level implies
/// the grade's own level.
pub(crate) async fn resolve_placement(
    conn: &mut sqlx::SqliteConnection,
    education_level_id: Option<i64>,
    grade_class_id: Option<i64>,
) -> Result<(Option<i64>, Option<i64>), AppError> {
    let grade = match grade_class_id {
        Some(id) => Some(
            education::find_grade(conn, id)
                .await?
                .ok_or_else(|| AppError::not_found("Grade"))?,
        ),
        None => None,
    };
    let level_id = match (education_level_id, &grade) {
        (Some(level_id), Some(grade)) if grade.education_level_id != level_id => {
            return Err(AppError::BadRequest(format!(
                "Grade {} does not belong to the selected education level",
                grade.name
            )));
        }
        (Some(level_id), _) => Some(level_id),
        (None, Some(grade)) => Some(grade.education_level_id),
        (None, None) => None,
    };
    if let Some(id) = level_id {
        education::find_level(conn, id)
            .await?
            .ok_or_else(|| AppError::not_found("Education level"))?;
    }
    Ok((level_id, grade.map(|g| g.id)))
}

async fn all_entries(conn: &mut sqlx::SqliteConnection) -> Result<Vec<LevelEntry>, sqlx::Error> {
    let mut entries = Vec::new();
    for level in education::list_levels(conn, false).await? {
        entries.push(level_entry(conn, level).await?);
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/admin/education-levels",
    responses((status = 200, description = "Levels with cached stats and grades", body = LevelList)),
    tag = "education"
)]
async fn list_levels(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Envelope<LevelList>>, AppError> {
    caller.require(Capability::ManageEducation)?;
    let mut conn = state.pool.acquire().await?;
    Ok(ok(LevelList {
        levels: all_entries(&mut conn).await?,
    }))
}

#[utoipa::path(
    post,
    path = "/api/admin/education-levels",
    request_body = CreateLevelRequest,
    responses(
        (status = 200, description = "Level created", body = LevelSaved),
        (status = 409, description = "level_key already exists", body = crate::error::ErrorBody),
    ),
    tag = "education"
)]
async fn create_level(
    State(state): State<AppState>,
    caller: Caller,
    client: ClientMeta,
    body: Result<Json<CreateLevelRequest>, JsonRejection>,
) -> Result<Json<Envelope<LevelSaved>>, AppError> {
    caller.require(Capability::ManageEducation)?;
    let req = extract_validated_json(body)?;
    let key = req.level_key.trim();
    let fields = LevelFields {
        title: None,
        description: req.description.clone(),
        icon_name: req.icon_name.clone(),
        color_gradient: req.color_gradient.clone(),
        display_order: req.display_order,
        is_active: None,
    };
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    let id = education::insert_level(&mut tx, key, req.title.trim(), &fields, now)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::Conflict(format!("Education level '{key}' already exists"))
            } else {
                err.into()
            }
        })?;
    audit::append(
        &mut tx,
        AuditEvent {
            user_id: Some(caller.user_id),
            action: AuditAction::Create,
            model_name: "EducationLevel",
            object_id: id,
            description: format!("Created education level {key}"),
            client: &client,
        },
        now,
    )
    .await?;
    let level = education::find_level(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::Internal("level vanished after insert".into()))?;
    tx.commit().await?;

    Ok(ok(LevelSaved {
        message: "Education level created".into(),
        level,
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/education-levels/{key}",
    params(("key" = String, Path, description = "Level key, e.g. primary")),
    responses(
        (status = 200, description = "Level detail", body = LevelDetail),
        (status = 404, description = "Unknown level", body = crate::error::ErrorBody),
    ),
    tag = "education"
)]
async fn level_detail(
    State(state): State<AppState>,
    caller: Caller,
    Path(key): Path<String>,
) -> Result<Json<Envelope<LevelDetail>>, AppError> {
    caller.require(Capability::ManageEducation)?;
    let mut conn = state.pool.acquire().await?;
    let level = level_by_key(&mut conn, &key).await?;
    let snapshot = stats::snapshot(&mut conn, Scope::Level(level.id)).await?;
    let filter = BeneficiaryFilter {
        level: Some(level.level_key.clone()),
        ..Default::default()
    };
    let page = Pagination {
        page: Some(1),
        page_size: Some(RECENT_STUDENTS),
    };
    let (recent_students, _) = profiles::list_beneficiaries(&mut conn, &filter, &page).await?;
    let entry = level_entry(&mut conn, level).await?;

    Ok(ok(LevelDetail {
        entry,
        recent_students,
        performance_trend: klk_stats::performance_trend(&snapshot.summaries, TREND_TERMS),
        county_distribution: klk_stats::county_distribution(&snapshot.beneficiaries, TOP_COUNTIES),
    }))
}

#[utoipa::path(
    put,
    path = "/api/admin/education-levels/{key}",
    params(("key" = String, Path, description = "Level key")),
    request_body = LevelFields,
    responses(
        (status = 200, description = "Level updated", body = LevelSaved),
        (status = 404, description = "Unknown level", body = crate::error::ErrorBody),
    ),
    tag = "education"
)]
async fn update_level(
    State(state): State<AppState>,
    caller: Caller,
    client: ClientMeta,
    Path(key): Path<String>,
    body: Result<Json<LevelFields>, JsonRejection>,
) -> Result<Json<Envelope<LevelSaved>>, AppError> {
    caller.require(Capability::ManageEducation)?;
    let fields = extract_json(body)?;
    if matches!(&fields.title, Some(t) if t.trim().is_empty()) {
        return Err(AppError::BadRequest("title cannot be blank".into()));
    }
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    let level = level_by_key(&mut tx, &key).await?;
    education::update_level(&mut tx, level.id, &fields).await?;
    audit::append(
        &mut tx,
        AuditEvent {
            user_id: Some(caller.user_id),
            action: AuditAction::Update,
            model_name: "EducationLevel",
            object_id: level.id,
            description: format!("Updated education level {key}"),
            client: &client,
        },
        now,
    )
    .await?;
    let level = level_by_key(&mut tx, &key).await?;
    tx.commit().await?;

    Ok(ok(LevelSaved {
        message: "Education level updated".into(),
        level,
    }))
}

#[utoipa::path(
    post,
    path = "/api/admin/education-levels/{key}/recompute",
    params(("key" = String, Path, description = "Level key")),
    responses(
        (status = 200, description = "Fresh aggregate", body = Recomputed),
        (status = 404, description = "Unknown level", body = crate::error::ErrorBody),
    ),
    tag = "education"
)]
async fn recompute_level(
    State(state): State<AppState>,
    caller: Caller,
    Path(key): Path<String>,
) -> Result<Json<Envelope<Recomputed>>, AppError> {
    caller.require(Capability::ManageEducation)?;
    let now = Utc::now();
    let mut tx = state.pool.begin().await?;
    let level = level_by_key(&mut tx, &key).await?;
    let level_stats = stats::recompute_level(&mut tx, level.id, now).await?;
    let grades = education::list_grades(&mut tx, level.id).await?;
    for grade in &grades {
        stats::recompute_grade(&mut tx, grade.id, now).await?;
    }
    tx.commit().await?;

    Ok(ok(Recomputed {
        level_key: level.level_key,
        stats: level_stats,
        grades_recomputed: grades.len(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/admin/grades",
    request_body = CreateGradeRequest,
    responses(
        (status = 200, description = "Grade created", body = GradeSaved),
        (status = 404, description = "Unknown level", body = crate::error::ErrorBody),
        (status = 409, description = "short_code already exists", body = crate::error::ErrorBody),
    ),
    tag = "education"
)]
async fn create_grade(
    State(state): State<AppState>,
    caller: Caller,
    client: ClientMeta,
    body: Result<Json<CreateGradeRequest>, JsonRejection>,
) -> Result<Json<Envelope<GradeSaved>>, AppError> {
    caller.require(Capability::ManageEducation)?;
    let req = extract_validated_json(body)?;
    let code = req.short_code.trim().to_uppercase();
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    education::find_level(&mut tx, req.education_level_id)
        .await?
        .ok_or_else(|| AppError::not_found("Education level"))?;
    let id = education::insert_grade(
        &mut tx,
        req.education_level_id,
        req.name.trim(),
        &code,
        req.description.trim(),
        req.display_order,
    )
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            AppError::Conflict(format!("Grade code '{code}' already exists"))
        } else {
            err.into()
        }
    })?;
    audit::append(
        &mut tx,
        AuditEvent {
            user_id: Some(caller.user_id),
            action: AuditAction::Create,
            model_name: "GradeClass",
            object_id: id,
            description: format!("Created grade {} ({code})", req.name.trim()),
            client: &client,
        },
        now,
    )
    .await?;
    let grade = education::find_grade(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::Internal("grade vanished after insert".into()))?;
    tx.commit().await?;

    Ok(ok(GradeSaved {
        message: "Grade created".into(),
        grade,
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/grades/{id}/students",
    params(("id" = i64, Path, description = "Grade id")),
    responses(
        (status = 200, description = "Students in the grade", body = GradeRoster),
        (status = 404, description = "Unknown grade", body = crate::error::ErrorBody),
    ),
    tag = "education"
)]
async fn grade_students(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<GradeRoster>>, AppError> {
    caller.require(Capability::ManageEducation)?;
    let mut conn = state.pool.acquire().await?;
    let grade = education::find_grade(&mut conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("Grade"))?;
    let students = profiles::beneficiaries_in_grade(&mut conn, id).await?;
    Ok(ok(GradeRoster { grade, students }))
}

#[utoipa::path(
    post,
    path = "/api/admin/students/{id}/assign-level",
    params(("id" = i64, Path, description = "Beneficiary user id")),
    request_body = AssignLevelRequest,
    responses(
        (status = 200, description = "Placement changed", body = PlacementChanged),
        (status = 400, description = "Grade does not belong to level", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown student, level or grade", body = crate::error::ErrorBody),
    ),
    tag = "education"
)]
async fn assign_level(
    State(state): State<AppState>,
    caller: Caller,
    client: ClientMeta,
    Path(user_id): Path<i64>,
    body: Result<Json<AssignLevelRequest>, JsonRejection>,
) -> Result<Json<Envelope<PlacementChanged>>, AppError> {
    caller.require(Capability::ManageBeneficiaries)?;
    let req = extract_json(body)?;
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    let (old_level, old_grade) = profiles::placement(&mut tx, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Student"))?;

    let (level_id, grade_id) =
        resolve_placement(&mut tx, req.education_level_id, req.grade_class_id).await?;

    profiles::set_placement(&mut tx, user_id, level_id, grade_id, now).await?;
    audit::append(
        &mut tx,
        AuditEvent {
            user_id: Some(caller.user_id),
            action: AuditAction::Update,
            model_name: "BeneficiaryProfile",
            object_id: user_id,
            description: format!(
                "Placement changed from level {old_level:?}/grade {old_grade:?} to level {level_id:?}/grade {grade_id:?}"
            ),
            client: &client,
        },
        now,
    )
    .await?;
    // The scope the student left, minus anything the new placement refreshes anyway.
    let previous = stats::refresh_placement(
        &mut tx,
        old_level.filter(|id| Some(*id) != level_id),
        old_grade.filter(|id| Some(*id) != grade_id),
        now,
    )
    .await?;
    let current = stats::refresh_placement(&mut tx, level_id, grade_id, now).await?;
    tx.commit().await?;

    tracing::info!(user_id, ?level_id, ?grade_id, "student placement changed");
    Ok(ok(PlacementChanged {
        message: "Student placement updated".into(),
        previous,
        current,
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/education-dashboard",
    responses((status = 200, description = "Totals, per-level stats and top grades", body = EducationDashboard)),
    tag = "education"
)]
async fn dashboard(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Envelope<EducationDashboard>>, AppError> {
    caller.require(Capability::ManageEducation)?;
    let mut conn = state.pool.acquire().await?;
    let levels = all_entries(&mut conn).await?;
    let mut graded = Vec::new();
    for grade in education::active_grades_with_level(&mut conn).await? {
        let stats = education::grade_stats(&mut conn, grade.id).await?;
        graded.push((grade, stats));
    }
    let top_grades = klk_stats::top_grades(&graded, TOP_GRADES)
        .into_iter()
        .map(|(grade, stats)| TopGrade {
            grade_class_id: grade.id,
            name: grade.name,
            level: grade.level_title,
            stats,
        })
        .collect();

    Ok(ok(EducationDashboard {
        total_levels: levels.len(),
        total_grades: graded.len(),
        total_students: levels.iter().map(|l| l.stats.total_students).sum(),
        levels,
        top_grades,
    }))
}

#[cfg(test)]
mod tests {
    use crate::db::education;
    use crate::testing::TestApp;
    use axum::http::StatusCode;
    use chrono::Utc;
    use serde_json::json;

    async fn seeded() -> TestApp {
        let t = TestApp::new().await;
        let mut conn = t.conn().await;
        education::seed_defaults(&mut conn, Utc::now()).await.unwrap();
        t
    }

    async fn grade_id(t: &TestApp, level: &str, code: &str) -> i64 {
        let (_, body) = t.get(&format!("/api/admin/education-levels/{level}"), &t.admin_token).await;
        body["grades"]
            .as_array()
            .unwrap()
            .iter()
            .find(|g| g["short_code"] == code)
            .unwrap()["id"]
            .as_i64()
            .unwrap()
    }

    #[tokio::test]
    async fn create_level_and_duplicate_key() {
        let t = TestApp::new().await;
        let body = json!({"level_key": "primary", "title": "Primary", "display_order": 1});
        let (status, resp) = t.post("/api/admin/education-levels", &t.admin_token, body.clone()).await;
        assert_eq!(status, StatusCode::OK, "{resp}");
        assert_eq!(resp["level"]["level_key"], "primary");
        let (status, _) = t.post("/api/admin/education-levels", &t.admin_token, body).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = t
            .post("/api/admin/education-levels", &t.admin_token, json!({"level_key": "Bad Key", "title": "x"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = t.get("/api/admin/education-levels", &t.user_token).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn grade_must_belong_to_level() {
        let t = seeded().await;
        let form_one = grade_id(&t, "secondary", "F1").await;
        let (_, body) = t.get("/api/admin/education-levels/primary", &t.admin_token).await;
        let primary = body["id"].as_i64().unwrap();

        let uri = format!("/api/admin/students/{}/assign-level", t.user_id);
        let (status, _) = t
            .post(&uri, &t.admin_token, json!({"education_level_id": primary, "grade_class_id": form_one}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = t.post(&uri, &t.admin_token, json!({"grade_class_id": form_one})).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["current"]["grade"]["total_students"], 1);
        assert_eq!(body["current"]["level"]["total_students"], 1);

        let (_, body) = t.get(&format!("/api/admin/grades/{form_one}/students"), &t.admin_token).await;
        assert_eq!(body["students"][0]["user_id"], t.user_id);
    }

    #[tokio::test]
    async fn moving_a_student_recomputes_both_scopes() {
        let t = seeded().await;
        let g1 = grade_id(&t, "primary", "G1").await;
        let f1 = grade_id(&t, "secondary", "F1").await;
        let uri = format!("/api/admin/students/{}/assign-level", t.user_id);
        t.post(&uri, &t.admin_token, json!({"grade_class_id": g1})).await;

        let (status, body) = t.post(&uri, &t.admin_token, json!({"grade_class_id": f1})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["previous"]["level"]["total_students"], 0);
        assert_eq!(body["previous"]["grade"]["total_students"], 0);

        let (_, body) = t.get("/api/admin/education-levels/primary", &t.admin_token).await;
        assert_eq!(body["stats"]["total_students"], 0);
        let (_, body) = t.get("/api/admin/education-levels/secondary", &t.admin_token).await;
        assert_eq!(body["stats"]["total_students"], 1);
    }

    #[tokio::test]
    async fn recompute_and_dashboard() {
        let t = seeded().await;
        let g1 = grade_id(&t, "primary", "G1").await;
        t.post(
            &format!("/api/admin/students/{}/assign-level", t.user_id),
            &t.admin_token,
            json!({"grade_class_id": g1}),
        )
        .await;
        t.post(
            &format!("/api/admin/beneficiaries/{}/academic-summaries", t.user_id),
            &t.admin_token,
            json!({"term": "Term 1", "year": 2025, "average_score": 55.0}),
        )
        .await;

        let (status, body) = t
            .post("/api/admin/education-levels/primary/recompute", &t.admin_token, json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["average_performance"], 55.0);
        assert_eq!(body["stats"]["passing_rate"], 100.0);
        assert_eq!(body["grades_recomputed"], 8);

        let (_, body) = t.get("/api/admin/education-dashboard", &t.admin_token).await;
        assert_eq!(body["total_levels"], 5);
        assert_eq!(body["total_students"], 1);
        assert_eq!(body["top_grades"].as_array().unwrap().len(), 5);
        assert_eq!(body["top_grades"][0]["name"], "Grade 1");

        let (status, _) = t
            .post("/api/admin/education-levels/nowhere/recompute", &t.admin_token, json!({}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_level_fields() {
        let t = seeded().await;
        let (status, body) = t
            .put("/api/admin/education-levels/primary", &t.admin_token, json!({"title": "Primary School"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["level"]["title"], "Primary School");
    }
}
