//! # Fee Statements
//!
//! A statement is one term's bill for one beneficiary. Its paid amount moves
//! only through payment verification; admins can correct the total, due
//! date and notes, or override the status.
//!
//! Beneficiary routes are scoped to the caller. The `/api/admin/` variants
//! cover every beneficiary and take an optional `user_id` filter.

use axum::extract::multipart::Multipart;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Datelike, NaiveDate, Utc};
use klk_core::validation::{parse_date, validate_upload, RECEIPT_EXTENSIONS};
use klk_core::{AuditAction, FeeStatementStatus, Money};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{Caller, Capability};
use crate::db::audit::{self, AuditEvent};
use crate::db::statements::{self, NewStatement, StatementFilter, StatementRecord, StatementSummary};
use crate::db::is_unique_violation;
use crate::error::AppError;
use crate::extractors::{extract_json, ClientMeta, MultipartForm, PageInfo, Pagination};
use crate::response::{attachment, ok, Envelope};
use crate::routes::{parse_filter, YearQuery};
use crate::services::stats::{self, Refreshed};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

/// A statement with its derived balance.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatementView {
    #[serde(flatten)]
    pub statement: StatementRecord,
    #[schema(value_type = String)]
    pub balance: Money,
    pub payment_percentage: f64,
    pub has_file: bool,
}

impl From<StatementRecord> for StatementView {
    fn from(record: StatementRecord) -> Self {
        let ledger = record.to_ledger();
        Self {
            balance: ledger.balance(),
            payment_percentage: klk_stats::round2(ledger.payment_percentage()),
            has_file: record.file_path.is_some(),
            statement: record,
        }
    }
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct StatementQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub year: Option<i32>,
    pub status: Option<String>,
    /// Admin only.
    pub user_id: Option<i64>,
}

impl StatementQuery {
    fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

/// Current-year totals and the change in billed fees from the year before.
#[derive(Debug, Serialize, ToSchema)]
pub struct SummaryStats {
    pub year: i32,
    #[serde(flatten)]
    pub totals: StatementSummary,
    pub payment_percentage: f64,
    pub fees_change: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatementList {
    pub statements: Vec<StatementView>,
    pub pagination: PageInfo,
    pub summary_stats: SummaryStats,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Outstanding {
    pub id: i64,
    pub term: String,
    pub year: i32,
    #[schema(value_type = String)]
    pub balance: Money,
    pub due_date: NaiveDate,
    pub days_overdue: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatementSummaryResponse {
    pub summary: SummaryStats,
    pub next_due_date: Option<NaiveDate>,
    pub days_until_due: Option<i64>,
    pub outstanding_statements: Vec<Outstanding>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct YearsResponse {
    pub years: Vec<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatementSaved {
    pub message: String,
    pub statement: StatementView,
    pub stats: Refreshed,
}

/// Admin edit. Without `status` the status is re-derived from the totals.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateStatementRequest {
    #[schema(value_type = Option<String>)]
    pub total_amount: Option<Money>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub school: Option<String>,
    pub status: Option<String>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/fee-statements", get(list_own).post(upload_statement))
        .route("/api/fee-statements/summary", get(summary_own))
        .route("/api/fee-statements/years", get(years_own))
        .route("/api/fee-statements/:id/download", get(download_own))
        .route("/api/admin/fee-statements", get(list_all))
        .route("/api/admin/fee-statements/summary", get(summary_all))
        .route("/api/admin/fee-statements/years", get(years_all))
        .route("/api/admin/fee-statements/:id", get(get_statement).put(update_statement))
        .route("/api/admin/fee-statements/:id/download", get(download_any))
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

async fn summary_stats(
    conn: &mut sqlx::SqliteConnection,
    user_id: Option<i64>,
    year: i32,
) -> Result<SummaryStats, AppError> {
    let totals = statements::summary(conn, user_id, Some(year)).await?;
    let previous = statements::summary(conn, user_id, Some(year - 1)).await?;
    let fees_change = if previous.total_fees.is_positive() {
        klk_stats::round2(
            (totals.total_fees - previous.total_fees).as_f64() / previous.total_fees.as_f64()
                * 100.0,
        )
    } else {
        0.0
    };
    Ok(SummaryStats {
        year,
        payment_percentage: klk_stats::round2(totals.total_paid.percent_of(totals.total_fees)),
        fees_change,
        totals,
    })
}

async fn list(
    state: &AppState,
    user_id: Option<i64>,
    query: &StatementQuery,
) -> Result<StatementList, AppError> {
    let filter = StatementFilter {
        user_id,
        year: query.year,
        status: parse_filter::<FeeStatementStatus>(query.status.as_deref())?,
    };
    let page = query.pagination();
    let mut conn = state.pool.acquire().await?;
    let (rows, total) = statements::list(&mut conn, &filter, &page).await?;
    let summary_stats = summary_stats(&mut conn, user_id, Utc::now().year()).await?;
    Ok(StatementList {
        statements: rows.into_iter().map(StatementView::from).collect(),
        pagination: page.info(total),
        summary_stats,
    })
}

async fn summary(
    state: &AppState,
    user_id: Option<i64>,
    year: Option<i32>,
) -> Result<StatementSummaryResponse, AppError> {
    let today = Utc::now().date_naive();
    let year = year.unwrap_or(today.year());
    let mut conn = state.pool.acquire().await?;
    let summary = summary_stats(&mut conn, user_id, year).await?;

    let filter = StatementFilter {
        user_id,
        year: Some(year),
        status: None,
    };
    let all = Pagination {
        page: Some(1),
        page_size: Some(Pagination::MAX_PAGE_SIZE),
    };
    let (rows, _) = statements::list(&mut conn, &filter, &all).await?;
    let mut outstanding: Vec<&StatementRecord> = rows
        .iter()
        .filter(|s| {
            matches!(
                s.status,
                FeeStatementStatus::Partial | FeeStatementStatus::Unpaid | FeeStatementStatus::Overdue
            )
        })
        .collect();
    outstanding.sort_by_key(|s| s.due_date);
    let next_due_date = outstanding
        .iter()
        .filter(|s| s.due_date >= today && s.status != FeeStatementStatus::Overdue)
        .map(|s| s.due_date)
        .min();

    Ok(StatementSummaryResponse {
        summary,
        next_due_date,
        days_until_due: next_due_date.map(|d| (d - today).num_days()),
        outstanding_statements: outstanding
            .into_iter()
            .take(5)
            .map(|s| Outstanding {
                id: s.id,
                term: s.term.clone(),
                year: s.year,
                balance: s.total_amount - s.amount_paid,
                due_date: s.due_date,
                days_overdue: (today - s.due_date).num_days().max(0),
            })
            .collect(),
    })
}

async fn download(state: &AppState, record: StatementRecord) -> Result<Response, AppError> {
    let (Some(path), original) = (record.file_path.as_deref(), record.original_name.as_deref())
    else {
        return Err(AppError::NotFound("No file attached to this statement".into()));
    };
    let bytes = state.media.read(path).await.map_err(|err| {
        tracing::warn!(statement_id = record.id, error = %err, "stored file missing");
        AppError::not_found("File")
    })?;
    let name = original
        .map(str::to_string)
        .unwrap_or_else(|| format!("fee_statement_{}_{}.pdf", record.term, record.year));
    Ok(attachment(bytes, &name))
}

async fn find_statement(state: &AppState, id: i64) -> Result<StatementRecord, AppError> {
    let mut conn = state.pool.acquire().await?;
    statements::find(&mut conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("Fee statement"))
}

// ---------------------------------------------------------------------------
// Beneficiary handlers
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/fee-statements",
    params(StatementQuery),
    responses((status = 200, description = "Caller's statements", body = StatementList)),
    tag = "fee-statements"
)]
async fn list_own(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<StatementQuery>,
) -> Result<Json<Envelope<StatementList>>, AppError> {
    caller.require(Capability::UsePortal)?;
    Ok(ok(list(&state, Some(caller.user_id), &query).await?))
}

#[utoipa::path(
    get,
    path = "/api/fee-statements/summary",
    params(YearQuery),
    responses((status = 200, description = "Caller's totals", body = StatementSummaryResponse)),
    tag = "fee-statements"
)]
async fn summary_own(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<YearQuery>,
) -> Result<Json<Envelope<StatementSummaryResponse>>, AppError> {
    caller.require(Capability::UsePortal)?;
    Ok(ok(summary(&state, Some(caller.user_id), query.year).await?))
}

#[utoipa::path(
    get,
    path = "/api/fee-statements/years",
    responses((status = 200, description = "Years with statements", body = YearsResponse)),
    tag = "fee-statements"
)]
async fn years_own(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Envelope<YearsResponse>>, AppError> {
    caller.require(Capability::UsePortal)?;
    let mut conn = state.pool.acquire().await?;
    let years = statements::years(&mut conn, Some(caller.user_id)).await?;
    Ok(ok(YearsResponse { years }))
}

#[utoipa::path(
    post,
    path = "/api/fee-statements",
    request_body(
        content = String,
        content_type = "multipart/form-data",
        description = "term, year, school, total_amount, due_date, notes, optional file"
    ),
    responses(
        (status = 200, description = "Statement created", body = StatementSaved),
        (status = 400, description = "Missing or malformed field", body = crate::error::ErrorBody),
        (status = 409, description = "Statement for this term exists", body = crate::error::ErrorBody),
    ),
    tag = "fee-statements"
)]
async fn upload_statement(
    State(state): State<AppState>,
    caller: Caller,
    multipart: Multipart,
) -> Result<Json<Envelope<StatementSaved>>, AppError> {
    caller.require(Capability::UsePortal)?;
    let mut form = MultipartForm::collect(multipart).await?;
    let term = form.required("term")?.to_string();
    let year: i32 = form
        .required("year")?
        .parse()
        .map_err(|_| AppError::BadRequest("year must be a whole number".into()))?;
    let school = form.text("school").unwrap_or_default().to_string();
    let total_amount = Money::parse_positive(form.required("total_amount")?)?;
    let due_date = parse_date(form.required("due_date")?)?;
    let notes = form.text("notes").map(str::to_string);

    let stored = match form.take_file("file") {
        Some(file) => {
            let extension = validate_upload(
                &file.file_name,
                file.bytes.len(),
                state.config.max_upload_bytes,
                RECEIPT_EXTENSIONS,
            )?;
            let path = state
                .media
                .save("fee_statements", caller.user_id, &extension, &file.bytes)
                .await?;
            Some((path, file.file_name))
        }
        None => None,
    };

    let now = Utc::now();
    let file_path = stored.as_ref().map(|(p, _)| p.as_str());
    let outcome = async {
        let mut tx = state.pool.begin().await?;
        let id = statements::insert(
            &mut tx,
            &NewStatement {
                user_id: caller.user_id,
                term: &term,
                year,
                school: &school,
                total_amount,
                due_date,
                notes: notes.as_deref(),
                file_path,
                original_name: stored.as_ref().map(|(_, n)| n.as_str()),
            },
            now,
        )
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::Conflict(format!("Fee statement for {term} {year} already exists"))
            } else {
                AppError::from(err)
            }
        })?;
        let refreshed = stats::refresh_for_user(&mut tx, caller.user_id, now).await?;
        let record = statements::find(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::Internal("statement vanished after insert".into()))?;
        tx.commit().await?;
        Ok::<_, AppError>((id, record, refreshed))
    }
    .await;
    let (id, record, refreshed) = state.media.discard_on_error(file_path, outcome).await?;

    tracing::info!(user_id = caller.user_id, statement_id = id, %total_amount, "fee statement uploaded");
    Ok(ok(StatementSaved {
        message: "Fee statement uploaded successfully".into(),
        statement: record.into(),
        stats: refreshed,
    }))
}

#[utoipa::path(
    get,
    path = "/api/fee-statements/{id}/download",
    params(("id" = i64, Path, description = "Statement id")),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "fee-statements"
)]
async fn download_own(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    caller.require(Capability::UsePortal)?;
    let record = find_statement(&state, id).await?;
    if record.user_id != caller.user_id {
        return Err(AppError::not_found("Fee statement"));
    }
    download(&state, record).await
}

// ---------------------------------------------------------------------------
// Admin handlers
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/admin/fee-statements",
    params(StatementQuery),
    responses(
        (status = 200, description = "All statements", body = StatementList),
        (status = 403, description = "Not an administrator", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn list_all(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<StatementQuery>,
) -> Result<Json<Envelope<StatementList>>, AppError> {
    caller.require(Capability::VerifyPayments)?;
    Ok(ok(list(&state, query.user_id, &query).await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/fee-statements/summary",
    params(YearQuery),
    responses((status = 200, description = "Totals over all beneficiaries", body = StatementSummaryResponse)),
    tag = "admin"
)]
async fn summary_all(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<YearQuery>,
) -> Result<Json<Envelope<StatementSummaryResponse>>, AppError> {
    caller.require(Capability::VerifyPayments)?;
    Ok(ok(summary(&state, None, query.year).await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/fee-statements/years",
    responses((status = 200, description = "Years with statements", body = YearsResponse)),
    tag = "admin"
)]
async fn years_all(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Envelope<YearsResponse>>, AppError> {
    caller.require(Capability::VerifyPayments)?;
    let mut conn = state.pool.acquire().await?;
    let years = statements::years(&mut conn, None).await?;
    Ok(ok(YearsResponse { years }))
}

#[utoipa::path(
    get,
    path = "/api/admin/fee-statements/{id}",
    params(("id" = i64, Path, description = "Statement id")),
    responses(
        (status = 200, description = "Statement", body = StatementView),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn get_statement(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<StatementView>>, AppError> {
    caller.require(Capability::VerifyPayments)?;
    Ok(ok(find_statement(&state, id).await?.into()))
}

#[utoipa::path(
    put,
    path = "/api/admin/fee-statements/{id}",
    params(("id" = i64, Path, description = "Statement id")),
    request_body = UpdateStatementRequest,
    responses(
        (status = 200, description = "Statement updated", body = StatementSaved),
        (status = 400, description = "Bad field", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn update_statement(
    State(state): State<AppState>,
    caller: Caller,
    client: ClientMeta,
    Path(id): Path<i64>,
    body: Result<Json<UpdateStatementRequest>, JsonRejection>,
) -> Result<Json<Envelope<StatementSaved>>, AppError> {
    caller.require(Capability::VerifyPayments)?;
    let req = extract_json(body)?;
    let override_status = parse_filter::<FeeStatementStatus>(req.status.as_deref())?;
    if let Some(total) = req.total_amount {
        if !total.is_positive() {
            return Err(klk_core::ValidationError::NonPositiveAmount.into());
        }
    }
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    let record = statements::find(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::not_found("Fee statement"))?;
    let mut statement = record.to_ledger();
    if let Some(total) = req.total_amount {
        statement.total_amount = total;
    }
    if let Some(due) = req.due_date {
        statement.due_date = due;
    }
    if let Some(notes) = req.notes {
        statement.notes = Some(notes);
    }
    // An override survives edits that leave the amounts and due date alone.
    match override_status {
        Some(status) => statement.override_status(status),
        None if req.total_amount.is_some() || req.due_date.is_some() => {
            statement.update_status(now.date_naive());
        }
        None => {}
    }
    statements::save(&mut tx, &statement, now).await?;
    if let Some(school) = req.school.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        statements::set_school(&mut tx, id, school).await?;
    }
    audit::append(
        &mut tx,
        AuditEvent {
            user_id: Some(caller.user_id),
            action: AuditAction::Update,
            model_name: "FeeStatement",
            object_id: id,
            description: format!(
                "Updated fee statement {} {}: total {}, status {}",
                statement.term, statement.year, statement.total_amount, statement.status
            ),
            client: &client,
        },
        now,
    )
    .await?;
    let refreshed = stats::refresh_for_user(&mut tx, statement.user_id, now).await?;
    let record = statements::find(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::not_found("Fee statement"))?;
    tx.commit().await?;

    tracing::info!(statement_id = id, status = %statement.status, "fee statement updated");
    Ok(ok(StatementSaved {
        message: "Fee statement updated successfully".into(),
        statement: record.into(),
        stats: refreshed,
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/fee-statements/{id}/download",
    params(("id" = i64, Path, description = "Statement id")),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn download_any(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    caller.require(Capability::VerifyPayments)?;
    let record = find_statement(&state, id).await?;
    download(&state, record).await
}
