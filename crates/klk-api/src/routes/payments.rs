//! # Payments & Verification
//!
//! Beneficiaries submit receipts; administrators verify or reject them.
//! Verification is the only path by which money reaches a fee statement,
//! see [`crate::services::reconciliation`].
//!
//! - **POST `/api/payments`**: multipart receipt upload
//! - **GET `/api/payments`**: own payments, `?year=&status=&method=`
//! - **GET `/api/payments/summary`**, **GET `/api/payments/methods`**
//! - **GET `/api/payments/:id/download`**
//! - **GET `/api/admin/payments`**: every payment, `?user_id=`
//! - **POST `/api/admin/payments/:id/verify`**: `status` is `verified` or `rejected`
//! - **POST `/api/admin/payments/:id/link`**: attach to a fee statement
//! - **GET `/api/admin/payments/:id/download`**

use std::future::Future;

use axum::extract::multipart::Multipart;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Datelike, Utc};
use klk_core::validation::{parse_date, validate_upload, RECEIPT_EXTENSIONS};
use klk_core::{AuditAction, Money, NotificationType, PaymentMethod, PaymentStatus};
use klk_ledger::{receipt_number, receipt_sequence, StatementCredit};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{Caller, Capability};
use crate::db::audit::{self, AuditEvent};
use crate::db::notifications::{self, NewNotification};
use crate::db::payments::{self, NewPayment, PaymentFilter, PaymentRecord, PaymentSummary};
use crate::db::{is_busy, is_unique_violation, statements};
use crate::error::AppError;
use crate::extractors::{extract_json, ClientMeta, MultipartForm, PageInfo, Pagination};
use crate::response::{attachment, ok, Envelope};
use crate::routes::documents::Choice;
use crate::routes::{parse_filter, YearQuery};
use crate::services::reconciliation::{self, Decision, ReviewReport};
use crate::services::stats::{self, Refreshed};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct PaymentQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub year: Option<i32>,
    pub status: Option<String>,
    pub method: Option<String>,
    /// Admin only.
    pub user_id: Option<i64>,
}

impl PaymentQuery {
    fn filter(&self, user_id: Option<i64>) -> Result<PaymentFilter, AppError> {
        Ok(PaymentFilter {
            user_id,
            year: self.year,
            status: parse_filter::<PaymentStatus>(self.status.as_deref())?,
            method: parse_filter::<PaymentMethod>(self.method.as_deref())?,
        })
    }

    fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentView {
    #[serde(flatten)]
    pub payment: PaymentRecord,
    pub has_receipt: bool,
}

impl From<PaymentRecord> for PaymentView {
    fn from(payment: PaymentRecord) -> Self {
        Self {
            has_receipt: payment.receipt_path.is_some(),
            payment,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentList {
    pub payments: Vec<PaymentView>,
    pub pagination: PageInfo,
    pub summary: PaymentSummary,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SummaryResponse {
    pub year: Option<i32>,
    pub summary: PaymentSummary,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MethodsResponse {
    pub payment_methods: Vec<Choice>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentSubmitted {
    pub message: String,
    pub payment: PaymentView,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyRequest {
    pub status: Decision,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyResponse {
    pub message: String,
    pub review: ReviewReport,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LinkRequest {
    pub fee_statement_id: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LinkResponse {
    pub message: String,
    pub payment_id: i64,
    pub fee_statement_id: i64,
    /// Present when the payment was already verified and credited on link.
    #[schema(value_type = Option<Object>)]
    pub credit: Option<StatementCredit>,
    pub stats: Refreshed,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/payments", get(list_own).post(upload_receipt))
        .route("/api/payments/summary", get(summary_own))
        .route("/api/payments/methods", get(methods))
        .route("/api/payments/:id/download", get(download_own))
        .route("/api/admin/payments", get(list_all))
        .route("/api/admin/payments/:id/verify", post(verify_payment))
        .route("/api/admin/payments/:id/link", post(link_payment))
        .route("/api/admin/payments/:id/download", get(download_any))
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

async fn list(
    state: &AppState,
    user_id: Option<i64>,
    query: &PaymentQuery,
) -> Result<PaymentList, AppError> {
    let filter = query.filter(user_id)?;
    let page = query.pagination();
    let mut conn = state.pool.acquire().await?;
    let (rows, total) = payments::list(&mut conn, &filter, &page).await?;
    let summary = payments::summary(&mut conn, user_id, query.year).await?;
    Ok(PaymentList {
        payments: rows.into_iter().map(PaymentView::from).collect(),
        pagination: page.info(total),
        summary,
    })
}

async fn find_payment(state: &AppState, id: i64) -> Result<PaymentRecord, AppError> {
    let mut conn = state.pool.acquire().await?;
    payments::find(&mut conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("Payment"))
}

async fn download(state: &AppState, payment: PaymentRecord) -> Result<Response, AppError> {
    let Some(path) = payment.receipt_path.as_deref() else {
        return Err(AppError::NotFound("No receipt attached to this payment".into()));
    };
    let bytes = state.media.read(path).await.map_err(|err| {
        tracing::warn!(payment_id = payment.id, error = %err, "stored receipt missing");
        AppError::not_found("File")
    })?;
    let name = payment
        .original_name
        .clone()
        .unwrap_or_else(|| format!("{}.pdf", payment.receipt_number));
    Ok(attachment(bytes, &name))
}

/// Next free receipt number for `year`.
async fn next_receipt_number(
    conn: &mut sqlx::SqliteConnection,
    year: i32,
) -> Result<String, sqlx::Error> {
    let highest = payments::receipt_numbers_for_year(conn, year)
        .await?
        .iter()
        .filter_map(|r| receipt_sequence(year, r))
        .max()
        .unwrap_or(0);
    Ok(receipt_number(year, highest + 1))
}

/// Receipt number allocations tried before an upload is refused.
const RECEIPT_ATTEMPTS: u32 = 2;

/// Run `submit` until it gets a receipt number no concurrent upload claimed.
/// `Ok(None)` from `submit` reports such a collision; its transaction has
/// already been dropped.
async fn with_receipt_retry<T, F, Fut>(mut submit: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, AppError>>,
{
    for attempt in 1..=RECEIPT_ATTEMPTS {
        if let Some(done) = submit().await? {
            return Ok(done);
        }
        tracing::warn!(attempt, "receipt number taken by a concurrent upload");
    }
    Err(AppError::Conflict(
        "Could not allocate a receipt number, please resubmit".into(),
    ))
}

/// One attempt at recording an upload: allocate the receipt number, insert,
/// notify and refresh stats in a single transaction.
async fn submit_receipt(
    state: &AppState,
    caller: &Caller,
    draft: &NewPayment<'_>,
) -> Result<Option<PaymentRecord>, AppError> {
    let now = Utc::now();
    let mut tx = state.pool.begin().await?;
    let receipt = next_receipt_number(&mut tx, now.year()).await?;
    let new = NewPayment {
        receipt_number: &receipt,
        ..*draft
    };
    let id = match payments::insert(&mut tx, &new, now).await {
        Ok(id) => id,
        Err(err) if is_unique_violation(&err) || is_busy(&err) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let message = format!(
        "{} submitted payment {receipt} of KES {} via {}",
        caller.full_name(),
        new.amount,
        new.payment_method.label()
    );
    notifications::notify_admins(
        &mut tx,
        &NewNotification {
            notification_type: NotificationType::Payment,
            title: "New payment submitted",
            message: &message,
            related_object_id: Some(id),
            related_object_type: Some("payment"),
        },
        now,
    )
    .await?;
    stats::refresh_for_user(&mut tx, caller.user_id, now).await?;
    let record = payments::find(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::Internal("payment vanished after insert".into()))?;
    tx.commit().await?;
    Ok(Some(record))
}

// ---------------------------------------------------------------------------
// Beneficiary handlers
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/payments",
    request_body(
        content = String,
        content_type = "multipart/form-data",
        description = "amount, payment_date, payment_method, term, year, file; optional fee_statement_id, reference_number, description"
    ),
    responses(
        (status = 200, description = "Receipt submitted", body = PaymentSubmitted),
        (status = 400, description = "Missing or malformed field", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown fee statement", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
async fn upload_receipt(
    State(state): State<AppState>,
    caller: Caller,
    multipart: Multipart,
) -> Result<Json<Envelope<PaymentSubmitted>>, AppError> {
    caller.require(Capability::UsePortal)?;
    let mut form = MultipartForm::collect(multipart).await?;
    let amount = Money::parse_positive(form.required("amount")?)?;
    let payment_date = parse_date(form.required("payment_date")?)?;
    let payment_method: PaymentMethod = form.required("payment_method")?.parse()?;
    let term = form.required("term")?.to_string();
    let year: i32 = form
        .required("year")?
        .parse()
        .map_err(|_| AppError::BadRequest("year must be a whole number".into()))?;
    let fee_statement_id = match form.text("fee_statement_id") {
        Some(raw) => Some(
            raw.parse::<i64>()
                .map_err(|_| AppError::BadRequest("fee_statement_id must be a number".into()))?,
        ),
        None => None,
    };
    let reference_number = form.text("reference_number").map(str::to_string);
    let description = form.text("description").map(str::to_string);
    let file = form
        .take_file("file")
        .ok_or_else(|| AppError::BadRequest("Receipt file is required".into()))?;
    let extension = validate_upload(
        &file.file_name,
        file.bytes.len(),
        state.config.max_upload_bytes,
        RECEIPT_EXTENSIONS,
    )?;

    if let Some(statement_id) = fee_statement_id {
        let mut conn = state.pool.acquire().await?;
        statements::find(&mut conn, statement_id)
            .await?
            .filter(|s| s.user_id == caller.user_id)
            .ok_or_else(|| AppError::not_found("Fee statement"))?;
    }

    let path = state
        .media
        .save("receipts", caller.user_id, &extension, &file.bytes)
        .await?;
    let draft = NewPayment {
        user_id: caller.user_id,
        fee_statement_id,
        receipt_number: "",
        amount,
        payment_date,
        payment_method,
        reference_number: reference_number.as_deref(),
        description: description.as_deref(),
        term: &term,
        year,
        receipt_path: Some(&path),
        original_name: Some(&file.file_name),
    };
    let outcome = with_receipt_retry(|| submit_receipt(&state, &caller, &draft)).await;
    let record = state.media.discard_on_error(Some(path.as_str()), outcome).await?;

    tracing::info!(
        user_id = caller.user_id,
        payment_id = record.id,
        receipt = %record.receipt_number,
        %amount,
        "receipt uploaded"
    );
    Ok(ok(PaymentSubmitted {
        message: "Payment receipt uploaded successfully".into(),
        payment: record.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/payments",
    params(PaymentQuery),
    responses((status = 200, description = "Caller's payments", body = PaymentList)),
    tag = "payments"
)]
async fn list_own(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<PaymentQuery>,
) -> Result<Json<Envelope<PaymentList>>, AppError> {
    caller.require(Capability::UsePortal)?;
    Ok(ok(list(&state, Some(caller.user_id), &query).await?))
}

#[utoipa::path(
    get,
    path = "/api/payments/summary",
    params(YearQuery),
    responses((status = 200, description = "Caller's payment totals", body = SummaryResponse)),
    tag = "payments"
)]
async fn summary_own(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<YearQuery>,
) -> Result<Json<Envelope<SummaryResponse>>, AppError> {
    caller.require(Capability::UsePortal)?;
    let mut conn = state.pool.acquire().await?;
    let summary = payments::summary(&mut conn, Some(caller.user_id), query.year).await?;
    Ok(ok(SummaryResponse {
        year: query.year,
        summary,
    }))
}

#[utoipa::path(
    get,
    path = "/api/payments/methods",
    responses((status = 200, description = "Accepted payment methods", body = MethodsResponse)),
    tag = "payments"
)]
async fn methods(caller: Caller) -> Result<Json<Envelope<MethodsResponse>>, AppError> {
    caller.require(Capability::UsePortal)?;
    Ok(ok(MethodsResponse {
        payment_methods: PaymentMethod::all()
            .iter()
            .map(|m| Choice {
                value: m.as_str().to_string(),
                label: m.label().to_string(),
            })
            .collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/payments/{id}/download",
    params(("id" = i64, Path, description = "Payment id")),
    responses(
        (status = 200, description = "Receipt file", content_type = "application/octet-stream"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
async fn download_own(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    caller.require(Capability::UsePortal)?;
    let payment = find_payment(&state, id).await?;
    if payment.user_id != caller.user_id {
        return Err(AppError::not_found("Payment"));
    }
    download(&state, payment).await
}

// ---------------------------------------------------------------------------
// Admin handlers
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/admin/payments",
    params(PaymentQuery),
    responses(
        (status = 200, description = "All payments", body = PaymentList),
        (status = 403, description = "Not an administrator", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn list_all(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<PaymentQuery>,
) -> Result<Json<Envelope<PaymentList>>, AppError> {
    caller.require(Capability::VerifyPayments)?;
    Ok(ok(list(&state, query.user_id, &query).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/payments/{id}/verify",
    params(("id" = i64, Path, description = "Payment id")),
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Payment reviewed", body = VerifyResponse),
        (status = 400, description = "Bad status", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Payment is not pending", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn verify_payment(
    State(state): State<AppState>,
    caller: Caller,
    client: ClientMeta,
    Path(id): Path<i64>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<Envelope<VerifyResponse>>, AppError> {
    caller.require(Capability::VerifyPayments)?;
    let req = extract_json(body)?;
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    let review = reconciliation::review_payment(
        &mut tx,
        id,
        req.status,
        &caller,
        req.notes.trim(),
        &client,
        now,
    )
    .await?;
    tx.commit().await?;

    let verb = match req.status {
        Decision::Verified => "verified",
        Decision::Rejected => "rejected",
    };
    Ok(ok(VerifyResponse {
        message: format!("Payment {verb} successfully"),
        review,
    }))
}

#[utoipa::path(
    post,
    path = "/api/admin/payments/{id}/link",
    params(("id" = i64, Path, description = "Payment id")),
    request_body = LinkRequest,
    responses(
        (status = 200, description = "Payment linked", body = LinkResponse),
        (status = 404, description = "Payment or statement not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already linked or owner mismatch", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn link_payment(
    State(state): State<AppState>,
    caller: Caller,
    client: ClientMeta,
    Path(id): Path<i64>,
    body: Result<Json<LinkRequest>, JsonRejection>,
) -> Result<Json<Envelope<LinkResponse>>, AppError> {
    caller.require(Capability::VerifyPayments)?;
    let req = extract_json(body)?;
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    let mut payment = payments::find(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::not_found("Payment"))?
        .to_ledger();
    let mut statement = statements::find(&mut tx, req.fee_statement_id)
        .await?
        .ok_or_else(|| AppError::not_found("Fee statement"))?
        .to_ledger();
    let already_linked = payment.fee_statement_id == Some(statement.id);
    let credit = klk_ledger::attach(&mut payment, &mut statement, now.date_naive())?;

    if !already_linked {
        if !payments::link_statement(&mut tx, id, statement.id).await? {
            return Err(AppError::Conflict(
                "Payment was linked by someone else; reload and try again".into(),
            ));
        }
        if credit.is_some() {
            statements::save(&mut tx, &statement, now).await?;
        }
        audit::append(
            &mut tx,
            AuditEvent {
                user_id: Some(caller.user_id),
                action: AuditAction::Update,
                model_name: "Payment",
                object_id: id,
                description: format!(
                    "Linked payment {} to fee statement {} {}",
                    payment.receipt_number, statement.term, statement.year
                ),
                client: &client,
            },
            now,
        )
        .await?;
    }
    let refreshed = stats::refresh_for_user(&mut tx, payment.user_id, now).await?;
    tx.commit().await?;

    tracing::info!(payment_id = id, statement_id = statement.id, credited = credit.is_some(), "payment linked");
    Ok(ok(LinkResponse {
        message: "Payment linked to fee statement".into(),
        payment_id: id,
        fee_statement_id: statement.id,
        credit,
        stats: refreshed,
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/payments/{id}/download",
    params(("id" = i64, Path, description = "Payment id")),
    responses(
        (status = 200, description = "Receipt file", content_type = "application/octet-stream"),
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
    let payment = find_payment(&state, id).await?;
    download(&state, payment).await
}
