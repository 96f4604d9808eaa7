//! # Supporting Documents
//!
//! Beneficiaries upload report cards, certificates and similar files for
//! review. Admins approve, reject or ask for action.
//!
//! - **POST `/api/documents`**: multipart: `name`, `document_type`, `file`
//! - **GET `/api/documents`**: own documents, `?status=&type=`
//! - **DELETE `/api/documents/:id`**: only while pending
//! - **GET `/api/documents/:id/download`**
//! - **GET `/api/documents/types`**
//! - **GET `/api/admin/documents/pending`**
//! - **POST `/api/admin/documents/:id/review`**

use axum::extract::multipart::Multipart;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use klk_core::validation::{validate_upload, DOCUMENT_EXTENSIONS};
use klk_core::{AuditAction, DocumentStatus, DocumentType, NotificationType};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{Caller, Capability};
use crate::db::audit::{self, AuditEvent};
use crate::db::documents::{self, Document, NewDocument, PendingDocument};
use crate::db::notifications::{self, NewNotification};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, ClientMeta, MultipartForm, Validate};
use crate::response::{attachment, ok, Envelope};
use crate::routes::parse_filter;
use crate::services::stats::{self, Refreshed};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct DocumentQuery {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub document_type: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentList {
    pub documents: Vec<Document>,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentUploaded {
    pub message: String,
    pub document: Document,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Choice {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentTypes {
    pub document_types: Vec<Choice>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PendingList {
    pub documents: Vec<PendingDocument>,
    pub count: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewRequest {
    pub status: String,
    pub notes: Option<String>,
}

impl Validate for ReviewRequest {
    fn validate(&self) -> Result<(), String> {
        match self.status.parse::<DocumentStatus>() {
            Ok(DocumentStatus::Pending) | Err(_) => Err(
                "Invalid status. Must be one of: approved, rejected, requires_action".into(),
            ),
            Ok(_) => Ok(()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentReviewed {
    pub message: String,
    pub document: Document,
    pub stats: Refreshed,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Deleted {
    pub message: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/documents", get(list_documents).post(upload_document))
        .route("/api/documents/types", get(document_types))
        .route("/api/documents/:id", delete(delete_document))
        .route("/api/documents/:id/download", get(download_document))
        .route("/api/admin/documents/pending", get(pending_documents))
        .route("/api/admin/documents/:id/review", post(review_document))
}

// ---------------------------------------------------------------------------
// Beneficiary handlers
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/documents",
    request_body(content = String, content_type = "multipart/form-data", description = "name, document_type, file"),
    responses(
        (status = 200, description = "Uploaded", body = DocumentUploaded),
        (status = 400, description = "Missing field or bad file", body = crate::error::ErrorBody),
    ),
    tag = "documents"
)]
async fn upload_document(
    State(state): State<AppState>,
    caller: Caller,
    multipart: Multipart,
) -> Result<Json<Envelope<DocumentUploaded>>, AppError> {
    caller.require(Capability::UsePortal)?;
    let mut form = MultipartForm::collect(multipart).await?;
    let name = form.required("name")?.to_string();
    let document_type: DocumentType = form.required("document_type")?.parse()?;
    let file = form
        .take_file("file")
        .ok_or_else(|| AppError::BadRequest("No file provided".into()))?;
    let extension = validate_upload(
        &file.file_name,
        file.bytes.len(),
        state.config.max_upload_bytes,
        DOCUMENT_EXTENSIONS,
    )?;

    let path = state
        .media
        .save("documents", caller.user_id, &extension, &file.bytes)
        .await?;
    let now = Utc::now();

    let outcome = async {
        let mut tx = state.pool.begin().await?;
        let id = documents::insert(
            &mut tx,
            &NewDocument {
                user_id: caller.user_id,
                name: &name,
                document_type,
                file_path: &path,
                original_name: &file.file_name,
                file_size: file.bytes.len() as i64,
            },
            now,
        )
        .await?;
        let message = format!("{} uploaded {}", caller.full_name(), document_type.label());
        notifications::notify_admins(
            &mut tx,
            &NewNotification {
                notification_type: NotificationType::Document,
                title: "New document uploaded",
                message: &message,
                related_object_id: Some(id),
                related_object_type: Some("Document"),
            },
            now,
        )
        .await?;
        stats::refresh_for_user(&mut tx, caller.user_id, now).await?;
        let document = documents::find(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::Internal("document vanished after insert".into()))?;
        tx.commit().await?;
        Ok::<_, AppError>((id, document))
    }
    .await;
    let (id, document) = state.media.discard_on_error(Some(path.as_str()), outcome).await?;

    tracing::info!(user_id = caller.user_id, document_id = id, "document uploaded");
    Ok(ok(DocumentUploaded {
        message: "Document uploaded successfully".into(),
        document,
    }))
}

#[utoipa::path(
    get,
    path = "/api/documents",
    params(DocumentQuery),
    responses((status = 200, description = "Caller's documents", body = DocumentList)),
    tag = "documents"
)]
async fn list_documents(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<DocumentQuery>,
) -> Result<Json<Envelope<DocumentList>>, AppError> {
    caller.require(Capability::UsePortal)?;
    let status = parse_filter::<DocumentStatus>(query.status.as_deref())?;
    let document_type = parse_filter::<DocumentType>(query.document_type.as_deref())?;
    let mut conn = state.pool.acquire().await?;
    let documents =
        documents::list_for_user(&mut conn, caller.user_id, status, document_type).await?;
    Ok(ok(DocumentList {
        count: documents.len(),
        documents,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/documents/{id}",
    params(("id" = i64, Path, description = "Document id")),
    responses(
        (status = 200, description = "Deleted", body = Deleted),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already reviewed", body = crate::error::ErrorBody),
    ),
    tag = "documents"
)]
async fn delete_document(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<Deleted>>, AppError> {
    caller.require(Capability::UsePortal)?;
    let now = Utc::now();
    let mut tx = state.pool.begin().await?;
    let document = documents::find(&mut tx, id)
        .await?
        .filter(|d| d.user_id == caller.user_id)
        .ok_or_else(|| AppError::not_found("Document"))?;
    if document.status != DocumentStatus::Pending {
        return Err(AppError::Conflict(
            "Only pending documents can be deleted".into(),
        ));
    }
    documents::delete(&mut tx, id).await?;
    stats::refresh_for_user(&mut tx, caller.user_id, now).await?;
    tx.commit().await?;

    if let Err(err) = state.media.remove(&document.file_path).await {
        tracing::warn!(document_id = id, error = %err, "stored file not removed");
    }
    Ok(ok(Deleted {
        message: "Document deleted successfully".into(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/documents/{id}/download",
    params(("id" = i64, Path, description = "Document id")),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "documents"
)]
async fn download_document(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    caller.require(Capability::UsePortal)?;
    let document = {
        let mut conn = state.pool.acquire().await?;
        documents::find(&mut conn, id).await?
    }
    .filter(|d| d.user_id == caller.user_id || caller.can(Capability::ReviewDocuments))
    .ok_or_else(|| AppError::not_found("Document"))?;
    let bytes = state.media.read(&document.file_path).await.map_err(|err| {
        tracing::warn!(document_id = id, error = %err, "stored file missing");
        AppError::not_found("File")
    })?;
    Ok(attachment(bytes, &document.original_name))
}

#[utoipa::path(
    get,
    path = "/api/documents/types",
    responses((status = 200, description = "Accepted document types", body = DocumentTypes)),
    tag = "documents"
)]
async fn document_types(caller: Caller) -> Result<Json<Envelope<DocumentTypes>>, AppError> {
    caller.require(Capability::UsePortal)?;
    Ok(ok(DocumentTypes {
        document_types: DocumentType::all()
            .iter()
            .map(|t| Choice {
                value: t.as_str().to_string(),
                label: t.label().to_string(),
            })
            .collect(),
    }))
}

// ---------------------------------------------------------------------------
// Admin handlers
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/admin/documents/pending",
    responses(
        (status = 200, description = "Documents awaiting review", body = PendingList),
        (status = 403, description = "Not an administrator", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn pending_documents(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Envelope<PendingList>>, AppError> {
    caller.require(Capability::ReviewDocuments)?;
    let mut conn = state.pool.acquire().await?;
    let documents = documents::pending(&mut conn).await?;
    Ok(ok(PendingList {
        count: documents.len(),
        documents,
    }))
}

#[utoipa::path(
    post,
    path = "/api/admin/documents/{id}/review",
    params(("id" = i64, Path, description = "Document id")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Reviewed", body = DocumentReviewed),
        (status = 400, description = "Bad status", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn review_document(
    State(state): State<AppState>,
    caller: Caller,
    client: ClientMeta,
    Path(id): Path<i64>,
    body: Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<Json<Envelope<DocumentReviewed>>, AppError> {
    caller.require(Capability::ReviewDocuments)?;
    let req = extract_validated_json(body)?;
    let status: DocumentStatus = req.status.parse()?;
    let notes = req.notes.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    let document = documents::find(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::not_found("Document"))?;
    documents::set_review(&mut tx, id, status, caller.user_id, notes, now).await?;
    let action = match status {
        DocumentStatus::Approved => AuditAction::Approve,
        DocumentStatus::Rejected => AuditAction::Reject,
        _ => AuditAction::Update,
    };
    audit::append(
        &mut tx,
        AuditEvent {
            user_id: Some(caller.user_id),
            action,
            model_name: "Document",
            object_id: id,
            description: format!("{} document \"{}\"", status.label(), document.name),
            client: &client,
        },
        now,
    )
    .await?;
    let message = format!("Your document \"{}\" was marked {}", document.name, status.label());
    notifications::insert(
        &mut tx,
        document.user_id,
        &NewNotification {
            notification_type: NotificationType::Document,
            title: "Document reviewed",
            message: &message,
            related_object_id: Some(id),
            related_object_type: Some("Document"),
        },
        now,
    )
    .await?;
    let refreshed = stats::refresh_for_user(&mut tx, document.user_id, now).await?;
    let document = documents::find(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::not_found("Document"))?;
    tx.commit().await?;

    tracing::info!(document_id = id, reviewer = caller.user_id, status = %status, "document reviewed");
    Ok(ok(DocumentReviewed {
        message: format!("Document {}", status.label().to_lowercase()),
        document,
        stats: refreshed,
    }))
}
