//! # Messaging
//!
//! Beneficiaries write to the programme office; administrators write to
//! anyone. Each side deletes its own copy, and the row goes once both have.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use klk_core::{MessagePriority, MessageType, NotificationType};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{Caller, Capability};
use crate::db::messages::{self, Message, NewMessage};
use crate::db::notifications::{self, NewNotification};
use crate::db::users;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::response::{ok, Envelope};
use crate::routes::auth::MessageResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendRequest {
    pub subject: String,
    pub content: String,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub message_type: Option<MessageType>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub priority: Option<MessagePriority>,
}

impl Validate for SendRequest {
    fn validate(&self) -> Result<(), String> {
        if self.subject.trim().is_empty() || self.content.trim().is_empty() {
            return Err("Subject and content are required".into());
        }
        if self.subject.chars().count() > 200 {
            return Err("Subject must be at most 200 characters".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdminSendRequest {
    pub recipient_id: i64,
    #[serde(flatten)]
    pub message: SendRequest,
}

impl Validate for AdminSendRequest {
    fn validate(&self) -> Result<(), String> {
        self.message.validate()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Mailbox {
    pub inbox: Vec<Message>,
    pub sent: Vec<Message>,
    pub unread_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageSent {
    pub message: String,
    pub data: Message,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/messages", get(mailbox).post(send_to_office))
        .route("/api/messages/:id/read", post(mark_read))
        .route("/api/messages/:id", delete(remove))
        .route("/api/admin/messages", post(send_as_admin))
}

/// Insert a message and drop a notification in the recipient's feed.
async fn deliver(
    state: &AppState,
    caller: &Caller,
    recipient_id: i64,
    req: &SendRequest,
) -> Result<Message, AppError> {
    let now = Utc::now();
    let mut tx = state.pool.begin().await?;
    let id = messages::insert(
        &mut tx,
        &NewMessage {
            sender_id: caller.user_id,
            recipient_id,
            subject: req.subject.trim(),
            content: req.content.trim(),
            message_type: req.message_type.unwrap_or(MessageType::General),
            priority: req.priority.unwrap_or(MessagePriority::Normal),
        },
        now,
    )
    .await?;
    let title = format!("New message from {}", caller.full_name());
    notifications::insert(
        &mut tx,
        recipient_id,
        &NewNotification {
            notification_type: NotificationType::Message,
            title: &title,
            message: req.subject.trim(),
            related_object_id: Some(id),
            related_object_type: Some("message"),
        },
        now,
    )
    .await?;
    let message = messages::find(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::Internal("message vanished after insert".into()))?;
    tx.commit().await?;
    tracing::debug!(message_id = id, sender = caller.user_id, recipient_id, "message sent");
    Ok(message)
}

#[utoipa::path(
    get,
    path = "/api/messages",
    responses((status = 200, description = "Inbox and sent items", body = Mailbox)),
    tag = "messages"
)]
async fn mailbox(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Envelope<Mailbox>>, AppError> {
    let mut conn = state.pool.acquire().await?;
    Ok(ok(Mailbox {
        inbox: messages::inbox(&mut conn, caller.user_id).await?,
        sent: messages::sent(&mut conn, caller.user_id).await?,
        unread_count: messages::unread_count(&mut conn, caller.user_id).await?,
    }))
}

#[utoipa::path(
    post,
    path = "/api/messages",
    request_body = SendRequest,
    responses(
        (status = 200, description = "Message sent to the programme office", body = MessageSent),
        (status = 404, description = "No administrator available", body = crate::error::ErrorBody),
    ),
    tag = "messages"
)]
async fn send_to_office(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<Envelope<MessageSent>>, AppError> {
    caller.require(Capability::UsePortal)?;
    let req = extract_validated_json(body)?;
    let recipient = {
        let mut conn = state.pool.acquire().await?;
        users::first_active_admin(&mut conn)
            .await?
            .ok_or_else(|| AppError::NotFound("No administrator available to receive messages".into()))?
    };
    let data = deliver(&state, &caller, recipient, &req).await?;
    Ok(ok(MessageSent {
        message: "Message sent successfully".into(),
        data,
    }))
}

#[utoipa::path(
    post,
    path = "/api/admin/messages",
    request_body = AdminSendRequest,
    responses(
        (status = 200, description = "Message sent", body = MessageSent),
        (status = 404, description = "Unknown recipient", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn send_as_admin(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<AdminSendRequest>, JsonRejection>,
) -> Result<Json<Envelope<MessageSent>>, AppError> {
    caller.require(Capability::MessageAnyone)?;
    let req = extract_validated_json(body)?;
    {
        let mut conn = state.pool.acquire().await?;
        users::find_account(&mut conn, req.recipient_id)
            .await?
            .ok_or_else(|| AppError::not_found("Recipient"))?;
    }
    let data = deliver(&state, &caller, req.recipient_id, &req.message).await?;
    Ok(ok(MessageSent {
        message: "Message sent successfully".into(),
        data,
    }))
}

#[utoipa::path(
    post,
    path = "/api/messages/{id}/read",
    params(("id" = i64, Path, description = "Message id")),
    responses(
        (status = 200, description = "Marked read", body = MessageResponse),
        (status = 404, description = "Not the recipient", body = crate::error::ErrorBody),
    ),
    tag = "messages"
)]
async fn mark_read(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<MessageResponse>>, AppError> {
    let mut conn = state.pool.acquire().await?;
    match messages::find(&mut conn, id).await? {
        Some(m) if m.recipient_id == caller.user_id && !m.deleted_by_recipient => {
            messages::mark_read(&mut conn, id, Utc::now()).await?;
            Ok(ok(MessageResponse::new("Message marked as read")))
        }
        _ => Err(AppError::not_found("Message")),
    }
}

#[utoipa::path(
    delete,
    path = "/api/messages/{id}",
    params(("id" = i64, Path, description = "Message id")),
    responses(
        (status = 200, description = "Deleted from the caller's mailbox", body = MessageResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "messages"
)]
async fn remove(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<Envelope<MessageResponse>>, AppError> {
    let mut conn = state.pool.acquire().await?;
    let message = messages::find(&mut conn, id)
        .await?
        .filter(|m| {
            (m.sender_id == caller.user_id && !m.deleted_by_sender)
                || (m.recipient_id == caller.user_id && !m.deleted_by_recipient)
        })
        .ok_or_else(|| AppError::not_found("Message"))?;
    let purged = messages::delete_for(&mut conn, &message, caller.user_id).await?;
    tracing::debug!(message_id = id, user_id = caller.user_id, purged, "message deleted");
    Ok(ok(MessageResponse::new("Message deleted")))
}

#[cfg(test)]
mod tests {
    use crate::testing::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn beneficiary_message_reaches_admin() {
        let t = TestApp::new().await;
        let (status, body) = t
            .post(
                "/api/messages",
                &t.user_token,
                json!({"subject": "Term 2 fees", "content": "Statement attached", "message_type": "financial"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["recipient_id"], t.admin_id);
        assert_eq!(body["data"]["priority"], "normal");
        let id = body["data"]["id"].as_i64().unwrap();

        let (_, body) = t.get("/api/messages", &t.admin_token).await;
        assert_eq!(body["unread_count"], 1);
        assert_eq!(body["inbox"][0]["sender_name"], "Amani Otieno");

        let (status, _) = t.post(&format!("/api/messages/{id}/read"), &t.user_token, json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = t.post(&format!("/api/messages/{id}/read"), &t.admin_token, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = t.get("/api/messages", &t.admin_token).await;
        assert_eq!(body["unread_count"], 0);

        let (_, body) = t.get("/api/admin/notifications", &t.admin_token).await;
        assert_eq!(body["notifications"][0]["notification_type"], "message");
    }

    #[tokio::test]
    async fn delete_is_per_side() {
        let t = TestApp::new().await;
        let (_, body) = t
            .post(
                "/api/admin/messages",
                &t.admin_token,
                json!({"recipient_id": t.user_id, "subject": "Welcome", "content": "Karibu"}),
            )
            .await;
        let id = body["data"]["id"].as_i64().unwrap();

        let (status, _) = t.delete(&format!("/api/messages/{id}"), &t.user_token).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = t.get("/api/messages", &t.user_token).await;
        assert!(body["inbox"].as_array().unwrap().is_empty());
        let (_, body) = t.get("/api/messages", &t.admin_token).await;
        assert_eq!(body["sent"].as_array().unwrap().len(), 1);

        let (status, _) = t.delete(&format!("/api/messages/{id}"), &t.user_token).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = t.delete(&format!("/api/messages/{id}"), &t.admin_token).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn validation_and_permissions() {
        let t = TestApp::new().await;
        let (status, _) = t
            .post("/api/messages", &t.user_token, json!({"subject": " ", "content": "x"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = t
            .post(
                "/api/admin/messages",
                &t.user_token,
                json!({"recipient_id": t.admin_id, "subject": "Hi", "content": "x"}),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = t
            .post(
                "/api/admin/messages",
                &t.admin_token,
                json!({"recipient_id": 9999, "subject": "Hi", "content": "x"}),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
