//! User-to-user messages with per-side soft deletion.

use chrono::{DateTime, Utc};
use klk_core::{MessagePriority, MessageType};
use serde::Serialize;
use sqlx::SqliteConnection;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
pub struct Message {
    pub id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub recipient_id: i64,
    pub recipient_name: String,
    pub subject: String,
    pub content: String,
    #[sqlx(try_from = "String")]
    #[schema(value_type = String)]
    pub message_type: MessageType,
    #[sqlx(try_from = "String")]
    #[schema(value_type = String)]
    pub priority: MessagePriority,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub deleted_by_sender: bool,
    #[serde(skip)]
    pub deleted_by_recipient: bool,
    pub sent_at: DateTime<Utc>,
}

const MESSAGE_SELECT: &str = "SELECT m.id, m.sender_id,
        TRIM(s.first_name || ' ' || s.last_name) AS sender_name,
        m.recipient_id, TRIM(r.first_name || ' ' || r.last_name) AS recipient_name,
        m.subject, m.content, m.message_type, m.priority, m.is_read, m.read_at,
        m.deleted_by_sender, m.deleted_by_recipient, m.sent_at
     FROM messages m
     JOIN users s ON s.id = m.sender_id
     JOIN users r ON r.id = m.recipient_id";

pub struct NewMessage<'a> {
    pub sender_id: i64,
    pub recipient_id: i64,
    pub subject: &'a str,
    pub content: &'a str,
    pub message_type: MessageType,
    pub priority: MessagePriority,
}

pub async fn insert(
    conn: &mut SqliteConnection,
    new: &NewMessage<'_>,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO messages (sender_id, recipient_id, subject, content, message_type, priority,
             sent_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new.sender_id)
    .bind(new.recipient_id)
    .bind(new.subject)
    .bind(new.content)
    .bind(new.message_type.as_str())
    .bind(new.priority.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn find(conn: &mut SqliteConnection, id: i64) -> Result<Option<Message>, sqlx::Error> {
    sqlx::query_as::<_, Message>(&format!("{MESSAGE_SELECT} WHERE m.id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

/// Messages received by `user_id` that they have not deleted.
pub async fn inbox(conn: &mut SqliteConnection, user_id: i64) -> Result<Vec<Message>, sqlx::Error> {
    sqlx::query_as::<_, Message>(&format!(
        "{MESSAGE_SELECT} WHERE m.recipient_id = ? AND m.deleted_by_recipient = 0
         ORDER BY m.sent_at DESC, m.id DESC"
    ))
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
}

/// Messages sent by `user_id` that they have not deleted.
pub async fn sent(conn: &mut SqliteConnection, user_id: i64) -> Result<Vec<Message>, sqlx::Error> {
    sqlx::query_as::<_, Message>(&format!(
        "{MESSAGE_SELECT} WHERE m.sender_id = ? AND m.deleted_by_sender = 0
         ORDER BY m.sent_at DESC, m.id DESC"
    ))
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
}

pub async fn unread_count(conn: &mut SqliteConnection, user_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM messages
         WHERE recipient_id = ? AND is_read = 0 AND deleted_by_recipient = 0",
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await
}

/// Mark read. Only the recipient's copy changes; a no-op if already read.
pub async fn mark_read(
    conn: &mut SqliteConnection,
    id: i64,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE messages SET is_read = 1, read_at = ? WHERE id = ? AND is_read = 0")
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Soft-delete one side. Returns true when both sides have now deleted the
/// message and the row itself was removed.
pub async fn delete_for(
    conn: &mut SqliteConnection,
    message: &Message,
    user_id: i64,
) -> Result<bool, sqlx::Error> {
    let mut by_sender = message.deleted_by_sender;
    let mut by_recipient = message.deleted_by_recipient;
    if message.sender_id == user_id {
        by_sender = true;
    }
    if message.recipient_id == user_id {
        by_recipient = true;
    }

    if by_sender && by_recipient {
        sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(message.id)
            .execute(&mut *conn)
            .await?;
        return Ok(true);
    }
    sqlx::query("UPDATE messages SET deleted_by_sender = ?, deleted_by_recipient = ? WHERE id = ?")
        .bind(by_sender)
        .bind(by_recipient)
        .bind(message.id)
        .execute(&mut *conn)
        .await?;
    Ok(false)
}
