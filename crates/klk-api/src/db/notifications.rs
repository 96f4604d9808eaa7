//! In-app notifications for administrators.

use chrono::{DateTime, Utc};
use klk_core::NotificationType;
use serde::Serialize;
use sqlx::SqliteConnection;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: i64,
    #[sqlx(try_from = "String")]
    #[schema(value_type = String)]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub related_object_id: Option<i64>,
    pub related_object_type: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

pub struct NewNotification<'a> {
    pub notification_type: NotificationType,
    pub title: &'a str,
    pub message: &'a str,
    pub related_object_id: Option<i64>,
    pub related_object_type: Option<&'a str>,
}

pub async fn insert(
    conn: &mut SqliteConnection,
    recipient_id: i64,
    new: &NewNotification<'_>,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO notifications (recipient_id, notification_type, title, message,
             related_object_id, related_object_type, is_read, created_at)
         VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(recipient_id)
    .bind(new.notification_type.as_str())
    .bind(new.title)
    .bind(new.message)
    .bind(new.related_object_id)
    .bind(new.related_object_type)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// One copy per active administrator. Returns how many were created.
pub async fn notify_admins(
    conn: &mut SqliteConnection,
    new: &NewNotification<'_>,
    now: DateTime<Utc>,
) -> Result<usize, sqlx::Error> {
    let admins = super::users::active_admin_ids(conn).await?;
    for admin in &admins {
        insert(conn, *admin, new, now).await?;
    }
    Ok(admins.len())
}

pub async fn list_for(
    conn: &mut SqliteConnection,
    recipient_id: i64,
    unread_only: bool,
    limit: i64,
) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications WHERE recipient_id = ? AND (? = 0 OR is_read = 0)
         ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(recipient_id)
    .bind(unread_only)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await
}

pub async fn unread_count(
    conn: &mut SqliteConnection,
    recipient_id: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = 0")
        .bind(recipient_id)
        .fetch_one(&mut *conn)
        .await
}

/// Mark one of the recipient's notifications read. False if it is not theirs.
pub async fn mark_read(
    conn: &mut SqliteConnection,
    id: i64,
    recipient_id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND recipient_id = ?")
        .bind(id)
        .bind(recipient_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() == 1)
}
