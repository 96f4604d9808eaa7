//! Login history.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::extractors::ClientMeta;

pub async fn record(
    conn: &mut SqliteConnection,
    user_id: i64,
    client: &ClientMeta,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO login_history (user_id, ip_address, user_agent, login_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(&client.ip_address)
    .bind(&client.user_agent)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn count_for(conn: &mut SqliteConnection, user_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM login_history WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await
}
