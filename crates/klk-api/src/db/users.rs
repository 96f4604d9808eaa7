//! Accounts: credentials, names and admin flags.

use chrono::{DateTime, Utc};
use klk_core::Role;
use sqlx::SqliteConnection;

/// A user joined with the role on their profile.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    #[sqlx(try_from = "String")]
    pub role: Role,
}

const ACCOUNT_SELECT: &str = "SELECT u.id, u.username, u.email, u.password_hash, u.first_name,
        u.last_name, u.is_active, u.is_staff, u.is_superuser, u.date_joined, u.last_login,
        COALESCE(p.role, 'beneficiary') AS role
     FROM users u LEFT JOIN profiles p ON p.user_id = u.id";

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub is_staff: bool,
    pub is_superuser: bool,
}

pub async fn find_account(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>(&format!("{ACCOUNT_SELECT} WHERE u.id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn find_account_by_email(
    conn: &mut SqliteConnection,
    email: &str,
) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>(&format!("{ACCOUNT_SELECT} WHERE u.email = ?"))
        .bind(email)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn email_exists(conn: &mut SqliteConnection, email: &str) -> Result<bool, sqlx::Error> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(&mut *conn)
        .await?;
    Ok(n > 0)
}

/// `base`, or `base1`, `base2`, ... whichever is free first.
pub async fn unique_username(
    conn: &mut SqliteConnection,
    base: &str,
) -> Result<String, sqlx::Error> {
    let base: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let base = if base.is_empty() { "user".to_string() } else { base };
    let mut candidate = base.clone();
    let mut n = 0;
    loop {
        let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(&candidate)
            .fetch_one(&mut *conn)
            .await?;
        if taken == 0 {
            return Ok(candidate);
        }
        n += 1;
        candidate = format!("{base}{n}");
    }
}

pub async fn insert_user(
    conn: &mut SqliteConnection,
    user: &NewUser<'_>,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO users (username, email, password_hash, first_name, last_name,
         is_active, is_staff, is_superuser, date_joined)
         VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)",
    )
    .bind(user.username)
    .bind(user.email)
    .bind(user.password_hash)
    .bind(user.first_name)
    .bind(user.last_name)
    .bind(user.is_staff)
    .bind(user.is_superuser)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn update_password(
    conn: &mut SqliteConnection,
    id: i64,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(password_hash)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn touch_last_login(
    conn: &mut SqliteConnection,
    id: i64,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Partial update of name, email and active flag. `None` leaves a column alone.
pub async fn update_identity(
    conn: &mut SqliteConnection,
    id: i64,
    first_name: Option<&str>,
    last_name: Option<&str>,
    email: Option<&str>,
    is_active: Option<bool>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE users SET first_name = COALESCE(?, first_name),
             last_name = COALESCE(?, last_name),
             email = COALESCE(?, email),
             is_active = COALESCE(?, is_active)
         WHERE id = ?",
    )
    .bind(first_name)
    .bind(last_name)
    .bind(email)
    .bind(is_active)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Lowest-id active administrator, the default recipient of beneficiary mail.
pub async fn first_active_admin(conn: &mut SqliteConnection) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT u.id FROM users u LEFT JOIN profiles p ON p.user_id = u.id
         WHERE u.is_active = 1
           AND (u.is_staff = 1 OR u.is_superuser = 1 OR p.role IN ('admin', 'staff'))
         ORDER BY u.id LIMIT 1",
    )
    .fetch_optional(&mut *conn)
    .await
}

/// Ids of every active administrator.
pub async fn active_admin_ids(conn: &mut SqliteConnection) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT u.id FROM users u LEFT JOIN profiles p ON p.user_id = u.id
         WHERE u.is_active = 1
           AND (u.is_staff = 1 OR u.is_superuser = 1 OR p.role IN ('admin', 'staff'))
         ORDER BY u.id",
    )
    .fetch_all(&mut *conn)
    .await
}
