//! # Database Persistence Layer
//!
//! SQLite via sqlx with embedded migrations. Every query function takes a
//! `&mut SqliteConnection`, so a handler can pass either a pooled connection
//! or an open transaction:
//!
//! ```ignore
//! let mut tx = state.pool.begin().await?;
//! db::payments::record_review(&mut tx, ...).await?;
//! db::audit::append(&mut tx, ...).await?;
//! tx.commit().await?;
//! ```
//!
//! Money columns hold integer cents; status columns hold the wire form of
//! the `klk-core` enums and parse back through `TryFrom<String>`.

pub mod academics;
pub mod audit;
pub mod calendar;
pub mod documents;
pub mod education;
pub mod logins;
pub mod messages;
pub mod notifications;
pub mod payments;
pub mod profiles;
pub mod statements;
pub mod users;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Open (creating if needed) the database at `url` and run migrations.
pub async fn init_pool(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!(url, "database ready");
    Ok(pool)
}

/// A migrated in-memory database on a single long-lived connection.
pub async fn init_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// SQLITE_BUSY or SQLITE_LOCKED, including extended codes such as the
/// WAL snapshot conflict a deferred transaction hits when upgrading to write.
pub fn is_busy(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db) = err else {
        return false;
    };
    db.code()
        .and_then(|code| code.parse::<i32>().ok())
        .is_some_and(|code| matches!(code & 0xff, 5 | 6))
}

/// Escape `%` and `_` for a `LIKE ... ESCAPE '\'` pattern and wrap in `%`.
pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_pool_is_migrated() {
        let pool = init_memory_pool().await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn like_escaping() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
