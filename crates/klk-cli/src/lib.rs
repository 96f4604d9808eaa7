//! # klk-cli: Operator CLI for Kids League Kenya
//!
//! Maintenance tasks that run against the same SQLite database as the API
//! server, without going through HTTP.
//!
//! ## Subcommands
//!
//! - `klk migrate`: create the database and apply migrations.
//! - `klk create-admin`: add an administrator account.
//! - `klk seed-levels`: insert the default education levels and grades.
//! - `klk issue-token`: mint a bearer token for an existing account.
//! - `klk recompute-stats`: rebuild every level and grade statistic.
//! - `klk verify-audit`: check the audit log hash chain.
//!
//! ```bash
//! klk --database-url sqlite://klk.db migrate
//! klk create-admin --email office@kidsleague.or.ke --first-name Grace --last-name Wambui
//! klk -v recompute-stats
//! ```

pub mod accounts;
pub mod maintenance;

use anyhow::{Context, Result};
use sqlx::SqlitePool;

/// Open the database, applying any pending migrations.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    klk_api::db::init_pool(database_url)
        .await
        .with_context(|| format!("opening database {database_url}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_creates_and_migrates_a_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("klk.db").display());
        let pool = connect(&url).await.unwrap();
        let levels: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM education_levels")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(levels, 0);
    }
}
