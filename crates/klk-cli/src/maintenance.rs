//! # Maintenance Subcommands
//!
//! Seeding, statistics recompute and audit verification.

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;

use klk_api::db::audit::{self, ChainIntegrityResult};
use klk_api::db::education;
use klk_api::services::stats;

/// Insert the default levels and their grades. Existing level keys are
/// skipped. Returns the number of levels created.
pub async fn seed_levels(pool: &SqlitePool) -> Result<usize> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let created = education::seed_defaults(&mut tx, now).await?;
    if created > 0 {
        stats::recompute_all(&mut tx, now).await?;
    }
    tx.commit().await?;
    tracing::info!(created, "default education levels seeded");
    Ok(created)
}

/// Rebuild every level and grade statistic. Returns (levels, grades).
pub async fn recompute_stats(pool: &SqlitePool) -> Result<(usize, usize)> {
    let mut tx = pool.begin().await?;
    let counts = stats::recompute_all(&mut tx, Utc::now()).await?;
    tx.commit().await?;
    tracing::info!(levels = counts.0, grades = counts.1, "statistics recomputed");
    Ok(counts)
}

/// Walk the audit log hash chain.
pub async fn verify_audit(pool: &SqlitePool) -> Result<ChainIntegrityResult> {
    let mut conn = pool.acquire().await?;
    let result = audit::verify_chain_integrity(&mut conn).await?;
    if result.chain_valid {
        tracing::info!(entries = result.total_entries, "audit chain intact");
    } else {
        tracing::error!(
            broken_links = result.broken_links,
            tampered = result.tampered_entries,
            first_bad_id = ?result.first_bad_id,
            "audit chain integrity failure"
        );
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use klk_api::db::init_memory_pool;

    #[tokio::test]
    async fn seeding_twice_creates_nothing_new() {
        let pool = init_memory_pool().await.unwrap();
        let first = seed_levels(&pool).await.unwrap();
        assert!(first > 0);
        assert_eq!(seed_levels(&pool).await.unwrap(), 0);

        let (levels, grades) = recompute_stats(&pool).await.unwrap();
        assert_eq!(levels, first);
        assert!(grades > 0);
    }

    #[tokio::test]
    async fn empty_audit_log_is_valid() {
        let pool = init_memory_pool().await.unwrap();
        let result = verify_audit(&pool).await.unwrap();
        assert!(result.chain_valid);
        assert_eq!(result.total_entries, 0);
    }
}
