//! # Statistics Refresh
//!
//! Cached level and grade aggregates are recomputed here and nowhere else.
//! Every write that can move an aggregate (profile, academic summary,
//! payment, document, fee statement) calls [`refresh_for_user`] inside its
//! transaction. The recompute reads the whole scope and overwrites the
//! cached row, so it is idempotent and never partially updates a row.

use chrono::{DateTime, Utc};
use klk_stats::{GradeStats, LevelStats, ScopeSnapshot};
use serde::Serialize;
use sqlx::SqliteConnection;
use utoipa::ToSchema;

use crate::db::profiles::Scope;
use crate::db::{academics, documents, education, payments, profiles, statements};

/// Aggregates rewritten by a refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct Refreshed {
    pub education_level_id: Option<i64>,
    #[schema(value_type = Option<Object>)]
    pub level: Option<LevelStats>,
    pub grade_class_id: Option<i64>,
    #[schema(value_type = Option<Object>)]
    pub grade: Option<GradeStats>,
}

/// Load everything a recompute reads for `scope`.
pub async fn snapshot(
    conn: &mut SqliteConnection,
    scope: Scope,
) -> Result<ScopeSnapshot, sqlx::Error> {
    Ok(ScopeSnapshot {
        beneficiaries: profiles::snapshots(conn, scope).await?,
        summaries: academics::summary_points(conn, scope).await?,
        statements: statements::totals(conn, scope).await?,
        verified_payments: payments::verified_amounts(conn, scope).await?,
        documents: documents::statuses(conn, scope).await?,
    })
}

pub async fn recompute_level(
    conn: &mut SqliteConnection,
    education_level_id: i64,
    now: DateTime<Utc>,
) -> Result<LevelStats, sqlx::Error> {
    let scope = snapshot(conn, Scope::Level(education_level_id)).await?;
    let stats = klk_stats::level_stats(&scope, now.date_naive());
    education::store_level_stats(conn, education_level_id, &stats, now).await?;
    tracing::info!(
        education_level_id,
        total_students = stats.total_students,
        average_performance = stats.average_performance,
        passing_rate = stats.passing_rate,
        "level stats recomputed"
    );
    Ok(stats)
}

pub async fn recompute_grade(
    conn: &mut SqliteConnection,
    grade_class_id: i64,
    now: DateTime<Utc>,
) -> Result<GradeStats, sqlx::Error> {
    let scope = snapshot(conn, Scope::Grade(grade_class_id)).await?;
    let stats = klk_stats::grade_stats(&scope);
    education::store_grade_stats(conn, grade_class_id, &stats, now).await?;
    tracing::info!(
        grade_class_id,
        total_students = stats.total_students,
        average_performance = stats.average_performance,
        passing_rate = stats.passing_rate,
        "grade stats recomputed"
    );
    Ok(stats)
}

/// Recompute the given level and grade, skipping whichever is absent.
pub async fn refresh_placement(
    conn: &mut SqliteConnection,
    education_level_id: Option<i64>,
    grade_class_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<Refreshed, sqlx::Error> {
    let level = match education_level_id {
        Some(id) => Some(recompute_level(conn, id, now).await?),
        None => None,
    };
    let grade = match grade_class_id {
        Some(id) => Some(recompute_grade(conn, id, now).await?),
        None => None,
    };
    Ok(Refreshed {
        education_level_id,
        level,
        grade_class_id,
        grade,
    })
}

/// Recompute the level and grade the user is placed in. A user with no
/// profile or no placement refreshes nothing.
pub async fn refresh_for_user(
    conn: &mut SqliteConnection,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<Refreshed, sqlx::Error> {
    match profiles::placement(conn, user_id).await? {
        Some((level, grade)) => refresh_placement(conn, level, grade, now).await,
        None => {
            tracing::debug!(user_id, "no profile; stats refresh skipped");
            Ok(Refreshed::default())
        }
    }
}

/// Recompute every level and grade. Returns `(levels, grades)` counts.
pub async fn recompute_all(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> Result<(usize, usize), sqlx::Error> {
    let levels = education::list_levels(conn, false).await?;
    let mut grades = 0;
    for level in &levels {
        recompute_level(conn, level.id, now).await?;
        for grade in education::list_grades(conn, level.id).await? {
            recompute_grade(conn, grade.id, now).await?;
            grades += 1;
        }
    }
    Ok((levels.len(), grades))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::academics::{upsert_summary, NewSummary};
    use crate::db::education::{insert_grade, insert_level, LevelFields};
    use crate::db::init_memory_pool;
    use crate::db::testing::seed_beneficiary;

    #[tokio::test]
    async fn empty_level_is_all_zeros() {
        let pool = init_memory_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let now = Utc::now();
        let level = insert_level(&mut conn, "primary", "Primary", &LevelFields::default(), now)
            .await
            .unwrap();
        let stats = recompute_level(&mut conn, level, now).await.unwrap();
        assert_eq!(stats, LevelStats::default());
    }

    #[tokio::test]
    async fn empty_grade_is_all_zeros() {
        let pool = init_memory_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let now = Utc::now();
        let level = insert_level(&mut conn, "primary", "Primary", &LevelFields::default(), now)
            .await
            .unwrap();
        let grade = insert_grade(&mut conn, level, "Grade 5", "G5", "", 5).await.unwrap();
        let stats = recompute_grade(&mut conn, grade, now).await.unwrap();
        assert_eq!(stats, GradeStats::default());
        assert_eq!(education::grade_stats(&mut conn, grade).await.unwrap(), stats);
    }

    #[tokio::test]
    async fn refresh_for_user_rewrites_level_and_grade() {
        let pool = init_memory_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let now = Utc::now();
        let level = insert_level(&mut conn, "primary", "Primary", &LevelFields::default(), now)
            .await
            .unwrap();
        let grade = insert_grade(&mut conn, level, "Grade 4", "G4", "", 4).await.unwrap();
        let user = seed_beneficiary(&mut conn, "kid@example.com").await;
        profiles::set_placement(&mut conn, user, Some(level), Some(grade), now)
            .await
            .unwrap();
        for (term, score) in [("Term 1", 35.0), ("Term 2", 55.0)] {
            upsert_summary(
                &mut conn,
                &NewSummary {
                    user_id: user,
                    term,
                    year: 2025,
                    average_score: score,
                    total_points: None,
                    mean_grade: klk_core::grade_for_marks(score),
                    class_position: None,
                    class_size: None,
                    attendance_percentage: Some(80.0),
                    remarks: None,
                },
                now,
            )
            .await
            .unwrap();
        }

        let refreshed = refresh_for_user(&mut conn, user, now).await.unwrap();
        let level_stats = refreshed.level.unwrap();
        assert_eq!(level_stats.total_students, 1);
        assert_eq!(level_stats.average_performance, 55.0);
        assert_eq!(level_stats.passing_rate, 100.0);
        let grade_stats = refreshed.grade.unwrap();
        assert_eq!(grade_stats.average_attendance, 80.0);
        assert_eq!(grade_stats.passing_rate, 100.0);
        assert_eq!(grade_stats.active_students, 1);

        // The cached rows match what the refresh returned.
        assert_eq!(education::level_stats(&mut conn, level).await.unwrap(), level_stats);
        assert_eq!(education::grade_stats(&mut conn, grade).await.unwrap(), grade_stats);
    }

    #[tokio::test]
    async fn unplaced_user_refreshes_nothing() {
        let pool = init_memory_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let user = seed_beneficiary(&mut conn, "kid@example.com").await;
        let refreshed = refresh_for_user(&mut conn, user, Utc::now()).await.unwrap();
        assert_eq!(refreshed, Refreshed::default());
    }
}
