//! Education levels, grades and their cached statistics rows.

use chrono::{DateTime, Utc};
use klk_core::Money;
use klk_stats::{GradeStats, LevelStats};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
pub struct Level {
    pub id: i64,
    pub level_key: String,
    pub title: String,
    pub description: String,
    pub icon_name: String,
    pub color_gradient: String,
    pub display_order: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
pub struct Grade {
    pub id: i64,
    pub education_level_id: i64,
    pub name: String,
    pub short_code: String,
    pub description: String,
    pub display_order: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LevelFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub icon_name: Option<String>,
    pub color_gradient: Option<String>,
    pub display_order: Option<i64>,
    pub is_active: Option<bool>,
}

/// Levels and grades created by `klk seed-levels`.
pub const DEFAULT_LEVELS: &[(&str, &str, &str, &[(&str, &str)])] = &[
    (
        "pre_school",
        "Pre-School",
        "Early childhood education",
        &[("Baby Class", "BC"), ("PP1", "PP1"), ("PP2", "PP2")],
    ),
    (
        "primary",
        "Primary",
        "Fundamental education for grades 1-8",
        &[
            ("Grade 1", "G1"),
            ("Grade 2", "G2"),
            ("Grade 3", "G3"),
            ("Grade 4", "G4"),
            ("Grade 5", "G5"),
            ("Grade 6", "G6"),
            ("Grade 7", "G7"),
            ("Grade 8", "G8"),
        ],
    ),
    (
        "secondary",
        "Secondary",
        "High school education for Forms 1-4",
        &[("Form 1", "F1"), ("Form 2", "F2"), ("Form 3", "F3"), ("Form 4", "F4")],
    ),
    (
        "university",
        "University/College",
        "Higher education and degree programs",
        &[
            ("Year 1", "Y1"),
            ("Year 2", "Y2"),
            ("Year 3", "Y3"),
            ("Year 4", "Y4"),
            ("Postgraduate", "PG"),
        ],
    ),
    (
        "vocational",
        "Vocational",
        "Technical and vocational training programs",
        &[("Certificate", "VC"), ("Diploma", "VD")],
    ),
];

pub async fn list_levels(
    conn: &mut SqliteConnection,
    active_only: bool,
) -> Result<Vec<Level>, sqlx::Error> {
    sqlx::query_as::<_, Level>(
        "SELECT * FROM education_levels WHERE (? = 0 OR is_active = 1)
         ORDER BY display_order, id",
    )
    .bind(active_only)
    .fetch_all(&mut *conn)
    .await
}

pub async fn find_level(conn: &mut SqliteConnection, id: i64) -> Result<Option<Level>, sqlx::Error> {
    sqlx::query_as::<_, Level>("SELECT * FROM education_levels WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn find_level_by_key(
    conn: &mut SqliteConnection,
    key: &str,
) -> Result<Option<Level>, sqlx::Error> {
    sqlx::query_as::<_, Level>("SELECT * FROM education_levels WHERE level_key = ?")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn insert_level(
    conn: &mut SqliteConnection,
    level_key: &str,
    title: &str,
    fields: &LevelFields,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO education_levels (level_key, title, description, icon_name, color_gradient,
             display_order, is_active, created_at)
         VALUES (?, ?, COALESCE(?, ''), COALESCE(?, ''), COALESCE(?, ''), COALESCE(?, 0),
                 COALESCE(?, 1), ?)",
    )
    .bind(level_key)
    .bind(title)
    .bind(&fields.description)
    .bind(&fields.icon_name)
    .bind(&fields.color_gradient)
    .bind(fields.display_order)
    .bind(fields.is_active)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn update_level(
    conn: &mut SqliteConnection,
    id: i64,
    fields: &LevelFields,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE education_levels SET
             title = COALESCE(?, title),
             description = COALESCE(?, description),
             icon_name = COALESCE(?, icon_name),
             color_gradient = COALESCE(?, color_gradient),
             display_order = COALESCE(?, display_order),
             is_active = COALESCE(?, is_active)
         WHERE id = ?",
    )
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(&fields.icon_name)
    .bind(&fields.color_gradient)
    .bind(fields.display_order)
    .bind(fields.is_active)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn list_grades(
    conn: &mut SqliteConnection,
    education_level_id: i64,
) -> Result<Vec<Grade>, sqlx::Error> {
    sqlx::query_as::<_, Grade>(
        "SELECT * FROM grade_classes WHERE education_level_id = ? AND is_active = 1
         ORDER BY display_order, id",
    )
    .bind(education_level_id)
    .fetch_all(&mut *conn)
    .await
}

pub async fn find_grade(conn: &mut SqliteConnection, id: i64) -> Result<Option<Grade>, sqlx::Error> {
    sqlx::query_as::<_, Grade>("SELECT * FROM grade_classes WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn insert_grade(
    conn: &mut SqliteConnection,
    education_level_id: i64,
    name: &str,
    short_code: &str,
    description: &str,
    display_order: i64,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO grade_classes (education_level_id, name, short_code, description,
             display_order, is_active)
         VALUES (?, ?, ?, ?, ?, 1)",
    )
    .bind(education_level_id)
    .bind(name)
    .bind(short_code)
    .bind(description)
    .bind(display_order)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Insert the default levels and grades that do not exist yet. Returns how
/// many levels were created.
pub async fn seed_defaults(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> Result<usize, sqlx::Error> {
    let mut created = 0;
    for (order, (key, title, description, grades)) in DEFAULT_LEVELS.iter().enumerate() {
        if find_level_by_key(conn, key).await?.is_some() {
            continue;
        }
        let fields = LevelFields {
            description: Some(description.to_string()),
            display_order: Some(order as i64),
            ..Default::default()
        };
        let level_id = insert_level(conn, key, title, &fields, now).await?;
        for (i, (name, code)) in grades.iter().enumerate() {
            insert_grade(conn, level_id, name, code, "", i as i64).await?;
        }
        created += 1;
    }
    Ok(created)
}

#[derive(sqlx::FromRow)]
struct LevelStatsRow {
    total_students: i64,
    active_students: i64,
    pending_verification: i64,
    new_this_month: i64,
    average_performance: f64,
    passing_rate: f64,
    total_fees: i64,
    total_paid: i64,
    total_aid_disbursed: i64,
    pending_documents: i64,
    approved_documents: i64,
}

impl From<LevelStatsRow> for LevelStats {
    fn from(r: LevelStatsRow) -> Self {
        Self {
            total_students: r.total_students,
            active_students: r.active_students,
            pending_verification: r.pending_verification,
            new_this_month: r.new_this_month,
            average_performance: r.average_performance,
            passing_rate: r.passing_rate,
            total_fees: Money::from_cents(r.total_fees),
            total_paid: Money::from_cents(r.total_paid),
            total_aid_disbursed: Money::from_cents(r.total_aid_disbursed),
            pending_documents: r.pending_documents,
            approved_documents: r.approved_documents,
        }
    }
}

/// Cached level statistics; all zeros if never computed.
pub async fn level_stats(
    conn: &mut SqliteConnection,
    education_level_id: i64,
) -> Result<LevelStats, sqlx::Error> {
    let row = sqlx::query_as::<_, LevelStatsRow>(
        "SELECT * FROM education_level_stats WHERE education_level_id = ?",
    )
    .bind(education_level_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(LevelStats::from).unwrap_or_default())
}

/// Overwrite the cached row for a level.
pub async fn store_level_stats(
    conn: &mut SqliteConnection,
    education_level_id: i64,
    stats: &LevelStats,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO education_level_stats (education_level_id, total_students, active_students,
             pending_verification, new_this_month, average_performance, passing_rate, total_fees,
             total_paid, total_aid_disbursed, pending_documents, approved_documents, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (education_level_id) DO UPDATE SET
             total_students = excluded.total_students,
             active_students = excluded.active_students,
             pending_verification = excluded.pending_verification,
             new_this_month = excluded.new_this_month,
             average_performance = excluded.average_performance,
             passing_rate = excluded.passing_rate,
             total_fees = excluded.total_fees,
             total_paid = excluded.total_paid,
             total_aid_disbursed = excluded.total_aid_disbursed,
             pending_documents = excluded.pending_documents,
             approved_documents = excluded.approved_documents,
             updated_at = excluded.updated_at",
    )
    .bind(education_level_id)
    .bind(stats.total_students)
    .bind(stats.active_students)
    .bind(stats.pending_verification)
    .bind(stats.new_this_month)
    .bind(stats.average_performance)
    .bind(stats.passing_rate)
    .bind(stats.total_fees.cents())
    .bind(stats.total_paid.cents())
    .bind(stats.total_aid_disbursed.cents())
    .bind(stats.pending_documents)
    .bind(stats.approved_documents)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct GradeStatsRow {
    total_students: i64,
    active_students: i64,
    male_students: i64,
    female_students: i64,
    average_performance: f64,
    average_attendance: f64,
    passing_rate: f64,
    total_fees: i64,
    total_paid: i64,
    pending_documents: i64,
    approved_documents: i64,
}

impl From<GradeStatsRow> for GradeStats {
    fn from(r: GradeStatsRow) -> Self {
        Self {
            total_students: r.total_students,
            active_students: r.active_students,
            male_students: r.male_students,
            female_students: r.female_students,
            average_performance: r.average_performance,
            average_attendance: r.average_attendance,
            passing_rate: r.passing_rate,
            total_fees: Money::from_cents(r.total_fees),
            total_paid: Money::from_cents(r.total_paid),
            pending_documents: r.pending_documents,
            approved_documents: r.approved_documents,
        }
    }
}

pub async fn grade_stats(
    conn: &mut SqliteConnection,
    grade_class_id: i64,
) -> Result<GradeStats, sqlx::Error> {
    let row = sqlx::query_as::<_, GradeStatsRow>(
        "SELECT * FROM grade_stats WHERE grade_class_id = ?",
    )
    .bind(grade_class_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(GradeStats::from).unwrap_or_default())
}

pub async fn store_grade_stats(
    conn: &mut SqliteConnection,
    grade_class_id: i64,
    stats: &GradeStats,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO grade_stats (grade_class_id, total_students, active_students, male_students,
             female_students, average_performance, average_attendance, passing_rate, total_fees,
             total_paid, pending_documents, approved_documents, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (grade_class_id) DO UPDATE SET
             total_students = excluded.total_students,
             active_students = excluded.active_students,
             male_students = excluded.male_students,
             female_students = excluded.female_students,
             average_performance = excluded.average_performance,
             average_attendance = excluded.average_attendance,
             passing_rate = excluded.passing_rate,
             total_fees = excluded.total_fees,
             total_paid = excluded.total_paid,
             pending_documents = excluded.pending_documents,
             approved_documents = excluded.approved_documents,
             updated_at = excluded.updated_at",
    )
    .bind(grade_class_id)
    .bind(stats.total_students)
    .bind(stats.active_students)
    .bind(stats.male_students)
    .bind(stats.female_students)
    .bind(stats.average_performance)
    .bind(stats.average_attendance)
    .bind(stats.passing_rate)
    .bind(stats.total_fees.cents())
    .bind(stats.total_paid.cents())
    .bind(stats.pending_documents)
    .bind(stats.approved_documents)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Every active grade with its level title, for the education dashboard.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GradeWithLevel {
    pub id: i64,
    pub name: String,
    pub level_title: String,
}

pub async fn active_grades_with_level(
    conn: &mut SqliteConnection,
) -> Result<Vec<GradeWithLevel>, sqlx::Error> {
    sqlx::query_as::<_, GradeWithLevel>(
        "SELECT g.id, g.name, l.title AS level_title
         FROM grade_classes g JOIN education_levels l ON l.id = g.education_level_id
         WHERE g.is_active = 1 ORDER BY l.display_order, g.display_order",
    )
    .fetch_all(&mut *conn)
    .await
}
