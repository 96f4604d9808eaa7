//! Subject marks and term summaries.

use chrono::{DateTime, Utc};
use klk_core::AcademicPeriod;
use klk_stats::SummaryPoint;
use serde::Serialize;
use sqlx::SqliteConnection;
use utoipa::ToSchema;

use super::profiles::Scope;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
pub struct AcademicRecord {
    pub id: i64,
    pub user_id: i64,
    pub subject: String,
    pub term: String,
    pub year: i32,
    pub marks: f64,
    pub grade: String,
    pub points: i64,
    pub teacher_comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
pub struct AcademicSummary {
    pub id: i64,
    pub user_id: i64,
    pub term: String,
    pub year: i32,
    pub average_score: f64,
    pub total_points: Option<i64>,
    pub mean_grade: String,
    pub class_position: Option<i64>,
    pub class_size: Option<i64>,
    pub attendance_percentage: Option<f64>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AcademicSummary {
    pub fn period(&self) -> AcademicPeriod {
        AcademicPeriod::new(self.year, self.term.clone())
    }
}

pub struct NewRecord<'a> {
    pub user_id: i64,
    pub subject: &'a str,
    pub term: &'a str,
    pub year: i32,
    pub marks: f64,
    pub grade: &'a str,
    pub points: i64,
    pub teacher_comment: Option<&'a str>,
}

/// Insert or replace the marks for one subject and term.
pub async fn upsert_record(
    conn: &mut SqliteConnection,
    new: &NewRecord<'_>,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "INSERT INTO academic_records (user_id, subject, term, year, marks, grade, points,
             teacher_comment, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (user_id, subject, term, year) DO UPDATE SET
             marks = excluded.marks,
             grade = excluded.grade,
             points = excluded.points,
             teacher_comment = excluded.teacher_comment
         RETURNING id",
    )
    .bind(new.user_id)
    .bind(new.subject)
    .bind(new.term)
    .bind(new.year)
    .bind(new.marks)
    .bind(new.grade)
    .bind(new.points)
    .bind(new.teacher_comment)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
}

pub struct NewSummary<'a> {
    pub user_id: i64,
    pub term: &'a str,
    pub year: i32,
    pub average_score: f64,
    pub total_points: Option<i64>,
    pub mean_grade: &'a str,
    pub class_position: Option<i64>,
    pub class_size: Option<i64>,
    pub attendance_percentage: Option<f64>,
    pub remarks: Option<&'a str>,
}

/// Insert or replace the summary for one term.
pub async fn upsert_summary(
    conn: &mut SqliteConnection,
    new: &NewSummary<'_>,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "INSERT INTO academic_summaries (user_id, term, year, average_score, total_points,
             mean_grade, class_position, class_size, attendance_percentage, remarks, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (user_id, term, year) DO UPDATE SET
             average_score = excluded.average_score,
             total_points = excluded.total_points,
             mean_grade = excluded.mean_grade,
             class_position = excluded.class_position,
             class_size = excluded.class_size,
             attendance_percentage = excluded.attendance_percentage,
             remarks = excluded.remarks
         RETURNING id",
    )
    .bind(new.user_id)
    .bind(new.term)
    .bind(new.year)
    .bind(new.average_score)
    .bind(new.total_points)
    .bind(new.mean_grade)
    .bind(new.class_position)
    .bind(new.class_size)
    .bind(new.attendance_percentage)
    .bind(new.remarks)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
}

/// All of a user's summaries, most recent period first.
pub async fn summaries_for_user(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<Vec<AcademicSummary>, sqlx::Error> {
    let mut rows = sqlx::query_as::<_, AcademicSummary>(
        "SELECT * FROM academic_summaries WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;
    // Term labels are free text; order by parsed period rather than in SQL.
    rows.sort_by(|a, b| b.period().cmp(&a.period()));
    Ok(rows)
}

pub async fn records_for_term(
    conn: &mut SqliteConnection,
    user_id: i64,
    term: &str,
    year: i32,
) -> Result<Vec<AcademicRecord>, sqlx::Error> {
    sqlx::query_as::<_, AcademicRecord>(
        "SELECT * FROM academic_records WHERE user_id = ? AND term = ? AND year = ?
         ORDER BY subject",
    )
    .bind(user_id)
    .bind(term)
    .bind(year)
    .fetch_all(&mut *conn)
    .await
}

/// One subject's history, most recent period first.
pub async fn subject_history(
    conn: &mut SqliteConnection,
    user_id: i64,
    subject: &str,
) -> Result<Vec<AcademicRecord>, sqlx::Error> {
    let mut rows = sqlx::query_as::<_, AcademicRecord>(
        "SELECT * FROM academic_records WHERE user_id = ? AND subject = ?",
    )
    .bind(user_id)
    .bind(subject)
    .fetch_all(&mut *conn)
    .await?;
    rows.sort_by(|a, b| {
        AcademicPeriod::new(b.year, b.term.clone()).cmp(&AcademicPeriod::new(a.year, a.term.clone()))
    });
    Ok(rows)
}

/// Summary rows of every beneficiary in `scope`.
pub async fn summary_points(
    conn: &mut SqliteConnection,
    scope: Scope,
) -> Result<Vec<SummaryPoint>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (i64, String, i32, f64, Option<f64>)>(&format!(
        "SELECT s.user_id, s.term, s.year, s.average_score, s.attendance_percentage
         FROM academic_summaries s JOIN profiles p ON p.user_id = s.user_id WHERE {}",
        scope.condition()
    ))
    .bind(scope.bind_value())
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(user_id, term, year, average_score, attendance)| SummaryPoint {
            user_id,
            period: AcademicPeriod::new(year, term),
            average_score,
            attendance_percentage: attendance,
        })
        .collect())
}
