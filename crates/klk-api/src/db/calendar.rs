//! Calendar events and academic terms.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use klk_core::EventType;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
pub struct CalendarEvent {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    #[schema(value_type = String)]
    pub event_type: EventType,
    pub location: Option<String>,
    pub attendees: Option<i64>,
    pub is_active: bool,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create or partial-update body for an event.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct EventFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>)]
    pub event_type: Option<EventType>,
    pub location: Option<String>,
    pub attendees: Option<i64>,
    pub is_active: Option<bool>,
}

pub async fn insert_event(
    conn: &mut SqliteConnection,
    title: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    fields: &EventFields,
    created_by: i64,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO calendar_events (title, description, start_date, end_date, event_type,
             location, attendees, is_active, created_by, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, COALESCE(?, 1), ?, ?, ?)",
    )
    .bind(title)
    .bind(&fields.description)
    .bind(start)
    .bind(end)
    .bind(fields.event_type.unwrap_or(EventType::Academic).as_str())
    .bind(&fields.location)
    .bind(fields.attendees)
    .bind(fields.is_active)
    .bind(created_by)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn find_event(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<CalendarEvent>, sqlx::Error> {
    sqlx::query_as::<_, CalendarEvent>("SELECT * FROM calendar_events WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn update_event(
    conn: &mut SqliteConnection,
    id: i64,
    fields: &EventFields,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE calendar_events SET
             title = COALESCE(?, title),
             description = COALESCE(?, description),
             start_date = COALESCE(?, start_date),
             end_date = COALESCE(?, end_date),
             event_type = COALESCE(?, event_type),
             location = COALESCE(?, location),
             attendees = COALESCE(?, attendees),
             is_active = COALESCE(?, is_active),
             updated_at = ?
         WHERE id = ?",
    )
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(fields.start_date)
    .bind(fields.end_date)
    .bind(fields.event_type.map(|t| t.as_str()))
    .bind(&fields.location)
    .bind(fields.attendees)
    .bind(fields.is_active)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Event list filters. `month` is the first day of the month to show.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub month: Option<NaiveDate>,
    pub event_type: Option<EventType>,
    pub is_active: Option<bool>,
}

/// First day of the month after `month_start`.
pub fn next_month(month_start: NaiveDate) -> NaiveDate {
    let (year, month) = if month_start.month() == 12 {
        (month_start.year() + 1, 1)
    } else {
        (month_start.year(), month_start.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(month_start)
}

fn month_bounds(month: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = month.and_time(chrono::NaiveTime::MIN).and_utc();
    let end = next_month(month).and_time(chrono::NaiveTime::MIN).and_utc();
    (start, end)
}

pub async fn list_events(
    conn: &mut SqliteConnection,
    filter: &EventFilter,
) -> Result<Vec<CalendarEvent>, sqlx::Error> {
    let (from, until) = match filter.month {
        Some(month) => {
            let (a, b) = month_bounds(month);
            (Some(a), Some(b))
        }
        None => (None, None),
    };
    sqlx::query_as::<_, CalendarEvent>(
        "SELECT * FROM calendar_events
         WHERE (? IS NULL OR start_date >= ?) AND (? IS NULL OR start_date < ?)
           AND (? IS NULL OR event_type = ?) AND (? IS NULL OR is_active = ?)
         ORDER BY start_date, id",
    )
    .bind(from)
    .bind(from)
    .bind(until)
    .bind(until)
    .bind(filter.event_type.map(|t| t.as_str()))
    .bind(filter.event_type.map(|t| t.as_str()))
    .bind(filter.is_active)
    .bind(filter.is_active)
    .fetch_all(&mut *conn)
    .await
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow, ToSchema)]
pub struct CalendarStats {
    pub total_events: i64,
    pub upcoming_events: i64,
    pub exams_this_month: i64,
    pub meetings_this_month: i64,
    pub holidays_this_month: i64,
}

pub async fn stats(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> Result<CalendarStats, sqlx::Error> {
    let month_start = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .unwrap_or_else(|| now.date_naive());
    let (from, until) = month_bounds(month_start);
    sqlx::query_as::<_, CalendarStats>(
        "SELECT COUNT(*) AS total_events,
                COALESCE(SUM(is_active = 1 AND start_date >= ?), 0) AS upcoming_events,
                COALESCE(SUM(is_active = 1 AND event_type = 'exam'
                    AND start_date >= ? AND start_date < ?), 0) AS exams_this_month,
                COALESCE(SUM(is_active = 1 AND event_type = 'meeting'
                    AND start_date >= ? AND start_date < ?), 0) AS meetings_this_month,
                COALESCE(SUM(is_active = 1 AND event_type = 'holiday'
                    AND start_date >= ? AND start_date < ?), 0) AS holidays_this_month
         FROM calendar_events",
    )
    .bind(now)
    .bind(from)
    .bind(until)
    .bind(from)
    .bind(until)
    .bind(from)
    .bind(until)
    .fetch_one(&mut *conn)
    .await
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AcademicTerm {
    pub id: i64,
    pub term_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AcademicTerm {
    /// Whole weeks spanned, counting a partial last week.
    pub fn total_weeks(&self) -> i64 {
        (self.end_date - self.start_date).num_days() / 7 + 1
    }

    /// 1-based week number, only for the active term while it is running.
    pub fn current_week(&self, today: NaiveDate) -> Option<i64> {
        if self.is_active && self.start_date <= today && today <= self.end_date {
            Some((today - self.start_date).num_days() / 7 + 1)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TermFields {
    pub term_name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_active: Option<bool>,
}

pub async fn list_terms(conn: &mut SqliteConnection) -> Result<Vec<AcademicTerm>, sqlx::Error> {
    sqlx::query_as::<_, AcademicTerm>("SELECT * FROM academic_terms ORDER BY start_date DESC, id")
        .fetch_all(&mut *conn)
        .await
}

pub async fn find_term(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<AcademicTerm>, sqlx::Error> {
    sqlx::query_as::<_, AcademicTerm>("SELECT * FROM academic_terms WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn insert_term(
    conn: &mut SqliteConnection,
    term_name: &str,
    start: NaiveDate,
    end: NaiveDate,
    is_active: bool,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO academic_terms (term_name, start_date, end_date, is_active, created_at,
             updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(term_name)
    .bind(start)
    .bind(end)
    .bind(is_active)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn update_term(
    conn: &mut SqliteConnection,
    id: i64,
    fields: &TermFields,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE academic_terms SET
             term_name = COALESCE(?, term_name),
             start_date = COALESCE(?, start_date),
             end_date = COALESCE(?, end_date),
             is_active = COALESCE(?, is_active),
             updated_at = ?
         WHERE id = ?",
    )
    .bind(&fields.term_name)
    .bind(fields.start_date)
    .bind(fields.end_date)
    .bind(fields.is_active)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Deactivate every term except `keep`.
pub async fn deactivate_others(
    conn: &mut SqliteConnection,
    keep: i64,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE academic_terms SET is_active = 0, updated_at = ? WHERE id != ? AND is_active = 1",
    )
    .bind(now)
    .bind(keep)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn term(start: NaiveDate, end: NaiveDate, active: bool) -> AcademicTerm {
        AcademicTerm {
            id: 1,
            term_name: "Term 1".into(),
            start_date: start,
            end_date: end,
            is_active: active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn week_arithmetic() {
        let t = term(d(2025, 1, 6), d(2025, 4, 4), true);
        assert_eq!(t.total_weeks(), 13);
        assert_eq!(t.current_week(d(2025, 1, 6)), Some(1));
        assert_eq!(t.current_week(d(2025, 1, 13)), Some(2));
        assert_eq!(t.current_week(d(2025, 4, 5)), None);
        assert_eq!(term(d(2025, 1, 6), d(2025, 4, 4), false).current_week(d(2025, 2, 1)), None);
    }

    #[test]
    fn december_rolls_over() {
        assert_eq!(next_month(d(2025, 12, 1)), d(2026, 1, 1));
        assert_eq!(next_month(d(2025, 2, 1)), d(2025, 3, 1));
    }

    #[tokio::test]
    async fn month_filter_and_stats() {
        let pool = init_memory_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let now = Utc::now();
        let admin = crate::db::testing::seed_user(&mut conn, "cal@example.com").await;
        let in_month = |day: u32| {
            NaiveDate::from_ymd_opt(now.year(), now.month(), day)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap()
                .and_utc()
        };
        let exam = EventFields {
            event_type: Some(EventType::Exam),
            ..Default::default()
        };
        insert_event(&mut conn, "Mocks", in_month(1), in_month(2), &exam, admin, now)
            .await
            .unwrap();
        let later = now + chrono::Duration::days(400);
        insert_event(&mut conn, "Prize day", later, later, &EventFields::default(), admin, now)
            .await
            .unwrap();

        let filter = EventFilter {
            month: NaiveDate::from_ymd_opt(now.year(), now.month(), 1),
            ..Default::default()
        };
        let events = list_events(&mut conn, &filter).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Mocks");

        let s = stats(&mut conn, now).await.unwrap();
        assert_eq!(s.total_events, 2);
        assert_eq!(s.exams_this_month, 1);
        assert!(s.upcoming_events >= 1);
    }

    #[tokio::test]
    async fn only_one_active_term() {
        let pool = init_memory_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let now = Utc::now();
        let a = insert_term(&mut conn, "Term 1", d(2025, 1, 6), d(2025, 4, 4), true, now)
            .await
            .unwrap();
        let b = insert_term(&mut conn, "Term 2", d(2025, 5, 5), d(2025, 8, 1), true, now)
            .await
            .unwrap();
        assert_eq!(deactivate_others(&mut conn, b, now).await.unwrap(), 1);
        assert!(!find_term(&mut conn, a).await.unwrap().unwrap().is_active);
        assert!(find_term(&mut conn, b).await.unwrap().unwrap().is_active);
    }
}
