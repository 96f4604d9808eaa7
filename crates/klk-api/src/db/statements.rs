//! Fee statements. The balance and status rules live in `klk_ledger`; this
//! module loads and stores them.

use chrono::{DateTime, NaiveDate, Utc};
use klk_core::{FeeStatementStatus, Money};
use klk_ledger::FeeStatement;
use klk_stats::StatementTotals;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use utoipa::ToSchema;

use super::profiles::Scope;
use crate::extractors::Pagination;

/// A stored fee statement with its upload metadata.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
pub struct StatementRecord {
    pub id: i64,
    pub user_id: i64,
    pub term: String,
    pub year: i32,
    pub school: String,
    #[sqlx(try_from = "i64")]
    #[schema(value_type = String, example = "25000.00")]
    pub total_amount: Money,
    #[sqlx(try_from = "i64")]
    #[schema(value_type = String)]
    pub amount_paid: Money,
    pub due_date: NaiveDate,
    #[sqlx(try_from = "String")]
    #[schema(value_type = String)]
    pub status: FeeStatementStatus,
    pub notes: Option<String>,
    #[serde(skip)]
    pub file_path: Option<String>,
    pub original_name: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StatementRecord {
    pub fn to_ledger(&self) -> FeeStatement {
        FeeStatement {
            id: self.id,
            user_id: self.user_id,
            term: self.term.clone(),
            year: self.year,
            school: self.school.clone(),
            total_amount: self.total_amount,
            amount_paid: self.amount_paid,
            due_date: self.due_date,
            status: self.status,
            notes: self.notes.clone(),
        }
    }
}

pub struct NewStatement<'a> {
    pub user_id: i64,
    pub term: &'a str,
    pub year: i32,
    pub school: &'a str,
    pub total_amount: Money,
    pub due_date: NaiveDate,
    pub notes: Option<&'a str>,
    pub file_path: Option<&'a str>,
    pub original_name: Option<&'a str>,
}

pub async fn insert(
    conn: &mut SqliteConnection,
    new: &NewStatement<'_>,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO fee_statements (user_id, term, year, school, total_amount, amount_paid,
             due_date, status, notes, file_path, original_name, uploaded_at, updated_at)
         VALUES (?, ?, ?, ?, ?, 0, ?, 'pending', ?, ?, ?, ?, ?)",
    )
    .bind(new.user_id)
    .bind(new.term)
    .bind(new.year)
    .bind(new.school)
    .bind(new.total_amount.cents())
    .bind(new.due_date)
    .bind(new.notes)
    .bind(new.file_path)
    .bind(new.original_name)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn find(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<StatementRecord>, sqlx::Error> {
    sqlx::query_as::<_, StatementRecord>("SELECT * FROM fee_statements WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

/// Write back the mutable fields of a ledger statement.
pub async fn save(
    conn: &mut SqliteConnection,
    statement: &FeeStatement,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE fee_statements SET total_amount = ?, amount_paid = ?, due_date = ?, status = ?,
             notes = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(statement.total_amount.cents())
    .bind(statement.amount_paid.cents())
    .bind(statement.due_date)
    .bind(statement.status.as_str())
    .bind(&statement.notes)
    .bind(now)
    .bind(statement.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn set_school(
    conn: &mut SqliteConnection,
    id: i64,
    school: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE fee_statements SET school = ? WHERE id = ?")
        .bind(school)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// List filters. `user_id: None` covers every beneficiary.
#[derive(Debug, Clone, Default)]
pub struct StatementFilter {
    pub user_id: Option<i64>,
    pub year: Option<i32>,
    pub status: Option<FeeStatementStatus>,
}

impl StatementFilter {
    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        if let Some(user_id) = self.user_id {
            qb.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(year) = self.year {
            qb.push(" AND year = ").push_bind(year);
        }
        if let Some(status) = self.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
    }
}

pub async fn list(
    conn: &mut SqliteConnection,
    filter: &StatementFilter,
    page: &Pagination,
) -> Result<(Vec<StatementRecord>, i64), sqlx::Error> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM fee_statements");
    filter.push_where(&mut count);
    let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM fee_statements");
    filter.push_where(&mut qb);
    qb.push(" ORDER BY year DESC, term DESC, id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let rows = qb
        .build_query_as::<StatementRecord>()
        .fetch_all(&mut *conn)
        .await?;
    Ok((rows, total))
}

pub async fn for_user(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<Vec<StatementRecord>, sqlx::Error> {
    sqlx::query_as::<_, StatementRecord>(
        "SELECT * FROM fee_statements WHERE user_id = ? ORDER BY year DESC, term DESC",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
}

/// Totals over a set of statements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct StatementSummary {
    pub count: i64,
    #[schema(value_type = String)]
    pub total_fees: Money,
    #[schema(value_type = String)]
    pub total_paid: Money,
    #[schema(value_type = String)]
    pub total_balance: Money,
    pub paid_count: i64,
    pub outstanding_count: i64,
    pub overdue_count: i64,
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    count: i64,
    total_fees: i64,
    total_paid: i64,
    paid_count: i64,
    outstanding_count: i64,
    overdue_count: i64,
}

pub async fn summary(
    conn: &mut SqliteConnection,
    user_id: Option<i64>,
    year: Option<i32>,
) -> Result<StatementSummary, sqlx::Error> {
    let row = sqlx::query_as::<_, SummaryRow>(
        "SELECT COUNT(*) AS count,
                COALESCE(SUM(total_amount), 0) AS total_fees,
                COALESCE(SUM(amount_paid), 0) AS total_paid,
                COALESCE(SUM(status = 'paid'), 0) AS paid_count,
                COALESCE(SUM(status IN ('pending', 'partial', 'unpaid', 'overdue')), 0)
                    AS outstanding_count,
                COALESCE(SUM(status = 'overdue'), 0) AS overdue_count
         FROM fee_statements
         WHERE (? IS NULL OR user_id = ?) AND (? IS NULL OR year = ?)",
    )
    .bind(user_id)
    .bind(user_id)
    .bind(year)
    .bind(year)
    .fetch_one(&mut *conn)
    .await?;
    let total_fees = Money::from_cents(row.total_fees);
    let total_paid = Money::from_cents(row.total_paid);
    Ok(StatementSummary {
        count: row.count,
        total_fees,
        total_paid,
        total_balance: total_fees - total_paid,
        paid_count: row.paid_count,
        outstanding_count: row.outstanding_count,
        overdue_count: row.overdue_count,
    })
}

/// Distinct statement years, newest first.
pub async fn years(
    conn: &mut SqliteConnection,
    user_id: Option<i64>,
) -> Result<Vec<i32>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT DISTINCT year FROM fee_statements WHERE (? IS NULL OR user_id = ?)
         ORDER BY year DESC",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
}

pub async fn totals(
    conn: &mut SqliteConnection,
    scope: Scope,
) -> Result<Vec<StatementTotals>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (i64, i64)>(&format!(
        "SELECT s.total_amount, s.amount_paid
         FROM fee_statements s JOIN profiles p ON p.user_id = s.user_id WHERE {}",
        scope.condition()
    ))
    .bind(scope.bind_value())
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(total, paid)| StatementTotals {
            total_amount: Money::from_cents(total),
            amount_paid: Money::from_cents(paid),
        })
        .collect())
}

/// An outstanding statement due soon, for the admin dashboard.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct DueSoon {
    pub id: i64,
    pub user_id: i64,
    pub student_name: String,
    pub term: String,
    pub year: i32,
    #[sqlx(try_from = "i64")]
    #[schema(value_type = String)]
    pub balance: Money,
    pub due_date: NaiveDate,
}

pub async fn upcoming_due(
    conn: &mut SqliteConnection,
    from: NaiveDate,
    until: NaiveDate,
    limit: i64,
) -> Result<Vec<DueSoon>, sqlx::Error> {
    sqlx::query_as::<_, DueSoon>(
        "SELECT s.id, s.user_id, TRIM(u.first_name || ' ' || u.last_name) AS student_name,
                s.term, s.year, s.total_amount - s.amount_paid AS balance, s.due_date
         FROM fee_statements s JOIN users u ON u.id = s.user_id
         WHERE s.status != 'paid' AND s.due_date >= ? AND s.due_date <= ?
         ORDER BY s.due_date LIMIT ?",
    )
    .bind(from)
    .bind(until)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use crate::db::testing::seed_user;

    fn new_statement(user_id: i64, term: &str, year: i32) -> NewStatement<'_> {
        NewStatement {
            user_id,
            term,
            year,
            school: "Alliance High",
            total_amount: Money::from_shillings(1000),
            due_date: NaiveDate::from_ymd_opt(year, 3, 1).unwrap(),
            notes: None,
            file_path: None,
            original_name: None,
        }
    }

    #[tokio::test]
    async fn duplicate_term_is_a_unique_violation() {
        let pool = init_memory_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let user = seed_user(&mut conn, "a@example.com").await;
        insert(&mut conn, &new_statement(user, "Term 1", 2025), Utc::now())
            .await
            .unwrap();
        let err = insert(&mut conn, &new_statement(user, "Term 1", 2025), Utc::now())
            .await
            .unwrap_err();
        assert!(crate::db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn ledger_round_trip_and_summary() {
        let pool = init_memory_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let user = seed_user(&mut conn, "a@example.com").await;
        let id = insert(&mut conn, &new_statement(user, "Term 1", 2025), Utc::now())
            .await
            .unwrap();
        insert(&mut conn, &new_statement(user, "Term 3", 2024), Utc::now())
            .await
            .unwrap();

        let mut st = find(&mut conn, id).await.unwrap().unwrap().to_ledger();
        st.add_payment(Money::from_shillings(400)).unwrap();
        save(&mut conn, &st, Utc::now()).await.unwrap();

        let stored = find(&mut conn, id).await.unwrap().unwrap();
        assert_eq!(stored.amount_paid, Money::from_shillings(400));
        assert_eq!(stored.status, FeeStatementStatus::Partial);

        let s = summary(&mut conn, Some(user), Some(2025)).await.unwrap();
        assert_eq!(s.count, 1);
        assert_eq!(s.total_balance, Money::from_shillings(600));
        assert_eq!(years(&mut conn, Some(user)).await.unwrap(), vec![2025, 2024]);

        let filter = StatementFilter {
            user_id: Some(user),
            status: Some(FeeStatementStatus::Partial),
            ..Default::default()
        };
        let page = Pagination { page: None, page_size: None };
        let (rows, total) = list(&mut conn, &filter, &page).await.unwrap();
        assert_eq!((rows.len(), total), (1, 1));
    }
}
