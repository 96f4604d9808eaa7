//! Payment receipts.
//!
//! Review writes go through [`record_review`], which only succeeds when the
//! row still holds the status the caller loaded. Two concurrent verifications
//! of the same pending payment therefore cannot both credit the statement:
//! the second sees zero rows affected and its transaction is rolled back.

use chrono::{DateTime, NaiveDate, Utc};
use klk_core::{Money, PaymentMethod, PaymentStatus};
use klk_ledger::Payment;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use utoipa::ToSchema;

use super::profiles::Scope;
use crate::extractors::Pagination;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
pub struct PaymentRecord {
    pub id: i64,
    pub user_id: i64,
    pub fee_statement_id: Option<i64>,
    pub receipt_number: String,
    #[sqlx(try_from = "i64")]
    #[schema(value_type = String, example = "5000.00")]
    pub amount: Money,
    pub payment_date: NaiveDate,
    #[sqlx(try_from = "String")]
    #[schema(value_type = String)]
    pub payment_method: PaymentMethod,
    pub reference_number: Option<String>,
    pub description: Option<String>,
    pub term: String,
    pub year: i32,
    #[sqlx(try_from = "String")]
    #[schema(value_type = String)]
    pub status: PaymentStatus,
    #[serde(skip)]
    pub receipt_path: Option<String>,
    pub original_name: Option<String>,
    pub verified_by: Option<i64>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verification_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn to_ledger(&self) -> Payment {
        Payment {
            id: self.id,
            user_id: self.user_id,
            fee_statement_id: self.fee_statement_id,
            receipt_number: self.receipt_number.clone(),
            amount: self.amount,
            payment_date: self.payment_date,
            payment_method: self.payment_method,
            status: self.status,
            verified_by: self.verified_by,
            verified_at: self.verified_at,
            verification_notes: self.verification_notes.clone(),
        }
    }
}

#[derive(Clone, Copy)]
pub struct NewPayment<'a> {
    pub user_id: i64,
    pub fee_statement_id: Option<i64>,
    pub receipt_number: &'a str,
    pub amount: Money,
    pub payment_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub reference_number: Option<&'a str>,
    pub description: Option<&'a str>,
    pub term: &'a str,
    pub year: i32,
    pub receipt_path: Option<&'a str>,
    pub original_name: Option<&'a str>,
}

pub async fn insert(
    conn: &mut SqliteConnection,
    new: &NewPayment<'_>,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO payments (user_id, fee_statement_id, receipt_number, amount, payment_date,
             payment_method, reference_number, description, term, year, status, receipt_path,
             original_name, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?)",
    )
    .bind(new.user_id)
    .bind(new.fee_statement_id)
    .bind(new.receipt_number)
    .bind(new.amount.cents())
    .bind(new.payment_date)
    .bind(new.payment_method.as_str())
    .bind(new.reference_number)
    .bind(new.description)
    .bind(new.term)
    .bind(new.year)
    .bind(new.receipt_path)
    .bind(new.original_name)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn find(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<PaymentRecord>, sqlx::Error> {
    sqlx::query_as::<_, PaymentRecord>("SELECT * FROM payments WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

/// Receipt numbers already issued for `year`, used to pick the next sequence.
pub async fn receipt_numbers_for_year(
    conn: &mut SqliteConnection,
    year: i32,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT receipt_number FROM payments WHERE receipt_number LIKE ?")
        .bind(format!("RCP-{year}-%"))
        .fetch_all(&mut *conn)
        .await
}

/// Persist a review if the row is still in `expected` status. Returns false
/// when another writer changed the status first.
pub async fn record_review(
    conn: &mut SqliteConnection,
    payment: &Payment,
    expected: PaymentStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE payments SET status = ?, verified_by = ?, verified_at = ?,
             verification_notes = ?
         WHERE id = ? AND status = ?",
    )
    .bind(payment.status.as_str())
    .bind(payment.verified_by)
    .bind(payment.verified_at)
    .bind(&payment.verification_notes)
    .bind(payment.id)
    .bind(expected.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Point an unlinked payment at a statement.
pub async fn link_statement(
    conn: &mut SqliteConnection,
    id: i64,
    fee_statement_id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE payments SET fee_statement_id = ? WHERE id = ? AND fee_statement_id IS NULL",
    )
    .bind(fee_statement_id)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub user_id: Option<i64>,
    pub year: Option<i32>,
    pub status: Option<PaymentStatus>,
    pub method: Option<PaymentMethod>,
}

impl PaymentFilter {
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
        if let Some(method) = self.method {
            qb.push(" AND payment_method = ").push_bind(method.as_str());
        }
    }
}

pub async fn list(
    conn: &mut SqliteConnection,
    filter: &PaymentFilter,
    page: &Pagination,
) -> Result<(Vec<PaymentRecord>, i64), sqlx::Error> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM payments");
    filter.push_where(&mut count);
    let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM payments");
    filter.push_where(&mut qb);
    qb.push(" ORDER BY payment_date DESC, id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let rows = qb
        .build_query_as::<PaymentRecord>()
        .fetch_all(&mut *conn)
        .await?;
    Ok((rows, total))
}

pub async fn for_user(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<Vec<PaymentRecord>, sqlx::Error> {
    sqlx::query_as::<_, PaymentRecord>(
        "SELECT * FROM payments WHERE user_id = ? ORDER BY payment_date DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct PaymentSummary {
    pub count: i64,
    #[schema(value_type = String)]
    pub total_submitted: Money,
    #[schema(value_type = String)]
    pub total_verified: Money,
    pub verified_count: i64,
    pub pending_count: i64,
    pub rejected_count: i64,
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    count: i64,
    total_submitted: i64,
    total_verified: i64,
    verified_count: i64,
    pending_count: i64,
    rejected_count: i64,
}

pub async fn summary(
    conn: &mut SqliteConnection,
    user_id: Option<i64>,
    year: Option<i32>,
) -> Result<PaymentSummary, sqlx::Error> {
    let row = sqlx::query_as::<_, SummaryRow>(
        "SELECT COUNT(*) AS count,
                COALESCE(SUM(amount), 0) AS total_submitted,
                COALESCE(SUM(CASE WHEN status = 'verified' THEN amount ELSE 0 END), 0)
                    AS total_verified,
                COALESCE(SUM(status = 'verified'), 0) AS verified_count,
                COALESCE(SUM(status = 'pending'), 0) AS pending_count,
                COALESCE(SUM(status = 'rejected'), 0) AS rejected_count
         FROM payments
         WHERE (? IS NULL OR user_id = ?) AND (? IS NULL OR year = ?)",
    )
    .bind(user_id)
    .bind(user_id)
    .bind(year)
    .bind(year)
    .fetch_one(&mut *conn)
    .await?;
    Ok(PaymentSummary {
        count: row.count,
        total_submitted: Money::from_cents(row.total_submitted),
        total_verified: Money::from_cents(row.total_verified),
        verified_count: row.verified_count,
        pending_count: row.pending_count,
        rejected_count: row.rejected_count,
    })
}

/// Amounts of verified payments made by beneficiaries in `scope`.
pub async fn verified_amounts(
    conn: &mut SqliteConnection,
    scope: Scope,
) -> Result<Vec<Money>, sqlx::Error> {
    let rows: Vec<i64> = sqlx::query_scalar(&format!(
        "SELECT pay.amount FROM payments pay JOIN profiles p ON p.user_id = pay.user_id
         WHERE pay.status = 'verified' AND {}",
        scope.condition()
    ))
    .bind(scope.bind_value())
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(Money::from_cents).collect())
}

/// Sum of verified payments with a payment date on or after `since`.
pub async fn verified_total_since(
    conn: &mut SqliteConnection,
    since: Option<NaiveDate>,
) -> Result<Money, sqlx::Error> {
    let cents: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM payments
         WHERE status = 'verified' AND (? IS NULL OR payment_date >= ?)",
    )
    .bind(since)
    .bind(since)
    .fetch_one(&mut *conn)
    .await?;
    Ok(Money::from_cents(cents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use crate::db::testing::seed_user;
    use klk_ledger::{receipt_number, Review};

    fn new_payment(user_id: i64, receipt: &str) -> NewPayment<'_> {
        NewPayment {
            user_id,
            fee_statement_id: None,
            receipt_number: receipt,
            amount: Money::from_shillings(400),
            payment_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            payment_method: PaymentMethod::Mpesa,
            reference_number: Some("QK12ABC"),
            description: None,
            term: "Term 1",
            year: 2025,
            receipt_path: None,
            original_name: None,
        }
    }

    #[tokio::test]
    async fn review_only_applies_from_expected_status() {
        let pool = init_memory_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let user = seed_user(&mut conn, "p@example.com").await;
        let receipt = receipt_number(2025, 1);
        let id = insert(&mut conn, &new_payment(user, &receipt), Utc::now())
            .await
            .unwrap();

        let mut payment = find(&mut conn, id).await.unwrap().unwrap().to_ledger();
        let review = Review {
            reviewer_id: user,
            notes: "ok".into(),
            at: Utc::now(),
        };
        klk_ledger::verify(&mut payment, None, review).unwrap();
        assert!(record_review(&mut conn, &payment, PaymentStatus::Pending)
            .await
            .unwrap());
        // A racing second writer that also loaded `pending` loses.
        assert!(!record_review(&mut conn, &payment, PaymentStatus::Pending)
            .await
            .unwrap());

        let s = summary(&mut conn, Some(user), None).await.unwrap();
        assert_eq!(s.verified_count, 1);
        assert_eq!(s.total_verified, Money::from_shillings(400));
        assert_eq!(
            receipt_numbers_for_year(&mut conn, 2025).await.unwrap(),
            vec![receipt]
        );
    }

    #[tokio::test]
    async fn receipt_numbers_are_unique() {
        let pool = init_memory_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let user = seed_user(&mut conn, "p@example.com").await;
        insert(&mut conn, &new_payment(user, "RCP-2025-0001"), Utc::now())
            .await
            .unwrap();
        let err = insert(&mut conn, &new_payment(user, "RCP-2025-0001"), Utc::now())
            .await
            .unwrap_err();
        assert!(crate::db::is_unique_violation(&err));
    }
}
