//! # Payment Review
//!
//! Applies an administrator's verify or reject decision to a payment and
//! its linked fee statement. Run inside one transaction:
//!
//! 1. load the payment and, if linked, its statement
//! 2. apply [`klk_ledger::verify`] or [`klk_ledger::reject`]
//! 3. write the payment back only if its status is still the one loaded
//! 4. write the statement back
//! 5. append the audit entry, notify administrators, refresh stats
//!
//! Step 3 closes the double-verify window within one database: a second
//! reviewer racing on the same pending payment updates zero rows and gets a
//! 409. Once SQLite serializes the writers there is no remaining overlap.

use chrono::{DateTime, Utc};
use klk_core::{AuditAction, NotificationType, PaymentStatus};
use klk_ledger::{Review, StatementCredit};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use utoipa::ToSchema;

use crate::auth::Caller;
use crate::db::{audit, notifications, payments, statements};
use crate::error::AppError;
use crate::extractors::ClientMeta;
use crate::services::stats::{self, Refreshed};

/// What the reviewer decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Verified,
    Rejected,
}

/// Result of [`review_payment`].
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReviewReport {
    pub payment_id: i64,
    pub receipt_number: String,
    #[schema(value_type = String)]
    pub status: PaymentStatus,
    #[schema(value_type = Option<Object>)]
    pub statement: Option<StatementCredit>,
    /// Rejected after an earlier verification; the statement keeps the credit.
    pub credit_retained: bool,
    pub stats: Refreshed,
}

pub async fn review_payment(
    conn: &mut SqliteConnection,
    payment_id: i64,
    decision: Decision,
    reviewer: &Caller,
    notes: &str,
    client: &ClientMeta,
    now: DateTime<Utc>,
) -> Result<ReviewReport, AppError> {
    let record = payments::find(conn, payment_id)
        .await?
        .ok_or_else(|| AppError::not_found("Payment"))?;
    let loaded_status = record.status;
    let mut payment = record.to_ledger();

    let mut statement = match payment.fee_statement_id {
        Some(id) => Some(
            statements::find(conn, id)
                .await?
                .ok_or_else(|| AppError::not_found("Fee statement"))?
                .to_ledger(),
        ),
        None => None,
    };

    let review = Review {
        reviewer_id: reviewer.user_id,
        notes: notes.to_string(),
        at: now,
    };

    let (credit, credit_retained) = match decision {
        Decision::Verified => {
            let outcome = klk_ledger::verify(&mut payment, statement.as_mut(), review)?;
            (outcome.credit, false)
        }
        Decision::Rejected => {
            let outcome = klk_ledger::reject(&mut payment, review);
            (None, outcome.credit_retained)
        }
    };

    if !payments::record_review(conn, &payment, loaded_status).await? {
        tracing::warn!(payment_id, "payment status changed during review");
        return Err(AppError::Conflict(
            "Payment was reviewed by someone else; reload and try again".into(),
        ));
    }
    if credit.is_some() {
        if let Some(st) = &statement {
            statements::save(conn, st, now).await?;
        }
    }

    let (action, verb) = match decision {
        Decision::Verified => (AuditAction::Verify, "verified"),
        Decision::Rejected => (AuditAction::Reject, "rejected"),
    };
    audit::append(
        conn,
        audit::AuditEvent {
            user_id: Some(reviewer.user_id),
            action,
            model_name: "Payment",
            object_id: payment.id,
            description: format!(
                "Payment {} of KES {} {verb} by {}",
                payment.receipt_number,
                payment.amount,
                reviewer.full_name()
            ),
            client,
        },
        now,
    )
    .await?;

    let title = format!("Payment {verb}");
    let message = format!("Payment {} (KES {}) was {verb}.", payment.receipt_number, payment.amount);
    notifications::notify_admins(
        conn,
        &notifications::NewNotification {
            notification_type: NotificationType::Payment,
            title: &title,
            message: &message,
            related_object_id: Some(payment.id),
            related_object_type: Some("payment"),
        },
        now,
    )
    .await?;

    let stats = stats::refresh_for_user(conn, payment.user_id, now).await?;

    tracing::info!(
        payment_id,
        reviewer_id = reviewer.user_id,
        status = %payment.status,
        statement_id = ?credit.as_ref().map(|c| c.statement_id),
        credit_retained,
        "payment reviewed"
    );

    Ok(ReviewReport {
        payment_id: payment.id,
        receipt_number: payment.receipt_number,
        status: payment.status,
        statement: credit,
        credit_retained,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use crate::db::testing::seed_beneficiary;
    use chrono::NaiveDate;
    use klk_core::{FeeStatementStatus, Money, PaymentMethod, Role};
    use proptest::prelude::*;
    use sqlx::SqlitePool;

    fn admin() -> Caller {
        Caller {
            user_id: 1,
            username: "admin".into(),
            email: "admin@example.com".into(),
            first_name: "Grace".into(),
            last_name: "Wambui".into(),
            role: Role::Admin,
            is_staff: true,
            is_superuser: false,
        }
    }

    /// Beneficiary with a 1000 KES statement and pending payments of the
    /// given amounts linked to it.
    async fn fixture(pool: &SqlitePool, amounts: &[i64]) -> (i64, Vec<i64>) {
        let mut conn = pool.acquire().await.unwrap();
        // Reviewer row so audit and notification foreign keys resolve.
        let reviewer = seed_beneficiary(&mut conn, "admin@example.com").await;
        assert_eq!(reviewer, 1);
        let user = seed_beneficiary(&mut conn, "kid@example.com").await;
        let now = Utc::now();
        let statement = statements::insert(
            &mut conn,
            &statements::NewStatement {
                user_id: user,
                term: "Term 1",
                year: 2025,
                school: "Kenya High",
                total_amount: Money::from_shillings(1000),
                due_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                notes: None,
                file_path: None,
                original_name: None,
            },
            now,
        )
        .await
        .unwrap();
        let mut ids = Vec::new();
        for (i, amount) in amounts.iter().enumerate() {
            let receipt = klk_ledger::receipt_number(2025, i as u32 + 1);
            let id = payments::insert(
                &mut conn,
                &payments::NewPayment {
                    user_id: user,
                    fee_statement_id: Some(statement),
                    receipt_number: &receipt,
                    amount: Money::from_shillings(*amount),
                    payment_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
                    payment_method: PaymentMethod::BankTransfer,
                    reference_number: None,
                    description: None,
                    term: "Term 1",
                    year: 2025,
                    receipt_path: None,
                    original_name: None,
                },
                now,
            )
            .await
            .unwrap();
            ids.push(id);
        }
        (statement, ids)
    }

    async fn review(pool: &SqlitePool, id: i64, decision: Decision) -> Result<ReviewReport, AppError> {
        let mut tx = pool.begin().await.unwrap();
        let result = review_payment(
            &mut tx,
            id,
            decision,
            &admin(),
            "checked",
            &ClientMeta::default(),
            Utc::now(),
        )
        .await;
        if result.is_ok() {
            tx.commit().await.unwrap();
        }
        result
    }

    async fn statement_state(pool: &SqlitePool, id: i64) -> (Money, FeeStatementStatus) {
        let mut conn = pool.acquire().await.unwrap();
        let st = statements::find(&mut conn, id).await.unwrap().unwrap();
        (st.amount_paid, st.status)
    }

    #[tokio::test]
    async fn verified_payments_reaching_total_mark_paid() {
        let pool = init_memory_pool().await.unwrap();
        let (statement, ids) = fixture(&pool, &[400, 600]).await;

        let report = review(&pool, ids[0], Decision::Verified).await.unwrap();
        assert_eq!(report.statement.unwrap().status, FeeStatementStatus::Partial);
        assert_eq!(
            statement_state(&pool, statement).await,
            (Money::from_shillings(400), FeeStatementStatus::Partial)
        );

        review(&pool, ids[1], Decision::Verified).await.unwrap();
        assert_eq!(
            statement_state(&pool, statement).await,
            (Money::from_shillings(1000), FeeStatementStatus::Paid)
        );
    }

    #[tokio::test]
    async fn second_verification_conflicts_without_double_credit() {
        let pool = init_memory_pool().await.unwrap();
        let (statement, ids) = fixture(&pool, &[400]).await;
        review(&pool, ids[0], Decision::Verified).await.unwrap();
        let err = review(&pool, ids[0], Decision::Verified).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(statement_state(&pool, statement).await.0, Money::from_shillings(400));
    }

    #[tokio::test]
    async fn reject_leaves_statement_and_reports_retained_credit() {
        let pool = init_memory_pool().await.unwrap();
        let (statement, ids) = fixture(&pool, &[400, 300]).await;

        let report = review(&pool, ids[1], Decision::Rejected).await.unwrap();
        assert!(!report.credit_retained);
        assert_eq!(statement_state(&pool, statement).await.0, Money::ZERO);

        review(&pool, ids[0], Decision::Verified).await.unwrap();
        let report = review(&pool, ids[0], Decision::Rejected).await.unwrap();
        assert!(report.credit_retained);
        assert_eq!(report.status, PaymentStatus::Rejected);
        assert_eq!(statement_state(&pool, statement).await.0, Money::from_shillings(400));
    }

    #[tokio::test]
    async fn review_writes_audit_and_notification() {
        let pool = init_memory_pool().await.unwrap();
        let (_, ids) = fixture(&pool, &[400]).await;
        sqlx::query("UPDATE users SET is_staff = 1 WHERE id = 1")
            .execute(&pool)
            .await
            .unwrap();
        review(&pool, ids[0], Decision::Verified).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let chain = audit::verify_chain_integrity(&mut conn).await.unwrap();
        assert_eq!(chain.total_entries, 1);
        assert!(chain.chain_valid);
        assert_eq!(notifications::unread_count(&mut conn, 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_payment_is_not_found() {
        let pool = init_memory_pool().await.unwrap();
        let err = review(&pool, 99, Decision::Verified).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn stored_paid_total_tracks_successful_verifications(
            amounts in proptest::collection::vec(1i64..800, 1..5),
            decisions in proptest::collection::vec((0usize..5, any::<bool>()), 0..12),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let (paid, status, credited) = runtime.block_on(async {
                let pool = init_memory_pool().await.unwrap();
                let (statement, ids) = fixture(&pool, &amounts).await;
                let mut credited = 0i64;
                for (index, verify) in &decisions {
                    let slot = index % ids.len();
                    let decision = if *verify { Decision::Verified } else { Decision::Rejected };
                    let applied = review(&pool, ids[slot], decision).await.is_ok();
                    if applied && *verify {
                        credited += amounts[slot];
                    }
                }
                let (paid, status) = statement_state(&pool, statement).await;
                (paid, status, credited)
            });
            // Each payment can be credited once; a later rejection keeps it.
            prop_assert!(credited <= amounts.iter().sum::<i64>());
            prop_assert_eq!(paid, Money::from_shillings(credited));
            prop_assert_eq!(status == FeeStatementStatus::Paid, credited >= 1000);
        }
    }
}
