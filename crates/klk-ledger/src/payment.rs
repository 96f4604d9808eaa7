//! Payment verification, rejection and statement linking.

use chrono::{DateTime, NaiveDate, Utc};
use klk_core::{FeeStatementStatus, Money, PaymentMethod, PaymentStatus};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::statement::FeeStatement;

/// A submitted payment receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub user_id: i64,
    pub fee_statement_id: Option<i64>,
    pub receipt_number: String,
    pub amount: Money,
    pub payment_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub verified_by: Option<i64>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verification_notes: Option<String>,
}

/// Who reviewed a payment, when, and why.
#[derive(Debug, Clone)]
pub struct Review {
    pub reviewer_id: i64,
    pub notes: String,
    pub at: DateTime<Utc>,
}

/// The change applied to a statement by a verification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementCredit {
    pub statement_id: i64,
    pub previous_paid: Money,
    pub amount_paid: Money,
    pub status: FeeStatementStatus,
}

/// Result of [`verify`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyOutcome {
    pub payment_id: i64,
    pub credit: Option<StatementCredit>,
}

/// Result of [`reject`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectOutcome {
    pub payment_id: i64,
    pub previous_status: PaymentStatus,
    /// True when the payment had already been verified against a statement.
    /// The statement keeps that credit; nothing is reversed.
    pub credit_retained: bool,
}

/// Verify a pending payment and, when it is linked, credit its statement.
///
/// The caller must pass the linked statement whenever `fee_statement_id`
/// is set. On error neither record has been modified.
pub fn verify(
    payment: &mut Payment,
    statement: Option<&mut FeeStatement>,
    review: Review,
) -> Result<VerifyOutcome, LedgerError> {
    if payment.status != PaymentStatus::Pending {
        return Err(LedgerError::NotPending {
            payment_id: payment.id,
            status: payment.status,
        });
    }

    let credit = match (payment.fee_statement_id, statement) {
        (None, _) => None,
        (Some(statement_id), None) => {
            return Err(LedgerError::MissingStatement {
                payment_id: payment.id,
                statement_id,
            })
        }
        (Some(linked), Some(st)) => {
            if st.id != linked {
                return Err(LedgerError::StatementMismatch {
                    payment_id: payment.id,
                    linked,
                    supplied: st.id,
                });
            }
            let previous_paid = st.amount_paid;
            st.add_payment(payment.amount)?;
            Some(StatementCredit {
                statement_id: st.id,
                previous_paid,
                amount_paid: st.amount_paid,
                status: st.status,
            })
        }
    };

    payment.status = PaymentStatus::Verified;
    payment.verified_by = Some(review.reviewer_id);
    payment.verified_at = Some(review.at);
    payment.verification_notes = Some(review.notes);

    tracing::debug!(
        payment_id = payment.id,
        amount = %payment.amount,
        statement_id = ?credit.as_ref().map(|c| c.statement_id),
        "payment verified"
    );

    Ok(VerifyOutcome {
        payment_id: payment.id,
        credit,
    })
}

/// Reject a payment. Any linked statement is left exactly as it is.
pub fn reject(payment: &mut Payment, review: Review) -> RejectOutcome {
    let previous_status = payment.status;
    let credit_retained =
        previous_status == PaymentStatus::Verified && payment.fee_statement_id.is_some();

    if credit_retained {
        tracing::warn!(
            payment_id = payment.id,
            statement_id = ?payment.fee_statement_id,
            amount = %payment.amount,
            "rejecting a verified payment; fee statement credit is not reversed"
        );
    }

    payment.status = PaymentStatus::Rejected;
    payment.verified_by = Some(review.reviewer_id);
    payment.verified_at = Some(review.at);
    payment.verification_notes = Some(review.notes);

    RejectOutcome {
        payment_id: payment.id,
        previous_status,
        credit_retained,
    }
}

/// Link a payment to a statement. A payment that is already verified is
/// credited immediately; otherwise the credit waits for [`verify`].
pub fn attach(
    payment: &mut Payment,
    statement: &mut FeeStatement,
    today: NaiveDate,
) -> Result<Option<StatementCredit>, LedgerError> {
    if let Some(existing) = payment.fee_statement_id {
        if existing != statement.id {
            return Err(LedgerError::AlreadyLinked {
                payment_id: payment.id,
                statement_id: existing,
            });
        }
        return Ok(None);
    }
    if statement.user_id != payment.user_id {
        return Err(LedgerError::OwnerMismatch {
            payment_id: payment.id,
            statement_id: statement.id,
        });
    }

    payment.fee_statement_id = Some(statement.id);
    if payment.status != PaymentStatus::Verified {
        return Ok(None);
    }

    let previous_paid = statement.amount_paid;
    statement.amount_paid = statement
        .amount_paid
        .checked_add(payment.amount)
        .ok_or(LedgerError::Overflow(statement.id))?;
    statement.update_status(today);
    Ok(Some(StatementCredit {
        statement_id: statement.id,
        previous_paid,
        amount_paid: statement.amount_paid,
        status: statement.status,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::tests::statement;
    use proptest::prelude::*;

    fn due() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()
    }

    fn payment(id: i64, amount: i64, statement_id: Option<i64>) -> Payment {
        Payment {
            id,
            user_id: 7,
            fee_statement_id: statement_id,
            receipt_number: format!("RCP-2025-{id:04}"),
            amount: Money::from_shillings(amount),
            payment_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            payment_method: PaymentMethod::Mpesa,
            status: PaymentStatus::Pending,
            verified_by: None,
            verified_at: None,
            verification_notes: None,
        }
    }

    fn review() -> Review {
        Review {
            reviewer_id: 1,
            notes: "checked against M-Pesa statement".into(),
            at: Utc::now(),
        }
    }

    #[test]
    fn verify_credits_linked_statement() {
        let mut st = statement(1000, 0, due());
        let mut p = payment(1, 400, Some(st.id));
        let out = verify(&mut p, Some(&mut st), review()).unwrap();
        assert_eq!(p.status, PaymentStatus::Verified);
        assert_eq!(p.verified_by, Some(1));
        assert!(p.verified_at.is_some());
        let credit = out.credit.unwrap();
        assert_eq!(credit.previous_paid, Money::ZERO);
        assert_eq!(credit.amount_paid, Money::from_shillings(400));
        assert_eq!(st.status, FeeStatementStatus::Partial);
    }

    #[test]
    fn payments_summing_to_total_mark_paid() {
        let mut st = statement(1000, 0, due());
        for (id, amount) in [(1, 250), (2, 350), (3, 400)] {
            let mut p = payment(id, amount, Some(st.id));
            verify(&mut p, Some(&mut st), review()).unwrap();
        }
        assert_eq!(st.amount_paid, Money::from_shillings(1000));
        assert_eq!(st.status, FeeStatementStatus::Paid);
    }

    #[test]
    fn verify_without_statement_has_no_side_effect() {
        let mut p = payment(1, 400, None);
        let out = verify(&mut p, None, review()).unwrap();
        assert_eq!(out.credit, None);
        assert_eq!(p.status, PaymentStatus::Verified);
    }

    #[test]
    fn second_verification_is_refused_and_does_not_double_count() {
        let mut st = statement(1000, 0, due());
        let mut p = payment(1, 400, Some(st.id));
        verify(&mut p, Some(&mut st), review()).unwrap();
        let err = verify(&mut p, Some(&mut st), review()).unwrap_err();
        assert_eq!(
            err,
            LedgerError::NotPending {
                payment_id: 1,
                status: PaymentStatus::Verified
            }
        );
        assert_eq!(st.amount_paid, Money::from_shillings(400));
    }

    #[test]
    fn missing_or_mismatched_statement_leaves_records_untouched() {
        let mut p = payment(1, 400, Some(9));
        assert!(matches!(
            verify(&mut p, None, review()),
            Err(LedgerError::MissingStatement { statement_id: 9, .. })
        ));
        let mut st = statement(1000, 0, due());
        assert!(matches!(
            verify(&mut p, Some(&mut st), review()),
            Err(LedgerError::StatementMismatch { linked: 9, supplied: 1, .. })
        ));
        assert_eq!(p.status, PaymentStatus::Pending);
        assert_eq!(st.amount_paid, Money::ZERO);
    }

    #[test]
    fn reject_leaves_statement_alone() {
        let st = statement(1000, 300, due());
        let mut p = payment(1, 400, Some(st.id));
        let out = reject(&mut p, review());
        assert_eq!(p.status, PaymentStatus::Rejected);
        assert_eq!(out.previous_status, PaymentStatus::Pending);
        assert!(!out.credit_retained);
        assert_eq!(st.amount_paid, Money::from_shillings(300));
    }

    #[test]
    fn reject_after_verify_retains_credit() {
        let mut st = statement(1000, 0, due());
        let mut p = payment(1, 400, Some(st.id));
        verify(&mut p, Some(&mut st), review()).unwrap();
        let out = reject(&mut p, review());
        assert!(out.credit_retained);
        assert_eq!(out.previous_status, PaymentStatus::Verified);
        assert_eq!(st.amount_paid, Money::from_shillings(400));
    }

    #[test]
    fn attach_pending_defers_credit() {
        let mut st = statement(1000, 0, due());
        let mut p = payment(1, 400, None);
        let credit = attach(&mut p, &mut st, due()).unwrap();
        assert_eq!(credit, None);
        assert_eq!(p.fee_statement_id, Some(st.id));
        assert_eq!(st.amount_paid, Money::ZERO);
    }

    #[test]
    fn attach_verified_credits_immediately() {
        let mut st = statement(1000, 0, due());
        let mut p = payment(1, 1000, None);
        verify(&mut p, None, review()).unwrap();
        let credit = attach(&mut p, &mut st, due()).unwrap().unwrap();
        assert_eq!(credit.status, FeeStatementStatus::Paid);
    }

    #[test]
    fn attach_refuses_second_statement_and_foreign_owner() {
        let mut st = statement(1000, 0, due());
        let mut p = payment(1, 400, Some(42));
        assert!(matches!(
            attach(&mut p, &mut st, due()),
            Err(LedgerError::AlreadyLinked { statement_id: 42, .. })
        ));
        let mut q = payment(2, 400, None);
        q.user_id = 99;
        assert!(matches!(
            attach(&mut q, &mut st, due()),
            Err(LedgerError::OwnerMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn paid_total_equals_sum_of_verified(
            amounts in proptest::collection::vec(1i64..500, 1..12),
            rejected_mask in proptest::collection::vec(any::<bool>(), 12),
        ) {
            let mut st = statement(1000, 0, due());
            let mut expected = Money::ZERO;
            for (i, amount) in amounts.iter().enumerate() {
                let mut p = payment(i as i64 + 1, *amount, Some(st.id));
                if rejected_mask[i] {
                    reject(&mut p, review());
                } else {
                    verify(&mut p, Some(&mut st), review()).unwrap();
                    expected = expected + p.amount;
                }
                // A repeated verification never changes the total.
                let _ = verify(&mut p, Some(&mut st), review());
            }
            prop_assert_eq!(st.amount_paid, expected);
            if expected.is_positive() {
                let want = if expected >= st.total_amount {
                    FeeStatementStatus::Paid
                } else {
                    FeeStatementStatus::Partial
                };
                prop_assert_eq!(st.status, want);
            }
        }
    }
}
