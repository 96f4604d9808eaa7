//! Fee statement balance and status derivation.

use chrono::NaiveDate;
use klk_core::{FeeStatementStatus, Money};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// A term's billed amount and payment position for one beneficiary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeStatement {
    pub id: i64,
    pub user_id: i64,
    pub term: String,
    pub year: i32,
    pub school: String,
    pub total_amount: Money,
    pub amount_paid: Money,
    pub due_date: NaiveDate,
    pub status: FeeStatementStatus,
    pub notes: Option<String>,
}

impl FeeStatement {
    /// Outstanding amount. Negative when overpaid.
    pub fn balance(&self) -> Money {
        self.total_amount - self.amount_paid
    }

    /// Paid amount as a percentage of the total.
    pub fn payment_percentage(&self) -> f64 {
        self.amount_paid.percent_of(self.total_amount)
    }

    /// True once `today` is past the due date.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        today > self.due_date
    }

    /// Status implied by the current totals and due date.
    pub fn derive_status(&self, today: NaiveDate) -> FeeStatementStatus {
        if self.amount_paid >= self.total_amount {
            FeeStatementStatus::Paid
        } else if self.amount_paid.is_positive() {
            FeeStatementStatus::Partial
        } else if self.is_overdue(today) {
            FeeStatementStatus::Overdue
        } else {
            FeeStatementStatus::Unpaid
        }
    }

    /// Recompute and store the status. Calling twice with no change in
    /// between yields the same status.
    pub fn update_status(&mut self, today: NaiveDate) -> FeeStatementStatus {
        self.status = self.derive_status(today);
        self.status
    }

    /// Apply a verified payment: add to the paid total and move to `paid`
    /// or `partial`. Due date plays no part here; an overdue statement that
    /// receives money becomes `partial`.
    pub fn add_payment(&mut self, amount: Money) -> Result<(), LedgerError> {
        self.amount_paid = self
            .amount_paid
            .checked_add(amount)
            .ok_or(LedgerError::Overflow(self.id))?;
        self.status = if self.balance() <= Money::ZERO {
            FeeStatementStatus::Paid
        } else {
            FeeStatementStatus::Partial
        };
        Ok(())
    }

    /// Administrative override. Holds until the next recomputation.
    pub fn override_status(&mut self, status: FeeStatementStatus) {
        tracing::info!(
            statement_id = self.id,
            from = %self.status,
            to = %status,
            "fee statement status overridden"
        );
        self.status = status;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn statement(total: i64, paid: i64, due: NaiveDate) -> FeeStatement {
        FeeStatement {
            id: 1,
            user_id: 7,
            term: "Term 1".into(),
            year: 2025,
            school: "Moi Girls".into(),
            total_amount: Money::from_shillings(total),
            amount_paid: Money::from_shillings(paid),
            due_date: due,
            status: FeeStatementStatus::Pending,
            notes: None,
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn derive_paid_partial_unpaid_overdue() {
        let today = d(2025, 3, 1);
        assert_eq!(
            statement(1000, 1000, d(2025, 4, 1)).derive_status(today),
            FeeStatementStatus::Paid
        );
        assert_eq!(
            statement(1000, 1200, d(2025, 4, 1)).derive_status(today),
            FeeStatementStatus::Paid
        );
        assert_eq!(
            statement(1000, 400, d(2025, 1, 1)).derive_status(today),
            FeeStatementStatus::Partial
        );
        assert_eq!(
            statement(1000, 0, d(2025, 4, 1)).derive_status(today),
            FeeStatementStatus::Unpaid
        );
        assert_eq!(
            statement(1000, 0, d(2025, 2, 28)).derive_status(today),
            FeeStatementStatus::Overdue
        );
    }

    #[test]
    fn due_today_is_not_overdue() {
        let today = d(2025, 3, 1);
        assert!(!statement(1000, 0, today).is_overdue(today));
    }

    #[test]
    fn update_status_is_idempotent() {
        let today = d(2025, 3, 1);
        let mut st = statement(1000, 250, d(2025, 2, 1));
        let first = st.update_status(today);
        let snapshot = st.clone();
        let second = st.update_status(today);
        assert_eq!(first, second);
        assert_eq!(st, snapshot);
    }

    #[test]
    fn credit_moves_to_partial_then_paid() {
        let mut st = statement(1000, 0, d(2025, 1, 1));
        st.add_payment(Money::from_shillings(400)).unwrap();
        assert_eq!(st.status, FeeStatementStatus::Partial);
        assert_eq!(st.balance(), Money::from_shillings(600));
        st.add_payment(Money::from_shillings(600)).unwrap();
        assert_eq!(st.status, FeeStatementStatus::Paid);
        assert_eq!(st.payment_percentage(), 100.0);
    }

    #[test]
    fn credit_overflow_is_refused() {
        let mut st = statement(1000, 0, d(2025, 1, 1));
        st.amount_paid = Money::from_cents(i64::MAX);
        assert_eq!(
            st.add_payment(Money::from_cents(1)),
            Err(LedgerError::Overflow(1))
        );
    }

    #[test]
    fn override_sticks_until_recomputed() {
        let today = d(2025, 3, 1);
        let mut st = statement(1000, 0, d(2025, 4, 1));
        st.override_status(FeeStatementStatus::Approved);
        assert_eq!(st.status, FeeStatementStatus::Approved);
        st.update_status(today);
        assert_eq!(st.status, FeeStatementStatus::Unpaid);
    }
}
