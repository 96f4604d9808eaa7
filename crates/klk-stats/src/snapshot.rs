//! Input rows for a recomputation.

use chrono::NaiveDate;
use klk_core::{AcademicPeriod, DocumentStatus, Gender, Money, SponsorshipStatus};
use serde::{Deserialize, Serialize};

/// What the roll-up needs to know about one beneficiary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeneficiarySnapshot {
    pub user_id: i64,
    pub gender: Option<Gender>,
    pub sponsorship_status: SponsorshipStatus,
    pub is_verified: bool,
    pub joined_on: NaiveDate,
    pub county: Option<String>,
}

/// One academic summary row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryPoint {
    pub user_id: i64,
    pub period: AcademicPeriod,
    pub average_score: f64,
    pub attendance_percentage: Option<f64>,
}

/// Billed and paid totals of one fee statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementTotals {
    pub total_amount: Money,
    pub amount_paid: Money,
}

/// Everything attached to the beneficiaries of one scope.
///
/// Rows belonging to users outside `beneficiaries` are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeSnapshot {
    pub beneficiaries: Vec<BeneficiarySnapshot>,
    pub summaries: Vec<SummaryPoint>,
    pub statements: Vec<StatementTotals>,
    /// Amounts of verified payments only.
    pub verified_payments: Vec<Money>,
    pub documents: Vec<DocumentStatus>,
}

impl ScopeSnapshot {
    /// Sum of billed amounts.
    pub fn total_fees(&self) -> Money {
        self.statements.iter().map(|s| s.total_amount).sum()
    }

    /// Sum of paid amounts.
    pub fn total_paid(&self) -> Money {
        self.statements.iter().map(|s| s.amount_paid).sum()
    }

    pub fn documents_with(&self, status: DocumentStatus) -> i64 {
        self.documents.iter().filter(|d| **d == status).count() as i64
    }

    /// Beneficiaries whose sponsorship is currently active.
    pub fn active_count(&self) -> i64 {
        self.beneficiaries
            .iter()
            .filter(|b| b.sponsorship_status == SponsorshipStatus::Active)
            .count() as i64
    }
}
