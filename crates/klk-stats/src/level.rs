//! Education level aggregate.

use chrono::{Datelike, NaiveDate};
use klk_core::{DocumentStatus, Money};
use serde::{Deserialize, Serialize};

use crate::latest::{latest_in_scope, passing_rate};
use crate::snapshot::ScopeSnapshot;
use crate::{mean, round2};

/// Cached statistics for one education level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelStats {
    pub total_students: i64,
    pub active_students: i64,
    pub pending_verification: i64,
    pub new_this_month: i64,
    pub average_performance: f64,
    pub passing_rate: f64,
    pub total_fees: Money,
    pub total_paid: Money,
    pub total_aid_disbursed: Money,
    pub pending_documents: i64,
    pub approved_documents: i64,
}

/// Recompute a level's statistics from `scope`. `today` decides which
/// beneficiaries count as new this month.
pub fn level_stats(scope: &ScopeSnapshot, today: NaiveDate) -> LevelStats {
    let latest = latest_in_scope(scope);

    let count = |pred: &dyn Fn(&crate::BeneficiarySnapshot) -> bool| {
        scope.beneficiaries.iter().filter(|b| pred(b)).count() as i64
    };

    LevelStats {
        total_students: scope.beneficiaries.len() as i64,
        active_students: scope.active_count(),
        pending_verification: count(&|b| !b.is_verified),
        new_this_month: count(&|b| {
            b.joined_on.year() == today.year() && b.joined_on.month() == today.month()
        }),
        average_performance: round2(mean(latest.values().map(|s| s.average_score))),
        passing_rate: round2(passing_rate(&latest)),
        total_fees: scope.total_fees(),
        total_paid: scope.total_paid(),
        total_aid_disbursed: scope.verified_payments.iter().sum(),
        pending_documents: scope.documents_with(DocumentStatus::Pending),
        approved_documents: scope.documents_with(DocumentStatus::Approved),
    }
}
