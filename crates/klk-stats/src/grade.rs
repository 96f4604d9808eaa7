//! Grade aggregate.

use klk_core::{DocumentStatus, Gender, Money};
use serde::{Deserialize, Serialize};

use crate::latest::{latest_in_scope, passing_rate};
use crate::snapshot::ScopeSnapshot;
use crate::{mean, round2};

/// Cached statistics for one grade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeStats {
    pub total_students: i64,
    pub active_students: i64,
    pub male_students: i64,
    pub female_students: i64,
    pub average_performance: f64,
    pub average_attendance: f64,
    pub passing_rate: f64,
    pub total_fees: Money,
    pub total_paid: Money,
    pub pending_documents: i64,
    pub approved_documents: i64,
}

/// Recompute a grade's statistics. Same counting rules as
/// [`level_stats`](crate::level_stats), plus the gender split and attendance.
pub fn grade_stats(scope: &ScopeSnapshot) -> GradeStats {
    let latest = latest_in_scope(scope);

    let gender = |g: Gender| {
        scope
            .beneficiaries
            .iter()
            .filter(|b| b.gender == Some(g))
            .count() as i64
    };

    GradeStats {
        total_students: scope.beneficiaries.len() as i64,
        active_students: scope.active_count(),
        male_students: gender(Gender::Male),
        female_students: gender(Gender::Female),
        average_performance: round2(mean(latest.values().map(|s| s.average_score))),
        average_attendance: round2(mean(
            latest.values().filter_map(|s| s.attendance_percentage),
        )),
        passing_rate: round2(passing_rate(&latest)),
        total_fees: scope.total_fees(),
        total_paid: scope.total_paid(),
        pending_documents: scope.documents_with(DocumentStatus::Pending),
        approved_documents: scope.documents_with(DocumentStatus::Approved),
    }
}
