//! Latest-summary selection.

use std::collections::{BTreeMap, BTreeSet};

use klk_core::PASS_MARK;

use crate::snapshot::{ScopeSnapshot, SummaryPoint};

/// The most recent summary for each beneficiary, keyed by user id.
///
/// Ties on the same period keep the first row seen.
pub fn latest_per_beneficiary(summaries: &[SummaryPoint]) -> BTreeMap<i64, &SummaryPoint> {
    let mut latest: BTreeMap<i64, &SummaryPoint> = BTreeMap::new();
    for s in summaries {
        match latest.get(&s.user_id) {
            Some(current) if current.period >= s.period => {}
            _ => {
                latest.insert(s.user_id, s);
            }
        }
    }
    latest
}

/// Latest summaries restricted to the beneficiaries of `scope`.
pub(crate) fn latest_in_scope(scope: &ScopeSnapshot) -> BTreeMap<i64, &SummaryPoint> {
    let members: BTreeSet<i64> = scope.beneficiaries.iter().map(|b| b.user_id).collect();
    let mut latest = latest_per_beneficiary(&scope.summaries);
    latest.retain(|user, _| members.contains(user));
    latest
}

/// Share of `latest` at or above the pass mark, as a percentage. Zero when
/// nobody has a summary.
pub(crate) fn passing_rate(latest: &BTreeMap<i64, &SummaryPoint>) -> f64 {
    if latest.is_empty() {
        return 0.0;
    }
    let passing = latest
        .values()
        .filter(|s| s.average_score >= PASS_MARK)
        .count();
    passing as f64 / latest.len() as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use klk_core::AcademicPeriod;
    use proptest::prelude::*;

    fn point(user_id: i64, year: i32, term: &str, score: f64) -> SummaryPoint {
        SummaryPoint {
            user_id,
            period: AcademicPeriod::new(year, term),
            average_score: score,
            attendance_percentage: None,
        }
    }

    #[test]
    fn picks_year_then_term() {
        let rows = vec![
            point(1, 2024, "Term 3", 30.0),
            point(1, 2025, "Term 1", 50.0),
            point(1, 2025, "Term 2", 70.0),
            point(2, 2023, "Term 1", 40.0),
        ];
        let latest = latest_per_beneficiary(&rows);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[&1].average_score, 70.0);
        assert_eq!(latest[&2].average_score, 40.0);
    }

    #[test]
    fn term_ten_sorts_after_term_two() {
        let rows = vec![point(1, 2025, "Term 10", 10.0), point(1, 2025, "Term 2", 20.0)];
        assert_eq!(latest_per_beneficiary(&rows)[&1].average_score, 10.0);
    }

    proptest! {
        #[test]
        fn one_row_per_beneficiary_and_it_is_the_max(
            rows in proptest::collection::vec((0i64..5, 2020i32..2026, 1u8..4, 0.0f64..100.0), 0..40)
        ) {
            let points: Vec<_> = rows
                .iter()
                .map(|(u, y, t, s)| point(*u, *y, &format!("Term {t}"), *s))
                .collect();
            let latest = latest_per_beneficiary(&points);
            let distinct: std::collections::BTreeSet<_> = points.iter().map(|p| p.user_id).collect();
            prop_assert_eq!(latest.len(), distinct.len());
            for (user, chosen) in &latest {
                for p in points.iter().filter(|p| p.user_id == *user) {
                    prop_assert!(chosen.period >= p.period);
                }
            }
        }
    }
}
