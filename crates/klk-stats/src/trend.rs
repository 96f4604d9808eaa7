//! Derived views used by the level detail and education dashboard pages.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use klk_core::AcademicPeriod;
use serde::{Deserialize, Serialize};

use crate::grade::GradeStats;
use crate::snapshot::{BeneficiarySnapshot, SummaryPoint};
use crate::{mean, round2};

/// Mean score of every summary recorded for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermAverage {
    pub term: String,
    pub average_performance: f64,
}

/// Beneficiaries per county.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountyCount {
    pub county: String,
    pub count: i64,
}

/// Average score for each of the `limit` most recent periods, newest first.
pub fn performance_trend(summaries: &[SummaryPoint], limit: usize) -> Vec<TermAverage> {
    let mut by_period: BTreeMap<&AcademicPeriod, Vec<f64>> = BTreeMap::new();
    for s in summaries {
        by_period.entry(&s.period).or_default().push(s.average_score);
    }
    by_period
        .into_iter()
        .rev()
        .take(limit)
        .map(|(period, scores)| TermAverage {
            term: period.label(),
            average_performance: round2(mean(scores)),
        })
        .collect()
}

/// Counties with the most beneficiaries, largest first. Blank counties are
/// skipped; ties order alphabetically.
pub fn county_distribution(beneficiaries: &[BeneficiarySnapshot], limit: usize) -> Vec<CountyCount> {
    let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
    for county in beneficiaries
        .iter()
        .filter_map(|b| b.county.as_deref())
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        *counts.entry(county).or_default() += 1;
    }
    let mut out: Vec<CountyCount> = counts
        .into_iter()
        .map(|(county, count)| CountyCount {
            county: county.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.county.cmp(&b.county)));
    out.truncate(limit);
    out
}

/// The `limit` best-performing grades.
pub fn top_grades<T: Clone>(grades: &[(T, GradeStats)], limit: usize) -> Vec<(T, GradeStats)> {
    let mut ranked = grades.to_vec();
    ranked.sort_by(|a, b| {
        b.1.average_performance
            .partial_cmp(&a.1.average_performance)
            .unwrap_or(Ordering::Equal)
    });
    ranked.truncate(limit);
    ranked
}
