//! # klk-stats: Statistics Roll-up
//!
//! Pure aggregation over snapshots of beneficiary state. The API crate loads
//! the rows for one scope (an education level or a grade), hands them to
//! [`level_stats`] or [`grade_stats`], and writes the result over the cached
//! row. Nothing here is incremental: every call recomputes from scratch, so
//! running it twice over the same input yields the same aggregate.
//!
//! "Latest summary" means the highest [`AcademicPeriod`](klk_core::AcademicPeriod)
//! per beneficiary, exactly one row each. Averages and the passing rate are
//! taken over those rows only.

pub mod grade;
pub mod latest;
pub mod level;
pub mod snapshot;
pub mod trend;

pub use grade::{grade_stats, GradeStats};
pub use latest::latest_per_beneficiary;
pub use level::{level_stats, LevelStats};
pub use snapshot::{BeneficiarySnapshot, ScopeSnapshot, StatementTotals, SummaryPoint};
pub use trend::{county_distribution, performance_trend, top_grades, CountyCount, TermAverage};

/// Round to two decimal places, the precision the aggregates are stored at.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mean of `values`, or 0 when empty.
pub(crate) fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}
