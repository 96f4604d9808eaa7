//! # Academic Periods
//!
//! Kenyan schools run three terms a year. Terms are stored as free text
//! ("Term 1", "term 2", "TERM 3"), so ordering goes through [`term_rank`],
//! which extracts the trailing term number. Unrecognized labels rank 0 and
//! sort before every numbered term of the same year.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Numeric rank of a term label. `"Term 2"` → 2, `"Mid-year"` → 0.
pub fn term_rank(term: &str) -> u8 {
    let trimmed = term.trim();
    let digits: String = trimmed
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse::<u8>().unwrap_or(0)
}

/// A (year, term) pair ordered chronologically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AcademicPeriod {
    /// Calendar year.
    pub year: i32,
    /// Term label as entered, e.g. "Term 1".
    pub term: String,
}

impl AcademicPeriod {
    /// Build a period.
    pub fn new(year: i32, term: impl Into<String>) -> Self {
        Self {
            year,
            term: term.into(),
        }
    }

    /// Human label, e.g. `"Term 1 2025"`.
    pub fn label(&self) -> String {
        format!("{} {}", self.term, self.year)
    }
}

impl Ord for AcademicPeriod {
    fn cmp(&self, other: &Self) -> Ordering {
        self.year
            .cmp(&other.year)
            .then_with(|| term_rank(&self.term).cmp(&term_rank(&other.term)))
            .then_with(|| self.term.cmp(&other.term))
    }
}

impl PartialOrd for AcademicPeriod {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_parses_trailing_number() {
        assert_eq!(term_rank("Term 1"), 1);
        assert_eq!(term_rank("term 3 "), 3);
        assert_eq!(term_rank("TERM2"), 2);
        assert_eq!(term_rank("Holiday"), 0);
        assert_eq!(term_rank(""), 0);
    }

    #[test]
    fn year_dominates_term() {
        let a = AcademicPeriod::new(2024, "Term 3");
        let b = AcademicPeriod::new(2025, "Term 1");
        assert!(b > a);
    }

    #[test]
    fn term_orders_numerically_not_lexically() {
        let t2 = AcademicPeriod::new(2025, "Term 2");
        let t10 = AcademicPeriod::new(2025, "Term 10");
        assert!(t10 > t2);
    }

    #[test]
    fn max_picks_latest() {
        let periods = vec![
            AcademicPeriod::new(2024, "Term 2"),
            AcademicPeriod::new(2025, "Term 1"),
            AcademicPeriod::new(2025, "Term 3"),
            AcademicPeriod::new(2025, "Term 2"),
        ];
        assert_eq!(
            periods.into_iter().max().unwrap(),
            AcademicPeriod::new(2025, "Term 3")
        );
    }

    #[test]
    fn label_format() {
        assert_eq!(AcademicPeriod::new(2025, "Term 1").label(), "Term 1 2025");
    }
}
