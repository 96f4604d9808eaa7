//! # KCSE Grading Scale
//!
//! Twelve-band letter grade scale used on report cards. Marks are
//! percentages; each band carries a points value from 12 (A) down to 1 (E).

use serde::Serialize;

/// Average score at or above which a beneficiary counts as passing.
pub const PASS_MARK: f64 = 40.0;

/// One band of the grading scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GradeBand {
    /// Letter grade, e.g. "B+".
    pub grade: &'static str,
    /// Inclusive lower bound in percent.
    pub min: f64,
    /// Inclusive upper bound in percent.
    pub max: f64,
    /// Points awarded.
    pub points: u8,
}

/// The full scale, highest band first.
pub const GRADE_SCALE: [GradeBand; 12] = [
    GradeBand { grade: "A", min: 75.0, max: 100.0, points: 12 },
    GradeBand { grade: "A-", min: 70.0, max: 74.99, points: 11 },
    GradeBand { grade: "B+", min: 65.0, max: 69.99, points: 10 },
    GradeBand { grade: "B", min: 60.0, max: 64.99, points: 9 },
    GradeBand { grade: "B-", min: 55.0, max: 59.99, points: 8 },
    GradeBand { grade: "C+", min: 50.0, max: 54.99, points: 7 },
    GradeBand { grade: "C", min: 45.0, max: 49.99, points: 6 },
    GradeBand { grade: "C-", min: 40.0, max: 44.99, points: 5 },
    GradeBand { grade: "D+", min: 35.0, max: 39.99, points: 4 },
    GradeBand { grade: "D", min: 30.0, max: 34.99, points: 3 },
    GradeBand { grade: "D-", min: 25.0, max: 29.99, points: 2 },
    GradeBand { grade: "E", min: 0.0, max: 24.99, points: 1 },
];

/// Letter grade for a mark.
pub fn grade_for_marks(marks: f64) -> &'static str {
    GRADE_SCALE
        .iter()
        .find(|band| marks >= band.min)
        .map(|band| band.grade)
        .unwrap_or("E")
}

/// Points for a letter grade. Unknown grades score 1.
pub fn points_for_grade(grade: &str) -> u8 {
    GRADE_SCALE
        .iter()
        .find(|band| band.grade == grade)
        .map(|band| band.points)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn band_boundaries() {
        assert_eq!(grade_for_marks(100.0), "A");
        assert_eq!(grade_for_marks(75.0), "A");
        assert_eq!(grade_for_marks(74.99), "A-");
        assert_eq!(grade_for_marks(55.0), "B-");
        assert_eq!(grade_for_marks(40.0), "C-");
        assert_eq!(grade_for_marks(39.5), "D+");
        assert_eq!(grade_for_marks(0.0), "E");
    }

    #[test]
    fn points_lookup() {
        assert_eq!(points_for_grade("A"), 12);
        assert_eq!(points_for_grade("C+"), 7);
        assert_eq!(points_for_grade("E"), 1);
        assert_eq!(points_for_grade("Z"), 1);
    }

    proptest! {
        #[test]
        fn points_never_decrease_with_marks(a in 0.0f64..100.0, b in 0.0f64..100.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(
                points_for_grade(grade_for_marks(lo)) <= points_for_grade(grade_for_marks(hi))
            );
        }
    }
}
