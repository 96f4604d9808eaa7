//! # Validation Errors
//!
//! Input validation failures for domain primitives. Every variant maps to a
//! 400 response at the HTTP boundary.

use thiserror::Error;

/// Errors raised when constructing or parsing a domain primitive.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required field was missing or blank.
    #[error("{0} is required")]
    MissingField(String),

    /// An amount string could not be parsed as a two-decimal number.
    #[error("invalid amount: {0:?}")]
    InvalidAmount(String),

    /// An amount must be strictly positive.
    #[error("amount must be greater than zero")]
    NonPositiveAmount,

    /// A string did not name a member of a closed vocabulary.
    #[error("invalid {kind}: {value:?}")]
    UnknownVariant {
        /// Which vocabulary was being parsed (e.g. "payment method").
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// A date string was not `YYYY-MM-DD`.
    #[error("invalid date {0:?}; expected YYYY-MM-DD")]
    InvalidDate(String),

    /// An email address failed the format check.
    #[error("invalid email address: {0:?}")]
    InvalidEmail(String),

    /// A password did not meet the strength policy.
    #[error("{0}")]
    WeakPassword(&'static str),

    /// Marks or percentages outside 0..=100.
    #[error("{field} must be between 0 and 100, got {value}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Rejected value.
        value: f64,
    },

    /// An uploaded file failed the size or extension check.
    #[error("{0}")]
    InvalidUpload(String),
}
