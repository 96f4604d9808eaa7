#![deny(missing_docs)]

//! # klk-core: Foundational Types for the Kids League Kenya Platform
//!
//! Every other crate in the workspace depends on this one. It has no internal
//! crate dependencies: only `serde`, `thiserror` and `chrono`.
//!
//! ## Design Principles
//!
//! 1. **Money is fixed-point.** [`Money`] stores Kenyan shillings as integer
//!    cents and crosses the wire as a two-decimal string. No floating point
//!    ever touches a balance.
//!
//! 2. **One definition per status vocabulary.** Fee statement, payment,
//!    document and sponsorship statuses are closed enums with exhaustive
//!    `match`. Database rows and request bodies parse into them at the edge.
//!
//! 3. **Academic periods order deterministically.** [`AcademicPeriod`] sorts
//!    by year, then term rank, so "most recent summary" has exactly one answer.
//!
//! 4. **[`ValidationError`] for all input checks.** Structured errors with
//!    `thiserror`, no `.unwrap()` outside tests.

pub mod error;
pub mod grading;
pub mod money;
pub mod period;
pub mod status;
pub mod validation;

pub use error::ValidationError;
pub use grading::{grade_for_marks, points_for_grade, GradeBand, GRADE_SCALE, PASS_MARK};
pub use money::Money;
pub use period::{term_rank, AcademicPeriod};
pub use status::{
    AuditAction, DocumentStatus, DocumentType, EventType, FeeStatementStatus, Gender,
    MessagePriority, MessageType, NotificationType, PaymentMethod, PaymentStatus, Role,
    SponsorshipStatus,
};
