//! # klk-ledger: Fee Statement & Payment Reconciliation
//!
//! Pure domain logic for the money side of the platform. Nothing here
//! touches a database; callers load the records, apply an operation, and
//! persist the result inside one transaction.
//!
//! ## Invariants
//!
//! - A payment contributes to its statement's `amount_paid` if and only if
//!   its status is `verified`. Entering `verified` is the only credit path.
//! - [`verify`] is legal only from `pending`. A second verification of the
//!   same payment is refused with [`LedgerError::NotPending`], so the amount
//!   is never applied twice.
//! - [`reject`] never touches a statement. Rejecting a payment that was
//!   already verified leaves the credit in place and reports it through
//!   [`RejectOutcome::credit_retained`].
//! - [`FeeStatement::update_status`] is a pure function of the paid amount,
//!   the total and the due date, and is therefore idempotent.

pub mod error;
pub mod payment;
pub mod receipt;
pub mod statement;

pub use error::LedgerError;
pub use payment::{attach, reject, verify, Payment, RejectOutcome, Review, StatementCredit, VerifyOutcome};
pub use receipt::{receipt_number, receipt_sequence};
pub use statement::FeeStatement;
