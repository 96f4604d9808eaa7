//! Reconciliation errors. All of them describe a conflict with current
//! record state and surface as 409 at the HTTP boundary.

use klk_core::PaymentStatus;
use thiserror::Error;

/// A reconciliation operation was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Verification requires a pending payment.
    #[error("payment {payment_id} is {status}, only pending payments can be verified")]
    NotPending {
        /// The payment.
        payment_id: i64,
        /// Its current status.
        status: PaymentStatus,
    },

    /// The payment is linked to a different statement than the one supplied.
    #[error("payment {payment_id} is linked to fee statement {linked}, not {supplied}")]
    StatementMismatch {
        /// The payment.
        payment_id: i64,
        /// Statement recorded on the payment.
        linked: i64,
        /// Statement the caller passed in.
        supplied: i64,
    },

    /// The payment names a statement but none was loaded.
    #[error("payment {payment_id} is linked to fee statement {statement_id}, which was not supplied")]
    MissingStatement {
        /// The payment.
        payment_id: i64,
        /// The statement it references.
        statement_id: i64,
    },

    /// The payment is already attached to another statement.
    #[error("payment {payment_id} is already associated with fee statement {statement_id}")]
    AlreadyLinked {
        /// The payment.
        payment_id: i64,
        /// Existing statement link.
        statement_id: i64,
    },

    /// The statement belongs to a different beneficiary than the payment.
    #[error("fee statement {statement_id} does not belong to the payer of payment {payment_id}")]
    OwnerMismatch {
        /// The payment.
        payment_id: i64,
        /// The statement.
        statement_id: i64,
    },

    /// Crediting would overflow the paid total.
    #[error("amount overflow while crediting fee statement {0}")]
    Overflow(i64),
}
