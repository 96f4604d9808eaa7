//! # Closed Vocabularies
//!
//! Every status and category used across the platform. Each enum has a
//! stable snake_case wire form ([`as_str`](PaymentStatus::as_str)), a human
//! label for display, and a [`FromStr`](std::str::FromStr) impl that reports
//! [`ValidationError::UnknownVariant`] on bad input.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal, $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Every variant in declaration order.
            pub fn all() -> &'static [$name] {
                &[ $( Self::$variant, )+ ]
            }

            /// Stable wire and storage form.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $wire, )+
                }
            }

            /// Human-readable label.
            pub fn label(&self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $( $wire => Ok(Self::$variant), )+
                    other => Err(ValidationError::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

labelled_enum! {
    /// Account role on a user profile.
    Role, "role" {
        /// Platform administrator.
        Admin => "admin", "Administrator",
        /// Programme staff.
        Staff => "staff", "Staff Member",
        /// Sponsored student.
        Beneficiary => "beneficiary", "Beneficiary",
    }
}

labelled_enum! {
    /// Self-reported gender.
    Gender, "gender" {
        /// Male.
        Male => "male", "Male",
        /// Female.
        Female => "female", "Female",
        /// Other.
        Other => "other", "Other",
        /// Not disclosed.
        PreferNotToSay => "prefer_not_to_say", "Prefer not to say",
    }
}

labelled_enum! {
    /// Where a beneficiary stands in the sponsorship programme.
    SponsorshipStatus, "sponsorship status" {
        /// Fully sponsored.
        Active => "active", "Active",
        /// Sponsored subject to conditions.
        Conditional => "conditional", "Conditional",
        /// Temporarily suspended.
        Suspended => "suspended", "Suspended",
        /// Left the programme after completion.
        Completed => "completed", "Completed",
    }
}

labelled_enum! {
    /// Kind of uploaded supporting document.
    DocumentType, "document type" {
        /// School fee statement.
        FeeStatement => "fee_statement", "Fee Statement",
        /// Payment receipt.
        Receipt => "receipt", "Receipt",
        /// Term report card.
        ReportCard => "report_card", "Report Card",
        /// Medical certificate.
        Medical => "medical", "Medical Certificate",
        /// National or school ID.
        IdCard => "id_card", "ID Card",
        /// Birth certificate.
        BirthCertificate => "birth_certificate", "Birth Certificate",
        /// Anything else.
        Other => "other", "Other",
    }
}

labelled_enum! {
    /// Review state of an uploaded document.
    DocumentStatus, "document status" {
        /// Awaiting review.
        Pending => "pending", "Pending Review",
        /// Accepted.
        Approved => "approved", "Approved",
        /// Refused.
        Rejected => "rejected", "Rejected",
        /// Beneficiary must resubmit or clarify.
        RequiresAction => "requires_action", "Requires Action",
    }
}

labelled_enum! {
    /// Payment state of a fee statement.
    FeeStatementStatus, "fee statement status" {
        /// Uploaded, not yet reviewed.
        Pending => "pending", "Pending Review",
        /// Reviewed and accepted.
        Approved => "approved", "Approved",
        /// Fully paid.
        Paid => "paid", "Fully Paid",
        /// Some amount paid.
        Partial => "partial", "Partial Payment",
        /// Nothing paid, not yet due.
        Unpaid => "unpaid", "Unpaid",
        /// Nothing paid and past due.
        Overdue => "overdue", "Overdue",
    }
}

impl FeeStatementStatus {
    /// Statuses that still carry an outstanding balance.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Partial | Self::Unpaid | Self::Overdue)
    }
}

labelled_enum! {
    /// Verification state of a submitted payment receipt.
    PaymentStatus, "payment status" {
        /// Submitted, awaiting verification.
        Pending => "pending", "Pending Verification",
        /// Verified by an administrator.
        Verified => "verified", "Verified",
        /// Rejected by an administrator.
        Rejected => "rejected", "Rejected",
        /// Under dispute.
        Disputed => "disputed", "Disputed",
    }
}

labelled_enum! {
    /// Channel through which a payment was made.
    PaymentMethod, "payment method" {
        /// M-Pesa mobile money.
        Mpesa => "mpesa", "M-Pesa",
        /// Bank transfer.
        BankTransfer => "bank_transfer", "Bank Transfer",
        /// Cash.
        Cash => "cash", "Cash",
        /// Cheque.
        Cheque => "cheque", "Cheque",
        /// Mobile banking app.
        MobileBanking => "mobile_banking", "Mobile Banking",
        /// Anything else.
        Other => "other", "Other",
    }
}

labelled_enum! {
    /// Message category.
    MessageType, "message type" {
        /// General inquiry.
        General => "general", "General Inquiry",
        /// Financial aid question.
        Financial => "financial", "Financial Aid",
        /// Academic question.
        Academic => "academic", "Academic",
        /// Document related.
        Document => "document", "Document Related",
        /// Technical support.
        Technical => "technical", "Technical Support",
        /// Anything else.
        Other => "other", "Other",
    }
}

labelled_enum! {
    /// Message priority.
    MessagePriority, "priority" {
        /// Low.
        Low => "low", "Low",
        /// Normal.
        Normal => "normal", "Normal",
        /// High.
        High => "high", "High",
        /// Urgent.
        Urgent => "urgent", "Urgent",
    }
}

labelled_enum! {
    /// Category of an in-app notification.
    NotificationType, "notification type" {
        /// Document review outcome.
        Document => "document", "Document Review",
        /// Payment verification outcome.
        Payment => "payment", "Payment Verification",
        /// New application.
        Application => "application", "New Application",
        /// System alert.
        System => "system", "System Alert",
        /// New message.
        Message => "message", "New Message",
    }
}

labelled_enum! {
    /// Kind of administrative action recorded in the audit log.
    AuditAction, "audit action" {
        /// Record created.
        Create => "create", "Create",
        /// Record updated.
        Update => "update", "Update",
        /// Record deleted.
        Delete => "delete", "Delete",
        /// Record approved.
        Approve => "approve", "Approve",
        /// Record rejected.
        Reject => "reject", "Reject",
        /// Payment verified.
        Verify => "verify", "Verify",
    }
}

labelled_enum! {
    /// Calendar event category.
    EventType, "event type" {
        /// General academic event.
        Academic => "academic", "Academic",
        /// Examination.
        Exam => "exam", "Examination",
        /// Meeting.
        Meeting => "meeting", "Meeting",
        /// School event.
        Event => "event", "School Event",
        /// Holiday.
        Holiday => "holiday", "Holiday",
    }
}
