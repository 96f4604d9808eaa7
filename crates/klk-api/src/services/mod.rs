//! Multi-step operations shared by route handlers and the CLI.
//!
//! Each function takes a `&mut SqliteConnection`; callers that need
//! all-or-nothing semantics pass an open transaction and commit afterwards.

pub mod reconciliation;
pub mod stats;
