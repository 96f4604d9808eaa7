//! # API Route Modules
//!
//! One module per resource. Each exposes `router() -> Router<AppState>`;
//! [`crate::app`] merges them behind the auth middleware.
//!
//! - `auth`: signup, login, token validation, password change.
//!   `auth::public_router` carries the two routes reachable without a token.
//! - `profile`: the caller's own profile.
//! - `documents`: supporting document upload and admin review.
//! - `fee_statements`: statement upload, listing and admin edits.
//! - `payments`: receipt upload and admin verification (reconciliation).
//! - `academics`: marks, term summaries, subject history, grading scale.
//! - `messages`: beneficiary/admin messaging.
//! - `education`: levels, grades, placement and the stats recompute.
//! - `beneficiaries`: admin beneficiary management.
//! - `dashboard`: admin and portal dashboards.
//! - `admin`: notifications and the audit log.
//! - `calendar`: events and academic terms.

pub mod academics;
pub mod admin;
pub mod auth;
pub mod beneficiaries;
pub mod calendar;
pub mod dashboard;
pub mod documents;
pub mod education;
pub mod fee_statements;
pub mod messages;
pub mod payments;
pub mod profile;

use serde::Deserialize;

use crate::error::AppError;

/// Parse an optional query-string enum, mapping a bad value to 400.
pub(crate) fn parse_filter<T>(value: Option<&str>) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr<Err = klk_core::ValidationError>,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => Ok(Some(v.parse()?)),
        None => Ok(None),
    }
}

/// `?year=` shared by statement and payment summaries.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct YearQuery {
    pub year: Option<i32>,
}
