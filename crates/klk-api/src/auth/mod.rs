//! # Authentication & Authorization
//!
//! Every route outside `/api/auth/login`, `/api/auth/signup` and the health
//! checks runs behind [`auth_middleware`]. It verifies the bearer token,
//! loads the account it names and injects a [`Caller`] into the request
//! extensions. Handlers take the `Caller` as an extractor and check what they
//! need with [`Caller::require`]:
//!
//! ```ignore
//! async fn verify_payment(caller: Caller, ...) -> Result<..., AppError> {
//!     caller.require(Capability::VerifyPayments)?;
//!     ...
//! }
//! ```
//!
//! A token whose user has since been deleted is refused with 401. A disabled
//! account gets 403.

pub mod password;
pub mod token;

use axum::extract::{Request, State};
use axum::http::header;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use klk_core::Role;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db;
use crate::error::AppError;
use crate::state::AppState;

pub use password::{
    hash_password, hash_password_blocking, verify_password, verify_password_blocking,
};
pub use token::{Claims, TokenError, TokenService};

/// Something a caller may be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Self-service portal: own profile, documents, statements, payments.
    UsePortal,
    /// Create, list and edit beneficiaries; assign levels and grades.
    ManageBeneficiaries,
    /// Approve or reject uploaded documents.
    ReviewDocuments,
    /// Verify or reject payments and edit fee statements.
    VerifyPayments,
    /// Record academic marks and term summaries.
    RecordAcademics,
    /// Create and edit education levels and grades; trigger recomputes.
    ManageEducation,
    /// Calendar events and academic terms.
    ManageCalendar,
    /// Message any user.
    MessageAnyone,
    /// Admin dashboards and notifications.
    ViewAdminDashboard,
    /// Read the audit log.
    ViewAuditLog,
}

impl Capability {
    const ADMIN: &'static [Capability] = &[
        Capability::UsePortal,
        Capability::ManageBeneficiaries,
        Capability::ReviewDocuments,
        Capability::VerifyPayments,
        Capability::RecordAcademics,
        Capability::ManageEducation,
        Capability::ManageCalendar,
        Capability::MessageAnyone,
        Capability::ViewAdminDashboard,
        Capability::ViewAuditLog,
    ];
    const BENEFICIARY: &'static [Capability] = &[Capability::UsePortal];
}

/// The authenticated account behind a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Caller {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[schema(value_type = String)]
    pub role: Role,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl Caller {
    /// Admin and staff profiles, and Django-style staff or superuser flags,
    /// all count as administrators.
    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Staff) || self.is_staff || self.is_superuser
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        if self.is_admin() {
            Capability::ADMIN
        } else {
            Capability::BENEFICIARY
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// 403 unless the caller holds `capability`.
    pub fn require(&self, capability: Capability) -> Result<(), AppError> {
        if self.can(capability) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = self.user_id,
                role = %self.role,
                ?capability,
                "capability check failed"
            );
            Err(AppError::Forbidden(
                "Access denied. Admin privileges required.".into(),
            ))
        }
    }

    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let trimmed = name.trim();
        if trimmed.is_empty() {
            self.username.clone()
        } else {
            trimmed.to_string()
        }
    }
}

impl From<db::users::Account> for Caller {
    fn from(account: db::users::Account) -> Self {
        Self {
            user_id: account.id,
            username: account.username,
            email: account.email,
            first_name: account.first_name,
            last_name: account.last_name,
            role: account.role,
            is_staff: account.is_staff,
            is_superuser: account.is_superuser,
        }
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))
    }
}

/// Resolve the bearer token into a [`Caller`].
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = match header_value {
        Some(value) if value.starts_with("Bearer ") => value[7..].trim().to_string(),
        Some(_) => {
            tracing::warn!("authentication failed: non-Bearer authorization scheme");
            return AppError::Unauthorized("Authorization header must use Bearer scheme".into())
                .into_response();
        }
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            return AppError::Unauthorized("Authentication required".into()).into_response();
        }
    };

    let claims = match state.tokens.verify(&token) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::warn!(reason = %err, "authentication failed: token rejected");
            return AppError::Unauthorized("Invalid or expired token".into()).into_response();
        }
    };

    // The connection goes back to the pool before the handler runs.
    let account = {
        let mut conn = match state.pool.acquire().await {
            Ok(conn) => conn,
            Err(err) => return AppError::from(err).into_response(),
        };
        db::users::find_account(&mut conn, claims.user_id).await
    };

    match account {
        Ok(Some(account)) if account.is_active => {
            request.extensions_mut().insert(Caller::from(account));
            next.run(request).await
        }
        Ok(Some(_)) => {
            tracing::warn!(user_id = claims.user_id, "authentication failed: account disabled");
            AppError::Forbidden("Account is disabled".into()).into_response()
        }
        Ok(None) => {
            tracing::warn!(user_id = claims.user_id, "authentication failed: user no longer exists");
            AppError::Unauthorized("User not found".into()).into_response()
        }
        Err(err) => AppError::from(err).into_response(),
    }
}
