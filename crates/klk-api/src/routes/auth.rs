//! # Accounts & Sessions
//!
//! - **POST `/api/auth/signup`**: create a beneficiary account, returns a token
//! - **POST `/api/auth/login`**: exchange email and password for a token
//! - **POST `/api/auth/logout`**: stateless; the client discards its token
//! - **GET `/api/auth/validate`**: the account behind the presented token
//! - **POST `/api/auth/change-password`**
//!
//! Signup and login are mounted outside the auth middleware.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use klk_core::validation::{validate_email, validate_password};
use klk_core::Role;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{hash_password_blocking, verify_password_blocking, Caller, Capability};
use crate::db::{logins, profiles, users};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, ClientMeta, Validate};
use crate::response::{ok, Envelope};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignupRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    pub confirm_password: String,
}

impl Validate for SignupRequest {
    fn validate(&self) -> Result<(), String> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err("First and last name are required".into());
        }
        if self.password != self.confirm_password {
            return Err("Passwords do not match".into());
        }
        validate_password(&self.password).map_err(|e| e.to_string())?;
        validate_email(&self.email).map_err(|e| e.to_string())?;
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), String> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err("Email and password are required".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl Validate for ChangePasswordRequest {
    fn validate(&self) -> Result<(), String> {
        if self.new_password != self.confirm_password {
            return Err("New passwords do not match".into());
        }
        validate_password(&self.new_password).map_err(|e| e.to_string())
    }
}

/// Token plus the account it belongs to.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub expires_in_hours: i64,
    pub is_admin: bool,
    pub user: Caller,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ValidateResponse {
    pub valid: bool,
    pub is_admin: bool,
    pub user: Caller,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Routers
// ---------------------------------------------------------------------------

/// Routes reachable without a token.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/validate", get(validate))
        .route("/api/auth/change-password", post(change_password))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 409, description = "Email already registered", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
async fn signup(
    State(state): State<AppState>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<Json<Envelope<AuthResponse>>, AppError> {
    let req = extract_validated_json(body)?;
    let email = validate_email(&req.email)?;
    let hash = hash_password_blocking(req.password, state.config.password_iterations).await?;
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    if users::email_exists(&mut tx, &email).await? {
        return Err(AppError::Conflict("Email already registered".into()));
    }
    let base = email.split('@').next().unwrap_or("user");
    let username = users::unique_username(&mut tx, base).await?;
    let user_id = users::insert_user(
        &mut tx,
        &users::NewUser {
            username: &username,
            email: &email,
            password_hash: &hash,
            first_name: req.first_name.trim(),
            last_name: req.last_name.trim(),
            is_staff: false,
            is_superuser: false,
        },
        now,
    )
    .await?;
    let fields = profiles::ProfileFields {
        phone: req.phone,
        ..Default::default()
    };
    profiles::insert(&mut tx, user_id, Role::Beneficiary, &fields, now).await?;
    let account = users::find_account(&mut tx, user_id)
        .await?
        .ok_or_else(|| AppError::Internal("account vanished after insert".into()))?;
    tx.commit().await?;

    tracing::info!(user_id, "account created");
    let caller = Caller::from(account);
    Ok(ok(auth_response(&state, caller, "Account created successfully")?))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Bad credentials", body = crate::error::ErrorBody),
        (status = 403, description = "Account disabled", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
async fn login(
    State(state): State<AppState>,
    client: ClientMeta,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Envelope<AuthResponse>>, AppError> {
    let req = extract_validated_json(body)?;
    let email = req.email.trim().to_lowercase();

    let account = {
        let mut conn = state.pool.acquire().await?;
        users::find_account_by_email(&mut conn, &email).await?
    };
    let Some(account) = account else {
        tracing::warn!("login failed: unknown email");
        return Err(invalid_credentials());
    };
    if !verify_password_blocking(req.password, account.password_hash.clone()).await? {
        tracing::warn!(user_id = account.id, "login failed: wrong password");
        return Err(invalid_credentials());
    }
    if !account.is_active {
        tracing::warn!(user_id = account.id, "login refused: account disabled");
        return Err(AppError::Forbidden("Account is disabled".into()));
    }

    let now = Utc::now();
    let mut tx = state.pool.begin().await?;
    users::touch_last_login(&mut tx, account.id, now).await?;
    logins::record(&mut tx, account.id, &client, now).await?;
    tx.commit().await?;

    tracing::info!(user_id = account.id, "login");
    Ok(ok(auth_response(&state, Caller::from(account), "Login successful")?))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 200, description = "Logged out", body = MessageResponse)),
    tag = "auth"
)]
async fn logout(caller: Caller) -> Json<Envelope<MessageResponse>> {
    tracing::debug!(user_id = caller.user_id, "logout");
    ok(MessageResponse::new("Logged out successfully"))
}

#[utoipa::path(
    get,
    path = "/api/auth/validate",
    responses(
        (status = 200, description = "Token is valid", body = ValidateResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
async fn validate(caller: Caller) -> Result<Json<Envelope<ValidateResponse>>, AppError> {
    caller.require(Capability::UsePortal)?;
    Ok(ok(ValidateResponse {
        valid: true,
        is_admin: caller.is_admin(),
        user: caller,
    }))
}

#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Wrong current password or weak new one", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
async fn change_password(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<Envelope<MessageResponse>>, AppError> {
    let req = extract_validated_json(body)?;
    let account = {
        let mut conn = state.pool.acquire().await?;
        users::find_account(&mut conn, caller.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?
    };
    if !verify_password_blocking(req.current_password, account.password_hash).await? {
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }
    let hash = hash_password_blocking(req.new_password, state.config.password_iterations).await?;
    let mut conn = state.pool.acquire().await?;
    users::update_password(&mut conn, caller.user_id, &hash).await?;
    tracing::info!(user_id = caller.user_id, "password changed");
    Ok(ok(MessageResponse::new("Password changed successfully")))
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid email or password".into())
}

fn auth_response(state: &AppState, user: Caller, message: &str) -> Result<AuthResponse, AppError> {
    let token = state
        .tokens
        .issue(user.user_id, &user.email, &user.username, Utc::now())?;
    Ok(AuthResponse {
        message: message.to_string(),
        token,
        expires_in_hours: state.config.jwt_expiration_hours,
        is_admin: user.is_admin(),
        user,
    })
}

#[cfg(test)]
mod tests {
    use crate::testing::{TestApp, TEST_PASSWORD};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    fn signup_body(email: &str) -> serde_json::Value {
        json!({
            "first_name": "Baraka",
            "last_name": "Mwangi",
            "email": email,
            "password": "Str0ngPass",
            "confirm_password": "Str0ngPass"
        })
    }

    #[tokio::test]
    async fn signup_returns_working_token() {
        let t = TestApp::new().await;
        let (status, body) = t
            .call(Method::POST, "/api/auth/signup", None, Some(signup_body("Baraka@Example.com")))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["success"], true);
        assert_eq!(body["user"]["email"], "baraka@example.com");
        assert_eq!(body["user"]["role"], "beneficiary");
        assert_eq!(body["is_admin"], false);

        let token = body["token"].as_str().unwrap();
        let (status, body) = t.get("/api/auth/validate", token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["username"], "baraka");
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let t = TestApp::new().await;
        let (status, body) = t
            .call(Method::POST, "/api/auth/signup", None, Some(signup_body("amani@klk.test")))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn weak_or_mismatched_password_is_bad_request() {
        let t = TestApp::new().await;
        let mut body = signup_body("new@example.com");
        body["password"] = json!("weak");
        body["confirm_password"] = json!("weak");
        let (status, _) = t.call(Method::POST, "/api/auth/signup", None, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut body = signup_body("new@example.com");
        body["confirm_password"] = json!("Different1");
        let (status, resp) = t.call(Method::POST, "/api/auth/signup", None, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["error"], "Passwords do not match");
    }

    #[tokio::test]
    async fn login_records_history() {
        let t = TestApp::new().await;
        let (status, body) = t
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({"email": "AMANI@klk.test", "password": TEST_PASSWORD})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert!(body["token"].as_str().unwrap().contains('.'));
        let mut conn = t.conn().await;
        assert_eq!(crate::db::logins::count_for(&mut conn, t.user_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn bad_credentials_and_disabled_accounts() {
        let t = TestApp::new().await;
        let (status, _) = t
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({"email": "amani@klk.test", "password": "Wrong1234"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        {
            let mut conn = t.conn().await;
            crate::db::users::update_identity(&mut conn, t.user_id, None, None, None, Some(false))
                .await
                .unwrap();
        }
        let (status, _) = t
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({"email": "amani@klk.test", "password": TEST_PASSWORD})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        // Tokens issued before the account was disabled stop working too.
        let (status, _) = t.get("/api/auth/validate", &t.user_token).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_and_garbage_tokens_are_401() {
        let t = TestApp::new().await;
        let (status, body) = t.call(Method::GET, "/api/auth/validate", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        let (status, _) = t.get("/api/auth/validate", "not.a.token").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn change_password_checks_current() {
        let t = TestApp::new().await;
        let (status, _) = t
            .post(
                "/api/auth/change-password",
                &t.user_token,
                json!({
                    "current_password": "Wrong1234",
                    "new_password": "N3wPassword",
                    "confirm_password": "N3wPassword"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = t
            .post(
                "/api/auth/change-password",
                &t.user_token,
                json!({
                    "current_password": TEST_PASSWORD,
                    "new_password": "N3wPassword",
                    "confirm_password": "N3wPassword"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = t
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({"email": "amani@klk.test", "password": "N3wPassword"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn logout_is_stateless() {
        let t = TestApp::new().await;
        let (status, body) = t.post("/api/auth/logout", &t.user_token, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Logged out successfully");
    }
}
