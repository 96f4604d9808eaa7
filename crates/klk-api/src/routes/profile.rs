//! # Own Profile
//!
//! - **GET `/api/profile`**: profile with computed sponsorship fields
//! - **PUT `/api/profile`**: partial update; refreshes the caller's level
//!   and grade aggregates

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use utoipa::ToSchema;

use crate::auth::{Caller, Capability};
use crate::db::profiles::{self, Profile, ProfileFields};
use crate::db::users;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::response::{ok, Envelope};
use crate::services::stats::{self, Refreshed};
use crate::state::AppState;

/// A profile plus the values derived from it.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileView {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub is_admin: bool,
    pub years_in_program: i64,
    pub is_currently_sponsored: bool,
    pub profile: Profile,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileResponse {
    pub user: ProfileView,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileUpdated {
    pub message: String,
    pub user: ProfileView,
    pub stats: Refreshed,
}

/// Self-service edit. Sponsorship status and verification stay admin-only.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<chrono::NaiveDate>,
    pub county: Option<String>,
    pub school: Option<String>,
    pub guardian_name: Option<String>,
    pub guardian_phone: Option<String>,
    pub bio: Option<String>,
}

impl UpdateProfileRequest {
    fn fields(&self) -> ProfileFields {
        ProfileFields {
            phone: self.phone.clone(),
            gender: self.gender.clone(),
            date_of_birth: self.date_of_birth,
            county: self.county.clone(),
            school: self.school.clone(),
            guardian_name: self.guardian_name.clone(),
            guardian_phone: self.guardian_phone.clone(),
            bio: self.bio.clone(),
            ..Default::default()
        }
    }
}

impl Validate for UpdateProfileRequest {
    fn validate(&self) -> Result<(), String> {
        for name in [&self.first_name, &self.last_name].into_iter().flatten() {
            if name.trim().is_empty() {
                return Err("Names cannot be blank".into());
            }
        }
        self.fields().check().map_err(|e| e.to_string())
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/profile", get(get_profile).put(update_profile))
}

/// Load the account and profile for `user_id` as a [`ProfileView`].
pub(crate) async fn load_view(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<ProfileView, AppError> {
    let account = users::find_account(conn, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    let profile = profiles::find(conn, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Profile"))?;
    let caller = Caller::from(account);
    let today = Utc::now().date_naive();
    Ok(ProfileView {
        full_name: caller.full_name(),
        is_admin: caller.is_admin(),
        years_in_program: profile.years_in_program(today),
        is_currently_sponsored: profile.is_currently_sponsored(today),
        user_id: caller.user_id,
        username: caller.username,
        email: caller.email,
        first_name: caller.first_name,
        last_name: caller.last_name,
        profile,
    })
}

#[utoipa::path(
    get,
    path = "/api/profile",
    responses(
        (status = 200, description = "Caller's profile", body = ProfileResponse),
        (status = 404, description = "No profile", body = crate::error::ErrorBody),
    ),
    tag = "profile"
)]
async fn get_profile(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Envelope<ProfileResponse>>, AppError> {
    caller.require(Capability::UsePortal)?;
    let mut conn = state.pool.acquire().await?;
    let user = load_view(&mut conn, caller.user_id).await?;
    Ok(ok(ProfileResponse { user }))
}

#[utoipa::path(
    put,
    path = "/api/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = ProfileUpdated),
        (status = 400, description = "Invalid field", body = crate::error::ErrorBody),
    ),
    tag = "profile"
)]
async fn update_profile(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<Envelope<ProfileUpdated>>, AppError> {
    caller.require(Capability::UsePortal)?;
    let req = extract_validated_json(body)?;
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    users::update_identity(
        &mut tx,
        caller.user_id,
        req.first_name.as_deref().map(str::trim),
        req.last_name.as_deref().map(str::trim),
        None,
        None,
    )
    .await?;
    profiles::update(&mut tx, caller.user_id, &req.fields(), now).await?;
    let refreshed = stats::refresh_for_user(&mut tx, caller.user_id, now).await?;
    let user = load_view(&mut tx, caller.user_id).await?;
    tx.commit().await?;

    tracing::info!(user_id = caller.user_id, "profile updated");
    Ok(ok(ProfileUpdated {
        message: "Profile updated successfully".into(),
        user,
        stats: refreshed,
    }))
}

#[cfg(test)]
mod tests {
    use crate::testing::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn profile_has_computed_fields() {
        let t = TestApp::new().await;
        let (status, body) = t.get("/api/profile", &t.user_token).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["user"]["full_name"], "Amani Otieno");
        assert_eq!(body["user"]["years_in_program"], 0);
        assert_eq!(body["user"]["is_currently_sponsored"], true);
        assert_eq!(body["user"]["profile"]["role"], "beneficiary");
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let t = TestApp::new().await;
        let (status, _) = t
            .put("/api/profile", &t.user_token, json!({"county": "Kisumu", "phone": "0712000000"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = t
            .put("/api/profile", &t.user_token, json!({"school": "Kisumu Boys"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        let profile = &body["user"]["profile"];
        assert_eq!(profile["county"], "Kisumu");
        assert_eq!(profile["phone"], "0712000000");
        assert_eq!(profile["school"], "Kisumu Boys");
    }

    #[tokio::test]
    async fn unknown_gender_is_rejected() {
        let t = TestApp::new().await;
        let (status, body) = t
            .put("/api/profile", &t.user_token, json!({"gender": "robot"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn sponsorship_fields_are_not_self_editable() {
        let t = TestApp::new().await;
        let (status, body) = t
            .put(
                "/api/profile",
                &t.user_token,
                json!({"sponsorship_status": "completed", "is_verified": true}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["profile"]["sponsorship_status"], "active");
        assert_eq!(body["user"]["profile"]["is_verified"], false);
    }
}
