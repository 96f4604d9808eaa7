//! Shared fixtures for handler tests: a migrated in-memory database, a
//! temporary media root, one administrator and one beneficiary with tokens.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use klk_core::Role;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::Sqlite;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::auth::hash_password;
use crate::config::AppConfig;
use crate::db::{self, profiles, users};
use crate::state::AppState;

pub(crate) const TEST_PASSWORD: &str = "Passw0rdOk";
const TEST_ITERATIONS: u32 = 1_000;

pub(crate) struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub admin_id: i64,
    pub admin_token: String,
    pub user_id: i64,
    pub user_token: String,
    media: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let media = TempDir::new().unwrap();
        let config = AppConfig {
            media_root: media.path().to_path_buf(),
            password_iterations: TEST_ITERATIONS,
            ..AppConfig::default()
        };
        let pool = db::init_memory_pool().await.unwrap();
        let state = AppState::new(pool, config);

        let (admin_id, user_id) = {
            let mut conn = state.pool.acquire().await.unwrap();
            let admin_id = create_user(&mut conn, "admin@klk.test", "Grace", "Wambui", Role::Admin).await;
            let user_id = create_user(&mut conn, "amani@klk.test", "Amani", "Otieno", Role::Beneficiary).await;
            (admin_id, user_id)
        };
        let admin_token = state.tokens.issue(admin_id, "admin@klk.test", "admin", Utc::now()).unwrap();
        let user_token = state.tokens.issue(user_id, "amani@klk.test", "amani", Utc::now()).unwrap();

        Self {
            app: crate::app(state.clone()),
            state,
            admin_id,
            admin_token,
            user_id,
            user_token,
            media,
        }
    }

    /// Number of files under the media root.
    pub fn stored_files(&self) -> usize {
        fn count(dir: &std::path::Path) -> usize {
            std::fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .flatten()
                        .map(|e| if e.path().is_dir() { count(&e.path()) } else { 1 })
                        .sum()
                })
                .unwrap_or(0)
        }
        count(self.media.path())
    }

    pub async fn conn(&self) -> PoolConnection<Sqlite> {
        self.state.pool.acquire().await.unwrap()
    }

    /// Another beneficiary with a token.
    pub async fn beneficiary(&self, email: &str) -> (i64, String) {
        let mut conn = self.conn().await;
        let id = create_user(&mut conn, email, "Zawadi", "Njeri", Role::Beneficiary).await;
        let token = self.state.tokens.issue(id, email, email, Utc::now()).unwrap();
        (id, token)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.call(Method::DELETE, uri, Some(token), None).await
    }

    /// POST a multipart form with text fields and an optional `file` part.
    pub async fn multipart(
        &self,
        uri: &str,
        token: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &[u8])>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(fields, file)))
            .unwrap();
        self.send(request).await
    }

    pub async fn raw(&self, request: Request<Body>) -> axum::response::Response {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

const BOUNDARY: &str = "klk-test-boundary";

pub(crate) fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn create_user(
    conn: &mut sqlx::SqliteConnection,
    email: &str,
    first: &str,
    last: &str,
    role: Role,
) -> i64 {
    let hash = hash_password(TEST_PASSWORD, TEST_ITERATIONS);
    let username = email.split('@').next().unwrap();
    let id = users::insert_user(
        conn,
        &users::NewUser {
            username,
            email,
            password_hash: &hash,
            first_name: first,
            last_name: last,
            is_staff: role == Role::Admin,
            is_superuser: false,
        },
        Utc::now(),
    )
    .await
    .unwrap();
    profiles::insert(conn, id, role, &Default::default(), Utc::now())
        .await
        .unwrap();
    id
}
