//! # Integration Tests for klk-api
//!
//! Drives the public router end to end: signup and login, placement in an
//! education level, academic summaries feeding the level statistics, and
//! the fee statement / payment reconciliation path.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use klk_api::auth::hash_password;
use klk_api::db::{self, profiles, users};
use klk_api::{AppConfig, AppState};
use klk_core::Role;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const ADMIN_EMAIL: &str = "office@klk.test";
const PASSWORD: &str = "Sponsor2030";
const BOUNDARY: &str = "klk-integration-boundary";

struct Harness {
    app: Router,
    _media: TempDir,
}

impl Harness {
    /// A fresh database with one administrator account.
    async fn new() -> Self {
        let media = TempDir::new().unwrap();
        let config = AppConfig {
            media_root: media.path().to_path_buf(),
            password_iterations: 1_000,
            ..AppConfig::default()
        };
        let pool = db::init_memory_pool().await.unwrap();
        {
            let mut conn = pool.acquire().await.unwrap();
            let hash = hash_password(PASSWORD, 1_000);
            let id = users::insert_user(
                &mut conn,
                &users::NewUser {
                    username: "office",
                    email: ADMIN_EMAIL,
                    password_hash: &hash,
                    first_name: "Wanjiku",
                    last_name: "Mwangi",
                    is_staff: true,
                    is_superuser: true,
                },
                Utc::now(),
            )
            .await
            .unwrap();
            profiles::insert(&mut conn, id, Role::Admin, &Default::default(), Utc::now())
                .await
                .unwrap();
        }
        Self {
            app: klk_api::app(AppState::new(pool, config)),
            _media: media,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn json(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn form(&self, uri: &str, token: &str, fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> (StatusCode, Value) {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
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

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    async fn login(&self, email: &str) -> String {
        let (status, body) = self
            .json(Method::POST, "/api/auth/login", None, Some(json!({"email": email, "password": PASSWORD})))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    /// Sign up a beneficiary; returns (user id, token).
    async fn signup(&self, first: &str, email: &str) -> (i64, String) {
        let (status, body) = self
            .json(
                Method::POST,
                "/api/auth/signup",
                None,
                Some(json!({
                    "first_name": first,
                    "last_name": "Ochieng",
                    "email": email,
                    "password": PASSWORD,
                    "confirm_password": PASSWORD,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["is_admin"], false);
        (body["user"]["user_id"].as_i64().unwrap(), body["token"].as_str().unwrap().to_string())
    }
}

/// Create the `primary` level with one grade; returns the grade id.
async fn primary_with_grade(h: &Harness, admin: &str) -> i64 {
    let (status, body) = h
        .json(
            Method::POST,
            "/api/admin/education-levels",
            Some(admin),
            Some(json!({"level_key": "primary", "title": "Primary School", "display_order": 1})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let level_id = body["level"]["id"].as_i64().unwrap();
    let (status, body) = h
        .json(
            Method::POST,
            "/api/admin/grades",
            Some(admin),
            Some(json!({"education_level_id": level_id, "name": "Grade 6", "short_code": "G6", "display_order": 6})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["grade"]["id"].as_i64().unwrap()
}

// -- Health and auth ----------------------------------------------------------

#[tokio::test]
async fn test_liveness_and_readiness() {
    let h = Harness::new().await;
    for uri in ["/health/liveness", "/health/readiness"] {
        let response = h
            .app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_login_and_capabilities() {
    let h = Harness::new().await;
    let admin = h.login(ADMIN_EMAIL).await;
    let (_, token) = h.signup("Baraka", "baraka@klk.test").await;

    let (status, body) = h.json(Method::GET, "/api/auth/validate", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_admin"], true);

    let (status, body) = h.json(Method::GET, "/api/admin/dashboard", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    let (status, _) = h
        .json(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": ADMIN_EMAIL, "password": "wrong-password1"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// -- Statistics roll-up -------------------------------------------------------

#[tokio::test]
async fn test_summary_feeds_level_statistics() {
    let h = Harness::new().await;
    let admin = h.login(ADMIN_EMAIL).await;
    let grade = primary_with_grade(&h, &admin).await;
    let (student, _) = h.signup("Achieng", "achieng@klk.test").await;

    let (status, body) = h
        .json(
            Method::POST,
            &format!("/api/admin/students/{student}/assign-level"),
            Some(&admin),
            Some(json!({"grade_class_id": grade})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["current"]["level"]["total_students"], 1);

    let (status, body) = h
        .json(
            Method::POST,
            &format!("/api/admin/beneficiaries/{student}/academic-summaries"),
            Some(&admin),
            Some(json!({"term": "Term 1", "year": 2030, "average_score": 55.0})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, body) = h.json(Method::GET, "/api/admin/education-levels/primary", Some(&admin), None).await;
    assert_eq!(body["stats"]["total_students"], 1);
    assert_eq!(body["stats"]["average_performance"], 55.0);
    assert_eq!(body["stats"]["passing_rate"], 100.0);
    let g6 = body["grades"]
        .as_array()
        .unwrap()
        .iter()
        .find(|g| g["short_code"] == "G6")
        .unwrap()
        .clone();
    assert_eq!(g6["stats"]["average_performance"], 55.0);
}

#[tokio::test]
async fn test_failing_summary_lowers_passing_rate() {
    let h = Harness::new().await;
    let admin = h.login(ADMIN_EMAIL).await;
    let grade = primary_with_grade(&h, &admin).await;
    for (name, email, score) in [("Kip", "kip@klk.test", 70.0), ("Nia", "nia@klk.test", 30.0)] {
        let (id, _) = h.signup(name, email).await;
        h.json(
            Method::POST,
            &format!("/api/admin/students/{id}/assign-level"),
            Some(&admin),
            Some(json!({"grade_class_id": grade})),
        )
        .await;
        h.json(
            Method::POST,
            &format!("/api/admin/beneficiaries/{id}/academic-summaries"),
            Some(&admin),
            Some(json!({"term": "Term 1", "year": 2030, "average_score": score})),
        )
        .await;
    }
    let (_, body) = h.json(Method::GET, "/api/admin/education-levels/primary", Some(&admin), None).await;
    assert_eq!(body["stats"]["total_students"], 2);
    assert_eq!(body["stats"]["average_performance"], 50.0);
    assert_eq!(body["stats"]["passing_rate"], 50.0);
}

// -- Reconciliation -----------------------------------------------------------

async fn verify(h: &Harness, admin: &str, payment: i64) -> (StatusCode, Value) {
    h.json(
        Method::POST,
        &format!("/api/admin/payments/{payment}/verify"),
        Some(admin),
        Some(json!({"status": "verified", "notes": "bank slip matches"})),
    )
    .await
}

#[tokio::test]
async fn test_payment_reconciliation_flow() {
    let h = Harness::new().await;
    let admin = h.login(ADMIN_EMAIL).await;
    let (_, token) = h.signup("Jabari", "jabari@klk.test").await;

    let (status, body) = h
        .form(
            "/api/fee-statements",
            &token,
            &[("term", "Term 2"), ("year", "2030"), ("school", "Kibera Primary"), ("total_amount", "15000"), ("due_date", "2030-05-10")],
            Some(("statement.pdf", b"%PDF-1.4")),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let statement = body["statement"]["id"].as_i64().unwrap();

    let mut receipts = Vec::new();
    for amount in ["5000", "10000"] {
        let sid = statement.to_string();
        let (status, body) = h
            .form(
                "/api/payments",
                &token,
                &[
                    ("amount", amount),
                    ("payment_date", "2030-04-02"),
                    ("payment_method", "bank_transfer"),
                    ("term", "Term 2"),
                    ("year", "2030"),
                    ("fee_statement_id", sid.as_str()),
                ],
                Some(("slip.jpg", b"\xff\xd8\xff")),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        receipts.push(body["payment"]["id"].as_i64().unwrap());
    }

    let (status, body) = verify(&h, &admin, receipts[0]).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["review"]["statement"]["status"], "partial");

    let (status, body) = verify(&h, &admin, receipts[0]).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);

    let (status, body) = verify(&h, &admin, receipts[1]).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["review"]["statement"]["amount_paid"], "15000.00");
    assert_eq!(body["review"]["statement"]["status"], "paid");

    let (_, body) = h.json(Method::GET, "/api/fee-statements", Some(&token), None).await;
    let row = &body["statements"][0];
    assert_eq!(row["status"], "paid");
    assert_eq!(row["balance"], "0.00");

    let (_, body) = h.json(Method::GET, "/api/payments/summary", Some(&token), None).await;
    assert_eq!(body["summary"]["verified_count"], 2);
}

#[tokio::test]
async fn test_beneficiary_cannot_touch_foreign_statement() {
    let h = Harness::new().await;
    let (_, owner) = h.signup("Imani", "imani@klk.test").await;
    let (_, other) = h.signup("Tumaini", "tumaini@klk.test").await;

    let (_, body) = h
        .form(
            "/api/fee-statements",
            &owner,
            &[("term", "Term 1"), ("year", "2030"), ("total_amount", "8000"), ("due_date", "2030-01-20")],
            None,
        )
        .await;
    let statement = body["statement"]["id"].as_i64().unwrap();

    let (status, _) = h
        .json(Method::GET, &format!("/api/fee-statements/{statement}/download"), Some(&other), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let sid = statement.to_string();
    let (status, _) = h
        .form(
            "/api/payments",
            &other,
            &[
                ("amount", "100"),
                ("payment_date", "2030-01-05"),
                ("payment_method", "mpesa"),
                ("term", "Term 1"),
                ("year", "2030"),
                ("fee_statement_id", sid.as_str()),
            ],
            Some(("r.png", b"\x89PNG")),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_audit_chain_stays_intact() {
    let h = Harness::new().await;
    let admin = h.login(ADMIN_EMAIL).await;
    primary_with_grade(&h, &admin).await;
    let (_, body) = h
        .json(Method::GET, "/api/admin/audit-logs/integrity", Some(&admin), None)
        .await;
    assert_eq!(body["chain_valid"], true, "{body}");
    assert_eq!(body["total_entries"], 2);
    assert_eq!(body["tampered_entries"], 0);
}
