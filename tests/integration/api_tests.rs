//! API integration tests

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use libris_server::{api, AppState};

use crate::common::{harness, Harness, ODYSSEY};

struct TestApp {
    router: Router,
    harness: Harness,
}

impl TestApp {
    fn new() -> Self {
        let harness = harness();
        let state = AppState {
            config: Arc::new(harness.config.clone()),
            services: Arc::new(harness.services.clone()),
        };
        Self {
            router: api::router(state),
            harness,
        }
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(method)
            .uri(format!("/api/v1{}", uri));
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "Bearer");
        body["token"].as_str().unwrap().to_string()
    }

    async fn admin_token(&self) -> String {
        self.harness
            .services
            .users
            .ensure_admin("admin@example.org", "Admin", "admin-password")
            .await
            .unwrap();
        self.login("admin@example.org", "admin-password").await
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.send(Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_register_login_me() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({
                "email": "reader@example.org",
                "full_name": "Jane Reader",
                "password": "reader-password"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "user");

    let token = app.login("reader@example.org", "reader-password").await;
    let (status, body) = app.send(Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "reader@example.org");
    assert!(body.get("password_hash").is_none());

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "reader@example.org", "password": "wrong" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthorized");
}

#[tokio::test]
async fn test_book_management_requires_admin() {
    let app = TestApp::new();
    let book = json!({
        "isbn": ODYSSEY,
        "title": "The Odyssey",
        "copies": 1,
        "authors": ["Homer"]
    });

    let (status, _) = app.send(Method::POST, "/books", None, Some(book.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    app.harness
        .services
        .users
        .register(&libris_server::models::RegisterInput {
            email: "self@example.org".to_string(),
            full_name: "Self".to_string(),
            password: "self-password".to_string(),
        })
        .await
        .unwrap();
    let reader_token = app.login("self@example.org", "self-password").await;
    let (status, _) = app
        .send(Method::POST, "/books", Some(&reader_token), Some(book.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = app.admin_token().await;
    let (status, body) = app.send(Method::POST, "/books", Some(&admin), Some(book)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["copies_available"], 1);

    let (status, body) = app.send(Method::GET, "/books?query=homer", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = app.send(Method::GET, "/books/stats", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "available": 1, "total": 1 }));
}

#[tokio::test]
async fn test_invalid_isbn_is_bad_request() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let (status, body) = app
        .send(
            Method::POST,
            "/books",
            Some(&admin),
            Some(json!({ "isbn": "123", "title": "Title", "copies": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
    assert_eq!(body["code"], 5);
}

#[tokio::test]
async fn test_reservation_flow_over_http() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    app.harness.add_book(ODYSSEY, 1).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/users/readers",
            Some(&admin),
            Some(json!({ "email": "walkin@example.org", "full_name": "Walk In" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let user_id = body["user"]["id"].as_i64().unwrap();
    let password = body["temporary_password"].as_str().unwrap().to_string();
    assert_eq!(password.len(), 6);

    let reader = app.login("walkin@example.org", &password).await;
    let (status, body) = app
        .send(Method::POST, "/reservations", Some(&reader), Some(json!({ "isbn": ODYSSEY })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let record_id = body["record_id"].as_i64().unwrap();

    let (status, body) = app
        .send(Method::POST, "/reservations", Some(&reader), Some(json!({ "isbn": ODYSSEY })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "No copies available");

    let (status, _) = app
        .send(Method::POST, &format!("/records/{}/issue", record_id), Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(Method::POST, &format!("/records/{}/issue", record_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "issued");

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/records/{}/return", record_id),
            Some(&admin),
            Some(json!({ "return_date": "2024-03-01" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "returned");
    assert_eq!(app.harness.copies(ODYSSEY).await, 1);

    let (status, body) = app.send(Method::GET, "/auth/profile", Some(&reader), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["returned_records"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .send(Method::GET, &format!("/users/{}/history", user_id), Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["user_email"], "walkin@example.org");
}

#[tokio::test]
async fn test_reader_cannot_cancel_someone_elses_reservation() {
    let app = TestApp::new();
    app.harness.add_book(ODYSSEY, 2).await;
    let owner = app.harness.add_reader("owner@example.org").await;
    let record_id = app
        .harness
        .services
        .loans
        .reserve_book(ODYSSEY, owner.id, None)
        .await
        .unwrap();

    app.harness
        .services
        .users
        .register(&libris_server::models::RegisterInput {
            email: "other@example.org".to_string(),
            full_name: "Other".to_string(),
            password: "other-password".to_string(),
        })
        .await
        .unwrap();
    let other = app.login("other@example.org", "other-password").await;

    let (status, _) = app
        .send(Method::POST, &format!("/records/{}/cancel", record_id), Some(&other), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.harness.copies(ODYSSEY).await, 1);
}

#[tokio::test]
async fn test_lookup_import() {
    let app = TestApp::new();
    let admin = app.admin_token().await;

    let (status, body) = app
        .send(Method::GET, "/lookup/search?query=odyssey", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["isbn"], ODYSSEY);

    let (status, _) = app
        .send(Method::GET, "/lookup/isbn/9780000000000", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .send(
            Method::POST,
            "/lookup/import",
            Some(&admin),
            Some(json!({ "isbn": ODYSSEY, "copies": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["title"], "The Odyssey");
    assert_eq!(body["copies_available"], 2);

    let (status, _) = app
        .send(
            Method::POST,
            "/lookup/import",
            Some(&admin),
            Some(json!({ "isbn": ODYSSEY })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}
