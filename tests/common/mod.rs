//! Shared helpers for the HTTP API tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum_test::{TestResponse, TestServer};
use serde_json::{json, Value};

use mailbox::auth::TokenService;
use mailbox::web::handlers::AppState;
use mailbox::web::middleware::RateLimitState;
use mailbox::web::router::create_app;
use mailbox::{CredentialStore, Database, Role};

pub const JWT_SECRET: &str = "test-secret-key-for-testing-only";
pub const PASSWORD: &str = "password123";

/// Build a test server over the given database.
pub fn create_test_server_with_db(db: Database) -> TestServer {
    let tokens = Arc::new(TokenService::new(JWT_SECRET, 900));
    let app_state = Arc::new(AppState::new(db, tokens, chrono::Duration::hours(24)));
    let rate_limits = Arc::new(RateLimitState::new(1000, 10_000));
    let router = create_app(app_state, rate_limits, &[]);
    TestServer::new(router).expect("Failed to create test server")
}

/// Create a test server with an in-memory database.
pub async fn create_test_server() -> (TestServer, Database) {
    let db = Database::open_in_memory()
        .await
        .expect("Failed to create test database");
    (create_test_server_with_db(db.clone()), db)
}

/// Register a user and return the full response body.
pub async fn register(server: &TestServer, email: &str) -> Value {
    let response = server
        .post("/api/auth/register")
        .json(&json!({ "email": email, "password": PASSWORD }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    response.json::<Value>()
}

/// Register a user and return `(user_id, token)`.
pub async fn register_user(server: &TestServer, email: &str) -> (i64, String) {
    let body = register(server, email).await;
    (
        body["data"]["user"]["id"].as_i64().unwrap(),
        body["data"]["token"].as_str().unwrap().to_string(),
    )
}

/// Create an admin directly in the store, then log in over HTTP.
pub async fn create_admin(server: &TestServer, db: &Database, email: &str) -> (i64, String) {
    let admin = CredentialStore::new(db.pool())
        .create_with_role(email, PASSWORD, Role::Admin)
        .await
        .unwrap();
    (admin.id, login(server, email, PASSWORD).await)
}

/// Log in and return the token.
pub async fn login(server: &TestServer, email: &str, password: &str) -> String {
    let response = server
        .post("/api/auth/login")
        .json(&json!({ "email": email, "password": password }))
        .await;
    response.assert_status_ok();
    response.json::<Value>()["data"]["token"]
        .as_str()
        .unwrap()
        .to_string()
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Send a message and return the response.
pub async fn send_message(
    server: &TestServer,
    token: &str,
    to: &str,
    subject: &str,
    read_limit: i64,
) -> TestResponse {
    server
        .post("/api/messages")
        .add_header(AUTHORIZATION, bearer(token))
        .json(&json!({
            "receiver_email": to,
            "subject": subject,
            "body": format!("body of {subject}"),
            "read_limit": read_limit
        }))
        .await
}

/// GET a path as `token` and return the response.
pub async fn get_as(server: &TestServer, token: &str, path: &str) -> TestResponse {
    server
        .get(path)
        .add_header(AUTHORIZATION, bearer(token))
        .await
}

/// Error code of an error response body.
pub fn error_code(response: &TestResponse) -> String {
    response.json::<Value>()["error"]["code"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}
