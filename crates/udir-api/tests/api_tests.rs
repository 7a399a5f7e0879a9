//! API integration tests
//!
//! Every test drives the full router over an in-memory directory.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use udir_api::{create_router_for_testing, create_router_with_outbox};
use udir_core::InMemoryNotifier;

/// Helper to create a test request
fn create_json_request(
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");

    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn register_student(app: &Router, email: &str, password: &str) -> Value {
    let (status, json) = send(
        app,
        create_json_request(
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({
                "name": "Ada Lovelace",
                "email": email,
                "password": password,
                "role": "student",
                "major": "Mathematics"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json
}

async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
    send(
        app,
        create_json_request(
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        ),
    )
    .await
}

async fn session_token(app: &Router, email: &str, password: &str) -> String {
    let (status, json) = login(app, email, password).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    json["access_token"].as_str().unwrap().to_string()
}

/// Request recovery and read the token the user would receive out-of-band
async fn recovery_token(app: &Router, outbox: &InMemoryNotifier, email: &str) -> String {
    let (status, json) = send(
        app,
        create_json_request(
            "POST",
            "/api/v1/auth/recover",
            None,
            Some(json!({ "email": email })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{json}");
    outbox.latest_for(email).await.unwrap().token
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_readiness_check() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        Request::builder().uri("/ready").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
    assert_eq!(json["development_secret"], true);
}

#[tokio::test]
async fn test_openapi_document_served() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/api-docs/openapi.json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/api/v1/auth/login"].is_object());
}

// =============================================================================
// Login Tests
// =============================================================================

#[tokio::test]
async fn test_login_success() {
    let app = create_router_for_testing();
    register_student(&app, "a@x.com", "secret123").await;

    let (status, json) = login(&app, "a@x.com", "secret123").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["token_type"], "bearer");
    assert_eq!(json["expires_in"], 1800);
    assert_eq!(json["claims"]["email"], "a@x.com");
    assert_eq!(json["claims"]["role"], "student");
    assert!(json["access_token"].as_str().unwrap().split('.').count() == 3);
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = create_router_for_testing();
    register_student(&app, "a@x.com", "secret123").await;

    let (wrong_status, wrong_body) = login(&app, "a@x.com", "wrong").await;
    let (unknown_status, unknown_body) = login(&app, "nobody@x.com", "secret123").await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body, unknown_body);
    assert_eq!(wrong_body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn test_token_responses_not_cacheable() {
    let app = create_router_for_testing();
    register_student(&app, "a@x.com", "secret123").await;

    let response = app
        .clone()
        .oneshot(create_json_request(
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "a@x.com", "password": "secret123" })),
        ))
        .await
        .unwrap();

    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
}

// =============================================================================
// Registration Tests
// =============================================================================

#[tokio::test]
async fn test_register_returns_public_info() {
    let app = create_router_for_testing();

    let json = register_student(&app, "A@X.com", "secret123").await;

    assert_eq!(json["email"], "a@x.com");
    assert_eq!(json["role"], "student");
    assert_eq!(json["major"], "Mathematics");
    assert!(json.get("credential").is_none());
    assert!(json.get("password").is_none());
}

#[tokio::test]
async fn test_register_duplicate_email_across_roles() {
    let app = create_router_for_testing();
    register_student(&app, "a@x.com", "secret123").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({
                "name": "Alan Turing",
                "email": "a@x.com",
                "password": "teach1234",
                "role": "professor",
                "department": "Computing"
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "EMAIL_TAKEN");
}

#[tokio::test]
async fn test_register_rejects_invalid_input() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({
                "name": "Alan Turing",
                "email": "not-an-email",
                "password": "teach1234",
                "role": "professor",
                "department": "Computing"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");

    // Professor without a department
    let (status, _) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({
                "name": "Alan Turing",
                "email": "alan@x.com",
                "password": "teach1234",
                "role": "professor"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Authorization Tests
// =============================================================================

#[tokio::test]
async fn test_authorize_granted_and_wrong_role() {
    let app = create_router_for_testing();
    register_student(&app, "a@x.com", "secret123").await;
    let token = session_token(&app, "a@x.com", "secret123").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/authorize",
            Some(&token),
            Some(json!({ "required_role": "student" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["granted"], true);
    assert_eq!(json["email"], "a@x.com");

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/authorize",
            Some(&token),
            Some(json!({ "required_role": "administrator" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["granted"], false);
    assert_eq!(json["reason"], "wrong_role");
}

#[tokio::test]
async fn test_authorize_rejects_recovery_token() {
    let (app, outbox) = create_router_with_outbox();
    register_student(&app, "a@x.com", "secret123").await;
    let token = recovery_token(&app, &outbox, "a@x.com").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/authorize",
            Some(&token),
            Some(json!({ "required_role": "student" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["reason"], "wrong_token_kind");
}

#[tokio::test]
async fn test_authorize_malformed_and_missing_token() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/authorize",
            Some("not.a.token"),
            Some(json!({ "required_role": "student" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["reason"], "token_malformed");

    let (status, _) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/authorize",
            None,
            Some(json!({ "required_role": "student" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[tokio::test]
async fn test_recovery_and_reset_flow() {
    let (app, outbox) = create_router_with_outbox();
    register_student(&app, "a@x.com", "secret123").await;
    let token = recovery_token(&app, &outbox, "a@x.com").await;

    let (status, _) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/reset-password",
            None,
            Some(json!({ "token": token, "new_password": "newpass99" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = login(&app, "a@x.com", "newpass99").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = login(&app, "a@x.com", "secret123").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Second use of the same token
    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/reset-password",
            None,
            Some(json!({ "token": token, "new_password": "another99" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "TOKEN_MALFORMED");
}

#[tokio::test]
async fn test_recover_response_withholds_token() {
    let (app, outbox) = create_router_with_outbox();
    register_student(&app, "victim@x.com", "secret123").await;

    let response = app
        .clone()
        .oneshot(create_json_request(
            "POST",
            "/api/v1/auth/recover",
            None,
            Some(json!({ "email": "victim@x.com" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    let delivered = outbox.latest_for("victim@x.com").await.unwrap();
    assert!(!text.contains(&delivered.token));
    assert!(!text.contains("recovery_token"));

    let json: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json.as_object().unwrap().len(), 1);
    assert!(json["message"].is_string());
}

#[tokio::test]
async fn test_anonymous_recover_does_not_hand_over_account() {
    let (app, outbox) = create_router_with_outbox();
    register_student(&app, "victim@x.com", "secret123").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/recover",
            None,
            Some(json!({ "email": "victim@x.com" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    // Whatever came back in the reply is all an anonymous caller holds
    let stolen = json["recovery_token"].as_str().unwrap_or("").to_string();
    let (status, _) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/reset-password",
            None,
            Some(json!({ "token": stolen, "new_password": "attacker99" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = login(&app, "victim@x.com", "attacker99").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = login(&app, "victim@x.com", "secret123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outbox.len().await, 1);
}

#[tokio::test]
async fn test_recover_unknown_email() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/recover",
            None,
            Some(json!({ "email": "nobody@x.com" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_reset_rejects_session_token() {
    let app = create_router_for_testing();
    register_student(&app, "a@x.com", "secret123").await;
    let session = session_token(&app, "a@x.com", "secret123").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/reset-password",
            None,
            Some(json!({ "token": session, "new_password": "newpass99" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "WRONG_TOKEN_KIND");
    let (status, _) = login(&app, "a@x.com", "secret123").await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Session-protected Routes
// =============================================================================

#[tokio::test]
async fn test_change_password() {
    let app = create_router_for_testing();
    register_student(&app, "a@x.com", "secret123").await;
    let token = session_token(&app, "a@x.com", "secret123").await;

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/change-password",
            Some(&token),
            Some(json!({
                "email": "a@x.com",
                "old_password": "wrong",
                "new_password": "newpass99"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "INVALID_CREDENTIALS");

    let (status, _) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/change-password",
            Some(&token),
            Some(json!({
                "email": "a@x.com",
                "old_password": "secret123",
                "new_password": "newpass99"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = login(&app, "a@x.com", "newpass99").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_for_other_user_forbidden() {
    let app = create_router_for_testing();
    register_student(&app, "a@x.com", "secret123").await;
    register_student(&app, "b@x.com", "secret456").await;
    let token = session_token(&app, "a@x.com", "secret123").await;

    let (status, _) = send(
        &app,
        create_json_request(
            "POST",
            "/api/v1/auth/change-password",
            Some(&token),
            Some(json!({
                "email": "b@x.com",
                "old_password": "secret456",
                "new_password": "newpass99"
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = login(&app, "b@x.com", "secret456").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let (app, outbox) = create_router_with_outbox();
    register_student(&app, "a@x.com", "secret123").await;
    let recovery = recovery_token(&app, &outbox, "a@x.com").await;

    let (status, _) = send(
        &app,
        Request::builder()
            .uri("/api/v1/auth/me")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        create_json_request("GET", "/api/v1/auth/me", Some(&recovery), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_returns_profile() {
    let app = create_router_for_testing();
    register_student(&app, "a@x.com", "secret123").await;
    let token = session_token(&app, "a@x.com", "secret123").await;

    let (status, json) = send(
        &app,
        create_json_request("GET", "/api/v1/auth/me", Some(&token), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["email"], "a@x.com");
    assert_eq!(json["name"], "Ada Lovelace");
    assert_eq!(json["status"], "active");
}

// =============================================================================
// Request Body Tests
// =============================================================================

#[tokio::test]
async fn test_malformed_json_returns_api_error() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"email\": "))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert!(json["message"].is_string());
}

#[tokio::test]
async fn test_missing_content_type_returns_api_error() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/v1/auth/recover")
            .body(Body::from(r#"{"email":"a@x.com"}"#))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
}
