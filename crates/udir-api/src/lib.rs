//! udir API - authentication service for the user directory
//!
//! Exposes login, role authorization, password recovery and password change
//! over HTTP on top of the auth core in [`auth`].

pub mod audit;
pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::{
    http::{header, Method},
    routing::get,
    Json, Router,
};
use state::AppState;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

/// OpenAPI document for the service
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::health::readiness_check,
        handlers::auth::register_handler,
        handlers::auth::login_handler,
        handlers::auth::authorize_handler,
        handlers::auth::recover_handler,
        handlers::auth::reset_password_handler,
        handlers::auth::change_password_handler,
        handlers::auth::me_handler,
    ),
    components(schemas(
        error::ApiError,
        auth::LoginRequest,
        auth::LoginResponse,
        auth::RegisterRequest,
        auth::SessionClaims,
        auth::UserInfo,
        auth::DenialReason,
        handlers::auth::AuthorizeRequest,
        handlers::auth::AuthorizeResponse,
        handlers::auth::RecoveryRequest,
        handlers::auth::ResetPasswordRequest,
        handlers::auth::ChangePasswordRequest,
        handlers::auth::MessageResponse,
        handlers::health::HealthResponse,
        handlers::health::ReadinessResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Login, authorization and credential lifecycle"),
        (name = "health", description = "Liveness and readiness probes"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Router over an in-memory directory with cheap hashing parameters
#[cfg(any(test, feature = "test-utils"))]
pub fn create_router_for_testing() -> Router {
    create_router(Arc::new(test_state()))
}

/// Testing router whose recovery tokens land in an in-memory outbox
#[cfg(any(test, feature = "test-utils"))]
pub fn create_router_with_outbox() -> (Router, Arc<udir_core::InMemoryNotifier>) {
    let outbox = Arc::new(udir_core::InMemoryNotifier::new());
    let state = test_state().with_notifier(outbox.clone());
    (create_router(Arc::new(state)), outbox)
}

/// State used by [`create_router_for_testing`]
#[cfg(any(test, feature = "test-utils"))]
pub fn test_state() -> AppState {
    let mut config = udir_core::AppConfig::default();
    config.auth.password_memory_cost = 4096;
    config.auth.password_time_cost = 1;
    config.auth.password_parallelism = 1;

    match AppState::new(
        config,
        Arc::new(udir_core::InMemoryDirectory::new()),
        Arc::new(udir_core::NoopEventSink),
    ) {
        Ok(state) => state,
        Err(e) => panic!("test configuration is invalid: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_auth_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        for expected in [
            "/api/v1/auth/login",
            "/api/v1/auth/authorize",
            "/api/v1/auth/recover",
            "/api/v1/auth/reset-password",
            "/api/v1/auth/change-password",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {expected}"
            );
        }
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.schemas.contains_key("LoginResponse"));
        assert!(!components.schemas.contains_key("RecoveryResponse"));
    }
}
