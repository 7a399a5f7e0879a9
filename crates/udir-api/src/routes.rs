//! API route definitions

use crate::auth::middleware::auth_middleware;
use crate::handlers::auth;
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Create API v1 routes
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes; authorize reads its bearer token itself
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/authorize", post(auth::authorize_handler))
        .route("/auth/recover", post(auth::recover_handler))
        .route("/auth/reset-password", post(auth::reset_password_handler));

    // Session-protected routes
    let protected_routes = Router::new()
        .route("/auth/change-password", post(auth::change_password_handler))
        .route("/auth/me", get(auth::me_handler))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new().merge(public_routes).merge(protected_routes)
}
