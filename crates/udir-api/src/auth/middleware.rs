/// Session authentication middleware
///
/// Extracts the bearer token from the Authorization header, validates it as a
/// session token and adds the caller's identity to request extensions.
use super::service::AuthError;
use crate::audit::{audit_log, AuditContext, AuditEvent};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use udir_core::Role;

/// Identity of the caller, taken from a validated session token
///
/// Handlers behind [`auth_middleware`] extract it with
/// `Extension<AuthenticatedUser>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub email: String,
    pub role: Role,
}

/// Pull the token out of an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header format".to_string()))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header format".to_string()))
}

/// Require a valid session token
///
/// ```ignore
/// let protected = Router::new()
///     .route("/me", get(me))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?;

    let claims = match state.auth.validate_session(token) {
        Ok(claims) => claims,
        Err(e) => {
            let context = AuditContext::from_headers(request.headers());
            audit_log(&AuditEvent::InvalidToken {
                reason: e.code().to_string(),
                ip_address: context.ip_address,
                user_agent: context.user_agent,
            });
            return Err(match e {
                // A recovery token presented as a session credential
                AuthError::WrongTokenKind => AppError::Unauthorized(e.to_string()),
                other => AppError::Auth(other),
            });
        }
    };

    request.extensions_mut().insert(AuthenticatedUser {
        email: claims.email,
        role: claims.role,
    });

    Ok(next.run(request).await)
}
