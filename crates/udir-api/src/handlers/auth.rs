//! Authentication API handlers
//!
//! HTTP endpoints for login, role authorization, password recovery and
//! password changes. Every outcome is written to the audit log.

use crate::audit::{audit_log, AuditContext, AuditEvent};
use crate::auth::{
    bearer_token, AuthError, AuthenticatedUser, AuthzResult, DenialReason, LoginRequest,
    RegisterRequest, UserInfo,
};
use crate::error::AppError;
use crate::extract::ApiJson;
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use udir_core::{normalize_email, RecoveryNotice, Role};
use utoipa::ToSchema;

/// Role check request; the token travels in the Authorization header
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeRequest {
    #[schema(value_type = String, example = "professor")]
    pub required_role: Role,
}

/// Role check outcome
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeResponse {
    pub granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecoveryRequest {
    pub email: String,
}

#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub email: String,
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Register a new user account
///
/// The profile must match the role: students need `major`, professors need
/// `department`. Emails are unique across every role.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = UserInfo),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 409, description = "Email already registered", body = crate::error::ApiError),
        (status = 503, description = "User directory unavailable", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let context = AuditContext::from_headers(&headers);
    let email = request.email.clone();

    match state.auth.register(request).await {
        Ok(user) => {
            audit_log(&AuditEvent::RegistrationSuccess {
                user_id: user.id.clone(),
                email: user.email.clone(),
                role: user.role,
                ip_address: context.ip_address,
                user_agent: context.user_agent,
            });
            Ok((StatusCode::CREATED, Json(user)))
        }
        Err(e) => {
            audit_log(&AuditEvent::RegistrationFailure {
                email,
                reason: e.to_string(),
                ip_address: context.ip_address,
                user_agent: context.user_agent,
            });
            Err(e.into())
        }
    }
}

/// Login with email and password
///
/// An unknown email and a wrong password produce the same 401 response.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = crate::auth::LoginResponse),
        (status = 401, description = "Incorrect email or password", body = crate::error::ApiError),
        (status = 503, description = "User directory unavailable", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let context = AuditContext::from_headers(&headers);
    let email = normalize_email(&request.email);

    match state.auth.login(request).await {
        Ok(response) => {
            audit_log(&AuditEvent::LoginSuccess {
                email,
                role: response.claims.role,
                ip_address: context.ip_address,
                user_agent: context.user_agent,
            });
            Ok(Json(response))
        }
        Err(e) => {
            audit_log(&AuditEvent::LoginFailure {
                email,
                reason: e.code().to_string(),
                ip_address: context.ip_address,
                user_agent: context.user_agent,
            });
            Err(e.into())
        }
    }
}

/// Check a session token against a required role
#[utoipa::path(
    post,
    path = "/api/v1/auth/authorize",
    tag = "auth",
    request_body = AuthorizeRequest,
    responses(
        (status = 200, description = "Access granted", body = AuthorizeResponse),
        (status = 401, description = "Missing bearer token", body = crate::error::ApiError),
        (status = 403, description = "Access denied", body = AuthorizeResponse),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn authorize_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<AuthorizeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = bearer_token(&headers)?;

    let response = match state.auth.authorize(token, request.required_role) {
        AuthzResult::Granted(claims) => (
            StatusCode::OK,
            Json(AuthorizeResponse {
                granted: true,
                email: Some(claims.email),
                role: Some(claims.role),
                reason: None,
            }),
        ),
        AuthzResult::Denied(reason) => {
            let context = AuditContext::from_headers(&headers);
            audit_log(&AuditEvent::AccessDenied {
                email: None,
                required_role: request.required_role,
                reason: reason.as_str().to_string(),
                ip_address: context.ip_address,
                user_agent: context.user_agent,
            });
            (
                StatusCode::FORBIDDEN,
                Json(AuthorizeResponse {
                    granted: false,
                    email: None,
                    role: None,
                    reason: Some(reason),
                }),
            )
        }
    };

    Ok(response)
}

/// Request a password recovery token
///
/// The token is delivered out-of-band to the account owner; the response
/// never carries it.
#[utoipa::path(
    post,
    path = "/api/v1/auth/recover",
    tag = "auth",
    request_body = RecoveryRequest,
    responses(
        (status = 202, description = "Recovery instructions sent", body = MessageResponse),
        (status = 404, description = "User not found", body = crate::error::ApiError),
        (status = 503, description = "Directory or delivery channel unavailable", body = crate::error::ApiError),
    )
)]
pub async fn recover_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<RecoveryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let context = AuditContext::from_headers(&headers);
    let email = normalize_email(&request.email);
    let result = state.auth.request_recovery(&email).await;

    audit_log(&AuditEvent::RecoveryRequested {
        email: email.clone(),
        issued: result.is_ok(),
        ip_address: context.ip_address,
        user_agent: context.user_agent,
    });

    let issued = result?;
    let notice = RecoveryNotice {
        email,
        token: issued.recovery_token,
        expires_in: issued.expires_in,
    };
    if let Err(e) = state.notifier.deliver(notice).await {
        tracing::error!(error = %e, "Failed to deliver recovery token");
        return Err(AuthError::DependencyUnavailable.into());
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new("Recovery instructions sent")),
    ))
}

/// Set a new password using a recovery token
#[utoipa::path(
    post,
    path = "/api/v1/auth/reset-password",
    tag = "auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Weak password", body = crate::error::ApiError),
        (status = 401, description = "Invalid or expired token", body = crate::error::ApiError),
        (status = 403, description = "Not a recovery token", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    )
)]
pub async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let context = AuditContext::from_headers(&headers);
    let result = state
        .auth
        .reset_password(&request.token, &request.new_password)
        .await;

    audit_log(&AuditEvent::PasswordReset {
        success: result.is_ok(),
        failure_reason: result.as_ref().err().map(|e| e.code().to_string()),
        ip_address: context.ip_address,
        user_agent: context.user_agent,
    });

    result?;
    Ok(Json(MessageResponse::new("Password has been reset")))
}

/// Change the caller's own password
///
/// Requires a session token whose email matches the request.
#[utoipa::path(
    post,
    path = "/api/v1/auth/change-password",
    tag = "auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Weak password", body = crate::error::ApiError),
        (status = 401, description = "Wrong current password or missing session", body = crate::error::ApiError),
        (status = 403, description = "Session belongs to another user", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let context = AuditContext::from_headers(&headers);

    if normalize_email(&request.email) != normalize_email(&user.email) {
        audit_log(&AuditEvent::AccessDenied {
            email: Some(user.email.clone()),
            required_role: user.role,
            reason: "session does not own the account".to_string(),
            ip_address: context.ip_address,
            user_agent: context.user_agent,
        });
        return Err(AppError::Forbidden(
            "Cannot change another user's password".to_string(),
        ));
    }

    let result = state
        .auth
        .change_password(&request.email, &request.old_password, &request.new_password)
        .await;

    audit_log(&AuditEvent::PasswordChange {
        email: user.email,
        success: result.is_ok(),
        failure_reason: result.as_ref().err().map(|e| e.code().to_string()),
        ip_address: context.ip_address,
        user_agent: context.user_agent,
    });

    result?;
    Ok(Json(MessageResponse::new("Password changed")))
}

/// Get the current user's profile
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user profile", body = UserInfo),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 404, description = "User no longer exists", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, AppError> {
    let record = state
        .auth
        .find_user(&user.email)
        .await?
        .ok_or(AuthError::NotFound)?;

    Ok(Json(UserInfo::from(&record)))
}
