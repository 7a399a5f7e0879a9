//! Security audit logging for credential events
//!
//! Every login, registration, recovery, password change and authorization
//! decision is recorded at INFO level under the "audit" target so it can be
//! routed apart from application logs. Plaintext passwords and tokens never
//! appear in an event.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use udir_core::Role;

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    LoginSuccess {
        email: String,
        role: Role,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    LoginFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    RegistrationSuccess {
        user_id: String,
        email: String,
        role: Role,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    RegistrationFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Recovery token requested, whether or not the email exists
    RecoveryRequested {
        email: String,
        issued: bool,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    PasswordReset {
        success: bool,
        failure_reason: Option<String>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    PasswordChange {
        email: String,
        success: bool,
        failure_reason: Option<String>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// A role check did not pass
    AccessDenied {
        email: Option<String>,
        required_role: Role,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    InvalidToken {
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },
}

impl AuditEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::LoginSuccess { .. } => "login_success",
            Self::LoginFailure { .. } => "login_failure",
            Self::RegistrationSuccess { .. } => "registration_success",
            Self::RegistrationFailure { .. } => "registration_failure",
            Self::RecoveryRequested { .. } => "recovery_requested",
            Self::PasswordReset { .. } => "password_reset",
            Self::PasswordChange { .. } => "password_change",
            Self::AccessDenied { .. } => "access_denied",
            Self::InvalidToken { .. } => "invalid_token",
        }
    }

    fn ip_address(&self) -> Option<&str> {
        match self {
            Self::LoginSuccess { ip_address, .. }
            | Self::LoginFailure { ip_address, .. }
            | Self::RegistrationSuccess { ip_address, .. }
            | Self::RegistrationFailure { ip_address, .. }
            | Self::RecoveryRequested { ip_address, .. }
            | Self::PasswordReset { ip_address, .. }
            | Self::PasswordChange { ip_address, .. }
            | Self::AccessDenied { ip_address, .. }
            | Self::InvalidToken { ip_address, .. } => ip_address.as_deref(),
        }
    }
}

/// Request metadata attached to audit events
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditContext {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Log a security audit event
///
/// The full event is serialized to JSON in the `event` field, for example:
///
/// ```json
/// {
///   "event_type": "login_failure",
///   "email": "a@x.com",
///   "reason": "INVALID_CREDENTIALS",
///   "ip_address": "203.0.113.1",
///   "user_agent": "curl/8.0"
/// }
/// ```
pub fn audit_log(event: &AuditEvent) {
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    info!(
        target: "audit",
        timestamp = %Utc::now(),
        event_type = event.event_type(),
        ip_address = ?event.ip_address(),
        event = %event_json,
        "Security audit event"
    );
}

/// Extract the client IP from proxy headers
///
/// Takes the first hop of X-Forwarded-For, then X-Real-IP.
pub fn extract_ip_address(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(first_ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(first_ip.to_string());
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
}

pub fn extract_user_agent(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}
