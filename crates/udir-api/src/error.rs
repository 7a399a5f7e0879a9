//! API error handling

use crate::auth::AuthError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Auth(AuthError),
    /// Missing or unusable Authorization header
    Unauthorized(String),
    Forbidden(String),
    /// Request body could not be decoded
    BadRequest(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Auth(err) => match err {
                AuthError::InvalidCredentials
                | AuthError::TokenMalformed
                | AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
                AuthError::WrongTokenKind => StatusCode::FORBIDDEN,
                AuthError::NotFound => StatusCode::NOT_FOUND,
                AuthError::EmailTaken => StatusCode::CONFLICT,
                AuthError::Validation(_) => StatusCode::BAD_REQUEST,
                AuthError::DependencyUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            AppError::Auth(AuthError::Internal(msg)) => {
                tracing::error!(error = %msg, "Internal authentication error");
                ApiError::new("INTERNAL_ERROR", "Internal server error")
            }
            AppError::Auth(AuthError::Validation(msg)) => {
                ApiError::new("VALIDATION_ERROR", "Validation failed").with_details(msg)
            }
            AppError::Auth(err) => ApiError::new(err.code(), err.to_string()),
            AppError::Unauthorized(msg) => ApiError::new("UNAUTHORIZED", msg),
            AppError::Forbidden(msg) => ApiError::new("FORBIDDEN", msg),
            AppError::BadRequest(msg) => ApiError::new("BAD_REQUEST", msg),
        };

        (status, Json(error)).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonSyntaxError(_) => "Invalid JSON syntax in request body".to_string(),
            JsonRejection::JsonDataError(err) => format!("Invalid request data: {}", err.body_text()),
            JsonRejection::MissingJsonContentType(_) => {
                "Request must have Content-Type: application/json".to_string()
            }
            other => other.body_text(),
        };
        AppError::BadRequest(message)
    }
}
