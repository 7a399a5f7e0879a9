//! Token claims and public user views
//!
//! Session and recovery tokens are signed the same way. What separates them is
//! the `action` discriminant in the payload, which [`TokenClaims`] decodes into
//! distinct variants so one kind can never be read as the other.

use serde::{Deserialize, Serialize};
use udir_core::{Profile, Role, UserRecord, UserStatus};
use utoipa::ToSchema;

/// Identity carried by an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionClaims {
    pub email: String,
    #[schema(value_type = String, example = "student")]
    pub role: Role,
}

/// Payload of a password recovery token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecoveryClaims {
    pub email: String,
}

/// Every payload the service signs, tagged by `action`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TokenClaims {
    Session(SessionClaims),
    RecoverPassword(RecoveryClaims),
}

impl TokenClaims {
    pub fn kind(&self) -> TokenKind {
        match self {
            Self::Session(_) => TokenKind::Session,
            Self::RecoverPassword(_) => TokenKind::RecoverPassword,
        }
    }
}

/// Discriminant values of [`TokenClaims`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Session,
    RecoverPassword,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::RecoverPassword => "recover_password",
        }
    }
}

/// User information safe to return to callers
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub email: String,
    #[schema(value_type = String, example = "professor")]
    pub role: Role,
    #[schema(value_type = String, example = "active")]
    pub status: UserStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub major: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

impl From<&UserRecord> for UserInfo {
    fn from(record: &UserRecord) -> Self {
        let (major, department) = match &record.profile {
            Profile::Student { major } => (Some(major.clone()), None),
            Profile::Professor { department } => (None, Some(department.clone())),
            Profile::Administrator => (None, None),
        };

        Self {
            id: record.id.to_string(),
            name: record.name.clone(),
            email: record.email.clone(),
            role: record.role(),
            status: record.status,
            major,
            department,
        }
    }
}
