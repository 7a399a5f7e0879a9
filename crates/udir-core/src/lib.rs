//! udir core - Domain models, traits, and shared types
//!
//! This crate defines the abstractions the authentication service is built on:
//! - User records and the role partitions they live in
//! - Opaque password credentials
//! - The user directory gateway trait and an in-memory implementation
//! - The change-notification event sink
//! - Out-of-band delivery of recovery tokens
//! - Configuration management

pub mod config;
pub mod directory;
pub mod events;
pub mod notify;

pub use config::{AppConfig, AuthConfig, ConfigError, DirectoryConfig, LoggingConfig, ServerConfig};
pub use directory::{DirectoryError, InMemoryDirectory, UserDirectory};
pub use events::{EventAction, EventError, EventSink, LogEventSink, NoopEventSink, UserEvent};
pub use notify::{
    InMemoryNotifier, LogRecoveryNotifier, NotifyError, RecoveryNotice, RecoveryNotifier,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Roles and partitions
// ============================================================================

/// User role, one per directory partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Professor,
    Administrator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Professor => "professor",
            Self::Administrator => "administrator",
        }
    }

    /// Partition descriptor for this role
    pub fn partition(&self) -> &'static Partition {
        match self {
            Self::Student => &PARTITIONS[0],
            Self::Professor => &PARTITIONS[1],
            Self::Administrator => &PARTITIONS[2],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "professor" => Ok(Self::Professor),
            "administrator" | "admin" => Ok(Self::Administrator),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Returned when a role tag does not name a partition
#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

/// Shape of the role-specific part of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileShape {
    /// Requires a `major`
    Major,
    /// Requires a `department`
    Department,
    /// No role-specific fields
    Bare,
}

/// Describes where records of one role are stored and what they look like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub role: Role,
    /// Backing collection name
    pub collection: &'static str,
    pub shape: ProfileShape,
}

/// All partitions, in lookup priority order.
///
/// Cross-partition searches walk this table front to back and stop at the
/// first match.
pub static PARTITIONS: [Partition; 3] = [
    Partition {
        role: Role::Student,
        collection: "students",
        shape: ProfileShape::Major,
    },
    Partition {
        role: Role::Professor,
        collection: "professors",
        shape: ProfileShape::Department,
    },
    Partition {
        role: Role::Administrator,
        collection: "admins",
        shape: ProfileShape::Bare,
    },
];

// ============================================================================
// Records
// ============================================================================

/// Opaque record identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Account status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
}

/// Role-specific record fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Profile {
    Student { major: String },
    Professor { department: String },
    Administrator,
}

impl Profile {
    pub fn role(&self) -> Role {
        match self {
            Self::Student { .. } => Role::Student,
            Self::Professor { .. } => Role::Professor,
            Self::Administrator => Role::Administrator,
        }
    }
}

/// Salted one-way password hash in PHC string format.
///
/// The wrapped string is never printed: `Debug` is redacted and the type does
/// not implement `Display` or `Serialize`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap an already-computed PHC string
    pub fn from_phc(phc: impl Into<String>) -> Self {
        Self(phc.into())
    }

    pub fn as_phc(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// A user as stored by the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub credential: Credential,
    pub status: UserStatus,
    pub profile: Profile,
}

impl UserRecord {
    pub fn role(&self) -> Role {
        self.profile.role()
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Lowercase and trim an email for lookups and storage
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
