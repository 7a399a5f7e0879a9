//! Change notifications
//!
//! User lifecycle changes are announced through an [`EventSink`]. Delivery is
//! best effort: callers log publish failures and carry on.

use crate::{Role, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What happened to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Created,
    PasswordChanged,
    PasswordReset,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::PasswordChanged => "password_changed",
            Self::PasswordReset => "password_reset",
        }
    }
}

/// A user lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEvent {
    pub user_id: UserId,
    pub role: Role,
    pub action: EventAction,
    pub occurred_at: DateTime<Utc>,
}

impl UserEvent {
    pub fn new(user_id: UserId, role: Role, action: EventAction) -> Self {
        Self {
            user_id,
            role,
            action,
            occurred_at: Utc::now(),
        }
    }

    /// Topic-style routing key: `<role>.<id>.<action>`
    pub fn routing_key(&self) -> String {
        format!(
            "{}.{}.{}",
            self.role.as_str(),
            self.user_id,
            self.action.as_str()
        )
    }

    /// Human-readable summary carried as the message body
    pub fn message(&self) -> String {
        let action = match self.action {
            EventAction::Created => "created",
            EventAction::PasswordChanged => "changed password",
            EventAction::PasswordReset => "reset password",
        };
        format!("{} {} {}", self.role.as_str(), self.user_id, action)
    }
}

/// Event publication errors
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to encode event: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Destination for user lifecycle events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: UserEvent) -> Result<(), EventError>;
}

/// Emits events as structured log records under the `events` target
#[derive(Debug, Default, Clone)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn publish(&self, event: UserEvent) -> Result<(), EventError> {
        let payload = serde_json::to_string(&event)?;
        tracing::info!(
            target: "events",
            routing_key = %event.routing_key(),
            payload = %payload,
            "{}",
            event.message()
        );
        Ok(())
    }
}

/// Discards every event
#[derive(Debug, Default, Clone)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn publish(&self, _event: UserEvent) -> Result<(), EventError> {
        Ok(())
    }
}
