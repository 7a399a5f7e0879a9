//! Recovery token delivery
//!
//! A recovery token proves control of the account's mailbox, so it travels to
//! the user out-of-band through a [`RecoveryNotifier`] and never in the reply
//! to the request that asked for it.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::RwLock;

/// A recovery token addressed to one user
#[derive(Clone, PartialEq, Eq)]
pub struct RecoveryNotice {
    pub email: String,
    pub token: String,
    pub expires_in: u64,
}

impl fmt::Debug for RecoveryNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryNotice")
            .field("email", &self.email)
            .field("token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Delivery channel unavailable: {0}")]
    Unavailable(String),
}

/// Out-of-band channel to the account owner
#[async_trait]
pub trait RecoveryNotifier: Send + Sync {
    async fn deliver(&self, notice: RecoveryNotice) -> Result<(), NotifyError>;
}

/// Development delivery: writes the notice to the `notifications` target
///
/// The token is only emitted at debug level so default filters keep it out
/// of shared logs.
#[derive(Debug, Default, Clone)]
pub struct LogRecoveryNotifier;

#[async_trait]
impl RecoveryNotifier for LogRecoveryNotifier {
    async fn deliver(&self, notice: RecoveryNotice) -> Result<(), NotifyError> {
        tracing::info!(
            target: "notifications",
            email = %notice.email,
            expires_in = notice.expires_in,
            "Recovery instructions sent"
        );
        tracing::debug!(
            target: "notifications",
            email = %notice.email,
            token = %notice.token,
            "Recovery token"
        );
        Ok(())
    }
}

/// Keeps every delivered notice in memory, newest last
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    outbox: RwLock<Vec<RecoveryNotice>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent notice sent to `email`
    pub async fn latest_for(&self, email: &str) -> Option<RecoveryNotice> {
        self.outbox
            .read()
            .await
            .iter()
            .rev()
            .find(|notice| notice.email == email)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.outbox.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RecoveryNotifier for InMemoryNotifier {
    async fn deliver(&self, notice: RecoveryNotice) -> Result<(), NotifyError> {
        self.outbox.write().await.push(notice);
        Ok(())
    }
}
