//! User directory gateway
//!
//! The authentication core reads user records and replaces stored credentials
//! through [`UserDirectory`]. Durable storage lives behind this trait; the
//! in-memory implementation here backs tests and single-process deployments.

use crate::{normalize_email, Credential, Role, UserId, UserRecord, PARTITIONS};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Gateway errors
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("User not found")]
    NotFound,

    #[error("Email already exists")]
    Duplicate,

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Lookup and update of user records across role partitions
///
/// Implementations must apply `update_credential` atomically per record.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a user by email within one role partition
    async fn find_by_email(
        &self,
        email: &str,
        role: Role,
    ) -> Result<Option<UserRecord>, DirectoryError>;

    /// Replace the stored credential of a user
    async fn update_credential(
        &self,
        id: UserId,
        role: Role,
        credential: Credential,
    ) -> Result<(), DirectoryError>;

    /// Store a new record in the partition named by its profile
    ///
    /// Returns `Duplicate` when the email is already in that partition.
    async fn insert(&self, record: UserRecord) -> Result<UserRecord, DirectoryError>;
}

/// In-memory directory with one map per partition, keyed by normalized email
#[derive(Default)]
pub struct InMemoryDirectory {
    partitions: RwLock<HashMap<Role, HashMap<String, UserRecord>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        let mut partitions = HashMap::new();
        for partition in PARTITIONS.iter() {
            partitions.insert(partition.role, HashMap::new());
        }
        Self {
            partitions: RwLock::new(partitions),
        }
    }

    /// Number of records across all partitions
    pub async fn len(&self) -> usize {
        self.partitions.read().await.values().map(HashMap::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn find_by_email(
        &self,
        email: &str,
        role: Role,
    ) -> Result<Option<UserRecord>, DirectoryError> {
        let key = normalize_email(email);
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(&role)
            .and_then(|records| records.get(&key))
            .cloned())
    }

    async fn update_credential(
        &self,
        id: UserId,
        role: Role,
        credential: Credential,
    ) -> Result<(), DirectoryError> {
        let mut partitions = self.partitions.write().await;
        let record = partitions
            .get_mut(&role)
            .and_then(|records| records.values_mut().find(|r| r.id == id))
            .ok_or(DirectoryError::NotFound)?;
        record.credential = credential;
        Ok(())
    }

    async fn insert(&self, mut record: UserRecord) -> Result<UserRecord, DirectoryError> {
        record.email = normalize_email(&record.email);
        let mut partitions = self.partitions.write().await;
        let records = partitions.entry(record.role()).or_default();
        if records.contains_key(&record.email) {
            return Err(DirectoryError::Duplicate);
        }
        records.insert(record.email.clone(), record.clone());
        Ok(record)
    }
}
