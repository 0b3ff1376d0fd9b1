use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use stockroom_core::UserId;

use super::types::AuditEntry;

/// Audit store operation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditStoreError {
    /// The store cannot be reached right now; worth retrying.
    #[error("audit store unavailable: {0}")]
    Unavailable(String),

    #[error("audit store backend error: {0}")]
    Backend(String),
}

impl AuditStoreError {
    /// Only an unreachable store is worth another attempt; a rejected write
    /// will be rejected again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuditStoreError::Unavailable(_))
    }
}

/// Independent append-only audit log.
///
/// Appends are idempotent on `AuditEntry::id`, so redelivering an entry
/// after an ambiguous failure does not duplicate it.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditStoreError>;

    /// Newest entries first.
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError>;

    /// Newest entries for one user first.
    async fn for_user(&self, user_id: UserId, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError>;
}

#[async_trait]
impl<S> AuditStore for Arc<S>
where
    S: AuditStore + ?Sized,
{
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditStoreError> {
        (**self).append(entry).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError> {
        (**self).recent(limit).await
    }

    async fn for_user(&self, user_id: UserId, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError> {
        (**self).for_user(user_id, limit).await
    }
}

/// In-memory audit store with a switch to simulate an outage.
#[derive(Debug)]
pub struct InMemoryAuditStore {
    entries: RwLock<Vec<AuditEntry>>,
    available: AtomicBool,
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While unavailable every operation fails with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> Result<(), AuditStoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AuditStoreError::Unavailable("simulated outage".to_string()))
        }
    }

    fn newest_first<F>(&self, limit: usize, keep: F) -> Result<Vec<AuditEntry>, AuditStoreError>
    where
        F: Fn(&AuditEntry) -> bool,
    {
        self.ensure_available()?;
        let entries = self
            .entries
            .read()
            .map_err(|_| AuditStoreError::Backend("lock poisoned".to_string()))?;
        let mut selected: Vec<AuditEntry> = entries.iter().filter(|e| keep(e)).cloned().collect();
        selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        selected.truncate(limit);
        Ok(selected)
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditStoreError> {
        self.ensure_available()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| AuditStoreError::Backend("lock poisoned".to_string()))?;
        if !entries.iter().any(|e| e.id == entry.id) {
            entries.push(entry);
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError> {
        self.newest_first(limit, |_| true)
    }

    async fn for_user(&self, user_id: UserId, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError> {
        self.newest_first(limit, |e| e.user_id == Some(user_id))
    }
}
