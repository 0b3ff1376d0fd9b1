//! Post-commit audit outbox.
//!
//! The ledger hands entries to an [`AuditTrail`] after its transaction has
//! committed. The trail never blocks and never fails the caller: entries go
//! into a bounded channel drained by an [`AuditWorker`], which appends them
//! to the audit store, retrying while the store is unreachable. Delivery is
//! at-least-once effort, not guaranteed. An entry is lost when the queue is
//! full, when the store rejects it, or when its retries run out; each case is
//! counted in [`AuditStats`] and logged.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::cache::{LOGS_PREFIX, ResponseCache};

use super::retry::RetryPolicy;
use super::store::AuditStore;
use super::types::AuditEntry;

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of outbox counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    pub enqueued: u64,
    pub delivered: u64,
    pub retried: u64,
    pub dropped: u64,
}

/// Cloneable sending side of the audit outbox.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    tx: mpsc::Sender<AuditEntry>,
    counters: Arc<Counters>,
}

impl AuditTrail {
    /// Create a trail and the receiver its worker drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AuditEntry>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                counters: Arc::new(Counters::default()),
            },
            rx,
        )
    }

    /// Create a trail and spawn its worker on the current runtime.
    pub fn spawn(
        capacity: usize,
        store: Arc<dyn AuditStore>,
        cache: Arc<dyn ResponseCache>,
        policy: RetryPolicy,
    ) -> (Self, JoinHandle<()>) {
        let (trail, rx) = Self::new(capacity);
        let worker = AuditWorker::new(store, cache, policy, &trail);
        let handle = tokio::spawn(worker.run(rx));
        (trail, handle)
    }

    /// Queue an entry for delivery. Drops it (with a warning) if the queue
    /// is full or the worker is gone.
    pub fn record(&self, entry: AuditEntry) {
        match self.tx.try_send(entry) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(entry)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    audit_id = %entry.id,
                    action = %entry.action,
                    "audit queue full, entry dropped"
                );
            }
            Err(TrySendError::Closed(entry)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    audit_id = %entry.id,
                    action = %entry.action,
                    "audit worker stopped, entry dropped"
                );
            }
        }
    }

    pub fn stats(&self) -> AuditStats {
        AuditStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Background consumer of the audit outbox.
pub struct AuditWorker {
    store: Arc<dyn AuditStore>,
    cache: Arc<dyn ResponseCache>,
    policy: RetryPolicy,
    counters: Arc<Counters>,
}

impl AuditWorker {
    pub fn new(
        store: Arc<dyn AuditStore>,
        cache: Arc<dyn ResponseCache>,
        policy: RetryPolicy,
        trail: &AuditTrail,
    ) -> Self {
        Self {
            store,
            cache,
            policy,
            counters: Arc::clone(&trail.counters),
        }
    }

    /// Run until every `AuditTrail` clone is dropped and the queue is drained.
    pub async fn run(self, mut rx: mpsc::Receiver<AuditEntry>) {
        tracing::info!("audit worker started");

        while let Some(entry) = rx.recv().await {
            self.deliver(entry).await;
        }

        tracing::info!("audit channel closed, worker stopping");
    }

    async fn deliver(&self, entry: AuditEntry) {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.store.append(entry.clone()).await {
                Ok(()) => {
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    self.cache.invalidate_prefix(LOGS_PREFIX);
                    tracing::debug!(
                        audit_id = %entry.id,
                        action = %entry.action,
                        attempts,
                        "audit entry recorded"
                    );
                    return;
                }
                Err(err) if err.is_retryable() && self.policy.should_retry(attempts) => {
                    self.counters.retried.fetch_add(1, Ordering::Relaxed);
                    let delay = self.policy.delay_for_attempt(attempts);
                    tracing::warn!(
                        audit_id = %entry.id,
                        attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "audit append failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        audit_id = %entry.id,
                        action = %entry.action,
                        user_id = ?entry.user_id,
                        attempts,
                        error = %err,
                        "audit append failed, entry dropped"
                    );
                    return;
                }
            }
        }
    }
}
