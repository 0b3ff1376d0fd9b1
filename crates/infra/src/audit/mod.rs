//! Audit trail: an independent append-only log of mutating actions, written
//! after the stock transaction commits and never joined with it.

pub mod outbox;
pub mod postgres;
pub mod retry;
pub mod store;
pub mod types;

pub use outbox::{AuditStats, AuditTrail, AuditWorker};
pub use postgres::PostgresAuditStore;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use store::{AuditStore, AuditStoreError, InMemoryAuditStore};
pub use types::{AuditAction, AuditEntry, RequestMeta};
