//! Store, cache and audit wiring shared by every handler.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use stockroom_infra::audit::{AuditStore, AuditTrail, InMemoryAuditStore, PostgresAuditStore, RetryPolicy};
use stockroom_infra::cache::{InMemoryResponseCache, ResponseCache};
use stockroom_infra::stock_store::{InMemoryStockStore, PostgresStockStore, StockStore};
use stockroom_infra::{ProductCatalog, StockLedger};

use crate::config::AppConfig;

pub type SharedStore = Arc<dyn StockStore>;
pub type SharedCache = Arc<dyn ResponseCache>;

pub struct AppServices {
    store: SharedStore,
    cache: SharedCache,
    audit_store: Arc<dyn AuditStore>,
    audit: AuditTrail,
    ledger: StockLedger<SharedStore, SharedCache>,
    catalog: ProductCatalog<SharedStore, SharedCache>,
}

impl AppServices {
    /// Wire the services and spawn the audit worker on the current runtime.
    pub fn new(
        store: SharedStore,
        cache: SharedCache,
        audit_store: Arc<dyn AuditStore>,
        audit_queue_capacity: usize,
        retry: RetryPolicy,
    ) -> Self {
        let (audit, _worker) =
            AuditTrail::spawn(audit_queue_capacity, audit_store.clone(), cache.clone(), retry);

        Self {
            ledger: StockLedger::new(store.clone(), cache.clone(), audit.clone()),
            catalog: ProductCatalog::new(store.clone(), cache.clone(), audit.clone()),
            store,
            cache,
            audit_store,
            audit,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn audit_store(&self) -> &Arc<dyn AuditStore> {
        &self.audit_store
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn ledger(&self) -> &StockLedger<SharedStore, SharedCache> {
        &self.ledger
    }

    pub fn catalog(&self) -> &ProductCatalog<SharedStore, SharedCache> {
        &self.catalog
    }
}

/// Postgres-backed stores where a URL is configured, in-memory otherwise.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store: SharedStore = match &config.database_url {
        Some(url) => {
            let pool = connect(url).await.context("failed to connect to the stock database")?;
            let store = PostgresStockStore::new(pool);
            store.migrate().await.context("failed to migrate the stock database")?;
            tracing::info!("using postgres stock store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; stock data lives in memory and is lost on restart");
            Arc::new(InMemoryStockStore::new())
        }
    };

    let audit_store: Arc<dyn AuditStore> = match &config.audit_database_url {
        Some(url) => {
            let pool = connect(url).await.context("failed to connect to the audit database")?;
            let audit = PostgresAuditStore::new(pool);
            audit.migrate().await.context("failed to migrate the audit database")?;
            tracing::info!("using postgres audit store");
            Arc::new(audit)
        }
        None => {
            tracing::warn!("AUDIT_DATABASE_URL not set; audit log lives in memory");
            Arc::new(InMemoryAuditStore::new())
        }
    };

    Ok(AppServices::new(
        store,
        Arc::new(InMemoryResponseCache::new()),
        audit_store,
        config.audit_queue_capacity,
        config.audit_retry_policy(),
    ))
}

async fn connect(url: &str) -> Result<sqlx::PgPool, sqlx::Error> {
    PgPoolOptions::new().max_connections(10).connect(url).await
}
