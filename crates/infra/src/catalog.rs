//! Product catalog writes: create, rename/reprice, delete.
//!
//! These never touch `current_stock`. Like the ledger, each successful write
//! is audited and invalidates the cached product views before returning.
//! Movement listings embed the product's name and code, so they are
//! invalidated too.

use serde_json::json;
use thiserror::Error;
use tracing::instrument;

use stockroom_auth::Actor;
use stockroom_core::{DomainError, ProductId};
use stockroom_inventory::{NewProduct, Product, ProductPatch};

use crate::audit::{AuditAction, AuditEntry, AuditTrail, RequestMeta};
use crate::cache::{PRODUCTS_PREFIX, ResponseCache, STOCK_TRANSACTIONS_PREFIX, product_detail_key};
use crate::ledger::ErrorCategory;
use crate::stock_store::{StockStore, StockStoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error("{0}")]
    Store(#[from] StockStoreError),
}

impl CatalogError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CatalogError::Invalid(_) => ErrorCategory::Validation,
            CatalogError::Store(err) => err.category(),
        }
    }
}

pub struct ProductCatalog<S, C> {
    store: S,
    cache: C,
    audit: AuditTrail,
}

impl<S, C> ProductCatalog<S, C>
where
    S: StockStore,
    C: ResponseCache,
{
    pub fn new(store: S, cache: C, audit: AuditTrail) -> Self {
        Self {
            store,
            cache,
            audit,
        }
    }

    #[instrument(skip(self, product, actor, meta), fields(code = %product.code), err)]
    pub async fn create(
        &self,
        product: NewProduct,
        actor: &Actor,
        meta: &RequestMeta,
    ) -> Result<Product, CatalogError> {
        product.validate()?;
        let created = self.store.create_product(product).await?;

        self.after_write(actor, meta, AuditAction::AddProduct, &created, json!({}));
        Ok(created)
    }

    #[instrument(skip(self, patch, actor, meta), fields(product_id = %id), err)]
    pub async fn update(
        &self,
        id: ProductId,
        patch: ProductPatch,
        actor: &Actor,
        meta: &RequestMeta,
    ) -> Result<Product, CatalogError> {
        patch.validate()?;
        let changes = json!({
            "code": patch.code,
            "name": patch.name,
            "priceCents": patch.price_cents,
        });
        let updated = self.store.update_product(id, patch).await?;

        self.after_write(actor, meta, AuditAction::UpdateProduct, &updated, json!({ "changes": changes }));
        Ok(updated)
    }

    /// Fails with a `Constraint` store error while movements reference the product.
    #[instrument(skip(self, actor, meta), fields(product_id = %id), err)]
    pub async fn delete(
        &self,
        id: ProductId,
        actor: &Actor,
        meta: &RequestMeta,
    ) -> Result<Product, CatalogError> {
        let deleted = self.store.delete_product(id).await?;

        self.after_write(actor, meta, AuditAction::DeleteProduct, &deleted, json!({}));
        Ok(deleted)
    }

    fn after_write(
        &self,
        actor: &Actor,
        meta: &RequestMeta,
        action: AuditAction,
        product: &Product,
        mut details: serde_json::Value,
    ) {
        if let Some(map) = details.as_object_mut() {
            map.insert("productId".to_string(), json!(product.id));
            map.insert("productCode".to_string(), json!(product.code));
            map.insert("productName".to_string(), json!(product.name));
        }
        self.audit.record(AuditEntry::new(actor, action, details, meta));

        self.cache.invalidate_prefix(PRODUCTS_PREFIX);
        self.cache.invalidate(&product_detail_key(product.id));
        if action != AuditAction::AddProduct {
            self.cache.invalidate_prefix(STOCK_TRANSACTIONS_PREFIX);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cache::{CachedResponse, InMemoryResponseCache};
    use crate::stock_store::InMemoryStockStore;
    use stockroom_auth::Role;
    use stockroom_core::UserId;

    fn catalog() -> (
        ProductCatalog<InMemoryStockStore, Arc<InMemoryResponseCache>>,
        Arc<InMemoryResponseCache>,
        tokio::sync::mpsc::Receiver<AuditEntry>,
    ) {
        let cache = Arc::new(InMemoryResponseCache::new());
        let (trail, rx) = AuditTrail::new(16);
        (
            ProductCatalog::new(InMemoryStockStore::new(), cache.clone(), trail),
            cache,
            rx,
        )
    }

    fn admin() -> Actor {
        Actor::new(UserId::new(1), "root", Role::ADMIN)
    }

    #[tokio::test]
    async fn create_audits_and_invalidates_product_views() {
        let (catalog, cache, mut rx) = catalog();
        let generation = cache.generation();
        cache.insert_if_fresh(
            "/api/products".to_string(),
            CachedResponse {
                content_type: None,
                body: b"[]".to_vec(),
            },
            generation,
        );

        let product = catalog
            .create(
                NewProduct {
                    code: "SKU-9".to_string(),
                    name: "Bolt".to_string(),
                    price_cents: 25,
                },
                &admin(),
                &RequestMeta::default(),
            )
            .await
            .unwrap();

        assert_eq!(product.current_stock, 0);
        assert!(cache.is_empty());
        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.action, "Add Product");
        assert_eq!(entry.details["productCode"], "SKU-9");
    }

    #[tokio::test]
    async fn rename_invalidates_cached_movement_listings() {
        let (catalog, cache, _rx) = catalog();
        let product = catalog
            .create(
                NewProduct {
                    code: "SKU-1".to_string(),
                    name: "Old".to_string(),
                    price_cents: 10,
                },
                &admin(),
                &RequestMeta::default(),
            )
            .await
            .unwrap();

        let generation = cache.generation();
        let listing = CachedResponse {
            content_type: None,
            body: br#"[{"productName":"Old"}]"#.to_vec(),
        };
        cache.insert_if_fresh("/api/stock/transactions".to_string(), listing.clone(), generation);
        cache.insert_if_fresh(
            format!("/api/stock/transactions/product/{}", product.id),
            listing,
            generation,
        );
        assert_eq!(cache.len(), 2);

        catalog
            .update(
                product.id,
                ProductPatch {
                    name: Some("New".to_string()),
                    ..ProductPatch::default()
                },
                &admin(),
                &RequestMeta::default(),
            )
            .await
            .unwrap();

        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_store() {
        let (catalog, _cache, mut rx) = catalog();
        let err = catalog
            .create(
                NewProduct {
                    code: " ".to_string(),
                    name: "Bolt".to_string(),
                    price_cents: 25,
                },
                &admin(),
                &RequestMeta::default(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(rx.try_recv().is_err());
    }
}
