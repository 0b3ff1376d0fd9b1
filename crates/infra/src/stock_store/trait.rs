use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use stockroom_core::ProductId;
use stockroom_inventory::{NewMovement, NewProduct, Product, ProductPatch, StockMovement};

/// Quantity store / movement log operation error.
///
/// These are storage-level outcomes. Business rejections (insufficient stock,
/// negative adjustments) are decided above the store by the ledger.
///
/// - **NotFound**: the addressed row does not exist
/// - **Conflict**: a uniqueness constraint was hit (duplicate product code)
/// - **Constraint**: the row is still referenced (product with movements)
/// - **Invariant**: a write would break a storage invariant (negative stock,
///   writing a row that was never locked)
/// - **Backend**: the store itself failed (connection, pool, injected fault)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockStoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Filter for movement listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MovementFilter {
    pub product_id: Option<ProductId>,
}

impl MovementFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
        }
    }
}

/// A movement joined with the product it belongs to, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementView {
    pub movement: StockMovement,
    pub product_name: String,
    pub product_code: String,
}

/// One ledger unit of work against the quantity store and the movement log.
///
/// Everything written through a transaction becomes visible at `commit` or
/// not at all. Dropping a transaction without committing rolls it back and
/// releases every row lock it holds.
#[async_trait]
pub trait StockTransaction: Send {
    /// Read a product for update.
    ///
    /// The row stays locked until the transaction ends; concurrent
    /// transactions locking the same product wait here. Returns `None` when
    /// the product does not exist.
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, StockStoreError>;

    /// Stage a new stock quantity for a product locked by this transaction.
    async fn write_stock(&mut self, id: ProductId, current_stock: i64) -> Result<(), StockStoreError>;

    /// Stage a movement row. The returned movement carries its assigned id.
    async fn append_movement(&mut self, movement: NewMovement) -> Result<StockMovement, StockStoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StockStoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StockStoreError>;
}

/// Authoritative product quantities plus the append-only movement log.
///
/// `current_stock` is only ever changed through a [`StockTransaction`];
/// the catalog operations here never touch it.
#[async_trait]
pub trait StockStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, StockStoreError>;

    /// Register a product with `current_stock = 0`.
    async fn create_product(&self, product: NewProduct) -> Result<Product, StockStoreError>;

    /// Update descriptive fields only.
    async fn update_product(&self, id: ProductId, patch: ProductPatch) -> Result<Product, StockStoreError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StockStoreError>;

    async fn list_products(&self) -> Result<Vec<Product>, StockStoreError>;

    /// Delete a product that no movement references. Returns the removed row.
    async fn delete_product(&self, id: ProductId) -> Result<Product, StockStoreError>;

    /// Movements, newest first.
    async fn list_movements(&self, filter: MovementFilter) -> Result<Vec<MovementView>, StockStoreError>;
}

#[async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, StockStoreError> {
        (**self).begin().await
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product, StockStoreError> {
        (**self).create_product(product).await
    }

    async fn update_product(&self, id: ProductId, patch: ProductPatch) -> Result<Product, StockStoreError> {
        (**self).update_product(id, patch).await
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StockStoreError> {
        (**self).get_product(id).await
    }

    async fn list_products(&self) -> Result<Vec<Product>, StockStoreError> {
        (**self).list_products().await
    }

    async fn delete_product(&self, id: ProductId) -> Result<Product, StockStoreError> {
        (**self).delete_product(id).await
    }

    async fn list_movements(&self, filter: MovementFilter) -> Result<Vec<MovementView>, StockStoreError> {
        (**self).list_movements(filter).await
    }
}
