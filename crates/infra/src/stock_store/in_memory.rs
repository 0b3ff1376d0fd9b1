use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use stockroom_core::{MovementId, ProductId};
use stockroom_inventory::{
    MovementKind, NewMovement, NewProduct, Product, ProductPatch, StockMovement,
};

use super::r#trait::{
    MovementFilter, MovementView, StockStore, StockStoreError, StockTransaction,
};

/// A failure the in-memory store can be told to produce once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StockFault {
    /// Next `write_stock` fails.
    StockWrite,
    /// Next `append_movement` fails.
    MovementAppend,
    /// Next `commit` fails after everything was staged.
    Commit,
}

#[derive(Debug)]
struct ProductRow {
    product: Product,
    lock: Arc<RowLock<()>>,
}

#[derive(Debug, Default)]
struct Tables {
    products: BTreeMap<ProductId, ProductRow>,
    movements: Vec<StockMovement>,
}

#[derive(Debug)]
struct Shared {
    tables: RwLock<Tables>,
    next_product_id: AtomicI64,
    next_movement_id: AtomicI64,
    faults: Mutex<Vec<StockFault>>,
}

impl Shared {
    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StockStoreError> {
        self.tables
            .read()
            .map_err(|_| StockStoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StockStoreError> {
        self.tables
            .write()
            .map_err(|_| StockStoreError::Backend("lock poisoned".to_string()))
    }

    /// Consume an injected fault if one is armed.
    fn trip(&self, fault: StockFault) -> Result<(), StockStoreError> {
        let mut faults = self
            .faults
            .lock()
            .map_err(|_| StockStoreError::Backend("lock poisoned".to_string()))?;
        if let Some(pos) = faults.iter().position(|f| *f == fault) {
            faults.remove(pos);
            return Err(StockStoreError::Backend(format!("injected fault: {fault:?}")));
        }
        Ok(())
    }

    fn row_lock(&self, id: ProductId) -> Result<Option<Arc<RowLock<()>>>, StockStoreError> {
        Ok(self.read()?.products.get(&id).map(|row| Arc::clone(&row.lock)))
    }
}

/// In-memory quantity store and movement log.
///
/// Each product carries its own async row lock, so transactions on the same
/// product queue up while unrelated products proceed in parallel. Writes are
/// staged inside the transaction and applied under one table write lock at
/// commit. Intended for tests/dev.
#[derive(Debug, Clone)]
pub struct InMemoryStockStore {
    shared: Arc<Shared>,
}

impl Default for InMemoryStockStore {
    fn default() -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                next_product_id: AtomicI64::new(1),
                next_movement_id: AtomicI64::new(1),
                faults: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot fault for the next matching operation.
    pub fn inject_fault(&self, fault: StockFault) {
        if let Ok(mut faults) = self.shared.faults.lock() {
            faults.push(fault);
        }
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, StockStoreError> {
        Ok(Box::new(InMemoryStockTransaction {
            shared: Arc::clone(&self.shared),
            locks: HashMap::new(),
            stock_writes: HashMap::new(),
            movements: Vec::new(),
        }))
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product, StockStoreError> {
        let code = product.code.trim().to_string();
        let mut tables = self.shared.write()?;

        if tables.products.values().any(|row| row.product.code == code) {
            return Err(StockStoreError::Conflict(format!(
                "product code '{code}' already exists"
            )));
        }

        let id = ProductId::new(self.shared.next_product_id.fetch_add(1, Ordering::SeqCst));
        let now = Utc::now();
        let created = Product {
            id,
            code,
            name: product.name.trim().to_string(),
            price_cents: product.price_cents,
            current_stock: 0,
            created_at: now,
            updated_at: now,
        };
        tables.products.insert(
            id,
            ProductRow {
                product: created.clone(),
                lock: Arc::new(RowLock::new(())),
            },
        );
        Ok(created)
    }

    async fn update_product(&self, id: ProductId, patch: ProductPatch) -> Result<Product, StockStoreError> {
        let mut tables = self.shared.write()?;

        if let Some(code) = patch.code.as_deref().map(str::trim) {
            let taken = tables
                .products
                .values()
                .any(|row| row.product.id != id && row.product.code == code);
            if taken {
                return Err(StockStoreError::Conflict(format!(
                    "product code '{code}' already exists"
                )));
            }
        }

        let row = tables
            .products
            .get_mut(&id)
            .ok_or_else(|| StockStoreError::NotFound(format!("product {id}")))?;
        // Stock is written by committing transactions only; keep whatever is current.
        row.product = patch.apply(&row.product, Utc::now());
        Ok(row.product.clone())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StockStoreError> {
        Ok(self
            .shared
            .read()?
            .products
            .get(&id)
            .map(|row| row.product.clone()))
    }

    async fn list_products(&self) -> Result<Vec<Product>, StockStoreError> {
        let mut products: Vec<Product> = self
            .shared
            .read()?
            .products
            .values()
            .map(|row| row.product.clone())
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn delete_product(&self, id: ProductId) -> Result<Product, StockStoreError> {
        let lock = self
            .shared
            .row_lock(id)?
            .ok_or_else(|| StockStoreError::NotFound(format!("product {id}")))?;
        // Wait out any in-flight ledger transaction on this product.
        let _row = lock.lock_owned().await;

        let mut tables = self.shared.write()?;
        if tables.movements.iter().any(|m| m.product_id == id) {
            return Err(StockStoreError::Constraint(format!(
                "product {id} is referenced by stock movements"
            )));
        }
        tables
            .products
            .remove(&id)
            .map(|row| row.product)
            .ok_or_else(|| StockStoreError::NotFound(format!("product {id}")))
    }

    async fn list_movements(&self, filter: MovementFilter) -> Result<Vec<MovementView>, StockStoreError> {
        let tables = self.shared.read()?;
        let mut views: Vec<MovementView> = tables
            .movements
            .iter()
            .filter(|m| filter.product_id.is_none_or(|id| m.product_id == id))
            .filter_map(|m| {
                tables.products.get(&m.product_id).map(|row| MovementView {
                    movement: m.clone(),
                    product_name: row.product.name.clone(),
                    product_code: row.product.code.clone(),
                })
            })
            .collect();
        views.sort_by(|a, b| {
            b.movement
                .recorded_at
                .cmp(&a.movement.recorded_at)
                .then(b.movement.id.cmp(&a.movement.id))
        });
        Ok(views)
    }
}

struct InMemoryStockTransaction {
    shared: Arc<Shared>,
    locks: HashMap<ProductId, OwnedMutexGuard<()>>,
    stock_writes: HashMap<ProductId, i64>,
    movements: Vec<StockMovement>,
}

#[async_trait]
impl StockTransaction for InMemoryStockTransaction {
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, StockStoreError> {
        if !self.locks.contains_key(&id) {
            let Some(lock) = self.shared.row_lock(id)? else {
                return Ok(None);
            };
            let guard = lock.lock_owned().await;
            self.locks.insert(id, guard);
        }

        let current = self.shared.read()?.products.get(&id).map(|row| row.product.clone());
        match current {
            Some(mut product) => {
                if let Some(staged) = self.stock_writes.get(&id) {
                    product.current_stock = *staged;
                }
                Ok(Some(product))
            }
            None => {
                // Deleted while we were waiting for the row.
                self.locks.remove(&id);
                Ok(None)
            }
        }
    }

    async fn write_stock(&mut self, id: ProductId, current_stock: i64) -> Result<(), StockStoreError> {
        self.shared.trip(StockFault::StockWrite)?;

        if !self.locks.contains_key(&id) {
            return Err(StockStoreError::Invariant(format!(
                "product {id} is not locked by this transaction"
            )));
        }
        if current_stock < 0 {
            return Err(StockStoreError::Invariant(format!(
                "current_stock for product {id} would be {current_stock}"
            )));
        }
        self.stock_writes.insert(id, current_stock);
        Ok(())
    }

    async fn append_movement(&mut self, movement: NewMovement) -> Result<StockMovement, StockStoreError> {
        self.shared.trip(StockFault::MovementAppend)?;

        let valid_quantity = match movement.kind {
            MovementKind::In | MovementKind::Out => movement.quantity > 0,
            MovementKind::Adjustment => movement.quantity != 0,
        };
        if !valid_quantity {
            return Err(StockStoreError::Invariant(format!(
                "{} movement with quantity {}",
                movement.kind, movement.quantity
            )));
        }
        if !self.shared.read()?.products.contains_key(&movement.product_id) {
            return Err(StockStoreError::Constraint(format!(
                "movement references unknown product {}",
                movement.product_id
            )));
        }

        let id = MovementId::new(self.shared.next_movement_id.fetch_add(1, Ordering::SeqCst));
        let stored = StockMovement::from_new(id, movement);
        self.movements.push(stored.clone());
        Ok(stored)
    }

    async fn commit(self: Box<Self>) -> Result<(), StockStoreError> {
        self.shared.trip(StockFault::Commit)?;

        let mut tables = self.shared.write()?;
        for id in self.stock_writes.keys() {
            if !tables.products.contains_key(id) {
                return Err(StockStoreError::NotFound(format!("product {id}")));
            }
        }

        let now = Utc::now();
        for (id, stock) in &self.stock_writes {
            if let Some(row) = tables.products.get_mut(id) {
                row.product.current_stock = *stock;
                row.product.updated_at = now;
            }
        }
        tables.movements.extend(self.movements.iter().cloned());
        // Row locks are released when `self` drops, after the tables are updated.
        drop(tables);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StockStoreError> {
        tracing::debug!(
            staged_writes = self.stock_writes.len(),
            staged_movements = self.movements.len(),
            "in-memory transaction rolled back"
        );
        Ok(())
    }
}
