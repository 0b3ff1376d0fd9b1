//! Postgres-backed quantity store and movement log.
//!
//! Concurrent movements on one product are serialized with a row lock
//! (`SELECT ... FOR UPDATE`) held for the life of the ledger transaction.
//! The schema backs the application rules up: `current_stock` carries a
//! `CHECK (current_stock >= 0)` and movements reference their product with
//! `ON DELETE RESTRICT`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StockStoreError | Scenario |
//! |------------|----------------------|-----------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate product code |
//! | Database (foreign key violation) | `23503` | `Constraint` | Deleting a product with movements |
//! | Database (check constraint violation) | `23514` | `Invariant` | Negative stock, zero quantity |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed | N/A | `Backend` | Connection pool was closed |
//! | Other | N/A | `Backend` | Network errors, connection failures, etc. |

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};

use stockroom_core::{MovementId, ProductId, UserId};
use stockroom_inventory::{
    MovementKind, NewMovement, NewProduct, Product, ProductPatch, StockMovement,
};

use super::r#trait::{
    MovementFilter, MovementView, StockStore, StockStoreError, StockTransaction,
};

/// Postgres-backed [`StockStore`].
///
/// `Send + Sync`; clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the `products` and `stock_movements` tables if needed.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StockStoreError> {
        sqlx::migrate!("./migrations/stock")
            .run(&*self.pool)
            .await
            .map_err(|e| StockStoreError::Backend(format!("stock schema migration failed: {e}")))
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, StockStoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresStockTransaction {
            tx,
            locked: HashSet::new(),
        }))
    }

    #[instrument(skip(self, product), fields(code = %product.code), err)]
    async fn create_product(&self, product: NewProduct) -> Result<Product, StockStoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO products (code, name, price_cents, current_stock)
            VALUES ($1, $2, $3, 0)
            RETURNING id, code, name, price_cents, current_stock, created_at, updated_at
            "#,
        )
        .bind(product.code.trim())
        .bind(product.name.trim())
        .bind(product.price_cents)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_product", e))?;

        product_from_row(&row)
    }

    #[instrument(skip(self, patch), fields(product_id = %id), err)]
    async fn update_product(&self, id: ProductId, patch: ProductPatch) -> Result<Product, StockStoreError> {
        let row = sqlx::query(
            r#"
            UPDATE products
            SET code = COALESCE($2, code),
                name = COALESCE($3, name),
                price_cents = COALESCE($4, price_cents),
                updated_at = now()
            WHERE id = $1
            RETURNING id, code, name, price_cents, current_stock, created_at, updated_at
            "#,
        )
        .bind(id.get())
        .bind(patch.code.as_deref().map(str::trim))
        .bind(patch.name.as_deref().map(str::trim))
        .bind(patch.price_cents)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;

        match row {
            Some(row) => product_from_row(&row),
            None => Err(StockStoreError::NotFound(format!("product {id}"))),
        }
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StockStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, code, name, price_cents, current_stock, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_product", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_products(&self) -> Result<Vec<Product>, StockStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, code, name, price_cents, current_stock, created_at, updated_at
            FROM products
            ORDER BY name ASC, id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn delete_product(&self, id: ProductId) -> Result<Product, StockStoreError> {
        let row = sqlx::query(
            r#"
            DELETE FROM products
            WHERE id = $1
            RETURNING id, code, name, price_cents, current_stock, created_at, updated_at
            "#,
        )
        .bind(id.get())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_product", e))?;

        match row {
            Some(row) => product_from_row(&row),
            None => Err(StockStoreError::NotFound(format!("product {id}"))),
        }
    }

    #[instrument(skip(self), fields(product_id = ?filter.product_id, movement_count), err)]
    async fn list_movements(&self, filter: MovementFilter) -> Result<Vec<MovementView>, StockStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                m.id,
                m.product_id,
                m.kind,
                m.quantity,
                m.user_id,
                m.variant_used,
                m.source_destination,
                m.notes,
                m.recorded_at,
                p.name AS product_name,
                p.code AS product_code
            FROM stock_movements m
            JOIN products p ON p.id = m.product_id
            WHERE ($1::bigint IS NULL OR m.product_id = $1)
            ORDER BY m.recorded_at DESC, m.id DESC
            "#,
        )
        .bind(filter.product_id.as_ref().map(ProductId::get))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_movements", e))?;

        let views = rows
            .iter()
            .map(|row| {
                Ok(MovementView {
                    movement: movement_from_row(row)?,
                    product_name: row.try_get("product_name").map_err(decode_error)?,
                    product_code: row.try_get("product_code").map_err(decode_error)?,
                })
            })
            .collect::<Result<Vec<_>, StockStoreError>>()?;

        Span::current().record("movement_count", views.len());
        Ok(views)
    }
}

struct PostgresStockTransaction {
    tx: Transaction<'static, Postgres>,
    locked: HashSet<ProductId>,
}

#[async_trait]
impl StockTransaction for PostgresStockTransaction {
    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, StockStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, code, name, price_cents, current_stock, created_at, updated_at
            FROM products
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_product", e))?;

        match row {
            Some(row) => {
                self.locked.insert(id);
                product_from_row(&row).map(Some)
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn write_stock(&mut self, id: ProductId, current_stock: i64) -> Result<(), StockStoreError> {
        if !self.locked.contains(&id) {
            return Err(StockStoreError::Invariant(format!(
                "product {id} is not locked by this transaction"
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE products
            SET current_stock = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .bind(current_stock)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("write_stock", e))?;

        if result.rows_affected() == 0 {
            return Err(StockStoreError::NotFound(format!("product {id}")));
        }
        Ok(())
    }

    #[instrument(
        skip(self, movement),
        fields(product_id = %movement.product_id, kind = %movement.kind),
        err
    )]
    async fn append_movement(&mut self, movement: NewMovement) -> Result<StockMovement, StockStoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO stock_movements (
                product_id,
                kind,
                quantity,
                user_id,
                variant_used,
                source_destination,
                notes,
                recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(movement.product_id.get())
        .bind(movement.kind.as_str())
        .bind(movement.quantity)
        .bind(movement.user_id.get())
        .bind(movement.variant_used.as_deref())
        .bind(&movement.source_destination)
        .bind(&movement.notes)
        .bind(movement.recorded_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_movement", e))?;

        let id: i64 = row.try_get("id").map_err(decode_error)?;
        Ok(StockMovement::from_new(MovementId::new(id), movement))
    }

    async fn commit(self: Box<Self>) -> Result<(), StockStoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StockStoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Map sqlx errors to StockStoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StockStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StockStoreError::Conflict(msg),
                Some("23503") => StockStoreError::Constraint(msg),
                Some("23514") => StockStoreError::Invariant(msg),
                _ => StockStoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StockStoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StockStoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

fn decode_error(err: sqlx::Error) -> StockStoreError {
    StockStoreError::Backend(format!("failed to decode row: {err}"))
}

fn product_from_row(row: &sqlx::postgres::PgRow) -> Result<Product, StockStoreError> {
    let id: i64 = row.try_get("id").map_err(decode_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode_error)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(decode_error)?;
    Ok(Product {
        id: ProductId::new(id),
        code: row.try_get("code").map_err(decode_error)?,
        name: row.try_get("name").map_err(decode_error)?,
        price_cents: row.try_get("price_cents").map_err(decode_error)?,
        current_stock: row.try_get("current_stock").map_err(decode_error)?,
        created_at,
        updated_at,
    })
}

fn movement_from_row(row: &sqlx::postgres::PgRow) -> Result<StockMovement, StockStoreError> {
    let kind: String = row.try_get("kind").map_err(decode_error)?;
    let kind: MovementKind = kind
        .parse()
        .map_err(|e| StockStoreError::Backend(format!("failed to decode movement kind: {e}")))?;
    Ok(StockMovement {
        id: MovementId::new(row.try_get("id").map_err(decode_error)?),
        product_id: ProductId::new(row.try_get("product_id").map_err(decode_error)?),
        kind,
        quantity: row.try_get("quantity").map_err(decode_error)?,
        user_id: UserId::new(row.try_get("user_id").map_err(decode_error)?),
        variant_used: row.try_get("variant_used").map_err(decode_error)?,
        source_destination: row.try_get("source_destination").map_err(decode_error)?,
        notes: row.try_get("notes").map_err(decode_error)?,
        recorded_at: row.try_get("recorded_at").map_err(decode_error)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_map_to_backend() {
        assert!(matches!(
            map_sqlx_error("list_products", sqlx::Error::PoolClosed),
            StockStoreError::Backend(msg) if msg.contains("list_products")
        ));
        assert!(matches!(
            map_sqlx_error("get_product", sqlx::Error::RowNotFound),
            StockStoreError::Backend(_)
        ));
    }
}
