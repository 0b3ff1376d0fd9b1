//! Stock ledger: the only way `current_stock` changes.
//!
//! Each call runs one store transaction:
//!
//! 1. validate the request shape (no store access)
//! 2. begin, lock the product row, re-read its stock under the lock
//! 3. plan the new quantity and reject if it would go negative
//! 4. write the quantity and append the movement
//! 5. commit
//!
//! Any failure in 2-5 rolls the transaction back. Only after a successful
//! commit does the ledger queue the audit entry and invalidate cached reads;
//! neither step can fail the call.

use serde_json::json;
use thiserror::Error;
use tracing::instrument;

use chrono::Utc;
use stockroom_auth::Actor;
use stockroom_core::ProductId;
use stockroom_inventory::{
    MovementKind, MovementRejection, MovementRequest, Product, StockChange, StockMovement,
    quantity_requirement,
};

use crate::audit::{AuditAction, AuditEntry, AuditTrail, RequestMeta};
use crate::cache::{PRODUCTS_PREFIX, ResponseCache, STOCK_TRANSACTIONS_PREFIX, product_detail_key};
use crate::stock_store::{StockStore, StockStoreError, StockTransaction};

/// Coarse error classes shared by the ledger and the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed input (non-positive quantity, bad ids).
    Validation,
    NotFound,
    /// A business rule refused the operation (insufficient stock, duplicate code).
    Conflict,
    /// The entity is still referenced.
    Constraint,
    Infrastructure,
}

impl StockStoreError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StockStoreError::NotFound(_) => ErrorCategory::NotFound,
            StockStoreError::Conflict(_) => ErrorCategory::Conflict,
            StockStoreError::Constraint(_) => ErrorCategory::Constraint,
            StockStoreError::Invariant(_) | StockStoreError::Backend(_) => {
                ErrorCategory::Infrastructure
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Product not found.")]
    ProductNotFound { product_id: ProductId },

    #[error("{}", quantity_requirement(*kind))]
    InvalidQuantity { kind: MovementKind, quantity: i64 },

    #[error("Insufficient stock for product: {product_name}. Available: {available}")]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        available: i64,
        requested: i64,
    },

    #[error(
        "Adjustment would result in negative stock for product: {product_name}. Current: {current}, Adjustment: {adjustment}"
    )]
    NegativeStockAdjustment {
        product_id: ProductId,
        product_name: String,
        current: i64,
        adjustment: i64,
    },

    #[error("stock store failure: {0}")]
    Store(#[from] StockStoreError),
}

impl LedgerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LedgerError::ProductNotFound { .. } => ErrorCategory::NotFound,
            LedgerError::InvalidQuantity { .. } => ErrorCategory::Validation,
            LedgerError::InsufficientStock { .. } | LedgerError::NegativeStockAdjustment { .. } => {
                ErrorCategory::Conflict
            }
            LedgerError::Store(err) => match err.category() {
                // A row vanishing mid-transaction is not the caller's fault.
                ErrorCategory::NotFound => ErrorCategory::Infrastructure,
                other => other,
            },
        }
    }
}

impl From<MovementRejection> for LedgerError {
    fn from(rejection: MovementRejection) -> Self {
        match rejection {
            MovementRejection::InvalidQuantity { kind, quantity } => {
                LedgerError::InvalidQuantity { kind, quantity }
            }
            MovementRejection::InsufficientStock {
                product_id,
                product_name,
                available,
                requested,
            } => LedgerError::InsufficientStock {
                product_id,
                product_name,
                available,
                requested,
            },
            MovementRejection::NegativeStockAdjustment {
                product_id,
                product_name,
                current,
                adjustment,
            } => LedgerError::NegativeStockAdjustment {
                product_id,
                product_name,
                current,
                adjustment,
            },
        }
    }
}

/// Result of a committed movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementReceipt {
    pub movement: StockMovement,
    pub product_name: String,
    pub product_code: String,
    pub previous_stock: i64,
    pub new_stock: i64,
}

/// Orchestrates stock movements over a [`StockStore`].
pub struct StockLedger<S, C> {
    store: S,
    cache: C,
    audit: AuditTrail,
}

impl<S, C> StockLedger<S, C>
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

    pub async fn record_in(
        &self,
        product_id: ProductId,
        quantity: i64,
        actor: &Actor,
        meta: &RequestMeta,
    ) -> Result<MovementReceipt, LedgerError> {
        self.record(MovementRequest::new(product_id, MovementKind::In, quantity), actor, meta)
            .await
    }

    pub async fn record_out(
        &self,
        product_id: ProductId,
        quantity: i64,
        actor: &Actor,
        meta: &RequestMeta,
    ) -> Result<MovementReceipt, LedgerError> {
        self.record(MovementRequest::new(product_id, MovementKind::Out, quantity), actor, meta)
            .await
    }

    pub async fn record_adjustment(
        &self,
        product_id: ProductId,
        quantity: i64,
        actor: &Actor,
        meta: &RequestMeta,
    ) -> Result<MovementReceipt, LedgerError> {
        self.record(
            MovementRequest::new(product_id, MovementKind::Adjustment, quantity),
            actor,
            meta,
        )
        .await
    }

    /// Apply one movement atomically, then audit and invalidate.
    #[instrument(
        skip(self, request, actor, meta),
        fields(
            product_id = %request.product_id,
            kind = %request.kind,
            quantity = request.quantity,
            user_id = %actor.user_id
        ),
        err
    )]
    pub async fn record(
        &self,
        request: MovementRequest,
        actor: &Actor,
        meta: &RequestMeta,
    ) -> Result<MovementReceipt, LedgerError> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let applied = match apply(tx.as_mut(), request, actor).await {
            Ok(applied) => applied,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "rollback after failed movement also failed");
                }
                return Err(err);
            }
        };
        tx.commit().await?;

        let (product, change, movement) = applied;
        tracing::info!(
            movement_id = %movement.id,
            previous_stock = change.previous,
            new_stock = change.next,
            "stock movement committed"
        );

        self.audit.record(AuditEntry::new(
            actor,
            movement.kind.into(),
            movement_details(&product, &change, &movement),
            meta,
        ));
        self.invalidate_stock_views(product.id);

        Ok(MovementReceipt {
            movement,
            product_name: product.name,
            product_code: product.code,
            previous_stock: change.previous,
            new_stock: change.next,
        })
    }

    fn invalidate_stock_views(&self, product_id: ProductId) {
        let products = self.cache.invalidate_prefix(PRODUCTS_PREFIX);
        let movements = self.cache.invalidate_prefix(STOCK_TRANSACTIONS_PREFIX);
        self.cache.invalidate(&product_detail_key(product_id));
        tracing::debug!(products, movements, "invalidated cached stock views");
    }
}

/// Steps 2-4 against an open transaction. The caller commits or rolls back.
async fn apply(
    tx: &mut dyn StockTransaction,
    request: MovementRequest,
    actor: &Actor,
) -> Result<(Product, StockChange, StockMovement), LedgerError> {
    let product = tx
        .lock_product(request.product_id)
        .await?
        .ok_or(LedgerError::ProductNotFound {
            product_id: request.product_id,
        })?;

    let change = request.plan(&product)?;
    tx.write_stock(product.id, change.next).await?;
    let movement = tx
        .append_movement(request.into_new_movement(actor.user_id, Utc::now()))
        .await?;

    Ok((product, change, movement))
}

fn movement_details(product: &Product, change: &StockChange, movement: &StockMovement) -> serde_json::Value {
    json!({
        "transactionId": movement.id,
        "productId": product.id,
        "productCode": product.code,
        "productName": product.name,
        "type": movement.kind,
        "quantity": movement.quantity,
        "variantUsed": movement.variant_used,
        "sourceDestination": movement.source_destination,
        "notes": movement.notes,
        "previousStock": change.previous,
        "newStock": change.next,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock_store::StockStoreError;

    #[test]
    fn rejections_keep_their_messages() {
        let err: LedgerError = MovementRejection::InsufficientStock {
            product_id: ProductId::new(1),
            product_name: "Widget".to_string(),
            available: 3,
            requested: 5,
        }
        .into();
        assert_eq!(err.to_string(), "Insufficient stock for product: Widget. Available: 3");
        assert_eq!(err.category(), ErrorCategory::Conflict);

        let err: LedgerError = MovementRejection::NegativeStockAdjustment {
            product_id: ProductId::new(1),
            product_name: "Widget".to_string(),
            current: 0,
            adjustment: -1,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Adjustment would result in negative stock for product: Widget. Current: 0, Adjustment: -1"
        );
    }

    #[test]
    fn categories_follow_the_taxonomy() {
        assert_eq!(
            LedgerError::ProductNotFound { product_id: ProductId::new(9) }.category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            LedgerError::InvalidQuantity { kind: MovementKind::In, quantity: 0 }.category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            LedgerError::Store(StockStoreError::Backend("down".into())).category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(
            LedgerError::Store(StockStoreError::NotFound("product 1".into())).category(),
            ErrorCategory::Infrastructure
        );
    }
}
