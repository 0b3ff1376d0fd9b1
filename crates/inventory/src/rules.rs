//! Movement validation and planning.
//!
//! The ledger calls [`MovementRequest::validate`] before touching any store and
//! [`MovementRequest::plan`] against the product it has locked inside its
//! transaction. Both are pure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockroom_core::{ProductId, UserId};

use crate::movement::{MovementKind, NewMovement};
use crate::product::Product;

/// A request to move stock for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub product_id: ProductId,
    pub kind: MovementKind,
    pub quantity: i64,
    pub variant_used: Option<String>,
    pub source_destination: Option<String>,
    pub notes: Option<String>,
}

/// Business-rule rejection of a movement.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MovementRejection {
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
}

/// What a valid quantity looks like for `kind`, as shown to callers.
pub fn quantity_requirement(kind: MovementKind) -> &'static str {
    match kind {
        MovementKind::In => "Product ID and a positive quantity are required for stock in.",
        MovementKind::Out => "Product ID and a positive quantity are required for stock out.",
        MovementKind::Adjustment => {
            "Product ID and a non-zero quantity are required for stock adjustment."
        }
    }
}

/// Outcome of planning a movement against a locked product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub previous: i64,
    pub next: i64,
    pub delta: i64,
}

impl MovementRequest {
    pub fn new(product_id: ProductId, kind: MovementKind, quantity: i64) -> Self {
        Self {
            product_id,
            kind,
            quantity,
            variant_used: None,
            source_destination: None,
            notes: None,
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant_used = Some(variant.into());
        self
    }

    pub fn with_source_destination(mut self, text: impl Into<String>) -> Self {
        self.source_destination = Some(text.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Shape check that needs no store access.
    pub fn validate(&self) -> Result<(), MovementRejection> {
        let valid = match self.kind {
            MovementKind::In | MovementKind::Out => self.quantity > 0,
            MovementKind::Adjustment => self.quantity != 0,
        };
        if valid {
            Ok(())
        } else {
            Err(MovementRejection::InvalidQuantity {
                kind: self.kind,
                quantity: self.quantity,
            })
        }
    }

    /// Signed effect on stock.
    pub fn signed_delta(&self) -> i64 {
        self.kind.signed(self.quantity)
    }

    /// Decide the resulting stock for `product`, or reject the movement.
    ///
    /// `product` must be the row as read under the transaction's lock.
    pub fn plan(&self, product: &Product) -> Result<StockChange, MovementRejection> {
        self.validate()?;

        let previous = product.current_stock;
        let delta = self.signed_delta();
        let next = previous.checked_add(delta).unwrap_or(i64::MIN);

        if next < 0 {
            return Err(match self.kind {
                MovementKind::Adjustment => MovementRejection::NegativeStockAdjustment {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    current: previous,
                    adjustment: self.quantity,
                },
                _ => MovementRejection::InsufficientStock {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    available: previous,
                    requested: self.quantity,
                },
            });
        }

        Ok(StockChange {
            previous,
            next,
            delta,
        })
    }

    /// Build the log row, filling in the default texts for omitted fields.
    pub fn into_new_movement(self, user_id: UserId, recorded_at: DateTime<Utc>) -> NewMovement {
        let quantity = self.quantity;
        let source_destination = match self.kind {
            MovementKind::In => non_blank(self.source_destination)
                .unwrap_or_else(|| "Unknown Supplier".to_string()),
            MovementKind::Out => non_blank(self.source_destination)
                .unwrap_or_else(|| "Unknown Customer".to_string()),
            MovementKind::Adjustment => "Adjustment".to_string(),
        };
        let notes = non_blank(self.notes).unwrap_or_else(|| match self.kind {
            MovementKind::In => format!("Stock In: {quantity} units received"),
            MovementKind::Out => format!("Stock Out: {quantity} units issued"),
            MovementKind::Adjustment if quantity > 0 => {
                "Stock increased due to adjustment".to_string()
            }
            MovementKind::Adjustment => "Stock decreased due to adjustment".to_string(),
        });

        NewMovement {
            product_id: self.product_id,
            kind: self.kind,
            quantity,
            user_id,
            variant_used: non_blank(self.variant_used),
            source_destination,
            notes,
            recorded_at,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    use crate::movement::{StockMovement, conserved_stock};
    use stockroom_core::MovementId;

    fn product(stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: ProductId::new(1),
            code: "SKU-1".to_string(),
            name: "Widget".to_string(),
            price_cents: 100,
            current_stock: stock,
            created_at: now,
            updated_at: now,
        }
    }

    fn request(kind: MovementKind, quantity: i64) -> MovementRequest {
        MovementRequest::new(ProductId::new(1), kind, quantity)
    }

    #[test]
    fn in_and_out_require_positive_quantity() {
        for kind in [MovementKind::In, MovementKind::Out] {
            for q in [0, -1] {
                assert_eq!(
                    request(kind, q).validate(),
                    Err(MovementRejection::InvalidQuantity { kind, quantity: q })
                );
            }
        }
        assert!(request(MovementKind::Adjustment, -4).validate().is_ok());
        assert!(request(MovementKind::Adjustment, 0).validate().is_err());
    }

    #[test]
    fn scenario_out_then_adjust_to_zero() {
        let p = product(10);

        let change = request(MovementKind::Out, 7).plan(&p).unwrap();
        assert_eq!(change, StockChange { previous: 10, next: 3, delta: -7 });

        let p = product(3);
        let err = request(MovementKind::Out, 5).plan(&p).unwrap_err();
        match &err {
            MovementRejection::InsufficientStock { available, requested, .. } => {
                assert_eq!((*available, *requested), (3, 5));
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
        assert_eq!(err.to_string(), "Insufficient stock for product: Widget. Available: 3");

        let change = request(MovementKind::Adjustment, -3).plan(&p).unwrap();
        assert_eq!(change.next, 0);

        let p = product(0);
        let err = request(MovementKind::Adjustment, -1).plan(&p).unwrap_err();
        assert!(matches!(err, MovementRejection::NegativeStockAdjustment { current: 0, adjustment: -1, .. }));
    }

    #[test]
    fn defaults_fill_omitted_texts() {
        let now = Utc::now();
        let user = UserId::new(5);

        let m = request(MovementKind::In, 4).into_new_movement(user, now);
        assert_eq!(m.source_destination, "Unknown Supplier");
        assert_eq!(m.notes, "Stock In: 4 units received");

        let m = request(MovementKind::Out, 2)
            .with_source_destination("Order #12")
            .into_new_movement(user, now);
        assert_eq!(m.source_destination, "Order #12");
        assert_eq!(m.notes, "Stock Out: 2 units issued");

        let m = request(MovementKind::Adjustment, -1)
            .with_source_destination("ignored")
            .into_new_movement(user, now);
        assert_eq!(m.source_destination, "Adjustment");
        assert_eq!(m.notes, "Stock decreased due to adjustment");

        let m = request(MovementKind::Adjustment, 2)
            .with_notes("  ")
            .into_new_movement(user, now);
        assert_eq!(m.notes, "Stock increased due to adjustment");
    }

    #[test]
    fn overflowing_adjustment_is_rejected_not_wrapped() {
        let p = product(1);
        let err = request(MovementKind::Out, i64::MAX).plan(&p).unwrap_err();
        assert!(matches!(err, MovementRejection::InsufficientStock { .. }));
    }

    fn arb_request() -> impl Strategy<Value = (MovementKind, i64)> {
        prop_oneof![
            (1i64..50).prop_map(|q| (MovementKind::In, q)),
            (1i64..50).prop_map(|q| (MovementKind::Out, q)),
            (-50i64..50).prop_map(|q| (MovementKind::Adjustment, q)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: applying any sequence of requests (accepted ones only)
        /// keeps stock non-negative and equal to the signed sum of the history.
        #[test]
        fn accepted_movements_conserve_stock_and_never_go_negative(
            requests in prop::collection::vec(arb_request(), 1..60)
        ) {
            let mut p = product(0);
            let mut history: Vec<StockMovement> = Vec::new();

            for (idx, (kind, quantity)) in requests.into_iter().enumerate() {
                let req = request(kind, quantity);
                match req.plan(&p) {
                    Ok(change) => {
                        prop_assert!(change.next >= 0);
                        p.current_stock = change.next;
                        let new = req.into_new_movement(UserId::new(1), Utc::now());
                        history.push(StockMovement::from_new(MovementId::new(idx as i64 + 1), new));
                    }
                    Err(MovementRejection::InvalidQuantity { quantity, .. }) => {
                        prop_assert_eq!(quantity, 0);
                    }
                    Err(_) => {
                        // Rejected against current stock: nothing changes.
                        prop_assert!(p.current_stock + kind.signed(quantity) < 0);
                    }
                }

                prop_assert!(p.current_stock >= 0);
                prop_assert_eq!(p.current_stock, conserved_stock(&history));
            }
        }
    }
}
