use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, MovementId, ProductId, UserId};

/// Kind of stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    /// Stock received (quantity > 0).
    In,
    /// Stock issued (quantity > 0, subtracted).
    Out,
    /// Correction (quantity != 0, signed).
    Adjustment,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::In => "in",
            MovementKind::Out => "out",
            MovementKind::Adjustment => "adjustment",
        }
    }

    /// Apply the kind's sign convention to a recorded quantity.
    pub fn signed(&self, quantity: i64) -> i64 {
        match self {
            MovementKind::In | MovementKind::Adjustment => quantity,
            MovementKind::Out => -quantity,
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(MovementKind::In),
            "out" => Ok(MovementKind::Out),
            "adjustment" => Ok(MovementKind::Adjustment),
            other => Err(DomainError::validation(format!("unknown movement kind '{other}'"))),
        }
    }
}

/// A movement ready to be appended to the log (no id yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub product_id: ProductId,
    pub kind: MovementKind,
    pub quantity: i64,
    pub user_id: UserId,
    pub variant_used: Option<String>,
    pub source_destination: String,
    pub notes: String,
    pub recorded_at: DateTime<Utc>,
}

/// An appended, immutable stock movement.
///
/// `quantity` is a positive magnitude for `in`/`out` and signed for
/// `adjustment`. Movements are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub kind: MovementKind,
    pub quantity: i64,
    pub user_id: UserId,
    pub variant_used: Option<String>,
    pub source_destination: String,
    pub notes: String,
    pub recorded_at: DateTime<Utc>,
}

impl StockMovement {
    pub fn from_new(id: MovementId, new: NewMovement) -> Self {
        Self {
            id,
            product_id: new.product_id,
            kind: new.kind,
            quantity: new.quantity,
            user_id: new.user_id,
            variant_used: new.variant_used,
            source_destination: new.source_destination,
            notes: new.notes,
            recorded_at: new.recorded_at,
        }
    }

    /// Effect of this movement on the product's stock.
    pub fn signed_delta(&self) -> i64 {
        self.kind.signed(self.quantity)
    }
}

/// Stock implied by a movement history: in − out + adjustments.
///
/// For any product this must equal `Product::current_stock`.
pub fn conserved_stock<'a>(movements: impl IntoIterator<Item = &'a StockMovement>) -> i64 {
    movements.into_iter().map(StockMovement::signed_delta).sum()
}
