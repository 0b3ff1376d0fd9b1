use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, ProductId};

/// A product as the ledger sees it.
///
/// `current_stock` is owned by the stock ledger: it starts at zero and only
/// changes as a side effect of appending a movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub code: String,
    pub name: String,
    /// Price in the smallest currency unit (e.g. cents).
    pub price_cents: i64,
    pub current_stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for registering a product. There is deliberately no stock field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub code: String,
    pub name: String,
    pub price_cents: i64,
}

impl NewProduct {
    pub fn validate(&self) -> DomainResult<()> {
        validate_code(&self.code)?;
        validate_name(&self.name)?;
        validate_price(self.price_cents)
    }
}

/// Partial update of descriptive fields. Stock is not patchable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub code: Option<String>,
    pub name: Option<String>,
    pub price_cents: Option<i64>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.name.is_none() && self.price_cents.is_none()
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.is_empty() {
            return Err(DomainError::validation("nothing to update"));
        }
        if let Some(code) = &self.code {
            validate_code(code)?;
        }
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(price) = self.price_cents {
            validate_price(price)?;
        }
        Ok(())
    }

    /// Apply the patch to a product, returning the updated copy.
    pub fn apply(&self, product: &Product, now: DateTime<Utc>) -> Product {
        let mut updated = product.clone();
        if let Some(code) = &self.code {
            updated.code = code.trim().to_string();
        }
        if let Some(name) = &self.name {
            updated.name = name.trim().to_string();
        }
        if let Some(price) = self.price_cents {
            updated.price_cents = price;
        }
        updated.updated_at = now;
        updated
    }
}

fn validate_code(code: &str) -> DomainResult<()> {
    if code.trim().is_empty() {
        return Err(DomainError::validation("code cannot be empty"));
    }
    Ok(())
}

fn validate_name(name: &str) -> DomainResult<()> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    Ok(())
}

fn validate_price(price_cents: i64) -> DomainResult<()> {
    if price_cents < 0 {
        return Err(DomainError::validation("price cannot be negative"));
    }
    Ok(())
}
