//! Request bodies and JSON shapes of the HTTP surface (camelCase on the wire).

use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use stockroom_core::ProductId;
use stockroom_infra::MovementReceipt;
use stockroom_infra::stock_store::MovementView;
use stockroom_inventory::{
    MovementKind, MovementRequest, NewProduct, Product, ProductPatch, StockMovement,
    quantity_requirement,
};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /api/stock/{in,out,adjustment}`.
///
/// `productId` and `quantity` accept integers or numeric strings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementBody {
    pub product_id: Option<Value>,
    pub quantity: Option<Value>,
    pub variant_used: Option<String>,
    pub source_destination: Option<String>,
    pub notes: Option<String>,
}

impl MovementBody {
    pub fn into_request(self, kind: MovementKind) -> Result<MovementRequest, axum::response::Response> {
        let invalid =
            || errors::json_error(StatusCode::BAD_REQUEST, "validation_error", quantity_requirement(kind));

        let product_id = self
            .product_id
            .as_ref()
            .and_then(integer)
            .and_then(|id| ProductId::try_new(id).ok())
            .ok_or_else(invalid)?;
        let quantity = self.quantity.as_ref().and_then(integer).ok_or_else(invalid)?;

        let mut request = MovementRequest::new(product_id, kind, quantity);
        if let Some(variant) = self.variant_used {
            request = request.with_variant(variant);
        }
        if let Some(source_destination) = self.source_destination {
            request = request.with_source_destination(source_destination);
        }
        if let Some(notes) = self.notes {
            request = request.with_notes(notes);
        }
        Ok(request)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub code: String,
    pub name: String,
    pub price: f64,
}

impl CreateProductRequest {
    pub fn into_new_product(self) -> Result<NewProduct, axum::response::Response> {
        Ok(NewProduct {
            code: self.code.trim().to_string(),
            name: self.name.trim().to_string(),
            price_cents: price_to_cents(self.price)?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub code: Option<String>,
    pub name: Option<String>,
    pub price: Option<f64>,
}

impl UpdateProductRequest {
    pub fn into_patch(self) -> Result<ProductPatch, axum::response::Response> {
        Ok(ProductPatch {
            code: self.code,
            name: self.name,
            price_cents: self.price.map(price_to_cents).transpose()?,
        })
    }
}

/// Whole numbers only: `5`, `5.0` and `"5"` are accepted, `5.5` and `"five"` are not.
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn price_to_cents(price: f64) -> Result<i64, axum::response::Response> {
    if !price.is_finite() || price < 0.0 || price > 9.0e13 {
        return Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "price must be a non-negative number",
        ));
    }
    Ok((price * 100.0).round() as i64)
}

pub fn parse_id<T>(raw: &str, what: &str) -> Result<T, axum::response::Response>
where
    T: core::str::FromStr,
{
    raw.trim().parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!("{what} must be a number"),
        )
    })
}

// -------------------------
// Response mapping
// -------------------------

pub fn product_json(product: &Product) -> Value {
    json!({
        "id": product.id,
        "code": product.code,
        "name": product.name,
        "price": cents_to_price(product.price_cents),
        "priceCents": product.price_cents,
        "currentStock": product.current_stock,
        "createdAt": product.created_at,
        "updatedAt": product.updated_at,
    })
}

pub fn movement_view_json(view: &MovementView) -> Value {
    movement_json(&view.movement, &view.product_name, &view.product_code)
}

pub fn movement_json(movement: &StockMovement, product_name: &str, product_code: &str) -> Value {
    json!({
        "id": movement.id,
        "productId": movement.product_id,
        "productName": product_name,
        "productCode": product_code,
        "type": movement.kind,
        "quantity": movement.quantity,
        "variantUsed": movement.variant_used,
        "sourceDestination": movement.source_destination,
        "notes": movement.notes,
        "userId": movement.user_id,
        "transactionDate": movement.recorded_at,
    })
}

pub fn receipt_json(receipt: &MovementReceipt) -> Value {
    json!({
        "message": success_message(receipt.movement.kind),
        "transaction": movement_json(&receipt.movement, &receipt.product_name, &receipt.product_code),
        "previousStock": receipt.previous_stock,
        "newStock": receipt.new_stock,
    })
}

fn success_message(kind: MovementKind) -> &'static str {
    match kind {
        MovementKind::In => "Stock In recorded successfully",
        MovementKind::Out => "Stock Out recorded successfully",
        MovementKind::Adjustment => "Stock Adjustment recorded successfully",
    }
}

fn cents_to_price(cents: i64) -> f64 {
    cents as f64 / 100.0
}
